use axum::{
    Json,
    extract::{FromRequest, Multipart, Request},
    http::{StatusCode, header},
};

use crate::error::AppError;
use crate::extractors::json::json_rejection;
use crate::ingest::IngestError;
use crate::ingest::source::{InputImage, decode_base64_image, read_multipart_image};
use crate::models::upload::Base64UploadRequest;
use crate::state::AppState;

/// An image taken from either a multipart form or a base64 JSON body.
///
/// The body kind is chosen from `Content-Type` alone: anything mentioning
/// `application/json` is decoded as base64 JSON, everything else is parsed
/// as multipart.
pub struct ImageUpload(pub InputImage);

fn is_json(req: &Request) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("application/json"))
}

impl FromRequest<AppState> for ImageUpload {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let max_size = state.config.upload.max_file_size;

        if is_json(&req) {
            let Json(body) = Json::<Base64UploadRequest>::from_request(req, state)
                .await
                .map_err(|rejection| {
                    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                        AppError::from(IngestError::TooLarge { limit: max_size })
                    } else {
                        json_rejection(rejection)
                    }
                })?;
            let payload = body
                .base64
                .ok_or_else(|| AppError::InvalidInput("Missing base64 field".into()))?;
            let image = decode_base64_image(&payload, body.filename)?;
            return Ok(ImageUpload(image));
        }

        let multipart = Multipart::from_request(req, state).await.map_err(|e| {
            AppError::InvalidInput(format!("Expected multipart/form-data: {}", e.body_text()))
        })?;
        let image = read_multipart_image(multipart, max_size).await?;
        Ok(ImageUpload(image))
    }
}
