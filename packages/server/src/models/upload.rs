use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::image;

/// JSON body for `POST /api/upload/private`.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct Base64UploadRequest {
    /// Bare base64 or a `data:image/<fmt>;base64,` URI.
    #[schema(example = "data:image/png;base64,iVBORw0KGgo...")]
    pub base64: Option<String>,
    /// Overrides the synthesized `image.<fmt>` name.
    #[schema(example = "screenshot.png")]
    pub filename: Option<String>,
}

/// JSON body for `POST /api/upload/url`.
#[derive(Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UrlUploadRequest {
    /// Remote `http`/`https` image URL.
    #[schema(example = "https://example.com/cat.png")]
    pub url: String,
    /// Include the stored bytes as base64 in the response.
    #[serde(default)]
    pub return_base64: bool,
    /// Prefix the returned base64 with a `data:` URI header.
    #[serde(default)]
    pub base64_data_uri: bool,
}

/// Metadata of a stored image.
#[derive(Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadedImage {
    /// Record ID (UUIDv7).
    #[schema(example = "01936f0e-1234-7abc-8000-000000000001")]
    pub id: String,
    /// Public identifier.
    #[schema(example = "3f1c1d0e-8a4b-4c39-9b0e-2f5d8c7a6b10")]
    pub uuid: String,
    #[schema(example = "3f1c1d0e-8a4b-4c39-9b0e-2f5d8c7a6b10.webp")]
    pub filename: String,
    #[schema(example = "webp")]
    pub format: String,
    /// Stored size in bytes.
    #[schema(example = 48213)]
    pub size: i64,
    #[schema(example = 800)]
    pub width: i32,
    #[schema(example = 600)]
    pub height: i32,
    /// Site-relative retrieval path.
    #[schema(example = "/i/3f1c1d0e-8a4b-4c39-9b0e-2f5d8c7a6b10.webp")]
    pub url: String,
    pub uploaded_at: DateTime<Utc>,
    /// Present only when requested on URL ingestion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base64: Option<String>,
}

impl From<&image::Model> for UploadedImage {
    fn from(model: &image::Model) -> Self {
        let filename = model.filename();
        Self {
            id: model.id.to_string(),
            uuid: model.uuid.to_string(),
            url: format!("/i/{filename}"),
            filename,
            format: model.format.clone(),
            size: model.size,
            width: model.width,
            height: model.height,
            uploaded_at: model.uploaded_at,
            base64: None,
        }
    }
}

impl UploadedImage {
    /// Attach the stored bytes, optionally as a `data:` URI.
    pub fn with_base64(mut self, bytes: &[u8], data_uri: bool) -> Self {
        let encoded = STANDARD.encode(bytes);
        self.base64 = Some(if data_uri {
            let mime = common::format::content_type_for(&self.format);
            format!("data:{mime};base64,{encoded}")
        } else {
            encoded
        });
        self
    }
}

/// Envelope for successful uploads.
#[derive(Serialize, utoipa::ToSchema)]
pub struct UploadResponse {
    /// Always `true`.
    pub success: bool,
    #[schema(example = "Upload successful")]
    pub message: String,
    pub data: UploadedImage,
}

impl UploadResponse {
    pub fn ok(data: UploadedImage) -> Self {
        Self {
            success: true,
            message: "Upload successful".into(),
            data,
        }
    }
}
