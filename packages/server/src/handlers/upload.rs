use axum::Json;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::HeaderMap;
use tracing::{info, instrument};

use crate::config::UploadConfig;
use crate::entity::image::{self, UploaderKind};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::{ApiKeyCaller, ClientIp, SessionCaller, UrlUploadCaller};
use crate::extractors::json::AppJson;
use crate::extractors::upload::ImageUpload;
use crate::ingest::source::{InputImage, read_multipart_image};
use crate::ingest::{self, Ingestion, TranscodePolicy, Uploader};
use crate::models::upload::{Base64UploadRequest, UploadResponse, UploadedImage, UrlUploadRequest};
use crate::notify::{self, UploadEvent, absolute_image_url};
use crate::state::AppState;

/// Request body cap for upload routes: the file limit inflated for base64
/// encoding plus room for multipart framing.
pub fn upload_body_limit(upload: &UploadConfig) -> DefaultBodyLimit {
    let limit = upload.max_file_size.saturating_mul(4) / 3 + 64 * 1024;
    DefaultBodyLimit::max(usize::try_from(limit).unwrap_or(usize::MAX))
}

#[utoipa::path(
    post,
    path = "/upload/private",
    tag = "Upload",
    operation_id = "uploadPrivate",
    summary = "Upload an image with an API key",
    description = "Accepts `multipart/form-data` with a single file part, or JSON \
        `{ base64, filename? }` where `base64` is bare or a `data:image/<fmt>;base64,` URI. \
        The API key is read from the `X-API-Key` header or the `apiKey` query parameter.",
    request_body(content = Base64UploadRequest, description = "Base64 JSON or multipart file"),
    params(("apiKey" = Option<String>, Query, description = "API key, if not sent as a header")),
    responses(
        (status = 200, description = "Image stored", body = UploadResponse),
        (status = 400, description = "Bad input (INVALID_INPUT, TOO_LARGE)", body = ErrorBody),
        (status = 401, description = "Missing or invalid API key (UNAUTHORIZED)", body = ErrorBody),
        (status = 500, description = "STORAGE_ERROR, PROCESSING_ERROR", body = ErrorBody),
    ),
    security(("api_key" = [])),
)]
#[instrument(skip_all, fields(key = %caller.name, ip = %ip))]
pub async fn upload_private(
    caller: ApiKeyCaller,
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    ImageUpload(input): ImageUpload,
) -> Result<Json<UploadResponse>, AppError> {
    let uploader = Uploader {
        name: caller.name,
        kind: UploaderKind::PrivateApiKey,
        api_key_id: Some(caller.id),
    };
    let record = store_input(&state, &headers, input, uploader, ip).await?;
    Ok(Json(UploadResponse::ok(UploadedImage::from(&record))))
}

#[utoipa::path(
    post,
    path = "/upload",
    tag = "Upload",
    operation_id = "uploadAdmin",
    summary = "Upload an image as an administrator",
    description = "Multipart upload with a single file part. Requires an admin session \
        (`Authorization: Bearer` or the `auth_token` cookie).",
    request_body(content_type = "multipart/form-data", description = "Image file part"),
    responses(
        (status = 200, description = "Image stored", body = UploadResponse),
        (status = 400, description = "Bad input (INVALID_INPUT, TOO_LARGE)", body = ErrorBody),
        (status = 401, description = "Not logged in (UNAUTHORIZED)", body = ErrorBody),
        (status = 500, description = "STORAGE_ERROR, PROCESSING_ERROR", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip_all, fields(user = %caller.username, ip = %ip))]
pub async fn upload_admin(
    caller: SessionCaller,
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let input = read_multipart_image(multipart, state.config.upload.max_file_size).await?;
    let uploader = Uploader {
        name: caller.username,
        kind: UploaderKind::AdminSession,
        api_key_id: None,
    };
    let record = store_input(&state, &headers, input, uploader, ip).await?;
    Ok(Json(UploadResponse::ok(UploadedImage::from(&record))))
}

#[utoipa::path(
    post,
    path = "/upload/url",
    tag = "Upload",
    operation_id = "uploadFromUrl",
    summary = "Ingest an image from a remote URL",
    description = "Downloads the image with browser-like headers and stores it. Accepts an API key \
        or an admin session. Set `returnBase64` to receive the stored bytes, and `base64DataUri` \
        to receive them as a `data:` URI.",
    request_body = UrlUploadRequest,
    params(("apiKey" = Option<String>, Query, description = "API key, if not sent as a header")),
    responses(
        (status = 200, description = "Image stored", body = UploadResponse),
        (status = 400, description = "Bad URL, non-image or failed download (INVALID_INPUT, TOO_LARGE)", body = ErrorBody),
        (status = 401, description = "No valid credentials (UNAUTHORIZED)", body = ErrorBody),
        (status = 408, description = "Remote fetch timed out (TIMEOUT)", body = ErrorBody),
        (status = 500, description = "STORAGE_ERROR, PROCESSING_ERROR", body = ErrorBody),
    ),
    security(("api_key" = []), ("jwt" = [])),
)]
#[instrument(skip_all, fields(url = %payload.url, ip = %ip))]
pub async fn upload_url(
    caller: UrlUploadCaller,
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    AppJson(payload): AppJson<UrlUploadRequest>,
) -> Result<Json<UploadResponse>, AppError> {
    let fetched = state.fetcher.fetch(&payload.url).await?;

    let upload = &state.config.upload;
    let policy = TranscodePolicy {
        convert_to_webp: upload.convert_to_webp,
        quality: upload.url_webp_quality,
    };
    let uploader = caller.uploader();
    let ingestion = Ingestion {
        bytes: fetched.bytes,
        original_name: fetched.original_name,
        format: fetched.extension,
        uploader: uploader.clone(),
        source_url: Some(payload.url.trim().to_string()),
        ip,
    };

    let stored =
        ingest::ingest(&state.db, &*state.store, upload.max_file_size, policy, ingestion).await?;
    announce(&state, &headers, &stored.record, &uploader);

    let mut data = UploadedImage::from(&stored.record);
    if payload.return_base64 {
        data = data.with_base64(&stored.bytes, payload.base64_data_uri);
    }
    Ok(Json(UploadResponse::ok(data)))
}

/// Ingest a direct upload with the direct-upload transcode quality.
async fn store_input(
    state: &AppState,
    headers: &HeaderMap,
    input: InputImage,
    uploader: Uploader,
    ip: String,
) -> Result<image::Model, AppError> {
    let upload = &state.config.upload;
    let policy = TranscodePolicy {
        convert_to_webp: upload.convert_to_webp,
        quality: upload.webp_quality,
    };
    let ingestion = Ingestion {
        format: input.format()?,
        bytes: input.bytes,
        original_name: input.original_filename,
        uploader: uploader.clone(),
        source_url: None,
        ip,
    };

    let stored =
        ingest::ingest(&state.db, &*state.store, upload.max_file_size, policy, ingestion).await?;
    announce(state, headers, &stored.record, &uploader);
    Ok(stored.record)
}

/// Fire the upload notification without waiting for it.
fn announce(state: &AppState, headers: &HeaderMap, record: &image::Model, uploader: &Uploader) {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let filename = record.filename();
    let url = absolute_image_url(
        state.config.server.site_url.as_deref(),
        header("x-forwarded-proto"),
        header("host"),
        &filename,
    );
    info!(uuid = %record.uuid, %url, "Upload stored");

    let event = UploadEvent {
        id: record.id,
        filename,
        format: record.format.clone(),
        size: record.size,
        url,
        uploader_name: uploader.name.clone(),
        uploader_type: uploader.kind,
        ip: record.ip.clone(),
    };
    notify::dispatch(state.notifier.clone(), event);
}

