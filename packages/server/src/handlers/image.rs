use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use tokio_util::io::ReaderStream;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::entity::image;
use crate::error::{AppError, ErrorBody};
use crate::registry;
use crate::state::AppState;

/// One year, in seconds.
const MAX_AGE_SECS: i64 = 365 * 24 * 60 * 60;

const NOT_FOUND: &str = "Image not found";

#[utoipa::path(
    get,
    path = "/i/{file}",
    tag = "Images",
    operation_id = "getImage",
    summary = "Serve a stored image",
    description = "Streams the image bytes with long-lived cache headers. Deleted and unknown \
        images are indistinguishable (404); images flagged NSFW return 403. Sends `304 Not \
        Modified` with an empty body when `If-None-Match` carries the current ETag.",
    params(("file" = String, Path, description = "`<uuid>.<ext>`")),
    responses(
        (status = 200, description = "Image bytes", content_type = "image/*"),
        (status = 304, description = "Not modified"),
        (status = 403, description = "Blocked by moderation (FORBIDDEN)", body = ErrorBody),
        (status = 404, description = "Unknown or deleted image (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, headers))]
pub async fn serve_image(
    State(state): State<AppState>,
    Path(file): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let uuid = parse_image_path(&file).ok_or_else(|| AppError::NotFound(NOT_FOUND.into()))?;

    let record = registry::find_by_uuid(&state.db, uuid)
        .await?
        .ok_or_else(|| AppError::NotFound(NOT_FOUND.into()))?;

    if record.is_deleted {
        return Err(AppError::NotFound(NOT_FOUND.into()));
    }
    if record.is_nsfw {
        return Err(AppError::Forbidden(
            "This image has been blocked for violating content rules".into(),
        ));
    }

    let filename = record.filename();
    if !state.store.exists(&filename).await? {
        warn!(%uuid, %filename, "Registry record has no stored file");
        return Err(AppError::NotFound(NOT_FOUND.into()));
    }

    let etag = compute_etag(&record);
    if if_none_match_hits(&headers, &etag) {
        return Ok(StatusCode::NOT_MODIFIED.into_response());
    }

    let stored = state.store.open(&filename).await?;
    let body = Body::from_stream(ReaderStream::new(stored.reader));
    let expires = Utc::now() + Duration::seconds(MAX_AGE_SECS);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, common::format::content_type_for(&record.format))
        .header(header::CONTENT_LENGTH, stored.len.to_string())
        .header(
            header::CACHE_CONTROL,
            format!("public, max-age={MAX_AGE_SECS}, immutable"),
        )
        .header(header::EXPIRES, http_date(&expires))
        .header(header::ETAG, &etag)
        .header(header::LAST_MODIFIED, http_date(&record.updated_at))
        .header(header::X_CONTENT_TYPE_OPTIONS, "nosniff")
        .body(body)
        .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")))
}

/// Extract the uuid from `<hex-and-hyphens>.<word>`.
///
/// The extension is not checked against the record; the stored format wins.
fn parse_image_path(file: &str) -> Option<Uuid> {
    let (stem, ext) = file.rsplit_once('.')?;
    let stem_ok = !stem.is_empty() && stem.chars().all(|c| c.is_ascii_hexdigit() || c == '-');
    let ext_ok = !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !stem_ok || !ext_ok {
        return None;
    }
    Uuid::parse_str(stem).ok()
}

/// Quoted SHA-256 over `uuid` and the last modification time.
fn compute_etag(record: &image::Model) -> String {
    let seed = format!("{}-{}", record.uuid, record.updated_at.to_rfc3339());
    format!("\"{}\"", hex::encode(Sha256::digest(seed.as_bytes())))
}

/// `If-None-Match` matches when it is `*` or lists `etag`, weak or strong.
fn if_none_match_hits(headers: &HeaderMap, etag: &str) -> bool {
    headers
        .get_all(header::IF_NONE_MATCH)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .any(|candidate| {
            candidate == "*" || candidate.strip_prefix("W/").unwrap_or(candidate) == etag
        })
}

/// RFC 7231 IMF-fixdate.
fn http_date(at: &DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
