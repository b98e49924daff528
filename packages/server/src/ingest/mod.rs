//! Upload ingestion: normalize, optionally transcode, store, record.
//!
//! The file is always written before its registry row, so a record never
//! points at a missing file. Orphaned files are tolerated.

pub mod fetch;
pub mod headers;
pub mod source;
pub mod transcode;

use common::storage::ImageStore;
use sea_orm::DatabaseConnection;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entity::image::{self, UploaderKind, stored_filename};
use crate::error::AppError;
use crate::registry::{self, NewImage};

/// Fresh uuids tried before giving up on allocation.
const UUID_ATTEMPTS: usize = 3;

/// Failures raised while turning a request body into storable bytes.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("image exceeds {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("remote fetch timed out")]
    Timeout,

    #[error("image processing failed: {0}")]
    Processing(String),
}

/// Reject payloads above `max_size`. Exactly `max_size` bytes is accepted.
pub fn check_size(len: u64, max_size: u64) -> Result<(), IngestError> {
    if len > max_size {
        Err(IngestError::TooLarge { limit: max_size })
    } else {
        Ok(())
    }
}

/// Who is uploading, as recorded on the image row.
#[derive(Debug, Clone)]
pub struct Uploader {
    pub name: String,
    pub kind: UploaderKind,
    pub api_key_id: Option<Uuid>,
}

/// Transcode policy for one ingestion.
#[derive(Debug, Clone, Copy)]
pub struct TranscodePolicy {
    pub convert_to_webp: bool,
    pub quality: u8,
}

/// A normalized image ready for the pipeline.
#[derive(Debug)]
pub struct Ingestion {
    pub bytes: Vec<u8>,
    pub original_name: String,
    /// Lowercase extension token of `bytes`.
    pub format: String,
    pub uploader: Uploader,
    pub source_url: Option<String>,
    pub ip: String,
}

/// The persisted record plus the bytes actually stored.
#[derive(Debug)]
pub struct Ingested {
    pub record: image::Model,
    pub bytes: Vec<u8>,
}

/// Pick a uuid unknown to both the registry and the store.
pub async fn allocate_uuid(
    db: &DatabaseConnection,
    store: &dyn ImageStore,
    format: &str,
) -> Result<Uuid, AppError> {
    for attempt in 1..=UUID_ATTEMPTS {
        let uuid = Uuid::new_v4();
        if registry::uuid_in_use(db, uuid).await?
            || store.exists(&stored_filename(&uuid, format)).await?
        {
            warn!(%uuid, attempt, "Generated uuid already in use, retrying");
            continue;
        }
        return Ok(uuid);
    }
    Err(AppError::Storage(format!(
        "could not allocate a free uuid after {UUID_ATTEMPTS} attempts"
    )))
}

/// Run one image through transcode, probe, store and registry.
///
/// The size check applies to the bytes as received, before transcoding.
#[instrument(
    skip_all,
    fields(format = %input.format, size = input.bytes.len(), kind = ?input.uploader.kind)
)]
pub async fn ingest(
    db: &DatabaseConnection,
    store: &dyn ImageStore,
    max_size: u64,
    policy: TranscodePolicy,
    input: Ingestion,
) -> Result<Ingested, AppError> {
    check_size(input.bytes.len() as u64, max_size)?;

    let Ingestion {
        bytes,
        original_name,
        format,
        uploader,
        source_url,
        ip,
    } = input;

    let (bytes, format, is_webp) =
        if transcode::should_transcode(&format, policy.convert_to_webp) {
            let quality = policy.quality;
            let webp = tokio::task::spawn_blocking(move || {
                transcode::transcode_to_webp(&bytes, quality)
            })
            .await
            .map_err(|e| AppError::Internal(format!("Transcode task failed: {e}")))??;
            (webp, "webp".to_string(), true)
        } else {
            (bytes, format, false)
        };

    let dimensions = transcode::image_dimensions(&bytes);

    let uuid = allocate_uuid(db, store, &format).await?;
    let filename = stored_filename(&uuid, &format);
    store.put(&filename, &bytes).await?;

    let new = NewImage {
        uuid,
        original_name,
        format,
        size: bytes.len() as i64,
        width: dimensions.width as i32,
        height: dimensions.height as i32,
        is_webp,
        uploaded_by: uploader.name,
        uploaded_by_type: uploader.kind,
        api_key_id: uploader.api_key_id,
        source_url,
        ip,
    };

    let record = match registry::insert_image(db, new).await {
        Ok(record) => record,
        Err(err) => {
            if let Err(cleanup) = store.remove(&filename).await {
                warn!(%filename, error = %cleanup, "Failed to remove orphaned file");
            }
            return Err(err.into());
        }
    };

    info!(uuid = %record.uuid, %filename, size = record.size, "Image ingested");
    Ok(Ingested { record, bytes })
}
