use axum::extract::Multipart;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use common::format;

use super::IngestError;

/// Standard alphabet, padding optional.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Format assumed for bare base64 payloads.
const DEFAULT_BASE64_FORMAT: &str = "png";

/// An upload normalized from whichever body shape it arrived in.
#[derive(Debug, Clone)]
pub struct InputImage {
    pub bytes: Vec<u8>,
    pub original_filename: String,
    pub mime_hint: Option<String>,
    pub size: u64,
}

impl InputImage {
    fn new(bytes: Vec<u8>, original_filename: String, mime_hint: Option<String>) -> Self {
        let size = bytes.len() as u64;
        Self {
            bytes,
            original_filename,
            mime_hint,
            size,
        }
    }

    /// The stored format: the filename extension, else the MIME hint.
    pub fn format(&self) -> Result<String, IngestError> {
        if let Some((_, ext)) = self.original_filename.rsplit_once('.') {
            let ext = ext.to_ascii_lowercase();
            if format::is_valid_extension(&ext) {
                return Ok(ext);
            }
        }
        self.mime_hint
            .as_deref()
            .and_then(format::extension_for_mime)
            .map(str::to_string)
            .ok_or_else(|| IngestError::InvalidInput("Unsupported file type".into()))
    }
}

/// Split `data:image/<fmt>;base64,<data>` into `(fmt, data)`.
///
/// `fmt` must be ASCII alphanumerics, `+`, `-` or `.`. `data` may be empty.
fn split_data_uri(payload: &str) -> Option<(&str, &str)> {
    let rest = payload.strip_prefix("data:image/")?;
    let (fmt, data) = rest.split_once(";base64,")?;
    let token_char = |c: char| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.');
    if fmt.is_empty() || !fmt.chars().all(token_char) {
        return None;
    }
    Some((fmt, data))
}

/// Decode a bare base64 string or a `data:image/...;base64,` URI.
///
/// `filename` overrides the synthesized `image.<fmt>` name.
pub fn decode_base64_image(
    payload: &str,
    filename: Option<String>,
) -> Result<InputImage, IngestError> {
    let payload = payload.trim();
    let (format, data) = match split_data_uri(payload) {
        Some((fmt, data)) => (format::normalize_data_uri_format(fmt), data),
        None => (DEFAULT_BASE64_FORMAT.to_string(), payload),
    };
    if !format::is_valid_extension(&format) {
        return Err(IngestError::InvalidInput(format!(
            "Unsupported image format: {format}"
        )));
    }

    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = LENIENT_BASE64
        .decode(compact.as_bytes())
        .map_err(|e| IngestError::InvalidInput(format!("Invalid base64 image data: {e}")))?;

    if bytes.is_empty() {
        return Err(IngestError::InvalidInput(
            "Invalid base64 image data: empty payload".into(),
        ));
    }

    let original_filename = filename
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| format!("image.{format}"));
    let mime_hint = format::mime_for_extension(&format).map(str::to_string);

    Ok(InputImage::new(bytes, original_filename, mime_hint))
}

/// A body cut off by the request limit is `TooLarge`; anything else is bad input.
fn multipart_error(err: MultipartError, max_size: u64, context: &str) -> IngestError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        IngestError::TooLarge { limit: max_size }
    } else {
        IngestError::InvalidInput(format!("{context}: {err}"))
    }
}

/// Read the single file part of a multipart body.
///
/// The part named `file` wins; otherwise the first part with a filename is
/// used. Reading stops as soon as `max_size` is exceeded.
pub async fn read_multipart_image(
    mut multipart: Multipart,
    max_size: u64,
) -> Result<InputImage, IngestError> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_size, "Multipart error"))?
    {
        let is_file = field.name() == Some("file") || field.file_name().is_some();
        if !is_file {
            continue;
        }

        let original_filename = field
            .file_name()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or("image")
            .to_string();
        let mime_hint = field
            .content_type()
            .filter(|ct| *ct != "application/octet-stream")
            .map(str::to_string)
            .or_else(|| {
                mime_guess::from_path(&original_filename)
                    .first()
                    .map(|m| m.essence_str().to_string())
            });

        let mut bytes = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| multipart_error(e, max_size, "Upload read error"))?
        {
            if (bytes.len() + chunk.len()) as u64 > max_size {
                return Err(IngestError::TooLarge { limit: max_size });
            }
            bytes.extend_from_slice(&chunk);
        }

        if bytes.is_empty() {
            return Err(IngestError::InvalidInput("Uploaded file is empty".into()));
        }

        return Ok(InputImage::new(bytes, original_filename, mime_hint));
    }

    Err(IngestError::InvalidInput(
        "No image provided: send multipart/form-data with a file field or JSON with base64"
            .into(),
    ))
}
