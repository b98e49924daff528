//! Image format and MIME type mapping shared by ingestion and retrieval.

/// MIME type to stored extension. Parameters (`; charset=...`) must be
/// stripped before lookup.
const MIME_TO_EXTENSION: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/jpg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("image/avif", "avif"),
    ("image/svg+xml", "svg"),
    ("image/bmp", "bmp"),
    ("image/x-icon", "ico"),
    ("image/apng", "apng"),
    ("image/tiff", "tiff"),
];

/// Stored extension to the `Content-Type` served for it.
const EXTENSION_TO_MIME: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("bmp", "image/bmp"),
    ("ico", "image/x-icon"),
    ("svg", "image/svg+xml"),
    ("avif", "image/avif"),
    ("tiff", "image/tiff"),
    ("apng", "image/apng"),
];

/// Formats that may carry animation and must never be re-encoded.
const ANIMATED_LEGACY: &[&str] = &["gif"];

/// Fallback content type for formats outside the table.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Map a `Content-Type` value to a file extension.
///
/// Returns `None` when the essence is not in the table; callers decide the
/// fallback.
pub fn extension_for_mime(content_type: &str) -> Option<&'static str> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    MIME_TO_EXTENSION
        .iter()
        .find(|(mime, _)| *mime == essence)
        .map(|(_, ext)| *ext)
}

/// Map a stored extension to its content type.
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let ext = ext.to_ascii_lowercase();
    EXTENSION_TO_MIME
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
}

/// Content type for a stored extension, falling back to `application/octet-stream`.
pub fn content_type_for(ext: &str) -> &'static str {
    mime_for_extension(ext).unwrap_or(OCTET_STREAM)
}

/// Normalize the `<fmt>` token of a `data:image/<fmt>;base64,` URI.
pub fn normalize_data_uri_format(fmt: &str) -> String {
    match fmt.to_ascii_lowercase().as_str() {
        "jpeg" => "jpg".to_string(),
        "svg+xml" => "svg".to_string(),
        "x-icon" | "vnd.microsoft.icon" => "ico".to_string(),
        other => other.to_string(),
    }
}

/// Whether re-encoding this format would destroy animation frames.
pub fn is_animated_legacy(ext: &str) -> bool {
    ANIMATED_LEGACY
        .iter()
        .any(|f| f.eq_ignore_ascii_case(ext))
}

/// Whether `token` can be used as the extension part of a stored filename.
pub fn is_valid_extension(token: &str) -> bool {
    !token.is_empty() && token.len() <= 16 && token.chars().all(|c| c.is_ascii_alphanumeric())
}
