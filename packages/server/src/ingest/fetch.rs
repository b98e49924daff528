use std::time::Duration;

use futures::StreamExt;
use reqwest::{Client, Url, redirect};
use tracing::{debug, instrument};

use super::IngestError;
use super::headers::random_headers;

/// Extension used when neither the URL nor the content type names a format.
const DEFAULT_EXTENSION: &str = "jpg";

/// A downloaded remote image.
#[derive(Debug)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
    /// Lowercase extension resolved from the URL path or content type.
    pub extension: String,
    /// Last URL path segment, with `.{extension}` appended if it had none.
    pub original_name: String,
}

/// Downloads remote images under a time bound and a size cap.
pub struct RemoteFetcher {
    client: Client,
    timeout: Duration,
    max_size: u64,
}

impl RemoteFetcher {
    pub fn new(timeout: Duration, max_size: u64) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(redirect::Policy::limited(10))
            .build()?;
        Ok(Self {
            client,
            timeout,
            max_size,
        })
    }

    /// Download `raw_url`.
    ///
    /// The whole exchange, body included, is bounded by the configured
    /// timeout; when it elapses the transfer is dropped and
    /// [`IngestError::Timeout`] returned.
    #[instrument(skip(self))]
    pub async fn fetch(&self, raw_url: &str) -> Result<FetchedImage, IngestError> {
        let url = parse_http_url(raw_url)?;

        match tokio::time::timeout(self.timeout, self.download(&url)).await {
            Ok(result) => result,
            Err(_) => Err(IngestError::Timeout),
        }
    }

    async fn download(&self, url: &Url) -> Result<FetchedImage, IngestError> {
        let response = self
            .client
            .get(url.clone())
            .headers(random_headers(url))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::InvalidInput(format!(
                "Failed to download image: HTTP {}",
                status.as_u16()
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.starts_with("image/") {
            return Err(IngestError::InvalidInput(
                "URL does not point to a valid image".into(),
            ));
        }

        if let Some(declared) = response.content_length()
            && declared > self.max_size
        {
            return Err(IngestError::TooLarge {
                limit: self.max_size,
            });
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(transport_error)?;
            if (bytes.len() + chunk.len()) as u64 > self.max_size {
                debug!(limit = self.max_size, "Aborting download over size limit");
                return Err(IngestError::TooLarge {
                    limit: self.max_size,
                });
            }
            bytes.extend_from_slice(&chunk);
        }

        let extension = resolve_extension(url, &content_type);
        let original_name = original_name(url, &extension);

        Ok(FetchedImage {
            bytes,
            content_type,
            extension,
            original_name,
        })
    }
}

fn transport_error(err: reqwest::Error) -> IngestError {
    if err.is_timeout() {
        IngestError::Timeout
    } else {
        IngestError::InvalidInput(format!("Failed to download image: {err}"))
    }
}

/// Parse `raw` and require an `http` or `https` scheme.
pub fn parse_http_url(raw: &str) -> Result<Url, IngestError> {
    let url = Url::parse(raw.trim()).map_err(|_| IngestError::InvalidInput("Invalid URL".into()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(IngestError::InvalidInput("Invalid URL".into())),
    }
}

/// Prefer the URL path's trailing `.ext`, then the content type, then `jpg`.
pub fn resolve_extension(url: &Url, content_type: &str) -> String {
    let path = url.path().to_ascii_lowercase();
    if let Some((_, ext)) = path.rsplit_once('.')
        && common::format::is_valid_extension(ext)
    {
        return ext.to_string();
    }
    common::format::extension_for_mime(content_type)
        .unwrap_or(DEFAULT_EXTENSION)
        .to_string()
}

fn original_name(url: &Url, extension: &str) -> String {
    let last = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .unwrap_or("image");
    if last.contains('.') {
        last.to_string()
    } else {
        format!("{last}.{extension}")
    }
}
