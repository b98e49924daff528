use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entity::image::UploaderKind;

/// Sent once per successful upload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadEvent {
    pub id: Uuid,
    pub filename: String,
    pub format: String,
    pub size: i64,
    /// Absolute image URL.
    pub url: String,
    pub uploader_name: String,
    pub uploader_type: UploaderKind,
    pub ip: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &UploadEvent) -> anyhow::Result<()>;
}

/// Logs each event.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &UploadEvent) -> anyhow::Result<()> {
        info!(
            id = %event.id,
            filename = %event.filename,
            size = event.size,
            url = %event.url,
            uploader = %event.uploader_name,
            "Upload notification"
        );
        Ok(())
    }
}

/// POSTs each event as JSON.
pub struct WebhookNotifier {
    client: reqwest::Client,
    endpoint: reqwest::Url,
}

impl WebhookNotifier {
    pub fn new(endpoint: &str) -> anyhow::Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()?,
            endpoint: reqwest::Url::parse(endpoint)?,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &UploadEvent) -> anyhow::Result<()> {
        self.client
            .post(self.endpoint.clone())
            .json(event)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Deliver `event` in the background. Failures are logged and never reach
/// the uploader.
pub fn dispatch(notifier: Arc<dyn Notifier>, event: UploadEvent) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(&event).await {
            warn!(id = %event.id, error = %e, "Failed to send upload notification");
        }
    })
}

/// `{base}/i/{filename}`, where `base` is `site_url` or the request's
/// forwarded scheme and host. Trailing slashes on `base` are dropped.
pub fn absolute_image_url(
    site_url: Option<&str>,
    forwarded_proto: Option<&str>,
    host: Option<&str>,
    filename: &str,
) -> String {
    let base = match site_url.filter(|s| !s.trim().is_empty()) {
        Some(site) => site.trim().to_string(),
        None => format!(
            "{}://{}",
            forwarded_proto.unwrap_or("http"),
            host.unwrap_or("localhost")
        ),
    };
    format!("{}/i/{filename}", base.trim_end_matches('/'))
}
