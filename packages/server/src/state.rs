use std::sync::Arc;
use std::time::Duration;

use common::storage::ImageStore;
use sea_orm::DatabaseConnection;
use tracing::info;

use crate::auth::{AuthResolver, DbAuthResolver};
use crate::config::AppConfig;
use crate::ingest::fetch::RemoteFetcher;
use crate::notify::{LogNotifier, Notifier, WebhookNotifier};

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn ImageStore>,
    pub fetcher: Arc<RemoteFetcher>,
    pub auth: Arc<dyn AuthResolver>,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    /// Wire the default collaborators from configuration.
    pub fn new(
        config: AppConfig,
        db: DatabaseConnection,
        store: Arc<dyn ImageStore>,
    ) -> anyhow::Result<Self> {
        let fetcher = RemoteFetcher::new(
            Duration::from_secs(config.upload.fetch_timeout_secs),
            config.upload.max_file_size,
        )?;

        let notifier: Arc<dyn Notifier> = match config.notify.webhook_url.as_deref() {
            Some(url) => {
                info!(%url, "Upload notifications via webhook");
                Arc::new(WebhookNotifier::new(url)?)
            }
            None => Arc::new(LogNotifier),
        };

        let auth = Arc::new(DbAuthResolver::new(db.clone(), config.auth.jwt_secret.clone()));

        Ok(Self {
            db,
            config: Arc::new(config),
            store,
            fetcher: Arc::new(fetcher),
            auth,
            notifier,
        })
    }
}
