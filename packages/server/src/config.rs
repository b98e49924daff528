use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CorsConfig {
    #[serde(default)]
    pub allow_origins: Vec<String>,
    #[serde(default = "default_cors_max_age")]
    pub max_age: u64,
}

fn default_cors_max_age() -> u64 {
    3600
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub cors: CorsConfig,
    /// Public base URL used for absolute image links, e.g. `https://img.example.com`.
    /// When unset, links are built from `X-Forwarded-Proto` and `Host`.
    #[serde(default)]
    pub site_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// HS256 secret for admin session tokens.
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Content directory holding `<uuid>.<ext>` files.
    pub root: PathBuf,
}

/// Upload limits and transcode policy.
#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    /// Maximum accepted image size in bytes. Default: 100 MiB.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Re-encode non-animated uploads to WebP. Default: false.
    #[serde(default)]
    pub convert_to_webp: bool,
    /// Encoder quality for direct uploads. Default: 80.
    #[serde(default = "default_webp_quality")]
    pub webp_quality: u8,
    /// Encoder quality for URL ingestion. Default: 90.
    #[serde(default = "default_url_webp_quality")]
    pub url_webp_quality: u8,
    /// End-to-end bound on a remote fetch. Default: 30.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

fn default_max_file_size() -> u64 {
    100 * 1024 * 1024
}
fn default_webp_quality() -> u8 {
    80
}
fn default_url_webp_quality() -> u8 {
    90
}
fn default_fetch_timeout_secs() -> u64 {
    30
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            convert_to_webp: false,
            webp_quality: default_webp_quality(),
            url_webp_quality: default_url_webp_quality(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct NotifyConfig {
    /// Endpoint receiving a JSON POST per successful upload. Logging only when unset.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("IMGHOST_CONFIG").unwrap_or_else(|_| "config/config".to_string());

        let s = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("database.url", "sqlite://data/imghost.db?mode=rwc")?
            .set_default("storage.root", "./data/uploads")?
            // Load from config/config.toml
            .add_source(File::with_name(&config_path).required(false))
            // Override from environment (e.g., IMGHOST__AUTH__JWT_SECRET)
            .add_source(Environment::with_prefix("IMGHOST").separator("__"))
            .build()?;

        let config: Self = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the upload pipeline cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(ConfigError::Message("auth.jwt_secret must be set".into()));
        }
        let upload = &self.upload;
        if upload.max_file_size == 0 {
            return Err(ConfigError::Message(
                "upload.max_file_size must be greater than zero".into(),
            ));
        }
        for (name, quality) in [
            ("upload.webp_quality", upload.webp_quality),
            ("upload.url_webp_quality", upload.url_webp_quality),
        ] {
            if !(1..=100).contains(&quality) {
                return Err(ConfigError::Message(format!(
                    "{name} must be between 1 and 100, got {quality}"
                )));
            }
        }
        if upload.fetch_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "upload.fetch_timeout_secs must be greater than zero".into(),
            ));
        }
        if let Some(url) = &self.notify.webhook_url
            && reqwest::Url::parse(url).is_err()
        {
            return Err(ConfigError::Message(format!(
                "notify.webhook_url is not a valid URL: {url}"
            )));
        }
        Ok(())
    }
}
