use std::io::Cursor;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use chrono::Utc;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use reqwest::Client;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set,
};
use serde_json::Value;
use tempfile::TempDir;
use uuid::Uuid;

use ::common::storage::FilesystemImageStore;
use server::config::{
    AppConfig, AuthConfig, CorsConfig, DatabaseConfig, NotifyConfig, ServerConfig, StorageConfig,
    UploadConfig,
};
use server::entity::{api_key, image as image_entity};
use server::state::AppState;

pub const API_KEY: &str = "test-api-key";
pub const DISABLED_API_KEY: &str = "disabled-api-key";
pub const API_KEY_NAME: &str = "integration-bot";
const JWT_SECRET: &str = "test-secret-for-integration-tests";

pub mod routes {
    pub const UPLOAD_PRIVATE: &str = "/api/upload/private";
    pub const UPLOAD_URL: &str = "/api/upload/url";
    pub const UPLOAD_ADMIN: &str = "/api/upload";
    pub const OPENAPI: &str = "/api-docs/openapi.json";

    pub fn image(file: &str) -> String {
        format!("/i/{file}")
    }
}

/// A running test server over a throwaway SQLite database and storage root.
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    pub db: DatabaseConnection,
    pub storage_root: PathBuf,
    /// Admin session token signed with the test secret.
    pub session: String,
    _db_dir: TempDir,
    _storage_dir: TempDir,
}

/// Parsed HTTP response for test assertions.
pub struct TestResponse {
    pub status: u16,
    /// Raw response body as text.
    pub text: String,
    /// Parsed JSON body, or `Null` if the response is not valid JSON.
    pub body: Value,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    /// Spawn with a tweaked upload policy.
    pub async fn spawn_with(configure: impl FnOnce(&mut UploadConfig)) -> Self {
        let db_dir = tempfile::tempdir().expect("Failed to create database dir");
        let storage_dir = tempfile::tempdir().expect("Failed to create storage dir");
        let db_url = format!("sqlite://{}?mode=rwc", db_dir.path().join("test.db").display());

        let db = server::database::init_db(&db_url)
            .await
            .expect("Failed to initialize test database");
        seed_api_keys(&db).await;

        let mut upload = UploadConfig::default();
        configure(&mut upload);

        let app_config = AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                cors: CorsConfig {
                    allow_origins: vec![],
                    max_age: 3600,
                },
                site_url: None,
            },
            database: DatabaseConfig { url: db_url },
            auth: AuthConfig {
                jwt_secret: JWT_SECRET.to_string(),
            },
            storage: StorageConfig {
                root: storage_dir.path().to_path_buf(),
            },
            upload,
            notify: NotifyConfig::default(),
        };
        app_config.validate().expect("Test config should be valid");

        let store = FilesystemImageStore::new(app_config.storage.root.clone())
            .await
            .expect("Failed to create image store");
        let state = AppState::new(app_config, db.clone(), Arc::new(store))
            .expect("Failed to build application state");
        let app = server::build_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        let session = server::auth::sign_session(JWT_SECRET, "admin", chrono::Duration::hours(1))
            .expect("Failed to sign session");

        Self {
            addr,
            client: Client::new(),
            db,
            storage_root: storage_dir.path().to_path_buf(),
            session,
            _db_dir: db_dir,
            _storage_dir: storage_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Multipart upload to the API-key endpoint with `X-API-Key`.
    pub async fn upload_file(
        &self,
        file_name: &str,
        mime: &str,
        file_bytes: Vec<u8>,
        api_key: Option<&str>,
    ) -> TestResponse {
        let part = reqwest::multipart::Part::bytes(file_bytes)
            .file_name(file_name.to_string())
            .mime_str(mime)
            .expect("Failed to set MIME type");
        let form = reqwest::multipart::Form::new().part("file", part);

        let mut req = self.client.post(self.url(routes::UPLOAD_PRIVATE)).multipart(form);
        if let Some(key) = api_key {
            req = req.header("X-API-Key", key);
        }
        let res = req.send().await.expect("Failed to send multipart upload request");

        TestResponse::from_response(res).await
    }

    /// Multipart upload to the admin endpoint with an optional bearer token.
    pub async fn upload_admin(
        &self,
        file_name: &str,
        file_bytes: Vec<u8>,
        token: Option<&str>,
    ) -> TestResponse {
        let part = reqwest::multipart::Part::bytes(file_bytes).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);

        let mut req = self.client.post(self.url(routes::UPLOAD_ADMIN)).multipart(form);
        if let Some(token) = token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }
        let res = req.send().await.expect("Failed to send admin upload request");

        TestResponse::from_response(res).await
    }

    pub async fn post_with_key(&self, path: &str, body: &Value, api_key: &str) -> TestResponse {
        let res = self
            .client
            .post(self.url(path))
            .header("X-API-Key", api_key)
            .json(body)
            .send()
            .await
            .expect("Failed to send POST request");

        TestResponse::from_response(res).await
    }

    pub async fn post_with_token(&self, path: &str, body: &Value, token: &str) -> TestResponse {
        let res = self
            .client
            .post(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .json(body)
            .send()
            .await
            .expect("Failed to send POST request");

        TestResponse::from_response(res).await
    }

    pub async fn post_without_auth(&self, path: &str, body: &Value) -> TestResponse {
        let res = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to send POST request");

        TestResponse::from_response(res).await
    }

    /// Raw GET, for header and byte assertions.
    pub async fn get(&self, path: &str, if_none_match: Option<&str>) -> reqwest::Response {
        let mut req = self.client.get(self.url(path));
        if let Some(etag) = if_none_match {
            req = req.header("If-None-Match", etag);
        }
        req.send().await.expect("Failed to send GET request")
    }

    /// Upload a small PNG with the valid API key and return the response data.
    pub async fn upload_png(&self) -> Value {
        let res = self
            .upload_file("cat.png", "image/png", png(6, 4), Some(API_KEY))
            .await;
        assert_eq!(res.status, 200, "upload failed: {}", res.text);
        res.body["data"].clone()
    }

    pub async fn find_image(&self, uuid: &str) -> image_entity::Model {
        let uuid = Uuid::parse_str(uuid).expect("uuid should parse");
        server::registry::find_by_uuid(&self.db, uuid)
            .await
            .expect("DB query failed")
            .expect("Image record should exist")
    }

    /// Apply moderation flags the way an admin tool would, bumping `updated_at`.
    pub async fn moderate(&self, uuid: &str, deleted: bool, nsfw: bool) {
        let mut active: image_entity::ActiveModel = self.find_image(uuid).await.into();
        active.is_deleted = Set(deleted);
        active.is_nsfw = Set(nsfw);
        active.updated_at = Set(Utc::now());
        active.update(&self.db).await.expect("Failed to update image");
    }

    pub async fn image_count(&self) -> u64 {
        image_entity::Entity::find()
            .count(&self.db)
            .await
            .expect("DB count failed")
    }

    /// Files published in the content directory, excluding temp files.
    pub fn stored_files(&self) -> Vec<String> {
        std::fs::read_dir(&self.storage_root)
            .expect("storage root should exist")
            .filter_map(Result::ok)
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect()
    }

    pub async fn records_from(&self, kind: image_entity::UploaderKind) -> Vec<image_entity::Model> {
        image_entity::Entity::find()
            .filter(image_entity::Column::UploadedByType.eq(kind))
            .all(&self.db)
            .await
            .expect("DB query failed")
    }
}

async fn seed_api_keys(db: &DatabaseConnection) {
    for (key, name, enabled) in [
        (API_KEY, API_KEY_NAME, true),
        (DISABLED_API_KEY, "retired-bot", false),
    ] {
        api_key::ActiveModel {
            id: Set(Uuid::now_v7()),
            key: Set(key.to_string()),
            name: Set(name.to_string()),
            enabled: Set(enabled),
            created_at: Set(Utc::now()),
        }
        .insert(db)
        .await
        .expect("Failed to seed api key");
    }
}

/// Serve `app` on an ephemeral port and return its base URL.
pub async fn spawn_origin(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind origin");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format).expect("Failed to encode test image");
    buf.into_inner()
}

fn solid(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([40, 120, 200, 255])))
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    encode(solid(width, height), ImageFormat::Png)
}

pub fn gif(width: u32, height: u32) -> Vec<u8> {
    encode(solid(width, height), ImageFormat::Gif)
}

impl TestResponse {
    pub async fn from_response(res: reqwest::Response) -> Self {
        let status = res.status().as_u16();
        let text = res.text().await.unwrap_or_default();
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        Self { status, text, body }
    }

    pub fn code(&self) -> &str {
        self.body["code"].as_str().unwrap_or_default()
    }
}
