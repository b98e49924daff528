use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// How an image entered the system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "kebab-case")]
pub enum UploaderKind {
    #[sea_orm(string_value = "admin-session")]
    AdminSession,
    #[sea_orm(string_value = "url-fetch")]
    UrlFetch,
    #[sea_orm(string_value = "private-api-key")]
    PrivateApiKey,
    #[sea_orm(string_value = "url-fetch-api-key")]
    UrlFetchApiKey,
}

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "image")]
pub struct Model {
    /// UUIDv7 primary key.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Public identifier; the stored file is `{uuid}.{format}`.
    #[sea_orm(unique)]
    pub uuid: Uuid,

    pub original_name: String,

    /// Lowercase extension token of the stored bytes.
    pub format: String,

    /// Size of the stored bytes.
    pub size: i64,
    pub width: i32,
    pub height: i32,

    /// Stored bytes are a transcoded copy, not the upload itself.
    pub is_webp: bool,

    pub is_deleted: bool,
    pub is_nsfw: bool,

    pub uploaded_by: String,
    pub uploaded_by_type: UploaderKind,
    pub api_key_id: Option<Uuid>,
    pub source_url: Option<String>,
    pub ip: String,

    pub uploaded_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// Name of the stored file.
    pub fn filename(&self) -> String {
        stored_filename(&self.uuid, &self.format)
    }
}

/// `{uuid}.{format}`, the only key into the content directory.
pub fn stored_filename(uuid: &Uuid, format: &str) -> String {
    format!("{}.{}", uuid.hyphenated(), format)
}

impl ActiveModelBehavior for ActiveModel {}
