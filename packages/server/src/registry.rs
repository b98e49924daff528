//! Image record persistence.
//!
//! Records are inserted once per successful ingestion and never updated
//! here. Moderation flags are written elsewhere; readers must respect them.

use chrono::Utc;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::entity::image::{self, UploaderKind};

/// Everything the ingestion pipeline knows about a new image.
#[derive(Debug, Clone)]
pub struct NewImage {
    pub uuid: Uuid,
    pub original_name: String,
    pub format: String,
    pub size: i64,
    pub width: i32,
    pub height: i32,
    pub is_webp: bool,
    pub uploaded_by: String,
    pub uploaded_by_type: UploaderKind,
    pub api_key_id: Option<Uuid>,
    pub source_url: Option<String>,
    pub ip: String,
}

/// Insert exactly one image record and return it.
///
/// A duplicate `uuid` surfaces as a database error; nothing is overwritten.
pub async fn insert_image<C: ConnectionTrait>(
    db: &C,
    new: NewImage,
) -> Result<image::Model, sea_orm::DbErr> {
    let now = Utc::now();
    let model = image::ActiveModel {
        id: Set(Uuid::now_v7()),
        uuid: Set(new.uuid),
        original_name: Set(new.original_name),
        format: Set(new.format),
        size: Set(new.size),
        width: Set(new.width),
        height: Set(new.height),
        is_webp: Set(new.is_webp),
        is_deleted: Set(false),
        is_nsfw: Set(false),
        uploaded_by: Set(new.uploaded_by),
        uploaded_by_type: Set(new.uploaded_by_type),
        api_key_id: Set(new.api_key_id),
        source_url: Set(new.source_url),
        ip: Set(new.ip),
        uploaded_at: Set(now),
        updated_at: Set(now),
    };

    image::Entity::insert(model).exec_with_returning(db).await
}

pub async fn find_by_uuid<C: ConnectionTrait>(
    db: &C,
    uuid: Uuid,
) -> Result<Option<image::Model>, sea_orm::DbErr> {
    image::Entity::find()
        .filter(image::Column::Uuid.eq(uuid))
        .one(db)
        .await
}

/// Whether any record, deleted or not, already uses `uuid`.
pub async fn uuid_in_use<C: ConnectionTrait>(db: &C, uuid: Uuid) -> Result<bool, sea_orm::DbErr> {
    let count = image::Entity::find()
        .filter(image::Column::Uuid.eq(uuid))
        .count(db)
        .await?;
    Ok(count > 0)
}
