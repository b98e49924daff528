use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::api_key;
use crate::error::AppError;

/// A caller authenticated by API key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyIdentity {
    pub id: Uuid,
    /// Recorded as the uploader name.
    pub name: String,
}

/// A caller authenticated by an admin session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub username: String,
}

/// Turns raw credentials into caller identities.
#[async_trait]
pub trait AuthResolver: Send + Sync {
    /// Resolve an API key. Unknown or disabled keys are `Unauthorized`.
    async fn resolve_api_key(&self, key: &str) -> Result<ApiKeyIdentity, AppError>;

    /// Verify an admin session token.
    fn resolve_session(&self, token: &str) -> Result<SessionIdentity, AppError>;
}

/// Session JWT claims.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Username
    pub exp: usize,  // Expiration timestamp
}

/// API keys from the `api_key` table, sessions as HS256 JWTs.
pub struct DbAuthResolver {
    db: DatabaseConnection,
    jwt_secret: String,
}

impl DbAuthResolver {
    pub fn new(db: DatabaseConnection, jwt_secret: impl Into<String>) -> Self {
        Self {
            db,
            jwt_secret: jwt_secret.into(),
        }
    }
}

#[async_trait]
impl AuthResolver for DbAuthResolver {
    async fn resolve_api_key(&self, key: &str) -> Result<ApiKeyIdentity, AppError> {
        let found = api_key::Entity::find()
            .filter(api_key::Column::Key.eq(key))
            .filter(api_key::Column::Enabled.eq(true))
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid API key".into()))?;

        Ok(ApiKeyIdentity {
            id: found.id,
            name: found.name,
        })
    }

    fn resolve_session(&self, token: &str) -> Result<SessionIdentity, AppError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| AppError::Unauthorized("Invalid or expired session".into()))?;

        Ok(SessionIdentity {
            username: data.claims.sub,
        })
    }
}

/// Sign an admin session token valid for `ttl`.
pub fn sign_session(secret: &str, username: &str, ttl: Duration) -> Result<String, AppError> {
    let exp = Utc::now()
        .checked_add_signed(ttl)
        .ok_or_else(|| AppError::Internal("session expiry out of range".into()))?
        .timestamp();

    let claims = Claims {
        sub: username.to_owned(),
        exp: exp as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Failed to sign session: {e}")))
}
