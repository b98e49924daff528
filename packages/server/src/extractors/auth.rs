use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts, Query},
    http::{header, request::Parts},
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use uuid::Uuid;

use crate::entity::image::UploaderKind;
use crate::error::AppError;
use crate::ingest::Uploader;
use crate::state::AppState;

/// Cookie carrying the admin session token.
pub const SESSION_COOKIE: &str = "auth_token";

const API_KEY_HEADER: &str = "x-api-key";

#[derive(Deserialize)]
struct ApiKeyQuery {
    #[serde(rename = "apiKey")]
    api_key: Option<String>,
}

fn parse_authorization_bearer(value: &str) -> Option<&str> {
    let (prefix, rest) = value.trim().split_once(' ')?;
    if !prefix.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(rest.trim()).filter(|t| !t.is_empty())
}

/// `X-API-Key` header, else the `apiKey` query parameter.
fn presented_api_key(parts: &Parts) -> Option<String> {
    if let Some(value) = parts
        .headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return Some(value.to_string());
    }

    Query::<ApiKeyQuery>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(q)| q.api_key)
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
}

/// `Authorization: Bearer`, else the session cookie.
fn presented_session(parts: &Parts) -> Option<String> {
    if let Some(token) = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_authorization_bearer)
    {
        return Some(token.to_string());
    }

    CookieJar::from_headers(&parts.headers)
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

/// Caller authenticated by API key.
pub struct ApiKeyCaller {
    pub id: Uuid,
    pub name: String,
}

impl FromRequestParts<AppState> for ApiKeyCaller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let key = presented_api_key(parts)
            .ok_or_else(|| AppError::Unauthorized("API key required".into()))?;
        let identity = state.auth.resolve_api_key(&key).await?;
        Ok(ApiKeyCaller {
            id: identity.id,
            name: identity.name,
        })
    }
}

/// Caller holding a valid admin session.
pub struct SessionCaller {
    pub username: String,
}

impl FromRequestParts<AppState> for SessionCaller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = presented_session(parts)
            .ok_or_else(|| AppError::Unauthorized("Login required".into()))?;
        let identity = state.auth.resolve_session(&token)?;
        Ok(SessionCaller {
            username: identity.username,
        })
    }
}

/// Caller of the URL-ingestion endpoint: an API key when one is presented,
/// otherwise an admin session.
pub enum UrlUploadCaller {
    ApiKey(ApiKeyCaller),
    Session(SessionCaller),
}

impl UrlUploadCaller {
    pub fn uploader(self) -> Uploader {
        match self {
            UrlUploadCaller::ApiKey(caller) => Uploader {
                name: caller.name,
                kind: UploaderKind::UrlFetchApiKey,
                api_key_id: Some(caller.id),
            },
            UrlUploadCaller::Session(caller) => Uploader {
                name: caller.username,
                kind: UploaderKind::UrlFetch,
                api_key_id: None,
            },
        }
    }
}

impl FromRequestParts<AppState> for UrlUploadCaller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if presented_api_key(parts).is_some() {
            return ApiKeyCaller::from_request_parts(parts, state)
                .await
                .map(UrlUploadCaller::ApiKey);
        }
        if presented_session(parts).is_some() {
            return SessionCaller::from_request_parts(parts, state)
                .await
                .map(UrlUploadCaller::Session);
        }
        Err(AppError::Unauthorized("API key or login required".into()))
    }
}

/// Best-effort client address: first `X-Forwarded-For` entry, else the peer
/// address, else `unknown`.
pub struct ClientIp(pub String);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return Ok(ClientIp(ip.to_string()));
        }

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(ClientIp(peer))
    }
}
