use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    lifecycle::{self, NewSecret, SecretError},
    AppState,
};

// ── Health ────────────────────────────────────────────────────────────────────

pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

// ── Store ─────────────────────────────────────────────────────────────────────

/// `ttl` is in hours. Missing or `0` means no expiry; same for `reads`.
#[derive(Debug, Deserialize)]
pub struct StoreRequest {
    pub encrypted: Option<String>,
    pub iv: Option<String>,
    pub ttl: Option<u32>,
    pub reads: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreResponse {
    pub id: String,
    pub ttl: Option<u32>,
    pub reads: Option<u32>,
    pub expires_at: Option<String>,
    pub url: String,
}

pub async fn store_secret(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<StoreRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(&rejection.body_text()),
    };

    let new = NewSecret {
        encrypted: body.encrypted.unwrap_or_default(),
        iv: body.iv.unwrap_or_default(),
        ttl_hours: body.ttl,
        reads: body.reads,
    };

    match state.secrets.create(new) {
        Ok(created) => {
            let origin = request_origin(state.public_url.as_deref(), &headers);
            let expires_at = created.expires_at_iso();
            Json(StoreResponse {
                url: lifecycle::share_url(&origin, &created.id),
                id: created.id,
                ttl: created.ttl_hours,
                reads: created.reads,
                expires_at,
            })
            .into_response()
        }
        Err(e) => error_response(e),
    }
}

// ── Load ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoadParams {
    pub id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadResponse {
    pub encrypted: String,
    pub iv: String,
    pub remaining_reads: Option<u32>,
}

pub async fn load_secret(
    State(state): State<AppState>,
    Query(params): Query<LoadParams>,
) -> Response {
    let id = params.id.unwrap_or_default();
    match state.secrets.load(&id).await {
        Ok(loaded) => Json(LoadResponse {
            encrypted: loaded.encrypted,
            iv: loaded.iv,
            remaining_reads: loaded.remaining_reads,
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Origin for share URLs: the configured public URL, else the request's
/// `Host` (with `X-Forwarded-Proto` when behind a proxy).
fn request_origin(public_url: Option<&str>, headers: &HeaderMap) -> String {
    if let Some(url) = public_url {
        return url.trim_end_matches('/').to_owned();
    }
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("http");
    format!("{scheme}://{host}")
}

fn error_response(e: SecretError) -> Response {
    match e {
        SecretError::MissingField(field) => bad_request(&format!("missing {field}")),
        SecretError::InvalidField(field) => bad_request(&format!("invalid {field}")),
        SecretError::NotFound => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "secret not found"})),
        )
            .into_response(),
        SecretError::Internal(e) => internal_error(e),
    }
}

fn bad_request(msg: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
}

fn internal_error(e: anyhow::Error) -> Response {
    tracing::error!(error = %format!("{e:#}"), "internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "internal server error"})),
    )
        .into_response()
}
