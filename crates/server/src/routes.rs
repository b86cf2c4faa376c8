use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use hitter_core::shorturl::{Resolution, ShortUrlService};
use hitter_core::staging::{ObjectStaging, RetrievalError};
use hitter_core::StagedObject;
use hitter_db::DbPool;
use hitter_slack::verify::{SIGNATURE_HEADER, TIMESTAMP_HEADER};
use hitter_slack::{SignatureHeaders, WebhookProcessor, WebhookRequest};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use url::Url;

use crate::health;

pub const URL_EXPIRES_HEADER: &str = "x-url-expires";

#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<WebhookProcessor>,
    pub short_urls: Arc<ShortUrlService>,
    pub staging: Arc<ObjectStaging>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RetrievalQuery {
    pub expires: Option<String>,
    pub signature: Option<String>,
}

pub fn router(state: AppState, db_pool: DbPool) -> Router {
    Router::new()
        .route("/", post(webhook))
        .route("/objects/{key}", get(retrieve_object))
        .route("/{id}", get(resolve_short_url))
        .with_state(state)
        .merge(health::router(db_pool))
}

pub async fn webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let request = WebhookRequest {
        content_type: header_str(&headers, header::CONTENT_TYPE.as_str()),
        signature: SignatureHeaders {
            timestamp: header_str(&headers, TIMESTAMP_HEADER),
            signature: header_str(&headers, SIGNATURE_HEADER),
        },
        body: &body,
    };
    let outcome = state.processor.process(request).await;
    let status = StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(outcome.body)).into_response()
}

pub async fn resolve_short_url(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.short_urls.resolve(&id).await {
        Ok(Resolution::Found(record)) => {
            let Some(location) = location_header(&record.long_url) else {
                warn!(
                    event_name = "shorturl.unusable_location",
                    short_id = %record.id,
                    "stored URL can not be sent as a Location header"
                );
                return error_response(StatusCode::NOT_FOUND, "not_found", "short URL not found");
            };
            info!(event_name = "shorturl.resolved", short_id = %record.id, "short URL resolved");
            let mut response = StatusCode::FOUND.into_response();
            let headers = response.headers_mut();
            headers.insert(header::LOCATION, location);
            if let Ok(expires) = HeaderValue::from_str(&http_date(record.expires_at)) {
                headers.insert(HeaderName::from_static(URL_EXPIRES_HEADER), expires);
            }
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
            response
        }
        Ok(Resolution::NotFound) => {
            info!(event_name = "shorturl.not_found", short_id = %id, "short URL not found");
            error_response(StatusCode::NOT_FOUND, "not_found", "short URL not found")
        }
        Err(error) => {
            warn!(
                event_name = "shorturl.store_failed",
                short_id = %id,
                error = %error,
                "short URL lookup failed"
            );
            error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "storage_unavailable",
                "short URL storage is unavailable",
            )
        }
    }
}

pub async fn retrieve_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<RetrievalQuery>,
) -> Response {
    let (Some(expires), Some(signature)) =
        (query.expires.as_deref().and_then(|raw| raw.parse::<i64>().ok()), query.signature)
    else {
        return error_response(StatusCode::FORBIDDEN, "forbidden", "link is not signed");
    };

    match state.staging.retrieve(&key, expires, &signature).await {
        Ok(object) => {
            info!(
                event_name = "staging.object_served",
                object_key = %object.key,
                size_bytes = object.size_bytes,
                "staged object served"
            );
            object_response(object)
        }
        Err(RetrievalError::InvalidSignature) => {
            error_response(StatusCode::FORBIDDEN, "forbidden", "signature does not match")
        }
        Err(RetrievalError::LinkExpired) => {
            error_response(StatusCode::FORBIDDEN, "link_expired", "link expired")
        }
        Err(RetrievalError::NotFound) => {
            error_response(StatusCode::NOT_FOUND, "not_found", "object not found")
        }
        Err(RetrievalError::Store(error)) => {
            warn!(
                event_name = "staging.store_failed",
                object_key = %key,
                error = %error,
                "staged object lookup failed"
            );
            error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "storage_unavailable",
                "object storage is unavailable",
            )
        }
    }
}

fn object_response(object: StagedObject) -> Response {
    let content_type = HeaderValue::from_str(&object.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&content_disposition(&object.file_name))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    let mut response = (StatusCode::OK, object.bytes).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("private, no-store"));
    if let Ok(etag) = HeaderValue::from_str(&format!("\"{}\"", object.content_digest)) {
        headers.insert(header::ETAG, etag);
    }
    response
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (status, Json(json!({ "error": code, "message": message }))).into_response()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Reserialized through `Url` so non-ASCII paths arrive percent-encoded.
fn location_header(long_url: &str) -> Option<HeaderValue> {
    let normalized = Url::parse(long_url).ok()?;
    HeaderValue::from_str(normalized.as_str()).ok()
}

/// IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// ASCII `filename` fallback plus an RFC 5987 `filename*` for the exact name.
fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|ch| if ch.is_ascii_graphic() || ch == ' ' { ch } else { '_' })
        .filter(|ch| !matches!(ch, '"' | '\\'))
        .collect();
    if fallback == file_name {
        return format!("attachment; filename=\"{file_name}\"");
    }

    let mut encoded = String::with_capacity(file_name.len() * 3);
    for byte in file_name.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}
