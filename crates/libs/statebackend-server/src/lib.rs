//! HTTP adapter (component C6): wires the storage registry (C7) and
//! encryption capability (C2) from `statebackend-core` onto a single-route
//! Axum server implementing the remote-state wire protocol.

pub mod auth;
pub mod error;

use auth::BasicAuthConfig;
use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, MethodRouter};
use axum::Router;
use error::ServerError;
use statebackend_core::crypt::EncryptionProvider;
use statebackend_core::orchestrator;
use statebackend_core::storage::{RawParams, StorageClient};
use statebackend_core::types::RequestMetadata;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

/// Shared application state, built once in [`build_router`] and cloned
/// cheaply (everything inside is `Arc`) into every request.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<HashMap<String, Arc<dyn StorageClient>>>,
    pub encryption: Arc<dyn EncryptionProvider>,
    pub auth: Option<Arc<BasicAuthConfig>>,
    pub default_backend_type: String,
    pub start_time: Instant,
}

/// Builds the Axum [`Router`] serving the remote-state protocol on `/`,
/// plus a `/health` liveness endpoint.
///
/// `/` is registered once with the standard verbs bound directly and
/// `LOCK`/`UNLOCK` caught through [`MethodRouter::fallback`] — Axum's
/// `MethodFilter` bitflags only cover the standard HTTP method set, so
/// WebDAV-style extension verbs are dispatched by inspecting
/// `Method` inside the fallback rather than by registering them as a
/// named filter.
pub fn build_router(state: AppState) -> Router {
    if state.auth.is_none() {
        tracing::warn!("HTTP basic auth is disabled; this backend is serving unauthenticated requests");
    }

    let root: MethodRouter<AppState> = get(handle_get)
        .post(handle_post)
        .delete(handle_delete)
        .fallback(handle_lock_or_unlock);

    Router::new()
        .route("/", root)
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn check_auth(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(config) = &state.auth else {
        return Ok(());
    };

    let authorized = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| config.verify(v))
        .unwrap_or(false);

    if authorized {
        Ok(())
    } else {
        let mut response = StatusCode::UNAUTHORIZED.into_response();
        response
            .headers_mut()
            .insert(axum::http::header::WWW_AUTHENTICATE, config.www_authenticate_header());
        Err(response)
    }
}

/// Parses `type`/`ID` plus builds backend-specific params, connecting the
/// resolved storage client's session. Callers must call
/// [`StorageClient::disconnect`] on every exit path once done.
async fn parse_and_connect(
    state: &AppState,
    query: &RawParams,
) -> Result<(Arc<dyn StorageClient>, RequestMetadata), ServerError> {
    let backend_type = query
        .get("type")
        .cloned()
        .unwrap_or_else(|| state.default_backend_type.clone());

    let client = state
        .registry
        .get(&backend_type)
        .cloned()
        .ok_or_else(|| statebackend_core::CoreError::UnknownStorageType(backend_type.clone()))?;

    let lock_id = query.get("ID").cloned().unwrap_or_default();
    let mut meta = RequestMetadata::new(backend_type, lock_id);
    meta.params = Some(client.parse_metadata_params(query)?);

    client.connect(&meta).await?;
    Ok((client, meta))
}

async fn handle_get(
    State(state): State<AppState>,
    Query(query): Query<RawParams>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = check_auth(&state, &headers) {
        return response;
    }

    let (client, meta) = match parse_and_connect(&state, &query).await {
        Ok(pair) => pair,
        Err(e) => return e.into_response(),
    };

    let result = orchestrator::get_state(&meta, client.as_ref(), &state.encryption).await;
    let _ = client.disconnect(&meta).await;

    match result {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "application/json")],
            Bytes::from(body),
        )
            .into_response(),
        Err(e) => ServerError::from(e).into_response(),
    }
}

async fn handle_post(
    State(state): State<AppState>,
    Query(query): Query<RawParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(response) = check_auth(&state, &headers) {
        return response;
    }

    let (client, meta) = match parse_and_connect(&state, &query).await {
        Ok(pair) => pair,
        Err(e) => return e.into_response(),
    };

    let result = orchestrator::update_state(&meta, client.as_ref(), &state.encryption, &body).await;
    let _ = client.disconnect(&meta).await;

    match result {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => ServerError::from(e).into_response(),
    }
}

async fn handle_delete(
    State(state): State<AppState>,
    Query(query): Query<RawParams>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = check_auth(&state, &headers) {
        return response;
    }

    let (client, meta) = match parse_and_connect(&state, &query).await {
        Ok(pair) => pair,
        Err(e) => return e.into_response(),
    };

    let result = orchestrator::delete_state(&meta, client.as_ref()).await;
    let _ = client.disconnect(&meta).await;

    match result {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => ServerError::from(e).into_response(),
    }
}

async fn handle_lock_or_unlock(
    State(state): State<AppState>,
    Query(query): Query<RawParams>,
    headers: HeaderMap,
    method: Method,
    body: Bytes,
) -> Response {
    if let Err(response) = check_auth(&state, &headers) {
        return response;
    }

    let (client, mut meta) = match parse_and_connect(&state, &query).await {
        Ok(pair) => pair,
        Err(e) => return e.into_response(),
    };

    let result = match method.as_str() {
        "LOCK" => orchestrator::lock_state(&meta, client.as_ref(), &body).await,
        "UNLOCK" => orchestrator::unlock_state(&mut meta, client.as_ref(), &body).await,
        _ => {
            let _ = client.disconnect(&meta).await;
            return (StatusCode::BAD_REQUEST, "unsupported method").into_response();
        }
    };
    let _ = client.disconnect(&meta).await;

    match result {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => ServerError::from(e).into_response(),
    }
}

async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.start_time.elapsed().as_secs();
    (StatusCode::OK, format!("{{\"uptime_seconds\":{uptime}}}"))
}

/// Used by tests and by `statebackend-cli` to build a `Body`-level request
/// without depending on `axum::body::Body` directly at every call site.
pub fn body_from(bytes: impl Into<Vec<u8>>) -> Body {
    Body::from(bytes.into())
}
