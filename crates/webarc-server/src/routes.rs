use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{Json, Path, Request, State};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use webarc_cgi::{CgiError, CgiRequest, CgiResponse};
use webarc_fetch::{DownloadOrigin, DownloadRegistry, DownloadStatus, HttpClient};
use webarc_mount::MountTable;

use crate::error::ServeError;
use crate::game::GameContentService;
use crate::key::request_key;
use crate::service::{ContentService, Resolved, Served};

/// Request bodies larger than this are rejected before CGI dispatch.
const MAX_BODY: usize = 8 * 1024 * 1024;

const X_SOURCE: HeaderName = HeaderName::from_static("x-source");

/// Shared state behind both routers.
pub struct AppState<C: HttpClient> {
    pub content: Arc<ContentService<C>>,
    pub games: Arc<GameContentService<C>>,
    pub mounts: Arc<MountTable>,
    pub registry: Arc<DownloadRegistry>,
    pub cors_enabled: bool,
}

impl<C: HttpClient> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            content: Arc::clone(&self.content),
            games: Arc::clone(&self.games),
            mounts: Arc::clone(&self.mounts),
            registry: Arc::clone(&self.registry),
            cors_enabled: self.cors_enabled,
        }
    }
}

/// The general-purpose content surface: every path falls through the
/// resolution pipeline.
pub fn content_router<C: HttpClient + 'static>(state: AppState<C>) -> Router {
    Router::new()
        .fallback(serve_content::<C>)
        .with_state(state)
}

/// The archive surface: mount management, download introspection, the
/// on-demand game fetch entry point, and content served from mounts only.
pub fn game_router<C: HttpClient + 'static>(state: AppState<C>) -> Router {
    Router::new()
        .route(
            "/mount/{id}",
            post(mount_archive::<C>).delete(unmount_archive::<C>),
        )
        .route("/mounts", get(list_mounts::<C>))
        .route("/downloads", get(list_downloads::<C>))
        .route("/game/{id}", post(fetch_game::<C>))
        .fallback(serve_from_mounts::<C>)
        .with_state(state)
}

async fn serve_content<C: HttpClient + 'static>(
    State(state): State<AppState<C>>,
    request: Request,
) -> Response {
    let (parts, body) = request.into_parts();
    let head_only = parts.method == Method::HEAD;
    if parts.method == Method::OPTIONS {
        return preflight(state.cors_enabled);
    }
    if parts.method != Method::GET && parts.method != Method::HEAD && parts.method != Method::POST
    {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let host = parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok());
    let Some(key) = request_key(&parts.uri.to_string(), host) else {
        return (StatusCode::BAD_REQUEST, "cannot determine request host").into_response();
    };

    let body = if parts.method == Method::POST {
        match axum::body::to_bytes(body, MAX_BODY).await {
            Ok(bytes) if bytes.is_empty() => None,
            Ok(bytes) => Some(bytes),
            Err(_) => return StatusCode::PAYLOAD_TOO_LARGE.into_response(),
        }
    } else {
        None
    };

    let cgi_request = CgiRequest {
        method: parts.method.to_string(),
        script_name: format!("/{}", key.path),
        // Raw, pre-decode: the executor applies its own filter.
        query: parts.uri.query().unwrap_or("").to_string(),
        headers: parts
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect(),
        body,
    };

    match state.content.serve(&key, cgi_request).await {
        Ok(Served::Static(resolved)) => {
            static_response(resolved, state.cors_enabled, head_only)
        }
        Ok(Served::Script(response)) => {
            script_response(response, state.cors_enabled, head_only)
        }
        Err(err) => error_response(err),
    }
}

async fn serve_from_mounts<C: HttpClient + 'static>(
    State(state): State<AppState<C>>,
    request: Request,
) -> Response {
    let method = request.method().clone();
    let head_only = method == Method::HEAD;
    if method != Method::GET && method != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok());
    let relative = match request_key(&request.uri().to_string(), host) {
        Some(key) => key.relative(),
        None => request.uri().path().trim_start_matches('/').to_string(),
    };

    let mounts = Arc::clone(&state.mounts);
    let lookup = relative.clone();
    let hit = match tokio::task::spawn_blocking(move || mounts.find(&lookup)).await {
        Ok(hit) => hit,
        Err(e) => {
            tracing::error!(error = %e, "mount lookup task failed");
            None
        }
    };
    match hit {
        Some(hit) => static_response(
            Resolved {
                content_type: crate::mime::content_type_for(&relative),
                data: Bytes::from(hit.data),
                source: crate::service::SourceTag::GameZip(hit.mount_id),
            },
            state.cors_enabled,
            head_only,
        ),
        None => error_response(ServeError::NotFound { key: relative }),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MountRequest {
    zip_path: PathBuf,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MountResponse {
    success: bool,
    id: String,
    zip_path: PathBuf,
}

async fn mount_archive<C: HttpClient + 'static>(
    State(state): State<AppState<C>>,
    Path(id): Path<String>,
    Json(body): Json<MountRequest>,
) -> Response {
    let mounts = Arc::clone(&state.mounts);
    let mount_id = id.clone();
    let zip_path = body.zip_path.clone();
    let outcome =
        tokio::task::spawn_blocking(move || mounts.mount(&mount_id, &zip_path)).await;
    match outcome {
        Ok(Ok(())) => Json(MountResponse {
            success: true,
            id,
            zip_path: body.zip_path,
        })
        .into_response(),
        Ok(Err(e)) => {
            tracing::warn!(id, error = %e, "mount failed");
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "mount task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn unmount_archive<C: HttpClient + 'static>(
    State(state): State<AppState<C>>,
    Path(id): Path<String>,
) -> Response {
    if state.mounts.unmount(&id) {
        Json(serde_json::json!({ "success": true, "id": id })).into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

async fn list_mounts<C: HttpClient + 'static>(State(state): State<AppState<C>>) -> Response {
    let mounts: Vec<_> = state
        .mounts
        .list()
        .into_iter()
        .map(|m| {
            serde_json::json!({
                "id": m.id,
                "zipPath": m.archive_path,
            })
        })
        .collect();
    Json(serde_json::json!({ "mounts": mounts })).into_response()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DownloadView {
    asset_id: String,
    data_id: Option<i64>,
    origin: &'static str,
    started_at: String,
    status: &'static str,
}

async fn list_downloads<C: HttpClient + 'static>(State(state): State<AppState<C>>) -> Response {
    let downloads: Vec<_> = state
        .registry
        .list()
        .into_iter()
        .map(|e| DownloadView {
            asset_id: e.asset_id,
            data_id: e.secondary_id,
            origin: match e.origin {
                DownloadOrigin::Orchestrator => "orchestrator",
                DownloadOrigin::OnDemandServer => "on-demand-server",
            },
            started_at: e.started_at.to_rfc3339(),
            status: match e.status {
                DownloadStatus::Downloading => "downloading",
                DownloadStatus::Completed => "completed",
                DownloadStatus::Failed => "failed",
            },
        })
        .collect();
    Json(serde_json::json!({ "downloads": downloads })).into_response()
}

async fn fetch_game<C: HttpClient + 'static>(
    State(state): State<AppState<C>>,
    Path(id): Path<String>,
) -> Response {
    match state.games.ensure_mounted(&id).await {
        Ok(path) => Json(serde_json::json!({
            "success": true,
            "id": id,
            "path": path,
        }))
        .into_response(),
        Err(err) => error_response(err),
    }
}

fn preflight(cors_enabled: bool) -> Response {
    if !cors_enabled {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }
    let mut response = StatusCode::NO_CONTENT.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, HEAD, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("*"),
    );
    response
}

fn static_response(resolved: Resolved, cors_enabled: bool, head_only: bool) -> Response {
    let length = resolved.data.len();
    let body = if head_only {
        Body::empty()
    } else {
        Body::from(resolved.data)
    };
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(resolved.content_type),
    );
    if let Ok(value) = HeaderValue::from_str(&length.to_string()) {
        headers.insert(header::CONTENT_LENGTH, value);
    }
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=86400"),
    );
    if let Ok(value) = HeaderValue::from_str(&resolved.source.to_string()) {
        headers.insert(X_SOURCE, value);
    }
    if cors_enabled {
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
    }
    response
}

fn script_response(cgi: CgiResponse, cors_enabled: bool, head_only: bool) -> Response {
    let status = StatusCode::from_u16(cgi.status).unwrap_or(StatusCode::OK);
    let body = if head_only {
        Body::empty()
    } else {
        Body::from(cgi.body)
    };
    let mut response = Response::new(body);
    *response.status_mut() = status;
    let headers = response.headers_mut();
    for (name, value) in &cgi.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }
    if !headers.contains_key(header::CONTENT_TYPE) {
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(webarc_cgi::DEFAULT_CONTENT_TYPE),
        );
    }
    if cors_enabled {
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
    }
    response
}

fn error_response(err: ServeError) -> Response {
    let status = match &err {
        ServeError::NotFound { .. } | ServeError::UnknownGame(_) => StatusCode::NOT_FOUND,
        ServeError::DownloadInFlight(_) => StatusCode::SERVICE_UNAVAILABLE,
        ServeError::Cgi(CgiError::ScriptNotFound(_)) => StatusCode::NOT_FOUND,
        ServeError::Cgi(CgiError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
        ServeError::Cgi(_) | ServeError::Fetch(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::NOT_FOUND {
        tracing::debug!(error = %err, "request not satisfied");
    } else {
        tracing::warn!(error = %err, "request failed");
    }
    (status, err.to_string()).into_response()
}
