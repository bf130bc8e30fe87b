//! HTTP server.
//!
//! Serves the health API under `/api` (see [`crate::routes`]) together with
//! the assistant tool endpoints. Tools are registered in a [`ToolRegistry`]
//! and dispatched through a single `POST /tools/{name}` handler.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Liveness plus crate version |
//! | `GET`  | `/tools/list` | Registered tools and their parameter schemas |
//! | `POST` | `/tools/{name}` | Call a registered tool by name |
//! | `*`    | `/api/...` | Health logs, schedules, cycle, profile, points, chat, ... |
//!
//! # Authentication
//!
//! An upstream proxy authenticates the caller and forwards the user id in
//! the `x-user-id` header. Handlers that need a user take [`CurrentUser`],
//! which rejects the request with 401 when the header is missing.
//!
//! # Errors
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "유효하지 않은 카테고리입니다." } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `not_found` (404),
//! `timeout` (408), `unavailable` (503), `tool_error` (500), `internal` (500).
//! The chat endpoint keeps its own `{ "error": "..." }` body.

use axum::{
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::clients::Clients;
use crate::config::Config;
use crate::traits::{validate_params, ToolContext, ToolInfo, ToolRegistry};
use crate::{db, routes};

pub const USER_HEADER: &str = "x-user-id";

pub(crate) const MSG_LOGIN_REQUIRED: &str = "로그인이 필요합니다.";
pub(crate) const MSG_SERVER_ERROR: &str = "서버 오류가 발생했습니다.";

/// Everything a handler needs: settings, the pool, tools and outbound clients.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pub tools: Arc<ToolRegistry>,
    pub clients: Arc<Clients>,
}

impl AppState {
    /// Builds the state from an open pool. Outbound clients are created
    /// from the configuration.
    pub fn new(config: Config, pool: SqlitePool) -> anyhow::Result<Self> {
        let clients = Clients::from_config(&config)?;
        Ok(Self {
            config: Arc::new(config),
            pool,
            tools: Arc::new(ToolRegistry::with_builtins()),
            clients: Arc::new(clients),
        })
    }
}

/// Starts the HTTP server.
///
/// Opens the database, applies migrations, binds to `[server].bind` and
/// serves until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let pool = db::open(config).await?;

    let state = AppState::new(config.clone(), pool)?;
    for t in state.tools.tools() {
        tracing::info!(tool = t.name(), builtin = t.is_builtin(), "registered tool");
    }

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "docent server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// The full application router. Exposed so tests can drive it in-process.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .route("/health", get(handle_health))
        .merge(routes::api_routes())
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

/// Storage and other unexpected failures. The cause is logged, the client
/// only sees the generic message.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = %err, "request failed");
        internal(MSG_SERVER_ERROR)
    }
}

fn error(status: StatusCode, code: &str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code: code.to_string(),
        message: message.into(),
    }
}

pub fn bad_request(message: impl Into<String>) -> AppError {
    error(StatusCode::BAD_REQUEST, "bad_request", message)
}

pub fn unauthorized(message: impl Into<String>) -> AppError {
    error(StatusCode::UNAUTHORIZED, "unauthorized", message)
}

pub fn forbidden(message: impl Into<String>) -> AppError {
    error(StatusCode::FORBIDDEN, "forbidden", message)
}

pub fn not_found(message: impl Into<String>) -> AppError {
    error(StatusCode::NOT_FOUND, "not_found", message)
}

pub fn timeout_error(message: impl Into<String>) -> AppError {
    error(StatusCode::REQUEST_TIMEOUT, "timeout", message)
}

pub fn unavailable(message: impl Into<String>) -> AppError {
    error(StatusCode::SERVICE_UNAVAILABLE, "unavailable", message)
}

pub fn tool_error(message: impl Into<String>) -> AppError {
    error(StatusCode::INTERNAL_SERVER_ERROR, "tool_error", message)
}

pub fn internal(message: impl Into<String>) -> AppError {
    error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

/// Maps an error message to the closest HTTP status so tools and handlers
/// can signal client errors with plain `anyhow` errors.
pub fn classify_tool_error(tool_name: &str, err: anyhow::Error) -> AppError {
    let msg = err.to_string();
    let message = format!("{}: {}", tool_name, msg);

    if msg.contains("not found") {
        not_found(message)
    } else if msg.contains("must not be empty")
        || msg.contains("invalid")
        || msg.contains("missing required")
    {
        bad_request(message)
    } else if msg.contains("not configured") {
        unavailable(message)
    } else if msg.contains("timed out") {
        timeout_error(message)
    } else {
        tool_error(message)
    }
}

// ============ Caller identity ============

/// The authenticated caller, taken from the `x-user-id` header.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub String);

fn user_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        user_from_headers(&parts.headers)
            .map(CurrentUser)
            .ok_or_else(|| unauthorized(MSG_LOGIN_REQUIRED))
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    Json(ToolListResponse {
        tools: state.tools.infos(),
    })
}

// ============ POST /tools/{name} ============

/// Unified tool dispatch.
///
/// The body is `{ "params": {...} }`; a bare object is accepted as the
/// params themselves. Returns `404` for unknown tools, `400` for parameter
/// validation errors and the classified status for execution errors.
async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, AppError> {
    let tool = state
        .tools
        .find(&name)
        .ok_or_else(|| not_found(format!("no tool registered with name: {}", name)))?;

    let params = match body.get("params") {
        Some(p) => p.clone(),
        None => body,
    };
    let validated = validate_params(&tool.parameters_schema(), &params)
        .map_err(|e| bad_request(e.to_string()))?;

    let ctx = ToolContext {
        config: state.config.clone(),
        pool: state.pool.clone(),
        clients: state.clients.clone(),
        user_id: user_from_headers(&headers),
    };
    tracing::debug!(tool = %name, user = ?ctx.user_id, "tool call");
    let result = tool
        .execute(validated, &ctx)
        .await
        .map_err(|e| classify_tool_error(&name, e))?;

    Ok(Json(serde_json::json!({ "result": result })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_classify_tool_error() {
        let e = classify_tool_error("t", anyhow::anyhow!("query must not be empty"));
        assert_eq!(e.status, StatusCode::BAD_REQUEST);

        let e = classify_tool_error("t", anyhow::anyhow!("paper not found"));
        assert_eq!(e.status, StatusCode::NOT_FOUND);

        let e = classify_tool_error("t", anyhow::anyhow!("USDA API key is not configured"));
        assert_eq!(e.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(e.code, "unavailable");

        let e = classify_tool_error("t", anyhow::anyhow!("request timed out"));
        assert_eq!(e.status, StatusCode::REQUEST_TIMEOUT);

        let e = classify_tool_error("t", anyhow::anyhow!("boom"));
        assert_eq!(e.code, "tool_error");
        assert_eq!(e.message, "t: boom");
    }

    #[test]
    fn test_user_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(user_from_headers(&headers), None);
        headers.insert(USER_HEADER, HeaderValue::from_static("   "));
        assert_eq!(user_from_headers(&headers), None);
        headers.insert(USER_HEADER, HeaderValue::from_static(" user-1 "));
        assert_eq!(user_from_headers(&headers).as_deref(), Some("user-1"));
    }

    #[test]
    fn test_anyhow_maps_to_generic_500() {
        let e: AppError = anyhow::anyhow!("disk I/O error").into();
        assert_eq!(e.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(e.message, MSG_SERVER_ERROR);
    }
}
