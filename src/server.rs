use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Json, State},
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
        },
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::chat::{ChatRequest, ChatResponse, ServiceContext};
use crate::entity::IdentityResolver;
use crate::gateway::{Gateway, GatewayError, Turn};

pub const CHAT_PATH: &str = "/api/chat";

// -----------------------------------------------------------------------------
// Errors
// -----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// Errors surfaced over HTTP. Everything else degrades to a 200 reply.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
        };

        let body = ErrorBody {
            error: code.to_string(),
            message,
        };
        (status, [(ACCESS_CONTROL_ALLOW_ORIGIN, "*")], Json(body)).into_response()
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::EmptyMessage => {
                ApiError::BadRequest("Message is required. Please type a question.".to_string())
            }
        }
    }
}

// -----------------------------------------------------------------------------
// Server State
// -----------------------------------------------------------------------------

pub struct AppState {
    pub gateway: Gateway,
    pub identity: Arc<dyn IdentityResolver>,
}

impl AppState {
    pub fn new(gateway: Gateway, identity: Arc<dyn IdentityResolver>) -> Self {
        Self { gateway, identity }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(CHAT_PATH, post(chat_handler).options(chat_preflight))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

// -----------------------------------------------------------------------------
// Handlers
// -----------------------------------------------------------------------------

async fn chat_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    // Only the message is checked; unreadable bodies get the outage reply.
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        ChatRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(value) => ChatRequest::from_json(value),
            Err(err) => {
                warn!(error = %err, "Unreadable chat body, serving outage reply");
                return Ok(chat_reply(Turn::outage(ServiceContext::default()).response));
            }
        }
    };

    let owner = state.identity.resolve(&headers);
    info!(
        context = %request.service_context,
        signed_in = owner.is_some(),
        session = request.session_id.is_some(),
        "Received chat message"
    );

    let turn = state.gateway.handle(request, owner).await?;
    // Persistence keeps running after the reply is sent.
    drop(turn.persistence);

    Ok(chat_reply(turn.response))
}

fn chat_reply(response: ChatResponse) -> Response {
    ([(ACCESS_CONTROL_ALLOW_ORIGIN, "*")], Json(response)).into_response()
}

async fn chat_preflight() -> impl IntoResponse {
    (
        StatusCode::OK,
        [
            (ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (ACCESS_CONTROL_ALLOW_METHODS, "POST, OPTIONS"),
            (ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
        ],
    )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthBody {
    status: &'static str,
    playbook_version: String,
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok",
        playbook_version: state.gateway.playbook().version.clone(),
    })
}
