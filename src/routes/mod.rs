//! API routes
//!
//! Authentication itself is delegated: an upstream identity proxy verifies
//! the user and injects the id as the `x-user-id` header. Requests without
//! it are rejected here and never reach the session layer.

use axum::{
    extract::{FromRequestParts, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::conversation::{build_previews, ConversationPreview};
use crate::core::{SessionError, SessionSnapshot, StoreError};
use crate::AppState;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    #[serde(default)]
    pub text: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoadRequest {
    pub conversation_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("authentication required")]
    AuthenticationRequired,

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            ApiError::Session(SessionError::Busy) => StatusCode::CONFLICT,
            ApiError::Session(SessionError::EmptyInput) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// The authenticated caller, taken from the `x-user-id` header.
pub struct AuthUser(pub String);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| AuthUser(id.to_string()))
            .ok_or(ApiError::AuthenticationRequired)
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn send_message(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<SendRequest>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = state.sessions.session_for(&user.0).await;
    session.send(&request.text, request.image_url).await?;
    Ok(Json(session.snapshot().await))
}

async fn current_thread(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = state.sessions.session_for(&user.0).await;
    Ok(Json(session.snapshot().await))
}

async fn load_conversation(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<LoadRequest>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = state.sessions.session_for(&user.0).await;
    session.load_conversation(&request.conversation_id).await;
    Ok(Json(session.snapshot().await))
}

async fn new_conversation(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = state.sessions.session_for(&user.0).await;
    session.start_new().await;
    Ok(Json(session.snapshot().await))
}

async fn conversation_previews(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<ConversationPreview>>, ApiError> {
    let messages = state.store.select_by_owner(&user.0).await?;
    Ok(Json(build_previews(&messages, &user.0)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/v1/chat/send", post(send_message))
        .route("/v1/chat/thread", get(current_thread))
        .route("/v1/chat/load", post(load_conversation))
        .route("/v1/chat/new", post(new_conversation))
        .route("/v1/conversations", get(conversation_previews))
}
