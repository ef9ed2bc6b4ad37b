//! Chat API consumed by the browser front end.
//!
//! - `POST /api/start_chat`: start a session with an optional first message
//! - `POST /api/send_message`: queue operator text for the active session
//! - `GET  /api/get_message`: pop the next outbound entry (never blocks)
//! - `POST /api/end_chat`: end the active session
//! - `GET  /api/transcript`: copy of the current transcript

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use itemdesk_agent::SessionController;
use itemdesk_core::conversation::{OutboundEntry, SessionId, SessionStatus, Turn};
use itemdesk_core::errors::{ApplicationError, ConversationError, InterfaceError};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct ChatState {
    controller: Arc<SessionController>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StartChatRequest {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct GetMessageResponse {
    pub message: Option<OutboundEntry>,
    pub chat_status: SessionStatus,
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub session_id: Option<SessionId>,
    pub turns: Vec<Turn>,
}

#[derive(Debug, Serialize)]
pub struct ChatError {
    pub status: &'static str,
    pub detail: String,
    pub correlation_id: String,
}

type ChatResult<T> = Result<Json<T>, (StatusCode, Json<ChatError>)>;

pub fn router(controller: Arc<SessionController>) -> Router {
    Router::new()
        .route("/api/start_chat", post(start_chat))
        .route("/api/send_message", post(send_message))
        .route("/api/get_message", get(get_message))
        .route("/api/end_chat", post(end_chat))
        .route("/api/transcript", get(transcript))
        .layer(CorsLayer::permissive())
        .with_state(ChatState { controller })
}

/// Accepts an empty body, or JSON with an optional `message`.
async fn start_chat(State(state): State<ChatState>, body: Bytes) -> ChatResult<StatusResponse> {
    let correlation_id = new_correlation_id();
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        StartChatRequest::default()
    } else {
        serde_json::from_slice::<StartChatRequest>(&body).map_err(|error| {
            interface_error(InterfaceError::BadRequest {
                message: format!("invalid request body: {error}"),
                correlation_id: correlation_id.clone(),
            })
        })?
    };

    let session_id = state
        .controller
        .start_session(request.message.as_deref().unwrap_or_default())
        .await
        .map_err(|error| application_error(error, &correlation_id))?;

    info!(
        event_name = "chat.session.start_requested",
        %correlation_id,
        %session_id,
        "chat started"
    );
    Ok(Json(StatusResponse { status: "started", session_id: Some(session_id) }))
}

async fn send_message(
    State(state): State<ChatState>,
    Json(request): Json<SendMessageRequest>,
) -> ChatResult<StatusResponse> {
    let correlation_id = new_correlation_id();
    if request.message.trim().is_empty() {
        return Err(interface_error(InterfaceError::BadRequest {
            message: "message must not be empty".to_string(),
            correlation_id,
        }));
    }

    state
        .controller
        .submit_message(&request.message)
        .map_err(|error| application_error(error.into(), &correlation_id))?;
    Ok(Json(StatusResponse { status: "received", session_id: None }))
}

async fn get_message(State(state): State<ChatState>) -> Json<GetMessageResponse> {
    let poll = state.controller.poll_outbound();
    Json(GetMessageResponse { message: poll.message, chat_status: poll.session_status })
}

async fn end_chat(State(state): State<ChatState>) -> ChatResult<StatusResponse> {
    let correlation_id = new_correlation_id();
    let session_id = state
        .controller
        .end_session()
        .map_err(|error| application_error(error, &correlation_id))?;
    Ok(Json(StatusResponse { status: "ended", session_id: Some(session_id) }))
}

async fn transcript(State(state): State<ChatState>) -> Json<TranscriptResponse> {
    let (session_id, turns) = state.controller.transcript();
    Json(TranscriptResponse { session_id, turns })
}

fn new_correlation_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn application_error(
    error: ApplicationError,
    correlation_id: &str,
) -> (StatusCode, Json<ChatError>) {
    if matches!(
        error,
        ApplicationError::Conversation(
            ConversationError::AlreadyActive | ConversationError::NoActiveSession
        )
    ) {
        info!(
            event_name = "chat.request.rejected",
            correlation_id,
            error = %error,
            "chat request rejected by session state"
        );
    } else {
        warn!(
            event_name = "chat.request.failed",
            correlation_id,
            error = %error,
            "chat request failed"
        );
    }
    interface_error(error.into_interface(correlation_id))
}

fn interface_error(error: InterfaceError) -> (StatusCode, Json<ChatError>) {
    let (status, correlation_id) = match &error {
        InterfaceError::BadRequest { correlation_id, .. } => {
            (StatusCode::BAD_REQUEST, correlation_id.clone())
        }
        InterfaceError::Conflict { correlation_id, .. } => {
            (StatusCode::CONFLICT, correlation_id.clone())
        }
        InterfaceError::ServiceUnavailable { correlation_id, .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, correlation_id.clone())
        }
        InterfaceError::Internal { correlation_id, .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, correlation_id.clone())
        }
    };
    let detail = match &error {
        InterfaceError::Internal { .. } => error.user_message().to_string(),
        _ => error.message().to_string(),
    };
    (status, Json(ChatError { status: "error", detail, correlation_id }))
}
