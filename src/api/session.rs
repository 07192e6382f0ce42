//! Session control endpoints used by the control page

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use super::ApiState;
use crate::session::{OutboxMessage, StartOutcome};

/// Build session router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/start", post(start))
        .route("/stop", post(stop))
        .route("/stop_speaking", post(stop_speaking))
        .route("/pause", post(pause))
        .route("/resume", post(resume))
        .route("/messages", get(messages))
        .with_state(state)
}

/// Outcome of a control operation
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusResponse {
    const fn ok(status: &'static str) -> Json<Self> {
        Json(Self {
            status,
            message: None,
        })
    }
}

/// Control failures, reported as `{status: "error", message}`
///
/// The page inspects the body rather than the HTTP status, so these are
/// still sent as 200.
#[derive(Debug)]
pub enum SessionError {
    BadRequest(String),
    Failed(crate::Error),
}

impl From<crate::Error> for SessionError {
    fn from(e: crate::Error) -> Self {
        Self::Failed(e)
    }
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let message = match self {
            Self::BadRequest(msg) => msg,
            Self::Failed(e) => e.to_string(),
        };

        Json(StatusResponse {
            status: "error",
            message: Some(message),
        })
        .into_response()
    }
}

/// Start request; every field is optional
#[derive(Debug, Default, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub voice: Option<String>,
}

impl StartRequest {
    /// Parse a possibly empty JSON body
    fn parse(body: &[u8]) -> Result<Self, SessionError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|e| SessionError::BadRequest(format!("invalid request body: {e}")))
    }
}

async fn start(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<Json<StatusResponse>, SessionError> {
    let request = StartRequest::parse(&body)?;

    let status = match state.sessions.start(request.voice).await? {
        StartOutcome::Started => "started",
        StartOutcome::AlreadyRunning => "already running",
    };
    Ok(StatusResponse::ok(status))
}

async fn stop(State(state): State<Arc<ApiState>>) -> Json<StatusResponse> {
    state.sessions.stop().await;
    StatusResponse::ok("stopped")
}

async fn stop_speaking(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<StatusResponse>, SessionError> {
    state.sessions.stop_speaking()?;
    Ok(StatusResponse::ok("stopped"))
}

async fn pause(State(state): State<Arc<ApiState>>) -> Result<Json<StatusResponse>, SessionError> {
    state.sessions.pause()?;
    Ok(StatusResponse::ok("paused"))
}

async fn resume(State(state): State<Arc<ApiState>>) -> Result<Json<StatusResponse>, SessionError> {
    state.sessions.resume()?;
    Ok(StatusResponse::ok("resumed"))
}

/// Pending outbox messages
#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<OutboxMessage>,
}

/// Drain the outbox
async fn messages(State(state): State<Arc<ApiState>>) -> Json<MessagesResponse> {
    Json(MessagesResponse {
        messages: state.sessions.outbox().drain(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_is_default_request() {
        assert!(StartRequest::parse(b"").unwrap().voice.is_none());
        assert!(StartRequest::parse(b"  \n").unwrap().voice.is_none());
    }

    #[test]
    fn voice_is_read_from_body() {
        let request = StartRequest::parse(br#"{"voice":"Samantha"}"#).unwrap();
        assert_eq!(request.voice.as_deref(), Some("Samantha"));
    }

    #[test]
    fn malformed_body_is_rejected() {
        assert!(matches!(
            StartRequest::parse(b"{voice"),
            Err(SessionError::BadRequest(_))
        ));
    }
}
