use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use prost::Message;
use std::sync::Arc;
use tracing::{debug, warn};

use tcs_core::{ErrorCategory, SessionController, SessionRpcError};
use tcs_proto::v1::{AddSessionRequestV1, ListSessionsRequestV1, RevokeSessionRequestV1};

pub const PROTOBUF_CONTENT_TYPE: &str = "application/x-protobuf";

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<SessionController>,
    pub default_server_addr: String,
}

fn protobuf_response<M: Message>(msg: &M) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, PROTOBUF_CONTENT_TYPE)],
        msg.encode_to_vec(),
    )
        .into_response()
}

fn error_response(err: &SessionRpcError) -> Response {
    let status = if err.is_not_found() {
        StatusCode::NOT_FOUND
    } else {
        match err.category() {
            ErrorCategory::Validation | ErrorCategory::Translation => StatusCode::BAD_REQUEST,
            ErrorCategory::Storage => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCategory::Collaborator => StatusCode::BAD_GATEWAY,
        }
    };

    if status.is_server_error() {
        warn!(error = %err, "Session request failed");
    } else {
        debug!(error = %err, "Session request rejected");
    }
    (status, err.to_string()).into_response()
}

fn unavailable_if_stopping(state: &AppState) -> Option<Response> {
    state
        .controller
        .is_shutting_down()
        .then(|| (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response())
}

// POST /v1/sessions
pub async fn post_session(State(state): State<AppState>, body: Bytes) -> Response {
    if let Some(resp) = unavailable_if_stopping(&state) {
        return resp;
    }

    let mut req = match AddSessionRequestV1::decode(body) {
        Ok(req) => req,
        Err(_) => return (StatusCode::BAD_REQUEST, "malformed AddSessionRequest").into_response(),
    };
    if req.mailbox_server_addr.is_empty() {
        req.mailbox_server_addr = state.default_server_addr.clone();
    }

    match state.controller.add_session_rpc(req).await {
        Ok(resp) => protobuf_response(&resp),
        Err(e) => error_response(&e),
    }
}

// GET /v1/sessions
pub async fn get_sessions(State(state): State<AppState>) -> Response {
    match state.controller.list_sessions_rpc(ListSessionsRequestV1 {}).await {
        Ok(resp) => protobuf_response(&resp),
        Err(e) => error_response(&e),
    }
}

// POST /v1/sessions/revoke
pub async fn post_revoke(State(state): State<AppState>, body: Bytes) -> Response {
    let req = match RevokeSessionRequestV1::decode(body) {
        Ok(req) => req,
        Err(_) => {
            return (StatusCode::BAD_REQUEST, "malformed RevokeSessionRequest").into_response()
        }
    };

    match state.controller.revoke_session_rpc(req).await {
        Ok(resp) => protobuf_response(&resp),
        Err(e) => error_response(&e),
    }
}

// GET /health
pub async fn get_health(State(state): State<AppState>) -> Response {
    use serde_json::json;

    let response = json!({
        "status": if state.controller.is_shutting_down() { "stopping" } else { "healthy" },
        "active_watchers": state.controller.active_watchers(),
        "version": env!("CARGO_PKG_VERSION"),
    });

    (StatusCode::OK, axum::Json(response)).into_response()
}
