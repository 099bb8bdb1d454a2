//! `POST /v1/commands`: publish one envelope to the produce topic.

use std::collections::BTreeMap;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use ragbridge_core::error::{BridgeError, ClientCode};
use ragbridge_core::protocol::Envelope;

use crate::app_state::AppState;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandRequest {
    pub command: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
    /// Record key; defaults to the `client-id` header when present.
    #[serde(default)]
    pub key: Option<String>,
}

fn error_response(err: &BridgeError) -> Response {
    let status = match err.client_code() {
        ClientCode::BrokerUnavailable | ClientCode::SendFailure => StatusCode::SERVICE_UNAVAILABLE,
        ClientCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    };
    let body = json!({
        "error": {
            "code": err.client_code().as_str(),
            "msg": err.public_message(),
        }
    });
    (status, Json(body)).into_response()
}

pub async fn publish_command(
    State(app): State<AppState>,
    payload: std::result::Result<Json<CommandRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rej) => return error_response(&BridgeError::BadRequest(rej.body_text())),
    };

    let key = req
        .key
        .clone()
        .or_else(|| req.headers.get(crate::dispatch::CLIENT_ID_HEADER).cloned());
    let env = match Envelope::new(req.command, req.headers, req.body) {
        Ok(env) => env,
        Err(e) => return error_response(&e),
    };

    match app.producer().send(app.produce_topic(), key.as_deref(), &env).await {
        Ok(()) => {
            tracing::info!(command = %env.command(), topic = %app.produce_topic(), "command published");
            (
                StatusCode::ACCEPTED,
                Json(json!({ "accepted": true, "command": env.command() })),
            )
                .into_response()
        }
        Err(e) => {
            tracing::warn!(command = %env.command(), error = %e, "command publish failed");
            error_response(&e)
        }
    }
}
