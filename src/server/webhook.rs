//! Webhook ingestion endpoint.
//!
//! Response contract, chosen so the remote service's at-least-once redelivery
//! behaves sensibly:
//! - 200 for anything successfully handled, including unknown event types and
//!   events for documents we do not track (redelivering those can never help);
//! - 400 for structurally invalid envelopes;
//! - 401 for bad signatures when a secret is configured;
//! - 500 only when processing genuinely failed and a redelivery might succeed.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::reconcile::{ReconcileError, ReconcileSource};
use crate::notify::Notification;
use crate::webhook::{self, parse_envelope, ParseError};

use super::AppState;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("invalid webhook signature")]
    InvalidSignature,

    #[error(transparent)]
    Invalid(#[from] ParseError),

    #[error("webhook processing failed")]
    Processing(#[source] ReconcileError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            WebhookError::InvalidSignature => {
                (StatusCode::UNAUTHORIZED, self.to_string())
            }
            WebhookError::Invalid(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            // Internals stay in the log, not the response.
            WebhookError::Processing(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

fn ack(message: &str) -> Json<serde_json::Value> {
    Json(json!({ "message": message }))
}

/// Identity of the signer an event is about, taken from `data.user`. Email
/// first, then phone, then display name, matching how signers are addressed.
fn acting_signer(data: &serde_json::Value) -> Option<String> {
    let user = data.get("user")?;
    ["email", "phone", "name"]
        .iter()
        .find_map(|field| user.get(field).and_then(|v| v.as_str()))
        .map(str::to_owned)
}

pub async fn webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, WebhookError> {
    if let Some(secret) = state.webhook_secret() {
        let header = headers
            .get(webhook::SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(WebhookError::InvalidSignature)?;
        if !webhook::verify_signature(&body, header, secret) {
            warn!("webhook delivery with invalid signature rejected");
            return Err(WebhookError::InvalidSignature);
        }
    }

    let event = match parse_envelope(&body)? {
        Some(event) => event,
        None => {
            info!("unknown webhook event type, acknowledged");
            return Ok(ack("unknown event type, ignored"));
        }
    };

    info!(
        event_type = %event.kind,
        event_id = event.event_id.as_ref().map(|id| id.as_str()),
        "webhook event received"
    );

    if !event.kind.drives_reconciliation() {
        return Ok(ack("event acknowledged"));
    }

    // Presence is guaranteed by the parser for driving events.
    let remote_id = match &event.remote_document_id {
        Some(id) => id.clone(),
        None => return Ok(ack("event acknowledged")),
    };

    let document_id = match state.store().find_by_remote(&remote_id) {
        Some(id) => id,
        None => {
            warn!(remote_id = %remote_id, "webhook for untracked document, ignored");
            return Ok(ack("document not tracked, ignored"));
        }
    };

    let signer_intent = event.kind.signer_intent();
    let acting_signer = acting_signer(&event.data);
    let outcome = state
        .reconciler()
        .reconcile(document_id, ReconcileSource::Webhook(event))
        .await
        .map_err(WebhookError::Processing)?;

    // Per-signer intents come straight from the event type; the aggregate
    // transition cannot see which signer acted.
    if let Some(intent) = signer_intent {
        let name = {
            let handle = state
                .store()
                .get(document_id)
                .map_err(|err| WebhookError::Processing(err.into()))?;
            let record = handle.lock().await;
            record.name.clone()
        };
        state.dispatcher().dispatch(&Notification {
            document_id,
            remote_id,
            document_name: name,
            intent,
            signer: acting_signer,
        });
    }

    Ok(Json(json!({
        "message": "webhook processed",
        "changed": outcome.changed,
        "status": outcome.new_status,
    })))
}
