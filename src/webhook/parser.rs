//! Webhook envelope parsing.
//!
//! The wire shape is `{ "event": { "type": "...", "id": "...", "data": {...} } }`.
//! A missing `event` object is a client error; an unknown `event.type` is not,
//! it parses to `None` and gets acknowledged so the remote service stops
//! redelivering something we will never handle.

use serde::Deserialize;
use thiserror::Error;

use crate::types::{EventId, RemoteDocumentId};

use super::events::EventKind;

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("request body is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("envelope is missing the event object")]
    MissingEvent,

    #[error("event {event_type} is missing required field {field}")]
    MissingField {
        event_type: &'static str,
        field: &'static str,
    },
}

/// A recognized, validated webhook event.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub kind: EventKind,
    pub event_id: Option<EventId>,
    /// Present for document and signature events; member events carry none.
    pub remote_document_id: Option<RemoteDocumentId>,
    /// The raw `event.data` object.
    pub data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    event: Option<RawEvent>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type", default)]
    event_type: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    data: serde_json::Value,
}

/// Parses a raw request body into a webhook event.
///
/// `Ok(None)` means the envelope was well-formed but the event type is
/// unknown; callers acknowledge those. Errors are client errors. A
/// reconciliation-driving event without its document ID is an error too,
/// because acknowledging it would silently drop a state change.
pub fn parse_envelope(body: &[u8]) -> Result<Option<WebhookEvent>, ParseError> {
    let envelope: RawEnvelope = serde_json::from_slice(body)
        .map_err(|err| ParseError::InvalidJson(err.to_string()))?;

    let event = envelope.event.ok_or(ParseError::MissingEvent)?;

    let kind = match event.event_type.as_deref().and_then(EventKind::from_type_str) {
        Some(kind) => kind,
        None => return Ok(None),
    };

    let remote_document_id = match kind.document_id_field() {
        Some(field) => {
            let id = event
                .data
                .get(field)
                .and_then(|v| v.as_str())
                .map(RemoteDocumentId::new);
            if id.is_none() && kind.drives_reconciliation() {
                return Err(ParseError::MissingField {
                    event_type: kind.as_str(),
                    field,
                });
            }
            id
        }
        None => None,
    };

    Ok(Some(WebhookEvent {
        kind,
        event_id: event.id.map(EventId::new),
        remote_document_id,
        data: event.data,
    }))
}
