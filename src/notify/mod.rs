//! Notification intents and dispatch.
//!
//! The reconciler never delivers notifications itself. It returns an intent,
//! and the dispatcher here decides whether that intent has already been acted
//! on and hands it to a sink. Delivery is fire-and-forget: a sink failure is
//! logged and dropped, never propagated back into reconciliation, because the
//! record state is already persisted by the time dispatch runs.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{error, info};

use crate::types::{DocumentId, RemoteDocumentId};

/// What happened that someone might want to hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationIntent {
    /// Every signer has signed. Edge-triggered by the status engine.
    DocumentFullySigned,
    /// One signer accepted. Derived from webhook event type, not from the
    /// aggregate transition.
    SignerAccepted,
    /// One signer rejected. Derived from webhook event type.
    SignerRejected,
}

impl NotificationIntent {
    /// Stable name used in dedupe keys and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationIntent::DocumentFullySigned => "document_fully_signed",
            NotificationIntent::SignerAccepted => "signer_accepted",
            NotificationIntent::SignerRejected => "signer_rejected",
        }
    }
}

/// One deliverable notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub document_id: DocumentId,
    pub remote_id: RemoteDocumentId,
    pub document_name: String,
    pub intent: NotificationIntent,
    /// The acting signer for per-signer intents (email, phone or display
    /// name, whichever the event carried). `None` for document-level intents.
    pub signer: Option<String>,
}

impl Notification {
    /// Dedupe key scoped to one document, one intent kind and, for
    /// per-signer intents, one signer.
    ///
    /// Duplicate webhook deliveries and repeated polls produce the same key
    /// and are suppressed; a second signer accepting the same document is a
    /// distinct key and still delivers.
    pub fn dedupe_key(&self) -> String {
        match &self.signer {
            Some(signer) => format!("{}:{}:{}", self.document_id.0, self.intent.kind(), signer),
            None => format!("{}:{}", self.document_id.0, self.intent.kind()),
        }
    }
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Delivery boundary. Real transports (mail, chat) live behind this trait;
/// the default implementation just logs.
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, notification: &Notification) -> Result<(), NotificationError>;
}

/// Sink that records deliveries in the structured log and does nothing else.
#[derive(Debug, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn deliver(&self, notification: &Notification) -> Result<(), NotificationError> {
        info!(
            document_id = %notification.document_id,
            remote_id = %notification.remote_id,
            document_name = %notification.document_name,
            intent = notification.intent.kind(),
            signer = notification.signer.as_deref().unwrap_or(""),
            "notification"
        );
        Ok(())
    }
}

/// Applies per-(document, intent) dedupe and forwards to the sink.
pub struct Dispatcher {
    sink: Arc<dyn NotificationSink>,
    delivered: Mutex<HashSet<String>>,
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Dispatcher {
            sink,
            delivered: Mutex::new(HashSet::new()),
        }
    }

    /// Delivers unless this (document, intent) pair was already delivered.
    ///
    /// Returns true if the sink was invoked. Sink errors are logged and
    /// swallowed; the dedupe entry is kept even on failure so a broken sink
    /// does not cause repeated delivery attempts from every later poll.
    pub fn dispatch(&self, notification: &Notification) -> bool {
        let key = notification.dedupe_key();
        {
            let mut delivered = self.delivered.lock().unwrap_or_else(|e| e.into_inner());
            if !delivered.insert(key) {
                return false;
            }
        }

        if let Err(err) = self.sink.deliver(notification) {
            error!(
                document_id = %notification.document_id,
                intent = notification.intent.kind(),
                error = %err,
                "notification delivery failed"
            );
        }
        true
    }
}
