//! Webhook event classification.
//!
//! Event types arrive as dotted strings in three families. Classification
//! decides three things downstream: whether the event drives reconciliation
//! at all, where the remote document ID lives in the payload, and whether the
//! payload carries the full signer list or only a partial per-signer view.

use crate::notify::NotificationIntent;

/// Broad family of a webhook event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFamily {
    Document,
    Signature,
    Member,
}

/// Recognized webhook event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    DocumentCreated,
    DocumentUpdated,
    DocumentFinished,
    DocumentDeleted,
    SignatureCreated,
    SignatureViewed,
    SignatureAccepted,
    SignatureRejected,
    SignatureUpdated,
    SignatureDeleted,
    SignatureBiometricApproved,
    SignatureBiometricUnapproved,
    SignatureBiometricRejected,
    MemberCreated,
    MemberDeleted,
}

impl EventKind {
    /// Maps a wire event type to a kind. Unknown types return `None` and are
    /// acknowledged without processing.
    pub fn from_type_str(s: &str) -> Option<Self> {
        let kind = match s {
            "document.created" => EventKind::DocumentCreated,
            "document.updated" => EventKind::DocumentUpdated,
            "document.finished" => EventKind::DocumentFinished,
            "document.deleted" => EventKind::DocumentDeleted,
            "signature.created" => EventKind::SignatureCreated,
            "signature.viewed" => EventKind::SignatureViewed,
            "signature.accepted" => EventKind::SignatureAccepted,
            "signature.rejected" => EventKind::SignatureRejected,
            "signature.updated" => EventKind::SignatureUpdated,
            "signature.deleted" => EventKind::SignatureDeleted,
            "signature.biometric_approved" => EventKind::SignatureBiometricApproved,
            "signature.biometric_unapproved" => EventKind::SignatureBiometricUnapproved,
            "signature.biometric_rejected" => EventKind::SignatureBiometricRejected,
            "member.created" => EventKind::MemberCreated,
            "member.deleted" => EventKind::MemberDeleted,
            _ => return None,
        };
        Some(kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::DocumentCreated => "document.created",
            EventKind::DocumentUpdated => "document.updated",
            EventKind::DocumentFinished => "document.finished",
            EventKind::DocumentDeleted => "document.deleted",
            EventKind::SignatureCreated => "signature.created",
            EventKind::SignatureViewed => "signature.viewed",
            EventKind::SignatureAccepted => "signature.accepted",
            EventKind::SignatureRejected => "signature.rejected",
            EventKind::SignatureUpdated => "signature.updated",
            EventKind::SignatureDeleted => "signature.deleted",
            EventKind::SignatureBiometricApproved => "signature.biometric_approved",
            EventKind::SignatureBiometricUnapproved => "signature.biometric_unapproved",
            EventKind::SignatureBiometricRejected => "signature.biometric_rejected",
            EventKind::MemberCreated => "member.created",
            EventKind::MemberDeleted => "member.deleted",
        }
    }

    pub fn family(&self) -> EventFamily {
        match self {
            EventKind::DocumentCreated
            | EventKind::DocumentUpdated
            | EventKind::DocumentFinished
            | EventKind::DocumentDeleted => EventFamily::Document,
            EventKind::MemberCreated | EventKind::MemberDeleted => EventFamily::Member,
            _ => EventFamily::Signature,
        }
    }

    /// Whether this event should trigger a reconciliation of the document it
    /// names. Lifecycle chatter (created, viewed, member events) is logged
    /// and acknowledged without touching the record.
    pub fn drives_reconciliation(&self) -> bool {
        matches!(
            self,
            EventKind::DocumentUpdated
                | EventKind::DocumentFinished
                | EventKind::SignatureAccepted
                | EventKind::SignatureRejected
        )
    }

    /// Document events carry the full document object including the complete
    /// `signatures` array; signature events carry only the acting signer's
    /// slice and must not be used to compute the aggregate transition.
    pub fn carries_full_payload(&self) -> bool {
        self.family() == EventFamily::Document
    }

    /// Per-signer notification derived directly from the event type,
    /// independent of the aggregate status transition.
    pub fn signer_intent(&self) -> Option<NotificationIntent> {
        match self {
            EventKind::SignatureAccepted => Some(NotificationIntent::SignerAccepted),
            EventKind::SignatureRejected => Some(NotificationIntent::SignerRejected),
            _ => None,
        }
    }

    /// JSON field within `event.data` that holds the remote document ID.
    ///
    /// Document events put the ID at `data.id`; signature events reference
    /// their parent document at `data.document`. Member events carry no
    /// document reference.
    pub fn document_id_field(&self) -> Option<&'static str> {
        match self.family() {
            EventFamily::Document => Some("id"),
            EventFamily::Signature => Some("document"),
            EventFamily::Member => None,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
