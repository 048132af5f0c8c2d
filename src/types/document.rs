//! The persisted document record and its signing lifecycle status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{DocumentId, RemoteDocumentId};

/// Aggregate signing status of a document.
///
/// Progress path is `Pending -> Partial -> Signed`; any rejection moves a
/// non-terminal document to `Rejected`. `Signed` and `Rejected` are terminal:
/// later snapshots may still refresh counts for audit purposes but the status
/// does not revert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// No signer has acted yet.
    Pending,
    /// At least one signer has signed, but not all.
    Partial,
    /// Every signer has signed.
    Signed,
    /// At least one signer rejected. Terminal regardless of other progress.
    Rejected,
}

impl DocumentStatus {
    /// Returns true for statuses that no further snapshot can move away from.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Signed | DocumentStatus::Rejected)
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Partial => "partial",
            DocumentStatus::Signed => "signed",
            DocumentStatus::Rejected => "rejected",
        };
        write!(f, "{}", s)
    }
}

/// How a signer is reached. Each signer is identified by exactly one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactChannel {
    Email(String),
    Phone(String),
}

/// A signer's contact details, captured at document creation. Read-only
/// thereafter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerContact {
    #[serde(flatten)]
    pub channel: ContactChannel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl SignerContact {
    pub fn email(address: impl Into<String>) -> Self {
        SignerContact {
            channel: ContactChannel::Email(address.into()),
            display_name: None,
        }
    }

    pub fn phone(number: impl Into<String>) -> Self {
        SignerContact {
            channel: ContactChannel::Phone(number.into()),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// One persisted record per signing request.
///
/// The reconciler is the sole writer of `status`, the counters,
/// `last_remote_snapshot` and `last_checked_at`. `remote_id` and
/// `signer_contacts` are write-once at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub local_id: DocumentId,
    pub remote_id: RemoteDocumentId,
    pub name: String,
    pub status: DocumentStatus,
    pub total_signers: u32,
    pub signed_count: u32,
    pub rejected_count: u32,
    /// Last normalized remote payload, kept for idempotent change detection
    /// and audit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_remote_snapshot: Option<serde_json::Value>,
    /// When reconciliation last ran for this document, successful or not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<DateTime<Utc>>,
    pub is_sandbox: bool,
    pub signer_contacts: Vec<SignerContact>,
    pub created_at: DateTime<Utc>,
}

impl DocumentRecord {
    /// Creates a fresh record for a newly submitted signing request.
    pub fn new(
        local_id: DocumentId,
        remote_id: RemoteDocumentId,
        name: impl Into<String>,
        total_signers: u32,
        is_sandbox: bool,
        signer_contacts: Vec<SignerContact>,
    ) -> Self {
        DocumentRecord {
            local_id,
            remote_id,
            name: name.into(),
            status: DocumentStatus::Pending,
            total_signers,
            signed_count: 0,
            rejected_count: 0,
            last_remote_snapshot: None,
            last_checked_at: None,
            is_sandbox,
            signer_contacts,
            created_at: Utc::now(),
        }
    }

    /// Signing progress as a percentage, 0 when no signers are known.
    pub fn signing_progress(&self) -> f64 {
        if self.total_signers == 0 {
            return 0.0;
        }
        (self.signed_count as f64 / self.total_signers as f64) * 100.0
    }

    /// Email addresses of all email-channel signers.
    pub fn signer_emails(&self) -> Vec<&str> {
        self.signer_contacts
            .iter()
            .filter_map(|c| match &c.channel {
                ContactChannel::Email(addr) => Some(addr.as_str()),
                ContactChannel::Phone(_) => None,
            })
            .collect()
    }

    /// Phone numbers of all phone-channel signers.
    pub fn signer_phones(&self) -> Vec<&str> {
        self.signer_contacts
            .iter()
            .filter_map(|c| match &c.channel {
                ContactChannel::Phone(n) => Some(n.as_str()),
                ContactChannel::Email(_) => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(total: u32, signed: u32) -> DocumentRecord {
        let mut r = DocumentRecord::new(
            DocumentId(1),
            RemoteDocumentId::new("doc-1"),
            "Contract",
            total,
            false,
            vec![],
        );
        r.signed_count = signed;
        r
    }

    #[test]
    fn terminal_statuses() {
        assert!(!DocumentStatus::Pending.is_terminal());
        assert!(!DocumentStatus::Partial.is_terminal());
        assert!(DocumentStatus::Signed.is_terminal());
        assert!(DocumentStatus::Rejected.is_terminal());
    }

    #[test]
    fn new_record_starts_pending_with_zero_counts() {
        let r = record(3, 0);
        assert_eq!(r.status, DocumentStatus::Pending);
        assert_eq!(r.signed_count, 0);
        assert_eq!(r.rejected_count, 0);
        assert!(r.last_checked_at.is_none());
        assert!(r.last_remote_snapshot.is_none());
    }

    #[test]
    fn signing_progress_handles_zero_signers() {
        assert_eq!(record(0, 0).signing_progress(), 0.0);
        assert_eq!(record(2, 1).signing_progress(), 50.0);
        assert_eq!(record(4, 4).signing_progress(), 100.0);
    }

    #[test]
    fn contact_channel_filters() {
        let mut r = record(2, 0);
        r.signer_contacts = vec![
            SignerContact::email("a@example.com").with_display_name("A"),
            SignerContact::phone("+5511999999999"),
        ];
        assert_eq!(r.signer_emails(), vec!["a@example.com"]);
        assert_eq!(r.signer_phones(), vec!["+5511999999999"]);
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&DocumentStatus::Partial).unwrap(),
            "\"partial\""
        );
        let parsed: DocumentStatus = serde_json::from_str("\"rejected\"").unwrap();
        assert_eq!(parsed, DocumentStatus::Rejected);
    }
}
