//! Pure status transition logic.
//!
//! Everything here is synchronous and side-effect free: given the persisted
//! record and a normalized snapshot, compute the next status, whether
//! anything changed, and whether the fully-signed notification should fire.
//! Both reconciliation channels (poll and webhook) funnel through
//! [`evaluate`], so there is exactly one place where status policy lives.
//!
//! Status policy:
//! - any rejection marks the whole document `Rejected`, regardless of how
//!   many other signers already signed;
//! - `Signed` requires every signer to have signed (and at least one signer);
//! - `Signed` and `Rejected` are terminal: later snapshots refresh counts for
//!   audit but never move the status away.
//!
//! The fully-signed notification is edge-triggered: it fires exactly when the
//! status crosses into `Signed`, never when a later snapshot restates it.

use serde::Serialize;

use crate::remote::NormalizedSnapshot;
use crate::types::{DocumentRecord, DocumentStatus};

/// Result of running the status engine over one record and one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub previous_status: DocumentStatus,
    pub new_status: DocumentStatus,
    pub total_signers: u32,
    pub signed_count: u32,
    pub rejected_count: u32,
    /// True if status or any count differs from the persisted record.
    pub changed: bool,
    /// True exactly when this evaluation moved the document into `Signed`.
    pub newly_signed: bool,
}

impl ReconcileOutcome {
    /// Writes the computed status and counts back onto a record. Timestamps
    /// and the raw snapshot are the reconciler's business, not the engine's.
    pub fn apply_to(&self, record: &mut DocumentRecord) {
        record.status = self.new_status;
        record.total_signers = self.total_signers;
        record.signed_count = self.signed_count;
        record.rejected_count = self.rejected_count;
    }
}

/// The bare transition function over signer counts.
pub fn status_for_counts(
    total_signers: u32,
    signed_count: u32,
    rejected_count: u32,
) -> DocumentStatus {
    if rejected_count > 0 {
        DocumentStatus::Rejected
    } else if total_signers > 0 && signed_count == total_signers {
        DocumentStatus::Signed
    } else if signed_count > 0 {
        DocumentStatus::Partial
    } else {
        DocumentStatus::Pending
    }
}

/// Evaluates one snapshot against the persisted record.
pub fn evaluate(record: &DocumentRecord, snapshot: &NormalizedSnapshot) -> ReconcileOutcome {
    let previous_status = record.status;

    let computed = status_for_counts(
        snapshot.total_signers,
        snapshot.signed_count,
        snapshot.rejected_count,
    );
    // Terminal statuses do not revert; counts still refresh below.
    let new_status = if previous_status.is_terminal() {
        previous_status
    } else {
        computed
    };

    let changed = new_status != previous_status
        || snapshot.total_signers != record.total_signers
        || snapshot.signed_count != record.signed_count
        || snapshot.rejected_count != record.rejected_count;

    let newly_signed =
        previous_status != DocumentStatus::Signed && new_status == DocumentStatus::Signed;

    ReconcileOutcome {
        previous_status,
        new_status,
        total_signers: snapshot.total_signers,
        signed_count: snapshot.signed_count,
        rejected_count: snapshot.rejected_count,
        changed,
        newly_signed,
    }
}
