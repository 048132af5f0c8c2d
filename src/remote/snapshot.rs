//! Normalization of raw remote document payloads.
//!
//! The signing service reports per-signer state as an array of signature
//! slots, each with `signed` and `rejected` sub-objects that are null until
//! the signer acts. The status engine only cares about three counts, so this
//! module reduces a raw payload to a [`NormalizedSnapshot`] and nothing else.
//! The same normalizer runs on poll fetches and on full webhook payloads, so
//! both channels feed the engine identically shaped input.

use serde::Deserialize;
use thiserror::Error;

/// The counts the status engine consumes, extracted from one remote payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedSnapshot {
    pub total_signers: u32,
    pub signed_count: u32,
    pub rejected_count: u32,
    /// Document name as the remote reports it, when present.
    pub document_name: Option<String>,
}

impl NormalizedSnapshot {
    /// A snapshot built directly from counts, mainly for tests and for
    /// callers that already hold normalized numbers.
    pub fn from_counts(total_signers: u32, signed_count: u32, rejected_count: u32) -> Self {
        NormalizedSnapshot {
            total_signers,
            signed_count,
            rejected_count,
            document_name: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("payload is not a document object: {0}")]
    NotADocument(serde_json::Error),
}

/// Raw document payload as the remote service ships it. Everything the engine
/// does not need is left in the untyped remainder.
#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    signatures: Vec<RawSignature>,
}

/// One signature slot. `signed` and `rejected` are objects with timestamps
/// when the action happened and null otherwise; their contents are
/// irrelevant here, presence is the signal.
#[derive(Debug, Deserialize)]
struct RawSignature {
    #[serde(default)]
    signed: Option<serde_json::Value>,
    #[serde(default)]
    rejected: Option<serde_json::Value>,
}

impl RawSignature {
    /// A rejection supersedes a signature on the same slot, so a slot with
    /// both markers tallies as rejected only and the counts always satisfy
    /// `signed + rejected <= total`.
    fn is_signed(&self) -> bool {
        marker_present(&self.signed) && !self.is_rejected()
    }

    fn is_rejected(&self) -> bool {
        marker_present(&self.rejected)
    }
}

/// A slot counts as acted-on when the marker field is a non-null value.
/// Some payloads ship `{}` rather than a timestamp object; that still counts.
fn marker_present(marker: &Option<serde_json::Value>) -> bool {
    match marker {
        None => false,
        Some(serde_json::Value::Null) => false,
        Some(_) => true,
    }
}

/// Reduces a raw document payload to signer counts.
///
/// A payload with no `signatures` array normalizes to all-zero counts; the
/// remote omits the array for documents with no signers attached yet. A
/// payload that is not a document object at all is an error, which callers
/// treat as permanent.
pub fn normalize(payload: &serde_json::Value) -> Result<NormalizedSnapshot, NormalizeError> {
    let doc: RawDocument =
        serde_json::from_value(payload.clone()).map_err(NormalizeError::NotADocument)?;

    let total_signers = doc.signatures.len() as u32;
    let signed_count = doc.signatures.iter().filter(|s| s.is_signed()).count() as u32;
    let rejected_count = doc.signatures.iter().filter(|s| s.is_rejected()).count() as u32;

    Ok(NormalizedSnapshot {
        total_signers,
        signed_count,
        rejected_count,
        document_name: doc.name,
    })
}
