//! Newtype wrappers for domain identifiers.
//!
//! These types prevent accidental mixing of different ID types (e.g., using
//! a local DocumentId where the signing service's remote ID is expected) and
//! make the code more self-documenting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Process-assigned identity of a local document record. Immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub u64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for DocumentId {
    fn from(n: u64) -> Self {
        DocumentId(n)
    }
}

/// Identifier of the signing request in the remote e-signature service.
///
/// Unique, write-once. The remote service uses UUID-shaped strings but this
/// type does not validate the format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteDocumentId(pub String);

impl RemoteDocumentId {
    pub fn new(s: impl Into<String>) -> Self {
        RemoteDocumentId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteDocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RemoteDocumentId {
    fn from(s: String) -> Self {
        RemoteDocumentId(s)
    }
}

impl From<&str> for RemoteDocumentId {
    fn from(s: &str) -> Self {
        RemoteDocumentId(s.to_string())
    }
}

/// Public identifier of a single signature slot within a remote document.
///
/// Used when resending signing invitations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignerPublicId(pub String);

impl SignerPublicId {
    pub fn new(s: impl Into<String>) -> Self {
        SignerPublicId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SignerPublicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an inbound webhook event, as assigned by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
    pub fn new(s: impl Into<String>) -> Self {
        EventId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EventId {
    fn from(s: String) -> Self {
        EventId(s)
    }
}
