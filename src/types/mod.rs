//! Core domain types for document signing state.

pub mod document;
pub mod ids;

pub use document::{ContactChannel, DocumentRecord, DocumentStatus, SignerContact};
pub use ids::{DocumentId, EventId, RemoteDocumentId, SignerPublicId};
