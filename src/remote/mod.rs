//! Client and types for the remote e-signature service.
//!
//! The remote service is the source of truth for signing state. This module
//! owns the GraphQL-over-HTTP client, the error taxonomy that separates
//! retriable failures from dead ends, and the normalizer that reduces raw
//! document payloads to the counts the status engine consumes.

pub mod client;
pub mod error;
pub mod snapshot;

use std::future::Future;
use std::pin::Pin;

use crate::types::{SignerContact, SignerPublicId};

pub use client::{CreatedDocument, SigningClient};
pub use error::{RemoteApiError, RemoteErrorKind};
pub use snapshot::{normalize, NormalizedSnapshot};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Mutation side of the signing service, behind a trait so handlers can be
/// exercised without a live endpoint.
pub trait SigningService: Send + Sync {
    fn create_document<'a>(
        &'a self,
        name: &'a str,
        signers: &'a [SignerContact],
        sandbox: bool,
    ) -> BoxFuture<'a, Result<CreatedDocument, RemoteApiError>>;

    fn resend_signatures<'a>(
        &'a self,
        public_ids: &'a [SignerPublicId],
    ) -> BoxFuture<'a, Result<(), RemoteApiError>>;
}

impl SigningService for SigningClient {
    fn create_document<'a>(
        &'a self,
        name: &'a str,
        signers: &'a [SignerContact],
        sandbox: bool,
    ) -> BoxFuture<'a, Result<CreatedDocument, RemoteApiError>> {
        Box::pin(SigningClient::create_document(self, name, signers, sandbox))
    }

    fn resend_signatures<'a>(
        &'a self,
        public_ids: &'a [SignerPublicId],
    ) -> BoxFuture<'a, Result<(), RemoteApiError>> {
        Box::pin(SigningClient::resend_signatures(self, public_ids))
    }
}
