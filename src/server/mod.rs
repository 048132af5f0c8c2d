//! HTTP server: webhook ingestion plus the document API.
//!
//! # Endpoints
//!
//! - `POST /webhook` - inbound deliveries from the signing service
//! - `POST /api/documents` - create a signing request
//! - `GET /api/documents` - list tracked documents (filter by status/sandbox)
//! - `POST /api/documents/{id}/sync` - reconcile one document now
//! - `POST /api/documents/check` - run a poll cycle now (`?force=true` to
//!   include terminal documents)
//! - `POST /api/signatures/resend` - resend signing invitations
//! - `GET /health` - liveness probe

use std::sync::Arc;

pub mod documents;
pub mod health;
pub mod webhook;

pub use health::health_handler;
pub use webhook::webhook_handler;

use crate::notify::Dispatcher;
use crate::poll::PollScheduler;
use crate::reconcile::Reconciler;
use crate::remote::SigningService;
use crate::store::DocumentStore;

/// Shared application state, passed to handlers via axum's `State`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: Arc<DocumentStore>,
    reconciler: Arc<Reconciler>,
    scheduler: Arc<PollScheduler>,
    signing: Arc<dyn SigningService>,
    dispatcher: Arc<Dispatcher>,
    /// HMAC secret for webhook verification; absent means verification is
    /// skipped.
    webhook_secret: Option<Vec<u8>>,
    sandbox_default: bool,
}

impl AppState {
    pub fn new(
        store: Arc<DocumentStore>,
        reconciler: Arc<Reconciler>,
        scheduler: Arc<PollScheduler>,
        signing: Arc<dyn SigningService>,
        dispatcher: Arc<Dispatcher>,
        webhook_secret: Option<Vec<u8>>,
        sandbox_default: bool,
    ) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                store,
                reconciler,
                scheduler,
                signing,
                dispatcher,
                webhook_secret,
                sandbox_default,
            }),
        }
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.inner.store
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.inner.reconciler
    }

    pub fn scheduler(&self) -> &Arc<PollScheduler> {
        &self.inner.scheduler
    }

    pub fn signing(&self) -> &Arc<dyn SigningService> {
        &self.inner.signing
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.inner.dispatcher
    }

    pub fn webhook_secret(&self) -> Option<&[u8]> {
        self.inner.webhook_secret.as_deref()
    }

    pub fn sandbox_default(&self) -> bool {
        self.inner.sandbox_default
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/webhook", post(webhook::webhook_handler))
        .route(
            "/api/documents",
            post(documents::create_handler).get(documents::list_handler),
        )
        .route("/api/documents/{id}/sync", post(documents::sync_handler))
        .route("/api/documents/check", post(documents::check_handler))
        .route("/api/signatures/resend", post(documents::resend_handler))
        .route("/health", get(health::health_handler))
        .with_state(app_state)
}
