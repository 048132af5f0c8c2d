//! The reconciler: one canonical path from a snapshot source to a persisted
//! record update.
//!
//! Both triggers (the poll scheduler and webhook ingestion) call
//! [`Reconciler::reconcile`] with a source describing where the snapshot
//! comes from. Full document payloads are normalized directly; partial
//! signature payloads force a fallback authoritative fetch, because computing
//! a transition from one signer's slice of the document would produce
//! spurious regressions.
//!
//! The per-document lock is held across the whole load-fetch-compute-persist
//! sequence, so concurrent reconciliations for one document serialize and the
//! second sees the state the first left. `last_checked_at` advances on
//! success and on both error classes; a permanently broken remote document
//! must not be re-fetched by every cycle forever, and a transiently failing
//! one is retried on the next cycle, not in a hot loop.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::engine::{self, ReconcileOutcome};
use crate::notify::{Dispatcher, Notification, NotificationIntent};
use crate::remote::error::RemoteApiError;
use crate::remote::snapshot::{self, NormalizedSnapshot};
use crate::remote::SigningClient;
use crate::store::{DocumentStore, StoreError};
use crate::types::{DocumentId, RemoteDocumentId};
use crate::webhook::WebhookEvent;

/// Where the snapshot for a reconciliation comes from.
#[derive(Debug, Clone)]
pub enum ReconcileSource {
    /// Scheduled or on-demand poll; always fetches from the remote service.
    Poll,
    /// Inbound webhook delivery. The event decides whether its payload can be
    /// normalized directly or a fallback fetch is needed.
    Webhook(WebhookEvent),
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Remote(#[from] RemoteApiError),

    #[error("webhook payload could not be normalized: {0}")]
    Normalize(#[from] snapshot::NormalizeError),
}

impl ReconcileError {
    /// True when retrying on the next poll cycle can plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ReconcileError::Remote(err) if err.is_retriable())
    }
}

/// Source of authoritative snapshots. [`SigningClient`] is the production
/// implementation; tests substitute their own.
pub trait SnapshotFetcher: Send + Sync {
    fn fetch<'a>(
        &'a self,
        remote_id: &'a RemoteDocumentId,
    ) -> Pin<
        Box<
            dyn Future<Output = Result<(NormalizedSnapshot, serde_json::Value), RemoteApiError>>
                + Send
                + 'a,
        >,
    >;
}

impl SnapshotFetcher for SigningClient {
    fn fetch<'a>(
        &'a self,
        remote_id: &'a RemoteDocumentId,
    ) -> Pin<
        Box<
            dyn Future<Output = Result<(NormalizedSnapshot, serde_json::Value), RemoteApiError>>
                + Send
                + 'a,
        >,
    > {
        Box::pin(self.fetch_snapshot(remote_id))
    }
}

/// The single writer of document status, counts and timestamps.
pub struct Reconciler {
    store: Arc<DocumentStore>,
    fetcher: Arc<dyn SnapshotFetcher>,
    dispatcher: Arc<Dispatcher>,
}

impl Reconciler {
    pub fn new(
        store: Arc<DocumentStore>,
        fetcher: Arc<dyn SnapshotFetcher>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Reconciler {
            store,
            fetcher,
            dispatcher,
        }
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    /// Runs one reconciliation for one document.
    pub async fn reconcile(
        &self,
        id: DocumentId,
        source: ReconcileSource,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let handle = self.store.get(id)?;
        let mut record = handle.lock().await;

        let snapshot_result = match &source {
            ReconcileSource::Poll => self.fetcher.fetch(&record.remote_id).await,
            ReconcileSource::Webhook(event) if event.kind.carries_full_payload() => {
                match snapshot::normalize(&event.data) {
                    Ok(snap) => Ok((snap, event.data.clone())),
                    Err(err) => {
                        // Same timestamp discipline as a fetch failure.
                        record.last_checked_at = Some(Utc::now());
                        return Err(err.into());
                    }
                }
            }
            // Partial per-signer view; fetch the authoritative aggregate.
            ReconcileSource::Webhook(_) => self.fetcher.fetch(&record.remote_id).await,
        };

        let (snapshot, raw_payload) = match snapshot_result {
            Ok(pair) => pair,
            Err(err) => {
                record.last_checked_at = Some(Utc::now());
                warn!(
                    document_id = %id,
                    remote_id = %record.remote_id,
                    transient = err.is_retriable(),
                    error = %err,
                    "snapshot fetch failed"
                );
                return Err(err.into());
            }
        };

        let outcome = engine::evaluate(&record, &snapshot);
        outcome.apply_to(&mut record);
        // The remote name is authoritative; pick up renames alongside counts.
        if let Some(name) = snapshot.document_name.as_deref() {
            if name != record.name {
                record.name = name.to_owned();
            }
        }
        record.last_remote_snapshot = Some(raw_payload);
        record.last_checked_at = Some(Utc::now());

        if outcome.changed {
            info!(
                document_id = %id,
                remote_id = %record.remote_id,
                previous_status = %outcome.previous_status,
                new_status = %outcome.new_status,
                signed = outcome.signed_count,
                rejected = outcome.rejected_count,
                total = outcome.total_signers,
                "document reconciled"
            );
        } else {
            debug!(document_id = %id, "reconciled, no change");
        }

        let notification = outcome.newly_signed.then(|| Notification {
            document_id: id,
            remote_id: record.remote_id.clone(),
            document_name: record.name.clone(),
            intent: NotificationIntent::DocumentFullySigned,
            signer: None,
        });
        drop(record);

        // Fire-and-forget: record state is already persisted.
        if let Some(notification) = notification {
            self.dispatcher.dispatch(&notification);
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{LogSink, NotificationSink};
    use crate::remote::error::RemoteErrorKind;
    use crate::types::DocumentStatus;
    use crate::webhook::parse_envelope;
    use serde_json::json;
    use std::sync::Mutex;

    /// Fetcher returning a fixed sequence of canned results.
    struct ScriptedFetcher {
        results: Mutex<Vec<Result<(NormalizedSnapshot, serde_json::Value), RemoteApiError>>>,
    }

    impl ScriptedFetcher {
        fn new(
            results: Vec<Result<(NormalizedSnapshot, serde_json::Value), RemoteApiError>>,
        ) -> Arc<Self> {
            Arc::new(ScriptedFetcher {
                results: Mutex::new(results),
            })
        }

        fn counts(total: u32, signed: u32, rejected: u32) -> (NormalizedSnapshot, serde_json::Value) {
            (
                NormalizedSnapshot::from_counts(total, signed, rejected),
                json!({"total": total, "signed": signed, "rejected": rejected}),
            )
        }
    }

    impl SnapshotFetcher for ScriptedFetcher {
        fn fetch<'a>(
            &'a self,
            _remote_id: &'a RemoteDocumentId,
        ) -> Pin<
            Box<
                dyn Future<
                        Output = Result<(NormalizedSnapshot, serde_json::Value), RemoteApiError>,
                    > + Send
                    + 'a,
            >,
        > {
            let next = {
                let mut results = self.results.lock().unwrap();
                if results.is_empty() {
                    Err(RemoteApiError::permanent("script exhausted"))
                } else {
                    results.remove(0)
                }
            };
            Box::pin(async move { next })
        }
    }

    struct CountingSink(std::sync::atomic::AtomicUsize);

    impl NotificationSink for CountingSink {
        fn deliver(
            &self,
            _notification: &Notification,
        ) -> Result<(), crate::notify::NotificationError> {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    fn reconciler_with(
        fetcher: Arc<dyn SnapshotFetcher>,
    ) -> (Reconciler, Arc<DocumentStore>, DocumentId) {
        let store = Arc::new(DocumentStore::new());
        let (id, _) = store
            .create(RemoteDocumentId::new("doc-1"), "Contract", 2, false, vec![])
            .unwrap();
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(LogSink)));
        (
            Reconciler::new(Arc::clone(&store), fetcher, dispatcher),
            store,
            id,
        )
    }

    #[tokio::test]
    async fn poll_updates_record_from_fetched_snapshot() {
        let fetcher = ScriptedFetcher::new(vec![Ok(ScriptedFetcher::counts(2, 1, 0))]);
        let (reconciler, store, id) = reconciler_with(fetcher);

        let outcome = reconciler.reconcile(id, ReconcileSource::Poll).await.unwrap();
        assert_eq!(outcome.new_status, DocumentStatus::Partial);
        assert!(outcome.changed);

        let record = store.get(id).unwrap().lock().await.clone();
        assert_eq!(record.status, DocumentStatus::Partial);
        assert_eq!(record.signed_count, 1);
        assert!(record.last_checked_at.is_some());
        assert!(record.last_remote_snapshot.is_some());
    }

    #[tokio::test]
    async fn remote_rename_is_picked_up_on_reconciliation() {
        let snapshot = NormalizedSnapshot {
            document_name: Some("Contract (final)".into()),
            ..NormalizedSnapshot::from_counts(2, 1, 0)
        };
        let fetcher = ScriptedFetcher::new(vec![Ok((snapshot, json!({})))]);
        let (reconciler, store, id) = reconciler_with(fetcher);

        reconciler.reconcile(id, ReconcileSource::Poll).await.unwrap();

        let record = store.get(id).unwrap().lock().await.clone();
        assert_eq!(record.name, "Contract (final)");
    }

    #[tokio::test]
    async fn full_webhook_payload_skips_the_fetcher() {
        // Script is empty; a fetch would fail the test.
        let fetcher = ScriptedFetcher::new(vec![]);
        let (reconciler, store, id) = reconciler_with(fetcher);

        let event = parse_envelope(
            &serde_json::to_vec(&json!({
                "event": {
                    "type": "document.updated",
                    "id": "evt-1",
                    "data": {
                        "id": "doc-1",
                        "signatures": [
                            {"signed": {"created_at": "2026-08-01T00:00:00Z"}, "rejected": null},
                            {"signed": null, "rejected": null},
                        ],
                    },
                },
            }))
            .unwrap(),
        )
        .unwrap()
        .unwrap();

        let outcome = reconciler
            .reconcile(id, ReconcileSource::Webhook(event))
            .await
            .unwrap();
        assert_eq!(outcome.new_status, DocumentStatus::Partial);
        assert_eq!(outcome.signed_count, 1);

        let record = store.get(id).unwrap().lock().await.clone();
        assert_eq!(record.status, DocumentStatus::Partial);
    }

    #[tokio::test]
    async fn partial_webhook_payload_falls_back_to_fetch() {
        let fetcher = ScriptedFetcher::new(vec![Ok(ScriptedFetcher::counts(2, 2, 0))]);
        let (reconciler, _store, id) = reconciler_with(fetcher);

        let event = parse_envelope(
            &serde_json::to_vec(&json!({
                "event": {
                    "type": "signature.accepted",
                    "id": "evt-2",
                    "data": {"document": "doc-1", "user": {"email": "a@example.com"}},
                },
            }))
            .unwrap(),
        )
        .unwrap()
        .unwrap();

        let outcome = reconciler
            .reconcile(id, ReconcileSource::Webhook(event))
            .await
            .unwrap();
        // The authoritative fetch, not the one-signer payload, drove the
        // transition.
        assert_eq!(outcome.new_status, DocumentStatus::Signed);
        assert!(outcome.newly_signed);
    }

    #[tokio::test]
    async fn fetch_errors_still_advance_last_checked_at() {
        for err in [
            RemoteApiError::transient("connection reset"),
            RemoteApiError::permanent_with_status(404, "not found"),
        ] {
            let expect_transient = err.kind == RemoteErrorKind::Transient;
            let fetcher = ScriptedFetcher::new(vec![Err(err)]);
            let (reconciler, store, id) = reconciler_with(fetcher);

            let result = reconciler.reconcile(id, ReconcileSource::Poll).await;
            let err = result.unwrap_err();
            assert_eq!(err.is_transient(), expect_transient);

            let record = store.get(id).unwrap().lock().await.clone();
            assert!(record.last_checked_at.is_some());
            // State untouched by the failed attempt.
            assert_eq!(record.status, DocumentStatus::Pending);
            assert!(record.last_remote_snapshot.is_none());
        }
    }

    #[tokio::test]
    async fn fully_signed_notification_fires_exactly_once() {
        let sink = Arc::new(CountingSink(std::sync::atomic::AtomicUsize::new(0)));
        let store = Arc::new(DocumentStore::new());
        let (id, _) = store
            .create(RemoteDocumentId::new("doc-1"), "Contract", 2, false, vec![])
            .unwrap();
        let fetcher = ScriptedFetcher::new(vec![
            Ok(ScriptedFetcher::counts(2, 2, 0)),
            Ok(ScriptedFetcher::counts(2, 2, 0)),
        ]);
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&sink) as Arc<dyn NotificationSink>
        ));
        let reconciler = Reconciler::new(Arc::clone(&store), fetcher, dispatcher);

        let first = reconciler.reconcile(id, ReconcileSource::Poll).await.unwrap();
        assert!(first.newly_signed);
        let second = reconciler.reconcile(id, ReconcileSource::Poll).await.unwrap();
        assert!(!second.newly_signed);
        assert!(!second.changed);

        assert_eq!(sink.0.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_reconciliations_serialize_and_notify_once() {
        let sink = Arc::new(CountingSink(std::sync::atomic::AtomicUsize::new(0)));
        let store = Arc::new(DocumentStore::new());
        let (id, _) = store
            .create(RemoteDocumentId::new("doc-1"), "Contract", 2, false, vec![])
            .unwrap();
        // Both racers see the same fully-signed remote state.
        let fetcher = ScriptedFetcher::new(vec![
            Ok(ScriptedFetcher::counts(2, 2, 0)),
            Ok(ScriptedFetcher::counts(2, 2, 0)),
        ]);
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&sink) as Arc<dyn NotificationSink>
        ));
        let reconciler = Arc::new(Reconciler::new(Arc::clone(&store), fetcher, dispatcher));

        let a = tokio::spawn({
            let reconciler = Arc::clone(&reconciler);
            async move { reconciler.reconcile(id, ReconcileSource::Poll).await }
        });
        let b = tokio::spawn({
            let reconciler = Arc::clone(&reconciler);
            async move { reconciler.reconcile(id, ReconcileSource::Poll).await }
        });

        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();

        // Whichever ran second saw Signed already persisted.
        assert_eq!(
            [a.newly_signed, b.newly_signed].iter().filter(|x| **x).count(),
            1
        );
        assert_eq!(sink.0.load(std::sync::atomic::Ordering::SeqCst), 1);
        let record = store.get(id).unwrap().lock().await.clone();
        assert_eq!(record.status, DocumentStatus::Signed);
    }

    #[tokio::test]
    async fn unknown_document_is_a_store_error() {
        let fetcher = ScriptedFetcher::new(vec![]);
        let (reconciler, _store, _id) = reconciler_with(fetcher);
        let err = reconciler
            .reconcile(DocumentId(999), ReconcileSource::Poll)
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Store(StoreError::NotFound(_))));
    }
}
