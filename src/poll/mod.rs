//! Scheduled polling of the remote signing service.
//!
//! Webhooks are the primary trigger for reconciliation, but they are not
//! sufficient alone: deliveries get lost, and a lost `document.finished` would
//! leave a record stale forever. The poll scheduler is the safety net that
//! periodically reconciles every document that could still change.
//!
//! Overlap policy: if a cycle is still running when the next tick fires, the
//! new cycle is skipped, not queued. One failing document increments the
//! error counter and the batch continues.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::reconcile::{Reconciler, ReconcileSource};
use crate::types::DocumentRecord;

/// Default interval between poll cycles (5 minutes).
const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;

/// Default staleness window: documents checked more recently than this are
/// skipped (5 minutes).
const DEFAULT_STALENESS_SECS: u64 = 300;

/// Configuration for the poll scheduler.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Interval between scheduled cycles.
    ///
    /// Default: 5 minutes. Configure via `SIGNTRACK_POLL_INTERVAL_MINS`.
    pub poll_interval: Duration,

    /// Documents whose `last_checked_at` is within this window are skipped.
    ///
    /// Default: 5 minutes. Configure via `SIGNTRACK_STALENESS_MINS`.
    pub staleness_window: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PollConfig {
    pub fn new() -> Self {
        PollConfig {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            staleness_window: Duration::from_secs(DEFAULT_STALENESS_SECS),
        }
    }

    /// Reads overrides from `SIGNTRACK_POLL_INTERVAL_MINS` and
    /// `SIGNTRACK_STALENESS_MINS`; anything unset or unparseable keeps its
    /// default.
    pub fn from_env() -> Self {
        let minutes = |var: &str, default_secs: u64| {
            std::env::var(var)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .map(|mins| Duration::from_secs(mins * 60))
                .unwrap_or(Duration::from_secs(default_secs))
        };
        PollConfig {
            poll_interval: minutes("SIGNTRACK_POLL_INTERVAL_MINS", DEFAULT_POLL_INTERVAL_SECS),
            staleness_window: minutes("SIGNTRACK_STALENESS_MINS", DEFAULT_STALENESS_SECS),
        }
    }
}

/// Counters from one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PollSummary {
    /// Documents that were reconciled this cycle.
    pub checked: usize,
    /// Documents whose status or counts changed.
    pub updated: usize,
    /// Documents that crossed into `Signed` this cycle.
    pub newly_signed: usize,
    /// Documents whose reconciliation failed.
    pub errors: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PollError {
    /// A cycle was requested while another was in flight.
    #[error("a poll cycle is already running")]
    AlreadyRunning,
}

/// Runs poll cycles, on a timer and on demand.
pub struct PollScheduler {
    reconciler: Arc<Reconciler>,
    config: PollConfig,
    /// Overlap guard: held for the duration of a cycle.
    cycle_guard: AsyncMutex<()>,
}

impl PollScheduler {
    pub fn new(reconciler: Arc<Reconciler>, config: PollConfig) -> Self {
        PollScheduler {
            reconciler,
            config,
            cycle_guard: AsyncMutex::new(()),
        }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Whether a record should be reconciled this cycle.
    ///
    /// Terminal documents are excluded unless `force` is set. The staleness
    /// window applies to forced runs too: a document checked within the last
    /// window is skipped either way.
    fn is_candidate(&self, record: &DocumentRecord, force: bool) -> bool {
        if !force && record.status.is_terminal() {
            return false;
        }
        match record.last_checked_at {
            None => true,
            Some(checked_at) => {
                let window = chrono::Duration::from_std(self.config.staleness_window)
                    .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_STALENESS_SECS as i64));
                checked_at < Utc::now() - window
            }
        }
    }

    /// Runs one cycle now, unless one is already in flight.
    pub async fn run_cycle(&self, force: bool) -> Result<PollSummary, PollError> {
        let _guard = self
            .cycle_guard
            .try_lock()
            .map_err(|_| PollError::AlreadyRunning)?;

        let mut summary = PollSummary::default();
        for (id, handle) in self.reconciler.store().all() {
            let candidate = {
                let record = handle.lock().await;
                self.is_candidate(&record, force)
            };
            if !candidate {
                continue;
            }

            summary.checked += 1;
            match self.reconciler.reconcile(id, ReconcileSource::Poll).await {
                Ok(outcome) => {
                    if outcome.changed {
                        summary.updated += 1;
                    }
                    if outcome.newly_signed {
                        summary.newly_signed += 1;
                    }
                }
                Err(err) => {
                    summary.errors += 1;
                    warn!(document_id = %id, error = %err, "poll reconciliation failed");
                }
            }
        }

        info!(
            checked = summary.checked,
            updated = summary.updated,
            newly_signed = summary.newly_signed,
            errors = summary.errors,
            "poll cycle finished"
        );
        Ok(summary)
    }

    /// Timer loop. Runs until the token is cancelled. Skipped ticks (cycle
    /// still running) are logged and dropped.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so startup does not race
        // document creation.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("poll scheduler shutting down");
                    return;
                }
                _ = interval.tick() => {
                    if let Err(PollError::AlreadyRunning) = self.run_cycle(false).await {
                        warn!("previous poll cycle still running, skipping tick");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{Dispatcher, LogSink};
    use crate::remote::error::RemoteApiError;
    use crate::remote::snapshot::NormalizedSnapshot;
    use crate::reconcile::SnapshotFetcher;
    use crate::store::DocumentStore;
    use crate::types::{DocumentId, DocumentStatus, RemoteDocumentId};
    use serde_json::json;
    use std::collections::HashMap;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    /// Fetcher that answers per remote ID.
    struct MapFetcher {
        responses: Mutex<HashMap<String, Result<(u32, u32, u32), ()>>>,
    }

    impl MapFetcher {
        fn new(entries: &[(&str, Result<(u32, u32, u32), ()>)]) -> Arc<Self> {
            Arc::new(MapFetcher {
                responses: Mutex::new(
                    entries
                        .iter()
                        .map(|(k, v)| (k.to_string(), *v))
                        .collect(),
                ),
            })
        }
    }

    impl SnapshotFetcher for MapFetcher {
        fn fetch<'a>(
            &'a self,
            remote_id: &'a RemoteDocumentId,
        ) -> Pin<
            Box<
                dyn Future<
                        Output = Result<(NormalizedSnapshot, serde_json::Value), RemoteApiError>,
                    > + Send
                    + 'a,
            >,
        > {
            let response = self
                .responses
                .lock()
                .unwrap()
                .get(remote_id.as_str())
                .copied();
            Box::pin(async move {
                match response {
                    Some(Ok((total, signed, rejected))) => Ok((
                        NormalizedSnapshot::from_counts(total, signed, rejected),
                        json!({"total": total}),
                    )),
                    Some(Err(())) => Err(RemoteApiError::transient("scripted failure")),
                    None => Err(RemoteApiError::permanent_with_status(404, "not found")),
                }
            })
        }
    }

    fn scheduler_with(
        store: Arc<DocumentStore>,
        fetcher: Arc<dyn SnapshotFetcher>,
    ) -> PollScheduler {
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(LogSink)));
        let reconciler = Arc::new(Reconciler::new(store, fetcher, dispatcher));
        PollScheduler::new(reconciler, PollConfig::new())
    }

    fn doc(store: &DocumentStore, remote: &str, total: u32) -> DocumentId {
        store
            .create(RemoteDocumentId::new(remote), remote, total, false, vec![])
            .unwrap()
            .0
    }

    #[tokio::test]
    async fn cycle_reconciles_stale_pending_documents() {
        let store = Arc::new(DocumentStore::new());
        let id = doc(&store, "doc-1", 2);
        let fetcher = MapFetcher::new(&[("doc-1", Ok((2, 1, 0)))]);
        let scheduler = scheduler_with(Arc::clone(&store), fetcher);

        let summary = scheduler.run_cycle(false).await.unwrap();
        assert_eq!(
            summary,
            PollSummary {
                checked: 1,
                updated: 1,
                newly_signed: 0,
                errors: 0,
            }
        );
        let record = store.get(id).unwrap().lock().await.clone();
        assert_eq!(record.status, DocumentStatus::Partial);
    }

    #[tokio::test]
    async fn force_does_not_bypass_the_staleness_window() {
        let store = Arc::new(DocumentStore::new());
        let id = doc(&store, "doc-1", 2);
        store.get(id).unwrap().lock().await.last_checked_at = Some(Utc::now());
        let fetcher = MapFetcher::new(&[("doc-1", Ok((2, 1, 0)))]);
        let scheduler = scheduler_with(store, fetcher);

        let summary = scheduler.run_cycle(true).await.unwrap();
        assert_eq!(summary.checked, 0);
    }

    #[tokio::test]
    async fn recently_checked_documents_are_skipped() {
        let store = Arc::new(DocumentStore::new());
        let id = doc(&store, "doc-1", 2);
        store.get(id).unwrap().lock().await.last_checked_at = Some(Utc::now());
        let fetcher = MapFetcher::new(&[("doc-1", Ok((2, 1, 0)))]);
        let scheduler = scheduler_with(store, fetcher);

        let summary = scheduler.run_cycle(false).await.unwrap();
        assert_eq!(summary.checked, 0);
    }

    #[tokio::test]
    async fn terminal_documents_are_skipped_unless_forced() {
        let store = Arc::new(DocumentStore::new());
        let id = doc(&store, "doc-1", 2);
        {
            let handle = store.get(id).unwrap();
            let mut record = handle.lock().await;
            record.status = DocumentStatus::Signed;
            record.signed_count = 2;
        }
        let fetcher = MapFetcher::new(&[("doc-1", Ok((2, 2, 0)))]);
        let scheduler = scheduler_with(Arc::clone(&store), fetcher);

        let summary = scheduler.run_cycle(false).await.unwrap();
        assert_eq!(summary.checked, 0);

        let summary = scheduler.run_cycle(true).await.unwrap();
        assert_eq!(summary.checked, 1);
        assert_eq!(summary.updated, 0);
    }

    #[tokio::test]
    async fn one_failing_document_does_not_abort_the_batch() {
        let store = Arc::new(DocumentStore::new());
        doc(&store, "doc-bad", 2);
        let good = doc(&store, "doc-good", 1);
        let fetcher = MapFetcher::new(&[("doc-bad", Err(())), ("doc-good", Ok((1, 1, 0)))]);
        let scheduler = scheduler_with(Arc::clone(&store), fetcher);

        let summary = scheduler.run_cycle(false).await.unwrap();
        assert_eq!(summary.checked, 2);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.newly_signed, 1);

        let record = store.get(good).unwrap().lock().await.clone();
        assert_eq!(record.status, DocumentStatus::Signed);
    }

    #[tokio::test]
    async fn overlapping_cycles_are_rejected() {
        let store = Arc::new(DocumentStore::new());
        let fetcher = MapFetcher::new(&[]);
        let scheduler = scheduler_with(store, fetcher);

        let _held = scheduler.cycle_guard.lock().await;
        assert_eq!(
            scheduler.run_cycle(false).await,
            Err(PollError::AlreadyRunning)
        );
    }

    #[test]
    fn default_config_has_expected_values() {
        let config = PollConfig::new();
        assert_eq!(config.poll_interval, Duration::from_secs(300));
        assert_eq!(config.staleness_window, Duration::from_secs(300));
    }

    #[tokio::test]
    async fn failed_document_is_not_retried_within_the_staleness_window() {
        let store = Arc::new(DocumentStore::new());
        doc(&store, "doc-gone", 1);
        // Not in the map, so the fetch returns permanent not-found.
        let fetcher = MapFetcher::new(&[]);
        let scheduler = scheduler_with(Arc::clone(&store), fetcher);

        let first = scheduler.run_cycle(false).await.unwrap();
        assert_eq!(first.errors, 1);

        // The failure advanced last_checked_at, so the immediate next cycle
        // skips the document.
        let second = scheduler.run_cycle(false).await.unwrap();
        assert_eq!(second.checked, 0);
    }
}
