//! In-memory document store.
//!
//! Records live in process memory; persistence technology is out of scope
//! for this service. What the store does provide is the per-document
//! serialization point: each record sits behind its own async mutex, and the
//! reconciler holds that lock across its whole load-compute-persist sequence.
//! Two concurrent reconciliations for the same document (a poll cycle racing
//! a duplicate webhook delivery) therefore run one after the other, and the
//! second simply sees the state the first left behind.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;

use crate::types::{DocumentId, DocumentRecord, RemoteDocumentId, SignerContact};

/// A shared handle to one record's lock.
pub type DocumentHandle = Arc<AsyncMutex<DocumentRecord>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document {0} not found")]
    NotFound(DocumentId),

    #[error("remote document {0} is already tracked")]
    DuplicateRemoteId(RemoteDocumentId),
}

/// Registry of all tracked documents.
///
/// The registry maps are behind a plain mutex with short critical sections;
/// record contents are behind per-record async mutexes that may be held
/// across awaits.
pub struct DocumentStore {
    inner: Mutex<Inner>,
}

struct Inner {
    next_id: u64,
    by_id: HashMap<DocumentId, DocumentHandle>,
    by_remote: HashMap<RemoteDocumentId, DocumentId>,
}

impl DocumentStore {
    pub fn new() -> Self {
        DocumentStore {
            inner: Mutex::new(Inner {
                next_id: 1,
                by_id: HashMap::new(),
                by_remote: HashMap::new(),
            }),
        }
    }

    /// Creates and registers a fresh `Pending` record.
    pub fn create(
        &self,
        remote_id: RemoteDocumentId,
        name: impl Into<String>,
        total_signers: u32,
        is_sandbox: bool,
        signer_contacts: Vec<SignerContact>,
    ) -> Result<(DocumentId, DocumentHandle), StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.by_remote.contains_key(&remote_id) {
            return Err(StoreError::DuplicateRemoteId(remote_id));
        }

        let id = DocumentId(inner.next_id);
        inner.next_id += 1;

        let record = DocumentRecord::new(
            id,
            remote_id.clone(),
            name,
            total_signers,
            is_sandbox,
            signer_contacts,
        );
        let handle: DocumentHandle = Arc::new(AsyncMutex::new(record));
        inner.by_id.insert(id, Arc::clone(&handle));
        inner.by_remote.insert(remote_id, id);
        Ok((id, handle))
    }

    pub fn get(&self, id: DocumentId) -> Result<DocumentHandle, StoreError> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .by_id
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    pub fn find_by_remote(&self, remote_id: &RemoteDocumentId) -> Option<DocumentId> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.by_remote.get(remote_id).copied()
    }

    /// All handles currently registered, in insertion order of their IDs.
    pub fn all(&self) -> Vec<(DocumentId, DocumentHandle)> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries: Vec<_> = inner
            .by_id
            .iter()
            .map(|(id, handle)| (*id, Arc::clone(handle)))
            .collect();
        entries.sort_by_key(|(id, _)| id.0);
        entries
    }

    /// Cloned snapshots of every record, for read-only listing.
    pub async fn list(&self) -> Vec<DocumentRecord> {
        let mut records = Vec::new();
        for (_, handle) in self.all() {
            records.push(handle.lock().await.clone());
        }
        records
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocumentStatus;

    #[tokio::test]
    async fn create_assigns_sequential_ids() {
        let store = DocumentStore::new();
        let (a, _) = store
            .create(RemoteDocumentId::new("r1"), "A", 1, false, vec![])
            .unwrap();
        let (b, _) = store
            .create(RemoteDocumentId::new("r2"), "B", 2, false, vec![])
            .unwrap();
        assert_eq!(a, DocumentId(1));
        assert_eq!(b, DocumentId(2));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn duplicate_remote_id_is_rejected() {
        let store = DocumentStore::new();
        store
            .create(RemoteDocumentId::new("r1"), "A", 1, false, vec![])
            .unwrap();
        let err = store
            .create(RemoteDocumentId::new("r1"), "B", 1, false, vec![])
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateRemoteId(_)));
    }

    #[tokio::test]
    async fn lookup_by_remote_id() {
        let store = DocumentStore::new();
        let (id, _) = store
            .create(RemoteDocumentId::new("r1"), "A", 1, false, vec![])
            .unwrap();
        assert_eq!(store.find_by_remote(&RemoteDocumentId::new("r1")), Some(id));
        assert_eq!(store.find_by_remote(&RemoteDocumentId::new("zz")), None);
    }

    #[tokio::test]
    async fn get_unknown_id_is_not_found() {
        let store = DocumentStore::new();
        assert!(matches!(
            store.get(DocumentId(99)),
            Err(StoreError::NotFound(DocumentId(99)))
        ));
    }

    #[tokio::test]
    async fn mutations_through_handle_are_visible_in_listing() {
        let store = DocumentStore::new();
        let (_, handle) = store
            .create(RemoteDocumentId::new("r1"), "A", 2, false, vec![])
            .unwrap();
        {
            let mut record = handle.lock().await;
            record.status = DocumentStatus::Partial;
            record.signed_count = 1;
        }
        let listed = store.list().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, DocumentStatus::Partial);
        assert_eq!(listed[0].signed_count, 1);
    }

    #[tokio::test]
    async fn handle_lock_serializes_writers() {
        let store = Arc::new(DocumentStore::new());
        let (_, handle) = store
            .create(RemoteDocumentId::new("r1"), "A", 100, false, vec![])
            .unwrap();

        let mut tasks = Vec::new();
        for _ in 0..50 {
            let handle = Arc::clone(&handle);
            tasks.push(tokio::spawn(async move {
                let mut record = handle.lock().await;
                let seen = record.signed_count;
                tokio::task::yield_now().await;
                record.signed_count = seen + 1;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(handle.lock().await.signed_count, 50);
    }
}
