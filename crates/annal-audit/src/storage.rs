//! Audit store trait and the key-value implementation.
//!
//! A store owns the total order of its records. [`AuditStore::append`] reads
//! the chain head, lets the caller seal the new record against it and
//! persists the result, all under one per-store lock.

use std::sync::{Arc, Mutex, PoisonError};

use annal_crypto::{ContentHash, RecordSignature};
use annal_storage::{KvStore, MemoryKvStore, StorageError};
use tracing::{debug, warn};

use crate::error::{AuditError, AuditResult};
use crate::record::{AuditEntry, AuditRecord};
use crate::schema::StoreCapabilities;

/// Where the next record attaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainHead {
    /// Hash of the latest record; `None` for an empty store.
    pub previous_hash: Option<ContentHash>,
    /// Id the next record receives.
    pub next_id: u64,
}

impl ChainHead {
    /// The head of an empty store.
    #[must_use]
    pub const fn genesis() -> Self {
        Self {
            previous_hash: None,
            next_id: 1,
        }
    }

    /// The head after `record`.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Storage`] if the id space is exhausted.
    pub fn after(record: &AuditRecord) -> AuditResult<Self> {
        let next_id = record.id.checked_add(1).ok_or_else(|| {
            AuditError::Storage(StorageError::Internal("record id space exhausted".into()))
        })?;
        Ok(Self {
            previous_hash: Some(record.hash),
            next_id,
        })
    }
}

/// The chain fields computed for a new record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seal {
    /// Chain hash of the record.
    pub hash: ContentHash,
    /// Signature over `hash`, when signing.
    pub signature: Option<RecordSignature>,
}

/// Closure that seals an entry against a chain head.
pub type SealFn<'a> = dyn Fn(&ChainHead) -> AuditResult<Seal> + 'a;

/// Persistence for audit records.
///
/// Implementations never update or delete records.
pub trait AuditStore: Send + Sync {
    /// Optional columns this store persists.
    fn capabilities(&self) -> StoreCapabilities;

    /// Append `entry` at the chain head.
    ///
    /// `seal` runs while the store is locked and must not call back into the
    /// store.
    ///
    /// # Errors
    ///
    /// Returns the sealing error, or [`AuditError::Storage`] if the record
    /// could not be persisted. Nothing is retried.
    fn append(&self, entry: AuditEntry, seal: &SealFn<'_>) -> AuditResult<AuditRecord>;

    /// The record with the highest id.
    ///
    /// # Errors
    ///
    /// Returns an error if retrieval or deserialization fails.
    fn latest(&self) -> AuditResult<Option<AuditRecord>>;

    /// Get a record by id.
    ///
    /// # Errors
    ///
    /// Returns an error if retrieval or deserialization fails.
    fn get(&self, id: u64) -> AuditResult<Option<AuditRecord>>;

    /// Up to `limit` records with id `>= from_id`, ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if retrieval or deserialization fails.
    fn range(&self, from_id: u64, limit: usize) -> AuditResult<Vec<AuditRecord>>;

    /// All records, ascending by id.
    ///
    /// # Errors
    ///
    /// Returns an error if retrieval or deserialization fails.
    fn all(&self) -> AuditResult<Vec<AuditRecord>> {
        self.range(1, usize::MAX)
    }

    /// Number of records.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails.
    fn count(&self) -> AuditResult<usize>;

    /// Flush pending writes to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails to flush.
    fn flush(&self) -> AuditResult<()>;
}

const NS_RECORDS: &str = "audit:records";

fn record_key(id: u64) -> String {
    format!("{id:020}")
}

/// Run an async future synchronously.
///
/// Inside a tokio runtime the future runs on a scoped thread via the current
/// handle; outside one a current-thread runtime is built for the call.
fn block_on<F>(f: F) -> AuditResult<F::Output>
where
    F: std::future::Future + Send,
    F::Output: Send,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => std::thread::scope(|s| s.spawn(|| handle.block_on(f)).join()).map_err(
            |_| AuditError::Storage(StorageError::Internal("storage task panicked".into())),
        ),
        Err(_) => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            Ok(runtime.block_on(f))
        },
    }
}

/// [`AuditStore`] over a [`KvStore`], one JSON row per record.
///
/// Rows live in the `audit:records` namespace under the zero-padded id, so
/// key order is id order. Appends use a create-only insert: a second store
/// over the same backend with a stale head fails instead of forking the
/// chain.
pub struct KvAuditStore {
    store: Arc<dyn KvStore>,
    capabilities: StoreCapabilities,
    head: Mutex<Option<ChainHead>>,
}

impl KvAuditStore {
    /// Wrap a key-value store. All optional columns are persisted.
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            capabilities: StoreCapabilities::full(),
            head: Mutex::new(None),
        }
    }

    /// An in-memory store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKvStore::new()))
    }

    /// Open or create a persistent store at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the `SurrealKV` store fails to open.
    #[cfg(feature = "kv")]
    pub fn open(path: impl AsRef<std::path::Path>) -> AuditResult<Self> {
        let store = annal_storage::SurrealKvStore::open(path)?;
        Ok(Self::new(Arc::new(store)))
    }

    /// Restrict the optional columns this store persists.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: StoreCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    fn decode(bytes: &[u8]) -> AuditResult<AuditRecord> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn load_head(&self) -> AuditResult<ChainHead> {
        match self.latest()? {
            Some(record) => ChainHead::after(&record),
            None => Ok(ChainHead::genesis()),
        }
    }
}

impl AuditStore for KvAuditStore {
    fn capabilities(&self) -> StoreCapabilities {
        self.capabilities
    }

    fn append(&self, entry: AuditEntry, seal: &SealFn<'_>) -> AuditResult<AuditRecord> {
        let mut cached = self.head.lock().unwrap_or_else(PoisonError::into_inner);
        let head = match *cached {
            Some(head) => head,
            None => self.load_head()?,
        };

        let sealed = seal(&head)?;
        let record = AuditRecord {
            id: head.next_id,
            entry,
            hash: sealed.hash,
            previous_hash: head.previous_hash,
            signature: sealed.signature,
        };
        let key = record_key(record.id);
        let data = serde_json::to_vec(&record)?;

        let persisted = block_on(self.store.insert_new(NS_RECORDS, &key, data))
            .and_then(|r| r.map_err(AuditError::from));
        if let Err(e) = persisted {
            // The backend may have moved on without us; reload next time.
            *cached = None;
            warn!(id = record.id, error = %e, "audit append failed");
            return Err(e);
        }

        *cached = Some(ChainHead::after(&record)?);
        debug!(id = record.id, hash = %record.hash.short(), "audit record appended");
        Ok(record)
    }

    fn latest(&self) -> AuditResult<Option<AuditRecord>> {
        let Some(key) = block_on(self.store.last_key(NS_RECORDS))?? else {
            return Ok(None);
        };
        match block_on(self.store.get(NS_RECORDS, &key))?? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn get(&self, id: u64) -> AuditResult<Option<AuditRecord>> {
        block_on(self.store.get(NS_RECORDS, &record_key(id)))??
            .map(|bytes| Self::decode(&bytes))
            .transpose()
    }

    fn range(&self, from_id: u64, limit: usize) -> AuditResult<Vec<AuditRecord>> {
        // Zero-padded keys sort in id order, so the scan starts at `from_id`.
        block_on(self.store.scan(NS_RECORDS, &record_key(from_id), limit))??
            .iter()
            .map(|(_, bytes)| Self::decode(bytes))
            .collect()
    }

    fn count(&self) -> AuditResult<usize> {
        Ok(block_on(self.store.count(NS_RECORDS))??)
    }

    fn flush(&self) -> AuditResult<()> {
        // Every append commits its own transaction.
        Ok(())
    }
}

impl std::fmt::Debug for KvAuditStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvAuditStore")
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}
