//! Raw key-value store trait and implementations.
//!
//! All operations are scoped to a namespace. The audit log keeps its rows
//! under `audit:records`, keyed by a zero-padded sequence number so that
//! lexicographic key order equals append order.
//!
//! # Create-only writes
//!
//! [`KvStore::insert_new`] writes a key only if it is absent, in one
//! transaction. The audit store uses it so that two writers holding the
//! same stale chain head cannot both persist a successor.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::{StorageError, StorageResult};

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Namespaces must be non-empty and must not contain the null byte
/// (used internally as the namespace/key separator).
fn validate_namespace(namespace: &str) -> StorageResult<()> {
    if namespace.is_empty() {
        return Err(StorageError::InvalidKey(
            "namespace must not be empty".into(),
        ));
    }
    if namespace.contains('\0') {
        return Err(StorageError::InvalidKey(
            "namespace must not contain null bytes".into(),
        ));
    }
    Ok(())
}

fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("key must not be empty".into()));
    }
    if key.contains('\0') {
        return Err(StorageError::InvalidKey(
            "key must not contain null bytes".into(),
        ));
    }
    Ok(())
}

/// Build the composite key `"{namespace}\0{key}"`.
fn composite_key(namespace: &str, key: &str) -> String {
    let mut buf = String::with_capacity(namespace.len().saturating_add(key.len()).saturating_add(1));
    buf.push_str(namespace);
    buf.push('\0');
    buf.push_str(key);
    buf
}

/// Range `["{namespace}\0", "{namespace}\x01")` captures exactly the keys
/// of one namespace, since `\x01` immediately follows the separator.
fn namespace_bounds(namespace: &str) -> (String, String) {
    let mut start = String::with_capacity(namespace.len().saturating_add(1));
    start.push_str(namespace);
    start.push('\0');
    let mut end = String::with_capacity(namespace.len().saturating_add(1));
    end.push_str(namespace);
    end.push('\x01');
    (start, end)
}
/// Composite key for the first entry at or after `key` in `namespace`.
fn scan_start(namespace: &str, key: &str) -> String {
    if key.is_empty() {
        namespace_bounds(namespace).0
    } else {
        composite_key(namespace, key)
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Raw key-value store trait.
///
/// Provides namespaced byte-level storage. Implementations must be safe to
/// share across threads.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Get a value by namespace and key.
    ///
    /// Returns `None` if the key does not exist.
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Write a value only if the key is absent.
    ///
    /// Returns [`StorageError::Conflict`] if the key already exists.
    async fn insert_new(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()>;

    /// Up to `limit` entries whose key is `>= start`, in ascending byte
    /// order. An empty `start` scans from the beginning of the namespace.
    async fn scan(
        &self,
        namespace: &str,
        start: &str,
        limit: usize,
    ) -> StorageResult<Vec<(String, Vec<u8>)>>;

    /// Number of keys in a namespace.
    async fn count(&self, namespace: &str) -> StorageResult<usize>;

    /// The greatest key in a namespace, if any.
    async fn last_key(&self, namespace: &str) -> StorageResult<Option<String>>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// In-memory key-value store for tests and ephemeral logs.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    data: std::sync::RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryKvStore {
    /// Create a new empty in-memory KV store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Internal(e.to_string())
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let data = self.data.read().map_err(poisoned)?;
        Ok(data.get(&composite_key(namespace, key)).cloned())
    }

    async fn insert_new(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let mut data = self.data.write().map_err(poisoned)?;
        match data.entry(composite_key(namespace, key)) {
            std::collections::btree_map::Entry::Occupied(_) => {
                Err(StorageError::Conflict(format!("{namespace}/{key}")))
            },
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(value);
                Ok(())
            },
        }
    }

    async fn scan(
        &self,
        namespace: &str,
        start: &str,
        limit: usize,
    ) -> StorageResult<Vec<(String, Vec<u8>)>> {
        validate_namespace(namespace)?;
        let (prefix, end) = namespace_bounds(namespace);
        let data = self.data.read().map_err(poisoned)?;
        Ok(data
            .range(scan_start(namespace, start)..end)
            .take(limit)
            .filter_map(|(k, v)| {
                k.strip_prefix(prefix.as_str())
                    .map(|key| (key.to_string(), v.clone()))
            })
            .collect())
    }

    async fn count(&self, namespace: &str) -> StorageResult<usize> {
        validate_namespace(namespace)?;
        let (start, end) = namespace_bounds(namespace);
        let data = self.data.read().map_err(poisoned)?;
        Ok(data.range(start..end).count())
    }

    async fn last_key(&self, namespace: &str) -> StorageResult<Option<String>> {
        validate_namespace(namespace)?;
        let (start, end) = namespace_bounds(namespace);
        let data = self.data.read().map_err(poisoned)?;
        Ok(data
            .range(start.clone()..end)
            .next_back()
            .and_then(|(k, _)| k.strip_prefix(start.as_str()).map(String::from)))
    }
}

// ---------------------------------------------------------------------------
// SurrealKV implementation (behind `kv` feature)
// ---------------------------------------------------------------------------

/// Persistent key-value store backed by `SurrealKV`.
///
/// ACID-compliant, versioned, embedded LSM-tree storage. Every operation
/// runs in its own transaction.
///
/// ```rust,ignore
/// use annal_storage::SurrealKvStore;
///
/// let store = SurrealKvStore::open("./data/audit")?;
/// store.insert_new("audit:records", "00000000000000000001", b"{}".to_vec()).await?;
/// ```
#[cfg(feature = "kv")]
pub struct SurrealKvStore {
    tree: surrealkv::Tree,
}

#[cfg(feature = "kv")]
impl std::fmt::Debug for SurrealKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurrealKvStore").finish_non_exhaustive()
    }
}

#[cfg(feature = "kv")]
impl SurrealKvStore {
    /// Open a persistent KV store at the given directory path.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] if the store cannot be opened.
    pub fn open(path: impl AsRef<std::path::Path>) -> StorageResult<Self> {
        let tree = surrealkv::TreeBuilder::new()
            .with_path(path.as_ref().to_path_buf())
            .build()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        tracing::debug!(path = %path.as_ref().display(), "opened SurrealKV store");
        Ok(Self { tree })
    }

    /// Keys of `namespace` from `start` onwards, at most `limit` of them.
    fn scan_keys(&self, namespace: &str, start: &str, limit: usize) -> StorageResult<Vec<String>> {
        let (prefix, end) = namespace_bounds(namespace);
        let prefix_len = prefix.len();
        let start = scan_start(namespace, start).into_bytes();
        let end = end.into_bytes();

        let tx = self
            .tree
            .begin_with_mode(surrealkv::Mode::ReadOnly)
            .map_err(|ref e| map_kv_err(e))?;
        let mut iter = tx
            .range(&start, &end)
            .map_err(|ref e| map_kv_err(e))?;
        iter.seek_first().map_err(|ref e| map_kv_err(e))?;

        let mut keys = Vec::new();
        while iter.valid() && keys.len() < limit {
            let raw_key = iter.key();
            if raw_key.len() > prefix_len
                && let Ok(key_str) = std::str::from_utf8(&raw_key[prefix_len..])
            {
                keys.push(key_str.to_string());
            }
            iter.next().map_err(|ref e| map_kv_err(e))?;
        }
        Ok(keys)
    }
}

#[cfg(feature = "kv")]
fn map_kv_err(e: &surrealkv::Error) -> StorageError {
    StorageError::Internal(e.to_string())
}

#[cfg(feature = "kv")]
#[async_trait]
impl KvStore for SurrealKvStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let ck = composite_key(namespace, key).into_bytes();
        let tx = self
            .tree
            .begin_with_mode(surrealkv::Mode::ReadOnly)
            .map_err(|ref e| map_kv_err(e))?;
        tx.get(&ck).map_err(|ref e| map_kv_err(e))
    }

    async fn insert_new(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let ck = composite_key(namespace, key).into_bytes();
        let mut tx = self.tree.begin().map_err(|ref e| map_kv_err(e))?;
        if tx.get(&ck).map_err(|ref e| map_kv_err(e))?.is_some() {
            return Err(StorageError::Conflict(format!("{namespace}/{key}")));
        }
        tx.set(&ck, &value).map_err(|ref e| map_kv_err(e))?;
        // A concurrent transaction that wrote the same key makes this commit
        // fail rather than overwrite.
        tx.commit()
            .await
            .map_err(|e| StorageError::Conflict(format!("{namespace}/{key}: {e}")))
    }

    async fn scan(
        &self,
        namespace: &str,
        start: &str,
        limit: usize,
    ) -> StorageResult<Vec<(String, Vec<u8>)>> {
        validate_namespace(namespace)?;
        let keys = self.scan_keys(namespace, start, limit)?;
        // Keys are never removed, so every listed key is still present here.
        let tx = self
            .tree
            .begin_with_mode(surrealkv::Mode::ReadOnly)
            .map_err(|ref e| map_kv_err(e))?;
        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            let ck = composite_key(namespace, &key).into_bytes();
            if let Some(value) = tx.get(&ck).map_err(|ref e| map_kv_err(e))? {
                entries.push((key, value));
            }
        }
        Ok(entries)
    }

    async fn count(&self, namespace: &str) -> StorageResult<usize> {
        validate_namespace(namespace)?;
        Ok(self.scan_keys(namespace, "", usize::MAX)?.len())
    }

    async fn last_key(&self, namespace: &str) -> StorageResult<Option<String>> {
        validate_namespace(namespace)?;
        Ok(self.scan_keys(namespace, "", usize::MAX)?.pop())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
