//! Annal Storage - namespaced key-value persistence.
//!
//! The [`KvStore`] trait provides byte-level create-only writes, point reads
//! and bounded ordered scans, all scoped to a namespace. Implementations:
//!
//! - [`MemoryKvStore`] (always available): tests and ephemeral logs
//! - `SurrealKvStore` (behind the **`kv`** feature): embedded, ACID,
//!   LSM-tree storage for persistent audit logs

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod kv;

pub use error::{StorageError, StorageResult};
pub use kv::{KvStore, MemoryKvStore};

#[cfg(feature = "kv")]
pub use kv::SurrealKvStore;
