//! Annal Audit - Tamper-evident, hash-chained audit logging.
//!
//! This crate provides:
//! - An explicit value model for audited attributes
//! - A canonical, versioned encoding of each record
//! - Hash chaining of records with optional HMAC signatures
//! - Name-based redaction applied before hashing
//! - A write path that never fails the caller's operation
//! - The [`Auditable`] capability for domain entities
//! - Verification and JSON Lines export
//!
//! # Security Model
//!
//! Every record is:
//! - Redacted, then normalized to canonical bytes
//! - Hashed together with the previous record's hash
//! - Optionally signed with a configured secret
//! - Appended under a per-store lock with a create-only insert
//!
//! Changing, removing or reordering any stored record breaks the chain and
//! is detected by [`verify_records`]. The subject label is stored but not
//! hashed.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use annal_audit::{
//!     AuditAction, AuditDraft, AuditValue, AuditWriter, KvAuditStore, StaticSettings,
//!     VerifyOptions, verify_records,
//! };
//!
//! let store = Arc::new(KvAuditStore::in_memory());
//! let writer = AuditWriter::new(store.clone(), Arc::new(StaticSettings::default()));
//!
//! writer.write_audit(
//!     AuditDraft::new(AuditAction::Updated, "user")
//!         .with_subject_id("42")
//!         .with_change("password", "old", "new"),
//! );
//!
//! let records = writer.store().all().unwrap();
//! let new_values = records[0].entry.new_values.as_ref().unwrap();
//! assert_eq!(new_values["password"], AuditValue::from("[redacted]"));
//! assert!(verify_records(&records, &VerifyOptions::default()).valid);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod auditable;
mod error;
mod export;
pub mod hasher;
pub mod normalize;
mod record;
mod redact;
mod schema;
mod storage;
mod value;
mod verify;
mod writer;

pub use auditable::{AuditContext, AuditSource, Auditable};
pub use error::{AuditError, AuditResult};
pub use export::{read_jsonl, write_json_array, write_jsonl};
pub use normalize::{CANONICAL_VERSION, normalize_entry};
pub use record::{
    AuditAction, AuditDraft, AuditEntry, AuditRecord, MAX_ACTION_LEN, MAX_LABEL_LEN,
    MAX_SESSION_ID_LEN, MAX_URL_LEN, MAX_USER_AGENT_LEN, RequestMetadata, storage_precision,
    truncate_chars,
};
pub use redact::{DEFAULT_REDACT_FIELDS, REDACTED, Redactor};
pub use schema::{
    AuditSettings, SchemaCache, SchemaSnapshot, SettingsProvider, StaticSettings,
    StoreCapabilities,
};
pub use storage::{AuditStore, ChainHead, KvAuditStore, Seal, SealFn};
pub use value::{AuditMap, AuditValue, finite_map, map_from_json};
pub use verify::{
    ChainAnchor, ChainIssue, ChainVerificationResult, VerifyOptions, verify_records, verify_store,
};
pub use writer::{AuditWriter, ErrorReporter, FailedWrite, LABEL_FIELDS, TracingReporter, derive_label};

// Re-export the primitives records are made of.
pub use annal_crypto::{ContentHash, RecordSignature, SigningKey};
