//! The audit write path.
//!
//! [`AuditWriter::write_audit`] is what domain code calls after a mutation.
//! It never fails from the caller's point of view: errors are logged and
//! handed to an [`ErrorReporter`], and the domain operation carries on.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use annal_storage::StorageError;
use chrono::Utc;
use tracing::{debug, error};

use crate::error::{AuditError, AuditResult};
use crate::hasher;
use crate::normalize::normalize_entry;
use crate::record::{
    AuditAction, AuditDraft, AuditEntry, AuditRecord, MAX_LABEL_LEN, RequestMetadata,
    storage_precision, truncate_chars,
};
use crate::redact::REDACTED;
use crate::schema::{SchemaCache, SchemaSnapshot, SettingsProvider};
use crate::storage::{AuditStore, Seal};
use crate::value::{AuditMap, finite_map};

/// Attribute names tried, in order, when deriving a subject label.
pub const LABEL_FIELDS: &[&str] = &["name", "title", "code", "number", "email", "username"];

/// What was being written when a write failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedWrite {
    /// The action of the lost record.
    pub action: AuditAction,
    /// Subject type of the lost record.
    pub subject_type: String,
    /// Subject id of the lost record.
    pub subject_id: Option<String>,
}

impl FailedWrite {
    fn of(draft: &AuditDraft) -> Self {
        Self {
            action: draft.action.clone(),
            subject_type: draft.subject_type.clone(),
            subject_id: draft.subject_id.clone(),
        }
    }
}

/// Receives audit write failures.
pub trait ErrorReporter: Send + Sync {
    /// Called once per failed write.
    fn report(&self, error: &AuditError, failed: &FailedWrite);
}

/// Reports failures as `tracing` warnings.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, error: &AuditError, failed: &FailedWrite) {
        tracing::warn!(
            action = %failed.action,
            subject_type = %failed.subject_type,
            subject_id = failed.subject_id.as_deref(),
            error = %error,
            "audit record lost"
        );
    }
}

/// First usable label candidate from `new_values`, then `old_values`.
///
/// Redacted, null and composite values are skipped.
#[must_use]
pub fn derive_label(new_values: Option<&AuditMap>, old_values: Option<&AuditMap>) -> Option<String> {
    [new_values, old_values]
        .into_iter()
        .flatten()
        .flat_map(|values| LABEL_FIELDS.iter().filter_map(|field| values.get(*field)))
        .filter_map(crate::AuditValue::scalar_text)
        .find(|text| !text.is_empty() && text != REDACTED)
        .map(|text| truncate_chars(&text, MAX_LABEL_LEN))
}

/// Writes audit records to a store.
pub struct AuditWriter {
    store: Arc<dyn AuditStore>,
    schema: Arc<SchemaCache>,
    reporter: Arc<dyn ErrorReporter>,
}

impl AuditWriter {
    /// Create a writer with its own schema cache over `settings`.
    #[must_use]
    pub fn new(store: Arc<dyn AuditStore>, settings: Arc<dyn SettingsProvider>) -> Self {
        Self::with_schema(store, Arc::new(SchemaCache::new(settings)))
    }

    /// Create a writer that shares `schema` with other components.
    #[must_use]
    pub fn with_schema(store: Arc<dyn AuditStore>, schema: Arc<SchemaCache>) -> Self {
        Self {
            store,
            schema,
            reporter: Arc::new(TracingReporter),
        }
    }

    /// Replace the error reporter.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }

    /// The schema cache.
    #[must_use]
    pub fn schema(&self) -> &Arc<SchemaCache> {
        &self.schema
    }

    /// Write a record, swallowing every failure.
    ///
    /// Failures (including panics inside the write path) are logged and
    /// passed to the reporter. Nothing is retried.
    pub fn write_audit(&self, draft: AuditDraft) {
        let failed = FailedWrite::of(&draft);
        let outcome = catch_unwind(AssertUnwindSafe(|| self.try_write(draft))).unwrap_or_else(
            |_| {
                Err(AuditError::Storage(StorageError::Internal(
                    "audit write panicked".into(),
                )))
            },
        );
        if let Err(e) = outcome {
            error!(
                action = %failed.action,
                subject_type = %failed.subject_type,
                error = %e,
                "failed to write audit record"
            );
            self.reporter.report(&e, &failed);
        }
    }

    /// Write a record and return it.
    ///
    /// Returns `Ok(None)` when auditing is disabled.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Configuration`] if signing is enabled without a
    /// secret, or [`AuditError::Storage`] if the record was not persisted.
    pub fn try_write(&self, draft: AuditDraft) -> AuditResult<Option<AuditRecord>> {
        let snapshot = self.schema.snapshot(self.store.as_ref());
        if !snapshot.enabled {
            return Ok(None);
        }

        let entry = prepare_entry(draft, &snapshot);
        let key = snapshot.signing_key()?;
        let normalized = normalize_entry(&entry, &snapshot.capabilities);

        let seal = |head: &crate::storage::ChainHead| -> AuditResult<Seal> {
            let hash = hasher::chain_hash(&normalized, head.previous_hash.as_ref());
            let signature = key.map(|k| hasher::sign(&hash, k)).transpose()?;
            Ok(Seal { hash, signature })
        };
        let record = self.store.append(entry, &seal)?;

        debug!(
            id = record.id,
            action = %record.entry.action,
            subject_type = %record.entry.subject_type,
            signed = record.signature.is_some(),
            "audit record written"
        );
        Ok(Some(record))
    }
}

impl std::fmt::Debug for AuditWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditWriter")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

/// Redact, cap and strip a draft into the entry that gets hashed and stored.
fn prepare_entry(draft: AuditDraft, snapshot: &SchemaSnapshot) -> AuditEntry {
    let caps = snapshot.capabilities;
    let extended;
    let redactor = if draft.redact_keys.is_empty() {
        &snapshot.redactor
    } else {
        extended = snapshot.redactor.extended(&draft.redact_keys);
        &extended
    };

    let clean = |values: Option<AuditMap>| {
        values.map(|mut map| {
            redactor.redact_map(&mut map);
            finite_map(map)
        })
    };
    let old_values = clean(draft.old_values);
    let new_values = clean(draft.new_values);

    let subject_label = if caps.subject_label {
        draft
            .subject_label
            .map(|l| truncate_chars(&l, MAX_LABEL_LEN))
            .or_else(|| derive_label(new_values.as_ref(), old_values.as_ref()))
    } else {
        None
    };

    AuditEntry {
        actor_id: draft.actor_id,
        action: draft.action.capped(),
        subject_type: draft.subject_type,
        subject_id: draft.subject_id,
        subject_label,
        old_values,
        new_values,
        context: if caps.context {
            draft.context.map(finite_map)
        } else {
            None
        },
        request: if caps.request_metadata {
            draft.request.capped()
        } else {
            RequestMetadata::default()
        },
        created_at: storage_precision(draft.created_at.unwrap_or_else(Utc::now)),
    }
}
