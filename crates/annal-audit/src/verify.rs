//! Chain verification over fetched records.
//!
//! Verification is independent of storage: records can come from a live
//! store, an export file or a window of either.

use std::fmt;

use annal_crypto::{ContentHash, SigningKey};
use tracing::{debug, warn};

use crate::error::{AuditError, AuditResult};
use crate::hasher;
use crate::normalize::normalize_entry;
use crate::record::AuditRecord;
use crate::schema::StoreCapabilities;
use crate::storage::AuditStore;

/// What the first verified record is expected to link to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChainAnchor {
    /// The first record is the genesis record (id 1, no previous hash).
    #[default]
    Genesis,
    /// The first record follows a record with this hash.
    After(ContentHash),
    /// A window with no known predecessor; the first link is not checked.
    Unknown,
}

/// How to verify.
#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    /// Expected link of the first record.
    pub anchor: ChainAnchor,
    /// The field set the records were hashed with.
    pub capabilities: StoreCapabilities,
    /// Check signatures that are present with this key.
    pub signing_key: Option<SigningKey>,
}

impl VerifyOptions {
    /// Set the anchor.
    #[must_use]
    pub fn with_anchor(mut self, anchor: ChainAnchor) -> Self {
        self.anchor = anchor;
        self
    }

    /// Set the field set.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: StoreCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Check signatures with `key`.
    #[must_use]
    pub fn with_signing_key(mut self, key: SigningKey) -> Self {
        self.signing_key = Some(key);
        self
    }
}

/// A problem found during verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainIssue {
    /// The first record claims a predecessor although the chain starts here.
    InvalidGenesis {
        /// The offending record.
        record_id: u64,
    },
    /// `previous_hash` does not match the preceding record's hash.
    BrokenLink {
        /// The offending record.
        record_id: u64,
        /// Hash of the preceding record (or the anchor).
        expected_previous: Option<ContentHash>,
        /// The stored `previous_hash`.
        actual_previous: Option<ContentHash>,
    },
    /// Recomputing the hash from the content gives a different value.
    HashMismatch {
        /// The offending record.
        record_id: u64,
        /// Recomputed hash.
        expected: ContentHash,
        /// Stored hash.
        actual: ContentHash,
    },
    /// The signature does not match the hash under the given key.
    InvalidSignature {
        /// The offending record.
        record_id: u64,
    },
    /// Ids are not consecutive.
    NonContiguous {
        /// The offending record.
        record_id: u64,
        /// The id that was expected at this position.
        expected_id: u64,
    },
}

impl ChainIssue {
    /// The record the issue was found at.
    #[must_use]
    pub fn record_id(&self) -> u64 {
        match self {
            Self::InvalidGenesis { record_id }
            | Self::BrokenLink { record_id, .. }
            | Self::HashMismatch { record_id, .. }
            | Self::InvalidSignature { record_id }
            | Self::NonContiguous { record_id, .. } => *record_id,
        }
    }
}

fn short(hash: Option<&ContentHash>) -> String {
    hash.map_or_else(|| "genesis".to_owned(), ContentHash::short)
}

impl fmt::Display for ChainIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidGenesis { record_id } => {
                write!(f, "record {record_id} should start the chain but has a previous hash")
            },
            Self::BrokenLink {
                record_id,
                expected_previous,
                actual_previous,
            } => write!(
                f,
                "broken link at record {record_id}: expected previous {}, found {}",
                short(expected_previous.as_ref()),
                short(actual_previous.as_ref())
            ),
            Self::HashMismatch {
                record_id,
                expected,
                actual,
            } => write!(
                f,
                "hash mismatch at record {record_id}: computed {}, stored {}",
                expected.short(),
                actual.short()
            ),
            Self::InvalidSignature { record_id } => {
                write!(f, "invalid signature at record {record_id}")
            },
            Self::NonContiguous {
                record_id,
                expected_id,
            } => write!(f, "expected record {expected_id}, found {record_id}"),
        }
    }
}

/// Outcome of verifying a sequence of records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainVerificationResult {
    /// No issues were found.
    pub valid: bool,
    /// Number of records examined.
    pub records_verified: usize,
    /// Index (into the input slice) of the first record with an issue.
    pub first_failure: Option<usize>,
    /// Every issue found, in record order.
    pub issues: Vec<ChainIssue>,
}

impl ChainVerificationResult {
    /// Convert into an error at the first issue.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::IntegrityViolation`] if the chain is invalid.
    pub fn into_result(self) -> AuditResult<Self> {
        match self.issues.first() {
            None => Ok(self),
            Some(issue) => Err(AuditError::IntegrityViolation {
                record_id: issue.record_id(),
                reason: issue.to_string(),
            }),
        }
    }
}

fn check_record(
    record: &AuditRecord,
    prev: Option<&AuditRecord>,
    options: &VerifyOptions,
    issues: &mut Vec<ChainIssue>,
) {
    let record_id = record.id;

    match (prev, options.anchor) {
        (Some(prev), _) => {
            if prev.id.checked_add(1) != Some(record_id) {
                issues.push(ChainIssue::NonContiguous {
                    record_id,
                    expected_id: prev.id.saturating_add(1),
                });
            }
            if record.previous_hash != Some(prev.hash) {
                issues.push(ChainIssue::BrokenLink {
                    record_id,
                    expected_previous: Some(prev.hash),
                    actual_previous: record.previous_hash,
                });
            }
        },
        (None, ChainAnchor::Genesis) => {
            if record.previous_hash.is_some() {
                issues.push(ChainIssue::InvalidGenesis { record_id });
            }
            if record_id != 1 {
                issues.push(ChainIssue::NonContiguous {
                    record_id,
                    expected_id: 1,
                });
            }
        },
        (None, ChainAnchor::After(anchor)) => {
            if record.previous_hash != Some(anchor) {
                issues.push(ChainIssue::BrokenLink {
                    record_id,
                    expected_previous: Some(anchor),
                    actual_previous: record.previous_hash,
                });
            }
        },
        (None, ChainAnchor::Unknown) => {},
    }

    let normalized = normalize_entry(&record.entry, &options.capabilities);
    let expected = hasher::chain_hash(&normalized, record.previous_hash.as_ref());
    if expected != record.hash {
        issues.push(ChainIssue::HashMismatch {
            record_id,
            expected,
            actual: record.hash,
        });
    }

    if let (Some(key), Some(signature)) = (&options.signing_key, &record.signature)
        && !hasher::verify_signature(&record.hash, signature, key)
    {
        issues.push(ChainIssue::InvalidSignature { record_id });
    }
}

/// Verify records in the order given.
#[must_use]
pub fn verify_records(records: &[AuditRecord], options: &VerifyOptions) -> ChainVerificationResult {
    let mut issues = Vec::new();
    let mut first_failure = None;

    let mut prev: Option<&AuditRecord> = None;
    for (index, record) in records.iter().enumerate() {
        let before = issues.len();
        check_record(record, prev, options, &mut issues);
        if issues.len() > before {
            for issue in &issues[before..] {
                warn!(record_id = record.id, %issue, "audit chain issue");
            }
            first_failure.get_or_insert(index);
        }
        prev = Some(record);
    }

    debug!(
        records = records.len(),
        issues = issues.len(),
        "audit chain verified"
    );
    ChainVerificationResult {
        valid: issues.is_empty(),
        records_verified: records.len(),
        first_failure,
        issues,
    }
}

/// Fetch every record from `store` and verify from genesis.
///
/// The field set defaults to the store's capabilities.
///
/// # Errors
///
/// Returns an error if the records cannot be read.
pub fn verify_store(
    store: &dyn AuditStore,
    signing_key: Option<SigningKey>,
) -> AuditResult<ChainVerificationResult> {
    let records = store.all()?;
    let options = VerifyOptions {
        anchor: ChainAnchor::Genesis,
        capabilities: store.capabilities(),
        signing_key,
    };
    Ok(verify_records(&records, &options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{AuditAction, AuditDraft};
    use crate::schema::{AuditSettings, StaticSettings};
    use crate::storage::KvAuditStore;
    use crate::value::AuditValue;
    use crate::writer::AuditWriter;
    use std::sync::Arc;

    const SECRET: &str = "verify-secret";

    fn chain(n: usize, signing: bool) -> Vec<AuditRecord> {
        let settings = AuditSettings {
            signing_enabled: signing,
            signing_secret: signing.then(|| SECRET.to_owned()),
            ..AuditSettings::default()
        };
        let writer = AuditWriter::new(
            Arc::new(KvAuditStore::in_memory()),
            Arc::new(StaticSettings::new(settings)),
        );
        for i in 0..n {
            writer
                .try_write(
                    AuditDraft::new(AuditAction::Updated, "user")
                        .with_subject_id(i.to_string())
                        .with_change("role", "viewer", "admin"),
                )
                .unwrap();
        }
        writer.store().all().unwrap()
    }

    fn key() -> SigningKey {
        SigningKey::new(SECRET).unwrap()
    }

    #[test]
    fn test_valid_chain() {
        let records = chain(4, true);
        let result = verify_records(&records, &VerifyOptions::default().with_signing_key(key()));
        assert!(result.valid, "{:?}", result.issues);
        assert_eq!(result.records_verified, 4);
        assert!(result.first_failure.is_none());
        assert!(result.into_result().is_ok());
    }

    #[test]
    fn test_empty_chain_is_valid() {
        assert!(verify_records(&[], &VerifyOptions::default()).valid);
    }

    #[test]
    fn test_tampered_field_detected() {
        let mut records = chain(3, false);
        records[1].entry.new_values.as_mut().unwrap().insert("role".into(), AuditValue::from("owner"));

        let result = verify_records(&records, &VerifyOptions::default());
        assert!(!result.valid);
        assert_eq!(result.first_failure, Some(1));
        assert!(matches!(
            result.issues[0],
            ChainIssue::HashMismatch { record_id: 2, .. }
        ));
        assert!(matches!(
            result.into_result(),
            Err(AuditError::IntegrityViolation { record_id: 2, .. })
        ));
    }

    #[test]
    fn test_label_change_not_detected() {
        let mut records = chain(2, false);
        records[0].entry.subject_label = Some("edited".into());
        assert!(verify_records(&records, &VerifyOptions::default()).valid);
    }

    #[test]
    fn test_reordered_rows_detected() {
        let mut records = chain(3, false);
        records.swap(1, 2);
        let result = verify_records(&records, &VerifyOptions::default());
        assert!(!result.valid);
        assert_eq!(result.first_failure, Some(1));
        assert!(
            result
                .issues
                .iter()
                .any(|i| matches!(i, ChainIssue::BrokenLink { .. }))
        );
    }

    #[test]
    fn test_removed_row_detected() {
        let mut records = chain(3, false);
        records.remove(1);
        let result = verify_records(&records, &VerifyOptions::default());
        assert!(result.issues.contains(&ChainIssue::NonContiguous {
            record_id: 3,
            expected_id: 2
        }));
    }

    #[test]
    fn test_forged_signature_detected() {
        let mut records = chain(2, true);
        let forged = SigningKey::new("attacker").unwrap();
        records[1].signature = Some(forged.sign(&records[1].hash).unwrap());
        let result = verify_records(&records, &VerifyOptions::default().with_signing_key(key()));
        assert_eq!(
            result.issues,
            vec![ChainIssue::InvalidSignature { record_id: 2 }]
        );
    }

    #[test]
    fn test_signatures_ignored_without_key() {
        let mut records = chain(1, true);
        records[0].signature = Some(SigningKey::new("x").unwrap().sign(&records[0].hash).unwrap());
        assert!(verify_records(&records, &VerifyOptions::default()).valid);
    }

    #[test]
    fn test_wrong_genesis_detected() {
        let records = chain(3, false);
        let result = verify_records(&records[1..], &VerifyOptions::default());
        assert!(result.issues.contains(&ChainIssue::InvalidGenesis { record_id: 2 }));
    }

    #[test]
    fn test_window_with_anchor() {
        let records = chain(4, false);
        let anchored = VerifyOptions::default().with_anchor(ChainAnchor::After(records[1].hash));
        assert!(verify_records(&records[2..], &anchored).valid);

        let wrong = VerifyOptions::default().with_anchor(ChainAnchor::After(records[0].hash));
        assert!(!verify_records(&records[2..], &wrong).valid);

        let unknown = VerifyOptions::default().with_anchor(ChainAnchor::Unknown);
        assert!(verify_records(&records[2..], &unknown).valid);
    }

    #[test]
    fn test_verify_store() {
        let store = KvAuditStore::in_memory();
        let writer_store: Arc<dyn AuditStore> = Arc::new(store);
        let writer = AuditWriter::new(
            Arc::clone(&writer_store),
            Arc::new(StaticSettings::default()),
        );
        writer.write_audit(AuditDraft::new(AuditAction::Created, "user"));
        writer.write_audit(AuditDraft::new(AuditAction::Deleted, "user"));

        let result = verify_store(writer_store.as_ref(), None).unwrap();
        assert!(result.valid);
        assert_eq!(result.records_verified, 2);
    }
}
