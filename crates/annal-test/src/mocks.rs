//! Mock implementations for testing.

use std::sync::{Arc, Mutex, PoisonError};

use annal_audit::{
    AuditEntry, AuditError, AuditRecord, AuditResult, AuditStore, ErrorReporter, FailedWrite,
    SealFn, StoreCapabilities,
};
use annal_storage::StorageError;

/// How a [`FailingStore`] fails on append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// Return a storage error.
    Error,
    /// Panic inside `append`.
    Panic,
}

/// A store whose appends always fail. Reads see an empty store.
#[derive(Debug)]
pub struct FailingStore {
    mode: FailureMode,
    attempts: Mutex<usize>,
}

impl FailingStore {
    /// Fail with [`StorageError::Connection`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            mode: FailureMode::Error,
            attempts: Mutex::new(0),
        }
    }

    /// Panic on append.
    #[must_use]
    pub fn panicking() -> Self {
        Self {
            mode: FailureMode::Panic,
            attempts: Mutex::new(0),
        }
    }

    /// Number of append attempts so far.
    #[must_use]
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for FailingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditStore for FailingStore {
    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::full()
    }

    fn append(&self, _entry: AuditEntry, _seal: &SealFn<'_>) -> AuditResult<AuditRecord> {
        {
            let mut attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
            *attempts = attempts.saturating_add(1);
        }
        match self.mode {
            FailureMode::Error => Err(AuditError::Storage(StorageError::Connection(
                "database unavailable".into(),
            ))),
            FailureMode::Panic => panic!("storage driver crashed"),
        }
    }

    fn latest(&self) -> AuditResult<Option<AuditRecord>> {
        Ok(None)
    }

    fn get(&self, _id: u64) -> AuditResult<Option<AuditRecord>> {
        Ok(None)
    }

    fn range(&self, _from_id: u64, _limit: usize) -> AuditResult<Vec<AuditRecord>> {
        Ok(Vec::new())
    }

    fn count(&self) -> AuditResult<usize> {
        Ok(0)
    }

    fn flush(&self) -> AuditResult<()> {
        Ok(())
    }
}

/// A failure seen by [`RecordingReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// Rendered error.
    pub error: String,
    /// Whether the error was a configuration error.
    pub is_configuration: bool,
    /// Whether the error was a storage error.
    pub is_storage: bool,
    /// What was being written.
    pub failed: FailedWrite,
}

/// An [`ErrorReporter`] that keeps every report.
#[derive(Debug, Clone, Default)]
pub struct RecordingReporter {
    reports: Arc<Mutex<Vec<Report>>>,
}

impl RecordingReporter {
    /// Create an empty reporter.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// All reports so far.
    #[must_use]
    pub fn reports(&self) -> Vec<Report> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of reports so far.
    #[must_use]
    pub fn count(&self) -> usize {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, error: &AuditError, failed: &FailedWrite) {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Report {
                error: error.to_string(),
                is_configuration: matches!(error, AuditError::Configuration(_)),
                is_storage: matches!(error, AuditError::Storage(_)),
                failed: failed.clone(),
            });
    }
}
