//! Shared harness for integration tests.

use std::sync::Arc;

use annal_audit::{
    AuditRecord, AuditSettings, AuditStore, AuditWriter, KvAuditStore, StaticSettings,
    StoreCapabilities, VerifyOptions, verify_records,
};
use annal_test::{RecordingReporter, init_test_tracing};

/// A writer, its store and its settings, wired together.
#[allow(dead_code)]
pub struct AuditHarness {
    /// The writer under test.
    pub writer: AuditWriter,
    /// The store behind the writer.
    pub store: Arc<dyn AuditStore>,
    /// Settings the writer's schema cache reads.
    pub settings: Arc<StaticSettings>,
    /// Receives write failures.
    pub reporter: Arc<RecordingReporter>,
}

#[allow(dead_code)]
impl AuditHarness {
    /// In-memory store with every optional column.
    pub fn new(settings: AuditSettings) -> Self {
        Self::with_store(settings, KvAuditStore::in_memory())
    }

    /// In-memory store with a restricted column set.
    pub fn with_capabilities(settings: AuditSettings, caps: StoreCapabilities) -> Self {
        Self::with_store(settings, KvAuditStore::in_memory().with_capabilities(caps))
    }

    /// Any store.
    pub fn with_store(settings: AuditSettings, store: impl AuditStore + 'static) -> Self {
        init_test_tracing();
        let store: Arc<dyn AuditStore> = Arc::new(store);
        let settings = Arc::new(StaticSettings::new(settings));
        let reporter = RecordingReporter::new();
        let writer = AuditWriter::new(Arc::clone(&store), settings.clone())
            .with_reporter(reporter.clone());
        Self {
            writer,
            store,
            settings,
            reporter,
        }
    }

    /// Every stored record.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.store.all().unwrap()
    }

    /// Verification options matching this store's column set.
    pub fn options(&self) -> VerifyOptions {
        VerifyOptions::default().with_capabilities(self.store.capabilities())
    }

    /// Assert the stored chain verifies.
    pub fn assert_valid(&self) {
        let result = verify_records(&self.records(), &self.options());
        assert!(result.valid, "chain invalid: {:?}", result.issues);
    }
}
