//! Test fixtures for common types.

use std::sync::{Arc, Once};

use annal_audit::{
    AuditAction, AuditContext, AuditDraft, AuditMap, AuditSettings, AuditStore, AuditWriter,
    Auditable, KvAuditStore, StaticSettings, map_from_json,
};
use annal_storage::{KvStore, MemoryKvStore};
use chrono::{DateTime, TimeZone, Utc};

/// Secret used by [`signing_settings`].
pub const TEST_SECRET: &str = "annal-test-secret";

/// Default settings: enabled, unsigned.
#[must_use]
pub fn test_settings() -> AuditSettings {
    AuditSettings::default()
}

/// Settings with signing enabled under [`TEST_SECRET`].
#[must_use]
pub fn signing_settings() -> AuditSettings {
    AuditSettings {
        signing_enabled: true,
        signing_secret: Some(TEST_SECRET.to_owned()),
        ..AuditSettings::default()
    }
}

/// A key-value backend several stores can share.
#[must_use]
pub fn shared_backend() -> Arc<dyn KvStore> {
    Arc::new(MemoryKvStore::new())
}

/// A writer over a fresh in-memory store, plus its settings handle.
#[must_use]
pub fn test_writer(settings: AuditSettings) -> (AuditWriter, Arc<StaticSettings>) {
    let provider = Arc::new(StaticSettings::new(settings));
    let writer = AuditWriter::new(Arc::new(KvAuditStore::in_memory()), provider.clone());
    (writer, provider)
}

/// A writer with default settings over `store`.
#[must_use]
pub fn test_writer_over(store: impl AuditStore + 'static) -> AuditWriter {
    AuditWriter::new(Arc::new(store), Arc::new(StaticSettings::new(test_settings())))
}

/// A fixed, microsecond-precise timestamp.
#[must_use]
pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 15, 9, 26)
        .single()
        .unwrap_or_default()
}

/// Build an attribute map from a JSON object literal.
///
/// Non-objects yield an empty map.
#[must_use]
pub fn values(json: serde_json::Value) -> AuditMap {
    map_from_json(json).unwrap_or_default()
}

/// A distinct update draft for subject `n`.
#[must_use]
pub fn sample_draft(n: usize) -> AuditDraft {
    AuditDraft::new(AuditAction::Updated, "user")
        .with_subject_id(n.to_string())
        .with_actor("admin")
        .with_change("role", "viewer", format!("role-{n}"))
}

/// A user entity for lifecycle tests.
#[derive(Debug, Clone, PartialEq)]
pub struct TestUser {
    /// Primary key.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
    /// Password hash; redacted by the default denylist.
    pub password: String,
    /// Social security number; redacted per entity.
    pub ssn: Option<String>,
    /// Bumped on every login; ignored by auditing.
    pub login_count: i64,
}

impl TestUser {
    /// A user with plausible defaults.
    #[must_use]
    pub fn new(id: u64, name: &str) -> Self {
        Self {
            id,
            name: name.to_owned(),
            email: format!("{}@example.com", name.to_lowercase()),
            password: "$2y$10$hash".to_owned(),
            ssn: None,
            login_count: 0,
        }
    }
}

impl Auditable for TestUser {
    fn subject_type(&self) -> &str {
        "user"
    }

    fn subject_id(&self) -> Option<String> {
        Some(self.id.to_string())
    }

    fn audit_attributes(&self) -> AuditMap {
        let mut map = AuditMap::new();
        map.insert("name".into(), self.name.clone().into());
        map.insert("email".into(), self.email.clone().into());
        map.insert("password".into(), self.password.clone().into());
        map.insert("ssn".into(), self.ssn.clone().into());
        map.insert("login_count".into(), self.login_count.into());
        map
    }

    fn audit_ignored_fields(&self) -> &[&'static str] {
        &["login_count"]
    }

    fn audit_redact_keys(&self) -> &[&'static str] {
        &["ssn"]
    }
}

/// A console context with a fixed actor.
#[must_use]
pub fn admin_context() -> AuditContext {
    AuditContext::console().with_actor("admin")
}

static TRACING: Once = Once::new();

/// Install a test subscriber honouring `RUST_LOG`. Safe to call repeatedly.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
