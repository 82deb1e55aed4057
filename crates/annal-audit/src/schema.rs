//! Settings and store capabilities, cached per writer.
//!
//! The [`SchemaCache`] is populated on the first write and then read without
//! touching settings or storage again. [`SchemaCache::reset`] drops the
//! snapshot so the next write sees fresh settings and capabilities.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use annal_crypto::SigningKey;
use tracing::debug;

use crate::error::{AuditError, AuditResult};
use crate::hasher;
use crate::redact::Redactor;
use crate::storage::AuditStore;

/// Optional column groups a store persists.
///
/// Fields in groups the store does not persist are dropped before hashing,
/// so the hash always covers exactly what is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCapabilities {
    /// A signature column exists.
    pub signature: bool,
    /// A context column exists.
    pub context: bool,
    /// Request metadata columns exist.
    pub request_metadata: bool,
    /// A subject label column exists.
    pub subject_label: bool,
}

impl StoreCapabilities {
    /// Every optional column.
    #[must_use]
    pub const fn full() -> Self {
        Self {
            signature: true,
            context: true,
            request_metadata: true,
            subject_label: true,
        }
    }

    /// Only the required columns.
    #[must_use]
    pub const fn minimal() -> Self {
        Self {
            signature: false,
            context: false,
            request_metadata: false,
            subject_label: false,
        }
    }
}

impl Default for StoreCapabilities {
    fn default() -> Self {
        Self::full()
    }
}

/// Audit settings as the application configures them.
#[derive(Clone, PartialEq, Eq)]
pub struct AuditSettings {
    /// Write records at all.
    pub enabled: bool,
    /// Sign record hashes.
    pub signing_enabled: bool,
    /// HMAC secret. Required when signing is enabled.
    pub signing_secret: Option<String>,
    /// Keys redacted in addition to the defaults.
    pub redact_fields: Vec<String>,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            signing_enabled: false,
            signing_secret: None,
            redact_fields: Vec::new(),
        }
    }
}

impl fmt::Debug for AuditSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditSettings")
            .field("enabled", &self.enabled)
            .field("signing_enabled", &self.signing_enabled)
            .field("has_signing_secret", &self.signing_secret.is_some())
            .field("redact_fields", &self.redact_fields)
            .finish()
    }
}

/// Source of [`AuditSettings`].
pub trait SettingsProvider: Send + Sync {
    /// Current settings.
    fn audit_settings(&self) -> AuditSettings;
}

/// Settings held in memory, replaceable at runtime.
///
/// A replacement only reaches writers after their cache is reset.
#[derive(Debug, Default)]
pub struct StaticSettings {
    inner: RwLock<AuditSettings>,
}

impl StaticSettings {
    /// Wrap fixed settings.
    #[must_use]
    pub fn new(settings: AuditSettings) -> Self {
        Self {
            inner: RwLock::new(settings),
        }
    }

    /// Replace the settings.
    pub fn replace(&self, settings: AuditSettings) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }
}

impl SettingsProvider for StaticSettings {
    fn audit_settings(&self) -> AuditSettings {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Everything a write needs to know, resolved once.
#[derive(Debug)]
pub struct SchemaSnapshot {
    /// Auditing enabled.
    pub enabled: bool,
    /// Signing requested by settings.
    pub signing_enabled: bool,
    /// Effective denylist.
    pub redactor: Redactor,
    /// What the store persists.
    pub capabilities: StoreCapabilities,
    signing: Result<Option<SigningKey>, String>,
}

impl SchemaSnapshot {
    /// Resolve settings against store capabilities.
    ///
    /// A store without a signature column never signs, whatever the
    /// settings say.
    #[must_use]
    pub fn resolve(settings: &AuditSettings, capabilities: StoreCapabilities) -> Self {
        let signing = if capabilities.signature {
            hasher::signing_key(settings).map_err(|e| match e {
                AuditError::Configuration(msg) => msg,
                other => other.to_string(),
            })
        } else {
            Ok(None)
        };
        Self {
            enabled: settings.enabled,
            signing_enabled: settings.signing_enabled,
            redactor: Redactor::with_defaults(&settings.redact_fields),
            capabilities,
            signing,
        }
    }

    /// The key to sign with, if any.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Configuration`] when signing is enabled but the
    /// secret is missing.
    pub fn signing_key(&self) -> AuditResult<Option<&SigningKey>> {
        match &self.signing {
            Ok(key) => Ok(key.as_ref()),
            Err(msg) => Err(AuditError::Configuration(msg.clone())),
        }
    }
}

/// Lazily-populated, resettable [`SchemaSnapshot`].
pub struct SchemaCache {
    provider: Arc<dyn SettingsProvider>,
    slot: RwLock<Slot>,
}

/// The cached snapshot and the number of resets so far.
#[derive(Default)]
struct Slot {
    generation: u64,
    snapshot: Option<Arc<SchemaSnapshot>>,
}

impl SchemaCache {
    /// Create an empty cache over a settings provider.
    #[must_use]
    pub fn new(provider: Arc<dyn SettingsProvider>) -> Self {
        Self {
            provider,
            slot: RwLock::new(Slot::default()),
        }
    }

    /// The current snapshot, populating it from `store` if empty.
    ///
    /// A snapshot resolved while a [`reset`](Self::reset) ran is discarded
    /// and resolved again, so settings replaced before a reset are never
    /// hidden behind an older snapshot.
    pub fn snapshot(&self, store: &dyn AuditStore) -> Arc<SchemaSnapshot> {
        loop {
            let generation = {
                let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
                if let Some(snapshot) = slot.snapshot.as_ref() {
                    return Arc::clone(snapshot);
                }
                slot.generation
            };

            let settings = self.provider.audit_settings();
            let fresh = Arc::new(SchemaSnapshot::resolve(&settings, store.capabilities()));

            let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
            if slot.generation != generation {
                debug!("audit schema cache reset during populate, resolving again");
                continue;
            }
            // Another writer may have populated it while we resolved.
            if let Some(existing) = slot.snapshot.as_ref() {
                return Arc::clone(existing);
            }
            debug!(
                enabled = fresh.enabled,
                signing = fresh.signing_enabled,
                capabilities = ?fresh.capabilities,
                "audit schema cache populated"
            );
            slot.snapshot = Some(Arc::clone(&fresh));
            return fresh;
        }
    }

    /// Whether a snapshot is cached.
    #[must_use]
    pub fn is_populated(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot
            .is_some()
    }

    /// Drop the cached snapshot. The next write resolves settings afresh,
    /// including writes whose populate was already in flight.
    pub fn reset(&self) {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        slot.snapshot = None;
        slot.generation = slot.generation.wrapping_add(1);
        debug!(generation = slot.generation, "audit schema cache reset");
    }
}

impl fmt::Debug for SchemaCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaCache")
            .field("populated", &self.is_populated())
            .finish_non_exhaustive()
    }
}
