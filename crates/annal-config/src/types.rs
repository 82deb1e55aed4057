//! Configuration types for Annal.
//!
//! All types in this module are self-contained with no dependencies on other
//! internal annal crates. Conversion into audit settings happens at the
//! boundary (CLI startup) via a bridge module. Every struct implements
//! [`Default`] so that a bare `[section]` header in TOML produces a working
//! configuration.

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Audit log behaviour: enablement, signing, redaction, storage.
    pub audit: AuditSection,
    /// Logging level, format, and per-crate directives.
    pub logging: LoggingSection,
}

// ---------------------------------------------------------------------------
// AuditSection
// ---------------------------------------------------------------------------

/// Audit log settings.
///
/// `signing_secret` never appears in `Debug` output or in serialized form
/// (`config show`).
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct AuditSection {
    /// Master switch. When `false`, writes are silent no-ops.
    pub enabled: bool,
    /// Attach an HMAC-SHA256 signature to each record.
    pub signing_enabled: bool,
    /// Secret used for signatures. Usually supplied as `${VAR}` or via
    /// `ANNAL_AUDIT_SIGNING_SECRET`.
    pub signing_secret: Option<String>,
    /// Extra field names to redact, on top of the built-in denylist.
    pub redact_fields: Vec<String>,
    /// Directory of the persistent store. `None` means in-memory only.
    pub store_path: Option<String>,
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            enabled: true,
            signing_enabled: false,
            signing_secret: None,
            redact_fields: Vec::new(),
            store_path: None,
        }
    }
}

impl std::fmt::Debug for AuditSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditSection")
            .field("enabled", &self.enabled)
            .field("signing_enabled", &self.signing_enabled)
            .field("has_signing_secret", &self.signing_secret.is_some())
            .field("redact_fields", &self.redact_fields)
            .field("store_path", &self.store_path)
            .finish()
    }
}

impl Serialize for AuditSection {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("AuditSection", 4)?;
        state.serialize_field("enabled", &self.enabled)?;
        state.serialize_field("signing_enabled", &self.signing_enabled)?;
        // signing_secret is omitted.
        state.serialize_field("redact_fields", &self.redact_fields)?;
        if let Some(path) = &self.store_path {
            state.serialize_field("store_path", path)?;
        } else {
            state.skip_field("store_path")?;
        }
        state.end()
    }
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global log level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    pub level: String,
    /// Output format: `"pretty"`, `"compact"`, `"json"`, or `"full"`.
    pub format: String,
    /// Per-crate tracing directives (e.g. `["annal_audit=debug"]`).
    pub directives: Vec<String>,
    /// Directory for daily-rotated log files. `None` logs to stderr.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
            directory: None,
        }
    }
}
