//! Prelude module - commonly used types for convenient import.
//!
//! Use `use annal_audit::prelude::*;` to import all essential types.

// Errors
pub use crate::{AuditError, AuditResult};

// Records and values
pub use crate::{AuditAction, AuditDraft, AuditEntry, AuditMap, AuditRecord, AuditValue};

// Writing
pub use crate::{
    AuditContext, AuditSettings, AuditWriter, Auditable, ErrorReporter, StaticSettings,
};

// Storage
pub use crate::{AuditStore, KvAuditStore, StoreCapabilities};

// Verification
pub use crate::{ChainAnchor, ChainIssue, ChainVerificationResult, VerifyOptions, verify_records};
