//! Audit record types.
//!
//! - [`AuditDraft`] is what callers hand to the writer.
//! - [`AuditEntry`] is the content that gets hashed.
//! - [`AuditRecord`] is the persisted row: an entry plus its id, chain hash,
//!   link to the previous record and optional signature.

use annal_crypto::{ContentHash, RecordSignature};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::value::AuditMap;

/// Maximum length (in characters) of a custom action name.
pub const MAX_ACTION_LEN: usize = 64;
/// Maximum length of a derived or supplied subject label.
pub const MAX_LABEL_LEN: usize = 255;
/// Maximum length of a stored `User-Agent`.
pub const MAX_USER_AGENT_LEN: usize = 1024;
/// Maximum length of a stored URL.
pub const MAX_URL_LEN: usize = 2048;
/// Maximum length of a stored session id.
pub const MAX_SESSION_ID_LEN: usize = 255;

/// Truncate to at most `max` characters, on a char boundary.
#[must_use]
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_owned(),
        None => s.to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// What happened to the subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AuditAction {
    /// The subject was created.
    Created,
    /// The subject was modified.
    Updated,
    /// The subject was (soft-)deleted.
    Deleted,
    /// A soft-deleted subject was restored.
    Restored,
    /// The subject was permanently deleted.
    ForceDeleted,
    /// An application-defined action.
    Custom(String),
}

impl AuditAction {
    /// Build a custom action, capped at [`MAX_ACTION_LEN`] characters.
    ///
    /// Names that match a built-in tag parse as that built-in.
    #[must_use]
    pub fn custom(name: &str) -> Self {
        Self::parse(&truncate_chars(name, MAX_ACTION_LEN))
    }

    fn parse(tag: &str) -> Self {
        match tag {
            "created" => Self::Created,
            "updated" => Self::Updated,
            "deleted" => Self::Deleted,
            "restored" => Self::Restored,
            "force_deleted" => Self::ForceDeleted,
            other => Self::Custom(other.to_owned()),
        }
    }

    /// The stored string tag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::Restored => "restored",
            Self::ForceDeleted => "force_deleted",
            Self::Custom(name) => name,
        }
    }

    /// Apply the length cap to custom names.
    #[must_use]
    pub fn capped(self) -> Self {
        match self {
            Self::Custom(name) if name.chars().count() > MAX_ACTION_LEN => Self::custom(&name),
            other => other,
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for AuditAction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AuditAction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Self::parse(&tag))
    }
}

// ---------------------------------------------------------------------------
// Request metadata
// ---------------------------------------------------------------------------

/// Facts about the inbound request that caused the change. All optional;
/// console actions usually carry only a `request_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMetadata {
    /// Client address.
    pub ip_address: Option<String>,
    /// Client `User-Agent`, capped at [`MAX_USER_AGENT_LEN`].
    pub user_agent: Option<String>,
    /// Full URL, capped at [`MAX_URL_LEN`].
    pub url: Option<String>,
    /// Route name or pattern.
    pub route: Option<String>,
    /// HTTP method.
    pub method: Option<String>,
    /// Response status, when known.
    pub status_code: Option<u16>,
    /// Correlation id.
    pub request_id: Option<String>,
    /// Session id, capped at [`MAX_SESSION_ID_LEN`].
    pub session_id: Option<String>,
    /// Time spent handling the request so far.
    pub duration_ms: Option<u64>,
}

impl RequestMetadata {
    /// Capture the fields a [`RequestContext`](annal_telemetry::RequestContext)
    /// knows, including the elapsed time at the moment of the call.
    #[must_use]
    pub fn from_request(ctx: &annal_telemetry::RequestContext) -> Self {
        Self {
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
            url: ctx.url.clone(),
            route: ctx.route.clone(),
            method: ctx.method.clone(),
            status_code: None,
            request_id: Some(ctx.request_id.to_string()),
            session_id: ctx.session_id.clone(),
            duration_ms: Some(ctx.elapsed_ms()),
        }
    }

    /// Set the response status.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    /// Apply the length caps.
    #[must_use]
    pub fn capped(self) -> Self {
        let cap = |v: Option<String>, max| v.map(|s| truncate_chars(&s, max));
        Self {
            user_agent: cap(self.user_agent, MAX_USER_AGENT_LEN),
            url: cap(self.url, MAX_URL_LEN),
            session_id: cap(self.session_id, MAX_SESSION_ID_LEN),
            ..self
        }
    }
}

// ---------------------------------------------------------------------------
// Entry / record
// ---------------------------------------------------------------------------

/// The content of an audit row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Who acted. `None` for system and console actions.
    pub actor_id: Option<String>,
    /// What happened.
    pub action: AuditAction,
    /// Kind of entity affected (e.g. `"user"`).
    pub subject_type: String,
    /// Identifier of the entity affected.
    pub subject_id: Option<String>,
    /// Human-readable subject name. Stored but not hashed.
    pub subject_label: Option<String>,
    /// Attribute values before the change.
    pub old_values: Option<AuditMap>,
    /// Attribute values after the change.
    pub new_values: Option<AuditMap>,
    /// Auxiliary context (source, tenant, ...).
    pub context: Option<AuditMap>,
    /// Request metadata.
    #[serde(flatten)]
    pub request: RequestMetadata,
    /// When the change happened, at microsecond precision.
    pub created_at: DateTime<Utc>,
}

/// A persisted, chained audit row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Storage-assigned sequence number, starting at 1.
    pub id: u64,
    /// The hashed content.
    #[serde(flatten)]
    pub entry: AuditEntry,
    /// Chain hash over the canonical content and `previous_hash`.
    pub hash: ContentHash,
    /// Hash of the preceding record. `None` marks the genesis record.
    pub previous_hash: Option<ContentHash>,
    /// HMAC over `hash`, when signing was enabled at write time.
    pub signature: Option<RecordSignature>,
}

impl AuditRecord {
    /// Whether this record directly follows `previous`.
    #[must_use]
    pub fn follows(&self, previous: &Self) -> bool {
        self.previous_hash == Some(previous.hash) && previous.id.checked_add(1) == Some(self.id)
    }

    /// Whether this record claims to start a chain.
    #[must_use]
    pub fn is_genesis(&self) -> bool {
        self.previous_hash.is_none()
    }
}

// ---------------------------------------------------------------------------
// Draft
// ---------------------------------------------------------------------------

/// Caller input to [`AuditWriter`](crate::AuditWriter).
///
/// ```
/// use annal_audit::{AuditAction, AuditDraft, AuditValue};
///
/// let draft = AuditDraft::new(AuditAction::Updated, "user")
///     .with_subject_id("42")
///     .with_actor("7")
///     .with_change("email", "old@example.com", "new@example.com");
/// assert_eq!(draft.new_values.unwrap()["email"], AuditValue::from("new@example.com"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AuditDraft {
    /// Who acted.
    pub actor_id: Option<String>,
    /// What happened.
    pub action: AuditAction,
    /// Kind of entity affected.
    pub subject_type: String,
    /// Identifier of the entity affected.
    pub subject_id: Option<String>,
    /// Explicit label. Derived from the values when absent.
    pub subject_label: Option<String>,
    /// Values before the change.
    pub old_values: Option<AuditMap>,
    /// Values after the change.
    pub new_values: Option<AuditMap>,
    /// Auxiliary context.
    pub context: Option<AuditMap>,
    /// Request metadata.
    pub request: RequestMetadata,
    /// Event time. Defaults to the write time.
    pub created_at: Option<DateTime<Utc>>,
    /// Extra keys to redact for this draft only.
    pub redact_keys: Vec<String>,
}

impl AuditDraft {
    /// Start a draft for `action` on a subject of `subject_type`.
    #[must_use]
    pub fn new(action: AuditAction, subject_type: impl Into<String>) -> Self {
        Self {
            actor_id: None,
            action,
            subject_type: subject_type.into(),
            subject_id: None,
            subject_label: None,
            old_values: None,
            new_values: None,
            context: None,
            request: RequestMetadata::default(),
            created_at: None,
            redact_keys: Vec::new(),
        }
    }

    /// Set the actor.
    #[must_use]
    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    /// Set the subject id.
    #[must_use]
    pub fn with_subject_id(mut self, id: impl Into<String>) -> Self {
        self.subject_id = Some(id.into());
        self
    }

    /// Set an explicit subject label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.subject_label = Some(label.into());
        self
    }

    /// Set the old values.
    #[must_use]
    pub fn with_old_values(mut self, values: AuditMap) -> Self {
        self.old_values = Some(values);
        self
    }

    /// Set the new values.
    #[must_use]
    pub fn with_new_values(mut self, values: AuditMap) -> Self {
        self.new_values = Some(values);
        self
    }

    /// Record one changed field on both sides.
    #[must_use]
    pub fn with_change(
        mut self,
        key: impl Into<String>,
        old: impl Into<crate::AuditValue>,
        new: impl Into<crate::AuditValue>,
    ) -> Self {
        let key = key.into();
        self.old_values
            .get_or_insert_with(AuditMap::new)
            .insert(key.clone(), old.into());
        self.new_values
            .get_or_insert_with(AuditMap::new)
            .insert(key, new.into());
        self
    }

    /// Set the context map.
    #[must_use]
    pub fn with_context(mut self, context: AuditMap) -> Self {
        self.context = Some(context);
        self
    }

    /// Set the request metadata.
    #[must_use]
    pub fn with_request(mut self, request: RequestMetadata) -> Self {
        self.request = request;
        self
    }

    /// Set the event time.
    #[must_use]
    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Redact an additional key for this draft.
    #[must_use]
    pub fn redact(mut self, key: impl Into<String>) -> Self {
        self.redact_keys.push(key.into());
        self
    }
}

/// Truncate a timestamp to the precision that is stored and hashed.
#[must_use]
pub fn storage_precision(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(6)
}
