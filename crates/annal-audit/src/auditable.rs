//! Lifecycle capability for audited entities.
//!
//! Entities implement [`Auditable`] and the persistence layer calls the
//! matching `build_*` method after each committed mutation, then hands the
//! draft to [`AuditWriter::write_audit`](crate::AuditWriter::write_audit).
//!
//! ```
//! use annal_audit::{AuditContext, AuditMap, Auditable};
//!
//! struct Post {
//!     id: u64,
//!     title: String,
//! }
//!
//! impl Auditable for Post {
//!     fn subject_type(&self) -> &str {
//!         "post"
//!     }
//!
//!     fn subject_id(&self) -> Option<String> {
//!         Some(self.id.to_string())
//!     }
//!
//!     fn audit_attributes(&self) -> AuditMap {
//!         AuditMap::from([("title".to_string(), self.title.clone().into())])
//!     }
//! }
//!
//! let post = Post { id: 1, title: "Hello".into() };
//! let draft = post.build_create_record(&AuditContext::console());
//! assert_eq!(draft.subject_id.as_deref(), Some("1"));
//! assert!(draft.old_values.is_none());
//! ```

use annal_telemetry::RequestContext;
use uuid::Uuid;

use crate::record::{AuditAction, AuditDraft, RequestMetadata};
use crate::value::{AuditMap, AuditValue};

/// Where a mutation originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditSource {
    /// A console command or background job.
    Console,
    /// An inbound request.
    Request,
}

impl AuditSource {
    /// The tag stored under `context.source`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Console => "console",
            Self::Request => "request",
        }
    }
}

/// Who and what caused a mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditContext {
    /// The acting user, if any.
    pub actor_id: Option<String>,
    /// Request facts.
    pub request: RequestMetadata,
    /// Extra context stored alongside the `source` tag.
    pub context: AuditMap,
    /// Console or request.
    pub source: AuditSource,
}

impl AuditContext {
    /// Context for console actions: no actor, a fresh request id.
    #[must_use]
    pub fn console() -> Self {
        Self {
            actor_id: None,
            request: RequestMetadata {
                request_id: Some(Uuid::new_v4().to_string()),
                ..RequestMetadata::default()
            },
            context: AuditMap::new(),
            source: AuditSource::Console,
        }
    }

    /// Context for an inbound request. The actor defaults to the request's
    /// authenticated user.
    #[must_use]
    pub fn from_request(ctx: &RequestContext) -> Self {
        Self {
            actor_id: ctx.user_id.clone(),
            request: RequestMetadata::from_request(ctx),
            context: AuditMap::new(),
            source: AuditSource::Request,
        }
    }

    /// Set the actor.
    #[must_use]
    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    /// Add a context entry.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<AuditValue>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Stamp a hand-built draft with this context: actor, request metadata
    /// (with a generated request id if missing) and the `source` tag.
    #[must_use]
    pub fn stamp(&self, mut draft: AuditDraft) -> AuditDraft {
        let mut request = self.request.clone();
        if request.request_id.is_none() {
            request.request_id = Some(Uuid::new_v4().to_string());
        }
        let mut context = self.context.clone();
        context.insert("source".into(), self.source.as_str().into());

        draft.actor_id.clone_from(&self.actor_id);
        draft.request = request;
        draft.context = Some(context);
        draft
    }
}

/// An entity whose mutations are audited.
pub trait Auditable {
    /// Kind of entity, e.g. `"user"`.
    fn subject_type(&self) -> &str;

    /// Identifier of this entity.
    fn subject_id(&self) -> Option<String>;

    /// Current attribute values.
    fn audit_attributes(&self) -> AuditMap;

    /// Attributes never recorded or diffed.
    fn audit_ignored_fields(&self) -> &[&'static str] {
        &[]
    }

    /// Attributes redacted for this entity on top of the global denylist.
    fn audit_redact_keys(&self) -> &[&'static str] {
        &[]
    }

    /// Attributes minus ignored fields.
    fn audit_snapshot(&self) -> AuditMap {
        let ignored = self.audit_ignored_fields();
        let mut attributes = self.audit_attributes();
        attributes.retain(|k, _| !ignored.contains(&k.as_str()));
        attributes
    }

    /// Draft for a newly created entity.
    fn build_create_record(&self, ctx: &AuditContext) -> AuditDraft {
        base_draft(self, AuditAction::Created, ctx).with_new_values(self.audit_snapshot())
    }

    /// Draft for an update from `before` to the current state.
    ///
    /// Only changed keys are recorded; a key present on one side only is
    /// recorded with `null` on the other. Returns `None` when nothing
    /// tracked changed.
    fn build_update_record(&self, before: &AuditMap, ctx: &AuditContext) -> Option<AuditDraft> {
        let ignored = self.audit_ignored_fields();
        let after = self.audit_snapshot();
        let mut old_values = AuditMap::new();
        let mut new_values = AuditMap::new();

        let keys = before
            .keys()
            .chain(after.keys())
            .filter(|k| !ignored.contains(&k.as_str()));
        for key in keys {
            let old = before.get(key).cloned().unwrap_or(AuditValue::Null);
            let new = after.get(key).cloned().unwrap_or(AuditValue::Null);
            if before.get(key) != after.get(key) && !old_values.contains_key(key) {
                old_values.insert(key.clone(), old);
                new_values.insert(key.clone(), new);
            }
        }

        if new_values.is_empty() {
            return None;
        }
        Some(
            base_draft(self, AuditAction::Updated, ctx)
                .with_old_values(old_values)
                .with_new_values(new_values),
        )
    }

    /// Draft for a soft delete.
    fn build_delete_record(&self, ctx: &AuditContext) -> AuditDraft {
        base_draft(self, AuditAction::Deleted, ctx).with_old_values(self.audit_snapshot())
    }

    /// Draft for a permanent delete.
    fn build_force_delete_record(&self, ctx: &AuditContext) -> AuditDraft {
        base_draft(self, AuditAction::ForceDeleted, ctx).with_old_values(self.audit_snapshot())
    }

    /// Draft for a restore of a soft-deleted entity.
    fn build_restore_record(&self, ctx: &AuditContext) -> AuditDraft {
        base_draft(self, AuditAction::Restored, ctx).with_new_values(self.audit_snapshot())
    }
}

fn base_draft<T: Auditable + ?Sized>(
    entity: &T,
    action: AuditAction,
    ctx: &AuditContext,
) -> AuditDraft {
    let mut draft = AuditDraft::new(action, entity.subject_type());
    draft.subject_id = entity.subject_id();
    draft.redact_keys = entity
        .audit_redact_keys()
        .iter()
        .map(|k| (*k).to_owned())
        .collect();
    ctx.stamp(draft)
}
