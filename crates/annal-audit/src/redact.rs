//! Name-based redaction of sensitive attribute values.
//!
//! A key is sensitive when its lowercase form equals an entry of the
//! denylist. Matching recurses into nested maps and lists of maps, and the
//! sentinel replaces the whole value under a sensitive key. Redaction runs
//! before hashing, so the stored and hashed content both carry the sentinel.
//!
//! Values are never inspected. A secret embedded in a URL, a free-text
//! field or the context map is not caught.

use std::collections::BTreeSet;

use crate::value::{AuditMap, AuditValue};

/// Placeholder stored in place of a redacted value.
pub const REDACTED: &str = "[redacted]";

/// Keys redacted unless configuration says otherwise.
pub const DEFAULT_REDACT_FIELDS: &[&str] = &[
    "password",
    "password_confirmation",
    "current_password",
    "new_password",
    "remember_token",
    "token",
    "api_token",
    "access_token",
    "refresh_token",
    "api_key",
    "secret",
    "client_secret",
    "two_factor_secret",
    "two_factor_recovery_codes",
    "created_at",
    "updated_at",
    "deleted_at",
];

/// A lowercase denylist of attribute names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redactor {
    keys: BTreeSet<String>,
}

impl Redactor {
    /// A redactor with exactly `keys`.
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keys: keys
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// The default denylist plus `extra`.
    pub fn with_defaults<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(DEFAULT_REDACT_FIELDS.iter().copied()).extended(extra)
    }

    /// A copy with additional keys.
    #[must_use]
    pub fn extended<I, S>(&self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keys = self.keys.clone();
        keys.extend(
            extra
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty()),
        );
        Self { keys }
    }

    /// Whether values under `key` are redacted.
    #[must_use]
    pub fn is_sensitive(&self, key: &str) -> bool {
        self.keys.contains(&key.to_lowercase())
    }

    /// The denylist, sorted.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    /// Redact a map in place, recursively.
    pub fn redact_map(&self, map: &mut AuditMap) {
        for (key, value) in map.iter_mut() {
            if self.is_sensitive(key) {
                *value = AuditValue::String(REDACTED.to_owned());
            } else {
                self.redact_value(value);
            }
        }
    }

    fn redact_value(&self, value: &mut AuditValue) {
        match value {
            AuditValue::Map(map) => self.redact_map(map),
            AuditValue::List(items) => {
                for item in items {
                    self.redact_value(item);
                }
            },
            _ => {},
        }
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new(DEFAULT_REDACT_FIELDS.iter().copied())
    }
}
