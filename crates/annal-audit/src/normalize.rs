//! Canonical encoding of audit entries.
//!
//! The output is a self-delimiting byte string that is independent of map
//! insertion order, platform and serializer. Format `annal.v1`:
//!
//! | value        | encoding                                          |
//! |--------------|---------------------------------------------------|
//! | null         | `n`                                               |
//! | bool         | `t` / `f`                                         |
//! | int          | `i` decimal `;`                                   |
//! | float        | `d` 16 lowercase hex digits of the IEEE-754 bits `;` |
//! | string       | `s` byte length `:` bytes                         |
//! | list         | `l` count `:` items `e`                           |
//! | map          | `m` count `:` (key as string, value)... `e`       |
//!
//! Map entries are sorted by key bytes. A record is encoded as a map of its
//! hashable fields after the header `annal.v1\n`.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::record::AuditEntry;
use crate::schema::StoreCapabilities;
use crate::value::{AuditMap, AuditValue};

/// Version tag written at the start of every canonical encoding.
pub const CANONICAL_VERSION: &str = "annal.v1";

/// Format a timestamp the way it is hashed: RFC 3339, UTC, microseconds, `Z`.
#[must_use]
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Encode a single value, appending to `out`.
pub fn encode_value(value: &AuditValue, out: &mut Vec<u8>) {
    match value {
        AuditValue::Null => out.push(b'n'),
        AuditValue::Bool(true) => out.push(b't'),
        AuditValue::Bool(false) => out.push(b'f'),
        AuditValue::Int(i) => {
            out.push(b'i');
            out.extend_from_slice(i.to_string().as_bytes());
            out.push(b';');
        },
        AuditValue::Float(f) => {
            out.push(b'd');
            out.extend_from_slice(format!("{:016x}", f.to_bits()).as_bytes());
            out.push(b';');
        },
        AuditValue::String(s) => encode_str(s, out),
        AuditValue::List(items) => {
            out.push(b'l');
            out.extend_from_slice(items.len().to_string().as_bytes());
            out.push(b':');
            for item in items {
                encode_value(item, out);
            }
            out.push(b'e');
        },
        AuditValue::Map(map) => encode_map(map, out),
    }
}

fn encode_str(s: &str, out: &mut Vec<u8>) {
    out.push(b's');
    out.extend_from_slice(s.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(s.as_bytes());
}

fn encode_map(map: &AuditMap, out: &mut Vec<u8>) {
    out.push(b'm');
    out.extend_from_slice(map.len().to_string().as_bytes());
    out.push(b':');
    // BTreeMap<String, _> iterates in byte order of the keys.
    for (key, value) in map {
        encode_str(key, out);
        encode_value(value, out);
    }
    out.push(b'e');
}

fn opt_str(v: Option<&String>) -> AuditValue {
    v.map_or(AuditValue::Null, |s| AuditValue::String(s.clone()))
}

fn opt_map(v: Option<&AuditMap>) -> AuditValue {
    v.map_or(AuditValue::Null, |m| AuditValue::Map(m.clone()))
}

/// The hashed fields of `entry` as a map.
///
/// `subject_label` is never included. `context` and the request columns are
/// included only when the store persists them.
#[must_use]
pub fn hashable_fields(entry: &AuditEntry, fields: &StoreCapabilities) -> AuditMap {
    let mut map = AuditMap::new();
    map.insert("action".into(), AuditValue::from(entry.action.as_str()));
    map.insert("actor_id".into(), opt_str(entry.actor_id.as_ref()));
    map.insert(
        "created_at".into(),
        AuditValue::String(format_timestamp(&entry.created_at)),
    );
    map.insert("new_values".into(), opt_map(entry.new_values.as_ref()));
    map.insert("old_values".into(), opt_map(entry.old_values.as_ref()));
    map.insert("subject_id".into(), opt_str(entry.subject_id.as_ref()));
    map.insert(
        "subject_type".into(),
        AuditValue::String(entry.subject_type.clone()),
    );

    if fields.context {
        map.insert("context".into(), opt_map(entry.context.as_ref()));
    }

    if fields.request_metadata {
        let r = &entry.request;
        map.insert(
            "duration_ms".into(),
            r.duration_ms.map_or(AuditValue::Null, AuditValue::from),
        );
        map.insert("ip_address".into(), opt_str(r.ip_address.as_ref()));
        map.insert("method".into(), opt_str(r.method.as_ref()));
        map.insert("request_id".into(), opt_str(r.request_id.as_ref()));
        map.insert("route".into(), opt_str(r.route.as_ref()));
        map.insert("session_id".into(), opt_str(r.session_id.as_ref()));
        map.insert(
            "status_code".into(),
            r.status_code
                .map_or(AuditValue::Null, |c| AuditValue::Int(i64::from(c))),
        );
        map.insert("url".into(), opt_str(r.url.as_ref()));
        map.insert("user_agent".into(), opt_str(r.user_agent.as_ref()));
    }

    map
}

/// Canonical bytes of an entry under a field set.
#[must_use]
pub fn normalize_entry(entry: &AuditEntry, fields: &StoreCapabilities) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);
    out.extend_from_slice(CANONICAL_VERSION.as_bytes());
    out.push(b'\n');
    encode_map(&hashable_fields(entry, fields), &mut out);
    out
}
