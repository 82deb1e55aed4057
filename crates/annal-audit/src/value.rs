//! The value model for audited attributes.
//!
//! [`AuditValue`] is a closed recursive type so that the canonical encoding
//! never depends on how a JSON library happens to represent numbers or order
//! object keys. It serializes as plain JSON.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A map of attribute names to values, ordered by key bytes.
pub type AuditMap = BTreeMap<String, AuditValue>;

/// A single audited value.
///
/// Integers that fit in `i64` are [`AuditValue::Int`]; every other number is
/// [`AuditValue::Float`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuditValue {
    /// JSON `null`.
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed 64-bit integer.
    Int(i64),
    /// A 64-bit float.
    Float(f64),
    /// A UTF-8 string.
    String(String),
    /// An ordered list.
    List(Vec<AuditValue>),
    /// A map with keys sorted by byte order.
    Map(AuditMap),
}

impl AuditValue {
    /// Whether this is [`AuditValue::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The string payload, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The map payload, if this is a map.
    #[must_use]
    pub fn as_map(&self) -> Option<&AuditMap> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Short display form for scalars; `None` for null, lists and maps.
    #[must_use]
    pub fn scalar_text(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Int(i) => Some(i.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::Bool(b) => Some(b.to_string()),
            Self::Null | Self::List(_) | Self::Map(_) => None,
        }
    }

    /// Replace non-finite floats with `Null`, recursively.
    ///
    /// JSON cannot carry NaN or infinities, so a stored record would read
    /// back differently from what was hashed.
    #[must_use]
    pub fn into_finite(self) -> Self {
        match self {
            Self::Float(f) if !f.is_finite() => Self::Null,
            Self::List(items) => Self::List(items.into_iter().map(Self::into_finite).collect()),
            Self::Map(map) => Self::Map(finite_map(map)),
            other => other,
        }
    }

    /// Convert from a `serde_json::Value`.
    #[must_use]
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                // u64 above i64::MAX and all non-integers.
                None => n.as_f64().map_or(Self::Null, Self::Float),
            },
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Self::from_json).collect())
            },
            serde_json::Value::Object(obj) => Self::Map(
                obj.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert to a `serde_json::Value`. Non-finite floats become `null`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

/// Apply [`AuditValue::into_finite`] to every value of a map.
#[must_use]
pub fn finite_map(map: AuditMap) -> AuditMap {
    map.into_iter().map(|(k, v)| (k, v.into_finite())).collect()
}

/// Build an [`AuditMap`] from a JSON object. Non-objects yield `None`.
#[must_use]
pub fn map_from_json(value: serde_json::Value) -> Option<AuditMap> {
    match AuditValue::from_json(value) {
        AuditValue::Map(map) => Some(map),
        _ => None,
    }
}

impl From<serde_json::Value> for AuditValue {
    fn from(value: serde_json::Value) -> Self {
        Self::from_json(value)
    }
}

impl From<bool> for AuditValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for AuditValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for AuditValue {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<u32> for AuditValue {
    fn from(i: u32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<u64> for AuditValue {
    fn from(i: u64) -> Self {
        i64::try_from(i).map_or_else(
            |_| {
                #[allow(clippy::cast_precision_loss)]
                let f = i as f64;
                Self::Float(f)
            },
            Self::Int,
        )
    }
}

impl From<f64> for AuditValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for AuditValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for AuditValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl<T: Into<AuditValue>> From<Option<T>> for AuditValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<AuditValue>> From<Vec<T>> for AuditValue {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<AuditMap> for AuditValue {
    fn from(map: AuditMap) -> Self {
        Self::Map(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_numbers() {
        assert_eq!(AuditValue::from_json(json!(42)), AuditValue::Int(42));
        assert_eq!(AuditValue::from_json(json!(-7)), AuditValue::Int(-7));
        assert_eq!(AuditValue::from_json(json!(1.5)), AuditValue::Float(1.5));
        assert!(matches!(
            AuditValue::from_json(json!(u64::MAX)),
            AuditValue::Float(_)
        ));
    }

    #[test]
    fn test_serde_is_plain_json() {
        let mut map = AuditMap::new();
        map.insert("name".into(), "Ada".into());
        map.insert("age".into(), 36i64.into());
        map.insert("score".into(), 1.0f64.into());
        map.insert("tags".into(), vec!["a", "b"].into());
        map.insert("gone".into(), AuditValue::Null);
        let value = AuditValue::Map(map);

        let text = serde_json::to_string(&value).unwrap();
        assert_eq!(
            text,
            r#"{"age":36,"gone":null,"name":"Ada","score":1.0,"tags":["a","b"]}"#
        );

        let back: AuditValue = serde_json::from_str(&text).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_float_integral_value_stays_float() {
        let back: AuditValue = serde_json::from_str("2.0").unwrap();
        assert_eq!(back, AuditValue::Float(2.0));
    }

    #[test]
    fn test_into_finite() {
        let value = AuditValue::List(vec![
            AuditValue::Float(f64::NAN),
            AuditValue::Float(f64::INFINITY),
            AuditValue::Float(0.5),
        ]);
        assert_eq!(
            value.into_finite(),
            AuditValue::List(vec![
                AuditValue::Null,
                AuditValue::Null,
                AuditValue::Float(0.5)
            ])
        );
    }

    #[test]
    fn test_json_roundtrip_object() {
        let original = json!({"a": {"b": [1, 2.5, null, true]}, "c": "x"});
        let value = AuditValue::from_json(original.clone());
        assert_eq!(value.to_json(), original);
    }

    #[test]
    fn test_map_from_json_rejects_non_objects() {
        assert!(map_from_json(json!([1, 2])).is_none());
        assert_eq!(map_from_json(json!({"k": 1})).unwrap().len(), 1);
    }

    #[test]
    fn test_scalar_text() {
        assert_eq!(AuditValue::from("x").scalar_text().as_deref(), Some("x"));
        assert_eq!(AuditValue::Int(9).scalar_text().as_deref(), Some("9"));
        assert!(AuditValue::Null.scalar_text().is_none());
    }
}
