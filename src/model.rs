//! Core typed-value and identifier types shared by the graph, handler, and
//! protocol layers.
//!
//! `PropertyValue` mirrors the typed property model PMGD exposes to
//! `PMGDQuery::set_property`/`set_value` (bool, int, float, string, time),
//! plus the two JSON object shapes the wire format recognizes for values
//! that aren't plain scalars: `{"_date": "..."}` and `{"_blob": "..."}`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A property name the client may never set directly; these are owned by
/// the core (media path properties, descriptor-set metadata, ...).
pub const RESERVED_PROPERTY_PREFIX: &str = "VDMS_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Time(String),
}

impl PropertyValue {
    /// Parse a bare JSON value into a typed property, following the same
    /// dispatch `PMGDQuery::set_property` uses: JSON ints/bools/floats/
    /// strings map directly; a JSON object is only legal as `{"_date":
    /// ...}` (time) or `{"_blob": ...}` (opaque string).
    pub fn from_json(val: &serde_json::Value) -> Result<Self, String> {
        match val {
            serde_json::Value::Bool(b) => Ok(PropertyValue::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(PropertyValue::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(PropertyValue::Float(f))
                } else {
                    Err(format!("unrepresentable number: {}", n))
                }
            }
            serde_json::Value::String(s) => Ok(PropertyValue::String(s.clone())),
            serde_json::Value::Object(map) => {
                if let Some(serde_json::Value::String(d)) = map.get("_date") {
                    Ok(PropertyValue::Time(d.clone()))
                } else if let Some(serde_json::Value::String(b)) = map.get("_blob") {
                    Ok(PropertyValue::String(b.clone()))
                } else {
                    Err("object value must be {\"_date\": ...} or {\"_blob\": ...}".into())
                }
            }
            other => Err(format!("unsupported value type: {}", other)),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            PropertyValue::Bool(b) => serde_json::Value::Bool(*b),
            PropertyValue::Int(i) => serde_json::json!(*i),
            PropertyValue::Float(f) => serde_json::json!(*f),
            PropertyValue::String(s) => serde_json::Value::String(s.clone()),
            PropertyValue::Time(t) => serde_json::Value::String(t.clone()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Int(i) => Some(*i as f64),
            PropertyValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, PropertyValue::Float(_))
    }
}

impl PartialOrd for PropertyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (PropertyValue::Bool(a), PropertyValue::Bool(b)) => a.partial_cmp(b),
            (PropertyValue::Int(a), PropertyValue::Int(b)) => a.partial_cmp(b),
            (PropertyValue::Float(a), PropertyValue::Float(b)) => a.partial_cmp(b),
            (PropertyValue::Int(a), PropertyValue::Float(b)) => (*a as f64).partial_cmp(b),
            (PropertyValue::Float(a), PropertyValue::Int(b)) => a.partial_cmp(&(*b as f64)),
            (PropertyValue::String(a), PropertyValue::String(b)) => a.partial_cmp(b),
            (PropertyValue::Time(a), PropertyValue::Time(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

pub fn is_reserved_property(key: &str) -> bool {
    key.starts_with(RESERVED_PROPERTY_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scalars() {
        assert_eq!(PropertyValue::from_json(&serde_json::json!(30)).unwrap(), PropertyValue::Int(30));
        assert_eq!(PropertyValue::from_json(&serde_json::json!(3.5)).unwrap(), PropertyValue::Float(3.5));
        assert_eq!(PropertyValue::from_json(&serde_json::json!("A")).unwrap(), PropertyValue::String("A".into()));
        assert_eq!(PropertyValue::from_json(&serde_json::json!(true)).unwrap(), PropertyValue::Bool(true));
    }

    #[test]
    fn parses_date_and_blob_objects() {
        let date = serde_json::json!({"_date": "2020-01-01T00:00:00"});
        assert_eq!(PropertyValue::from_json(&date).unwrap(), PropertyValue::Time("2020-01-01T00:00:00".into()));
        let blob = serde_json::json!({"_blob": "opaque"});
        assert_eq!(PropertyValue::from_json(&blob).unwrap(), PropertyValue::String("opaque".into()));
    }

    #[test]
    fn rejects_other_objects() {
        let bad = serde_json::json!({"foo": "bar"});
        assert!(PropertyValue::from_json(&bad).is_err());
    }

    #[test]
    fn reserved_property_detection() {
        assert!(is_reserved_property("VDMS_IMAGE_PATH"));
        assert!(!is_reserved_property("Name"));
    }
}
