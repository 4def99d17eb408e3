//! Typed attribute values
//!
//! Attributes are a closed sum type so the encoder can match exhaustively.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ordered attribute map. Keys are emitted in sorted order on the wire.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// A single attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Bool(bool),
    Int(i64),
    Double(f64),
    Array(Vec<AttributeValue>),
    Map(BTreeMap<String, AttributeValue>),
}

impl AttributeValue {
    /// Returns true if this value (or any nested value) is a non-finite double.
    pub fn has_non_finite(&self) -> bool {
        match self {
            AttributeValue::Double(d) => !d.is_finite(),
            AttributeValue::Array(values) => values.iter().any(AttributeValue::has_non_finite),
            AttributeValue::Map(entries) => entries.values().any(AttributeValue::has_non_finite),
            AttributeValue::String(_) | AttributeValue::Bool(_) | AttributeValue::Int(_) => false,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        AttributeValue::Int(value.into())
    }
}

impl From<u32> for AttributeValue {
    fn from(value: u32) -> Self {
        AttributeValue::Int(value.into())
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Double(value)
    }
}

impl<T: Into<AttributeValue>> From<Vec<T>> for AttributeValue {
    fn from(values: Vec<T>) -> Self {
        AttributeValue::Array(values.into_iter().map(Into::into).collect())
    }
}

/// Parse a `key=value` pair into an attribute, inferring bool/int/double.
///
/// Used by the CLI; anything that does not parse as a scalar stays a string.
pub fn parse_attribute(pair: &str) -> Option<(String, AttributeValue)> {
    let (key, raw) = pair.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }

    let value = if let Ok(b) = raw.parse::<bool>() {
        AttributeValue::Bool(b)
    } else if let Ok(i) = raw.parse::<i64>() {
        AttributeValue::Int(i)
    } else {
        match raw.parse::<f64>() {
            Ok(d) if d.is_finite() => AttributeValue::Double(d),
            _ => AttributeValue::String(raw.to_string()),
        }
    };

    Some((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_finite_detection_nested() {
        let mut inner = BTreeMap::new();
        inner.insert("ratio".to_string(), AttributeValue::Double(f64::NAN));
        let value = AttributeValue::Array(vec![
            AttributeValue::Int(1),
            AttributeValue::Map(inner),
        ]);
        assert!(value.has_non_finite());
        assert!(!AttributeValue::Double(1.5).has_non_finite());
        assert!(!AttributeValue::from("text").has_non_finite());
    }

    #[test]
    fn test_parse_attribute_infers_types() {
        assert_eq!(
            parse_attribute("retry=true"),
            Some(("retry".to_string(), AttributeValue::Bool(true)))
        );
        assert_eq!(
            parse_attribute("count=42"),
            Some(("count".to_string(), AttributeValue::Int(42)))
        );
        assert_eq!(
            parse_attribute("ratio=0.5"),
            Some(("ratio".to_string(), AttributeValue::Double(0.5)))
        );
        assert_eq!(
            parse_attribute("screen=home=main"),
            Some(("screen".to_string(), AttributeValue::from("home=main")))
        );
    }

    #[test]
    fn test_parse_attribute_rejects_missing_key() {
        assert!(parse_attribute("=value").is_none());
        assert!(parse_attribute("novalue").is_none());
    }

    #[test]
    fn test_from_vec() {
        let value: AttributeValue = vec!["a", "b"].into();
        assert_eq!(
            value,
            AttributeValue::Array(vec![
                AttributeValue::String("a".into()),
                AttributeValue::String("b".into())
            ])
        );
    }
}
