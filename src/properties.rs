//! The property map: a named-value bag with reserved-name filtering, used
//! both for the stream header's user metadata and for event/include
//! attributes.

use std::collections::BTreeMap;

/// Names the library reserves for its own use; never stored from user input,
/// in any construction path.
pub const RESERVED_PROPERTY_NAMES: &[&str] =
    &["PartitionKey", "RowKey", "ETag", "Timestamp", "Version"];

/// A scalar value of one of the backend's supported attribute types.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// UTF-8 string.
    String(String),
    /// 64-bit signed integer.
    Int64(i64),
    /// Boolean.
    Bool(bool),
    /// 64-bit floating point.
    Double(f64),
    /// Opaque binary blob.
    Binary(Vec<u8>),
}

/// A named-value bag of [`PropertyValue`]s, serialized by emitting one
/// attribute per key at the current row level -- no nesting.
///
/// A `BTreeMap` is used rather than a `HashMap` so that property emission
/// order is deterministic, which keeps tests (and backend request bodies)
/// reproducible.
pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// Drops every key in `map` matching [`RESERVED_PROPERTY_NAMES`].
///
/// Called on every construction path (from a user object, from a caller
/// dictionary, or internally when building event/header rows) so that
/// reserved names can never be smuggled in from user input.
#[must_use]
pub fn filter_reserved(map: PropertyMap) -> PropertyMap {
    map.into_iter()
        .filter(|(key, _)| !RESERVED_PROPERTY_NAMES.contains(&key.as_str()))
        .collect()
}

/// Builds a [`PropertyMap`] from a caller-supplied dictionary, dropping
/// reserved names.
#[must_use]
pub fn from_map(map: PropertyMap) -> PropertyMap {
    filter_reserved(map)
}

#[cfg(feature = "serde")]
mod reflect {
    use super::{filter_reserved, PropertyMap, PropertyValue};

    /// Reflects the public scalar-typed fields of a `serde`-serializable user
    /// object into a [`PropertyMap`].
    ///
    /// Fields that don't serialize to a JSON scalar (nested objects, arrays)
    /// are dropped: the property map never nests.
    pub fn from_serializable<T>(value: &T) -> Result<PropertyMap, crate::Error>
    where
        T: serde::Serialize,
    {
        let json = serde_json::to_value(value)
            .map_err(|err| crate::Error::InvalidOperation(format!("failed to reflect properties from object: {err}")))?;

        let object = match json {
            serde_json::Value::Object(object) => object,
            _ => {
                return Err(crate::Error::InvalidOperation(
                    "properties can only be reflected from a struct-like object".to_owned(),
                ))
            }
        };

        let map = object
            .into_iter()
            .filter_map(|(key, value)| json_scalar_to_property(value).map(|value| (key, value)))
            .collect();

        Ok(filter_reserved(map))
    }

    fn json_scalar_to_property(value: serde_json::Value) -> Option<PropertyValue> {
        match value {
            serde_json::Value::String(s) => Some(PropertyValue::String(s)),
            serde_json::Value::Bool(b) => Some(PropertyValue::Bool(b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(PropertyValue::Int64(i))
                } else {
                    n.as_f64().map(PropertyValue::Double)
                }
            }
            // Arrays, objects and null don't map onto a flat attribute set.
            serde_json::Value::Array(_) | serde_json::Value::Object(_) | serde_json::Value::Null => None,
        }
    }
}

#[cfg(feature = "serde")]
pub use reflect::from_serializable;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_reserved_drops_every_reserved_name() {
        let mut map = PropertyMap::new();
        map.insert("PartitionKey".to_owned(), PropertyValue::String("p".into()));
        map.insert("RowKey".to_owned(), PropertyValue::String("r".into()));
        map.insert("ETag".to_owned(), PropertyValue::String("e".into()));
        map.insert("Timestamp".to_owned(), PropertyValue::String("t".into()));
        map.insert("Version".to_owned(), PropertyValue::Int64(1));
        map.insert("name".to_owned(), PropertyValue::String("kept".into()));

        let filtered = filter_reserved(map);

        assert_eq!(filtered.len(), 1);
        assert_eq!(
            filtered.get("name"),
            Some(&PropertyValue::String("kept".into()))
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn from_serializable_reflects_scalar_fields_and_drops_nested() {
        #[derive(serde::Serialize)]
        struct Payload {
            name: String,
            amount: i64,
            nested: Vec<u8>,
        }

        let map = from_serializable(&Payload {
            name: "widget".to_owned(),
            amount: 42,
            nested: vec![1, 2, 3],
        })
        .unwrap();

        assert_eq!(map.len(), 2);
        assert_eq!(map.get("name"), Some(&PropertyValue::String("widget".into())));
        assert_eq!(map.get("amount"), Some(&PropertyValue::Int64(42)));
        assert!(!map.contains_key("nested"));
    }
}
