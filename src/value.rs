//! Typed wrappers for the plain data a task produces.
//!
//! A [`Value`] is a JSON payload tagged with the shape it is meant to have.
//! The tag exists so that collections survive a round-trip through the
//! result store unchanged: sets come back sorted and deduplicated, mappings
//! come back as objects, and so on.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::ValueError;

/// The shape of the payload held by a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    #[default]
    Scalar,
    List,
    Tuple,
    Mapping,
    Set,
}

impl ValueKind {
    fn name(self) -> &'static str {
        match self {
            ValueKind::Scalar => "scalar",
            ValueKind::List => "list",
            ValueKind::Tuple => "tuple",
            ValueKind::Mapping => "mapping",
            ValueKind::Set => "set",
        }
    }

    fn parse(name: &str) -> Result<Self, ValueError> {
        match name {
            "scalar" => Ok(ValueKind::Scalar),
            "list" => Ok(ValueKind::List),
            "tuple" => Ok(ValueKind::Tuple),
            "mapping" | "dict" => Ok(ValueKind::Mapping),
            "set" => Ok(ValueKind::Set),
            other => Err(ValueError::UnknownType(other.to_string())),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single named output of a task.
///
/// Equality is structural over the normalized payload and the kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawValue")]
pub struct Value {
    value: Json,
    #[serde(rename = "type")]
    kind: ValueKind,
}

#[derive(Deserialize)]
struct RawValue {
    value: Json,
    #[serde(rename = "type", default)]
    kind: ValueKind,
}

impl TryFrom<RawValue> for Value {
    type Error = ValueError;

    fn try_from(raw: RawValue) -> Result<Self, Self::Error> {
        Value::new(raw.value, raw.kind)
    }
}

impl Value {
    /// Creates a value of the given kind, normalizing the payload.
    pub fn new(value: Json, kind: ValueKind) -> Result<Self, ValueError> {
        let value = match kind {
            ValueKind::Scalar => value,
            ValueKind::List | ValueKind::Tuple => match value {
                Json::Array(_) => value,
                other => return Err(shape_error(kind, &other)),
            },
            ValueKind::Mapping => match value {
                Json::Object(_) => value,
                other => return Err(shape_error(kind, &other)),
            },
            ValueKind::Set => match value {
                Json::Array(items) => Json::Array(normalize_set(items)),
                other => return Err(shape_error(kind, &other)),
            },
        };

        Ok(Self { value, kind })
    }

    /// A scalar holding any JSON payload as-is.
    pub fn scalar(value: impl Into<Json>) -> Self {
        Self {
            value: value.into(),
            kind: ValueKind::Scalar,
        }
    }

    pub fn list<T: Into<Json>>(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            value: Json::Array(items.into_iter().map(Into::into).collect()),
            kind: ValueKind::List,
        }
    }

    pub fn tuple<T: Into<Json>>(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            value: Json::Array(items.into_iter().map(Into::into).collect()),
            kind: ValueKind::Tuple,
        }
    }

    pub fn set<T: Into<Json>>(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            value: Json::Array(normalize_set(items.into_iter().map(Into::into).collect())),
            kind: ValueKind::Set,
        }
    }

    pub fn mapping<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Json>,
    {
        Self {
            value: Json::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
            kind: ValueKind::Mapping,
        }
    }

    /// Wraps loosely shaped task output in a `Value`.
    ///
    /// An object of the form `{"value": .., "type": ..}` is read as an
    /// already wrapped value; a missing `type` means scalar, so `{"value": 3}`
    /// wraps to `3`. Arrays become lists, other objects become mappings, and
    /// everything else is a scalar.
    pub fn wrap(raw: Json) -> Result<Self, ValueError> {
        match raw {
            Json::Object(mut map) if is_wrapped(&map) => {
                let kind = match map.remove("type") {
                    None => ValueKind::Scalar,
                    Some(Json::String(name)) => ValueKind::parse(&name)?,
                    Some(other) => return Err(ValueError::Unwrappable(other.to_string())),
                };
                let value = map.remove("value").unwrap_or(Json::Null);
                Value::new(value, kind)
            }
            Json::Object(map) => Value::new(Json::Object(map), ValueKind::Mapping),
            Json::Array(items) => Value::new(Json::Array(items), ValueKind::List),
            other => Ok(Value::scalar(other)),
        }
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// The normalized JSON payload.
    pub fn as_json(&self) -> &Json {
        &self.value
    }

    pub fn into_json(self) -> Json {
        self.value
    }

    /// Decodes the payload into a concrete type.
    pub fn get<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.value)
    }
}

macro_rules! impl_scalar_from {
    ($($T:ty),*) => {
        $(
            impl From<$T> for Value {
                fn from(value: $T) -> Self {
                    Value::scalar(value)
                }
            }
        )*
    };
}

impl_scalar_from!(bool, i32, i64, u32, u64, f64, String, &str);

impl<T: Into<Json>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::list(items)
    }
}

fn is_wrapped(map: &serde_json::Map<String, Json>) -> bool {
    map.contains_key("value") && map.keys().all(|k| k == "value" || k == "type")
}

/// Orders set members by their serialized form, which is total for JSON.
fn normalize_set(items: Vec<Json>) -> Vec<Json> {
    let mut keyed: Vec<(String, Json)> = items
        .into_iter()
        .map(|item| (item.to_string(), item))
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    keyed.dedup_by(|a, b| a.0 == b.0);
    keyed.into_iter().map(|(_, item)| item).collect()
}

fn shape_error(expected: ValueKind, found: &Json) -> ValueError {
    ValueError::Shape {
        expected: expected.name(),
        found: json_type_name(found),
    }
}

pub(crate) fn json_type_name(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "list",
        Json::Object(_) => "mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wrap_value() {
        let v = Value::scalar(1);
        assert_eq!(v, Value::wrap(json!(1)).unwrap());
        assert_eq!(v, Value::wrap(json!({"value": 1})).unwrap());
        assert_eq!(v, Value::wrap(json!({"value": 1, "type": "scalar"})).unwrap());
    }

    #[test]
    fn test_wrap_collections() {
        assert_eq!(Value::wrap(json!([1, 2])).unwrap().kind(), ValueKind::List);
        assert_eq!(
            Value::wrap(json!({"a": 1, "b": 2})).unwrap().kind(),
            ValueKind::Mapping
        );
        // "value" alongside other keys is an ordinary mapping
        assert_eq!(
            Value::wrap(json!({"value": 1, "other": 2})).unwrap().kind(),
            ValueKind::Mapping
        );
    }

    #[test]
    fn test_wrap_rejects_bad_tags() {
        assert!(matches!(
            Value::wrap(json!({"value": 1, "type": "matrix"})),
            Err(ValueError::UnknownType(_))
        ));
        assert!(matches!(
            Value::wrap(json!({"value": 1, "type": "set"})),
            Err(ValueError::Shape { expected: "set", found: "number" })
        ));
    }

    #[test]
    fn test_set_is_normalized() {
        let a = Value::set([3, 1, 2, 1]);
        let b = Value::set([1, 2, 3]);
        assert_eq!(a, b);
        assert_eq!(a.as_json(), &json!([1, 2, 3]));
    }

    #[test]
    fn test_kind_is_part_of_equality() {
        assert_ne!(Value::list([1, 2]), Value::tuple([1, 2]));
    }

    #[test]
    fn test_serde_normalizes() {
        let v: Value = serde_json::from_value(json!({"value": [2, 1, 2], "type": "set"})).unwrap();
        assert_eq!(v, Value::set([1, 2]));

        let json = serde_json::to_value(Value::tuple(["a", "b"])).unwrap();
        assert_eq!(json, json!({"value": ["a", "b"], "type": "tuple"}));

        let bad = serde_json::from_value::<Value>(json!({"value": 1, "type": "list"}));
        assert!(bad.is_err());
    }

    #[test]
    fn test_typed_get() {
        let v = Value::list([1, 2, 3]);
        assert_eq!(v.get::<Vec<i64>>().unwrap(), vec![1, 2, 3]);
        assert!(v.get::<String>().is_err());
    }
}
