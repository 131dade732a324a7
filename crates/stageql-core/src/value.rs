use std::{
    cmp::Ordering,
    fmt::{self, Display, Formatter},
};

use serde::{
    Serialize, Serializer,
    ser::{SerializeMap, SerializeSeq},
};
use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::shape::{ScalarKind, Shape};

// `i64::MAX as f64` rounds up to 2^63, so the upper bound is exclusive.
const I64_MIN: f64 = i64::MIN as f64;
const I64_MAX: f64 = i64::MAX as f64;

/// A runtime value: the data a compiled query reads from and the result it builds.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(SmolStr),
    Enum(SmolStr),
    List(Vec<Value>),
    Object(Object),
}

/// Insertion-ordered map of member name to value.
///
/// Result objects keep the order in which the request selected their fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Object {
    entries: IndexMap<SmolStr, Value>,
}

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: IndexMap::with_capacity(capacity),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Inserts a member, replacing (in place) and returning any previous value.
    pub fn insert(&mut self, name: impl Into<SmolStr>, value: Value) -> Option<Value> {
        self.entries.insert(name.into(), value)
    }

    /// Removes a member, keeping the order of the rest.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.entries.shift_remove(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &SmolStr> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SmolStr, &Value)> {
        self.entries.iter()
    }
}

impl<K: Into<SmolStr>> FromIterator<(K, Value)> for Object {
    fn from_iter<T: IntoIterator<Item = (K, Value)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().map(|(name, value)| (name.into(), value)).collect(),
        }
    }
}

impl IntoIterator for Object {
    type Item = (SmolStr, Value);
    type IntoIter = indexmap::map::IntoIter<SmolStr, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Value {
    /// Member of an object value; `Null` for anything else or a missing member.
    pub fn member(&self, name: &str) -> Value {
        match self {
            Value::Object(object) => object.get(name).cloned().unwrap_or_default(),
            _ => Value::Null,
        }
    }

    pub fn into_member(self, name: &str) -> Value {
        match self {
            Value::Object(mut object) => object.remove(name).unwrap_or_default(),
            _ => Value::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Null | Value::Bool(false))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Enum(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Boolean",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Enum(_) => "Enum",
            Value::List(_) => "List",
            Value::Object(_) => "Object",
        }
    }

    pub fn shape(&self) -> Shape {
        match self {
            Value::Bool(_) => Shape::boolean(),
            Value::Int(_) => Shape::int(),
            Value::Float(_) => Shape::float(),
            Value::String(_) => Shape::string(),
            Value::List(items) => Shape::list(items.first().map(Value::shape).unwrap_or_default()),
            Value::Null | Value::Enum(_) | Value::Object(_) => Shape::Any,
        }
    }

    /// Equality with numeric widening, so `Int(1)` equals `Float(1.0)`.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
            (Value::String(a) | Value::Enum(a), Value::String(b) | Value::Enum(b)) => a == b,
            _ => self == other,
        }
    }

    /// Ordering used by sorting and comparisons. `Null` orders first;
    /// values of unrelated kinds are unordered.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Null, _) => Some(Ordering::Less),
            (_, Value::Null) => Some(Ordering::Greater),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::String(a) | Value::Enum(a), Value::String(b) | Value::Enum(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Converts a scalar to `to`. `Null` converts to `Null`; `None` means the
    /// value has no representation in the target kind.
    pub fn convert(&self, to: ScalarKind) -> Option<Value> {
        match (self, to) {
            (Value::Null, _) => Some(Value::Null),
            (Value::Int(n), ScalarKind::Int) => Some(Value::Int(*n)),
            (Value::Float(n), ScalarKind::Int) if n.fract() == 0.0 && (I64_MIN..I64_MAX).contains(n) => {
                Some(Value::Int(*n as i64))
            }
            (Value::Bool(b), ScalarKind::Int) => Some(Value::Int(i64::from(*b))),
            (Value::String(s), ScalarKind::Int) => s.trim().parse().ok().map(Value::Int),
            (Value::Int(n), ScalarKind::Float) => Some(Value::Float(*n as f64)),
            (Value::Float(n), ScalarKind::Float) => Some(Value::Float(*n)),
            (Value::String(s), ScalarKind::Float) => s.trim().parse().ok().map(Value::Float),
            (Value::Bool(b), ScalarKind::Boolean) => Some(Value::Bool(*b)),
            (Value::Int(n), ScalarKind::Boolean) => Some(Value::Bool(*n != 0)),
            (Value::String(s), ScalarKind::Boolean) => match s.as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            (Value::String(s) | Value::Enum(s), ScalarKind::String | ScalarKind::Id) => {
                Some(Value::String(s.clone()))
            }
            (Value::Int(n), ScalarKind::String | ScalarKind::Id) => Some(Value::String(n.to_string().into())),
            (Value::Float(n), ScalarKind::String) => Some(Value::String(n.to_string().into())),
            (Value::Bool(b), ScalarKind::String) => Some(Value::String(b.to_string().into())),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Float(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) | Value::Enum(s) => serde_json::Value::String(s.to_string()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(object) => serde_json::Value::Object(
                object
                    .iter()
                    .map(|(name, value)| (name.to_string(), value.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or_default(),
            },
            serde_json::Value::String(s) => Value::String(s.into()),
            serde_json::Value::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        value.to_json()
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<SmolStr> for Value {
    fn from(s: SmolStr) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Value::Object(object)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::Float(n) => serializer.serialize_f64(*n),
            Value::String(s) | Value::Enum(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Object(object) => {
                let mut map = serializer.serialize_map(Some(object.len()))?;
                for (name, value) in object.iter() {
                    map.serialize_entry(name.as_str(), value)?;
                }
                map.end()
            }
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) | Value::Enum(s) => write!(f, "{s:?}"),
            _ => write!(f, "{}", self.to_json()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(Value::Int(1), Value::Float(1.0), true)]
    #[case(Value::String("A".into()), Value::Enum("A".into()), true)]
    #[case(Value::Int(1), Value::String("1".into()), false)]
    #[case(Value::Null, Value::Null, true)]
    fn test_loose_eq(#[case] a: Value, #[case] b: Value, #[case] expected: bool) {
        assert_eq!(a.loose_eq(&b), expected);
    }

    #[rstest]
    #[case(Value::Null, Value::Int(0), Some(Ordering::Less))]
    #[case(Value::Int(2), Value::Float(1.5), Some(Ordering::Greater))]
    #[case(Value::String("a".into()), Value::String("b".into()), Some(Ordering::Less))]
    #[case(Value::Bool(true), Value::Int(1), None)]
    fn test_compare(#[case] a: Value, #[case] b: Value, #[case] expected: Option<Ordering>) {
        assert_eq!(a.compare(&b), expected);
    }

    #[rstest]
    #[case(Value::Int(7), ScalarKind::String, Some(Value::String("7".into())))]
    #[case(Value::String("42".into()), ScalarKind::Int, Some(Value::Int(42)))]
    #[case(Value::Float(2.5), ScalarKind::Int, None)]
    #[case(Value::Float(-3.0), ScalarKind::Int, Some(Value::Int(-3)))]
    #[case(Value::Float(1e300), ScalarKind::Int, None)]
    #[case(Value::Float(-1e300), ScalarKind::Int, None)]
    #[case(Value::Float(9_223_372_036_854_775_808.0), ScalarKind::Int, None)]
    #[case(Value::Float(f64::INFINITY), ScalarKind::Int, None)]
    #[case(Value::Null, ScalarKind::Boolean, Some(Value::Null))]
    #[case(Value::String("yes".into()), ScalarKind::Boolean, None)]
    fn test_convert(#[case] value: Value, #[case] to: ScalarKind, #[case] expected: Option<Value>) {
        assert_eq!(value.convert(to), expected);
    }

    #[test]
    fn test_json_round_trip() {
        let value = Value::from(json!({"b": 1, "a": [true, null], "c": {"d": 1.5}}));
        assert_eq!(value.as_object().map(Object::len), Some(3));
        assert_eq!(value.member("c").member("d"), Value::Float(1.5));
        assert_eq!(value.to_json(), json!({"b": 1, "a": [true, null], "c": {"d": 1.5}}));
    }

    #[test]
    fn test_object_insert_replaces_in_place() {
        let mut object: Object = [("a", Value::Int(1)), ("b", Value::Int(2))].into_iter().collect();
        assert_eq!(object.insert("a", Value::Int(3)), Some(Value::Int(1)));
        assert_eq!(object.keys().map(|k| k.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_object_remove_keeps_order() {
        let mut object: Object = [("a", Value::Int(1)), ("b", Value::Int(2)), ("c", Value::Int(3))]
            .into_iter()
            .collect();
        assert_eq!(object.remove("a"), Some(Value::Int(1)));
        assert_eq!(object.remove("a"), None);
        assert_eq!(object.keys().map(|k| k.as_str()).collect::<Vec<_>>(), vec!["b", "c"]);
        assert!(object.contains("c"));
    }

    #[test]
    fn test_serialize_object_in_insertion_order() {
        let object: Object = [("z", Value::Int(1)), ("a", Value::from("x"))].into_iter().collect();
        let text = serde_json::to_string(&Value::Object(object)).unwrap();
        assert_eq!(text, r#"{"z":1,"a":"x"}"#);
    }

    #[test]
    fn test_member_of_non_object_is_null() {
        assert_eq!(Value::Int(1).member("x"), Value::Null);
        assert_eq!(Value::Null.into_member("x"), Value::Null);
    }
}
