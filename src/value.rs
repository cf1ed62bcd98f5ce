// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::fmt;
use std::rc::Rc;

use anyhow::{anyhow, bail, Result};
use indexmap::IndexMap;
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

/// Field map with insertion order preserved. Response key order must equal
/// selection order, so a sorted map will not do.
pub type FieldMap = IndexMap<Rc<str>, Value>;

// We cannot use serde_json::Value because GraphQL distinguishes Int from
// Float and carries symbolic enum values through execution.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Rc<str>),

    // A coerced enum literal; serializes as its name.
    Enum(Rc<str>),

    List(Rc<Vec<Value>>),
    Object(Rc<FieldMap>),
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::Float(n) => serializer.serialize_f64(*n),
            Value::String(s) | Value::Enum(s) => serializer.serialize_str(s.as_ref()),
            Value::List(a) => a.serialize(serializer),
            Value::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (k, v) in fields.iter() {
                    map.serialize_entry(k.as_ref(), v)?;
                }
                map.end()
            }
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a value")
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Null)
    }

    fn visit_none<E>(self) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Null)
    }

    fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Bool(v))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        match i64::try_from(v) {
            Ok(n) => Ok(Value::Int(n)),
            _ => Ok(Value::Float(v as f64)),
        }
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Int(v))
    }

    fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Float(v))
    }

    fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::String(s.into()))
    }

    fn visit_string<E>(self, s: String) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::String(s.into()))
    }

    fn visit_seq<V>(self, mut visitor: V) -> Result<Self::Value, V::Error>
    where
        V: SeqAccess<'de>,
    {
        let mut arr = vec![];
        while let Some(v) = visitor.next_element()? {
            arr.push(v);
        }
        Ok(Value::from(arr))
    }

    fn visit_map<V>(self, mut visitor: V) -> Result<Self::Value, V::Error>
    where
        V: MapAccess<'de>,
    {
        let mut map = FieldMap::new();
        while let Some((key, value)) = visitor.next_entry::<String, Value>()? {
            map.insert(key.into(), value);
        }
        Ok(Value::from(map))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ValueVisitor)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(s) => write!(f, "{s}"),
            Err(_e) => Err(std::fmt::Error),
        }
    }
}

impl Value {
    pub fn new_object() -> Value {
        Value::from(FieldMap::new())
    }

    pub fn new_list() -> Value {
        Value::from(vec![])
    }

    pub fn from_json_str(json: &str) -> Result<Value> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_str(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            _ => Err(anyhow!("not a bool")),
        }
    }

    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Value::Int(n) => Ok(*n),
            _ => Err(anyhow!("not an int")),
        }
    }

    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Value::Float(n) => Ok(*n),
            Value::Int(n) => Ok(*n as f64),
            _ => Err(anyhow!("not a float")),
        }
    }

    pub fn as_string(&self) -> Result<&Rc<str>> {
        match self {
            Value::String(s) => Ok(s),
            _ => Err(anyhow!("not a string")),
        }
    }

    pub fn as_list(&self) -> Result<&Vec<Value>> {
        match self {
            Value::List(a) => Ok(a),
            _ => Err(anyhow!("not a list")),
        }
    }

    pub fn as_object(&self) -> Result<&FieldMap> {
        match self {
            Value::Object(m) => Ok(m),
            _ => Err(anyhow!("not an object")),
        }
    }

    pub fn as_object_mut(&mut self) -> Result<&mut FieldMap> {
        match self {
            Value::Object(m) => Ok(Rc::make_mut(m)),
            _ => bail!("not an object"),
        }
    }

    /// Property lookup used by the default field resolver. Returns Null for
    /// non-objects and missing keys.
    pub fn get(&self, key: &str) -> Value {
        match self {
            Value::Object(m) => m.get(key).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }

    /// A short rendering for error messages; strings keep their quotes.
    pub fn display_for_error(&self) -> String {
        match serde_json::to_string(self) {
            Ok(s) if s.len() <= 80 => s,
            Ok(s) => format!("{}...", &s[..80]),
            Err(_) => "<value>".to_owned(),
        }
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
        Value::Int(n as i64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Int(n as i64)
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

impl From<Vec<Value>> for Value {
    fn from(a: Vec<Value>) -> Self {
        Value::List(Rc::new(a))
    }
}

impl From<FieldMap> for Value {
    fn from(m: FieldMap) -> Self {
        Value::Object(Rc::new(m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip_preserves_key_order() {
        let v = Value::from_json_str(r#"{"z": 1, "a": [true, null, "x"], "m": {"k": 2.5}}"#)
            .unwrap();
        assert_eq!(
            v.to_json_str().unwrap(),
            r#"{"z":1,"a":[true,null,"x"],"m":{"k":2.5}}"#
        );
    }

    #[test]
    fn int_and_float_stay_distinct() {
        let v = Value::from_json_str("[1, 1.0]").unwrap();
        let items = v.as_list().unwrap();
        assert_eq!(items[0], Value::Int(1));
        assert_eq!(items[1], Value::Float(1.0));
    }

    #[test]
    fn enums_serialize_as_names() {
        let v = Value::Enum("RED".into());
        assert_eq!(v.to_json_str().unwrap(), "\"RED\"");
    }

    #[test]
    fn property_lookup() {
        let v = Value::from_json_str(r#"{"a": {"b": 42}}"#).unwrap();
        assert_eq!(v.get("a").get("b"), Value::Int(42));
        assert_eq!(v.get("missing"), Value::Null);
        assert_eq!(Value::Int(1).get("a"), Value::Null);
    }
}
