// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::fmt;
use std::ops;
use std::rc::Rc;

use anyhow::{anyhow, Result};
use indexmap::IndexMap;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_yaml::Number;

// serde_yaml::Value drops the `!input` tag into an opaque TaggedValue and
// does not share subtrees. Mapping order is preserved since the order of
// `variables` is significant.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    String(Rc<str>),
    Array(Rc<Vec<Value>>),
    Object(Rc<IndexMap<Rc<str>, Value>>),

    // `!input name`: value deferred to an external parameter.
    Input(Rc<str>),

    // Indicate that a value is undefined
    Undefined,
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::String(s) => serializer.serialize_str(s.as_ref()),
            Value::Number(n) => n.serialize(serializer),
            Value::Array(a) => a.serialize(serializer),
            Value::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (k, v) in fields.iter() {
                    map.serialize_entry(k.as_ref(), v)?;
                }
                map.end()
            }
            Value::Input(name) => serializer.serialize_str(&format!("!input {name}")),

            // display undefined as a special string
            Value::Undefined => serializer.serialize_str("<undefined>"),
        }
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

// Mapping keys are always strings in the blueprint format.
fn key_string(key: serde_yaml::Value) -> Rc<str> {
    match key {
        serde_yaml::Value::String(s) => s.into(),
        serde_yaml::Value::Bool(b) => b.to_string().into(),
        serde_yaml::Value::Number(n) => n.to_string().into(),
        serde_yaml::Value::Null => "null".into(),
        other => serde_yaml::to_string(&other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default()
            .into(),
    }
}

impl From<serde_yaml::Value> for Value {
    fn from(v: serde_yaml::Value) -> Self {
        match v {
            serde_yaml::Value::Null => Value::Null,
            serde_yaml::Value::Bool(b) => Value::Bool(b),
            serde_yaml::Value::Number(n) => Value::Number(n),
            serde_yaml::Value::String(s) => Value::String(s.into()),
            serde_yaml::Value::Sequence(items) => {
                Value::Array(Rc::new(items.into_iter().map(Value::from).collect()))
            }
            serde_yaml::Value::Mapping(m) => Value::Object(Rc::new(
                m.into_iter()
                    .map(|(k, v)| (key_string(k), Value::from(v)))
                    .collect(),
            )),
            serde_yaml::Value::Tagged(tagged) => {
                let serde_yaml::value::TaggedValue { tag, value } = *tagged;
                if tag == "input" {
                    let name = match value {
                        serde_yaml::Value::String(s) => s,
                        other => key_string(other).to_string(),
                    };
                    Value::Input(name.trim().into())
                } else {
                    // Other tags are transparent.
                    Value::from(value)
                }
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl Value {
    pub fn from_yaml_str(yaml: &str) -> Result<Value> {
        let v: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        Ok(Value::from(v))
    }

    pub fn to_json_str(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Name used in diagnostics for the kind of value.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "list",
            Value::Object(_) => "dictionary",
            Value::Input(_) => "input reference",
            Value::Undefined => "undefined",
        }
    }

    pub fn as_bool(&self) -> Result<&bool> {
        match self {
            Value::Bool(b) => Ok(b),
            _ => Err(anyhow!("not a bool")),
        }
    }

    pub fn as_string(&self) -> Result<&Rc<str>> {
        match self {
            Value::String(s) => Ok(s),
            _ => Err(anyhow!("not a string")),
        }
    }

    pub fn as_number(&self) -> Result<&Number> {
        match self {
            Value::Number(n) => Ok(n),
            _ => Err(anyhow!("not a number")),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_number().ok().and_then(|n| n.as_f64())
    }

    pub fn as_array(&self) -> Result<&Vec<Value>> {
        match self {
            Value::Array(a) => Ok(a),
            _ => Err(anyhow!("not an array")),
        }
    }

    pub fn as_object(&self) -> Result<&IndexMap<Rc<str>, Value>> {
        match self {
            Value::Object(m) => Ok(m),
            _ => Err(anyhow!("not an object")),
        }
    }

    pub fn as_input(&self) -> Result<&Rc<str>> {
        match self {
            Value::Input(name) => Ok(name),
            _ => Err(anyhow!("not an input reference")),
        }
    }

    /// True for mappings that have `key`, even when it maps to null.
    pub fn has_key(&self, key: &str) -> bool {
        self.as_object().is_ok_and(|m| m.contains_key(key))
    }
}

impl ops::Index<usize> for Value {
    type Output = Value;

    fn index(&self, index: usize) -> &Self::Output {
        match self.as_array() {
            Ok(a) if index < a.len() => &a[index],
            _ => &Value::Undefined,
        }
    }
}

impl ops::Index<&str> for Value {
    type Output = Value;

    fn index(&self, key: &str) -> &Self::Output {
        match self {
            Value::Object(o) => o.get(key).unwrap_or(&Value::Undefined),
            _ => &Value::Undefined,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_tag_and_order() {
        let v = Value::from_yaml_str("variables:\n  z: !input zone\n  a: 1\n  m: '{{ a }}'\n").unwrap();
        let keys: Vec<&str> = v["variables"]
            .as_object()
            .unwrap()
            .keys()
            .map(|k| k.as_ref())
            .collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
        assert_eq!(v["variables"]["z"], Value::Input("zone".into()));
        assert_eq!(v["variables"]["a"].as_f64(), Some(1.0));
    }

    #[test]
    fn missing_keys_are_undefined() {
        let v = Value::from_yaml_str("a:\n  - x\nb: null\n").unwrap();
        assert!(v["nope"].is_undefined());
        assert!(v["a"][3].is_undefined());
        assert!(v["b"].is_null());
        assert!(v.has_key("b"));
        assert_eq!(v["a"][0], Value::from("x"));
    }

    #[test]
    fn serializes_input_marker() {
        let v = Value::from_yaml_str("e: !input door\n").unwrap();
        assert_eq!(v.to_string(), r#"{"e":"!input door"}"#);
    }
}
