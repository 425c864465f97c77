//! codec/value — self-describing document tree.
//!
//! `Value` is what the wire format encodes and what migration steps edit.
//! Records keep fields in a BTreeMap, so iteration (and therefore the
//! encoding) is always in sorted key order.

use base64::Engine as _;
use std::collections::BTreeMap;

use super::graph::ObjRef;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unit,
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Record(BTreeMap<String, Value>),
    Opt(Option<Box<Value>>),
    Ref(ObjRef),
}

impl Value {
    pub fn record() -> Self {
        Value::Record(BTreeMap::new())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Bool(_) => "bool",
            Value::U8(_) => "u8",
            Value::U16(_) => "u16",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::I8(_) => "i8",
            Value::I16(_) => "i16",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Record(_) => "record",
            Value::Opt(_) => "option",
            Value::Ref(_) => "ref",
        }
    }

    pub fn as_record(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Record(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_record_mut(&mut self) -> Option<&mut BTreeMap<String, Value>> {
        match self {
            Value::Record(m) => Some(m),
            _ => None,
        }
    }

    /// Field of a record (None for non-records and missing fields).
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.as_record().and_then(|m| m.get(field))
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.as_record_mut().and_then(|m| m.get_mut(field))
    }

    /// Insert/replace a record field. Returns false if `self` is not a record.
    pub fn set(&mut self, field: impl Into<String>, v: Value) -> bool {
        match self.as_record_mut() {
            Some(m) => {
                m.insert(field.into(), v);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.as_record_mut().and_then(|m| m.remove(field))
    }

    /// Rename a record field in place. Returns true if the field existed.
    pub fn rename(&mut self, from: &str, to: &str) -> bool {
        match self.as_record_mut() {
            Some(m) => match m.remove(from) {
                Some(v) => {
                    m.insert(to.to_string(), v);
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    /// Widening read of any unsigned/signed integer as i64.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::U8(v) => Some(v as i64),
            Value::U16(v) => Some(v as i64),
            Value::U32(v) => Some(v as i64),
            Value::U64(v) => i64::try_from(v).ok(),
            Value::I8(v) => Some(v as i64),
            Value::I16(v) => Some(v as i64),
            Value::I32(v) => Some(v as i64),
            Value::I64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Visit every object reference in this subtree.
    pub fn for_each_ref(&self, f: &mut dyn FnMut(ObjRef)) {
        match self {
            Value::Ref(r) => f(*r),
            Value::List(items) => items.iter().for_each(|v| v.for_each_ref(f)),
            Value::Record(m) => m.values().for_each(|v| v.for_each_ref(f)),
            Value::Opt(Some(v)) => v.for_each_ref(f),
            _ => {}
        }
    }

    /// JSON rendering for inspection/export. Bytes become base64 strings,
    /// references become {"$ref": index}, non-finite floats become null.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as J;
        match self {
            Value::Unit => J::Null,
            Value::Bool(b) => J::Bool(*b),
            Value::U8(v) => J::from(*v),
            Value::U16(v) => J::from(*v),
            Value::U32(v) => J::from(*v),
            Value::U64(v) => J::from(*v),
            Value::I8(v) => J::from(*v),
            Value::I16(v) => J::from(*v),
            Value::I32(v) => J::from(*v),
            Value::I64(v) => J::from(*v),
            Value::F32(v) => serde_json::Number::from_f64(*v as f64)
                .map(J::Number)
                .unwrap_or(J::Null),
            Value::F64(v) => serde_json::Number::from_f64(*v)
                .map(J::Number)
                .unwrap_or(J::Null),
            Value::Str(s) => J::String(s.clone()),
            Value::Bytes(b) => J::String(base64::engine::general_purpose::STANDARD.encode(b)),
            Value::List(items) => J::Array(items.iter().map(Value::to_json).collect()),
            Value::Record(m) => J::Object(
                m.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Opt(None) => J::Null,
            Value::Opt(Some(v)) => v.to_json(),
            Value::Ref(r) => {
                let mut o = serde_json::Map::new();
                o.insert("$ref".to_string(), J::from(r.index()));
                J::Object(o)
            }
        }
    }
}
