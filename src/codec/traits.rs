//! codec/traits — typed layer over `Value`.
//!
//! `Saveable` is implemented explicitly per type (no reflection). Hand-written
//! impls for records use `RecordBuilder` / `RecordReader`:
//!
//! ```ignore
//! impl Saveable for Player {
//!     fn to_value(&self, cx: &mut EncodeCx) -> SaveResult<Value> {
//!         Ok(RecordBuilder::new(cx)
//!             .field("level", &self.level)?
//!             .field("gold", &self.gold)?
//!             .build())
//!     }
//!     fn from_value(v: &Value, cx: &mut DecodeCx<'_>) -> SaveResult<Self> {
//!         let r = RecordReader::new("Player", v)?;
//!         Ok(Player { level: r.req("level", cx)?, gold: r.req("gold", cx)? })
//!     }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

use super::graph::{ObjRef, ObjectGraph};
use super::value::Value;
use crate::error::{SaveError, SaveResult};

// ---------------- Contexts ----------------

/// Encoding context: collects the document's reference table.
#[derive(Debug, Default)]
pub struct EncodeCx {
    table: Option<Vec<Value>>,
}

impl EncodeCx {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the reference table. A document has at most one.
    pub fn set_table(&mut self, values: Vec<Value>) -> SaveResult<()> {
        if self.table.is_some() {
            return Err(SaveError::Unencodable(
                "document already has an object table (one ObjectGraph per document)".into(),
            ));
        }
        self.table = Some(values);
        Ok(())
    }

    pub(crate) fn into_table(self) -> Vec<Value> {
        self.table.unwrap_or_default()
    }
}

/// Decoding context: gives typed code access to the reference table.
#[derive(Debug)]
pub struct DecodeCx<'d> {
    table: &'d [Value],
    taken: bool,
}

impl<'d> DecodeCx<'d> {
    pub fn new(table: &'d [Value]) -> Self {
        Self {
            table,
            taken: false,
        }
    }

    #[inline]
    pub fn table_len(&self) -> usize {
        self.table.len()
    }

    pub fn take_table(&mut self) -> SaveResult<&'d [Value]> {
        if self.taken {
            return Err(SaveError::corrupt("object table claimed twice"));
        }
        self.taken = true;
        Ok(self.table)
    }
}

pub trait Saveable: Sized {
    fn to_value(&self, cx: &mut EncodeCx) -> SaveResult<Value>;
    fn from_value(v: &Value, cx: &mut DecodeCx<'_>) -> SaveResult<Self>;
}

#[inline]
fn expected(what: &str, got: &Value) -> SaveError {
    SaveError::corrupt(format!("expected {what}, found {}", got.kind()))
}

// ---------------- Primitive impls ----------------

macro_rules! saveable_scalar {
    ($t:ty, $variant:ident, $name:literal) => {
        impl Saveable for $t {
            fn to_value(&self, _cx: &mut EncodeCx) -> SaveResult<Value> {
                Ok(Value::$variant(*self))
            }
            fn from_value(v: &Value, _cx: &mut DecodeCx<'_>) -> SaveResult<Self> {
                match v {
                    Value::$variant(x) => Ok(*x),
                    other => Err(expected($name, other)),
                }
            }
        }
    };
}

saveable_scalar!(bool, Bool, "bool");
saveable_scalar!(u8, U8, "u8");
saveable_scalar!(u16, U16, "u16");
saveable_scalar!(u32, U32, "u32");
saveable_scalar!(u64, U64, "u64");
saveable_scalar!(i8, I8, "i8");
saveable_scalar!(i16, I16, "i16");
saveable_scalar!(i32, I32, "i32");
saveable_scalar!(i64, I64, "i64");
saveable_scalar!(f32, F32, "f32");
saveable_scalar!(f64, F64, "f64");

impl Saveable for () {
    fn to_value(&self, _cx: &mut EncodeCx) -> SaveResult<Value> {
        Ok(Value::Unit)
    }
    fn from_value(v: &Value, _cx: &mut DecodeCx<'_>) -> SaveResult<Self> {
        match v {
            Value::Unit => Ok(()),
            other => Err(expected("unit", other)),
        }
    }
}

impl Saveable for String {
    fn to_value(&self, _cx: &mut EncodeCx) -> SaveResult<Value> {
        Ok(Value::Str(self.clone()))
    }
    fn from_value(v: &Value, _cx: &mut DecodeCx<'_>) -> SaveResult<Self> {
        match v {
            Value::Str(s) => Ok(s.clone()),
            other => Err(expected("str", other)),
        }
    }
}

/// Dynamic values pass through unchanged.
impl Saveable for Value {
    fn to_value(&self, _cx: &mut EncodeCx) -> SaveResult<Value> {
        Ok(self.clone())
    }
    fn from_value(v: &Value, _cx: &mut DecodeCx<'_>) -> SaveResult<Self> {
        Ok(v.clone())
    }
}

impl<T: Saveable> Saveable for Vec<T> {
    fn to_value(&self, cx: &mut EncodeCx) -> SaveResult<Value> {
        let items = self
            .iter()
            .map(|it| it.to_value(cx))
            .collect::<SaveResult<Vec<_>>>()?;
        Ok(Value::List(items))
    }
    fn from_value(v: &Value, cx: &mut DecodeCx<'_>) -> SaveResult<Self> {
        match v {
            Value::List(items) => items.iter().map(|it| T::from_value(it, cx)).collect(),
            other => Err(expected("list", other)),
        }
    }
}

impl<T: Saveable> Saveable for Option<T> {
    fn to_value(&self, cx: &mut EncodeCx) -> SaveResult<Value> {
        Ok(match self {
            Some(x) => Value::Opt(Some(Box::new(x.to_value(cx)?))),
            None => Value::Opt(None),
        })
    }
    fn from_value(v: &Value, cx: &mut DecodeCx<'_>) -> SaveResult<Self> {
        match v {
            Value::Opt(None) => Ok(None),
            Value::Opt(Some(inner)) => Ok(Some(T::from_value(inner, cx)?)),
            other => Err(expected("option", other)),
        }
    }
}

impl<A: Saveable, B: Saveable> Saveable for (A, B) {
    fn to_value(&self, cx: &mut EncodeCx) -> SaveResult<Value> {
        Ok(Value::List(vec![self.0.to_value(cx)?, self.1.to_value(cx)?]))
    }
    fn from_value(v: &Value, cx: &mut DecodeCx<'_>) -> SaveResult<Self> {
        match v {
            Value::List(items) if items.len() == 2 => {
                Ok((A::from_value(&items[0], cx)?, B::from_value(&items[1], cx)?))
            }
            Value::List(items) => Err(SaveError::corrupt(format!(
                "expected pair, found list of {}",
                items.len()
            ))),
            other => Err(expected("pair", other)),
        }
    }
}

impl<T: Saveable> Saveable for BTreeMap<String, T> {
    fn to_value(&self, cx: &mut EncodeCx) -> SaveResult<Value> {
        let mut out = BTreeMap::new();
        for (k, v) in self {
            out.insert(k.clone(), v.to_value(cx)?);
        }
        Ok(Value::Record(out))
    }
    fn from_value(v: &Value, cx: &mut DecodeCx<'_>) -> SaveResult<Self> {
        match v {
            Value::Record(m) => m
                .iter()
                .map(|(k, fv)| Ok((k.clone(), T::from_value(fv, cx)?)))
                .collect(),
            other => Err(expected("map", other)),
        }
    }
}

/// Hash maps are written in sorted key order, same bytes as the BTreeMap form.
impl<T: Saveable, S: BuildHasher + Default> Saveable for HashMap<String, T, S> {
    fn to_value(&self, cx: &mut EncodeCx) -> SaveResult<Value> {
        let mut out = BTreeMap::new();
        for (k, v) in self {
            out.insert(k.clone(), v.to_value(cx)?);
        }
        Ok(Value::Record(out))
    }
    fn from_value(v: &Value, cx: &mut DecodeCx<'_>) -> SaveResult<Self> {
        match v {
            Value::Record(m) => {
                let mut out = HashMap::with_capacity_and_hasher(m.len(), S::default());
                for (k, fv) in m {
                    out.insert(k.clone(), T::from_value(fv, cx)?);
                }
                Ok(out)
            }
            other => Err(expected("map", other)),
        }
    }
}

impl Saveable for ObjRef {
    fn to_value(&self, _cx: &mut EncodeCx) -> SaveResult<Value> {
        Ok(Value::Ref(*self))
    }
    fn from_value(v: &Value, cx: &mut DecodeCx<'_>) -> SaveResult<Self> {
        match v {
            Value::Ref(r) if (r.index() as usize) < cx.table_len() => Ok(*r),
            Value::Ref(r) => Err(SaveError::corrupt(format!(
                "dangling object reference {r} (table has {})",
                cx.table_len()
            ))),
            other => Err(expected("ref", other)),
        }
    }
}

/// The graph's nodes become the reference table; in place of the graph the
/// document keeps a u32 node count.
impl<T: Saveable> Saveable for ObjectGraph<T> {
    fn to_value(&self, cx: &mut EncodeCx) -> SaveResult<Value> {
        if let Some(r) = self.first_unfilled() {
            return Err(SaveError::Unencodable(format!(
                "object {r} was reserved but never filled"
            )));
        }
        let mut nodes = Vec::with_capacity(self.len());
        for n in self.nodes().flatten() {
            nodes.push(n.to_value(cx)?);
        }
        let count = u32::try_from(nodes.len())
            .map_err(|_| SaveError::Unencodable("object graph exceeds u32 nodes".into()))?;
        cx.set_table(nodes)?;
        Ok(Value::U32(count))
    }

    fn from_value(v: &Value, cx: &mut DecodeCx<'_>) -> SaveResult<Self> {
        let count = match v {
            Value::U32(n) => *n as usize,
            other => return Err(expected("object graph marker", other)),
        };
        let table = cx.take_table()?;
        if table.len() != count {
            return Err(SaveError::corrupt(format!(
                "object graph declares {} node(s), table holds {}",
                count,
                table.len()
            )));
        }
        let nodes = table
            .iter()
            .map(|n| T::from_value(n, cx))
            .collect::<SaveResult<Vec<_>>>()?;
        Ok(ObjectGraph::from_nodes(nodes))
    }
}

// ---------------- Record helpers ----------------

pub struct RecordBuilder<'c> {
    cx: &'c mut EncodeCx,
    fields: BTreeMap<String, Value>,
}

impl<'c> RecordBuilder<'c> {
    pub fn new(cx: &'c mut EncodeCx) -> Self {
        Self {
            cx,
            fields: BTreeMap::new(),
        }
    }

    pub fn field<T: Saveable>(mut self, name: &str, v: &T) -> SaveResult<Self> {
        let val = v.to_value(self.cx)?;
        if self.fields.insert(name.to_string(), val).is_some() {
            return Err(SaveError::Unencodable(format!("duplicate field '{name}'")));
        }
        Ok(self)
    }

    pub fn build(self) -> Value {
        Value::Record(self.fields)
    }
}

pub struct RecordReader<'v> {
    ty: &'static str,
    fields: &'v BTreeMap<String, Value>,
}

impl<'v> RecordReader<'v> {
    pub fn new(ty: &'static str, v: &'v Value) -> SaveResult<Self> {
        match v {
            Value::Record(fields) => Ok(Self { ty, fields }),
            other => Err(SaveError::corrupt(format!(
                "{ty}: expected record, found {}",
                other.kind()
            ))),
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    fn decode<T: Saveable>(&self, name: &str, fv: &Value, cx: &mut DecodeCx<'_>) -> SaveResult<T> {
        T::from_value(fv, cx).map_err(|e| match e {
            SaveError::CorruptPayload(m) => {
                SaveError::CorruptPayload(format!("{}.{}: {}", self.ty, name, m))
            }
            other => other,
        })
    }

    /// Required field.
    pub fn req<T: Saveable>(&self, name: &str, cx: &mut DecodeCx<'_>) -> SaveResult<T> {
        match self.fields.get(name) {
            Some(fv) => self.decode(name, fv, cx),
            None => Err(SaveError::corrupt(format!(
                "{}: missing field '{}'",
                self.ty, name
            ))),
        }
    }

    /// Field that older payloads may not have.
    pub fn opt<T: Saveable>(&self, name: &str, cx: &mut DecodeCx<'_>) -> SaveResult<Option<T>> {
        match self.fields.get(name) {
            Some(fv) => self.decode(name, fv, cx).map(Some),
            None => Ok(None),
        }
    }

    pub fn or_default<T: Saveable + Default>(
        &self,
        name: &str,
        cx: &mut DecodeCx<'_>,
    ) -> SaveResult<T> {
        Ok(self.opt(name, cx)?.unwrap_or_default())
    }
}
