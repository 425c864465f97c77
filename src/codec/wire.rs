//! codec/wire — бинарный формат документа.
//!
//! Каждое значение: tag u8 + тело (LE):
//!   0x00 unit | 0x01 bool(u8 0/1)
//!   0x02 u8 | 0x03 u16 | 0x04 u32 | 0x05 u64
//!   0x06 i8 | 0x07 i16 | 0x08 i32 | 0x09 i64
//!   0x0A f32 | 0x0B f64 (биты IEEE-754)
//!   0x10 str  = u32 len + UTF-8
//!   0x11 bytes = u32 len + raw
//!   0x20 list = u32 count + values
//!   0x21 record = u32 count + (u32 len + name, value)*, имена строго возрастают
//!   0x30 none | 0x31 some + value
//!   0x40 ref = u32 index в таблице объектов
//!
//! Документ: str type_name, u32 table_len, table values, root value.
//! Все ref (и в таблице, и в корне) должны быть < table_len.
//!
//! Декодер не паникует: любой обрыв/мусор → SaveError::CorruptPayload.

use byteorder::{ByteOrder, LittleEndian};
use std::collections::BTreeMap;

use super::graph::ObjRef;
use super::value::Value;
use crate::consts::MAX_NESTING_DEPTH;
use crate::error::{SaveError, SaveResult};

const TAG_UNIT: u8 = 0x00;
const TAG_BOOL: u8 = 0x01;
const TAG_U8: u8 = 0x02;
const TAG_U16: u8 = 0x03;
const TAG_U32: u8 = 0x04;
const TAG_U64: u8 = 0x05;
const TAG_I8: u8 = 0x06;
const TAG_I16: u8 = 0x07;
const TAG_I32: u8 = 0x08;
const TAG_I64: u8 = 0x09;
const TAG_F32: u8 = 0x0A;
const TAG_F64: u8 = 0x0B;
const TAG_STR: u8 = 0x10;
const TAG_BYTES: u8 = 0x11;
const TAG_LIST: u8 = 0x20;
const TAG_RECORD: u8 = 0x21;
const TAG_NONE: u8 = 0x30;
const TAG_SOME: u8 = 0x31;
const TAG_REF: u8 = 0x40;

/// Decoded payload: type name, reference table and root value.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub type_name: String,
    pub table: Vec<Value>,
    pub root: Value,
}

impl Document {
    pub fn new(type_name: impl Into<String>, root: Value) -> Self {
        Self {
            type_name: type_name.into(),
            table: Vec::new(),
            root,
        }
    }

    /// Every reference must point inside the table.
    pub fn check_refs(&self) -> SaveResult<()> {
        let len = self.table.len();
        let mut bad: Option<ObjRef> = None;
        let mut check = |r: ObjRef| {
            if bad.is_none() && r.index() as usize >= len {
                bad = Some(r);
            }
        };
        for v in &self.table {
            v.for_each_ref(&mut check);
        }
        self.root.for_each_ref(&mut check);
        match bad {
            Some(r) => Err(SaveError::corrupt(format!(
                "dangling object reference #{} (table has {} objects)",
                r.index(),
                len
            ))),
            None => Ok(()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "type": self.type_name,
            "objects": self.table.iter().map(Value::to_json).collect::<Vec<_>>(),
            "root": self.root.to_json(),
        })
    }
}

// ---------------- Writer ----------------

#[inline]
fn put_u16(out: &mut Vec<u8>, v: u16) {
    let mut b = [0u8; 2];
    LittleEndian::write_u16(&mut b, v);
    out.extend_from_slice(&b);
}

#[inline]
fn put_u32(out: &mut Vec<u8>, v: u32) {
    let mut b = [0u8; 4];
    LittleEndian::write_u32(&mut b, v);
    out.extend_from_slice(&b);
}

#[inline]
fn put_u64(out: &mut Vec<u8>, v: u64) {
    let mut b = [0u8; 8];
    LittleEndian::write_u64(&mut b, v);
    out.extend_from_slice(&b);
}

fn put_len(out: &mut Vec<u8>, len: usize, what: &str) -> SaveResult<()> {
    let n = u32::try_from(len)
        .map_err(|_| SaveError::Unencodable(format!("{what} of {len} elements exceeds u32")))?;
    put_u32(out, n);
    Ok(())
}

fn put_str(out: &mut Vec<u8>, s: &str) -> SaveResult<()> {
    put_len(out, s.len(), "string")?;
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

pub fn write_value(out: &mut Vec<u8>, v: &Value) -> SaveResult<()> {
    write_nested(out, v, 0)
}

// List/Record/Some считаются так же, как в Reader::enter.
fn descend(depth: usize) -> SaveResult<usize> {
    let d = depth + 1;
    if d > MAX_NESTING_DEPTH {
        return Err(SaveError::Unencodable(format!(
            "value nests deeper than {MAX_NESTING_DEPTH} levels"
        )));
    }
    Ok(d)
}

fn write_nested(out: &mut Vec<u8>, v: &Value, depth: usize) -> SaveResult<()> {
    match v {
        Value::Unit => out.push(TAG_UNIT),
        Value::Bool(b) => {
            out.push(TAG_BOOL);
            out.push(*b as u8);
        }
        Value::U8(x) => {
            out.push(TAG_U8);
            out.push(*x);
        }
        Value::U16(x) => {
            out.push(TAG_U16);
            put_u16(out, *x);
        }
        Value::U32(x) => {
            out.push(TAG_U32);
            put_u32(out, *x);
        }
        Value::U64(x) => {
            out.push(TAG_U64);
            put_u64(out, *x);
        }
        Value::I8(x) => {
            out.push(TAG_I8);
            out.push(*x as u8);
        }
        Value::I16(x) => {
            out.push(TAG_I16);
            put_u16(out, *x as u16);
        }
        Value::I32(x) => {
            out.push(TAG_I32);
            put_u32(out, *x as u32);
        }
        Value::I64(x) => {
            out.push(TAG_I64);
            put_u64(out, *x as u64);
        }
        Value::F32(x) => {
            out.push(TAG_F32);
            put_u32(out, x.to_bits());
        }
        Value::F64(x) => {
            out.push(TAG_F64);
            put_u64(out, x.to_bits());
        }
        Value::Str(s) => {
            out.push(TAG_STR);
            put_str(out, s)?;
        }
        Value::Bytes(b) => {
            out.push(TAG_BYTES);
            put_len(out, b.len(), "bytes")?;
            out.extend_from_slice(b);
        }
        Value::List(items) => {
            let d = descend(depth)?;
            out.push(TAG_LIST);
            put_len(out, items.len(), "list")?;
            for it in items {
                write_nested(out, it, d)?;
            }
        }
        Value::Record(fields) => {
            let d = descend(depth)?;
            out.push(TAG_RECORD);
            put_len(out, fields.len(), "record")?;
            // BTreeMap: ключи уже отсортированы и уникальны
            for (k, fv) in fields {
                put_str(out, k)?;
                write_nested(out, fv, d)?;
            }
        }
        Value::Opt(None) => out.push(TAG_NONE),
        Value::Opt(Some(inner)) => {
            let d = descend(depth)?;
            out.push(TAG_SOME);
            write_nested(out, inner, d)?;
        }
        Value::Ref(r) => {
            out.push(TAG_REF);
            put_u32(out, r.index());
        }
    }
    Ok(())
}

pub fn encode_document(doc: &Document) -> SaveResult<Vec<u8>> {
    doc.check_refs()
        .map_err(|e| SaveError::Unencodable(e.to_string()))?;
    let mut out = Vec::with_capacity(64);
    put_str(&mut out, &doc.type_name)?;
    put_len(&mut out, doc.table.len(), "object table")?;
    for v in &doc.table {
        write_value(&mut out, v)?;
    }
    write_value(&mut out, &doc.root)?;
    Ok(out)
}

// ---------------- Reader ----------------

pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            depth: 0,
        }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> SaveResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(SaveError::corrupt(format!(
                "truncated at offset {}: need {} byte(s), have {}",
                self.pos,
                n,
                self.remaining()
            )));
        }
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    fn u8(&mut self) -> SaveResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> SaveResult<u16> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    fn u32(&mut self) -> SaveResult<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    fn u64(&mut self) -> SaveResult<u64> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    /// Length prefix; each element takes at least one byte, so a count larger
    /// than what is left is rejected before anything is allocated.
    fn len(&mut self) -> SaveResult<usize> {
        let at = self.pos;
        let n = self.u32()? as usize;
        if n > self.remaining() {
            return Err(SaveError::corrupt(format!(
                "length {} at offset {} exceeds remaining {} byte(s)",
                n,
                at,
                self.remaining()
            )));
        }
        Ok(n)
    }

    fn string(&mut self) -> SaveResult<String> {
        let n = self.len()?;
        let at = self.pos;
        let raw = self.take(n)?;
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|e| SaveError::corrupt(format!("invalid UTF-8 at offset {at}: {e}")))
    }

    pub fn read_value(&mut self) -> SaveResult<Value> {
        let at = self.pos;
        let tag = self.u8()?;
        let v = match tag {
            TAG_UNIT => Value::Unit,
            TAG_BOOL => match self.u8()? {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                b => {
                    return Err(SaveError::corrupt(format!(
                        "bad bool byte 0x{b:02x} at offset {}",
                        at + 1
                    )))
                }
            },
            TAG_U8 => Value::U8(self.u8()?),
            TAG_U16 => Value::U16(self.u16()?),
            TAG_U32 => Value::U32(self.u32()?),
            TAG_U64 => Value::U64(self.u64()?),
            TAG_I8 => Value::I8(self.u8()? as i8),
            TAG_I16 => Value::I16(self.u16()? as i16),
            TAG_I32 => Value::I32(self.u32()? as i32),
            TAG_I64 => Value::I64(self.u64()? as i64),
            TAG_F32 => Value::F32(f32::from_bits(self.u32()?)),
            TAG_F64 => Value::F64(f64::from_bits(self.u64()?)),
            TAG_STR => Value::Str(self.string()?),
            TAG_BYTES => {
                let n = self.len()?;
                Value::Bytes(self.take(n)?.to_vec())
            }
            TAG_LIST => {
                let n = self.len()?;
                self.enter(at)?;
                let mut items = Vec::with_capacity(n);
                for _ in 0..n {
                    items.push(self.read_value()?);
                }
                self.depth -= 1;
                Value::List(items)
            }
            TAG_RECORD => {
                let n = self.len()?;
                self.enter(at)?;
                let mut fields = BTreeMap::new();
                let mut prev: Option<String> = None;
                for _ in 0..n {
                    let key_at = self.pos;
                    let key = self.string()?;
                    if let Some(p) = &prev {
                        if key.as_str() <= p.as_str() {
                            return Err(SaveError::corrupt(format!(
                                "record keys not strictly ascending at offset {key_at} ('{p}' then '{key}')"
                            )));
                        }
                    }
                    let fv = self.read_value()?;
                    fields.insert(key.clone(), fv);
                    prev = Some(key);
                }
                self.depth -= 1;
                Value::Record(fields)
            }
            TAG_NONE => Value::Opt(None),
            TAG_SOME => {
                self.enter(at)?;
                let inner = self.read_value()?;
                self.depth -= 1;
                Value::Opt(Some(Box::new(inner)))
            }
            TAG_REF => Value::Ref(ObjRef::new(self.u32()?)),
            other => {
                return Err(SaveError::corrupt(format!(
                    "unknown tag 0x{other:02x} at offset {at}"
                )))
            }
        };
        Ok(v)
    }

    fn enter(&mut self, at: usize) -> SaveResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(SaveError::corrupt(format!(
                "nesting deeper than {MAX_NESTING_DEPTH} at offset {at}"
            )));
        }
        Ok(())
    }

    pub fn finish(&self) -> SaveResult<()> {
        if self.remaining() != 0 {
            return Err(SaveError::corrupt(format!(
                "{} trailing byte(s) after offset {}",
                self.remaining(),
                self.pos
            )));
        }
        Ok(())
    }
}

pub fn decode_document(bytes: &[u8]) -> SaveResult<Document> {
    let mut r = Reader::new(bytes);
    let type_name = r.string()?;
    let n = r.len()?;
    let mut table = Vec::with_capacity(n);
    for _ in 0..n {
        table.push(r.read_value()?);
    }
    let root = r.read_value()?;
    r.finish()?;
    let doc = Document {
        type_name,
        table,
        root,
    };
    doc.check_refs()?;
    Ok(doc)
}

/// Read only the type name at the start of a payload.
pub fn peek_type_name(bytes: &[u8]) -> SaveResult<String> {
    Reader::new(bytes).string()
}
