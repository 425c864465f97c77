//! codec — serialization of typed state into self-describing payload bytes.
//!
//! Layers:
//! - value.rs  — dynamic `Value` tree (what migration edits)
//! - wire.rs   — tagged binary format of a `Document`
//! - graph.rs  — `ObjRef` / `ObjectGraph` for shared and cyclic structure
//! - traits.rs — `Saveable` and record helpers
//!
//! Payload = encoded `Document { type_name, table, root }`. The encoding of a
//! given value is deterministic (records are sorted by field name).

pub mod graph;
pub mod traits;
pub mod value;
pub mod wire;

pub use graph::{ObjRef, ObjectGraph};
pub use traits::{DecodeCx, EncodeCx, RecordBuilder, RecordReader, Saveable};
pub use value::Value;
pub use wire::{decode_document, encode_document, peek_type_name, Document};

use crate::error::{SaveError, SaveResult};

/// A top-level saveable type: a stable name and the schema version this
/// build writes.
pub trait SaveType: Saveable {
    const TYPE_NAME: &'static str;
    const SCHEMA_VERSION: u32;
}

pub fn to_document<T: SaveType>(value: &T) -> SaveResult<Document> {
    let mut cx = EncodeCx::new();
    let root = value.to_value(&mut cx)?;
    Ok(Document {
        type_name: T::TYPE_NAME.to_string(),
        table: cx.into_table(),
        root,
    })
}

pub fn from_document<T: SaveType>(doc: &Document) -> SaveResult<T> {
    if doc.type_name != T::TYPE_NAME {
        return Err(SaveError::TypeMismatch {
            expected: T::TYPE_NAME.to_string(),
            found: doc.type_name.clone(),
        });
    }
    let mut cx = DecodeCx::new(&doc.table);
    T::from_value(&doc.root, &mut cx)
}

/// Serialize a value into payload bytes.
pub fn encode<T: SaveType>(value: &T) -> SaveResult<Vec<u8>> {
    encode_document(&to_document(value)?)
}

/// Deserialize payload bytes. Malformed input yields `CorruptPayload`; a
/// payload of another type yields `TypeMismatch`.
pub fn decode<T: SaveType>(bytes: &[u8]) -> SaveResult<T> {
    let doc = decode_document(bytes)?;
    from_document(&doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Player {
        level: u32,
        gold: u32,
    }

    impl Saveable for Player {
        fn to_value(&self, cx: &mut EncodeCx) -> SaveResult<Value> {
            Ok(RecordBuilder::new(cx)
                .field("level", &self.level)?
                .field("gold", &self.gold)?
                .build())
        }
        fn from_value(v: &Value, cx: &mut DecodeCx<'_>) -> SaveResult<Self> {
            let r = RecordReader::new("Player", v)?;
            Ok(Player {
                level: r.req("level", cx)?,
                gold: r.req("gold", cx)?,
            })
        }
    }

    impl SaveType for Player {
        const TYPE_NAME: &'static str = "Player";
        const SCHEMA_VERSION: u32 = 1;
    }

    struct Other;

    impl Saveable for Other {
        fn to_value(&self, _cx: &mut EncodeCx) -> SaveResult<Value> {
            Ok(Value::Unit)
        }
        fn from_value(_v: &Value, _cx: &mut DecodeCx<'_>) -> SaveResult<Self> {
            Ok(Other)
        }
    }

    impl SaveType for Other {
        const TYPE_NAME: &'static str = "Other";
        const SCHEMA_VERSION: u32 = 1;
    }

    #[test]
    fn typed_roundtrip() {
        let p = Player { level: 5, gold: 100 };
        let bytes = encode(&p).unwrap();
        assert_eq!(peek_type_name(&bytes).unwrap(), "Player");
        assert_eq!(decode::<Player>(&bytes).unwrap(), p);
        assert_eq!(encode(&p).unwrap(), bytes);
    }

    #[test]
    fn wrong_type_is_reported() {
        let bytes = encode(&Player { level: 1, gold: 2 }).unwrap();
        match decode::<Other>(&bytes) {
            Err(SaveError::TypeMismatch { expected, found }) => {
                assert_eq!(expected, "Other");
                assert_eq!(found, "Player");
            }
            Err(e) => panic!("unexpected error {e}"),
            Ok(_) => panic!("decode must fail"),
        }
    }

    #[test]
    fn flipped_byte_never_panics() {
        let bytes = encode(&Player { level: 5, gold: 100 }).unwrap();
        for i in 0..bytes.len() {
            let mut b = bytes.clone();
            b[i] ^= 0xFF;
            // Either a clean error or (for value bytes) a different player.
            let _ = decode::<Player>(&b);
        }
    }
}
