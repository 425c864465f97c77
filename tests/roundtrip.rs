// tests/roundtrip.rs
//
// Свойство: decode(encode(x)) == x и encode детерминирован.
// 1) Случайные "миры" с графом объектов (общие ссылки и циклы через ObjRef).
// 2) Цикл, построенный через reserve/fill, проходит весь путь save → load.
// 3) Случайные Value-документы на уровне wire-формата.
// 4) Слишком глубокая вложенность отвергается ещё при сохранении.

use anyhow::Result;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;

use oorandom::Rand64;

use SaveGame::codec::{decode_document, encode_document, Document};
use SaveGame::consts::MAX_NESTING_DEPTH;
use SaveGame::{
    decode, encode, DecodeCx, EncodeCx, Migrator, ObjRef, ObjectGraph, RecordBuilder,
    OpState, RecordReader, SaveConfig, SaveError, SaveOrchestrator, SaveResult, SaveType, Saveable, SlotId, Value,
};

#[derive(Debug, Clone, PartialEq)]
struct Npc {
    name: String,
    hp: i32,
    speed: f32,
    friend: Option<ObjRef>,
    tags: Vec<String>,
    inventory: BTreeMap<String, u16>,
}

impl Saveable for Npc {
    fn to_value(&self, cx: &mut EncodeCx) -> SaveResult<Value> {
        Ok(RecordBuilder::new(cx)
            .field("name", &self.name)?
            .field("hp", &self.hp)?
            .field("speed", &self.speed)?
            .field("friend", &self.friend)?
            .field("tags", &self.tags)?
            .field("inventory", &self.inventory)?
            .build())
    }
    fn from_value(v: &Value, cx: &mut DecodeCx<'_>) -> SaveResult<Self> {
        let r = RecordReader::new("Npc", v)?;
        Ok(Npc {
            name: r.req("name", cx)?,
            hp: r.req("hp", cx)?,
            speed: r.req("speed", cx)?,
            friend: r.req("friend", cx)?,
            tags: r.or_default("tags", cx)?,
            inventory: r.or_default("inventory", cx)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct World {
    seed: u64,
    npcs: ObjectGraph<Npc>,
    player: ObjRef,
    flags: HashMap<String, bool>,
    blob: Vec<u8>,
    pos: (f64, f64),
}

impl Saveable for World {
    fn to_value(&self, cx: &mut EncodeCx) -> SaveResult<Value> {
        Ok(RecordBuilder::new(cx)
            .field("seed", &self.seed)?
            .field("npcs", &self.npcs)?
            .field("player", &self.player)?
            .field("flags", &self.flags)?
            .field("blob", &self.blob)?
            .field("pos", &self.pos)?
            .build())
    }
    fn from_value(v: &Value, cx: &mut DecodeCx<'_>) -> SaveResult<Self> {
        let r = RecordReader::new("World", v)?;
        Ok(World {
            seed: r.req("seed", cx)?,
            npcs: r.req("npcs", cx)?,
            player: r.req("player", cx)?,
            flags: r.req("flags", cx)?,
            blob: r.req("blob", cx)?,
            pos: r.req("pos", cx)?,
        })
    }
}

impl SaveType for World {
    const TYPE_NAME: &'static str = "World";
    const SCHEMA_VERSION: u32 = 1;
}

fn rand_string(rng: &mut Rand64, max: u64) -> String {
    const ALPHABET: &[char] = &['a', 'b', 'z', 'Ж', 'ё', '-', '_', ' ', '7', '€'];
    let n = rng.rand_range(0..max + 1);
    (0..n)
        .map(|_| ALPHABET[rng.rand_range(0..ALPHABET.len() as u64) as usize])
        .collect()
}

fn random_world(seed: u64) -> World {
    let mut rng = Rand64::new(seed as u128);
    let count = rng.rand_range(1..24);
    let mut npcs = ObjectGraph::with_capacity(count as usize);
    let refs: Vec<ObjRef> = (0..count).map(|_| npcs.reserve()).collect();
    for r in &refs {
        let friend = if rng.rand_range(0..3) == 0 {
            None
        } else {
            // Может указывать на себя, вперёд или назад.
            Some(refs[rng.rand_range(0..count) as usize])
        };
        let mut inventory = BTreeMap::new();
        for _ in 0..rng.rand_range(0..5) {
            inventory.insert(rand_string(&mut rng, 6), rng.rand_range(0..u16::MAX as u64) as u16);
        }
        let npc = Npc {
            name: rand_string(&mut rng, 12),
            hp: rng.rand_i64() as i32,
            speed: rng.rand_float() as f32,
            friend,
            tags: (0..rng.rand_range(0..4)).map(|_| rand_string(&mut rng, 5)).collect(),
            inventory,
        };
        assert!(npcs.fill(*r, npc).is_ok());
    }
    let mut flags = HashMap::new();
    for _ in 0..rng.rand_range(0..8) {
        flags.insert(rand_string(&mut rng, 8), rng.rand_range(0..2) == 1);
    }
    World {
        seed,
        player: refs[rng.rand_range(0..count) as usize],
        npcs,
        flags,
        blob: (0..rng.rand_range(0..64)).map(|_| rng.rand_u64() as u8).collect(),
        pos: (rng.rand_float() * 1000.0 - 500.0, -rng.rand_float()),
    }
}

#[test]
fn random_worlds_roundtrip_deterministically() -> Result<()> {
    for seed in 0..64u64 {
        let w = random_world(0xC0FFEE ^ seed);
        let bytes = encode(&w)?;
        let back: World = decode(&bytes)?;
        assert_eq!(back, w, "seed {seed}");
        assert_eq!(encode(&back)?, bytes, "re-encoding must be byte-identical (seed {seed})");
    }
    Ok(())
}

#[test]
fn cyclic_graph_survives_save_and_load() -> Result<()> {
    let root = unique_root("cycle");
    let orch = SaveOrchestrator::open_with_config(
        &root,
        SaveConfig::default().with_data_fsync(false),
        Migrator::empty(),
    )?;

    let mut npcs = ObjectGraph::new();
    let b = npcs.reserve();
    let a = npcs.add(Npc {
        name: "a".into(),
        hp: 10,
        speed: 1.5,
        friend: Some(b),
        tags: vec![],
        inventory: BTreeMap::new(),
    });
    let filled = npcs.fill(
        b,
        Npc {
            name: "b".into(),
            hp: -3,
            speed: 0.25,
            friend: Some(a),
            tags: vec!["loop".into()],
            inventory: BTreeMap::new(),
        },
    );
    assert!(filled.is_ok());
    let w = World {
        seed: 1,
        npcs,
        player: a,
        flags: HashMap::new(),
        blob: vec![],
        pos: (0.0, 0.0),
    };

    orch.save(SlotId::Index(9), w.clone()).wait()?;
    let back: World = orch.load(SlotId::Index(9)).wait()?;
    assert_eq!(back, w);
    let pa = back.npcs.get(back.player).map(|n| n.friend);
    let pb = pa.flatten().and_then(|r| back.npcs.get(r)).and_then(|n| n.friend);
    assert_eq!(pb, Some(a), "a -> b -> a");

    drop(orch);
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

fn random_value(rng: &mut Rand64, depth: u32, table_len: u32) -> Value {
    let pick = if depth == 0 { rng.rand_range(0..14) } else { rng.rand_range(0..18) };
    match pick {
        0 => Value::Unit,
        1 => Value::Bool(rng.rand_range(0..2) == 1),
        2 => Value::U8(rng.rand_u64() as u8),
        3 => Value::U16(rng.rand_u64() as u16),
        4 => Value::U32(rng.rand_u64() as u32),
        5 => Value::U64(rng.rand_u64()),
        6 => Value::I8(rng.rand_i64() as i8),
        7 => Value::I16(rng.rand_i64() as i16),
        8 => Value::I32(rng.rand_i64() as i32),
        9 => Value::I64(rng.rand_i64()),
        10 => Value::F64(rng.rand_float()),
        11 => Value::Str(rand_string(rng, 10)),
        12 => Value::Bytes((0..rng.rand_range(0..16)).map(|_| rng.rand_u64() as u8).collect()),
        13 if table_len > 0 => Value::Ref(ObjRef::new(rng.rand_range(0..table_len as u64) as u32)),
        13 => Value::Opt(None),
        14 | 15 => Value::List(
            (0..rng.rand_range(0..5))
                .map(|_| random_value(rng, depth - 1, table_len))
                .collect(),
        ),
        16 => {
            let mut m = BTreeMap::new();
            for _ in 0..rng.rand_range(0..5) {
                m.insert(rand_string(rng, 6), random_value(rng, depth - 1, table_len));
            }
            Value::Record(m)
        }
        _ => Value::Opt(Some(Box::new(random_value(rng, depth - 1, table_len)))),
    }
}

#[test]
fn random_documents_roundtrip() -> Result<()> {
    let mut rng = Rand64::new(0xDEADBEEF);
    for i in 0..200 {
        let n = rng.rand_range(0..6) as u32;
        let table = (0..n).map(|_| random_value(&mut rng, 3, n)).collect();
        let doc = Document {
            type_name: format!("Doc{i}"),
            table,
            root: random_value(&mut rng, 4, n),
        };
        let bytes = encode_document(&doc)?;
        assert_eq!(decode_document(&bytes)?, doc, "iteration {i}");
    }
    Ok(())
}

/// Значение, вложенное в `levels` списков.
#[derive(Debug, Clone, PartialEq)]
struct Deep {
    levels: usize,
}

impl Saveable for Deep {
    fn to_value(&self, _cx: &mut EncodeCx) -> SaveResult<Value> {
        let mut v = Value::U32(7);
        for _ in 0..self.levels {
            v = Value::List(vec![v]);
        }
        Ok(v)
    }
    fn from_value(v: &Value, _cx: &mut DecodeCx<'_>) -> SaveResult<Self> {
        let mut levels = 0;
        let mut cur = v;
        while let Value::List(items) = cur {
            levels += 1;
            cur = items.first().ok_or_else(|| SaveError::corrupt("empty level"))?;
        }
        Ok(Deep { levels })
    }
}

impl SaveType for Deep {
    const TYPE_NAME: &'static str = "Deep";
    const SCHEMA_VERSION: u32 = 1;
}

#[test]
fn too_deep_value_fails_at_serializing_and_keeps_slot() -> Result<()> {
    let root = unique_root("deep");
    let cfg = SaveConfig::default().with_data_fsync(false);
    let orch = SaveOrchestrator::open_with_config(&root, cfg, Migrator::empty())?;
    let slot = SlotId::Index(1);

    let limit = Deep { levels: MAX_NESTING_DEPTH };
    orch.save(slot.clone(), limit.clone()).wait()?;
    let back: Deep = orch.load(slot.clone()).wait()?;
    assert_eq!(back, limit);

    let err = orch
        .save(slot.clone(), Deep { levels: 200 })
        .wait()
        .expect_err("unloadable payload must not be written");
    assert_eq!(err.stage, OpState::Serializing);
    assert!(matches!(err.kind, SaveError::Unencodable(_)), "{err}");

    let still: Deep = orch.load(slot).wait()?;
    assert_eq!(still, limit);

    drop(orch);
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    std::env::temp_dir().join(format!("sgtest-rt-{prefix}-{pid}-{t}"))
}
