// tests/autosave.rs
//
// Кольцо автосейвов: очередь из N+1 автосейвов при autosave_slots = N
// обходит кольцо по кругу, в каждом слоте остаётся последняя запись,
// а после переоткрытия первым перезаписывается самый старый слот.

use anyhow::Result;
use std::fs;
use std::path::PathBuf;

use SaveGame::{
    DecodeCx, EncodeCx, Migrator, RecordBuilder, RecordReader, SaveConfig, SaveOrchestrator,
    SaveResult, SaveType, Saveable, SlotId, Value,
};

#[derive(Debug, Clone, PartialEq)]
struct Tick {
    n: u32,
}

impl Saveable for Tick {
    fn to_value(&self, cx: &mut EncodeCx) -> SaveResult<Value> {
        Ok(RecordBuilder::new(cx).field("n", &self.n)?.build())
    }
    fn from_value(v: &Value, cx: &mut DecodeCx<'_>) -> SaveResult<Self> {
        let r = RecordReader::new("Tick", v)?;
        Ok(Tick { n: r.req("n", cx)? })
    }
}

impl SaveType for Tick {
    const TYPE_NAME: &'static str = "Tick";
    const SCHEMA_VERSION: u32 = 1;
}

fn cfg() -> SaveConfig {
    SaveConfig::default()
        .with_data_fsync(false)
        .with_workers(3)
        .with_autosave_slots(3)
}

#[test]
fn queued_autosaves_rotate_through_ring() -> Result<()> {
    let root = unique_root("ring");
    let orch = SaveOrchestrator::open_with_config(&root, cfg(), Migrator::empty())?;

    let handles: Vec<_> = (0..4).map(|n| orch.autosave(Tick { n })).collect();
    let targets: Vec<SlotId> = handles.iter().map(|h| h.slot().clone()).collect();
    assert_eq!(
        targets,
        vec![
            SlotId::Autosave(0),
            SlotId::Autosave(1),
            SlotId::Autosave(2),
            SlotId::Autosave(0),
        ]
    );
    for h in handles {
        h.wait()?;
    }

    // Последняя запись в каждый слот побеждает.
    let got: Vec<u32> = (0..3)
        .map(|i| orch.load::<Tick>(SlotId::Autosave(i)).wait().map(|t| t.n))
        .collect::<Result<_, _>>()?;
    assert_eq!(got, vec![3, 1, 2]);
    assert_eq!(orch.list()?.len(), 3);

    drop(orch);
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn reopened_ring_overwrites_oldest_entry() -> Result<()> {
    let root = unique_root("reopen");
    {
        let orch = SaveOrchestrator::open_with_config(&root, cfg(), Migrator::empty())?;
        for n in 0..4 {
            orch.autosave(Tick { n }).wait()?;
        }
    }

    let orch = SaveOrchestrator::open_with_config(&root, cfg(), Migrator::empty())?;
    let oldest = orch
        .list()?
        .into_iter()
        .filter_map(|d| match d.slot {
            SlotId::Autosave(i) => d.created_ms.map(|ms| (ms, i)),
            _ => None,
        })
        .min()
        .map(|(_, i)| SlotId::Autosave(i))
        .expect("ring is populated");

    let h = orch.autosave(Tick { n: 99 });
    assert_eq!(h.slot(), &oldest);
    h.wait()?;
    let t: Tick = orch.load(oldest).wait()?;
    assert_eq!(t.n, 99);

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
    std::env::temp_dir().join(format!("sgtest-auto-{prefix}-{pid}-{t}"))
}
