use anyhow::{Context, Result};
use std::path::PathBuf;

use SaveGame::codec::decode_document;

use crate::util::{open_ro, parse_slot};

pub fn exec(path: PathBuf, slot: String, out: Option<PathBuf>) -> Result<()> {
    let m = open_ro(&path)?;
    let id = parse_slot(&slot)?;
    let rec = m.read(&id).with_context(|| format!("read slot {}", id))?;
    let doc = decode_document(&rec.payload)?;

    let mut j = doc.to_json();
    j["slot"] = serde_json::Value::String(id.to_string());
    j["schema_version"] = serde_json::Value::from(rec.schema_version);
    j["created_ms"] = serde_json::Value::from(rec.created_ms);
    let text = serde_json::to_string_pretty(&j)?;

    match out {
        Some(p) => {
            std::fs::write(&p, text.as_bytes())
                .with_context(|| format!("write {}", p.display()))?;
            println!("exported slot {} -> {}", id, p.display());
        }
        None => println!("{}", text),
    }
    Ok(())
}
