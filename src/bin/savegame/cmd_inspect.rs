use anyhow::{Context, Result};
use std::path::PathBuf;

use SaveGame::codec::decode_document;

use crate::util::{fmt_ms, open_ro, parse_slot};

pub fn exec(path: PathBuf, slot: String) -> Result<()> {
    let m = open_ro(&path)?;
    let id = parse_slot(&slot)?;

    let file = m.resolve(&id);
    println!("slot:      {}", id);
    println!("file:      {}", file.display());

    match m.read_header(&id) {
        Ok(h) => {
            println!("schema:    v{}", h.schema_version);
            println!("created:   {}", fmt_ms(h.created_ms));
            println!("codec:     {}", h.codec);
            println!("stored:    {} B", h.payload_len);
            println!("crc32c:    {:#010x}", h.payload_crc);
        }
        Err(e) => println!("header:    {}", e),
    }
    println!("backup:    {}", if m.backup_path(&id).is_file() { "present" } else { "none" });

    let rec = m.read(&id).with_context(|| format!("read slot {}", id))?;
    let doc = decode_document(&rec.payload).with_context(|| format!("decode slot {}", id))?;
    println!("type:      {}", doc.type_name);
    println!("objects:   {}", doc.table.len());
    println!("payload:   {} B", rec.payload.len());
    println!("{}", serde_json::to_string_pretty(&doc.root.to_json())?);
    Ok(())
}
