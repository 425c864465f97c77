use anyhow::Result;
use std::path::PathBuf;

use crate::util::{fmt_ms, open_ro, opt};

pub fn exec(path: PathBuf, json: bool) -> Result<()> {
    let m = open_ro(&path)?;
    let slots = m.enumerate()?;

    if json {
        println!("{}", serde_json::to_string(&slots)?);
        return Ok(());
    }

    if slots.is_empty() {
        println!("(no slots in {})", path.display());
        return Ok(());
    }
    println!(
        "{:<12} {:>7} {:>10} {:<28} {}",
        "slot", "schema", "bytes", "created", "backup"
    );
    for d in &slots {
        println!(
            "{:<12} {:>7} {:>10} {:<28} {}",
            d.slot.to_string(),
            opt(d.schema_version.map(|v| format!("v{}", v))),
            opt(d.payload_len),
            d.created_ms.map(fmt_ms).unwrap_or_else(|| "(unreadable header)".into()),
            if d.has_backup { "yes" } else { "no" }
        );
    }
    Ok(())
}
