use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::util::{open_rw, parse_slot};

pub fn exec(path: PathBuf, slot: String) -> Result<()> {
    let m = open_rw(&path)?;
    let id = parse_slot(&slot)?;
    m.delete(&id).with_context(|| format!("delete slot {}", id))?;
    println!("deleted slot {}", id);
    Ok(())
}
