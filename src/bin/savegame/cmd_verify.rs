use anyhow::{anyhow, Result};
use std::path::PathBuf;

use SaveGame::slot::CheckStatus;

use crate::util::{open_ro, opt};

pub fn exec(path: PathBuf, json: bool) -> Result<()> {
    let m = open_ro(&path)?;
    let rep = m.verify_all()?;

    if json {
        println!("{}", serde_json::to_string(&rep)?);
    } else {
        println!("Verify report ({}):", path.display());
        println!("  slots_total       = {}", rep.slots_total);
        println!("  ok                = {}", rep.ok);
        println!("  backup_only       = {}", rep.backup_only);
        println!("  corrupt           = {}", rep.corrupt);
        println!("  io_fail           = {}", rep.io_fail);
        println!("  staging_leftovers = {}", rep.staging_leftovers);
        for c in rep.slots.iter().filter(|c| c.status != CheckStatus::Ok) {
            println!(
                "  - {} [{:?}] type={} detail={}",
                c.slot,
                c.status,
                opt(c.type_name.as_deref()),
                opt(c.detail.as_deref())
            );
        }
    }

    if !rep.is_clean() {
        return Err(anyhow!(
            "{} corrupt and {} unreadable slot(s)",
            rep.corrupt,
            rep.io_fail
        ));
    }
    Ok(())
}
