use anyhow::Result;
use std::path::PathBuf;

use crate::util::open_rw;

pub fn exec(path: PathBuf) -> Result<()> {
    let m = open_rw(&path)?;
    let n = m.sweep_staging()?;
    println!("swept {} staging file(s)", n);
    Ok(())
}
