use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::Path;

use SaveGame::slot::SlotId;
use SaveGame::SlotManager;

pub fn parse_slot(s: &str) -> Result<SlotId> {
    s.parse::<SlotId>()
        .with_context(|| format!("bad slot '{}'", s))
}

pub fn open_ro(path: &Path) -> Result<SlotManager> {
    SlotManager::open_ro(path).with_context(|| format!("open {} (read-only)", path.display()))
}

pub fn open_rw(path: &Path) -> Result<SlotManager> {
    SlotManager::open(path).with_context(|| format!("open {}", path.display()))
}

/// Unix ms → "YYYY-MM-DD hh:mm:ss.mmm UTC".
pub fn fmt_ms(ms: u64) -> String {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string())
        .unwrap_or_else(|| format!("{} ms", ms))
}

pub fn opt<T: std::fmt::Display>(v: Option<T>) -> String {
    v.map(|x| x.to_string()).unwrap_or_else(|| "-".to_string())
}
