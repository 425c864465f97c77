//! Centralized configuration and builder for the save core.
//!
//! Goals:
//! - Single place to collect tunables instead of scattering env lookups.
//! - SaveConfig::from_env() reads SG_* variables on top of the defaults.
//! - SaveBuilder returns a SaveConfig which SlotManager / SaveOrchestrator consume.
//!
//! Defaults:
//! - workers = 4 (concurrent operations on distinct slots)
//! - keep_backup = true (previous valid slot file retained as <slot>.sav.bak)
//! - codec = zlib
//! - read_retries = 3, retry_backoff_ms = 10
//! - autosave_slots = 3
//! - data_fsync = true
//! - migration_cache_entries = 64 (0 disables memoisation)

use std::fmt;

use crate::slot::PayloadCodec;

#[derive(Clone, Debug)]
pub struct SaveConfig {
    /// Worker threads of the orchestrator.
    /// Env: SG_WORKERS (default 4, min 1)
    pub workers: usize,

    /// Retain the last known-good slot file for read fallback.
    /// Env: SG_KEEP_BACKUP = 0|1 (default 1)
    pub keep_backup: bool,

    /// Payload compression for new writes. Reads honour whatever the header says.
    /// Env: SG_CODEC = none|zlib|zstd (default zlib)
    pub codec: PayloadCodec,

    /// Bounded retries for transient read errors.
    /// Env: SG_READ_RETRIES (default 3)
    pub read_retries: u32,

    /// Base backoff between read retries, doubled per attempt.
    /// Env: SG_RETRY_BACKOFF_MS (default 10)
    pub retry_backoff_ms: u64,

    /// Size of the autosave ring.
    /// Env: SG_AUTOSAVE_SLOTS (default 3, min 1)
    pub autosave_slots: u32,

    /// fsync staged file and directory on every write.
    /// Env: SG_DATA_FSYNC (default true; "0|false|off|no" => false)
    pub data_fsync: bool,

    /// Memoised migration results.
    /// Env: SG_MIGRATION_CACHE (default 64)
    pub migration_cache_entries: usize,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            keep_backup: true,
            codec: PayloadCodec::Zlib,
            read_retries: 3,
            retry_backoff_ms: 10,
            autosave_slots: 3,
            data_fsync: true,
            migration_cache_entries: 64,
        }
    }
}

#[inline]
fn env_flag(v: &str) -> Option<bool> {
    let s = v.trim().to_ascii_lowercase();
    match s.as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

impl SaveConfig {
    /// Load configuration from environment variables on top of the defaults.
    /// Unparsable values are ignored (default kept).
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("SG_WORKERS") {
            if let Ok(n) = v.trim().parse::<usize>() {
                cfg.workers = n.max(1);
            }
        }

        if let Ok(v) = std::env::var("SG_KEEP_BACKUP") {
            if let Some(on) = env_flag(&v) {
                cfg.keep_backup = on;
            }
        }

        if let Ok(v) = std::env::var("SG_CODEC") {
            if let Ok(c) = v.trim().parse::<PayloadCodec>() {
                cfg.codec = c;
            }
        }

        if let Ok(v) = std::env::var("SG_READ_RETRIES") {
            if let Ok(n) = v.trim().parse::<u32>() {
                cfg.read_retries = n;
            }
        }

        if let Ok(v) = std::env::var("SG_RETRY_BACKOFF_MS") {
            if let Ok(n) = v.trim().parse::<u64>() {
                cfg.retry_backoff_ms = n;
            }
        }

        if let Ok(v) = std::env::var("SG_AUTOSAVE_SLOTS") {
            if let Ok(n) = v.trim().parse::<u32>() {
                cfg.autosave_slots = n.max(1);
            }
        }

        if let Ok(v) = std::env::var("SG_DATA_FSYNC") {
            if let Some(on) = env_flag(&v) {
                cfg.data_fsync = on;
            }
        }

        if let Ok(v) = std::env::var("SG_MIGRATION_CACHE") {
            if let Ok(n) = v.trim().parse::<usize>() {
                cfg.migration_cache_entries = n;
            }
        }

        cfg
    }

    // Fluent setters

    pub fn with_workers(mut self, n: usize) -> Self {
        self.workers = n.max(1);
        self
    }

    pub fn with_keep_backup(mut self, on: bool) -> Self {
        self.keep_backup = on;
        self
    }

    pub fn with_codec(mut self, codec: PayloadCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_read_retries(mut self, n: u32) -> Self {
        self.read_retries = n;
        self
    }

    pub fn with_retry_backoff_ms(mut self, ms: u64) -> Self {
        self.retry_backoff_ms = ms;
        self
    }

    pub fn with_autosave_slots(mut self, n: u32) -> Self {
        self.autosave_slots = n.max(1);
        self
    }

    pub fn with_data_fsync(mut self, on: bool) -> Self {
        self.data_fsync = on;
        self
    }

    pub fn with_migration_cache_entries(mut self, n: usize) -> Self {
        self.migration_cache_entries = n;
        self
    }

    /// Finish the builder and obtain the configuration.
    pub fn build(self) -> Self {
        self
    }
}

impl fmt::Display for SaveConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SaveConfig {{ \
             workers: {}, \
             keep_backup: {}, \
             codec: {}, \
             read_retries: {}, \
             retry_backoff_ms: {}, \
             autosave_slots: {}, \
             data_fsync: {}, \
             migration_cache_entries: {} \
             }}",
            self.workers,
            self.keep_backup,
            self.codec,
            self.read_retries,
            self.retry_backoff_ms,
            self.autosave_slots,
            self.data_fsync,
            self.migration_cache_entries,
        )
    }
}

/// Lightweight builder that produces a SaveConfig.
#[derive(Clone, Debug)]
pub struct SaveBuilder {
    cfg: SaveConfig,
}

impl Default for SaveBuilder {
    fn default() -> Self {
        // Start from env, then allow overrides.
        Self {
            cfg: SaveConfig::from_env(),
        }
    }
}

impl SaveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a clean default (without reading env).
    pub fn from_default() -> Self {
        Self {
            cfg: SaveConfig::default(),
        }
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.cfg.workers = n.max(1);
        self
    }

    pub fn keep_backup(mut self, on: bool) -> Self {
        self.cfg.keep_backup = on;
        self
    }

    pub fn codec(mut self, codec: PayloadCodec) -> Self {
        self.cfg.codec = codec;
        self
    }

    pub fn read_retries(mut self, n: u32) -> Self {
        self.cfg.read_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.cfg.retry_backoff_ms = ms;
        self
    }

    pub fn autosave_slots(mut self, n: u32) -> Self {
        self.cfg.autosave_slots = n.max(1);
        self
    }

    pub fn data_fsync(mut self, on: bool) -> Self {
        self.cfg.data_fsync = on;
        self
    }

    pub fn migration_cache_entries(mut self, n: usize) -> Self {
        self.cfg.migration_cache_entries = n;
        self
    }

    /// Finish the builder and obtain the configuration.
    pub fn build(self) -> SaveConfig {
        self.cfg
    }
}
