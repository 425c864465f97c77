//! Lightweight global metrics for the save core.
//!
//! Потокобезопасные атомарные счётчики для подсистем:
//! - Orchestrator (save/load/delete, отмены, ошибки)
//! - Slot manager (байты, повторы чтения, fallback на .bak, sweep)
//! - Migrator (шаги, попадания в кэш)

use std::sync::atomic::{AtomicU64, Ordering};

// ----- Orchestrator -----
static SAVES_TOTAL: AtomicU64 = AtomicU64::new(0);
static LOADS_TOTAL: AtomicU64 = AtomicU64::new(0);
static DELETES_TOTAL: AtomicU64 = AtomicU64::new(0);
static OPS_CANCELLED: AtomicU64 = AtomicU64::new(0);
static OPS_FAILED: AtomicU64 = AtomicU64::new(0);

// ----- Slot manager -----
static BYTES_WRITTEN: AtomicU64 = AtomicU64::new(0);
static BYTES_READ: AtomicU64 = AtomicU64::new(0);
static READ_RETRIES: AtomicU64 = AtomicU64::new(0);
static BACKUP_FALLBACKS: AtomicU64 = AtomicU64::new(0);
static STAGING_SWEPT: AtomicU64 = AtomicU64::new(0);

// ----- Migrator -----
static MIGRATION_STEPS: AtomicU64 = AtomicU64::new(0);
static MIGRATION_CACHE_HITS: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    // Orchestrator
    pub saves_total: u64,
    pub loads_total: u64,
    pub deletes_total: u64,
    pub ops_cancelled: u64,
    pub ops_failed: u64,

    // Slot manager
    pub bytes_written: u64,
    pub bytes_read: u64,
    pub read_retries: u64,
    pub backup_fallbacks: u64,
    pub staging_swept: u64,

    // Migrator
    pub migration_steps: u64,
    pub migration_cache_hits: u64,
}

// ----- Recorders (Orchestrator) -----
pub fn record_save() {
    SAVES_TOTAL.fetch_add(1, Ordering::Relaxed);
}
pub fn record_load() {
    LOADS_TOTAL.fetch_add(1, Ordering::Relaxed);
}
pub fn record_delete() {
    DELETES_TOTAL.fetch_add(1, Ordering::Relaxed);
}
pub fn record_cancelled() {
    OPS_CANCELLED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_failed() {
    OPS_FAILED.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Slot manager) -----
pub fn record_bytes_written(n: usize) {
    BYTES_WRITTEN.fetch_add(n as u64, Ordering::Relaxed);
}
pub fn record_bytes_read(n: usize) {
    BYTES_READ.fetch_add(n as u64, Ordering::Relaxed);
}
pub fn record_read_retry() {
    READ_RETRIES.fetch_add(1, Ordering::Relaxed);
}
pub fn record_backup_fallback() {
    BACKUP_FALLBACKS.fetch_add(1, Ordering::Relaxed);
}
pub fn record_staging_swept(n: usize) {
    STAGING_SWEPT.fetch_add(n as u64, Ordering::Relaxed);
}

// ----- Recorders (Migrator) -----
pub fn record_migration_steps(n: usize) {
    MIGRATION_STEPS.fetch_add(n as u64, Ordering::Relaxed);
}
pub fn record_migration_cache_hit() {
    MIGRATION_CACHE_HITS.fetch_add(1, Ordering::Relaxed);
}

// ----- Snapshot / Reset -----
pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        saves_total: SAVES_TOTAL.load(Ordering::Relaxed),
        loads_total: LOADS_TOTAL.load(Ordering::Relaxed),
        deletes_total: DELETES_TOTAL.load(Ordering::Relaxed),
        ops_cancelled: OPS_CANCELLED.load(Ordering::Relaxed),
        ops_failed: OPS_FAILED.load(Ordering::Relaxed),

        bytes_written: BYTES_WRITTEN.load(Ordering::Relaxed),
        bytes_read: BYTES_READ.load(Ordering::Relaxed),
        read_retries: READ_RETRIES.load(Ordering::Relaxed),
        backup_fallbacks: BACKUP_FALLBACKS.load(Ordering::Relaxed),
        staging_swept: STAGING_SWEPT.load(Ordering::Relaxed),

        migration_steps: MIGRATION_STEPS.load(Ordering::Relaxed),
        migration_cache_hits: MIGRATION_CACHE_HITS.load(Ordering::Relaxed),
    }
}

pub fn reset() {
    SAVES_TOTAL.store(0, Ordering::Relaxed);
    LOADS_TOTAL.store(0, Ordering::Relaxed);
    DELETES_TOTAL.store(0, Ordering::Relaxed);
    OPS_CANCELLED.store(0, Ordering::Relaxed);
    OPS_FAILED.store(0, Ordering::Relaxed);

    BYTES_WRITTEN.store(0, Ordering::Relaxed);
    BYTES_READ.store(0, Ordering::Relaxed);
    READ_RETRIES.store(0, Ordering::Relaxed);
    BACKUP_FALLBACKS.store(0, Ordering::Relaxed);
    STAGING_SWEPT.store(0, Ordering::Relaxed);

    MIGRATION_STEPS.store(0, Ordering::Relaxed);
    MIGRATION_CACHE_HITS.store(0, Ordering::Relaxed);
}
