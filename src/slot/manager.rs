//! slot/manager — SlotManager: атомарная запись, чтение с откатом на .bak,
//! перечисление, удаление, ротация автосейвов, уборка staging-файлов.
//!
//! Запись (write_atomic):
//! 1) stage: <final>.tmp = header + payload (сжатый), sync_all (data_fsync);
//! 2) keep_backup: текущий <final>, если он валиден, → hard link <final>.bak (fallback: copy);
//! 3) promote: rename(tmp, final) + fsync каталога.
//! Между 1 и 3 можно вставить проверку отмены (write_atomic_with). Сбой до rename
//! оставляет прежнее содержимое слота нетронутым.
//!
//! Чтение (read):
//! - NotFound → SlotNotFound;
//! - Interrupted/WouldBlock/TimedOut → до read_retries повторов с экспоненциальной задержкой;
//! - битый header/длина → SlotCorrupted, битый payload → CorruptPayload;
//!   в обоих случаях пробуем .bak (warn + метрика).

use log::{debug, info, warn};
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use super::header::SaveHeader;
use super::id::SlotId;
use super::{SaveRecord, SlotDescriptor};
use crate::checksum::{payload_crc32c, verify_payload};
use crate::config::SaveConfig;
use crate::consts::{BACKUP_SUFFIX, SAVE_HDR_SIZE, STAGING_SUFFIX};
use crate::error::{is_transient_io, SaveError, SaveResult};
use crate::lock::{try_acquire_lock, LockGuard, LockMode};
use crate::metrics;
use crate::util::{backoff_delay, fsync_dir, system_time_millis};

pub struct SlotManager {
    root: PathBuf,
    cfg: SaveConfig,
    readonly: bool,
    _lock: LockGuard,
}

/// A payload written to the staging file but not yet promoted.
///
/// Dropping it leaves the staging file behind, exactly like a crash would;
/// `discard` removes it.
#[derive(Debug)]
#[must_use = "a staged write does nothing until promoted"]
pub struct StagedWrite {
    slot: SlotId,
    tmp: PathBuf,
    final_path: PathBuf,
    bytes: usize,
}

impl StagedWrite {
    pub fn slot(&self) -> &SlotId {
        &self.slot
    }

    pub fn tmp_path(&self) -> &Path {
        &self.tmp
    }

    pub fn discard(self) {
        if let Err(e) = fs::remove_file(&self.tmp) {
            debug!("discard {}: {}", self.tmp.display(), e);
        }
    }
}

#[inline]
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

impl SlotManager {
    /// Open (creating if needed) a save directory for writing, config from env.
    pub fn open<P: AsRef<Path>>(root: P) -> SaveResult<Self> {
        Self::open_with_config(root, SaveConfig::from_env())
    }

    pub fn open_with_config<P: AsRef<Path>>(root: P, cfg: SaveConfig) -> SaveResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        let lock = try_acquire_lock(&root, LockMode::Exclusive)?;
        debug!("slot manager opened at {} ({})", root.display(), cfg);
        Ok(Self {
            root,
            cfg,
            readonly: false,
            _lock: lock,
        })
    }

    /// Read-only open under a shared lock. Mutating calls fail with
    /// PermissionDenied.
    pub fn open_ro<P: AsRef<Path>>(root: P) -> SaveResult<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(SaveError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("save directory {} does not exist", root.display()),
            )));
        }
        let lock = try_acquire_lock(&root, LockMode::Shared)?;
        Ok(Self {
            root,
            cfg: SaveConfig::from_env(),
            readonly: true,
            _lock: lock,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &SaveConfig {
        &self.cfg
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Physical path of a slot. Pure: never touches the disk.
    pub fn resolve(&self, slot: &SlotId) -> PathBuf {
        self.root.join(slot.file_name())
    }

    pub fn backup_path(&self, slot: &SlotId) -> PathBuf {
        with_suffix(&self.resolve(slot), BACKUP_SUFFIX)
    }

    pub fn staging_path(&self, slot: &SlotId) -> PathBuf {
        with_suffix(&self.resolve(slot), STAGING_SUFFIX)
    }

    fn ensure_writable(&self) -> SaveResult<()> {
        if self.readonly {
            return Err(SaveError::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("save directory {} opened read-only", self.root.display()),
            )));
        }
        Ok(())
    }

    // ---------------- write path ----------------

    /// Write the record to the slot's staging file.
    pub fn stage(&self, rec: &SaveRecord) -> SaveResult<StagedWrite> {
        self.ensure_writable()?;
        if !rec.checksum_ok() {
            return Err(SaveError::corrupt(format!(
                "record for slot {} carries checksum {:#010x}, payload hashes to {:#010x}",
                rec.slot,
                rec.checksum,
                payload_crc32c(&rec.payload)
            )));
        }

        let final_path = self.resolve(&rec.slot);
        if let Some(existing) = self.stored_version(&rec.slot, &final_path)? {
            if existing > rec.schema_version {
                return Err(SaveError::VersionRegression {
                    slot: rec.slot.to_string(),
                    existing,
                    attempted: rec.schema_version,
                });
            }
        }

        let stored = rec.codec.compress(&rec.payload)?;
        let hdr = SaveHeader {
            codec: rec.codec,
            schema_version: rec.schema_version,
            created_ms: rec.created_ms,
            payload_len: stored.len() as u64,
            payload_crc: rec.checksum,
        };

        let tmp = with_suffix(&final_path, STAGING_SUFFIX);
        let mut f = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)?;
        f.write_all(&hdr.encode())?;
        f.write_all(&stored)?;
        if self.cfg.data_fsync {
            f.sync_all()?;
        }
        debug!(
            "staged slot {} -> {} ({} bytes, codec={}, v{})",
            rec.slot,
            tmp.display(),
            SAVE_HDR_SIZE + stored.len(),
            rec.codec,
            rec.schema_version
        );
        Ok(StagedWrite {
            slot: rec.slot.clone(),
            tmp,
            final_path,
            bytes: SAVE_HDR_SIZE + stored.len(),
        })
    }

    /// Schema version the slot currently serves: the primary header, or the
    /// backup's when the primary header is damaged. I/O errors propagate.
    fn stored_version(&self, slot: &SlotId, final_path: &Path) -> SaveResult<Option<u32>> {
        match self.read_header_at(slot, final_path) {
            Ok(h) => return Ok(Some(h.schema_version)),
            Err(SaveError::SlotNotFound(_)) => {}
            Err(e) if e.is_corruption() => {
                debug!("slot {}: {}; checking backup header", slot, e)
            }
            Err(e) => return Err(e),
        }
        let bak = with_suffix(final_path, BACKUP_SUFFIX);
        match self.read_header_at(slot, &bak) {
            Ok(h) => Ok(Some(h.schema_version)),
            Err(SaveError::SlotNotFound(_)) => Ok(None),
            Err(e) if e.is_corruption() => {
                warn!("slot {}: backup header unusable too: {}", slot, e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Replace the slot file with the staged one in a single rename.
    pub fn promote(&self, staged: StagedWrite) -> SaveResult<()> {
        self.ensure_writable()?;
        if self.cfg.keep_backup && staged.final_path.exists() {
            self.refresh_backup(&staged.slot, &staged.final_path);
        }
        fs::rename(&staged.tmp, &staged.final_path)?;
        if self.cfg.data_fsync {
            let _ = fsync_dir(&staged.final_path);
        }
        metrics::record_bytes_written(staged.bytes);
        debug!("promoted slot {} ({} bytes)", staged.slot, staged.bytes);
        Ok(())
    }

    /// Keep the current file as the known-good copy, but only if it verifies.
    fn refresh_backup(&self, slot: &SlotId, final_path: &Path) {
        let bytes = match fs::read(final_path) {
            Ok(b) => b,
            Err(e) => {
                warn!("backup of slot {}: read failed: {}", slot, e);
                return;
            }
        };
        if let Err(e) = parse_slot_file(slot, &bytes) {
            warn!("slot {} is not valid ({}), keeping previous backup", slot, e);
            return;
        }
        let bak = with_suffix(final_path, BACKUP_SUFFIX);
        let _ = fs::remove_file(&bak);
        if fs::hard_link(final_path, &bak).is_err() {
            if let Err(e) = fs::write(&bak, &bytes) {
                warn!("backup of slot {}: {}", slot, e);
            }
        }
    }

    pub fn write_atomic(&self, rec: &SaveRecord) -> SaveResult<()> {
        self.write_atomic_with(rec, || Ok(()))
    }

    /// stage → `before_promote` → promote. An error from the hook discards the
    /// staged bytes and leaves the slot untouched.
    pub fn write_atomic_with<F>(&self, rec: &SaveRecord, before_promote: F) -> SaveResult<()>
    where
        F: FnOnce() -> SaveResult<()>,
    {
        let staged = self.stage(rec)?;
        if let Err(e) = before_promote() {
            staged.discard();
            return Err(e);
        }
        self.promote(staged)
    }

    // ---------------- read path ----------------

    /// Read and verify a slot, falling back to its known-good copy on corruption.
    pub fn read(&self, slot: &SlotId) -> SaveResult<SaveRecord> {
        let path = self.resolve(slot);
        let err = match self.read_verified(slot, &path) {
            Ok(rec) => return Ok(rec),
            Err(e) if e.is_corruption() => e,
            Err(e) => return Err(e),
        };
        let bak = with_suffix(&path, BACKUP_SUFFIX);
        if bak.exists() {
            match self.read_verified(slot, &bak) {
                Ok(rec) => {
                    warn!("slot {}: {}; serving backup {}", slot, err, bak.display());
                    metrics::record_backup_fallback();
                    return Ok(rec);
                }
                Err(be) => warn!("slot {}: backup unusable too: {}", slot, be),
            }
        }
        Err(err)
    }

    pub(crate) fn read_verified(&self, slot: &SlotId, path: &Path) -> SaveResult<SaveRecord> {
        let bytes = self.read_with_retry(slot, path, None)?;
        let rec = parse_slot_file(slot, &bytes)?;
        metrics::record_bytes_read(bytes.len());
        Ok(rec)
    }

    /// fs::read (or only the first `limit` bytes) with bounded retries for
    /// transient errors.
    fn read_with_retry(&self, slot: &SlotId, path: &Path, limit: Option<usize>) -> SaveResult<Vec<u8>> {
        self.retrying(slot, path, || match limit {
            None => fs::read(path),
            Some(n) => read_prefix(path, n),
        })
    }

    fn retrying<F>(&self, slot: &SlotId, path: &Path, mut read: F) -> SaveResult<Vec<u8>>
    where
        F: FnMut() -> io::Result<Vec<u8>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match read() {
                Ok(b) => return Ok(b),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Err(SaveError::SlotNotFound(slot.to_string()))
                }
                Err(e) if is_transient_io(&e) && attempt < self.cfg.read_retries => {
                    attempt += 1;
                    metrics::record_read_retry();
                    let d = backoff_delay(self.cfg.retry_backoff_ms, attempt);
                    debug!("read {}: {} (retry {} in {:?})", path.display(), e, attempt, d);
                    std::thread::sleep(d);
                }
                Err(e) => return Err(SaveError::Io(e)),
            }
        }
    }

    fn read_header_at(&self, slot: &SlotId, path: &Path) -> SaveResult<SaveHeader> {
        let b = self.read_with_retry(slot, path, Some(SAVE_HDR_SIZE))?;
        SaveHeader::decode(&b).map_err(|r| SaveError::slot_corrupted(slot, r))
    }

    /// Header only, without touching the payload.
    pub fn read_header(&self, slot: &SlotId) -> SaveResult<SaveHeader> {
        self.read_header_at(slot, &self.resolve(slot))
    }

    pub fn exists(&self, slot: &SlotId) -> bool {
        self.resolve(slot).is_file()
    }

    pub fn describe(&self, slot: &SlotId) -> SlotDescriptor {
        let path = self.resolve(slot);
        let meta = fs::metadata(&path).ok().filter(|m| m.is_file());
        let hdr = meta
            .as_ref()
            .and_then(|_| self.read_header_at(slot, &path).ok());
        SlotDescriptor {
            slot: slot.clone(),
            exists: meta.is_some(),
            modified_ms: meta
                .as_ref()
                .and_then(|m| m.modified().ok())
                .map(system_time_millis),
            schema_version: hdr.map(|h| h.schema_version),
            created_ms: hdr.map(|h| h.created_ms),
            payload_len: hdr.map(|h| h.payload_len),
            has_backup: with_suffix(&path, BACKUP_SUFFIX).is_file(),
            path,
        }
    }

    /// Slots present on disk, ascending by `SlotId`. Staging, backup and
    /// foreign files are skipped.
    pub fn enumerate(&self) -> SaveResult<Vec<SlotDescriptor>> {
        let mut ids = self.slot_ids()?;
        ids.sort();
        Ok(ids.iter().map(|id| self.describe(id)).collect())
    }

    fn slot_ids(&self) -> SaveResult<Vec<SlotId>> {
        let mut out = Vec::new();
        for e in fs::read_dir(&self.root)? {
            let e = e?;
            if !e.file_type()?.is_file() {
                continue;
            }
            if let Some(id) = e.file_name().to_str().and_then(SlotId::from_file_name) {
                out.push(id);
            }
        }
        Ok(out)
    }

    /// Remove a slot together with its backup and any staging leftover.
    pub fn delete(&self, slot: &SlotId) -> SaveResult<()> {
        self.ensure_writable()?;
        let path = self.resolve(slot);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SaveError::SlotNotFound(slot.to_string()))
            }
            Err(e) => return Err(e.into()),
        }
        for extra in [
            with_suffix(&path, BACKUP_SUFFIX),
            with_suffix(&path, STAGING_SUFFIX),
        ] {
            match fs::remove_file(&extra) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("delete {}: {}", extra.display(), e),
            }
        }
        if self.cfg.data_fsync {
            let _ = fsync_dir(&path);
        }
        debug!("deleted slot {}", slot);
        Ok(())
    }

    /// Next autosave target: first free ring index, else the oldest entry.
    /// Entries with an unreadable header count as oldest.
    pub fn next_autosave(&self) -> SlotId {
        let ring = self.cfg.autosave_slots.max(1);
        let mut oldest: Option<(u64, u32)> = None;
        for i in 0..ring {
            let id = SlotId::Autosave(i);
            if !self.exists(&id) {
                return id;
            }
            let ts = self.read_header(&id).map(|h| h.created_ms).unwrap_or(0);
            if oldest.map_or(true, |(t, _)| ts < t) {
                oldest = Some((ts, i));
            }
        }
        SlotId::Autosave(oldest.map(|(_, i)| i).unwrap_or(0))
    }

    /// Remove staging files left by interrupted writes. Returns how many.
    pub fn sweep_staging(&self) -> SaveResult<usize> {
        self.ensure_writable()?;
        let mut removed = 0usize;
        for e in fs::read_dir(&self.root)? {
            let e = e?;
            let name = e.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(base) = name.strip_suffix(STAGING_SUFFIX) else {
                continue;
            };
            if SlotId::from_file_name(base).is_none() {
                continue;
            }
            match fs::remove_file(e.path()) {
                Ok(()) => removed += 1,
                Err(err) => warn!("sweep {}: {}", e.path().display(), err),
            }
        }
        if removed > 0 {
            info!("swept {} staging file(s) in {}", removed, self.root.display());
            metrics::record_staging_swept(removed);
        }
        Ok(removed)
    }
}

fn read_prefix(path: &Path, n: usize) -> io::Result<Vec<u8>> {
    let f = fs::File::open(path)?;
    let mut buf = Vec::with_capacity(n);
    f.take(n as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Verify a complete slot file and unpack its payload.
pub(crate) fn parse_slot_file(slot: &SlotId, bytes: &[u8]) -> SaveResult<SaveRecord> {
    let hdr = SaveHeader::decode(bytes).map_err(|r| SaveError::slot_corrupted(slot, r))?;
    let body = &bytes[SAVE_HDR_SIZE..];
    if body.len() as u64 != hdr.payload_len {
        return Err(SaveError::slot_corrupted(
            slot,
            format!(
                "length mismatch: header says {} payload bytes, file has {}",
                hdr.payload_len,
                body.len()
            ),
        ));
    }
    let payload = hdr.codec.decompress(body)?;
    if !verify_payload(&payload, hdr.payload_crc) {
        return Err(SaveError::corrupt(format!(
            "payload checksum mismatch in slot {} (stored={:#010x}, calc={:#010x})",
            slot,
            hdr.payload_crc,
            payload_crc32c(&payload)
        )));
    }
    Ok(SaveRecord {
        slot: slot.clone(),
        schema_version: hdr.schema_version,
        created_ms: hdr.created_ms,
        codec: hdr.codec,
        payload,
        checksum: hdr.payload_crc,
    })
}
