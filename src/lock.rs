//! File-based locking of the save directory.
//!
//! Cross-platform (fs2) advisory locks:
//! - Exclusive: the writing SlotManager (one per directory).
//! - Shared: read-only inspection (CLI list/inspect/verify).
//!
//! Lock file path: <root>/LOCK
//! Lock is released on Drop. Acquisition never blocks: a held lock is reported
//! as an i/o error (WouldBlock).

use fs2::FileExt;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

use crate::consts::LOCK_FILE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug)]
pub struct LockGuard {
    file: std::fs::File,
    path: PathBuf,
    mode: LockMode,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // ошибки unlock на drop игнорируем
        let _ = FileExt::unlock(&self.file);
    }
}

fn lock_file_path(root: &Path) -> PathBuf {
    root.join(LOCK_FILE)
}

/// Try to acquire a lock in the requested mode.
pub fn try_acquire_lock(root: &Path, mode: LockMode) -> io::Result<LockGuard> {
    let path = lock_file_path(root);
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(&path)?;
    let res = match mode {
        LockMode::Shared => FileExt::try_lock_shared(&file),
        LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
    };
    res.map_err(|e| {
        io::Error::new(
            e.kind(),
            format!("save directory {} is locked ({:?}): {}", root.display(), mode, e),
        )
    })?;
    Ok(LockGuard { file, path, mode })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusive_excludes_second_holder() {
        let root = std::env::temp_dir().join(format!(
            "sg-lock-{}-{}",
            std::process::id(),
            crate::util::now_millis()
        ));
        std::fs::create_dir_all(&root).unwrap();

        let g = try_acquire_lock(&root, LockMode::Exclusive).unwrap();
        assert_eq!(g.mode(), LockMode::Exclusive);
        assert!(try_acquire_lock(&root, LockMode::Shared).is_err());
        drop(g);

        let s1 = try_acquire_lock(&root, LockMode::Shared).unwrap();
        let s2 = try_acquire_lock(&root, LockMode::Shared).unwrap();
        assert!(s1.path().ends_with(LOCK_FILE));
        drop((s1, s2));
        let _ = std::fs::remove_dir_all(&root);
    }
}
