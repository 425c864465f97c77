//! util — общие утилиты (время, fsync каталога, backoff).
//!
//! Содержит:
//! - now_millis(): текущее Unix-время в миллисекундах.
//! - fsync_dir(): fsync родительского каталога после rename (best-effort вне unix).
//! - backoff_delay(): экспоненциальная задержка для повторов чтения.

use std::path::Path;
use std::time::Duration;

/// Текущее Unix-время в миллисекундах.
#[inline]
pub fn now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    now.as_millis().min(u64::MAX as u128) as u64
}

/// Millisecond timestamp of a `SystemTime` (0 for pre-epoch values).
pub fn system_time_millis(t: std::time::SystemTime) -> u64 {
    t.duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis().min(u64::MAX as u128) as u64)
        .unwrap_or(0)
}

#[cfg(unix)]
pub fn fsync_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            let dir = std::fs::File::open(parent)?;
            dir.sync_all()?;
        }
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn fsync_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Задержка перед попыткой `attempt` (1-based): base * 2^(attempt-1), не более 2 с.
#[inline]
pub fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(16);
    let ms = base_ms.saturating_mul(1u64 << shift).min(2_000);
    Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_millis_monotonic_nonzero() {
        let a = now_millis();
        let b = now_millis();
        assert!(a > 0);
        assert!(b >= a);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_delay(10, 1), Duration::from_millis(10));
        assert_eq!(backoff_delay(10, 2), Duration::from_millis(20));
        assert_eq!(backoff_delay(10, 4), Duration::from_millis(80));
        assert_eq!(backoff_delay(500, 10), Duration::from_millis(2_000));
        assert_eq!(backoff_delay(0, 3), Duration::from_millis(0));
    }
}
