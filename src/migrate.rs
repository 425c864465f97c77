//! migrate — upgrade of payloads written by older schema versions.
//!
//! Steps are registered once through `MigratorBuilder`; the built `Migrator`
//! is immutable and shared. A step for `(type, v)` turns the document at
//! version v into the document at v+1. Migration from `from` to `to` runs
//! every step `from..to` in order, and only after checking that all of them
//! exist, so a missing step never leaves a half-upgraded payload behind.
//!
//! Results are memoised (type, from, to, xxhash64(input)); hits are compared
//! byte-for-byte against the stored input.

use log::{debug, info};
use std::collections::{HashMap, VecDeque};
use std::hash::Hasher;
use std::sync::{Arc, Mutex};

use crate::codec::{decode_document, encode_document, Document, SaveType};
use crate::error::{SaveError, SaveResult};
use crate::metrics;

pub type StepFn = dyn Fn(Document) -> Result<Document, String> + Send + Sync;

#[derive(Default)]
pub struct MigratorBuilder {
    current: HashMap<String, u32>,
    steps: HashMap<(String, u32), Arc<StepFn>>,
    cache_entries: Option<usize>,
}

impl MigratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the current schema version of a savable type.
    pub fn register<T: SaveType>(self) -> Self {
        self.register_type(T::TYPE_NAME, T::SCHEMA_VERSION)
    }

    pub fn register_type(mut self, type_name: &str, current: u32) -> Self {
        self.current.insert(type_name.to_string(), current);
        self
    }

    /// Step `from -> from + 1`. A later registration for the same key replaces
    /// the earlier one.
    pub fn step<F>(mut self, type_name: &str, from: u32, f: F) -> Self
    where
        F: Fn(Document) -> Result<Document, String> + Send + Sync + 'static,
    {
        self.steps.insert((type_name.to_string(), from), Arc::new(f));
        self
    }

    pub fn step_for<T: SaveType, F>(self, from: u32, f: F) -> Self
    where
        F: Fn(Document) -> Result<Document, String> + Send + Sync + 'static,
    {
        self.step(T::TYPE_NAME, from, f)
    }

    /// Memoised results kept (0 disables). Default comes from `SaveConfig`.
    pub fn cache_entries(mut self, n: usize) -> Self {
        self.cache_entries = Some(n);
        self
    }

    pub fn build(self) -> Migrator {
        let cap = self
            .cache_entries
            .unwrap_or_else(|| crate::config::SaveConfig::from_env().migration_cache_entries);
        Migrator {
            current: self.current,
            steps: self.steps,
            cache: Mutex::new(MigrationCache::new(cap)),
        }
    }
}

// ---------------- memo cache ----------------

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
struct CacheKey {
    type_name: String,
    from: u32,
    to: u32,
    input_hash: u64,
}

struct MigrationCache {
    cap: usize,
    map: HashMap<CacheKey, (Vec<u8>, Vec<u8>)>,
    order: VecDeque<CacheKey>,
}

impl MigrationCache {
    fn new(cap: usize) -> Self {
        Self {
            cap,
            map: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, key: &CacheKey, input: &[u8]) -> Option<Vec<u8>> {
        match self.map.get(key) {
            Some((inp, out)) if inp.as_slice() == input => Some(out.clone()),
            _ => None,
        }
    }

    fn put(&mut self, key: CacheKey, input: &[u8], output: &[u8]) {
        if self.cap == 0 {
            return;
        }
        if self
            .map
            .insert(key.clone(), (input.to_vec(), output.to_vec()))
            .is_none()
        {
            self.order.push_back(key);
        }
        while self.map.len() > self.cap {
            match self.order.pop_front() {
                Some(old) => {
                    self.map.remove(&old);
                }
                None => break,
            }
        }
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

fn input_hash(bytes: &[u8]) -> u64 {
    let mut h = twox_hash::XxHash64::with_seed(0);
    h.write(bytes);
    h.finish()
}

// ---------------- migrator ----------------

pub struct Migrator {
    current: HashMap<String, u32>,
    steps: HashMap<(String, u32), Arc<StepFn>>,
    cache: Mutex<MigrationCache>,
}

impl Migrator {
    pub fn builder() -> MigratorBuilder {
        MigratorBuilder::new()
    }

    /// No steps: only identity migrations succeed.
    pub fn empty() -> Self {
        MigratorBuilder::new().cache_entries(0).build()
    }

    pub fn current_version(&self, type_name: &str) -> Option<u32> {
        self.current.get(type_name).copied()
    }

    /// Cached results currently held.
    pub fn cached(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// All steps for `from..to`, or the reason the upgrade cannot happen.
    fn plan(&self, type_name: &str, from: u32, to: u32) -> SaveResult<Vec<Arc<StepFn>>> {
        let supported = self.current_version(type_name).map_or(to, |c| c.min(to));
        if from > supported {
            return Err(SaveError::UnsupportedFutureVersion {
                type_name: type_name.to_string(),
                found: from,
                supported,
            });
        }
        let mut out = Vec::with_capacity((to - from) as usize);
        for v in from..to {
            match self.steps.get(&(type_name.to_string(), v)) {
                Some(f) => out.push(Arc::clone(f)),
                None => {
                    return Err(SaveError::NoMigrationPath {
                        type_name: type_name.to_string(),
                        from,
                        to,
                        missing: v,
                    })
                }
            }
        }
        Ok(out)
    }

    /// Upgrade a decoded document from version `from` to `to`.
    pub fn migrate_document(&self, doc: Document, from: u32, to: u32) -> SaveResult<Document> {
        let type_name = doc.type_name.clone();
        let steps = self.plan(&type_name, from, to)?;
        let n = steps.len();
        let mut doc = doc;
        for (i, f) in steps.iter().enumerate() {
            let v = from + i as u32;
            doc = f(doc).map_err(|reason| SaveError::MigrationFailed {
                type_name: type_name.clone(),
                from: v,
                reason,
            })?;
            if doc.type_name != type_name {
                return Err(SaveError::MigrationFailed {
                    type_name: type_name.clone(),
                    from: v,
                    reason: format!("step renamed the document to '{}'", doc.type_name),
                });
            }
            doc.check_refs().map_err(|e| SaveError::MigrationFailed {
                type_name: type_name.clone(),
                from: v,
                reason: e.to_string(),
            })?;
            debug!("migrated '{}' v{} -> v{}", type_name, v, v + 1);
        }
        if n > 0 {
            metrics::record_migration_steps(n);
        }
        Ok(doc)
    }

    /// Upgrade payload bytes of `type_name` from `from` to `to`.
    pub fn migrate(&self, type_name: &str, payload: &[u8], from: u32, to: u32) -> SaveResult<Vec<u8>> {
        // Validate the whole chain before decoding anything.
        self.plan(type_name, from, to)?;
        if from == to {
            return Ok(payload.to_vec());
        }

        let key = CacheKey {
            type_name: type_name.to_string(),
            from,
            to,
            input_hash: input_hash(payload),
        };
        if let Ok(c) = self.cache.lock() {
            if let Some(hit) = c.get(&key, payload) {
                metrics::record_migration_cache_hit();
                return Ok(hit);
            }
        }

        let doc = decode_document(payload)?;
        if doc.type_name != type_name {
            return Err(SaveError::TypeMismatch {
                expected: type_name.to_string(),
                found: doc.type_name,
            });
        }
        let out = encode_document(&self.migrate_document(doc, from, to)?)?;
        info!("'{}' payload upgraded v{} -> v{}", type_name, from, to);

        if let Ok(mut c) = self.cache.lock() {
            c.put(key, payload, &out);
        }
        Ok(out)
    }
}

impl std::fmt::Debug for Migrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.steps.keys().collect();
        keys.sort();
        f.debug_struct("Migrator")
            .field("current", &self.current)
            .field("steps", &keys)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Value;

    fn doc_v1() -> Document {
        let mut root = Value::record();
        root.set("gold", Value::U32(100));
        Document::new("Wallet", root)
    }

    fn migrator(cache: usize) -> Migrator {
        Migrator::builder()
            .register_type("Wallet", 3)
            .step("Wallet", 1, |mut d| {
                d.root.rename("gold", "coins");
                Ok(d)
            })
            .step("Wallet", 2, |mut d| {
                d.root.set("gems", Value::U32(0));
                Ok(d)
            })
            .cache_entries(cache)
            .build()
    }

    #[test]
    fn chain_runs_in_order() {
        let m = migrator(4);
        let out = m.migrate_document(doc_v1(), 1, 3).unwrap();
        assert_eq!(out.root.get("coins"), Some(&Value::U32(100)));
        assert_eq!(out.root.get("gems"), Some(&Value::U32(0)));
        assert!(out.root.get("gold").is_none());
    }

    #[test]
    fn missing_step_reported_before_running() {
        let m = Migrator::builder()
            .register_type("Wallet", 3)
            .step("Wallet", 2, |_| Err("must not run".into()))
            .cache_entries(0)
            .build();
        match m.migrate_document(doc_v1(), 1, 3) {
            Err(SaveError::NoMigrationPath { missing, .. }) => assert_eq!(missing, 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn future_version_rejected() {
        let m = migrator(0);
        let bytes = encode_document(&doc_v1()).unwrap();
        assert!(matches!(
            m.migrate("Wallet", &bytes, 4, 3),
            Err(SaveError::UnsupportedFutureVersion { found: 4, supported: 3, .. })
        ));
    }

    #[test]
    fn identity_and_cache() {
        let m = migrator(2);
        let bytes = encode_document(&doc_v1()).unwrap();
        assert_eq!(m.migrate("Wallet", &bytes, 1, 1).unwrap(), bytes);
        let a = m.migrate("Wallet", &bytes, 1, 3).unwrap();
        let b = m.migrate("Wallet", &bytes, 1, 3).unwrap();
        assert_eq!(a, b);
        assert_eq!(m.cached(), 1);
    }

    #[test]
    fn failing_step_is_migration_failed() {
        let m = Migrator::builder()
            .register_type("Wallet", 2)
            .step("Wallet", 1, |_| Err("gold overflow".into()))
            .cache_entries(0)
            .build();
        match m.migrate_document(doc_v1(), 1, 2) {
            Err(SaveError::MigrationFailed { from, reason, .. }) => {
                assert_eq!(from, 1);
                assert_eq!(reason, "gold overflow");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
