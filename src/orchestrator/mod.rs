//! orchestrator — public entry point: asynchronous save / load / delete.
//!
//! Every request becomes a task in `SlotQueue` and returns an `OpHandle`
//! immediately. A pool of std worker threads drains the queue: requests on
//! one slot run strictly in submission order, requests on different slots run
//! concurrently (up to `workers`).
//!
//! Stages:
//!   save:   Resolving → Serializing → Persisting → Completed
//!   load:   Resolving (read) → [Migrating] → Deserializing → Completed
//!   delete: Resolving → Persisting → Completed
//! Cancellation is checked on every stage boundary and, for saves, once more
//! right before the staged file is promoted.

pub mod handle;
mod queue;

pub use handle::OpHandle;

use log::{debug, error, info, warn};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use handle::OpShared;
use queue::{SlotQueue, Task};

use crate::codec::{self, SaveType};
use crate::config::SaveConfig;
use crate::error::{OpError, OpState, SaveError, SaveResult};
use crate::metrics;
use crate::migrate::Migrator;
use crate::slot::{PayloadCodec, SaveRecord, SlotDescriptor, SlotId, SlotManager};

struct Inner {
    slots: SlotManager,
    migrator: Migrator,
    codec: PayloadCodec,
    autosave_slots: u32,
    autosave_cursor: Mutex<Option<u32>>,
    next_id: AtomicU64,
}

pub struct SaveOrchestrator {
    inner: Arc<Inner>,
    queue: Arc<SlotQueue>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl SaveOrchestrator {
    /// Open with config from env and no migration steps.
    pub fn open<P: AsRef<Path>>(root: P) -> SaveResult<Self> {
        Self::open_with_config(root, SaveConfig::from_env(), Migrator::empty())
    }

    pub fn open_with_config<P: AsRef<Path>>(
        root: P,
        cfg: SaveConfig,
        migrator: Migrator,
    ) -> SaveResult<Self> {
        let workers = cfg.workers.max(1);
        let codec = cfg.codec;
        let autosave_slots = cfg.autosave_slots.max(1);
        let slots = SlotManager::open_with_config(root, cfg)?;
        let swept = slots.sweep_staging()?;
        if swept > 0 {
            warn!(
                "{} interrupted write(s) found in {}",
                swept,
                slots.root().display()
            );
        }

        let inner = Arc::new(Inner {
            slots,
            migrator,
            codec,
            autosave_slots,
            autosave_cursor: Mutex::new(None),
            next_id: AtomicU64::new(1),
        });
        let queue = Arc::new(SlotQueue::new());

        let mut handles = Vec::with_capacity(workers);
        for i in 0..workers {
            let q = Arc::clone(&queue);
            let h = std::thread::Builder::new()
                .name(format!("sg-worker-{i}"))
                .spawn(move || worker_loop(&q))?;
            handles.push(h);
        }
        info!(
            "save orchestrator started at {} ({} worker(s))",
            inner.slots.root().display(),
            workers
        );
        Ok(Self {
            inner,
            queue,
            workers: Mutex::new(handles),
        })
    }

    pub fn slots(&self) -> &SlotManager {
        &self.inner.slots
    }

    pub fn migrator(&self) -> &Migrator {
        &self.inner.migrator
    }

    /// Requests accepted but not yet picked up by a worker.
    pub fn pending(&self) -> usize {
        self.queue.queued()
    }

    pub fn is_shut_down(&self) -> bool {
        self.queue.is_closed()
    }

    /// Enqueue `job` for `slot`. If the queue is closed the handle resolves
    /// with `Shutdown` right away.
    fn submit<T, F>(&self, slot: SlotId, job: F) -> OpHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(&Inner, &OpShared<T>) -> Result<T, OpError> + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let shared = OpShared::new(id, slot.clone());
        let inner = Arc::clone(&self.inner);
        let sh = Arc::clone(&shared);
        let run = Box::new(move || {
            if !sh.begin() {
                return;
            }
            let res = match catch_unwind(AssertUnwindSafe(|| job(&inner, &sh))) {
                Ok(r) => r,
                Err(p) => {
                    let msg = p
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| p.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!("op #{} on slot {} panicked: {}", sh.id(), sh.slot(), msg);
                    Err(OpError::new(
                        sh.state(),
                        SaveError::Io(std::io::Error::other(format!("worker panicked: {msg}"))),
                    ))
                }
            };
            match &res {
                Ok(_) => {}
                Err(e) if e.is_cancelled() => metrics::record_cancelled(),
                Err(e) => {
                    metrics::record_failed();
                    debug!("op #{} on slot {} failed: {}", sh.id(), sh.slot(), e);
                }
            }
            sh.complete(res);
        });

        let task = Task {
            slot: slot.clone(),
            run,
        };
        if self.queue.submit(task).is_err() {
            shared.complete(Err(OpError::new(OpState::Pending, SaveError::Shutdown)));
        } else {
            debug!("op #{} queued for slot {}", id, slot);
        }
        OpHandle::new(shared)
    }

    /// Persist `value` into `slot`. Prior content survives any failure.
    pub fn save<T>(&self, slot: SlotId, value: T) -> OpHandle<()>
    where
        T: SaveType + Send + 'static,
    {
        self.submit(slot.clone(), move |inner, op| {
            debug!("save {} -> {}", slot, inner.slots.resolve(&slot).display());
            op.enter(OpState::Serializing)?;
            let payload = codec::encode(&value).map_err(|e| OpError::new(OpState::Serializing, e))?;

            op.enter(OpState::Persisting)?;
            let rec = SaveRecord::new(slot.clone(), T::SCHEMA_VERSION, payload).with_codec(inner.codec);
            inner
                .slots
                .write_atomic_with(&rec, || {
                    if op.cancel_requested() {
                        Err(SaveError::Cancelled)
                    } else {
                        Ok(())
                    }
                })
                .map_err(|e| OpError::new(OpState::Persisting, e))?;
            metrics::record_save();
            Ok(())
        })
    }

    /// Read `slot` as `T`, upgrading older payloads through the migrator.
    pub fn load<T>(&self, slot: SlotId) -> OpHandle<T>
    where
        T: SaveType + Send + 'static,
    {
        self.submit(slot.clone(), move |inner, op| {
            let at = |stage: OpState| move |e: SaveError| OpError::new(stage, e);

            let rec = inner.slots.read(&slot).map_err(at(OpState::Resolving))?;
            let found = rec.type_name().map_err(at(OpState::Resolving))?;
            if found != T::TYPE_NAME {
                return Err(OpError::new(
                    OpState::Resolving,
                    SaveError::TypeMismatch {
                        expected: T::TYPE_NAME.to_string(),
                        found,
                    },
                ));
            }

            let mut payload = rec.payload;
            if rec.schema_version != T::SCHEMA_VERSION {
                op.enter(OpState::Migrating)?;
                payload = inner
                    .migrator
                    .migrate(T::TYPE_NAME, &payload, rec.schema_version, T::SCHEMA_VERSION)
                    .map_err(at(OpState::Migrating))?;
            }

            op.enter(OpState::Deserializing)?;
            let value = codec::decode::<T>(&payload).map_err(at(OpState::Deserializing))?;
            metrics::record_load();
            Ok(value)
        })
    }

    pub fn delete(&self, slot: SlotId) -> OpHandle<()> {
        self.submit(slot.clone(), move |inner, op| {
            debug!("delete {} ({})", slot, inner.slots.resolve(&slot).display());
            op.enter(OpState::Persisting)?;
            inner
                .slots
                .delete(&slot)
                .map_err(|e| OpError::new(OpState::Persisting, e))?;
            metrics::record_delete();
            Ok(())
        })
    }

    /// Save into the autosave ring. The first target comes from disk
    /// (`next_autosave`), later ones rotate in memory so that queued
    /// autosaves do not pick the same entry.
    pub fn autosave<T>(&self, value: T) -> OpHandle<()>
    where
        T: SaveType + Send + 'static,
    {
        let idx = {
            let mut cur = self
                .inner
                .autosave_cursor
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let next = match *cur {
                Some(prev) => (prev + 1) % self.inner.autosave_slots,
                None => match self.inner.slots.next_autosave() {
                    SlotId::Autosave(i) => i,
                    _ => 0,
                },
            };
            *cur = Some(next);
            next
        };
        self.save(SlotId::Autosave(idx), value)
    }

    /// Snapshot of the slots on disk, ascending.
    pub fn list(&self) -> SaveResult<Vec<SlotDescriptor>> {
        self.inner.slots.enumerate()
    }

    /// Stop accepting requests, finish everything already queued, join the
    /// workers. Idempotent.
    pub fn shutdown(&self) {
        self.queue.close();
        let handles: Vec<JoinHandle<()>> = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        if handles.is_empty() {
            return;
        }
        for h in handles {
            if h.join().is_err() {
                warn!("save worker exited with a panic");
            }
        }
        info!(
            "save orchestrator at {} shut down",
            self.inner.slots.root().display()
        );
    }
}

impl Drop for SaveOrchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(q: &SlotQueue) {
    while let Some(task) = q.next() {
        let slot = task.slot;
        (task.run)();
        q.finish(&slot);
    }
}
