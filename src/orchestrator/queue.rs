//! orchestrator/queue — очередь задач с per-slot FIFO.
//!
//! - ready: задачи, которые можно брать прямо сейчас (не более одной на слот);
//! - waiting[slot]: задачи, ждущие завершения текущей операции этого слота,
//!   в порядке подачи;
//! - busy: слоты, у которых есть задача в ready или в работе.
//!
//! finish(slot) переносит следующую задачу слота в ready (слот остаётся busy)
//! либо освобождает слот. После close() новые задачи не принимаются, но всё
//! уже поданное дорабатывается; next() возвращает None, когда работы не осталось.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::slot::SlotId;

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

pub(crate) struct Task {
    pub slot: SlotId,
    pub run: Job,
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<Task>,
    waiting: HashMap<SlotId, VecDeque<Task>>,
    busy: HashSet<SlotId>,
    closed: bool,
}

#[derive(Default)]
pub(crate) struct SlotQueue {
    st: Mutex<QueueState>,
    cv: Condvar,
}

impl SlotQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.st.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue; hands the task back if the queue is closed.
    pub(crate) fn submit(&self, task: Task) -> Result<(), Task> {
        let mut g = self.lock();
        if g.closed {
            return Err(task);
        }
        if g.busy.contains(&task.slot) {
            g.waiting
                .entry(task.slot.clone())
                .or_default()
                .push_back(task);
        } else {
            g.busy.insert(task.slot.clone());
            g.ready.push_back(task);
            drop(g);
            self.cv.notify_one();
        }
        Ok(())
    }

    /// Next runnable task; blocks. None once closed and drained.
    pub(crate) fn next(&self) -> Option<Task> {
        let mut g = self.lock();
        loop {
            if let Some(t) = g.ready.pop_front() {
                return Some(t);
            }
            if g.closed && g.busy.is_empty() {
                return None;
            }
            g = self.cv.wait(g).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// The running task of `slot` is done.
    pub(crate) fn finish(&self, slot: &SlotId) {
        let mut g = self.lock();
        let next = match g.waiting.get_mut(slot) {
            Some(q) => q.pop_front(),
            None => None,
        };
        if g.waiting.get(slot).is_some_and(|q| q.is_empty()) {
            g.waiting.remove(slot);
        }
        match next {
            Some(t) => g.ready.push_back(t),
            None => {
                g.busy.remove(slot);
            }
        }
        let closed = g.closed;
        drop(g);
        if closed {
            self.cv.notify_all();
        } else {
            self.cv.notify_one();
        }
    }

    pub(crate) fn close(&self) {
        self.lock().closed = true;
        self.cv.notify_all();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Tasks not yet taken by a worker (ready + waiting).
    pub(crate) fn queued(&self) -> usize {
        let g = self.lock();
        g.ready.len() + g.waiting.values().map(VecDeque::len).sum::<usize>()
    }
}
