//! orchestrator/handle — OpHandle: результат асинхронной операции.
//!
//! Общее состояние (OpShared) живёт в Arc между воркером и хэндлом:
//! - state/result/waker под одним Mutex, Condvar будит блокирующий wait();
//! - флаг отмены — AtomicBool, воркер проверяет его на границах стадий.
//!
//! Переходы: Pending → (begin) Resolving → ... → Completed | Failed | Cancelled.
//! Терминальное состояние выставляется ровно один раз.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use crate::error::{OpError, OpState, SaveError};
use crate::slot::SlotId;

struct OpInner<T> {
    state: OpState,
    result: Option<Result<T, OpError>>,
    waker: Option<Waker>,
}

pub(crate) struct OpShared<T> {
    id: u64,
    slot: SlotId,
    inner: Mutex<OpInner<T>>,
    cv: Condvar,
    cancel: AtomicBool,
}

impl<T> OpShared<T> {
    pub(crate) fn new(id: u64, slot: SlotId) -> Arc<Self> {
        Arc::new(Self {
            id,
            slot,
            inner: Mutex::new(OpInner {
                state: OpState::Pending,
                result: None,
                waker: None,
            }),
            cv: Condvar::new(),
            cancel: AtomicBool::new(false),
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn slot(&self) -> &SlotId {
        &self.slot
    }

    fn lock(&self) -> MutexGuard<'_, OpInner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> OpState {
        self.lock().state
    }

    /// Pending → Resolving. False if the op was resolved while queued.
    pub(crate) fn begin(&self) -> bool {
        let mut g = self.lock();
        if g.state != OpState::Pending {
            return false;
        }
        g.state = OpState::Resolving;
        true
    }

    /// Move to a working stage unless cancellation was requested.
    pub(crate) fn enter(&self, stage: OpState) -> Result<(), OpError> {
        if self.cancel_requested() {
            return Err(OpError::new(stage, SaveError::Cancelled));
        }
        let mut g = self.lock();
        if !g.state.is_terminal() {
            g.state = stage;
        }
        Ok(())
    }

    pub(crate) fn cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Store the final result. Returns false if the op was already resolved.
    pub(crate) fn complete(&self, res: Result<T, OpError>) -> bool {
        let g = self.lock();
        if g.state.is_terminal() {
            return false;
        }
        self.resolve_locked(g, res);
        true
    }

    fn resolve_locked(&self, mut g: MutexGuard<'_, OpInner<T>>, res: Result<T, OpError>) {
        g.state = match &res {
            Ok(_) => OpState::Completed,
            Err(e) if e.is_cancelled() => OpState::Cancelled,
            Err(_) => OpState::Failed,
        };
        g.result = Some(res);
        let waker = g.waker.take();
        drop(g);
        self.cv.notify_all();
        if let Some(w) = waker {
            w.wake();
        }
    }

    fn request_cancel(&self) -> bool {
        self.cancel.store(true, Ordering::Release);
        let g = self.lock();
        if g.state != OpState::Pending {
            return false;
        }
        self.resolve_locked(g, Err(OpError::new(OpState::Pending, SaveError::Cancelled)));
        true
    }
}

/// Handle of a submitted save/load/delete.
///
/// Block with `wait()`, poll with `try_result()`, or `.await` it.
pub struct OpHandle<T> {
    shared: Arc<OpShared<T>>,
}

impl<T> OpHandle<T> {
    pub(crate) fn new(shared: Arc<OpShared<T>>) -> Self {
        Self { shared }
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn slot(&self) -> &SlotId {
        &self.shared.slot
    }

    pub fn state(&self) -> OpState {
        self.shared.state()
    }

    pub fn is_done(&self) -> bool {
        self.state().is_terminal()
    }

    /// Request cancellation. Returns true when the op was still queued and is
    /// now resolved as `Cancelled`. An in-flight save is cancelled only if the
    /// request arrives before its promote step.
    pub fn cancel(&self) -> bool {
        self.shared.request_cancel()
    }

    /// Block until the op resolves.
    pub fn wait(self) -> Result<T, OpError> {
        let mut g = self.shared.lock();
        loop {
            if let Some(res) = g.result.take() {
                return res;
            }
            g = self
                .shared
                .cv
                .wait(g)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Non-blocking: the result if resolved, otherwise the handle back.
    pub fn try_result(self) -> Result<Result<T, OpError>, Self> {
        let res = self.shared.lock().result.take();
        match res {
            Some(r) => Ok(r),
            None => Err(self),
        }
    }
}

impl<T> Future for OpHandle<T> {
    type Output = Result<T, OpError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut g = self.shared.lock();
        match g.result.take() {
            Some(r) => Poll::Ready(r),
            None => {
                g.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl<T> std::fmt::Debug for OpHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpHandle")
            .field("id", &self.shared.id)
            .field("slot", &self.shared.slot)
            .field("state", &self.state())
            .finish()
    }
}
