//! Single-worker queue with one latest-wins pending slot.

use crate::utils::lock;
use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// What happened to a submitted item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The worker was idle and picks the item up right away.
    Dispatched,
    /// The worker is busy; the item waits in the slot.
    Pending,
    /// The worker is busy; the item replaced an older pending one, which was dropped.
    Replaced,
    /// The waiting item is held and cannot be replaced; the new item was dropped.
    Skipped,
    /// The queue is shut down; the item was dropped.
    Rejected,
}

struct Slot<T> {
    pending: Option<T>,
    /// The pending item was submitted with [`DecodeQueue::submit_held`].
    held: bool,
    busy: bool,
    closed: bool,
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    changed: Condvar,
    dropped: AtomicU64,
}

/// Bounded hand-off to one worker thread.
///
/// At most one item is ever waiting. While the worker is busy, each new item
/// overwrites the waiting one, so the worker always resumes with the newest.
/// A held item is the exception: only another held item may replace it.
pub struct DecodeQueue<T: Send + 'static> {
    shared: Arc<Shared<T>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> DecodeQueue<T> {
    /// Starts the worker thread; `handler` runs on it for every accepted item.
    pub fn spawn<F>(name: &str, mut handler: F) -> Result<Self>
    where
        F: FnMut(T) + Send + 'static,
    {
        let shared = Arc::new(Shared {
            slot: Mutex::new(Slot {
                pending: None,
                held: false,
                busy: false,
                closed: false,
            }),
            changed: Condvar::new(),
            dropped: AtomicU64::new(0),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new().name(name.to_string()).spawn(move || {
            while let Some(item) = worker_shared.next_item() {
                handler(item);
                lock(&worker_shared.slot).busy = false;
                worker_shared.changed.notify_all();
            }
            debug!("Decode queue worker finished");
        })?;

        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn submit(&self, item: T) -> SubmitOutcome {
        self.offer(item, false)
    }

    /// Like [`DecodeQueue::submit`], but the item stays in the slot until the
    /// worker takes it; plain submissions arriving meanwhile are skipped.
    pub fn submit_held(&self, item: T) -> SubmitOutcome {
        self.offer(item, true)
    }

    fn offer(&self, item: T, held: bool) -> SubmitOutcome {
        let mut slot = lock(&self.shared.slot);
        if slot.closed {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            return SubmitOutcome::Rejected;
        }
        if slot.held && !held && slot.pending.is_some() {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            trace!("Pending item is held, new item skipped");
            return SubmitOutcome::Skipped;
        }
        let outcome = match (slot.busy, slot.pending.is_some()) {
            (false, false) => SubmitOutcome::Dispatched,
            (_, true) => {
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                trace!("Pending decode frame replaced");
                SubmitOutcome::Replaced
            }
            (true, false) => SubmitOutcome::Pending,
        };
        slot.pending = Some(item);
        slot.held = held;
        drop(slot);
        self.shared.changed.notify_all();
        outcome
    }

    /// Drops the waiting item, if any. An item already being handled completes.
    pub fn clear(&self) -> bool {
        let mut slot = lock(&self.shared.slot);
        slot.held = false;
        let cleared = slot.pending.take().is_some();
        drop(slot);
        if cleared {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
        }
        cleared
    }

    /// Items replaced, cleared or rejected so far.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub fn is_idle(&self) -> bool {
        let slot = lock(&self.shared.slot);
        !slot.busy && slot.pending.is_none()
    }

    /// Blocks until nothing is waiting or running, or `timeout` passes.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut slot = lock(&self.shared.slot);
        while slot.busy || slot.pending.is_some() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .shared
                .changed
                .wait_timeout(slot, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            slot = guard;
        }
        true
    }

    /// Rejects further items, drops the waiting one and joins the worker.
    pub fn shutdown(&self) {
        {
            let mut slot = lock(&self.shared.slot);
            slot.closed = true;
            if slot.pending.take().is_some() {
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.shared.changed.notify_all();

        let Some(worker) = lock(&self.worker).take() else {
            return;
        };
        if worker.thread().id() == thread::current().id() {
            // Shut down from inside the handler; the loop exits on its own.
            return;
        }
        if worker.join().is_err() {
            warn!("Decode worker panicked");
        }
    }
}

impl<T> Shared<T> {
    fn next_item(&self) -> Option<T> {
        let mut slot = lock(&self.slot);
        loop {
            if slot.closed {
                return None;
            }
            if let Some(item) = slot.pending.take() {
                slot.held = false;
                slot.busy = true;
                return Some(item);
            }
            slot = self.changed.wait(slot).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl<T: Send + 'static> Drop for DecodeQueue<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
