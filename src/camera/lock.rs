//! Binary lock serializing camera open, configure and release.

use crate::error::ScanError;
use crate::utils::lock;
use std::sync::{Arc, Condvar, Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How long an open waits for another session to let go of the camera.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(2500);

struct LockState {
    held: Mutex<bool>,
    released: Condvar,
}

/// Cloneable handle to a binary camera lock.
///
/// [`CameraLock::global`] is shared by every session in the process. Separate
/// locks from [`CameraLock::new`] are independent, which keeps tests isolated.
#[derive(Clone)]
pub struct CameraLock {
    state: Arc<LockState>,
}

impl CameraLock {
    pub fn new() -> Self {
        Self {
            state: Arc::new(LockState {
                held: Mutex::new(false),
                released: Condvar::new(),
            }),
        }
    }

    /// The process-wide lock.
    pub fn global() -> CameraLock {
        static GLOBAL: OnceLock<CameraLock> = OnceLock::new();
        GLOBAL.get_or_init(CameraLock::new).clone()
    }

    /// Waits up to `timeout` for the lock.
    pub fn try_acquire_for(&self, timeout: Duration) -> Result<CameraLockGuard, ScanError> {
        let deadline = Instant::now() + timeout;
        let mut held = lock(&self.state.held);
        while *held {
            let now = Instant::now();
            if now >= deadline {
                warn!("Camera lock still held after {:?}", timeout);
                return Err(ScanError::LockTimeout(timeout));
            }
            let (guard, _) = self
                .state
                .released
                .wait_timeout(held, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            held = guard;
        }
        *held = true;
        debug!("Camera lock acquired");
        Ok(CameraLockGuard { lock: self.clone() })
    }

    pub fn is_held(&self) -> bool {
        *lock(&self.state.held)
    }
}

impl Default for CameraLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases the camera lock when dropped.
#[must_use = "the camera lock is released as soon as the guard is dropped"]
pub struct CameraLockGuard {
    lock: CameraLock,
}

impl Drop for CameraLockGuard {
    fn drop(&mut self) {
        *lock(&self.lock.state.held) = false;
        self.lock.state.released.notify_one();
        debug!("Camera lock released");
    }
}
