use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Counts live bridges so shutdown can wait for them.
#[derive(Debug, Clone, Default)]
pub struct BridgeTracker {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    active: Mutex<usize>,
    idle: Condvar,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, usize> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl BridgeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one bridge. It stays counted until the guard drops.
    pub fn track(&self) -> BridgeGuard {
        *self.inner.lock() += 1;
        BridgeGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn active(&self) -> usize {
        *self.inner.lock()
    }

    /// Wait until no bridge is tracked or `timeout` elapses.
    ///
    /// Returns `true` if every bridge finished in time.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut active = self.inner.lock();
        while *active > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            active = self
                .inner
                .idle
                .wait_timeout(active, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
        true
    }
}

/// Keeps one bridge counted in its [`BridgeTracker`].
#[derive(Debug)]
pub struct BridgeGuard {
    inner: Arc<Inner>,
}

impl Drop for BridgeGuard {
    fn drop(&mut self) {
        let mut active = self.inner.lock();
        *active = active.saturating_sub(1);
        if *active == 0 {
            self.inner.idle.notify_all();
        }
    }
}
