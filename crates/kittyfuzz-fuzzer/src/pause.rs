//! Cooperative pause and shutdown primitives.
//!
//! Both are consulted only at iteration boundaries: an in-flight test is
//! never interrupted.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A manual-reset gate. While paused, [`PauseGate::wait`] blocks; resume
/// releases every waiter.
#[derive(Clone, Default)]
pub struct PauseGate {
    inner: Arc<GateInner>,
}

#[derive(Default)]
struct GateInner {
    paused: Mutex<bool>,
    resumed: Condvar,
}

impl PauseGate {
    #[must_use]
    pub fn new() -> Self {
        PauseGate::default()
    }

    /// Pause the driver at its next iteration boundary.
    pub fn pause(&self) {
        *self.inner.paused.lock() = true;
    }

    /// Release the driver.
    pub fn resume(&self) {
        let mut paused = self.inner.paused.lock();
        *paused = false;
        self.inner.resumed.notify_all();
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        *self.inner.paused.lock()
    }

    /// Block while the gate is paused.
    pub fn wait(&self) {
        let mut paused = self.inner.paused.lock();
        while *paused {
            self.inner.resumed.wait(&mut paused);
        }
    }
}

/// Cooperative shutdown flag; a host typically sets it from a SIGINT
/// handler. The driver observes it at iteration boundaries, then tears the
/// target down and releases the session store.
#[derive(Clone, Default)]
pub struct ShutdownFlag {
    flag: Arc<AtomicBool>,
}

impl ShutdownFlag {
    #[must_use]
    pub fn new() -> Self {
        ShutdownFlag::default()
    }

    /// Request a clean stop after the current test.
    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
