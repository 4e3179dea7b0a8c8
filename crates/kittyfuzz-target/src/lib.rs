//! Target, controller and monitor contracts for kittyfuzz.
//!
//! A target is the capability object that delivers renderings to the
//! system under test and reports back. A controller prepares the victim
//! for each test (restart a process, reset a board); monitors watch from
//! the side (serial consoles, log scrapers). The driver orchestrates all
//! three: setup once, pre-test / post-test around every mutation, teardown
//! once, and a merged report per test.

#![forbid(unsafe_code)]

use kittyfuzz_data::Report;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Failure in target communication.
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("target io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("target error: {0}")]
    Other(String),
}

impl TargetError {
    pub fn other(msg: impl Into<String>) -> Self {
        TargetError::Other(msg.into())
    }
}

/// Lifecycle shared by server- and client-style targets.
///
/// The driver calls, in order: `setup` once, then per test `pre_test`,
/// the delivery primitive, `post_test`, `get_report`; finally `teardown`.
pub trait Target {
    /// Human-readable description for logs.
    fn description(&self) -> String {
        "target".to_string()
    }

    /// Called once before the session.
    fn setup(&mut self) -> Result<(), TargetError> {
        Ok(())
    }

    /// Called once after the session, including on early stops.
    fn teardown(&mut self) {}

    /// Called before each test with the running test index.
    fn pre_test(&mut self, test_index: u64);

    /// Called after each test.
    fn post_test(&mut self, test_index: u64);

    /// The report for the test bracketed by the last pre/post pair.
    fn get_report(&mut self) -> Report;

    /// Whether a transport error should count toward the failure budget;
    /// targets that treat flaky I/O as benign can override this.
    fn error_is_failure(&self) -> bool {
        true
    }
}

/// A target the driver pushes payloads to.
pub trait ServerTarget: Target {
    /// Deliver one rendered payload; the response bytes, if any, land in
    /// the report or are returned for protocol-aware drivers.
    fn transmit(&mut self, payload: &[u8]) -> Result<Vec<u8>, TargetError>;
}

/// A target for client-style SUTs: `trigger` provokes the client into
/// connecting, and payloads are pulled through the driver's stage
/// callback rather than pushed.
pub trait ClientTarget: Target {
    /// Kick the client so it starts the exchange.
    fn trigger(&mut self) -> Result<(), TargetError>;

    /// Notification that the current test's mutation was served.
    fn signal_mutated(&mut self) {}
}

/// Prepares the victim for each test and reports on its state.
pub trait Controller {
    fn setup(&mut self) -> Result<(), TargetError> {
        Ok(())
    }

    fn teardown(&mut self) {}

    fn pre_test(&mut self, test_index: u64);

    fn post_test(&mut self);

    /// State of the victim since the last `pre_test`.
    fn get_report(&mut self) -> Report;
}

/// A controller for victims that need no preparation.
#[derive(Debug)]
pub struct EmptyController {
    report: Report,
}

impl EmptyController {
    #[must_use]
    pub fn new() -> Self {
        EmptyController {
            report: Report::new("controller"),
        }
    }
}

impl Default for EmptyController {
    fn default() -> Self {
        EmptyController::new()
    }
}

impl Controller for EmptyController {
    fn pre_test(&mut self, _test_index: u64) {
        self.report = Report::new("controller");
    }

    fn post_test(&mut self) {}

    fn get_report(&mut self) -> Report {
        self.report.clone()
    }
}

/// Watches the victim from the side during tests.
pub trait Monitor: Send {
    /// Name used for the monitor's sub-report.
    fn name(&self) -> String;

    fn setup(&mut self) -> Result<(), TargetError> {
        Ok(())
    }

    fn teardown(&mut self) {}

    fn pre_test(&mut self, test_index: u64);

    fn post_test(&mut self);

    fn get_report(&mut self) -> Report;
}

/// Cooperative stop flag shared with monitor threads.
#[derive(Debug, Clone, Default)]
pub struct StopFlag {
    stopped: Arc<AtomicBool>,
}

impl StopFlag {
    #[must_use]
    pub fn new() -> Self {
        StopFlag::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Runs a polling closure on its own thread until stopped; the vehicle
/// for monitors that watch consoles, logs or processes.
pub struct MonitorRunner {
    flag: StopFlag,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl MonitorRunner {
    /// Spawn `poll` in a loop until the runner is stopped.
    pub fn spawn<F>(name: impl Into<String>, mut poll: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let name = name.into();
        let flag = StopFlag::new();
        let thread_flag = flag.clone();
        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                while !thread_flag.is_stopped() {
                    poll();
                }
            })
            .map_err(|e| {
                log::warn!("could not spawn monitor thread {name}: {e}");
                e
            })
            .ok();
        MonitorRunner {
            flag,
            handle,
        }
    }

    /// Signal the loop to finish and join it.
    pub fn stop(&mut self) {
        self.flag.stop();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("monitor thread panicked");
            }
        }
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for MonitorRunner {
    fn drop(&mut self) {
        self.stop();
    }
}
