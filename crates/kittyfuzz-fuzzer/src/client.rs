//! The client-mode session driver: the SUT initiates the exchange, and the
//! driver serves mutated payloads through a stage-matching callback.

use crate::config::FuzzerConfig;
use crate::error::SessionError;
use crate::pause::{PauseGate, ShutdownFlag};
use crate::session::{now_unix, validate_or_init, SessionSummary};
use crate::test_list::{RangesList, StartEndList, TestList};
use kittyfuzz_data::{JsonFileStore, MemoryStore, Report, SessionInfo, SessionStore, Status};
use kittyfuzz_model::Template;
use kittyfuzz_target::{ClientTarget, Controller, Monitor, Target};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Re-exported stage wildcard; see [`MutationProvider::get_mutation`].
pub use kittyfuzz_model::STAGE_ANY;

#[derive(Debug, Default)]
struct SharedState {
    template: Option<Template>,
    last_payload: Option<Vec<u8>>,
}

/// The payload provider a protocol stack calls when it reaches a named
/// stage. Cloneable and thread-safe; serves the same payload for the
/// whole duration of one test.
#[derive(Clone, Default)]
pub struct MutationProvider {
    shared: Arc<Mutex<SharedState>>,
}

impl MutationProvider {
    /// A payload when `stage` matches the currently fuzzed field's name
    /// (case-insensitive) or is [`STAGE_ANY`]; `None` otherwise.
    pub fn get_mutation(
        &self,
        stage: &str,
        data: &HashMap<String, Vec<u8>>,
    ) -> Option<Vec<u8>> {
        let mut shared = self.shared.lock();
        let template = shared.template.as_mut()?;
        let payload = template.mutation_for_stage(stage, data)?;
        shared.last_payload = Some(payload.clone());
        Some(payload)
    }
}

/// Drives client-style SUTs: per test, trigger the client and let it pull
/// the mutation through [`MutationProvider`]; report handling, session
/// state and stop conditions match the server driver.
pub struct ClientFuzzer {
    shared: Arc<Mutex<SharedState>>,
    target: Box<dyn ClientTarget>,
    controller: Option<Box<dyn Controller>>,
    monitors: Vec<Box<dyn Monitor>>,
    store: Box<dyn SessionStore>,
    default_store: bool,
    config: FuzzerConfig,
    session: SessionInfo,
    pause: PauseGate,
    shutdown: ShutdownFlag,
    template_hash: u64,
    num_mutations: u64,
}

impl ClientFuzzer {
    #[must_use]
    pub fn new(template: Template, target: impl ClientTarget + 'static) -> Self {
        let template_hash = template.hash();
        let num_mutations = template.num_mutations();
        ClientFuzzer {
            shared: Arc::new(Mutex::new(SharedState {
                template: Some(template),
                last_payload: None,
            })),
            target: Box::new(target),
            controller: None,
            monitors: Vec::new(),
            store: Box::new(MemoryStore::new()),
            default_store: true,
            config: FuzzerConfig::default(),
            session: SessionInfo::default(),
            pause: PauseGate::new(),
            shutdown: ShutdownFlag::new(),
            template_hash,
            num_mutations,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: FuzzerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_option_line(self, line: &str) -> Result<Self, SessionError> {
        let config = FuzzerConfig::from_option_line(line)?;
        Ok(self.with_config(config))
    }

    #[must_use]
    pub fn with_store(mut self, store: impl SessionStore + 'static) -> Self {
        self.store = Box::new(store);
        self.default_store = false;
        self
    }

    #[must_use]
    pub fn with_controller(mut self, controller: impl Controller + 'static) -> Self {
        self.controller = Some(Box::new(controller));
        self
    }

    #[must_use]
    pub fn with_monitor(mut self, monitor: impl Monitor + 'static) -> Self {
        self.monitors.push(Box::new(monitor));
        self
    }

    /// The payload provider to register with the SUT's protocol stack.
    #[must_use]
    pub fn provider(&self) -> MutationProvider {
        MutationProvider {
            shared: Arc::clone(&self.shared),
        }
    }

    #[must_use]
    pub fn pause_gate(&self) -> PauseGate {
        self.pause.clone()
    }

    #[must_use]
    pub fn shutdown_flag(&self) -> ShutdownFlag {
        self.shutdown.clone()
    }

    #[must_use]
    pub fn session_info(&self) -> &SessionInfo {
        &self.session
    }

    #[must_use]
    pub fn store(&self) -> &dyn SessionStore {
        self.store.as_ref()
    }

    pub fn run(&mut self) -> Result<SessionSummary, SessionError> {
        if self.default_store {
            if let Some(path) = &self.config.session_path {
                self.store = Box::new(JsonFileStore::new(path.clone()));
                self.default_store = false;
            }
        }
        self.store.start()?;
        let stored = self.store.session_info()?;
        self.session = validate_or_init(stored, self.template_hash, &self.config)?;

        if self.num_mutations == 0 {
            log::warn!("template has no mutations, nothing to fuzz");
            return Ok(SessionSummary {
                tests_run: 0,
                failure_count: 0,
                last_index: None,
                stopped_early: false,
            });
        }
        let last = self.num_mutations - 1;
        let mut list: Box<dyn TestList> = match &self.session.test_list {
            Some(expr) => Box::new(RangesList::parse(expr)?),
            None => Box::new(StartEndList::new(self.session.start_index, self.session.end_index)),
        };
        list.set_last(last)?;
        if self.session.end_index.is_none() {
            self.session.end_index = Some(last);
        }
        self.session.start_time = now_unix();
        self.store.set_session_info(&self.session)?;

        log::info!(
            "starting client fuzzing session against {}: {} mutations total",
            self.target.description(),
            self.num_mutations,
        );

        if let Some(controller) = &mut self.controller {
            controller.setup()?;
        }
        for monitor in &mut self.monitors {
            monitor.setup()?;
        }
        self.target.setup()?;

        let result = self.fuzz_loop(list.as_mut());

        self.target.teardown();
        for monitor in self.monitors.iter_mut().rev() {
            monitor.teardown();
        }
        if let Some(controller) = &mut self.controller {
            controller.teardown();
        }
        self.store.set_session_info(&self.session)?;
        result
    }

    fn fuzz_loop(&mut self, list: &mut dyn TestList) -> Result<SessionSummary, SessionError> {
        if self.config.skip_env_test {
            log::info!("skipping environment test");
        } else {
            log::info!("performing environment test");
            self.environment_test()?;
        }

        list.fast_forward(self.session.current_index);
        let _ = self.with_template(Template::reset);

        let mut tests_run = 0u64;
        let mut last_index = None;
        let mut stopped_early = false;
        while let Some(index) = list.current() {
            if self.shutdown.is_set() {
                stopped_early = true;
                break;
            }
            self.pause.wait();
            if let Some(max) = self.config.max_failures {
                if self.session.failure_count >= max {
                    stopped_early = true;
                    break;
                }
            }
            if !self.position_at(index) {
                break;
            }
            self.run_one(index)?;
            tests_run += 1;
            last_index = Some(index);
            list.advance();
        }
        Ok(SessionSummary {
            tests_run,
            failure_count: self.session.failure_count,
            last_index,
            stopped_early,
        })
    }

    fn with_template<R>(&self, f: impl FnOnce(&mut Template) -> R) -> Option<R> {
        let mut shared = self.shared.lock();
        shared.template.as_mut().map(f)
    }

    fn position_at(&mut self, index: u64) -> bool {
        self.with_template(|template| {
            let current = template.current_index();
            if current >= 0 && current as u64 >= index {
                template.reset();
            }
            let needed = (index as i64 - template.current_index()) as u64;
            template.skip(needed) == needed
        })
        .unwrap_or(false)
    }

    fn run_one(&mut self, index: u64) -> Result<(), SessionError> {
        self.session.current_index = index;
        self.shared.lock().last_payload = None;
        if let Some(controller) = &mut self.controller {
            controller.pre_test(index);
        }
        for monitor in &mut self.monitors {
            monitor.pre_test(index);
        }
        self.target.pre_test(index);

        let triggered = self.target.trigger();
        self.target.signal_mutated();

        self.target.post_test(index);
        for monitor in self.monitors.iter_mut().rev() {
            monitor.post_test();
        }
        if let Some(controller) = &mut self.controller {
            controller.post_test();
        }

        let mut report = self.target.get_report();
        if let Err(e) = triggered {
            report.set_error(e.to_string());
        }
        if let Some(controller) = &mut self.controller {
            report.add_sub_report(controller.get_report());
        }
        for monitor in &mut self.monitors {
            report.add_sub_report(monitor.get_report());
        }

        let status = report.status();
        let failure = match status {
            Status::Passed => false,
            Status::Failed => true,
            Status::Error => self.target.error_is_failure(),
        };
        if failure {
            self.session.failure_count += 1;
            log::warn!(
                "failure detected at test {index}: {}",
                report.reason().unwrap_or("no reason recorded")
            );
        }
        if status != Status::Passed || self.config.store_all_reports {
            self.store_report(index, report)?;
        }
        self.store.set_session_info(&self.session)?;
        if !self.config.delay.is_zero() {
            std::thread::sleep(self.config.delay);
        }
        Ok(())
    }

    fn store_report(&mut self, index: u64, mut report: Report) -> Result<(), SessionError> {
        report.add("test_number", index);
        let payload = self.shared.lock().last_payload.clone();
        if let Some(payload) = payload {
            let mut payload_report = Report::new("payload");
            payload_report.add("hex", hex::encode(&payload));
            payload_report.add("length", payload.len() as u64);
            report.add_sub_report(payload_report);
        }
        self.store.store_report(index, &report)?;
        Ok(())
    }

    fn environment_test(&mut self) -> Result<(), SessionError> {
        let _ = self.with_template(Template::reset);
        if let Some(controller) = &mut self.controller {
            controller.pre_test(0);
        }
        for monitor in &mut self.monitors {
            monitor.pre_test(0);
        }
        self.target.pre_test(0);
        let triggered = self.target.trigger();
        self.target.post_test(0);
        for monitor in self.monitors.iter_mut().rev() {
            monitor.post_test();
        }
        if let Some(controller) = &mut self.controller {
            controller.post_test();
        }
        let mut report = self.target.get_report();
        if let Err(e) = triggered {
            report.set_error(e.to_string());
        }
        if report.status() != Status::Passed {
            return Err(SessionError::EnvironmentNotReady(
                report
                    .reason()
                    .unwrap_or("environment test did not pass")
                    .to_string(),
            ));
        }
        Ok(())
    }
}
