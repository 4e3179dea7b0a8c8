//! The server-mode session driver: push every rendering at the target.

use crate::config::FuzzerConfig;
use crate::error::SessionError;
use crate::pause::{PauseGate, ShutdownFlag};
use crate::session::{now_unix, validate_or_init, SessionSummary};
use crate::test_list::{RangesList, StartEndList, TestList};
use kittyfuzz_data::{JsonFileStore, MemoryStore, Report, SessionInfo, SessionStore, Status};
use kittyfuzz_model::Template;
use kittyfuzz_target::{Controller, Monitor, ServerTarget, Target};

/// Drives the mutation stream against a [`ServerTarget`]: for each index,
/// pre-test, render, transmit, post-test, collect and judge the report,
/// persist progress; honouring pause, delay, max-failures and resume.
pub struct ServerFuzzer {
    template: Template,
    target: Box<dyn ServerTarget>,
    controller: Option<Box<dyn Controller>>,
    monitors: Vec<Box<dyn Monitor>>,
    store: Box<dyn SessionStore>,
    default_store: bool,
    config: FuzzerConfig,
    session: SessionInfo,
    pause: PauseGate,
    shutdown: ShutdownFlag,
    last_payload: Option<Vec<u8>>,
}

impl ServerFuzzer {
    /// A driver over an in-memory session store and default configuration.
    #[must_use]
    pub fn new(template: Template, target: impl ServerTarget + 'static) -> Self {
        ServerFuzzer {
            template,
            target: Box::new(target),
            controller: None,
            monitors: Vec::new(),
            store: Box::new(MemoryStore::new()),
            default_store: true,
            config: FuzzerConfig::default(),
            session: SessionInfo::default(),
            pause: PauseGate::new(),
            shutdown: ShutdownFlag::new(),
            last_payload: None,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: FuzzerConfig) -> Self {
        self.config = config;
        self
    }

    /// Parse and apply a driver option line.
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

    /// Gate other threads can pause/resume the driver through.
    #[must_use]
    pub fn pause_gate(&self) -> PauseGate {
        self.pause.clone()
    }

    /// Flag a host wires to SIGINT for a clean cooperative stop.
    #[must_use]
    pub fn shutdown_flag(&self) -> ShutdownFlag {
        self.shutdown.clone()
    }

    /// The session record as of the last completed test.
    #[must_use]
    pub fn session_info(&self) -> &SessionInfo {
        &self.session
    }

    /// Borrow the session store (report retrieval after a run).
    #[must_use]
    pub fn store(&self) -> &dyn SessionStore {
        self.store.as_ref()
    }

    /// Run the session to completion (or clean early stop).
    pub fn run(&mut self) -> Result<SessionSummary, SessionError> {
        if self.default_store {
            if let Some(path) = &self.config.session_path {
                self.store = Box::new(JsonFileStore::new(path.clone()));
                self.default_store = false;
            }
        }
        self.store.start()?;
        let stored = self.store.session_info()?;
        self.session = validate_or_init(stored, self.template.hash(), &self.config)?;

        let Some(last) = self.template.last_index() else {
            log::warn!("template has no mutations, nothing to fuzz");
            return Ok(SessionSummary {
                tests_run: 0,
                failure_count: 0,
                last_index: None,
                stopped_early: false,
            });
        };
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
            "starting fuzzing session against {}: {} mutations total, walking {} tests from index {}",
            self.target.description(),
            self.template.num_mutations(),
            list.count(),
            self.session.current_index,
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

        if let Ok(summary) = &result {
            log::info!(
                "finished fuzzing session: {} tests, {} failures",
                summary.tests_run,
                summary.failure_count
            );
        }
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
        self.template.reset();

        let mut tests_run = 0u64;
        let mut last_index = None;
        let mut stopped_early = false;
        while let Some(index) = list.current() {
            if self.shutdown.is_set() {
                log::info!("shutdown requested, stopping after test boundary");
                stopped_early = true;
                break;
            }
            self.pause.wait();
            if let Some(max) = self.config.max_failures {
                if self.session.failure_count >= max {
                    log::info!("reached the failure budget ({max}), stopping");
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

    /// Move the template to mutation `index`, re-deriving from scratch when
    /// the stream has to move backwards (sparse test lists, resume).
    fn position_at(&mut self, index: u64) -> bool {
        let current = self.template.current_index();
        if current >= 0 && current as u64 >= index {
            self.template.reset();
        }
        let needed = (index as i64 - self.template.current_index()) as u64;
        self.template.skip(needed) == needed
    }

    fn run_one(&mut self, index: u64) -> Result<(), SessionError> {
        self.session.current_index = index;
        if let Some(controller) = &mut self.controller {
            controller.pre_test(index);
        }
        for monitor in &mut self.monitors {
            monitor.pre_test(index);
        }
        self.target.pre_test(index);

        let payload = self.template.render_bytes();
        let transmitted = self.target.transmit(&payload);
        self.last_payload = Some(payload);

        self.target.post_test(index);
        for monitor in self.monitors.iter_mut().rev() {
            monitor.post_test();
        }
        if let Some(controller) = &mut self.controller {
            controller.post_test();
        }

        let mut report = self.target.get_report();
        match transmitted {
            Ok(response) => {
                if !response.is_empty() {
                    report.add("response", response);
                }
            }
            Err(e) => report.set_error(e.to_string()),
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
            log::debug!("delaying for {:?}", self.config.delay);
            std::thread::sleep(self.config.delay);
        }
        Ok(())
    }

    fn store_report(&mut self, index: u64, mut report: Report) -> Result<(), SessionError> {
        report.add("test_number", index);
        let info = self.template.get_info();
        if let Some(path) = info["field"]["path"].as_str() {
            report.add("fuzz_path", path.to_string());
        }
        if let Some(payload) = &self.last_payload {
            let mut payload_report = Report::new("payload");
            payload_report.add("hex", hex::encode(payload));
            payload_report.add("length", payload.len() as u64);
            report.add_sub_report(payload_report);
        }
        self.store.store_report(index, &report)?;
        Ok(())
    }

    /// One pristine default-render iteration before fuzzing starts; a
    /// non-passing report aborts the session.
    fn environment_test(&mut self) -> Result<(), SessionError> {
        if let Some(controller) = &mut self.controller {
            controller.pre_test(0);
        }
        for monitor in &mut self.monitors {
            monitor.pre_test(0);
        }
        self.target.pre_test(0);

        self.template.reset();
        let payload = self.template.render_bytes();
        let transmitted = self.target.transmit(&payload);

        self.target.post_test(0);
        for monitor in self.monitors.iter_mut().rev() {
            monitor.post_test();
        }
        if let Some(controller) = &mut self.controller {
            controller.post_test();
        }

        let mut report = self.target.get_report();
        if let Err(e) = transmitted {
            report.set_error(e.to_string());
        }
        if let Some(controller) = &mut self.controller {
            report.add_sub_report(controller.get_report());
        }
        for monitor in &mut self.monitors {
            report.add_sub_report(monitor.get_report());
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
