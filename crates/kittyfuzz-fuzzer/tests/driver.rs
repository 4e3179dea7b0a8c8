//! Driver loop behavior against scripted mock targets: call ordering,
//! failure accounting, stop conditions, resume, and session compatibility.

use kittyfuzz_data::{JsonFileStore, MemoryStore, Report, SessionInfo, SessionStore, Status};
use kittyfuzz_fuzzer::{
    ClientFuzzer, FuzzerConfig, ServerFuzzer, SessionError, STAGE_ANY,
};
use kittyfuzz_model::{Container, Group, Template};
use kittyfuzz_target::{ClientTarget, ServerTarget, Target, TargetError};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn small_template() -> Template {
    // Ten deterministic mutations.
    Template::new(
        "small",
        Container::new(vec![Group::new(["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"])
            .with_name("digit")
            .into()]),
    )
    .expect("valid template")
}

/// Shared journal of everything a mock target observed.
#[derive(Debug, Default)]
struct Journal {
    calls: Vec<String>,
    payloads: Vec<Vec<u8>>,
}

type SharedJournal = Arc<Mutex<Journal>>;

struct MockServerTarget {
    journal: SharedJournal,
    fail_on: HashSet<u64>,
    io_error_on: HashSet<u64>,
    error_counts_as_failure: bool,
    current_test: u64,
    report: Report,
}

impl MockServerTarget {
    fn new(journal: SharedJournal) -> Self {
        MockServerTarget {
            journal,
            fail_on: HashSet::new(),
            io_error_on: HashSet::new(),
            error_counts_as_failure: true,
            current_test: 0,
            report: Report::new("target"),
        }
    }

    fn fail_on(mut self, indices: impl IntoIterator<Item = u64>) -> Self {
        self.fail_on = indices.into_iter().collect();
        self
    }

    fn io_error_on(mut self, indices: impl IntoIterator<Item = u64>) -> Self {
        self.io_error_on = indices.into_iter().collect();
        self
    }

    fn benign_io_errors(mut self) -> Self {
        self.error_counts_as_failure = false;
        self
    }

    fn log(&self, entry: String) {
        self.journal.lock().expect("journal lock").calls.push(entry);
    }
}

impl Target for MockServerTarget {
    fn description(&self) -> String {
        "mock server target".to_string()
    }

    fn setup(&mut self) -> Result<(), TargetError> {
        self.log("setup".to_string());
        Ok(())
    }

    fn teardown(&mut self) {
        self.log("teardown".to_string());
    }

    fn pre_test(&mut self, test_index: u64) {
        self.current_test = test_index;
        self.report = Report::new("target");
        self.log(format!("pre_test {test_index}"));
    }

    fn post_test(&mut self, test_index: u64) {
        self.log(format!("post_test {test_index}"));
    }

    fn get_report(&mut self) -> Report {
        if self.fail_on.contains(&self.current_test) {
            self.report.set_failed("scripted failure");
        }
        self.report.clone()
    }

    fn error_is_failure(&self) -> bool {
        self.error_counts_as_failure
    }
}

impl ServerTarget for MockServerTarget {
    fn transmit(&mut self, payload: &[u8]) -> Result<Vec<u8>, TargetError> {
        self.journal
            .lock()
            .expect("journal lock")
            .payloads
            .push(payload.to_vec());
        if self.io_error_on.contains(&self.current_test) {
            return Err(TargetError::other("scripted io error"));
        }
        Ok(Vec::new())
    }
}

fn journal() -> SharedJournal {
    Arc::new(Mutex::new(Journal::default()))
}

#[test]
fn vanilla_session_walks_the_whole_range() {
    init_logging();
    let journal = journal();
    let mut fuzzer = ServerFuzzer::new(small_template(), MockServerTarget::new(journal.clone()));
    let summary = fuzzer.run().expect("session runs");
    assert_eq!(summary.tests_run, 10);
    assert_eq!(summary.failure_count, 0);
    assert!(!summary.stopped_early);

    let log = journal.lock().expect("journal lock");
    // setup + env test pre/post + 10 test pre/post pairs + teardown.
    assert_eq!(log.calls.first().map(String::as_str), Some("setup"));
    assert_eq!(log.calls.last().map(String::as_str), Some("teardown"));
    let pre_count = log.calls.iter().filter(|c| c.starts_with("pre_test")).count();
    assert_eq!(pre_count, 11);
    // Env test transmits the default rendering first.
    assert_eq!(log.payloads[0], b"0");
    // Then every mutation: the Group walks its values in order.
    assert_eq!(log.payloads.len(), 11);
    assert_eq!(log.payloads[1], b"0");
    assert_eq!(log.payloads[10], b"9");
}

#[test]
fn failures_are_counted_and_stored() {
    let journal = journal();
    let target = MockServerTarget::new(journal.clone()).fail_on([2, 5]);
    let mut fuzzer = ServerFuzzer::new(small_template(), target);
    let summary = fuzzer.run().expect("session runs");
    assert_eq!(summary.tests_run, 10);
    assert_eq!(summary.failure_count, 2);

    let stored = fuzzer.store().report_indices().expect("indices");
    assert_eq!(stored, vec![2, 5]);
    let report = fuzzer.store().report(2).expect("read").expect("present");
    assert_eq!(report.status(), Status::Failed);
    assert_eq!(report.reason(), Some("scripted failure"));
    assert!(report.get("payload").is_some());
    assert!(report.get("test_number").is_some());
}

#[test]
fn max_failures_stops_the_session() {
    let journal = journal();
    let target = MockServerTarget::new(journal.clone()).fail_on([1, 3, 5, 7]);
    let mut config = FuzzerConfig::default();
    config.max_failures = Some(2);
    let mut fuzzer = ServerFuzzer::new(small_template(), target).with_config(config);
    let summary = fuzzer.run().expect("session runs");
    assert!(summary.stopped_early);
    assert_eq!(summary.failure_count, 2);
    // Stopped right after the second failure (index 3).
    assert_eq!(summary.last_index, Some(3));
    // Teardown still ran.
    assert_eq!(
        journal.lock().expect("journal lock").calls.last().map(String::as_str),
        Some("teardown")
    );
}

#[test]
fn transport_errors_recorded_and_policy_controlled() {
    // Policy: errors count as failures (the default).
    let target = MockServerTarget::new(journal()).io_error_on([4]);
    let mut fuzzer = ServerFuzzer::new(small_template(), target);
    let summary = fuzzer.run().expect("session runs");
    assert_eq!(summary.failure_count, 1);
    let report = fuzzer.store().report(4).expect("read").expect("present");
    assert_eq!(report.status(), Status::Error);

    // Policy: errors are benign; recorded but not counted.
    let target = MockServerTarget::new(journal()).io_error_on([4]).benign_io_errors();
    let mut fuzzer = ServerFuzzer::new(small_template(), target);
    let summary = fuzzer.run().expect("session runs");
    assert_eq!(summary.failure_count, 0);
    let report = fuzzer.store().report(4).expect("read").expect("present");
    assert_eq!(report.status(), Status::Error);
}

#[test]
fn environment_test_failure_aborts() {
    let journal = journal();
    // Failing test 0 fails the environment test itself.
    let target = MockServerTarget::new(journal.clone()).fail_on([0]);
    let mut fuzzer = ServerFuzzer::new(small_template(), target);
    let err = fuzzer.run();
    assert!(matches!(err, Err(SessionError::EnvironmentNotReady(_))));
    let log = journal.lock().expect("journal lock");
    // Only the environment iteration ran, and teardown still happened.
    assert_eq!(log.payloads.len(), 1);
    assert!(log.calls.iter().any(|c| c == "teardown"));
}

#[test]
fn skipping_environment_test_runs_the_failing_index() {
    let target = MockServerTarget::new(journal()).fail_on([0]);
    let mut config = FuzzerConfig::default();
    config.skip_env_test = true;
    let mut fuzzer = ServerFuzzer::new(small_template(), target).with_config(config);
    let summary = fuzzer.run().expect("session runs");
    assert_eq!(summary.tests_run, 10);
    assert_eq!(summary.failure_count, 1);
}

#[test]
fn range_limits_respected() {
    let journal = journal();
    let mut config = FuzzerConfig::default();
    config.start_index = 3;
    config.end_index = Some(6);
    config.skip_env_test = true;
    let mut fuzzer = ServerFuzzer::new(small_template(), MockServerTarget::new(journal.clone()))
        .with_config(config);
    let summary = fuzzer.run().expect("session runs");
    assert_eq!(summary.tests_run, 4);
    let log = journal.lock().expect("journal lock");
    assert_eq!(
        log.payloads,
        vec![b"3".to_vec(), b"4".to_vec(), b"5".to_vec(), b"6".to_vec()]
    );
}

#[test]
fn test_list_walks_sparse_indices() {
    let journal = journal();
    let mut config = FuzzerConfig::default();
    config.test_list = Some("1,4-6,9".to_string());
    config.skip_env_test = true;
    let mut fuzzer = ServerFuzzer::new(small_template(), MockServerTarget::new(journal.clone()))
        .with_config(config);
    let summary = fuzzer.run().expect("session runs");
    assert_eq!(summary.tests_run, 5);
    let log = journal.lock().expect("journal lock");
    assert_eq!(
        log.payloads,
        vec![b"1".to_vec(), b"4".to_vec(), b"5".to_vec(), b"6".to_vec(), b"9".to_vec()]
    );
}

#[test]
fn session_resumes_from_stored_index() {
    init_logging();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("session.json");

    // First run covers 0..=4.
    let journal1 = journal();
    let mut config = FuzzerConfig::default();
    config.end_index = Some(4);
    config.skip_env_test = true;
    let mut first = ServerFuzzer::new(small_template(), MockServerTarget::new(journal1.clone()))
        .with_config(config.clone())
        .with_store(JsonFileStore::new(&path));
    let summary = first.run().expect("first run");
    assert_eq!(summary.tests_run, 5);

    // Second run resumes at the stored index (re-running the last test).
    let journal2 = journal();
    let mut second = ServerFuzzer::new(small_template(), MockServerTarget::new(journal2.clone()))
        .with_config(config)
        .with_store(JsonFileStore::new(&path));
    let summary = second.run().expect("second run");
    assert_eq!(summary.tests_run, 1);
    assert_eq!(
        journal2.lock().expect("journal lock").payloads,
        vec![b"4".to_vec()]
    );
}

#[test]
fn incompatible_session_rejected_before_target_interaction() {
    let journal = journal();
    let mut store = MemoryStore::new();
    store
        .set_session_info(&SessionInfo {
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            template_hash: 0x1bad_c0de,
            start_index: 5,
            current_index: 5,
            end_index: None,
            start_time: 0,
            failure_count: 0,
            test_list: None,
        })
        .expect("stores");

    let mut fuzzer = ServerFuzzer::new(small_template(), MockServerTarget::new(journal.clone()))
        .with_store(store);
    let err = fuzzer.run();
    assert!(matches!(err, Err(SessionError::SessionIncompatible(_))));
    // The target was never touched.
    assert!(journal.lock().expect("journal lock").calls.is_empty());
}

#[test]
fn store_all_reports_keeps_passing_tests() {
    let mut config = FuzzerConfig::default();
    config.store_all_reports = true;
    config.skip_env_test = true;
    config.end_index = Some(2);
    let mut fuzzer =
        ServerFuzzer::new(small_template(), MockServerTarget::new(journal())).with_config(config);
    fuzzer.run().expect("session runs");
    assert_eq!(fuzzer.store().report_indices().expect("indices"), vec![0, 1, 2]);
}

// ---------------------------------------------------------------------------
// Client mode
// ---------------------------------------------------------------------------

type ProviderSlot = Arc<Mutex<Option<kittyfuzz_fuzzer::MutationProvider>>>;

/// A client SUT stand-in: on trigger it asks the driver for the payload of
/// its protocol stage. The provider is injected after the fuzzer exists.
struct MockClientTarget {
    provider: ProviderSlot,
    stage: String,
    served: Arc<Mutex<Vec<Option<Vec<u8>>>>>,
    report: Report,
}

impl MockClientTarget {
    fn new(
        provider: ProviderSlot,
        stage: impl Into<String>,
        served: Arc<Mutex<Vec<Option<Vec<u8>>>>>,
    ) -> Self {
        MockClientTarget {
            provider,
            stage: stage.into(),
            served,
            report: Report::new("target"),
        }
    }
}

impl Target for MockClientTarget {
    fn pre_test(&mut self, _test_index: u64) {
        self.report = Report::new("target");
    }

    fn post_test(&mut self, _test_index: u64) {}

    fn get_report(&mut self) -> Report {
        self.report.clone()
    }
}

impl ClientTarget for MockClientTarget {
    fn trigger(&mut self) -> Result<(), TargetError> {
        let payload = self
            .provider
            .lock()
            .expect("provider lock")
            .as_ref()
            .and_then(|p| p.get_mutation(&self.stage, &HashMap::new()));
        self.served.lock().expect("served lock").push(payload);
        Ok(())
    }
}

fn client_fuzzer(stage: &str, end: u64) -> (ClientFuzzer, Arc<Mutex<Vec<Option<Vec<u8>>>>>) {
    let served = Arc::new(Mutex::new(Vec::new()));
    let slot: ProviderSlot = Arc::new(Mutex::new(None));
    let target = MockClientTarget::new(Arc::clone(&slot), stage, Arc::clone(&served));
    let mut config = FuzzerConfig::default();
    config.skip_env_test = true;
    config.end_index = Some(end);
    let fuzzer = ClientFuzzer::new(small_template(), target).with_config(config);
    *slot.lock().expect("provider lock") = Some(fuzzer.provider());
    (fuzzer, served)
}

#[test]
fn client_driver_serves_matching_stage() {
    let (mut fuzzer, served) = client_fuzzer("digit", 2);
    let summary = fuzzer.run().expect("client session runs");
    assert_eq!(summary.tests_run, 3);
    let served = served.lock().expect("served lock");
    assert_eq!(served.len(), 3);
    assert_eq!(served[0], Some(b"0".to_vec()));
    assert_eq!(served[2], Some(b"2".to_vec()));
}

#[test]
fn client_stage_match_is_case_insensitive() {
    let (mut fuzzer, served) = client_fuzzer("DIGIT", 0);
    fuzzer.run().expect("client session runs");
    assert_eq!(
        served.lock().expect("served lock").as_slice(),
        &[Some(b"0".to_vec())]
    );
}

#[test]
fn client_provider_rejects_wrong_stage() {
    let (mut fuzzer, served) = client_fuzzer("not-the-field", 1);
    let summary = fuzzer.run().expect("client session runs");
    assert_eq!(summary.tests_run, 2);
    let served = served.lock().expect("served lock");
    assert_eq!(served.as_slice(), &[None, None]);
}

#[test]
fn stage_any_always_matches() {
    let (mut fuzzer, served) = client_fuzzer(STAGE_ANY, 0);
    let summary = fuzzer.run().expect("client session runs");
    assert_eq!(summary.tests_run, 1);
    assert_eq!(
        served.lock().expect("served lock").as_slice(),
        &[Some(b"0".to_vec())]
    );
}
