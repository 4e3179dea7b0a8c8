//! Session stores: opaque key/value persistence for session progress and
//! reports. In-memory for throwaway runs, a JSON file for resumable ones.

use crate::report::Report;
use crate::session::SessionInfo;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure talking to a session store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("session store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// The persistence contract the driver consumes. Implementations may hold
/// everything in memory or on disk; the engine never sees the difference.
pub trait SessionStore {
    /// Prepare the store for use (open/load as needed).
    fn start(&mut self) -> Result<(), StoreError>;
    /// The stored session record, if any.
    fn session_info(&self) -> Result<Option<SessionInfo>, StoreError>;
    /// Replace the stored session record.
    fn set_session_info(&mut self, info: &SessionInfo) -> Result<(), StoreError>;
    /// Store a report under its test index.
    fn store_report(&mut self, test_index: u64, report: &Report) -> Result<(), StoreError>;
    /// Fetch a stored report.
    fn report(&self, test_index: u64) -> Result<Option<Report>, StoreError>;
    /// Indices of all stored reports, ascending.
    fn report_indices(&self) -> Result<Vec<u64>, StoreError>;
    /// Free-form value lookup.
    fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;
    /// Free-form value storage.
    fn set(&mut self, key: &str, value: serde_json::Value) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    session: Option<SessionInfo>,
    reports: BTreeMap<u64, Report>,
    values: BTreeMap<String, serde_json::Value>,
}

/// A store that lives and dies with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: StoreState,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

impl SessionStore for MemoryStore {
    fn start(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    fn session_info(&self) -> Result<Option<SessionInfo>, StoreError> {
        Ok(self.state.session.clone())
    }

    fn set_session_info(&mut self, info: &SessionInfo) -> Result<(), StoreError> {
        self.state.session = Some(info.clone());
        Ok(())
    }

    fn store_report(&mut self, test_index: u64, report: &Report) -> Result<(), StoreError> {
        self.state.reports.insert(test_index, report.clone());
        Ok(())
    }

    fn report(&self, test_index: u64) -> Result<Option<Report>, StoreError> {
        Ok(self.state.reports.get(&test_index).cloned())
    }

    fn report_indices(&self) -> Result<Vec<u64>, StoreError> {
        Ok(self.state.reports.keys().copied().collect())
    }

    fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self.state.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
        self.state.values.insert(key.to_string(), value);
        Ok(())
    }
}

/// A store persisted as one JSON document, written via a sibling temp file
/// and an atomic rename.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    state: StoreState,
}

impl JsonFileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileStore {
            path: path.into(),
            state: StoreState::default(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StoreError> {
        let serialized = serde_json::to_vec_pretty(&self.state)?;
        let tmp = self.path.with_extension("tmp");
        {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(&serialized)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SessionStore for JsonFileStore {
    fn start(&mut self) -> Result<(), StoreError> {
        if self.path.exists() {
            let data = std::fs::read_to_string(&self.path)?;
            self.state = serde_json::from_str(&data)?;
        }
        Ok(())
    }

    fn session_info(&self) -> Result<Option<SessionInfo>, StoreError> {
        Ok(self.state.session.clone())
    }

    fn set_session_info(&mut self, info: &SessionInfo) -> Result<(), StoreError> {
        self.state.session = Some(info.clone());
        self.flush()
    }

    fn store_report(&mut self, test_index: u64, report: &Report) -> Result<(), StoreError> {
        self.state.reports.insert(test_index, report.clone());
        self.flush()
    }

    fn report(&self, test_index: u64) -> Result<Option<Report>, StoreError> {
        Ok(self.state.reports.get(&test_index).cloned())
    }

    fn report_indices(&self) -> Result<Vec<u64>, StoreError> {
        Ok(self.state.reports.keys().copied().collect())
    }

    fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self.state.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
        self.state.values.insert(key.to_string(), value);
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_info() -> SessionInfo {
        SessionInfo {
            engine_version: "0.1.0".to_string(),
            template_hash: 42,
            start_index: 0,
            current_index: 3,
            end_index: Some(10),
            start_time: 1,
            failure_count: 1,
            test_list: None,
        }
    }

    #[test]
    fn memory_store_round_trips() {
        let mut store = MemoryStore::new();
        store.start().expect("starts");
        assert!(store.session_info().expect("reads").is_none());
        store.set_session_info(&sample_info()).expect("writes");
        assert_eq!(store.session_info().expect("reads"), Some(sample_info()));

        store
            .store_report(3, &Report::failed("target", "boom"))
            .expect("stores");
        assert_eq!(store.report_indices().expect("lists"), vec![3]);
        assert!(store.report(3).expect("reads").is_some());
        assert!(store.report(4).expect("reads").is_none());

        store.set("stages", serde_json::json!(["a", "b"])).expect("sets");
        assert_eq!(
            store.get("stages").expect("gets"),
            Some(serde_json::json!(["a", "b"]))
        );
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.json");

        let mut store = JsonFileStore::new(&path);
        store.start().expect("starts");
        store.set_session_info(&sample_info()).expect("writes");
        store
            .store_report(7, &Report::failed("target", "crash"))
            .expect("stores");
        drop(store);

        let mut reopened = JsonFileStore::new(&path);
        reopened.start().expect("starts");
        assert_eq!(reopened.session_info().expect("reads"), Some(sample_info()));
        let report = reopened.report(7).expect("reads").expect("present");
        assert_eq!(report.reason(), Some("crash"));
    }

    #[test]
    fn file_store_empty_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = JsonFileStore::new(dir.path().join("nope.json"));
        store.start().expect("starts");
        assert!(store.session_info().expect("reads").is_none());
    }
}
