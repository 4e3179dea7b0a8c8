//! Test reports: a named tree of key/value entries with an overall status.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome of a single test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Passed,
    Failed,
    Error,
}

/// One report entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Bytes(Vec<u8>),
    Sub(Report),
}

impl From<&str> for ReportValue {
    fn from(s: &str) -> Self {
        ReportValue::Str(s.to_string())
    }
}

impl From<String> for ReportValue {
    fn from(s: String) -> Self {
        ReportValue::Str(s)
    }
}

impl From<i64> for ReportValue {
    fn from(v: i64) -> Self {
        ReportValue::Int(v)
    }
}

impl From<u64> for ReportValue {
    fn from(v: u64) -> Self {
        ReportValue::Int(v as i64)
    }
}

impl From<f64> for ReportValue {
    fn from(v: f64) -> Self {
        ReportValue::Float(v)
    }
}

impl From<bool> for ReportValue {
    fn from(v: bool) -> Self {
        ReportValue::Bool(v)
    }
}

impl From<Vec<u8>> for ReportValue {
    fn from(v: Vec<u8>) -> Self {
        ReportValue::Bytes(v)
    }
}

impl From<Report> for ReportValue {
    fn from(r: Report) -> Self {
        ReportValue::Sub(r)
    }
}

/// A structured tree of key/value pairs describing one test, with a
/// status and a failure reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    name: String,
    status: Status,
    reason: Option<String>,
    entries: BTreeMap<String, ReportValue>,
}

impl Default for Report {
    fn default() -> Self {
        Report::new("report")
    }
}

impl Report {
    /// A fresh passing report.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Report {
            name: name.into(),
            status: Status::Passed,
            reason: None,
            entries: BTreeMap::new(),
        }
    }

    /// A failed report with a reason.
    #[must_use]
    pub fn failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut r = Report::new(name);
        r.set_failed(reason);
        r
    }

    /// An errored report with a reason.
    #[must_use]
    pub fn error(name: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut r = Report::new(name);
        r.set_error(reason);
        r
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Add or replace an entry.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<ReportValue>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Look up an entry.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ReportValue> {
        self.entries.get(key)
    }

    /// Mark failed; failure outranks an earlier error-free state but an
    /// `Error` status is kept (it is the stronger verdict).
    pub fn set_failed(&mut self, reason: impl Into<String>) {
        if self.status != Status::Error {
            self.status = Status::Failed;
        }
        self.reason = Some(reason.into());
    }

    /// Mark errored.
    pub fn set_error(&mut self, reason: impl Into<String>) {
        self.status = Status::Error;
        self.reason = Some(reason.into());
    }

    /// Attach a sub-report, absorbing its verdict: a failed or errored
    /// child marks this report too.
    pub fn add_sub_report(&mut self, sub: Report) {
        match sub.status {
            Status::Passed => {}
            Status::Failed => {
                let reason = sub
                    .reason
                    .clone()
                    .unwrap_or_else(|| format!("{} failed", sub.name));
                self.set_failed(reason);
            }
            Status::Error => {
                let reason = sub
                    .reason
                    .clone()
                    .unwrap_or_else(|| format!("{} errored", sub.name));
                self.set_error(reason);
            }
        }
        self.entries
            .insert(sub.name.clone(), ReportValue::Sub(sub));
    }

    /// Serialize to a JSON value.
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_report_passes() {
        let r = Report::new("target");
        assert_eq!(r.status(), Status::Passed);
        assert!(r.reason().is_none());
    }

    #[test]
    fn failure_carries_reason() {
        let mut r = Report::new("target");
        r.set_failed("crashed");
        assert_eq!(r.status(), Status::Failed);
        assert_eq!(r.reason(), Some("crashed"));
    }

    #[test]
    fn error_outranks_failure() {
        let mut r = Report::new("target");
        r.set_error("io");
        r.set_failed("later");
        assert_eq!(r.status(), Status::Error);
    }

    #[test]
    fn sub_report_propagates_failure() {
        let mut r = Report::new("target");
        r.add("response", "ok");
        r.add_sub_report(Report::failed("monitor", "no heartbeat"));
        assert_eq!(r.status(), Status::Failed);
        assert_eq!(r.reason(), Some("no heartbeat"));
        assert!(matches!(r.get("monitor"), Some(ReportValue::Sub(_))));
    }

    #[test]
    fn json_round_trip() {
        let mut r = Report::new("target");
        r.add("count", 7i64);
        r.add("payload", vec![1u8, 2, 3]);
        r.add_sub_report(Report::new("controller"));
        let json = serde_json::to_string(&r).expect("serializes");
        let back: Report = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(back, r);
    }
}
