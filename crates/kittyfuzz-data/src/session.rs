//! The persisted session record.

use serde::{Deserialize, Serialize};

/// Progress of a fuzzing session, persisted between runs. The template
/// hash guards compatibility: a stored session whose hash differs from the
/// live template must be rejected before any target interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SessionInfo {
    /// Engine version that wrote the record.
    pub engine_version: String,
    /// Hash of the template the session walks.
    pub template_hash: u64,
    /// First index of the run.
    pub start_index: u64,
    /// Last completed index; `start_index` when nothing ran yet.
    pub current_index: u64,
    /// Last index to run, inclusive.
    pub end_index: Option<u64>,
    /// Unix timestamp of the session start, seconds.
    pub start_time: u64,
    /// Number of failures detected so far.
    pub failure_count: u64,
    /// Test-list expression the session was started with, if any.
    pub test_list: Option<String>,
}
