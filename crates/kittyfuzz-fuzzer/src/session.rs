//! Session bookkeeping shared by the drivers.

use crate::config::FuzzerConfig;
use crate::error::SessionError;
use kittyfuzz_data::SessionInfo;
use std::time::{SystemTime, UNIX_EPOCH};

/// Engine version stamped into stored sessions.
pub(crate) const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub(crate) fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Accept a stored session only when both the engine version and the
/// template hash match; otherwise refuse before any target interaction.
pub(crate) fn validate_or_init(
    stored: Option<SessionInfo>,
    template_hash: u64,
    config: &FuzzerConfig,
) -> Result<SessionInfo, SessionError> {
    match stored {
        Some(info) => {
            if info.engine_version != ENGINE_VERSION {
                return Err(SessionError::SessionIncompatible(format!(
                    "engine version in stored session ({}) != current engine version ({})",
                    info.engine_version, ENGINE_VERSION
                )));
            }
            if info.template_hash != template_hash {
                return Err(SessionError::SessionIncompatible(format!(
                    "template hash in stored session ({:016x}) != current template hash ({:016x})",
                    info.template_hash, template_hash
                )));
            }
            log::info!("loaded stored session at index {}", info.current_index);
            Ok(info)
        }
        None => Ok(SessionInfo {
            engine_version: ENGINE_VERSION.to_string(),
            template_hash,
            start_index: config.start_index,
            current_index: config.start_index,
            end_index: config.end_index,
            start_time: now_unix(),
            failure_count: 0,
            test_list: config.test_list.clone(),
        }),
    }
}

/// Summary of a finished (or cleanly stopped) fuzzing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    /// Tests actually executed in this run.
    pub tests_run: u64,
    /// Failures across the whole session, stored runs included.
    pub failure_count: u64,
    /// Last index executed in this run, if any.
    pub last_index: Option<u64>,
    /// True when the run stopped on shutdown or the failure budget rather
    /// than by exhausting its test list.
    pub stopped_early: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(hash: u64, version: &str) -> SessionInfo {
        SessionInfo {
            engine_version: version.to_string(),
            template_hash: hash,
            start_index: 0,
            current_index: 5,
            end_index: Some(9),
            start_time: 1,
            failure_count: 0,
            test_list: None,
        }
    }

    #[test]
    fn fresh_session_uses_config_range() {
        let mut config = FuzzerConfig::default();
        config.start_index = 3;
        config.end_index = Some(8);
        let info = validate_or_init(None, 0xabc, &config).expect("fresh session");
        assert_eq!(info.template_hash, 0xabc);
        assert_eq!(info.start_index, 3);
        assert_eq!(info.current_index, 3);
        assert_eq!(info.end_index, Some(8));
    }

    #[test]
    fn matching_session_is_resumed() {
        let info = validate_or_init(
            Some(stored(7, ENGINE_VERSION)),
            7,
            &FuzzerConfig::default(),
        )
        .expect("resumes");
        assert_eq!(info.current_index, 5);
    }

    #[test]
    fn hash_mismatch_is_rejected() {
        let err = validate_or_init(
            Some(stored(7, ENGINE_VERSION)),
            8,
            &FuzzerConfig::default(),
        );
        assert!(matches!(err, Err(SessionError::SessionIncompatible(_))));
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let err = validate_or_init(Some(stored(7, "9.9.9")), 7, &FuzzerConfig::default());
        assert!(matches!(err, Err(SessionError::SessionIncompatible(_))));
    }
}
