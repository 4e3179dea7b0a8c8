//! Driver configuration, including the single-line option string hosts
//! pass through from their own command lines.

use crate::error::SessionError;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Options accepted on the fuzzer option line.
///
/// This is not the host program's CLI; it is the one-line escape hatch
/// for driving the fuzzer object itself, so runners need not re-plumb
/// every knob.
#[derive(Debug, Parser)]
#[command(name = "fuzzer", no_binary_name = true, disable_help_flag = true)]
struct OptionLine {
    /// Delay between tests, in seconds.
    #[arg(long, short = 'd')]
    delay: Option<f64>,
    /// First mutation index to run.
    #[arg(long, short = 's')]
    start: Option<u64>,
    /// Last mutation index to run (inclusive); ignored when a stored
    /// session supplies one.
    #[arg(long, short = 'e')]
    end: Option<u64>,
    /// Session file to keep state between runs.
    #[arg(long, short = 'f')]
    session: Option<PathBuf>,
    /// Skip the environment test before the fuzzing loop.
    #[arg(long = "no-env-test", short = 'n')]
    no_env_test: bool,
    /// Stop cleanly after this many failures.
    #[arg(long)]
    max_failures: Option<u64>,
    /// Store every report, not only failing ones.
    #[arg(long)]
    store_all_reports: bool,
    /// Test list expression, e.g. "1,3-5,7-".
    #[arg(long)]
    test_list: Option<String>,
}

/// Resolved driver configuration.
#[derive(Debug, Clone)]
pub struct FuzzerConfig {
    pub delay: Duration,
    pub start_index: u64,
    pub end_index: Option<u64>,
    pub session_path: Option<PathBuf>,
    pub skip_env_test: bool,
    pub max_failures: Option<u64>,
    pub store_all_reports: bool,
    pub test_list: Option<String>,
}

impl Default for FuzzerConfig {
    fn default() -> Self {
        FuzzerConfig {
            delay: Duration::ZERO,
            start_index: 0,
            end_index: None,
            session_path: None,
            skip_env_test: false,
            max_failures: None,
            store_all_reports: false,
            test_list: None,
        }
    }
}

impl FuzzerConfig {
    /// Parse an option line. Unknown options fail construction.
    pub fn from_option_line(line: &str) -> Result<Self, SessionError> {
        let parsed = OptionLine::try_parse_from(line.split_whitespace())
            .map_err(|e| SessionError::Config(e.to_string()))?;
        let mut config = FuzzerConfig::default();
        if let Some(delay) = parsed.delay {
            if !delay.is_finite() || delay < 0.0 {
                return Err(SessionError::Config(format!(
                    "delay must be a non-negative number of seconds, got {delay}"
                )));
            }
            config.delay = Duration::from_secs_f64(delay);
        }
        if let Some(start) = parsed.start {
            config.start_index = start;
        }
        config.end_index = parsed.end;
        config.session_path = parsed.session;
        config.skip_env_test = parsed.no_env_test;
        config.max_failures = parsed.max_failures;
        config.store_all_reports = parsed.store_all_reports;
        config.test_list = parsed.test_list;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_line_is_default() {
        let config = FuzzerConfig::from_option_line("").expect("parses");
        assert_eq!(config.delay, Duration::ZERO);
        assert_eq!(config.start_index, 0);
        assert!(config.end_index.is_none());
        assert!(!config.skip_env_test);
    }

    #[test]
    fn parses_all_options() {
        let config = FuzzerConfig::from_option_line(
            "--delay 0.5 --start 10 --end 200 --session run.json --no-env-test \
             --max-failures 3 --store-all-reports --test-list 1,3-5",
        )
        .expect("parses");
        assert_eq!(config.delay, Duration::from_millis(500));
        assert_eq!(config.start_index, 10);
        assert_eq!(config.end_index, Some(200));
        assert_eq!(
            config.session_path.as_deref(),
            Some(std::path::Path::new("run.json"))
        );
        assert!(config.skip_env_test);
        assert_eq!(config.max_failures, Some(3));
        assert!(config.store_all_reports);
        assert_eq!(config.test_list.as_deref(), Some("1,3-5"));
    }

    #[test]
    fn short_flags() {
        let config =
            FuzzerConfig::from_option_line("-d 1.5 -s 2 -e 9 -n").expect("parses");
        assert_eq!(config.delay, Duration::from_millis(1500));
        assert_eq!(config.start_index, 2);
        assert_eq!(config.end_index, Some(9));
        assert!(config.skip_env_test);
    }

    #[test]
    fn unknown_option_fails() {
        assert!(matches!(
            FuzzerConfig::from_option_line("--bogus 1"),
            Err(SessionError::Config(_))
        ));
    }

    #[test]
    fn negative_delay_fails() {
        assert!(matches!(
            FuzzerConfig::from_option_line("--delay -1"),
            Err(SessionError::Config(_))
        ));
    }
}
