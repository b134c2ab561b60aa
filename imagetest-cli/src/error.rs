//! CLI-specific error types and exit code mapping

use imagetest_core::error::{BuildError, ImagetestError};
use imagetest_graph::GraphError;
use imagetest_reducer::ReducerError;
use imagetest_scheduler::SchedulerError;

/// CLI-specific error type.
///
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A workflow could not be constructed; nothing was executed.
    #[error("workflow construction failed: {0}")]
    Build(String),

    /// The run finished but some suites reported failures or errors.
    #[error("test run failed: {failures} failure(s), {errors} error(s)")]
    TestFailures { failures: usize, errors: usize },

    /// A run-level operation failed.
    #[error("{0}")]
    Command(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (report write, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                |
    /// |------|----------------------------------------|
    /// | 0    | Success                                |
    /// | 1    | General / command error                |
    /// | 2    | Configuration error                    |
    /// | 3    | Workflow construction error            |
    /// | 4    | Test failures (with `--set-exit-status`) |
    /// | 10   | IO error                               |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Build(_) => 3,
            Self::TestFailures { .. } => 4,
            Self::Io(_) => 10,
            Self::Command(_) | Self::JsonSerialize(_) => 1,
        }
    }
}

impl From<ImagetestError> for CliError {
    fn from(e: ImagetestError) -> Self {
        match e {
            ImagetestError::Config(_) => Self::Config(e.to_string()),
            ImagetestError::Build(_) => Self::Build(e.to_string()),
            ImagetestError::Io(io) => Self::Io(io),
            other => Self::Command(other.to_string()),
        }
    }
}

impl From<SchedulerError> for CliError {
    fn from(e: SchedulerError) -> Self {
        ImagetestError::from(e).into()
    }
}

impl From<GraphError> for CliError {
    fn from(e: GraphError) -> Self {
        Self::Build(e.to_string())
    }
}

impl From<ReducerError> for CliError {
    fn from(e: ReducerError) -> Self {
        match e {
            ReducerError::Write { source, .. } => Self::Io(source),
            other => Self::Command(other.to_string()),
        }
    }
}

impl From<BuildError> for CliError {
    fn from(e: BuildError) -> Self {
        Self::Build(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imagetest_core::error::ConfigError;

    #[test]
    fn test_exit_code_config_error() {
        let err = CliError::Config("bad".to_owned());
        assert_eq!(err.exit_code(), 2, "config error should return exit code 2");
    }

    #[test]
    fn test_exit_code_build_error() {
        let err: CliError = GraphError::Precondition("no network".to_owned()).into();
        assert_eq!(err.exit_code(), 3, "construction error should return exit code 3");
    }

    #[test]
    fn test_exit_code_test_failures() {
        let err = CliError::TestFailures {
            failures: 2,
            errors: 1,
        };
        assert_eq!(err.exit_code(), 4);
        assert!(err.to_string().contains("2 failure(s)"));
    }

    #[test]
    fn test_exit_code_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        assert_eq!(CliError::Io(io_err).exit_code(), 10);
    }

    #[test]
    fn test_core_config_error_maps_to_config() {
        let core = ImagetestError::Config(ConfigError::FileNotFound {
            path: "x.toml".to_owned(),
        });
        let err: CliError = core.into();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_scheduler_setup_error_maps_to_build() {
        let err: CliError = SchedulerError::Setup {
            workflow: "hostname-debian-12".to_owned(),
            source: GraphError::UnknownVm("vm9".to_owned()),
        }
        .into();
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("hostname-debian-12"));
    }

    #[test]
    fn test_scheduler_filter_error_maps_to_config() {
        let err: CliError = SchedulerError::InvalidFilter {
            kind: "exclude",
            pattern: "[".to_owned(),
            reason: "unclosed class".to_owned(),
        }
        .into();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_report_write_error_maps_to_io() {
        let err: CliError = ReducerError::Write {
            path: "/x/junit.xml".to_owned(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        }
        .into();
        assert_eq!(err.exit_code(), 10);
    }
}
