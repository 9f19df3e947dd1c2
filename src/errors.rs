use std::path::PathBuf;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum SweepError {
    #[error("Failed to run `{command}`: {detail}")]
    Execution { command: String, detail: String },

    #[error("`{command}` did not finish within {:.1}s", .timeout.as_secs_f64())]
    Timeout { command: String, timeout: Duration },

    #[error("Could not read timings from stderr: {detail}")]
    Parse { detail: String },

    #[error("No usable samples for parameter '{param}'")]
    InsufficientData { param: String },

    #[error("Invalid command template: {detail}")]
    Template { detail: String },

    #[error("Invalid sweep configuration: {detail}")]
    InvalidConfig { detail: String },

    #[error("Failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {detail}")]
    ConfigParse { path: PathBuf, detail: String },
}

impl SweepError {
    /// Errors that stop the current parameter value's loop rather than a
    /// single sample.
    pub fn is_execution_failure(&self) -> bool {
        matches!(self, SweepError::Execution { .. } | SweepError::Timeout { .. })
    }
}
