use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::errors::SweepError;
use crate::extract::{ExtractionRule, FieldRule, Layout};
use crate::harness::SweepConfig;
use crate::template::CommandTemplate;
use crate::types::{OutputFormat, ParamValue};

pub const DEFAULT_ITERATIONS: usize = 5;

/// Overrides the location of the user defaults file.
pub const CONFIG_ENV: &str = "SWEEPBENCH_CONFIG";

/// One layer of settings: CLI flags, a sweep file, or user defaults.
///
/// Every field is optional so layers can be stacked with [`Settings::over`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub command: Option<String>,
    pub params: Option<Vec<ParamValue>>,
    pub iterations: Option<usize>,
    pub layout: Option<Layout>,
    pub extraction: Option<Vec<FieldRule>>,
    /// Seconds; fractions allowed.
    pub timeout: Option<f64>,
    /// `0` means one job per CPU.
    pub jobs: Option<usize>,
    pub retries: Option<usize>,
    pub warmup: Option<usize>,
    pub require_success: Option<bool>,
    pub wrap_time: Option<bool>,
    pub format: Option<OutputFormat>,
}

/// Settings after every layer has been applied.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub sweep: SweepConfig,
    pub format: OutputFormat,
}

impl Settings {
    /// Fill the gaps in `self` from `lower`.
    pub fn over(self, lower: Settings) -> Settings {
        Settings {
            command: self.command.or(lower.command),
            params: self.params.or(lower.params),
            iterations: self.iterations.or(lower.iterations),
            // A layer that picks a preset also discards lower custom fields.
            extraction: if self.layout.is_some() {
                self.extraction
            } else {
                self.extraction.or(lower.extraction)
            },
            layout: self.layout.or(lower.layout),
            timeout: self.timeout.or(lower.timeout),
            jobs: self.jobs.or(lower.jobs),
            retries: self.retries.or(lower.retries),
            warmup: self.warmup.or(lower.warmup),
            require_success: self.require_success.or(lower.require_success),
            wrap_time: self.wrap_time.or(lower.wrap_time),
            format: self.format.or(lower.format),
        }
    }

    pub fn resolve(self) -> Result<Resolved, SweepError> {
        let raw = self.command.ok_or_else(|| SweepError::InvalidConfig {
            detail: "no command template given".to_string(),
        })?;
        let mut template = CommandTemplate::new(&raw)?;
        if self.wrap_time.unwrap_or(false) {
            template = template.wrapped_in_time();
        }

        let extraction = match self.extraction {
            Some(fields) => ExtractionRule::from_fields(fields)?,
            None => self.layout.unwrap_or(Layout::Gnu).rule(),
        };

        let timeout = self.timeout.map(parse_timeout).transpose()?;

        let jobs = match self.jobs {
            Some(0) => num_cpus::get(),
            Some(n) => n,
            None => 1,
        };

        let sweep = SweepConfig {
            template,
            params: self.params.unwrap_or_default(),
            iterations: self.iterations.unwrap_or(DEFAULT_ITERATIONS),
            extraction,
            timeout,
            jobs,
            retries: self.retries.unwrap_or(0),
            warmup: self.warmup.unwrap_or(0),
            require_success: self.require_success.unwrap_or(false),
        };
        sweep.validate()?;

        Ok(Resolved {
            sweep,
            format: self.format.unwrap_or(OutputFormat::Table),
        })
    }
}

fn parse_timeout(secs: f64) -> Result<Duration, SweepError> {
    if secs <= 0.0 {
        return Err(SweepError::InvalidConfig {
            detail: format!("timeout must be positive, got {}", secs),
        });
    }
    Duration::try_from_secs_f64(secs).map_err(|e| SweepError::InvalidConfig {
        detail: format!("timeout {}: {}", secs, e),
    })
}

/// Read one TOML settings file.
pub fn load_file(path: &Path) -> Result<Settings, SweepError> {
    let text = std::fs::read_to_string(path).map_err(|source| SweepError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|e| SweepError::ConfigParse {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

/// `$SWEEPBENCH_CONFIG`, else `<config dir>/sweepbench/config.toml`.
pub fn user_defaults_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|d| d.join("sweepbench").join("config.toml"))
}

/// User defaults; a missing file is simply an empty layer.
pub fn load_user_defaults(path: Option<&Path>) -> Result<Settings, SweepError> {
    match path {
        Some(p) if p.is_file() => load_file(p),
        _ => Ok(Settings::default()),
    }
}
