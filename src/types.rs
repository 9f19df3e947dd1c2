use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::errors::SweepError;

/// One point of a sweep, substituted into the command template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    /// Interpret a command-line token. A token becomes a number only when
    /// the number prints back as exactly the same text, so `007`, `1e3` or an
    /// out-of-range integer stay `Text` and reach the command unchanged.
    pub fn from_cli(raw: &str) -> Self {
        let raw = raw.trim();
        if let Ok(i) = raw.parse::<i64>()
            && i.to_string() == raw
        {
            return ParamValue::Int(i);
        }
        if let Ok(f) = raw.parse::<f64>()
            && f.is_finite()
        {
            let float = ParamValue::Float(f);
            if float.to_string() == raw {
                return float;
            }
        }
        ParamValue::Text(raw.to_string())
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(i) => write!(f, "{}", i),
            // Debug keeps the fractional part of whole floats (`1.0`, not `1`).
            ParamValue::Float(x) => write!(f, "{:?}", x),
            ParamValue::Text(s) => f.write_str(s),
        }
    }
}

/// Timing channels in their fixed reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Real,
    User,
    Sys,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Real, Channel::User, Channel::Sys];

    pub fn name(self) -> &'static str {
        match self {
            Channel::Real => "real",
            Channel::User => "user",
            Channel::Sys => "sys",
        }
    }

    pub fn index(self) -> usize {
        match self {
            Channel::Real => 0,
            Channel::User => 1,
            Channel::Sys => 2,
        }
    }
}

/// One execution's parsed timings, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub real: f64,
    pub user: f64,
    pub sys: f64,
}

impl RawSample {
    pub fn get(&self, channel: Channel) -> f64 {
        match channel {
            Channel::Real => self.real,
            Channel::User => self.user,
            Channel::Sys => self.sys,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChannelStats {
    pub mean: f64,
    /// `None` when fewer than two samples were collected.
    pub std_dev: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Stats indexed by `Channel::index`.
    Measured([ChannelStats; 3]),
    NoData,
}

/// Summary of every sample collected for one parameter value.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateResult {
    pub param: ParamValue,
    /// Iterations attempted, warmup excluded. Retries do not add to it.
    pub attempted: usize,
    pub sample_count: usize,
    pub parse_failures: usize,
    pub execution_failure: Option<String>,
    pub outcome: Outcome,
}

impl AggregateResult {
    pub fn stats(&self, channel: Channel) -> Option<&ChannelStats> {
        match &self.outcome {
            Outcome::Measured(stats) => Some(&stats[channel.index()]),
            Outcome::NoData => None,
        }
    }

    pub fn has_data(&self) -> bool {
        matches!(self.outcome, Outcome::Measured(_))
    }

    /// The error a caller would raise for a parameter value with no samples.
    pub fn insufficient_data(&self) -> Option<SweepError> {
        match self.outcome {
            Outcome::Measured(_) => None,
            Outcome::NoData => Some(SweepError::InsufficientData {
                param: self.param.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

/// Wraps a string in single quotes, escaping internal single quotes as `'\''`.
pub fn shell_escape_single_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_from_cli_prefers_integers() {
        assert_eq!(ParamValue::from_cli("128"), ParamValue::Int(128));
        assert_eq!(ParamValue::from_cli(" 4 "), ParamValue::Int(4));
        assert_eq!(ParamValue::from_cli("0.5"), ParamValue::Float(0.5));
        assert_eq!(
            ParamValue::from_cli("top128.txt"),
            ParamValue::Text("top128.txt".to_string())
        );
        assert_eq!(ParamValue::from_cli("inf"), ParamValue::Text("inf".to_string()));
    }

    #[test]
    fn param_from_cli_keeps_non_canonical_numbers_as_text() {
        assert_eq!(ParamValue::from_cli("1.0"), ParamValue::Float(1.0));
        for raw in ["007", "1e3", "+5", "12345678901234567890123", "0.50"] {
            assert_eq!(ParamValue::from_cli(raw), ParamValue::Text(raw.to_string()));
        }
    }

    #[test]
    fn param_display_round_trips_cli_text() {
        for raw in ["100", "2.5", "1.0", "007", "1e3", "/tmp/test.5mb"] {
            assert_eq!(ParamValue::from_cli(raw).to_string(), raw);
        }
    }

    #[test]
    fn param_deserializes_untagged() {
        #[derive(Deserialize)]
        struct Wrapper {
            params: Vec<ParamValue>,
        }
        let w: Wrapper = toml::from_str(r#"params = [1, 2.5, 1.0, "big"]"#).unwrap();
        assert_eq!(
            w.params,
            vec![
                ParamValue::Int(1),
                ParamValue::Float(2.5),
                ParamValue::Float(1.0),
                ParamValue::Text("big".to_string())
            ]
        );
        assert_eq!(w.params[2].to_string(), "1.0");
    }

    #[test]
    fn channel_order_is_real_user_sys() {
        let names: Vec<&str> = Channel::ALL.iter().map(|c| c.name()).collect();
        assert_eq!(names, ["real", "user", "sys"]);
        for (i, c) in Channel::ALL.iter().enumerate() {
            assert_eq!(c.index(), i);
        }
    }

    #[test]
    fn no_data_result_reports_insufficient_data() {
        let result = AggregateResult {
            param: ParamValue::Int(64),
            attempted: 3,
            sample_count: 0,
            parse_failures: 3,
            execution_failure: None,
            outcome: Outcome::NoData,
        };
        assert!(!result.has_data());
        assert!(result.stats(Channel::Real).is_none());
        let err = result.insufficient_data().unwrap();
        assert!(err.to_string().contains("'64'"));
    }

    #[test]
    fn escape_single_quotes() {
        assert_eq!(shell_escape_single_quote("plain"), "'plain'");
        assert_eq!(shell_escape_single_quote("it's"), "'it'\\''s'");
    }
}
