//! Timing extraction from a child's stderr.
//!
//! Everything that depends on the exact layout printed by `time` lives here.
//! [`ExtractionRule::extract`] is the only entry point the harness uses.

use clap::ValueEnum;
use serde::Deserialize;

use crate::errors::SweepError;
use crate::types::{Channel, RawSample};

/// Where one channel's value sits in the stderr text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FieldRule {
    pub channel: Channel,
    /// Index into the non-empty lines; negative counts from the end.
    #[serde(default)]
    pub line: isize,
    /// Index into the whitespace-separated tokens of that line.
    pub token: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionRule {
    pub fields: [FieldRule; 3],
}

/// Built-in layouts.
#[derive(Debug, Clone, Copy, PartialEq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// `0.002u 0.010s 0:00.05elapsed` on one line.
    Gnu,
    /// `time -p`: `real X`, `user Y`, `sys Z` on three lines.
    Posix,
}

impl Layout {
    pub fn rule(self) -> ExtractionRule {
        match self {
            Layout::Gnu => ExtractionRule::gnu(),
            Layout::Posix => ExtractionRule::posix(),
        }
    }
}

impl Default for ExtractionRule {
    fn default() -> Self {
        Self::gnu()
    }
}

impl ExtractionRule {
    pub fn gnu() -> Self {
        Self {
            fields: [
                FieldRule { channel: Channel::User, line: 0, token: 0 },
                FieldRule { channel: Channel::Sys, line: 0, token: 1 },
                FieldRule { channel: Channel::Real, line: 0, token: 2 },
            ],
        }
    }

    pub fn posix() -> Self {
        Self {
            fields: [
                FieldRule { channel: Channel::Real, line: 0, token: 1 },
                FieldRule { channel: Channel::User, line: 1, token: 1 },
                FieldRule { channel: Channel::Sys, line: 2, token: 1 },
            ],
        }
    }

    /// Build a rule from user-supplied fields; each channel must appear once.
    pub fn from_fields(fields: Vec<FieldRule>) -> Result<Self, SweepError> {
        let fields: [FieldRule; 3] = fields.try_into().map_err(|v: Vec<FieldRule>| {
            SweepError::InvalidConfig {
                detail: format!("extraction needs exactly 3 fields, got {}", v.len()),
            }
        })?;
        for channel in Channel::ALL {
            if fields.iter().filter(|f| f.channel == channel).count() != 1 {
                return Err(SweepError::InvalidConfig {
                    detail: format!("extraction must map channel '{}' exactly once", channel.name()),
                });
            }
        }
        Ok(Self { fields })
    }

    /// Decode one execution's stderr into a sample.
    pub fn extract(&self, stderr: &str) -> Result<RawSample, SweepError> {
        let lines: Vec<&str> = stderr
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();

        let mut values = [0.0f64; 3];
        for field in &self.fields {
            let line = pick_line(&lines, field.line).ok_or_else(|| SweepError::Parse {
                detail: format!(
                    "expected line {} but stderr has {} non-empty line(s)",
                    field.line,
                    lines.len()
                ),
            })?;
            let token = line.split_whitespace().nth(field.token).ok_or_else(|| {
                SweepError::Parse {
                    detail: format!("line {:?} has no token {}", line, field.token),
                }
            })?;
            values[field.channel.index()] = parse_seconds(strip_unit(token))
                .ok_or_else(|| SweepError::Parse {
                    detail: format!("{:?} is not a duration", token),
                })?;
        }

        Ok(RawSample {
            real: values[Channel::Real.index()],
            user: values[Channel::User.index()],
            sys: values[Channel::Sys.index()],
        })
    }
}

fn pick_line<'a>(lines: &[&'a str], index: isize) -> Option<&'a str> {
    let idx = if index < 0 {
        lines.len().checked_sub(index.unsigned_abs())?
    } else {
        index as usize
    };
    lines.get(idx).copied()
}

/// Drop the trailing unit label (`u`, `user`, `system`, `elapsed`, ...).
pub fn strip_unit(token: &str) -> &str {
    token.trim_end_matches(|c: char| c.is_ascii_alphabetic())
}

/// Parse seconds in plain (`0.05`), clock (`1:02.5`, `1:00:02`) or bash
/// (`0m0.050`) notation.
pub fn parse_seconds(s: &str) -> Option<f64> {
    if s.is_empty() {
        return None;
    }

    let secs = if let Some((minutes, rest)) = s.split_once('m') {
        parse_component(minutes)? * 60.0 + parse_component(rest)?
    } else if s.contains(':') {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() > 3 {
            return None;
        }
        let mut total = 0.0;
        for part in parts {
            total = total * 60.0 + parse_component(part)?;
        }
        total
    } else {
        parse_component(s)?
    };

    (secs.is_finite() && secs >= 0.0).then_some(secs)
}

fn parse_component(s: &str) -> Option<f64> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gnu_compact_line() {
        let sample = ExtractionRule::gnu()
            .extract("0.002u 0.010s 0:00.05elapsed")
            .unwrap();
        assert_eq!(sample.user, 0.002);
        assert_eq!(sample.sys, 0.010);
        assert_eq!(sample.real, 0.05);
    }

    #[test]
    fn gnu_default_time_format() {
        let stderr = "0.40user 0.02system 0:01.50elapsed 28%CPU (0avgtext+0avgdata 3456maxresident)k\n\
                      0inputs+0outputs (0major+150minor)pagefaults 0swaps\n";
        let sample = ExtractionRule::gnu().extract(stderr).unwrap();
        assert_eq!(sample.user, 0.40);
        assert_eq!(sample.sys, 0.02);
        assert_eq!(sample.real, 1.5);
    }

    #[test]
    fn gnu_skips_leading_blank_lines() {
        let sample = ExtractionRule::gnu()
            .extract("\n\n   \n1.5u 0.25s 1:00.00elapsed\n")
            .unwrap();
        assert_eq!(sample.real, 60.0);
    }

    #[test]
    fn posix_three_lines() {
        let sample = ExtractionRule::posix()
            .extract("real 0.05\nuser 0.00\nsys 0.01\n")
            .unwrap();
        assert_eq!(sample.real, 0.05);
        assert_eq!(sample.user, 0.0);
        assert_eq!(sample.sys, 0.01);
    }

    #[test]
    fn bash_time_keyword_format() {
        let sample = ExtractionRule::posix()
            .extract("\nreal\t0m1.250s\nuser\t0m0.800s\nsys\t0m0.100s\n")
            .unwrap();
        assert_eq!(sample.real, 1.25);
        assert_eq!(sample.user, 0.8);
        assert_eq!(sample.sys, 0.1);
    }

    #[test]
    fn negative_line_counts_from_end() {
        let rule = ExtractionRule::from_fields(vec![
            FieldRule { channel: Channel::User, line: -1, token: 0 },
            FieldRule { channel: Channel::Sys, line: -1, token: 1 },
            FieldRule { channel: Channel::Real, line: -1, token: 2 },
        ])
        .unwrap();
        let stderr = "warning: cache cold\ncopying 5mb\n0.10u 0.20s 0:00.30elapsed\n";
        let sample = rule.extract(stderr).unwrap();
        assert_eq!(sample.user, 0.10);
        assert_eq!(sample.sys, 0.20);
        assert_eq!(sample.real, 0.30);
    }

    #[test]
    fn missing_line_is_parse_error() {
        let err = ExtractionRule::posix().extract("real 0.05\n").unwrap_err();
        assert!(matches!(err, SweepError::Parse { .. }));
    }

    #[test]
    fn missing_token_is_parse_error() {
        let err = ExtractionRule::gnu().extract("0.002u 0.010s").unwrap_err();
        assert!(matches!(err, SweepError::Parse { .. }));
    }

    #[test]
    fn non_numeric_token_is_parse_error() {
        let err = ExtractionRule::gnu()
            .extract("Command not found: ./a.out")
            .unwrap_err();
        assert!(err.to_string().contains("not a duration"));
    }

    #[test]
    fn empty_stderr_is_parse_error() {
        assert!(ExtractionRule::gnu().extract("").is_err());
    }

    #[test]
    fn from_fields_requires_each_channel_once() {
        let dup = vec![
            FieldRule { channel: Channel::User, line: 0, token: 0 },
            FieldRule { channel: Channel::User, line: 0, token: 1 },
            FieldRule { channel: Channel::Real, line: 0, token: 2 },
        ];
        assert!(ExtractionRule::from_fields(dup).is_err());

        let short = vec![FieldRule { channel: Channel::Real, line: 0, token: 0 }];
        let err = ExtractionRule::from_fields(short).unwrap_err();
        assert!(err.to_string().contains("exactly 3 fields"));
    }

    #[test]
    fn strip_unit_labels() {
        assert_eq!(strip_unit("0.002u"), "0.002");
        assert_eq!(strip_unit("0.40user"), "0.40");
        assert_eq!(strip_unit("0:00.05elapsed"), "0:00.05");
        assert_eq!(strip_unit("0.05"), "0.05");
    }

    #[test]
    fn parse_seconds_forms() {
        assert_eq!(parse_seconds("0.05"), Some(0.05));
        assert_eq!(parse_seconds("0:00.05"), Some(0.05));
        assert_eq!(parse_seconds("2:03.5"), Some(123.5));
        assert_eq!(parse_seconds("1:00:02"), Some(3602.0));
        assert_eq!(parse_seconds("0m0.050"), Some(0.05));
        assert_eq!(parse_seconds("1m30"), Some(90.0));
    }

    #[test]
    fn parse_seconds_rejects_garbage() {
        assert_eq!(parse_seconds(""), None);
        assert_eq!(parse_seconds("-1.0"), None);
        assert_eq!(parse_seconds("abc"), None);
        assert_eq!(parse_seconds("1:2:3:4"), None);
        assert_eq!(parse_seconds("1..2"), None);
        assert_eq!(parse_seconds("28%"), None);
    }
}
