use crate::errors::SweepError;
use crate::types::{ParamValue, shell_escape_single_quote};

const PLACEHOLDERS: [&str; 2] = ["{param}", "{}"];

/// A shell command line with a parameter placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandTemplate {
    raw: String,
}

impl CommandTemplate {
    pub fn new(raw: &str) -> Result<Self, SweepError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(SweepError::Template {
                detail: "template is empty".to_string(),
            });
        }
        if !PLACEHOLDERS.iter().any(|p| raw.contains(p)) {
            return Err(SweepError::Template {
                detail: format!("'{}' has no {{}} or {{param}} placeholder", raw),
            });
        }
        Ok(Self {
            raw: raw.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Prefix the command with GNU time using the default extraction layout.
    pub fn wrapped_in_time(&self) -> Self {
        Self {
            raw: format!("/usr/bin/time -f '%Uu %Ss %eelapsed' {}", self.raw),
        }
    }

    /// Substitute every placeholder with the shell-safe form of `param`.
    pub fn render(&self, param: &ParamValue) -> Result<String, SweepError> {
        let arg = shell_arg(param)?;
        let mut out = String::with_capacity(self.raw.len() + arg.len());
        let mut rest = self.raw.as_str();
        // Single pass, so braces inside the substituted value are left alone.
        while let Some((pos, len)) = next_placeholder(rest) {
            out.push_str(&rest[..pos]);
            out.push_str(&arg);
            rest = &rest[pos + len..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

fn next_placeholder(s: &str) -> Option<(usize, usize)> {
    PLACEHOLDERS
        .iter()
        .filter_map(|p| s.find(p).map(|pos| (pos, p.len())))
        .min_by_key(|&(pos, _)| pos)
}

/// The literal a parameter contributes to the command line.
fn shell_arg(param: &ParamValue) -> Result<String, SweepError> {
    match param {
        ParamValue::Int(i) => Ok(i.to_string()),
        ParamValue::Float(f) if f.is_finite() => Ok(param.to_string()),
        ParamValue::Float(f) => Err(SweepError::Template {
            detail: format!("parameter {} is not a finite number", f),
        }),
        ParamValue::Text(s) => {
            if s.is_empty() {
                return Err(SweepError::Template {
                    detail: "parameter is an empty string".to_string(),
                });
            }
            if s.chars().any(|c| c.is_control()) {
                return Err(SweepError::Template {
                    detail: format!("parameter {:?} contains control characters", s),
                });
            }
            if s.chars().all(is_shell_safe) {
                Ok(s.clone())
            } else {
                Ok(shell_escape_single_quote(s))
            }
        }
    }
}

fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '/' | ':' | '=' | ',' | '+' | '-')
}
