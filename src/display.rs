use chrono::{DateTime, Utc};
use owo_colors::{OwoColorize, Stream, Style};
use serde::Serialize;

use crate::types::{AggregateResult, Channel, ChannelStats, ParamValue};

/// Sweep-level facts echoed in the JSON report.
#[derive(Debug, Clone)]
pub struct ReportMeta {
    pub command: String,
    pub iterations: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Seconds with four decimals, the precision `time` reports.
pub fn format_seconds(secs: f64) -> String {
    format!("{:.4}", secs)
}

/// `mean ± sd`, or just the mean when the deviation is undefined.
pub fn format_cell(stats: &ChannelStats) -> String {
    match stats.std_dev {
        Some(sd) => format!("{} ± {}", format_seconds(stats.mean), format_seconds(sd)),
        None => format_seconds(stats.mean),
    }
}

fn style_header() -> Style {
    Style::new().bold()
}

fn style_param() -> Style {
    Style::new().cyan().bold()
}

/// Console table: one row per parameter value, channels in real/user/sys order.
pub fn format_table(results: &[AggregateResult]) -> String {
    let mut out = String::new();

    let params: Vec<String> = results.iter().map(|r| r.param.to_string()).collect();
    let counts: Vec<String> = results
        .iter()
        .map(|r| format!("{}/{}", r.sample_count, r.attempted))
        .collect();
    let cells: Vec<[String; 3]> = results
        .iter()
        .map(|r| {
            Channel::ALL.map(|c| match r.stats(c) {
                Some(stats) => format_cell(stats),
                None => "-".to_string(),
            })
        })
        .collect();

    let param_width = params.iter().map(|p| p.chars().count()).max().unwrap_or(0).max(5);
    let count_width = counts.iter().map(|c| c.len()).max().unwrap_or(0).max(7);
    let cell_width = cells
        .iter()
        .flat_map(|row| row.iter().map(|c| c.chars().count()))
        .max()
        .unwrap_or(0)
        .max(4);

    let header = format!(
        "{:<pw$}  {:>cw$}  {:>w$}  {:>w$}  {:>w$}",
        "param",
        "samples",
        "real",
        "user",
        "sys",
        pw = param_width,
        cw = count_width,
        w = cell_width
    );
    out.push_str(
        &header
            .if_supports_color(Stream::Stdout, |s| s.style(style_header()))
            .to_string(),
    );
    out.push('\n');

    for (i, result) in results.iter().enumerate() {
        let param = format!("{:<width$}", params[i], width = param_width);
        let param_colored = param
            .if_supports_color(Stream::Stdout, |s| s.style(style_param()))
            .to_string();

        let count = format!("{:>width$}", counts[i], width = count_width);
        let count_colored = if result.sample_count < result.attempted {
            count.if_supports_color(Stream::Stdout, |s| s.yellow()).to_string()
        } else {
            count
        };

        if result.has_data() {
            let row = cells[i]
                .iter()
                .map(|c| format!("{:>width$}", c, width = cell_width))
                .collect::<Vec<_>>()
                .join("  ");
            out.push_str(&format!("{}  {}  {}\n", param_colored, count_colored, row));
        } else {
            let note = match &result.execution_failure {
                Some(reason) => format!("no data ({})", reason),
                None => "no data".to_string(),
            };
            out.push_str(&format!(
                "{}  {}  {}\n",
                param_colored,
                count_colored,
                note.if_supports_color(Stream::Stdout, |s| s.red())
            ));
        }
    }

    out
}

#[derive(Serialize)]
struct JsonReport<'a> {
    command: &'a str,
    iterations: usize,
    started_at: String,
    finished_at: String,
    results: Vec<JsonResult<'a>>,
}

#[derive(Serialize)]
struct JsonResult<'a> {
    param: &'a ParamValue,
    samples: usize,
    attempted: usize,
    parse_failures: usize,
    execution_failure: Option<&'a str>,
    real: Option<&'a ChannelStats>,
    user: Option<&'a ChannelStats>,
    sys: Option<&'a ChannelStats>,
}

pub fn format_json(results: &[AggregateResult], meta: &ReportMeta) -> String {
    let report = JsonReport {
        command: &meta.command,
        iterations: meta.iterations,
        started_at: meta.started_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        finished_at: meta.finished_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        results: results
            .iter()
            .map(|r| JsonResult {
                param: &r.param,
                samples: r.sample_count,
                attempted: r.attempted,
                parse_failures: r.parse_failures,
                execution_failure: r.execution_failure.as_deref(),
                real: r.stats(Channel::Real),
                user: r.stats(Channel::User),
                sys: r.stats(Channel::Sys),
            })
            .collect(),
    };

    serde_json::to_string_pretty(&report).unwrap_or_else(|_| "{}".to_string())
}

pub const CSV_HEADER: &str = "param,samples,real_mean,real_std,user_mean,user_std,sys_mean,sys_std";

/// Spreadsheet rows; undefined values are left as empty cells.
pub fn format_csv(results: &[AggregateResult]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');

    for result in results {
        let mut fields = vec![csv_field(&result.param.to_string()), result.sample_count.to_string()];
        for channel in Channel::ALL {
            match result.stats(channel) {
                Some(stats) => {
                    fields.push(format_seconds(stats.mean));
                    fields.push(stats.std_dev.map(format_seconds).unwrap_or_default());
                }
                None => {
                    fields.push(String::new());
                    fields.push(String::new());
                }
            }
        }
        out.push_str(&fields.join(","));
        out.push('\n');
    }

    out
}

fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
