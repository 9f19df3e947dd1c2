use std::path::PathBuf;
use std::process;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use sweepbench::config::{self, Settings};
use sweepbench::display::{self, ReportMeta};
use sweepbench::exec::ShellExecutor;
use sweepbench::extract::Layout;
use sweepbench::harness;
use sweepbench::types::{OutputFormat, ParamValue};

#[derive(Parser)]
#[command(
    name = "sweepbench",
    version,
    about = "Run a command across a parameter sweep and summarize its time(1) output"
)]
struct Cli {
    /// Command template; `{}` or `{param}` is replaced by each value
    template: Option<String>,

    /// Parameter values, comma-separated or repeated
    #[arg(short, long = "param", value_delimiter = ',')]
    params: Vec<String>,

    /// Executions per parameter value
    #[arg(short = 'n', long)]
    iterations: Option<usize>,

    /// TOML sweep file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Layout of the timing text on stderr
    #[arg(long)]
    layout: Option<Layout>,

    /// Per-execution timeout in seconds
    #[arg(long)]
    timeout: Option<f64>,

    /// Parameter values measured in parallel (0 = one per CPU)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Extra attempts for a failed execution
    #[arg(long)]
    retries: Option<usize>,

    /// Discarded runs before measuring each value
    #[arg(long)]
    warmup: Option<usize>,

    /// Count a non-zero exit status as a failed execution
    #[arg(long)]
    require_success: bool,

    /// Prefix the command with /usr/bin/time in the default layout
    #[arg(long)]
    wrap_time: bool,

    #[arg(long)]
    format: Option<OutputFormat>,

    #[arg(long)]
    json: bool,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn settings(&self) -> Settings {
        Settings {
            command: self.template.clone(),
            params: (!self.params.is_empty())
                .then(|| self.params.iter().map(|p| ParamValue::from_cli(p)).collect()),
            iterations: self.iterations,
            layout: self.layout,
            extraction: None,
            timeout: self.timeout,
            jobs: self.jobs,
            retries: self.retries,
            warmup: self.warmup,
            require_success: self.require_success.then_some(true),
            wrap_time: self.wrap_time.then_some(true),
            format: if self.json { Some(OutputFormat::Json) } else { self.format },
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env("SWEEPBENCH_LOG")
        .unwrap_or_else(|_| EnvFilter::new(format!("sweepbench={}", default)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut settings = cli.settings();
    if let Some(path) = &cli.config {
        settings = settings.over(config::load_file(path)?);
    }
    let defaults_path = config::user_defaults_path();
    settings = settings.over(config::load_user_defaults(defaults_path.as_deref())?);

    let resolved = settings.resolve()?;

    let started_at = Utc::now();
    let results = harness::run_sweep(&resolved.sweep, &ShellExecutor::default())?;
    let finished_at = Utc::now();

    let output = match resolved.format {
        OutputFormat::Table => display::format_table(&results),
        OutputFormat::Csv => display::format_csv(&results),
        OutputFormat::Json => {
            let meta = ReportMeta {
                command: resolved.sweep.template.as_str().to_string(),
                iterations: resolved.sweep.iterations,
                started_at,
                finished_at,
            };
            let mut json = display::format_json(&results, &meta);
            json.push('\n');
            json
        }
    };
    print!("{}", output);

    if !results.iter().any(|r| r.has_data())
        && let Some(err) = results.iter().find_map(|r| r.insufficient_data())
    {
        return Err(err.into());
    }

    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{}", err);
        process::exit(1);
    }
}
