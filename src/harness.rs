//! Repeated execution of a command across a parameter sweep.
//!
//! The sweep is first expanded into an [`IterationPlan`] (one rendered
//! command per parameter value), then executed either sequentially or by a
//! small worker pool. Workers always own a whole parameter value, so two
//! copies of the benchmarked program for the same value never overlap.
//! Reduction to statistics is delegated to [`crate::stats::summarize`].

use std::thread;
use std::time::Duration;

use tracing::{debug, info, info_span, warn};

use crate::errors::SweepError;
use crate::exec::Executor;
use crate::extract::ExtractionRule;
use crate::stats::{self, Tally};
use crate::template::CommandTemplate;
use crate::types::{AggregateResult, ParamValue, RawSample};

/// Everything a sweep needs, passed explicitly to [`run_sweep`].
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub template: CommandTemplate,
    pub params: Vec<ParamValue>,
    pub iterations: usize,
    pub extraction: ExtractionRule,
    pub timeout: Option<Duration>,
    /// Parameter values measured concurrently.
    pub jobs: usize,
    /// Extra attempts for a single failed execution.
    pub retries: usize,
    /// Discarded executions run before measuring each value.
    pub warmup: usize,
    /// Treat a non-zero exit code as an execution failure.
    pub require_success: bool,
}

impl SweepConfig {
    pub fn new(template: CommandTemplate, params: Vec<ParamValue>, iterations: usize) -> Self {
        Self {
            template,
            params,
            iterations,
            extraction: ExtractionRule::default(),
            timeout: None,
            jobs: 1,
            retries: 0,
            warmup: 0,
            require_success: false,
        }
    }

    pub fn validate(&self) -> Result<(), SweepError> {
        if self.params.is_empty() {
            return Err(SweepError::InvalidConfig {
                detail: "no parameter values given".to_string(),
            });
        }
        if self.iterations == 0 {
            return Err(SweepError::InvalidConfig {
                detail: "iterations must be at least 1".to_string(),
            });
        }
        if self.jobs == 0 {
            return Err(SweepError::InvalidConfig {
                detail: "jobs must be at least 1".to_string(),
            });
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(SweepError::InvalidConfig {
                detail: "timeout must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// One parameter value with its rendered command.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedPoint {
    pub index: usize,
    pub param: ParamValue,
    pub command: String,
}

/// The full (parameter value x iteration) schedule of a sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationPlan {
    pub points: Vec<PlannedPoint>,
    pub iterations: usize,
    pub warmup: usize,
}

impl IterationPlan {
    /// Render every command up front; any template error aborts the sweep
    /// before a single child is spawned.
    pub fn build(config: &SweepConfig) -> Result<Self, SweepError> {
        let points = config
            .params
            .iter()
            .enumerate()
            .map(|(index, param)| {
                Ok(PlannedPoint {
                    index,
                    param: param.clone(),
                    command: config.template.render(param)?,
                })
            })
            .collect::<Result<Vec<_>, SweepError>>()?;

        Ok(Self {
            points,
            iterations: config.iterations,
            warmup: config.warmup,
        })
    }

    /// Number of child processes the plan will start, retries excluded.
    pub fn total_executions(&self) -> usize {
        self.points.len() * (self.iterations + self.warmup)
    }
}

/// Run the sweep and return one aggregate per parameter value, in input order.
pub fn run_sweep(
    config: &SweepConfig,
    executor: &dyn Executor,
) -> Result<Vec<AggregateResult>, SweepError> {
    config.validate()?;
    let plan = IterationPlan::build(config)?;
    info!(
        points = plan.points.len(),
        executions = plan.total_executions(),
        jobs = config.jobs,
        "starting sweep"
    );

    let results: Vec<AggregateResult> = if config.jobs <= 1 || plan.points.len() <= 1 {
        plan.points
            .iter()
            .map(|point| measure_point(point, config, executor))
            .collect()
    } else {
        run_parallel(&plan, config, executor)
    };

    Ok(results)
}

fn run_parallel(
    plan: &IterationPlan,
    config: &SweepConfig,
    executor: &dyn Executor,
) -> Vec<AggregateResult> {
    let workers = config.jobs.min(plan.points.len());
    let (job_tx, job_rx) = crossbeam_channel::unbounded::<&PlannedPoint>();
    let (result_tx, result_rx) = crossbeam_channel::unbounded();

    for point in &plan.points {
        let _ = job_tx.send(point);
    }
    drop(job_tx);

    thread::scope(|scope| {
        for _ in 0..workers {
            let jobs = job_rx.clone();
            let results = result_tx.clone();
            scope.spawn(move || {
                for point in jobs.iter() {
                    let aggregate = measure_point(point, config, executor);
                    let _ = results.send((point.index, aggregate));
                }
            });
        }
    });
    drop(result_tx);

    let mut slots: Vec<Option<AggregateResult>> = (0..plan.points.len()).map(|_| None).collect();
    for (index, aggregate) in result_rx.iter() {
        slots[index] = Some(aggregate);
    }
    slots.into_iter().flatten().collect()
}

/// Collect every sample for one parameter value and reduce it.
fn measure_point(
    point: &PlannedPoint,
    config: &SweepConfig,
    executor: &dyn Executor,
) -> AggregateResult {
    let span = info_span!("param", value = %point.param);
    let _guard = span.enter();

    for round in 0..config.warmup {
        if let Err(e) = run_once(&point.command, config, executor) {
            debug!(round, error = %e, "warmup run failed");
        }
    }

    let mut samples: Vec<RawSample> = Vec::with_capacity(config.iterations);
    let mut tally = Tally::default();

    // `attempted` counts iterations; a retried iteration counts once.
    for iteration in 0..config.iterations {
        tally.attempted += 1;
        match run_with_retries(&point.command, config, executor) {
            Ok(sample) => {
                debug!(iteration, ?sample, "sample collected");
                samples.push(sample);
            }
            Err(e) if e.is_execution_failure() => {
                warn!(iteration, error = %e, "execution failed, skipping remaining iterations");
                tally.execution_failure = Some(e.to_string());
                break;
            }
            Err(e) => {
                warn!(iteration, error = %e, "dropping unparseable sample");
                tally.parse_failures += 1;
            }
        }
    }

    let aggregate = stats::summarize(point.param.clone(), &samples, tally);
    if aggregate.has_data() {
        info!(samples = aggregate.sample_count, "measured");
    } else {
        warn!(attempted = aggregate.attempted, "no usable samples");
    }
    aggregate
}

fn run_with_retries(
    command: &str,
    config: &SweepConfig,
    executor: &dyn Executor,
) -> Result<RawSample, SweepError> {
    let mut attempt = 0;
    loop {
        match run_once(command, config, executor) {
            Ok(sample) => return Ok(sample),
            Err(e) if attempt < config.retries => {
                attempt += 1;
                debug!(attempt, error = %e, "retrying execution");
            }
            Err(e) => return Err(e),
        }
    }
}

/// Exit statuses `sh` (and GNU time) use when the command could not be run
/// at all: 126 not executable, 127 not found.
const EXIT_NOT_EXECUTABLE: i32 = 126;
const EXIT_NOT_FOUND: i32 = 127;

/// One execution: spawn, check how it ended, extract the timing triple.
fn run_once(
    command: &str,
    config: &SweepConfig,
    executor: &dyn Executor,
) -> Result<RawSample, SweepError> {
    let captured = executor.execute(command, config.timeout)?;
    match captured.exit_code {
        None => {
            return Err(SweepError::Execution {
                command: command.to_string(),
                detail: "terminated by signal".to_string(),
            });
        }
        Some(0) => {}
        Some(code @ (EXIT_NOT_EXECUTABLE | EXIT_NOT_FOUND)) => {
            let reason = if code == EXIT_NOT_FOUND {
                "command not found"
            } else {
                "command not executable"
            };
            return Err(SweepError::Execution {
                command: command.to_string(),
                detail: format!("{} (exit status {})", reason, code),
            });
        }
        Some(code) if config.require_success => {
            return Err(SweepError::Execution {
                command: command.to_string(),
                detail: format!("exited with status {}", code),
            });
        }
        Some(code) => debug!(code, "non-zero exit status"),
    }
    config.extraction.extract(&captured.stderr)
}
