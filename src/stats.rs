use crate::types::{AggregateResult, Channel, ChannelStats, Outcome, ParamValue, RawSample};

/// Counters gathered while collecting samples for one parameter value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tally {
    /// Measured iterations started; retries of one iteration count once.
    pub attempted: usize,
    pub parse_failures: usize,
    pub execution_failure: Option<String>,
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (divisor `n - 1`); `None` below two values.
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let avg = mean(values)?;
    let sum_sq: f64 = values.iter().map(|v| (v - avg) * (v - avg)).sum();
    Some((sum_sq / (values.len() - 1) as f64).sqrt())
}

pub fn channel_stats(samples: &[RawSample], channel: Channel) -> Option<ChannelStats> {
    let values: Vec<f64> = samples.iter().map(|s| s.get(channel)).collect();
    Some(ChannelStats {
        mean: mean(&values)?,
        std_dev: sample_std_dev(&values),
    })
}

/// Fold a completed sample list into its aggregate.
pub fn summarize(param: ParamValue, samples: &[RawSample], tally: Tally) -> AggregateResult {
    let outcome = match (
        channel_stats(samples, Channel::Real),
        channel_stats(samples, Channel::User),
        channel_stats(samples, Channel::Sys),
    ) {
        (Some(real), Some(user), Some(sys)) => Outcome::Measured([real, user, sys]),
        _ => Outcome::NoData,
    };

    AggregateResult {
        param,
        attempted: tally.attempted,
        sample_count: samples.len(),
        parse_failures: tally.parse_failures,
        execution_failure: tally.execution_failure,
        outcome,
    }
}
