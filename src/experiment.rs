//! Loopback experiments: each flow is one sender and one receiver on their own threads.

use std::collections::HashSet;
use std::net;
use std::thread;
use std::time;

use serde::Serialize;
use tracing::info;

use super::error::{ConfigError, Error, Result};
use super::metrics::RunReport;
use super::receiver::{self, Receiver, ReceiverReport};
use super::sender::{self, Sender};
use super::strategy::{StrategyConfig, StrategyKind};

const LOOPBACK: net::Ipv4Addr = net::Ipv4Addr::LOCALHOST;

// Extra time the receiver keeps acknowledging after the sender stops
const RECEIVER_SLACK_MS: u64 = 250;

const DURATION_DEFAULT: time::Duration = time::Duration::from_secs(10);

/// Parameters shared by every flow of an experiment.
#[derive(Clone, Debug)]
pub struct FlowConfig {
    /// How long each sender sends.
    pub duration: time::Duration,
    pub sender: sender::Config,
    pub receiver: receiver::Config,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            duration: DURATION_DEFAULT,
            sender: Default::default(),
            receiver: Default::default(),
        }
    }
}

impl FlowConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.sender.validate()?;
        self.receiver.validate()
    }

    fn receiver_duration(&self) -> time::Duration {
        self.duration
            + time::Duration::from_millis(self.sender.linger_ms)
            + time::Duration::from_millis(RECEIVER_SLACK_MS)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct FlowResult {
    pub sender: RunReport,
    pub receiver: ReceiverReport,
}

/// Runs one flow to completion: binds a sender on loopback, starts a receiver thread which
/// handshakes with it, and sends for `config.duration`.
pub fn run_flow(strategy_config: &StrategyConfig, config: &FlowConfig) -> Result<FlowResult> {
    config.validate()?;

    let mut sender =
        Sender::bind_with_config((LOOPBACK, 0), strategy_config, config.sender.clone())?;
    let sender_addr = sender.local_addr();

    let receiver_config = config.receiver.clone();
    let receiver_duration = config.receiver_duration();

    let receiver_thread = thread::spawn(move || -> Result<ReceiverReport> {
        let mut receiver =
            Receiver::connect_with_config((LOOPBACK, 0), sender_addr, receiver_config)?;
        receiver.run(receiver_duration)
    });

    let sender_result = sender.run(config.duration);

    let receiver_result = receiver_thread.join().map_err(|_| Error::Thread)?;

    Ok(FlowResult {
        sender: sender_result?,
        receiver: receiver_result?,
    })
}

/// Runs one independent flow per entry of `strategies`, all at once.
pub fn run_parallel(
    strategies: &[StrategyConfig],
    config: &FlowConfig,
) -> Result<Vec<FlowResult>> {
    config.validate()?;
    for strategy_config in strategies {
        strategy_config.validate()?;
    }

    let threads: Vec<_> = strategies
        .iter()
        .cloned()
        .map(|strategy_config| {
            let config = config.clone();
            thread::spawn(move || run_flow(&strategy_config, &config))
        })
        .collect();

    threads
        .into_iter()
        .map(|t| t.join().map_err(|_| Error::Thread)?)
        .collect()
}

/// Every run of one strategy in a comparison.
#[derive(Clone, Debug, Serialize)]
pub struct StrategyRuns {
    pub strategy: StrategyKind,
    pub runs: Vec<FlowResult>,
}

/// Runs each of `kinds` `runs` times, one flow at a time, with the remaining parameters taken
/// from `base`. If `base` carries a seed, run `i` of every strategy uses seed `base + i`, so the
/// strategies see the same pacing draws.
///
/// At least two distinct strategies are required. All parameters are validated before the first
/// run starts.
pub fn compare(
    kinds: &[StrategyKind],
    base: &StrategyConfig,
    config: &FlowConfig,
    runs: usize,
) -> Result<Vec<StrategyRuns>> {
    let distinct: HashSet<StrategyKind> = kinds.iter().copied().collect();
    if distinct.len() < 2 {
        return Err(ConfigError::InsufficientAlgorithms(distinct.len()).into());
    }
    if runs == 0 {
        return Err(ConfigError::NoRuns.into());
    }

    config.validate()?;
    base.validate()?;

    let mut ordered: Vec<StrategyKind> = Vec::new();
    for kind in kinds {
        if !ordered.contains(kind) {
            ordered.push(*kind);
        }
    }

    let mut results: Vec<StrategyRuns> = ordered
        .iter()
        .map(|&strategy| StrategyRuns {
            strategy,
            runs: Vec::with_capacity(runs),
        })
        .collect();

    for run in 0..runs {
        for entry in results.iter_mut() {
            let strategy_config = StrategyConfig {
                kind: entry.strategy,
                seed: base.seed.map(|seed| seed.wrapping_add(run as u64)),
                ..base.clone()
            };

            info!(strategy = %entry.strategy, run = run + 1, of = runs, "starting flow");

            entry.runs.push(run_flow(&strategy_config, config)?);
        }
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_needs_two_strategies() {
        let base = StrategyConfig::default();
        let config = FlowConfig::default();

        assert!(matches!(
            compare(&[StrategyKind::Aimd], &base, &config, 1),
            Err(Error::Config(ConfigError::InsufficientAlgorithms(1)))
        ));
        assert!(matches!(
            compare(&[StrategyKind::Cubic, StrategyKind::Cubic], &base, &config, 1),
            Err(Error::Config(ConfigError::InsufficientAlgorithms(1)))
        ));
        assert!(matches!(
            compare(&[], &base, &config, 1),
            Err(Error::Config(ConfigError::InsufficientAlgorithms(0)))
        ));
    }

    #[test]
    fn compare_validates_before_running() {
        let kinds = [StrategyKind::Aimd, StrategyKind::Cubic];
        let config = FlowConfig::default();

        assert!(matches!(
            compare(&kinds, &StrategyConfig::default(), &config, 0),
            Err(Error::Config(ConfigError::NoRuns))
        ));

        let base = StrategyConfig {
            ssthresh: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            compare(&kinds, &base, &config, 3),
            Err(Error::Config(ConfigError::Ssthresh(_)))
        ));
    }
}
