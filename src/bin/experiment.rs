//! Compares strategies by running flows over loopback and reporting the metrics of every run.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use ccsim::experiment::{self, FlowConfig};
use ccsim::{StrategyConfig, StrategyKind};

#[derive(Parser, Debug)]
#[clap(name = "ccsim-experiment")]
struct Opt {
    /// Strategies to compare
    #[clap(long, value_delimiter = ',', default_value = "fixed,aimd,cubic")]
    strategies: Vec<StrategyKind>,
    /// Runs per strategy
    #[clap(long, default_value = "3")]
    runs: usize,
    /// Sending time of each run, in seconds
    #[clap(long, default_value = "5")]
    duration: f64,
    /// Run one flow per strategy at the same time instead of a sequential comparison
    #[clap(long)]
    parallel: bool,
    /// Initial congestion window, in data units
    #[clap(long, default_value = "1")]
    cwnd: f64,
    /// Initial slow start threshold, in data units
    #[clap(long, default_value = "64")]
    ssthresh: f64,
    /// Pacing rate λ, in data units per second
    #[clap(long, default_value = "100")]
    lambda: f64,
    /// Base seed; run i uses seed + i
    #[clap(long)]
    seed: Option<u64>,
    /// Time each sender keeps collecting acks after it stops sending, in milliseconds
    #[clap(long, default_value = "200")]
    linger_ms: u64,
    /// Write results here instead of stdout
    #[clap(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let opt = Opt::parse();

    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .finish(),
    )?;

    let base = StrategyConfig {
        initial_cwnd: opt.cwnd,
        ssthresh: opt.ssthresh,
        rate_lambda: opt.lambda,
        seed: opt.seed,
        ..Default::default()
    };

    let mut config = FlowConfig {
        duration: Duration::try_from_secs_f64(opt.duration).context("invalid duration")?,
        ..Default::default()
    };
    config.sender.linger_ms = opt.linger_ms;

    let json = if opt.parallel {
        let strategies: Vec<StrategyConfig> = opt
            .strategies
            .iter()
            .map(|&kind| StrategyConfig {
                kind,
                ..base.clone()
            })
            .collect();

        info!(flows = strategies.len(), "running flows in parallel");

        serde_json::to_string_pretty(&experiment::run_parallel(&strategies, &config)?)?
    } else {
        info!(strategies = ?opt.strategies, runs = opt.runs, "running comparison");

        serde_json::to_string_pretty(&experiment::compare(
            &opt.strategies,
            &base,
            &config,
            opt.runs,
        )?)?
    };

    match opt.output {
        Some(path) => std::fs::write(&path, json)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{json}"),
    }

    Ok(())
}
