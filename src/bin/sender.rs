use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use ccsim::sender::{self, Sender};
use ccsim::{StrategyConfig, StrategyKind};

#[derive(Parser, Debug)]
#[clap(name = "ccsim-sender")]
struct Opt {
    /// Address to bind and wait for the receiver's handshake on
    #[clap(long, default_value = "127.0.0.1:8888")]
    bind: String,
    /// Strategy: fixed, aimd or cubic
    #[clap(long, default_value = "aimd")]
    strategy: StrategyKind,
    /// Initial congestion window, in data units
    #[clap(long, default_value = "1")]
    cwnd: f64,
    /// Initial slow start threshold, in data units
    #[clap(long, default_value = "64")]
    ssthresh: f64,
    /// Pacing rate λ, in data units per second
    #[clap(long, default_value = "100")]
    lambda: f64,
    /// Size credited for each data unit, in bytes
    #[clap(long, default_value = "1000")]
    segment_size: u32,
    /// Seed for the pacing generator
    #[clap(long)]
    seed: Option<u64>,
    /// Sending time, in seconds
    #[clap(long, default_value = "10")]
    duration: f64,
    /// Time to keep collecting acks after sending stops, in milliseconds
    #[clap(long, default_value = "0")]
    linger_ms: u64,
    /// Time to wait for the receiver's handshake, in milliseconds
    #[clap(long, default_value = "10000")]
    handshake_timeout_ms: u64,
    /// Write the run report here instead of stdout
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

    let strategy_config = StrategyConfig {
        kind: opt.strategy,
        initial_cwnd: opt.cwnd,
        ssthresh: opt.ssthresh,
        rate_lambda: opt.lambda,
        segment_size: opt.segment_size,
        seed: opt.seed,
    };

    let config = sender::Config {
        handshake_timeout_ms: opt.handshake_timeout_ms,
        linger_ms: opt.linger_ms,
        ..Default::default()
    };

    let duration = Duration::try_from_secs_f64(opt.duration).context("invalid duration")?;

    let mut sender = Sender::bind_with_config(opt.bind.as_str(), &strategy_config, config)
        .with_context(|| format!("failed to bind {}", opt.bind))?;

    info!(local_addr = %sender.local_addr(), strategy = %opt.strategy, "sender ready");

    let report = sender.run(duration)?;

    let json = serde_json::to_string_pretty(&report)?;
    match opt.output {
        Some(path) => std::fs::write(&path, json)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{json}"),
    }

    Ok(())
}
