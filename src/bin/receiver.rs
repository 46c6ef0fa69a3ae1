use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use ccsim::receiver::{self, Receiver};

#[derive(Parser, Debug)]
#[clap(name = "ccsim-receiver")]
struct Opt {
    /// Address of the sender to handshake with
    #[clap(long, default_value = "127.0.0.1:8888")]
    sender: SocketAddr,
    /// Local address to bind
    #[clap(long, default_value = "0.0.0.0:0")]
    bind: String,
    /// Receiving time after the handshake, in seconds
    #[clap(long, default_value = "10")]
    duration: f64,
    /// Time to wait for the sender's handshake reply, in milliseconds
    #[clap(long, default_value = "10000")]
    handshake_timeout_ms: u64,
}

fn main() -> Result<()> {
    let opt = Opt::parse();

    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .finish(),
    )?;

    let config = receiver::Config {
        handshake_timeout_ms: opt.handshake_timeout_ms,
        ..Default::default()
    };

    let duration = Duration::try_from_secs_f64(opt.duration).context("invalid duration")?;

    let mut receiver = Receiver::connect_with_config(opt.bind.as_str(), opt.sender, config)
        .with_context(|| format!("failed to bind {}", opt.bind))?;

    let report = receiver.run(duration)?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
