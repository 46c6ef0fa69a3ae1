use thiserror::Error;

/// Errors which terminate a sender, receiver or experiment.
#[derive(Debug, Error)]
pub enum Error {
    #[error("socket setup error: {0}")]
    Io(#[from] std::io::Error),

    /// The datagram channel reported an error while running. Channel errors are fatal to the
    /// owning loop and are never retried.
    #[error("channel error: {0}")]
    Channel(std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("no handshake from peer after {timeout_ms}ms")]
    HandshakeTimeout { timeout_ms: u64 },

    #[error("flow thread panicked")]
    Thread,
}

/// Invalid parameters, reported before any socket is touched.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("unknown strategy `{0}` (expected fixed, aimd or cubic)")]
    UnknownStrategy(String),

    #[error("rate_lambda must be finite and > 0, found {0}")]
    RateLambda(f64),

    #[error("initial_cwnd must be finite and >= 1, found {0}")]
    InitialCwnd(f64),

    #[error("ssthresh must be finite and >= 1, found {0}")]
    Ssthresh(f64),

    #[error("segment_size must be > 0")]
    SegmentSize,

    #[error("{name} must be in {min}..={max}, found {value}")]
    OutOfRange {
        name: &'static str,
        min: u64,
        max: u64,
        value: u64,
    },

    #[error("comparison needs at least 2 distinct strategies, found {0}")]
    InsufficientAlgorithms(usize),

    #[error("comparison needs at least 1 run per strategy")]
    NoRuns,
}

/// A datagram which could not be understood. These are logged and dropped by the loops.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("datagram of {0} bytes exceeds the maximum size")]
    Oversize(usize),

    #[error("handshake message without a true marker")]
    InvalidHandshake,
}

pub type Result<T> = std::result::Result<T, Error>;
