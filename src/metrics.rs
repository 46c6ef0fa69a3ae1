//! Run accumulators and the metrics derived from them once a run has ended.

use std::time;

use serde::Serialize;
use tracing::debug;

use super::strategy::StrategyKind;

/// Records appended by a strategy throughout a run. Read-only once the run ends.
#[derive(Clone, Debug, Default)]
pub struct Accumulators {
    /// Round-trip times of newly acknowledged packets, in seconds, in arrival order.
    pub rtt_samples: Vec<f64>,
    /// Window after each new ack (windowed strategies only).
    pub cwnd_history: Vec<f64>,
    pub ssthresh_history: Vec<f64>,
    /// `(seconds since start, sequence number)` for every non-handshake ack.
    pub ack_events: Vec<(f64, u64)>,
    pub total_acks: u64,
    pub duplicate_acks: u64,
    pub sequential_ack_count: u64,
    pub total_sent_packets: u64,
    /// Newly acknowledged packets.
    pub ack_count: u64,
    /// Bytes credited by new acks.
    pub sent_bytes: u64,
}

impl Accumulators {
    pub fn new() -> Self {
        Default::default()
    }

    pub(crate) fn record_window(&mut self, cwnd: f64, ssthresh: f64) {
        self.cwnd_history.push(cwnd);
        self.ssthresh_history.push(ssthresh);
    }
}

/// Fraction of acks which were duplicates. `None` if no acks were received.
pub fn duplicate_ack_ratio(acc: &Accumulators) -> Option<f64> {
    if acc.total_acks == 0 {
        return None;
    }
    Some(acc.duplicate_acks as f64 / acc.total_acks as f64)
}

/// Fraction of acks which continued the previous ack's sequence. `None` if no acks were received.
pub fn sequential_ack_ratio(acc: &Accumulators) -> Option<f64> {
    if acc.total_acks == 0 {
        return None;
    }
    Some(acc.sequential_ack_count as f64 / acc.total_acks as f64)
}

/// Acknowledged bytes per second: mean segment size times acknowledged segments over the run.
pub fn throughput(acc: &Accumulators, run_duration: time::Duration) -> f64 {
    let secs = run_duration.as_secs_f64();
    if acc.ack_count == 0 || secs <= 0.0 {
        return 0.0;
    }
    let mean_segment_size = acc.sent_bytes as f64 / acc.ack_count as f64;
    mean_segment_size * acc.ack_count as f64 / secs
}

/// Mean of `samples`, or positive infinity when there are none.
pub fn average_rtt(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return f64::INFINITY;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// RFC 3550 interarrival jitter estimator applied to consecutive RTT samples:
///
///   J <- J + (|D| - J) / 16
pub fn jitter(samples: &[f64]) -> f64 {
    samples.windows(2).fold(0.0, |j, pair| {
        let d = (pair[1] - pair[0]).abs();
        j + (d - j) / 16.0
    })
}

/// Percentage of sent packets for which no ack arrived. Zero if nothing was sent.
pub fn loss_rate(acc: &Accumulators) -> f64 {
    if acc.total_sent_packets == 0 {
        return 0.0;
    }
    let sent = acc.total_sent_packets as f64;
    (sent - acc.total_acks as f64) / sent * 100.0
}

/// Summary metrics of one run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub duplicate_ack_percentage: f64,
    pub sequential_ack_ratio: f64,
    /// Bytes per second.
    pub throughput: f64,
    /// Positive infinity when no RTT sample was taken (serialized as `null`).
    pub average_rtt_ms: f64,
    pub jitter_ms: f64,
    pub loss_rate: f64,
}

impl MetricsSnapshot {
    pub fn from_accumulators(acc: &Accumulators, run_duration: time::Duration) -> Self {
        let duplicate_ack_percentage = duplicate_ack_ratio(acc).map(|r| r * 100.0);
        let sequential_ack_ratio = sequential_ack_ratio(acc);

        if duplicate_ack_percentage.is_none() {
            debug!("no acks received, ack ratios unavailable");
        }
        if acc.rtt_samples.is_empty() {
            debug!("no rtt samples, average rtt unavailable");
        }

        let rtt_ms: Vec<f64> = acc.rtt_samples.iter().map(|s| s * 1000.0).collect();

        Self {
            duplicate_ack_percentage: duplicate_ack_percentage.unwrap_or(0.0),
            sequential_ack_ratio: sequential_ack_ratio.unwrap_or(0.0),
            throughput: throughput(acc, run_duration),
            average_rtt_ms: average_rtt(&rtt_ms),
            jitter_ms: jitter(&rtt_ms),
            loss_rate: loss_rate(acc),
        }
    }
}

/// Everything a sender surfaces after its run: summary metrics plus the window history for
/// charting.
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub strategy: StrategyKind,
    pub packets_sent: u64,
    pub acks_received: u64,
    pub metrics: MetricsSnapshot,
    pub cwnd_history: Vec<f64>,
    pub ssthresh_history: Vec<f64>,
}

impl RunReport {
    pub fn new(strategy: StrategyKind, acc: &Accumulators, run_duration: time::Duration) -> Self {
        Self {
            strategy,
            packets_sent: acc.total_sent_packets,
            acks_received: acc.total_acks,
            metrics: MetricsSnapshot::from_accumulators(acc, run_duration),
            cwnd_history: acc.cwnd_history.clone(),
            ssthresh_history: acc.ssthresh_history.clone(),
        }
    }
}
