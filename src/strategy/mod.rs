//! Congestion window strategies.
//!
//! A [`Strategy`] decides when the next data unit may leave and how its window reacts to
//! acknowledgments. The set of strategies is closed and chosen once per flow, so dispatch is a
//! plain `match` rather than a trait object.

mod aimd;
mod cubic;
mod pacing;

use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, warn};

use super::error::ConfigError;
use super::message::{Ack, Packet};
use super::metrics::Accumulators;
use super::tracker::UnackedSet;

pub use super::tracker::AckOutcome;
pub use aimd::{Aimd, Phase};
pub use cubic::{cubic_window, Cubic, CUBIC_C};
pub use pacing::PacingOnly;

const INITIAL_CWND_DEFAULT: f64 = 1.0;
const SSTHRESH_DEFAULT: f64 = 64.0;
const RATE_LAMBDA_DEFAULT: f64 = 100.0;
const SEGMENT_SIZE_DEFAULT: u32 = 1000;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
pub enum StrategyKind {
    /// Exponentially paced sending with no congestion window.
    #[serde(rename = "fixed")]
    PacingOnly,
    /// Reno-style additive increase, multiplicative decrease.
    #[serde(rename = "aimd")]
    Aimd,
    /// Cubic-style time-based growth.
    #[serde(rename = "cubic")]
    Cubic,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::PacingOnly => write!(f, "fixed"),
            StrategyKind::Aimd => write!(f, "aimd"),
            StrategyKind::Cubic => write!(f, "cubic"),
        }
    }
}

impl FromStr for StrategyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fixed" | "pacing" | "poisson" => Ok(StrategyKind::PacingOnly),
            "aimd" | "reno" => Ok(StrategyKind::Aimd),
            "cubic" => Ok(StrategyKind::Cubic),
            _ => Err(ConfigError::UnknownStrategy(s.to_string())),
        }
    }
}

/// Tuning parameters for a [`Strategy`].
#[derive(Clone, Debug)]
pub struct StrategyConfig {
    pub kind: StrategyKind,

    /// Initial congestion window, in data units. Ignored by [`StrategyKind::PacingOnly`].
    ///
    /// Minimum value: 1 \
    /// Default value: 1
    pub initial_cwnd: f64,

    /// Initial slow start threshold, in data units. Ignored by [`StrategyKind::PacingOnly`].
    ///
    /// Minimum value: 1 \
    /// Default value: 64
    pub ssthresh: f64,

    /// Rate parameter λ of the exponential inter-departure delay, in units per second.
    ///
    /// Default value: 100
    pub rate_lambda: f64,

    /// Size credited for each data unit, in bytes.
    ///
    /// Default value: 1000
    pub segment_size: u32,

    /// Seed for the pacing generator. A random seed is used if `None`.
    pub seed: Option<u64>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            kind: StrategyKind::Aimd,
            initial_cwnd: INITIAL_CWND_DEFAULT,
            ssthresh: SSTHRESH_DEFAULT,
            rate_lambda: RATE_LAMBDA_DEFAULT,
            segment_size: SEGMENT_SIZE_DEFAULT,
            seed: None,
        }
    }
}

impl StrategyConfig {
    pub fn new(kind: StrategyKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.rate_lambda.is_finite() && self.rate_lambda > 0.0) {
            return Err(ConfigError::RateLambda(self.rate_lambda));
        }
        if !(self.initial_cwnd.is_finite() && self.initial_cwnd >= 1.0) {
            return Err(ConfigError::InitialCwnd(self.initial_cwnd));
        }
        if !(self.ssthresh.is_finite() && self.ssthresh >= 1.0) {
            return Err(ConfigError::Ssthresh(self.ssthresh));
        }
        if self.segment_size == 0 {
            return Err(ConfigError::SegmentSize);
        }
        Ok(())
    }
}

/// Window state of a windowed strategy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WindowState {
    pub cwnd: f64,
    pub ssthresh: f64,
    /// Window before the most recent loss (cubic only).
    pub cwnd_max: Option<f64>,
    /// Flow time at which the current cubic epoch began (cubic only).
    pub epoch_start: Option<f64>,
}

/// Bookkeeping common to every strategy: sequence allocation, the unacknowledged set, ack
/// classification and the run accumulators.
#[derive(Debug)]
pub(crate) struct Flow {
    // Next sequence number to send
    seq_num: u64,
    // One past the highest sequence number ever sent
    sent_limit: u64,
    // One past the highest sequence number acknowledged so far
    next_ack: u64,
    // Sequence number which would continue the previous new ack
    expected_next_ack: u64,
    // Flow time at which the strategy was created
    start_time: f64,
    rate_lambda: f64,
    segment_size: u32,
    unacked: UnackedSet,
    acc: Accumulators,
    rng: StdRng,
}

impl Flow {
    fn new(config: &StrategyConfig, now: f64) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            seq_num: 0,
            sent_limit: 0,
            next_ack: 0,
            expected_next_ack: 0,
            start_time: now,
            rate_lambda: config.rate_lambda,
            segment_size: config.segment_size,
            unacked: UnackedSet::new(),
            acc: Accumulators::new(),
            rng,
        }
    }

    /// Draws an exponentially distributed delay with mean 1/λ seconds.
    fn inter_departure(&mut self) -> f64 {
        // gen() samples [0, 1), so the logarithm's argument is never zero
        let u: f64 = self.rng.gen();
        -(1.0 - u).ln() / self.rate_lambda
    }

    /// Time since the strategy was created exceeds a freshly drawn delay. Note that this is not
    /// the time since the previous send.
    fn pacing_permits(&mut self, now: f64) -> bool {
        now - self.start_time > self.inter_departure()
    }

    fn in_flight(&self) -> u64 {
        self.seq_num.saturating_sub(self.next_ack)
    }

    fn window_open(&self, cwnd: f64) -> bool {
        (self.in_flight() as f64) < cwnd
    }

    fn build_packet(&mut self, now: f64) -> Packet {
        let packet = Packet {
            sequence_number: self.seq_num,
            send_timestamp: now,
            payload_size: self.segment_size,
        };

        self.unacked.register(packet.sequence_number, now);
        self.seq_num += 1;
        self.sent_limit = self.sent_limit.max(self.seq_num);
        self.acc.total_sent_packets += 1;

        packet
    }

    /// Classifies `ack` and updates every counter except the window history. On a triggered
    /// retransmit, everything through the acknowledged number is forgotten and sending resumes
    /// just after it. Acks for sequence numbers which were never sent are dropped.
    fn process_ack(&mut self, ack: &Ack, now: f64) -> AckOutcome {
        if ack.is_handshake {
            return AckOutcome::Ignored;
        }

        let seq = ack.sequence_number;

        if seq >= self.sent_limit {
            warn!(seq, sent_limit = self.sent_limit, "dropping ack for unsent sequence number");
            return AckOutcome::Ignored;
        }

        self.acc.total_acks += 1;
        self.acc.ack_events.push((now - self.start_time, seq));

        let outcome = self.unacked.acknowledge(seq);

        match outcome {
            AckOutcome::New => {
                if seq == self.expected_next_ack {
                    self.acc.sequential_ack_count += 1;
                }
                self.expected_next_ack = seq.saturating_add(1);
                self.next_ack = self.next_ack.max(seq.saturating_add(1));

                self.acc.ack_count += 1;
                self.acc.sent_bytes += u64::from(ack.ack_bytes);
                self.acc.rtt_samples.push(now - ack.send_timestamp);
            }
            AckOutcome::Duplicate => {
                self.acc.duplicate_acks += 1;
            }
            AckOutcome::RetransmitTriggered => {
                self.acc.duplicate_acks += 1;

                let purged = self.unacked.purge_through(seq);
                self.seq_num = seq.saturating_add(1);

                debug!(seq, purged, "triple duplicate ack, resuming after it");
            }
            AckOutcome::Ignored => {}
        }

        outcome
    }
}

/// A congestion control strategy, fixed for the lifetime of a flow.
#[derive(Debug)]
pub enum Strategy {
    PacingOnly(PacingOnly),
    Aimd(Aimd),
    Cubic(Cubic),
}

impl Strategy {
    /// Validates `config` and creates a strategy whose clock starts at `now` (seconds).
    pub fn new(config: &StrategyConfig, now: f64) -> Result<Self, ConfigError> {
        config.validate()?;

        let strategy = match config.kind {
            StrategyKind::PacingOnly => Strategy::PacingOnly(PacingOnly::new(config, now)),
            StrategyKind::Aimd => Strategy::Aimd(Aimd::new(config, now)),
            StrategyKind::Cubic => Strategy::Cubic(Cubic::new(config, now)),
        };

        Ok(strategy)
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::PacingOnly(_) => StrategyKind::PacingOnly,
            Strategy::Aimd(_) => StrategyKind::Aimd,
            Strategy::Cubic(_) => StrategyKind::Cubic,
        }
    }

    /// Returns true if a new data unit may be sent at time `now`.
    pub fn may_send(&mut self, now: f64) -> bool {
        match self {
            Strategy::PacingOnly(s) => s.may_send(now),
            Strategy::Aimd(s) => s.may_send(now),
            Strategy::Cubic(s) => s.may_send(now),
        }
    }

    /// Allocates the next sequence number and registers it as in flight.
    pub fn build_packet(&mut self, now: f64) -> Packet {
        match self {
            Strategy::PacingOnly(s) => s.build_packet(now),
            Strategy::Aimd(s) => s.build_packet(now),
            Strategy::Cubic(s) => s.build_packet(now),
        }
    }

    /// Processes an acknowledgment received at time `now`. Handshake markers are ignored.
    pub fn on_ack(&mut self, ack: &Ack, now: f64) -> AckOutcome {
        match self {
            Strategy::PacingOnly(s) => s.on_ack(ack, now),
            Strategy::Aimd(s) => s.on_ack(ack, now),
            Strategy::Cubic(s) => s.on_ack(ack, now),
        }
    }

    /// Current window, or `None` for strategies without one.
    pub fn window(&self) -> Option<WindowState> {
        match self {
            Strategy::PacingOnly(_) => None,
            Strategy::Aimd(s) => Some(s.window()),
            Strategy::Cubic(s) => Some(s.window()),
        }
    }

    fn flow(&self) -> &Flow {
        match self {
            Strategy::PacingOnly(s) => &s.flow,
            Strategy::Aimd(s) => &s.flow,
            Strategy::Cubic(s) => &s.flow,
        }
    }

    pub fn accumulators(&self) -> &Accumulators {
        &self.flow().acc
    }

    /// Sequence number the next data unit will carry.
    pub fn next_sequence(&self) -> u64 {
        self.flow().seq_num
    }

    /// One past the highest acknowledged sequence number.
    pub fn next_ack(&self) -> u64 {
        self.flow().next_ack
    }

    /// Number of sequence numbers still awaiting acknowledgment.
    pub fn unacked_len(&self) -> usize {
        self.flow().unacked.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    // Large enough that every pacing draw is far below a millisecond
    pub const INSTANT_LAMBDA: f64 = 1e9;

    pub fn config(kind: StrategyKind, initial_cwnd: f64, ssthresh: f64) -> StrategyConfig {
        StrategyConfig {
            kind,
            initial_cwnd,
            ssthresh,
            rate_lambda: INSTANT_LAMBDA,
            segment_size: 1000,
            seed: Some(7),
        }
    }

    pub fn ack_for(packet: &Packet) -> Ack {
        Ack::for_packet(packet)
    }

    #[test]
    fn parse_kind() {
        assert_eq!("reno".parse::<StrategyKind>(), Ok(StrategyKind::Aimd));
        assert_eq!("AIMD".parse::<StrategyKind>(), Ok(StrategyKind::Aimd));
        assert_eq!("cubic".parse::<StrategyKind>(), Ok(StrategyKind::Cubic));
        assert_eq!("fixed".parse::<StrategyKind>(), Ok(StrategyKind::PacingOnly));
        assert_eq!(
            "bbr".parse::<StrategyKind>(),
            Err(ConfigError::UnknownStrategy("bbr".into()))
        );
    }

    #[test]
    fn invalid_config_rejected() {
        let mut bad = config(StrategyKind::Aimd, 1.0, 64.0);
        bad.rate_lambda = 0.0;
        assert!(matches!(
            Strategy::new(&bad, 0.0),
            Err(ConfigError::RateLambda(_))
        ));

        let mut bad = config(StrategyKind::Cubic, 0.5, 64.0);
        assert!(matches!(
            Strategy::new(&bad, 0.0),
            Err(ConfigError::InitialCwnd(_))
        ));

        bad.initial_cwnd = 1.0;
        bad.ssthresh = f64::NAN;
        assert!(matches!(
            Strategy::new(&bad, 0.0),
            Err(ConfigError::Ssthresh(_))
        ));

        let mut bad = config(StrategyKind::PacingOnly, 1.0, 1.0);
        bad.segment_size = 0;
        assert!(matches!(
            Strategy::new(&bad, 0.0),
            Err(ConfigError::SegmentSize)
        ));
    }

    #[test]
    fn inter_departure_mean() {
        let config = StrategyConfig {
            rate_lambda: 10.0,
            seed: Some(1),
            ..Default::default()
        };
        let mut flow = Flow::new(&config, 0.0);

        let n = 20_000;
        let mean = (0..n).map(|_| flow.inter_departure()).sum::<f64>() / n as f64;
        assert!((mean - 0.1).abs() < 0.01, "mean inter-departure {}", mean);
    }

    #[test]
    fn handshake_ack_is_ignored() {
        for kind in [StrategyKind::PacingOnly, StrategyKind::Aimd, StrategyKind::Cubic] {
            let mut strategy = Strategy::new(&config(kind, 4.0, 64.0), 0.0).unwrap();
            strategy.build_packet(1.0);

            let window = strategy.window();
            assert_eq!(
                strategy.on_ack(&Ack::handshake(), 1.0),
                AckOutcome::Ignored
            );

            let acc = strategy.accumulators();
            assert_eq!(acc.total_acks, 0);
            assert!(acc.ack_events.is_empty());
            assert!(acc.cwnd_history.is_empty());
            assert_eq!(strategy.window(), window);
        }
    }

    #[test]
    fn ack_for_unsent_sequence_is_dropped() {
        for kind in [StrategyKind::PacingOnly, StrategyKind::Aimd, StrategyKind::Cubic] {
            let mut strategy = Strategy::new(&config(kind, 1.0, 64.0), 0.0).unwrap();
            let first = strategy.build_packet(1.0);

            for seq in [1, 1_000_000, u64::MAX] {
                let bogus = Ack {
                    sequence_number: seq,
                    ..ack_for(&first)
                };
                for _ in 0..3 {
                    assert_eq!(strategy.on_ack(&bogus, 2.0), AckOutcome::Ignored);
                }
            }

            assert_eq!(strategy.next_sequence(), 1);
            assert_eq!(strategy.next_ack(), 0);
            assert_eq!(strategy.accumulators().total_acks, 0);
            assert_eq!(strategy.accumulators().duplicate_acks, 0);

            // The real ack still opens the window
            assert_eq!(strategy.on_ack(&ack_for(&first), 2.0), AckOutcome::New);
            assert!(strategy.may_send(100.0));
        }
    }

    #[test]
    fn ack_after_sequence_snap_back_is_accepted() {
        let mut strategy = Strategy::new(&config(StrategyKind::Aimd, 10.0, 64.0), 0.0).unwrap();
        let packets: Vec<Packet> = (0..6).map(|i| strategy.build_packet(i as f64)).collect();

        strategy.on_ack(&ack_for(&packets[1]), 7.0);
        for _ in 0..3 {
            strategy.on_ack(&ack_for(&packets[1]), 7.0);
        }
        assert_eq!(strategy.next_sequence(), 2);

        // 4 was sent before the snap and is still in flight
        assert_eq!(strategy.on_ack(&ack_for(&packets[4]), 8.0), AckOutcome::New);
    }

    #[test]
    fn ack_bookkeeping() {
        let mut strategy = Strategy::new(&config(StrategyKind::Aimd, 10.0, 64.0), 0.0).unwrap();

        let packets: Vec<Packet> = (0..4)
            .map(|i| strategy.build_packet(1.0 + i as f64 * 0.1))
            .collect();
        assert_eq!(strategy.next_sequence(), 4);
        assert_eq!(strategy.unacked_len(), 4);

        // Only the ack for 0 arrives where expected; 2 jumps ahead and 1, 3 follow out of order
        assert_eq!(strategy.on_ack(&ack_for(&packets[0]), 2.0), AckOutcome::New);
        assert_eq!(strategy.on_ack(&ack_for(&packets[2]), 2.0), AckOutcome::New);
        assert_eq!(strategy.on_ack(&ack_for(&packets[1]), 2.0), AckOutcome::New);
        assert_eq!(strategy.on_ack(&ack_for(&packets[2]), 2.0), AckOutcome::Duplicate);
        assert_eq!(strategy.on_ack(&ack_for(&packets[3]), 2.0), AckOutcome::New);

        let acc = strategy.accumulators();
        assert_eq!(acc.total_acks, 5);
        assert_eq!(acc.ack_count, 4);
        assert_eq!(acc.duplicate_acks, 1);
        assert_eq!(acc.sequential_ack_count, 1);
        assert_eq!(acc.sent_bytes, 4000);
        assert_eq!(acc.rtt_samples.len(), 4);
        assert!((acc.rtt_samples[0] - 1.0).abs() < 1e-9);
        assert_eq!(acc.ack_events.len(), 5);
        assert_eq!(acc.ack_events[1], (2.0, 2));
        assert_eq!(strategy.next_ack(), 4);
        assert_eq!(strategy.unacked_len(), 0);
    }

    #[test]
    fn sequential_ratio_is_one_for_in_order_acks() {
        let mut strategy = Strategy::new(&config(StrategyKind::Cubic, 32.0, 64.0), 0.0).unwrap();

        for i in 0..20 {
            let packet = strategy.build_packet(1.0);
            assert_eq!(packet.sequence_number, i);
            strategy.on_ack(&ack_for(&packet), 1.5);
        }

        let ratio = crate::metrics::sequential_ack_ratio(strategy.accumulators());
        assert_eq!(ratio, Some(1.0));
    }
}
