use tracing::debug;

use super::{AckOutcome, Flow, StrategyConfig, WindowState};
use crate::message::{Ack, Packet};

/// Cubic scaling constant.
pub const CUBIC_C: f64 = 0.4;

/// W(t) = C * (t - K)^3 + W_max, K = cbrt(W_max / C)
///
/// `t` is the time in seconds since the current epoch began. The curve passes through `cwnd_max`
/// at `t = K`; at `t = 0` the cubic term cancels `cwnd_max` entirely, so the result is floored at
/// one data unit.
pub fn cubic_window(t: f64, cwnd_max: f64) -> f64 {
    let k = (cwnd_max / CUBIC_C).cbrt();
    (CUBIC_C * (t - k).powi(3) + cwnd_max).max(1.0)
}

#[derive(Debug)]
pub struct Cubic {
    pub(super) flow: Flow,
    cwnd: f64,
    ssthresh: f64,
    cwnd_max: f64,
    epoch_start: f64,
}

impl Cubic {
    pub(super) fn new(config: &StrategyConfig, now: f64) -> Self {
        Self {
            flow: Flow::new(config, now),
            cwnd: config.initial_cwnd,
            ssthresh: config.ssthresh,
            cwnd_max: config.initial_cwnd,
            epoch_start: now,
        }
    }

    pub fn cwnd(&self) -> f64 {
        self.cwnd
    }

    pub fn ssthresh(&self) -> f64 {
        self.ssthresh
    }

    pub fn cwnd_max(&self) -> f64 {
        self.cwnd_max
    }

    pub fn epoch_start(&self) -> f64 {
        self.epoch_start
    }

    pub(super) fn window(&self) -> WindowState {
        WindowState {
            cwnd: self.cwnd,
            ssthresh: self.ssthresh,
            cwnd_max: Some(self.cwnd_max),
            epoch_start: Some(self.epoch_start),
        }
    }

    pub(super) fn may_send(&mut self, now: f64) -> bool {
        self.flow.window_open(self.cwnd) && self.flow.pacing_permits(now)
    }

    pub(super) fn build_packet(&mut self, now: f64) -> Packet {
        self.flow.build_packet(now)
    }

    pub(super) fn on_ack(&mut self, ack: &Ack, now: f64) -> AckOutcome {
        let outcome = self.flow.process_ack(ack, now);

        match outcome {
            AckOutcome::New => {
                self.handle_ack(now);
                self.flow.acc.record_window(self.cwnd, self.ssthresh);
            }
            AckOutcome::RetransmitTriggered => {
                self.handle_drop(now);
            }
            AckOutcome::Duplicate | AckOutcome::Ignored => {}
        }

        outcome
    }

    fn handle_ack(&mut self, now: f64) {
        if self.cwnd < self.ssthresh {
            // Slow start
            self.cwnd += 1.0;
        } else {
            self.cwnd = cubic_window(now - self.epoch_start, self.cwnd_max);
        }
    }

    fn handle_drop(&mut self, now: f64) {
        // The curve restarts from a single unit rather than from the pre-loss window
        let cwnd_before = self.cwnd;

        self.ssthresh = (self.cwnd / 2.0).floor().max(1.0);
        self.cwnd = 1.0;
        self.cwnd_max = 1.0;
        self.epoch_start = now;

        debug!(
            cwnd_before,
            ssthresh = self.ssthresh,
            "cubic epoch reset"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{ack_for, config};
    use super::super::{Strategy, StrategyKind};
    use super::*;

    fn cubic(initial_cwnd: f64, ssthresh: f64, now: f64) -> Cubic {
        Cubic::new(&config(StrategyKind::Cubic, initial_cwnd, ssthresh), now)
    }

    #[test]
    fn curve_passes_through_cwnd_max_at_k() {
        for cwnd_max in [1.0, 10.0, 42.5, 1000.0] {
            let k = (cwnd_max / CUBIC_C).cbrt();
            assert!((cubic_window(k, cwnd_max) - cwnd_max).abs() < 1e-9);
        }
    }

    #[test]
    fn curve_at_epoch_start_is_floored() {
        // C * (0 - K)^3 == -cwnd_max, so t = 0 does not give back cwnd_max
        assert_eq!(cubic_window(0.0, 10.0), 1.0);
        assert_eq!(cubic_window(0.0, 1000.0), 1.0);
    }

    #[test]
    fn curve_is_concave_then_convex() {
        let cwnd_max = 50.0;
        let k = (cwnd_max / CUBIC_C).cbrt();

        let before = cubic_window(k - 1.0, cwnd_max);
        let after = cubic_window(k + 1.0, cwnd_max);
        assert!((before - (cwnd_max - CUBIC_C)).abs() < 1e-9);
        assert!((after - (cwnd_max + CUBIC_C)).abs() < 1e-9);
        assert!(cubic_window(k + 5.0, cwnd_max) > after);
    }

    #[test]
    fn slow_start_below_ssthresh() {
        let mut cc = cubic(1.0, 4.0, 0.0);

        for i in 0..3 {
            let packet = cc.build_packet(i as f64);
            cc.on_ack(&ack_for(&packet), i as f64 + 0.01);
        }
        assert_eq!(cc.cwnd(), 4.0);
    }

    #[test]
    fn growth_follows_time_above_ssthresh() {
        let mut cc = cubic(8.0, 8.0, 0.0);
        let k = (8.0 / CUBIC_C).cbrt();

        let packet = cc.build_packet(k);
        cc.on_ack(&ack_for(&packet), k);
        assert!((cc.cwnd() - 8.0).abs() < 1e-9);

        let packet = cc.build_packet(k + 2.0);
        cc.on_ack(&ack_for(&packet), k + 2.0);
        assert!((cc.cwnd() - cubic_window(k + 2.0, 8.0)).abs() < 1e-9);
        assert_eq!(cc.flow.acc.cwnd_history.len(), 2);
    }

    #[test]
    fn triple_duplicate_restarts_epoch() {
        let mut cc = cubic(1.0, 64.0, 0.0);

        let mut packets = Vec::new();
        for i in 0..9 {
            let packet = cc.build_packet(i as f64);
            cc.on_ack(&ack_for(&packet), i as f64 + 0.01);
            packets.push(packet);
        }
        assert_eq!(cc.cwnd(), 10.0);

        let dup = ack_for(&packets[8]);
        cc.on_ack(&dup, 30.0);
        cc.on_ack(&dup, 30.0);
        assert_eq!(cc.on_ack(&dup, 30.0), AckOutcome::RetransmitTriggered);

        assert_eq!(cc.ssthresh(), 5.0);
        assert_eq!(cc.cwnd(), 1.0);
        assert_eq!(cc.cwnd_max(), 1.0);
        assert_eq!(cc.epoch_start(), 30.0);
    }

    #[test]
    fn window_collapses_on_reaching_ssthresh() {
        // cwnd_max starts at the initial window, far below where slow start ends
        let mut cc = cubic(1.0, 2.0, 0.0);

        let packet = cc.build_packet(0.0);
        cc.on_ack(&ack_for(&packet), 0.01);
        assert_eq!(cc.cwnd(), 2.0);

        // First ack in the cubic region: t is well before K = cbrt(1 / C), so the curve is
        // floored and the window drops to 1 with no loss
        let packet = cc.build_packet(0.02);
        cc.on_ack(&ack_for(&packet), 0.03);
        assert_eq!(cc.cwnd(), 1.0);
        assert_eq!(cc.cwnd_max(), 1.0);
        assert_eq!(cc.flow.acc.duplicate_acks, 0);
        assert_eq!(cc.flow.acc.cwnd_history, vec![2.0, 1.0]);
    }

    #[test]
    fn window_open_invariant() {
        let mut strategy = Strategy::new(&config(StrategyKind::Cubic, 2.0, 64.0), 0.0).unwrap();

        assert!(strategy.may_send(1.0));
        let first = strategy.build_packet(1.0);
        assert!(strategy.may_send(1.0));
        strategy.build_packet(1.0);

        // seq_num - next_ack == cwnd
        assert!(!strategy.may_send(1.0));

        strategy.on_ack(&ack_for(&first), 1.1);
        assert_eq!(strategy.window().unwrap().cwnd, 3.0);
        assert!(strategy.may_send(1.1));
    }

    #[test]
    fn pacing_gate_measures_time_since_start() {
        let mut strategy = Strategy::new(&config(StrategyKind::Cubic, 4.0, 64.0), 5.0).unwrap();

        // No time has passed since the strategy was created, so no draw can be exceeded
        assert!(!strategy.may_send(5.0));
        // Long after creation every draw is exceeded, however recently the last packet left
        strategy.build_packet(6.0);
        assert!(strategy.may_send(6.0));
    }
}
