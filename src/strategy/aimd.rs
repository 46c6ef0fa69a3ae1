// This implementation of TCP-Reno-like congestion control has been informed by:
// https://intronetworks.cs.luc.edu/current/html/reno.html
//
// Windows are counted in data units and kept fractional so that congestion avoidance can add
// 1/cwnd per ack.

use tracing::debug;

use super::{AckOutcome, Flow, StrategyConfig, WindowState};
use crate::message::{Ack, Packet};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    SlowStart,
    CongestionAvoidance,
}

#[derive(Debug)]
pub struct Aimd {
    pub(super) flow: Flow,
    cwnd: f64,
    ssthresh: f64,
}

impl Aimd {
    pub(super) fn new(config: &StrategyConfig, now: f64) -> Self {
        Self {
            flow: Flow::new(config, now),
            cwnd: config.initial_cwnd,
            ssthresh: config.ssthresh,
        }
    }

    pub fn phase(&self) -> Phase {
        if self.cwnd < self.ssthresh {
            Phase::SlowStart
        } else {
            Phase::CongestionAvoidance
        }
    }

    pub fn cwnd(&self) -> f64 {
        self.cwnd
    }

    pub fn ssthresh(&self) -> f64 {
        self.ssthresh
    }

    pub(super) fn window(&self) -> WindowState {
        WindowState {
            cwnd: self.cwnd,
            ssthresh: self.ssthresh,
            cwnd_max: None,
            epoch_start: None,
        }
    }

    /// Window open and paced.
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
                self.handle_ack();
                self.flow.acc.record_window(self.cwnd, self.ssthresh);
            }
            AckOutcome::RetransmitTriggered => {
                self.handle_drop();
            }
            AckOutcome::Duplicate | AckOutcome::Ignored => {}
        }

        outcome
    }

    fn handle_ack(&mut self) {
        match self.phase() {
            Phase::SlowStart => {
                // One unit per ack doubles cwnd each RTT [19.2]
                self.cwnd += 1.0;
            }
            Phase::CongestionAvoidance => {
                // 1/cwnd per ack, one unit per RTT [19.2.1]
                self.cwnd += 1.0 / self.cwnd;
            }
        }
    }

    fn handle_drop(&mut self) {
        // Halve cwnd and continue in congestion avoidance [19.4]
        let cwnd_before = self.cwnd;

        self.ssthresh = (self.cwnd / 2.0).floor().max(1.0);
        self.cwnd = self.ssthresh;

        debug!(
            cwnd_before,
            cwnd = self.cwnd,
            ssthresh = self.ssthresh,
            "aimd multiplicative decrease"
        );
    }
}
