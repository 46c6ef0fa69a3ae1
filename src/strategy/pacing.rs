use super::{AckOutcome, Flow, StrategyConfig};
use crate::message::{Ack, Packet};

/// Sends on a Poisson schedule with no congestion window. A triple duplicate only moves the next
/// sequence number past the duplicated one.
#[derive(Debug)]
pub struct PacingOnly {
    pub(super) flow: Flow,
    // Flow time at which the next packet becomes eligible
    next_send_time: f64,
}

impl PacingOnly {
    pub(super) fn new(config: &StrategyConfig, now: f64) -> Self {
        Self {
            flow: Flow::new(config, now),
            next_send_time: now,
        }
    }

    pub fn next_send_time(&self) -> f64 {
        self.next_send_time
    }

    pub(super) fn may_send(&mut self, now: f64) -> bool {
        now >= self.next_send_time
    }

    pub(super) fn build_packet(&mut self, now: f64) -> Packet {
        let packet = self.flow.build_packet(now);
        self.next_send_time = now + self.flow.inter_departure();
        packet
    }

    pub(super) fn on_ack(&mut self, ack: &Ack, now: f64) -> AckOutcome {
        self.flow.process_ack(ack, now)
    }
}
