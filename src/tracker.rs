//            next_ack         seq_num
//            v                v
// ---********#_##_#_#_#_#_#___--------> sequence numbers
//
// *: acknowledged
// #: in flight (tracked)
// _: acknowledged out of order

use std::collections::BTreeMap;

/// Number of duplicate acks for one sequence number which signals a loss.
pub const DUP_ACK_THRESHOLD: u32 = 3;

/// Classification of an incoming acknowledgment.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AckOutcome {
    /// First ack for an in-flight sequence number.
    New,
    /// Ack for a sequence number which is not in flight.
    Duplicate,
    /// Third duplicate for the same sequence number; the sender should resume after it.
    RetransmitTriggered,
    /// Handshake marker or an ack for a sequence number never sent. No bookkeeping performed.
    Ignored,
}

/// Sequence numbers sent but not yet acknowledged, with duplicate-ack detection.
#[derive(Debug, Default)]
pub struct UnackedSet {
    // Send timestamp of each in-flight sequence number
    in_flight: BTreeMap<u64, f64>,
    // Sequence number referenced by the current run of duplicates
    dup_seq: Option<u64>,
    dup_count: u32,
}

impl UnackedSet {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn register(&mut self, seq: u64, send_timestamp: f64) {
        self.in_flight.insert(seq, send_timestamp);
    }

    /// Removes `seq` if it is in flight. Otherwise counts a duplicate against `seq`; a duplicate
    /// for a different sequence number than the last one starts a new count. Duplicates never
    /// re-insert.
    pub fn acknowledge(&mut self, seq: u64) -> AckOutcome {
        if self.in_flight.remove(&seq).is_some() {
            return AckOutcome::New;
        }

        if self.dup_seq == Some(seq) {
            self.dup_count += 1;
        } else {
            self.dup_seq = Some(seq);
            self.dup_count = 1;
        }

        if self.dup_count >= DUP_ACK_THRESHOLD {
            // Loss episode closed, the next duplicate begins a new one
            self.dup_seq = None;
            self.dup_count = 0;
            AckOutcome::RetransmitTriggered
        } else {
            AckOutcome::Duplicate
        }
    }

    /// Treats an ack for `seq` as cumulative: forgets every tracked sequence number `<= seq`.
    /// Returns the number of entries removed.
    pub fn purge_through(&mut self, seq: u64) -> usize {
        let keep = match seq.checked_add(1) {
            Some(next) => self.in_flight.split_off(&next),
            None => BTreeMap::new(),
        };
        let purged = self.in_flight.len();
        self.in_flight = keep;
        purged
    }

    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// Duplicates counted so far in the current loss episode.
    pub fn duplicate_count(&self) -> u32 {
        self.dup_count
    }
}
