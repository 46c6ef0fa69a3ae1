/*

https://intronetworks.cs.luc.edu/current/html/reno.html
https://www.rfc-editor.org/rfc/rfc3550#appendix-A.8

ccsim runs congestion control strategies over plain UDP. A sender paces and windows data units
according to its strategy, a receiver acknowledges every unit it sees, and the sender derives
throughput, loss and latency from the acknowledgments. It is a teaching analogue of TCP operating
on JSON messages, not TCP on the wire.

# Handshake

The receiver knows the sender's address; the sender does not know the receiver's. The receiver
sends {"handshake": true} (resending every 500ms), the sender records the source address and
echoes a handshake back. No data is sent before the sender has learned its peer.

# Strategies

All strategies share sequence allocation and ack bookkeeping. Every data unit is registered in an
unacknowledged set when sent. An ack for a registered unit is new: it is removed, an RTT sample
is taken, and

  next_ack <- max(next_ack, seq + 1)

An ack for a unit which is not registered is a duplicate. The third duplicate in a row for the
same sequence number is treated as cumulative: everything up to and including it is forgotten,
and sending resumes right after it. There is no retransmit timer; loss is only ever detected this
way.

Fixed-rate sends on a Poisson schedule with no window. After each send the next send time is

  next_send_time <- now + Exp(λ)

AIMD and Cubic require the window to be open

  seq_num - next_ack < cwnd

and additionally that the time since the strategy was created exceeds a freshly drawn Exp(λ).
Once the run has been going for a few multiples of 1/λ, the second condition almost always holds.

AIMD, in slow start (cwnd < ssthresh), each new ack increases cwnd by:

  cwnd <- cwnd + 1

In congestion avoidance, each new ack increases cwnd by:

  cwnd <- cwnd + 1/cwnd

On a triple duplicate:

  ssthresh <- max(1, floor(cwnd / 2))
  cwnd <- ssthresh

Cubic uses the same slow start below ssthresh. Above it, cwnd follows time since the epoch began:

  cwnd <- max(1, C * (t - K)^3 + cwnd_max),  K = cbrt(cwnd_max / C),  C = 0.4

On a triple duplicate, ssthresh is halved as above, but cwnd and cwnd_max both restart from 1 and
a new epoch begins. This is harsher than the usual cubic reduction.

# Event loop

Each sender and each receiver owns one non-blocking socket and one poller, and runs on a single
thread. Before every wait the sender asks its strategy whether a unit may be sent; write readiness
is only requested if so. Waits are bounded by a short idle tick, so pacing never sleeps through
incoming acks. A pending socket error ends the run.

# Metrics

  duplicate ack ratio   duplicate_acks / total_acks
  sequential ack ratio  sequential_acks / total_acks
  throughput            mean segment size * new acks / run duration
  average RTT           mean of RTT samples (infinite if none)
  jitter                J <- J + (|RTT_i - RTT_i-1| - J) / 16
  loss rate             (sent - total_acks) / sent * 100

*/

pub mod error;
pub mod experiment;
pub mod message;
pub mod metrics;
pub mod receiver;
pub mod sender;
mod socket;
pub mod strategy;
pub mod tracker;

pub use error::{ConfigError, DecodeError, Error, Result};
pub use message::{Ack, Message, Packet};
pub use metrics::{MetricsSnapshot, RunReport};
pub use receiver::{Receiver, ReceiverReport};
pub use sender::Sender;
pub use strategy::{AckOutcome, Strategy, StrategyConfig, StrategyKind};
