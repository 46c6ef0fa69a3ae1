use std::net;
use std::time;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::error::{ConfigError, Error, Result};
use super::message::{Ack, Message, Packet};
use super::socket;

const HANDSHAKE_TIMEOUT_DEFAULT_MS: u64 = 10_000;
const HANDSHAKE_TIMEOUT_MIN_MS: u64 = 100;

const HANDSHAKE_RESEND_TIMEOUT_MS: u64 = 500;

const RECEIVE_WAIT_DEFAULT_MS: u64 = 1_000;
const RECEIVE_WAIT_MIN_MS: u64 = 1;

/// Configuration for a [`Receiver`] object.
#[derive(Clone, Debug)]
pub struct Config {
    /// Time to wait for the sender's handshake reply, in milliseconds.
    ///
    /// Minimum value: 100 \
    /// Default value: 10,000
    pub handshake_timeout_ms: u64,

    /// Longest single wait for a datagram while running, in milliseconds. Bounds how late the
    /// receiver notices the end of its run.
    ///
    /// Minimum value: 1 \
    /// Default value: 1,000
    pub receive_wait_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: HANDSHAKE_TIMEOUT_DEFAULT_MS,
            receive_wait_ms: RECEIVE_WAIT_DEFAULT_MS,
        }
    }
}

impl Config {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.handshake_timeout_ms < HANDSHAKE_TIMEOUT_MIN_MS {
            return Err(ConfigError::OutOfRange {
                name: "handshake_timeout_ms",
                min: HANDSHAKE_TIMEOUT_MIN_MS,
                max: u64::MAX,
                value: self.handshake_timeout_ms,
            });
        }
        if self.receive_wait_ms < RECEIVE_WAIT_MIN_MS {
            return Err(ConfigError::OutOfRange {
                name: "receive_wait_ms",
                min: RECEIVE_WAIT_MIN_MS,
                max: u64::MAX,
                value: self.receive_wait_ms,
            });
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    WaitingHandshake,
    Running,
    Terminated,
}

/// Arrival order statistics of one run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReceiverReport {
    pub total_received: u64,
    pub in_order: u64,
    pub out_of_order: u64,
    /// `in_order / total_received`, or 0 if nothing arrived.
    pub order_ratio: f64,
}

/// Log of received data units. An arrival counts as out of order when its sequence number is
/// below that of the arrival before it.
#[derive(Debug, Default)]
pub struct ArrivalLog {
    received: Vec<Packet>,
    last_sequence: Option<u64>,
    out_of_order: u64,
}

impl ArrivalLog {
    pub fn new() -> Self {
        Default::default()
    }

    /// Appends `packet`, returning false if it arrived out of order.
    pub fn record(&mut self, packet: Packet) -> bool {
        let in_order = match self.last_sequence {
            Some(last) => packet.sequence_number >= last,
            None => true,
        };

        if !in_order {
            self.out_of_order += 1;
        }

        self.last_sequence = Some(packet.sequence_number);
        self.received.push(packet);

        in_order
    }

    pub fn received(&self) -> &[Packet] {
        &self.received
    }

    pub fn report(&self) -> ReceiverReport {
        let total_received = self.received.len() as u64;
        let in_order = total_received - self.out_of_order;

        let order_ratio = if total_received > 0 {
            in_order as f64 / total_received as f64
        } else {
            0.0
        };

        ReceiverReport {
            total_received,
            in_order,
            out_of_order: self.out_of_order,
            order_ratio,
        }
    }
}

/// The receiving half of a simulated flow. Acknowledges every data unit it receives.
pub struct Receiver {
    // Saved configuration
    config: Config,
    socket: socket::Socket,
    // Where handshakes are sent until the sender replies
    sender_addr: net::SocketAddr,
    // Address the sender's handshake reply came from
    peer_addr: Option<net::SocketAddr>,
    state: State,
    log: ArrivalLog,
}

impl Receiver {
    /// Equivalent to calling [`Receiver::connect_with_config`] with default configuration.
    pub fn connect<A>(bind_address: A, sender_addr: net::SocketAddr) -> Result<Self>
    where
        A: net::ToSocketAddrs,
    {
        Self::connect_with_config(bind_address, sender_addr, Default::default())
    }

    /// Binds a UDP socket to the provided address and sends a handshake to the sender.
    pub fn connect_with_config<A>(
        bind_address: A,
        sender_addr: net::SocketAddr,
        config: Config,
    ) -> Result<Self>
    where
        A: net::ToSocketAddrs,
    {
        config.validate()?;

        let socket = socket::Socket::bind(bind_address)?;

        socket.send_to(&Message::Handshake.encode(), &sender_addr)?;

        Ok(Self {
            config,
            socket,
            sender_addr,
            peer_addr: None,
            state: State::WaitingHandshake,
            log: ArrivalLog::new(),
        })
    }

    /// Blocks until the sender's handshake arrives, resending ours periodically. Returns the
    /// sender's address.
    pub fn wait_handshake(&mut self) -> Result<net::SocketAddr> {
        if let Some(peer_addr) = self.peer_addr {
            return Ok(peer_addr);
        }

        let timeout = time::Duration::from_millis(self.config.handshake_timeout_ms);
        let resend_timeout = time::Duration::from_millis(HANDSHAKE_RESEND_TIMEOUT_MS);

        let deadline = time::Instant::now() + timeout;
        let mut resend_time = time::Instant::now() + resend_timeout;

        loop {
            let now = time::Instant::now();
            if now >= deadline {
                self.state = State::Terminated;
                return Err(Error::HandshakeTimeout {
                    timeout_ms: self.config.handshake_timeout_ms,
                });
            }

            if now >= resend_time {
                debug!(sender_addr = %self.sender_addr, "resending handshake");
                self.socket
                    .send_to(&Message::Handshake.encode(), &self.sender_addr)
                    .map_err(Error::Channel)?;
                resend_time = now + resend_timeout;
            }

            let ready = self
                .socket
                .wait(socket::Interest::Read, Some(deadline.min(resend_time) - now))
                .map_err(Error::Channel)?;

            if !ready.readable {
                continue;
            }

            while let Some((bytes, addr)) = self.socket.try_recv_from().map_err(Error::Channel)? {
                match Message::decode(bytes) {
                    Ok(Message::Handshake) => {
                        info!(peer_addr = %addr, "handshake received");

                        self.peer_addr = Some(addr);
                        self.state = State::Running;
                        return Ok(addr);
                    }
                    Ok(other) => {
                        debug!(?other, from = %addr, "ignoring message before handshake");
                    }
                    Err(err) => {
                        warn!(%err, from = %addr, "dropping malformed datagram");
                    }
                }
            }
        }
    }

    /// Completes the handshake if necessary, then receives and acknowledges data units for
    /// `duration`.
    pub fn run(&mut self, duration: time::Duration) -> Result<ReceiverReport> {
        let peer_addr = self.wait_handshake()?;

        let result = self.run_active(peer_addr, duration);

        self.state = State::Terminated;

        result?;

        let report = self.log.report();

        info!(
            total = report.total_received,
            out_of_order = report.out_of_order,
            order_ratio = report.order_ratio,
            "receiver finished"
        );

        Ok(report)
    }

    fn run_active(&mut self, peer_addr: net::SocketAddr, duration: time::Duration) -> Result<()> {
        let receive_wait = time::Duration::from_millis(self.config.receive_wait_ms);
        let deadline = time::Instant::now() + duration;

        loop {
            let now = time::Instant::now();
            if now >= deadline {
                return Ok(());
            }

            self.socket.check_error().map_err(Error::Channel)?;

            let ready = self
                .socket
                .wait(socket::Interest::Read, Some(receive_wait.min(deadline - now)))
                .map_err(Error::Channel)?;

            if ready.readable {
                self.receive_packets(peer_addr)?;
            }
        }
    }

    /// Reads, logs and acknowledges as many data units as possible without blocking.
    fn receive_packets(&mut self, peer_addr: net::SocketAddr) -> Result<()> {
        loop {
            let message = match self.socket.try_recv_from().map_err(Error::Channel)? {
                None => return Ok(()),
                Some((_, addr)) if addr != peer_addr => {
                    debug!(from = %addr, "ignoring datagram from unknown address");
                    continue;
                }
                Some((bytes, _)) => Message::decode(bytes),
            };

            let packet = match message {
                Ok(Message::Data(packet)) => packet,
                Ok(other) => {
                    debug!(?other, "ignoring non-data message");
                    continue;
                }
                Err(err) => {
                    warn!(%err, "dropping malformed datagram");
                    continue;
                }
            };

            let in_order = self.log.record(packet);
            debug!(seq = packet.sequence_number, in_order, "received");

            let ack = Message::Ack(Ack::for_packet(&packet));
            if !self
                .socket
                .send_to(&ack.encode(), &peer_addr)
                .map_err(Error::Channel)?
            {
                debug!(seq = packet.sequence_number, "socket buffer full, ack dropped");
            }
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn local_addr(&self) -> net::SocketAddr {
        self.socket.local_addr()
    }

    pub fn peer_addr(&self) -> Option<net::SocketAddr> {
        self.peer_addr
    }
}
