use std::net;
use std::time;

use tracing::{debug, info, warn};

use super::error::{ConfigError, Error, Result};
use super::message::Message;
use super::metrics::RunReport;
use super::socket;
use super::strategy::{Strategy, StrategyConfig};

const HANDSHAKE_TIMEOUT_DEFAULT_MS: u64 = 10_000;
const HANDSHAKE_TIMEOUT_MIN_MS: u64 = 100;

const IDLE_TICK_DEFAULT_MS: u64 = 1;
const IDLE_TICK_MIN_MS: u64 = 1;
const IDLE_TICK_MAX_MS: u64 = 1_000;

/// Configuration for a [`Sender`] object.
#[derive(Clone, Debug)]
pub struct Config {
    /// Time to wait for the receiver's handshake, in milliseconds.
    ///
    /// Minimum value: 100 \
    /// Default value: 10,000
    pub handshake_timeout_ms: u64,

    /// Longest readiness wait while no packet is eligible to be sent, in milliseconds.
    ///
    /// Minimum value: 1 \
    /// Maximum value: 1,000 \
    /// Default value: 1
    pub idle_tick_ms: u64,

    /// Time to keep collecting acks after sending stops, in milliseconds.
    ///
    /// Default value: 0
    pub linger_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: HANDSHAKE_TIMEOUT_DEFAULT_MS,
            idle_tick_ms: IDLE_TICK_DEFAULT_MS,
            linger_ms: 0,
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
        if !(IDLE_TICK_MIN_MS..=IDLE_TICK_MAX_MS).contains(&self.idle_tick_ms) {
            return Err(ConfigError::OutOfRange {
                name: "idle_tick_ms",
                min: IDLE_TICK_MIN_MS,
                max: IDLE_TICK_MAX_MS,
                value: self.idle_tick_ms,
            });
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    Init,
    Handshaking,
    Running,
    Terminated,
}

/// The sending half of a simulated flow: one socket, one strategy, one thread.
pub struct Sender {
    // Saved configuration
    config: Config,
    // Flow timestamps are computed relative to this instant
    time_ref: time::Instant,
    socket: socket::Socket,
    strategy: Strategy,
    state: State,
    peer_addr: Option<net::SocketAddr>,
}

impl Sender {
    /// Equivalent to calling [`Sender::bind_with_config`] with default configuration.
    pub fn bind<A>(bind_address: A, strategy_config: &StrategyConfig) -> Result<Self>
    where
        A: net::ToSocketAddrs,
    {
        Self::bind_with_config(bind_address, strategy_config, Default::default())
    }

    /// Validates both configurations, binds a UDP socket to the provided address and creates the
    /// flow's strategy. Configuration errors are reported before the socket is created.
    pub fn bind_with_config<A>(
        bind_address: A,
        strategy_config: &StrategyConfig,
        config: Config,
    ) -> Result<Self>
    where
        A: net::ToSocketAddrs,
    {
        config.validate()?;

        let time_ref = time::Instant::now();
        let strategy = Strategy::new(strategy_config, 0.0)?;

        let socket = socket::Socket::bind(bind_address)?;

        Ok(Self {
            config,
            time_ref,
            socket,
            strategy,
            state: State::Init,
            peer_addr: None,
        })
    }

    /// Seconds elapsed on this flow's clock.
    fn now(&self) -> f64 {
        self.time_ref.elapsed().as_secs_f64()
    }

    /// Waits for a handshake from the receiver, records its address and echoes a handshake back.
    /// Does nothing if the handshake has already completed.
    pub fn handshake(&mut self) -> Result<net::SocketAddr> {
        if let Some(peer_addr) = self.peer_addr {
            return Ok(peer_addr);
        }

        self.state = State::Handshaking;

        let timeout = time::Duration::from_millis(self.config.handshake_timeout_ms);
        let deadline = time::Instant::now() + timeout;

        info!(local_addr = %self.socket.local_addr(), "waiting for handshake");

        loop {
            let now = time::Instant::now();
            if now >= deadline {
                self.state = State::Terminated;
                return Err(Error::HandshakeTimeout {
                    timeout_ms: self.config.handshake_timeout_ms,
                });
            }

            let ready = self
                .socket
                .wait(socket::Interest::Read, Some(deadline - now))
                .map_err(Error::Channel)?;

            if !ready.readable {
                continue;
            }

            while let Some((bytes, addr)) = self.socket.try_recv_from().map_err(Error::Channel)? {
                match Message::decode(bytes) {
                    Ok(Message::Handshake) => {
                        self.socket
                            .send_to(&Message::Handshake.encode(), &addr)
                            .map_err(Error::Channel)?;

                        info!(peer_addr = %addr, "handshake complete");

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

    /// Performs the handshake if necessary, then sends for `duration` under the flow's strategy
    /// and returns the run's metrics. Channel errors end the run immediately.
    pub fn run(&mut self, duration: time::Duration) -> Result<RunReport> {
        let peer_addr = self.handshake()?;

        let result = self.run_active(peer_addr, duration);

        self.state = State::Terminated;

        result?;

        let acc = self.strategy.accumulators();

        info!(
            strategy = %self.strategy.kind(),
            sent = acc.total_sent_packets,
            acks = acc.total_acks,
            "run complete"
        );

        Ok(RunReport::new(self.strategy.kind(), acc, duration))
    }

    fn run_active(&mut self, peer_addr: net::SocketAddr, duration: time::Duration) -> Result<()> {
        let idle_tick = time::Duration::from_millis(self.config.idle_tick_ms);

        let run_begin = time::Instant::now();
        let send_deadline = run_begin + duration;
        let linger_deadline = send_deadline + time::Duration::from_millis(self.config.linger_ms);

        loop {
            let now = time::Instant::now();
            if now >= linger_deadline {
                return Ok(());
            }

            self.socket.check_error().map_err(Error::Channel)?;

            let sending = now < send_deadline;
            let flow_now = self.now();

            let (interest, wait_until) = if sending && self.strategy.may_send(flow_now) {
                (socket::Interest::ReadWrite, send_deadline)
            } else if sending {
                (socket::Interest::Read, send_deadline)
            } else {
                (socket::Interest::Read, linger_deadline)
            };

            let timeout = idle_tick.min(wait_until.saturating_duration_since(now));

            let ready = self
                .socket
                .wait(interest, Some(timeout))
                .map_err(Error::Channel)?;

            if ready.readable {
                self.receive_acks(peer_addr)?;
            }

            if ready.writable && interest == socket::Interest::ReadWrite {
                self.send_packet(peer_addr)?;
            }
        }
    }

    fn send_packet(&mut self, peer_addr: net::SocketAddr) -> Result<()> {
        let now = self.now();
        let packet = self.strategy.build_packet(now);

        let sent = self
            .socket
            .send_to(&Message::Data(packet).encode(), &peer_addr)
            .map_err(Error::Channel)?;

        if sent {
            debug!(seq = packet.sequence_number, window = ?self.strategy.window(), "sent");
        } else {
            // Left to the duplicate-ack machinery, like any other loss
            debug!(seq = packet.sequence_number, "socket buffer full, packet dropped");
        }

        Ok(())
    }

    /// Reads and processes as many datagrams as possible without blocking. Repeated handshakes
    /// from the peer are answered again.
    fn receive_acks(&mut self, peer_addr: net::SocketAddr) -> Result<()> {
        loop {
            let now = self.now();

            let message = match self.socket.try_recv_from().map_err(Error::Channel)? {
                None => return Ok(()),
                Some((_, addr)) if addr != peer_addr => {
                    debug!(from = %addr, "ignoring datagram from unknown address");
                    continue;
                }
                Some((bytes, _)) => Message::decode(bytes),
            };

            let ack = match message {
                // Our echo was lost and the receiver is still waiting for it
                Ok(Message::Handshake) => {
                    debug!(%peer_addr, "handshake repeated, echoing again");
                    self.socket
                        .send_to(&Message::Handshake.encode(), &peer_addr)
                        .map_err(Error::Channel)?;
                    continue;
                }
                Ok(message) => message.into_ack(),
                Err(err) => {
                    warn!(%err, "dropping malformed datagram");
                    continue;
                }
            };

            match ack {
                Some(ack) => {
                    let outcome = self.strategy.on_ack(&ack, now);
                    debug!(seq = ack.sequence_number, ?outcome, "ack");
                }
                None => {
                    warn!("dropping data unit received by sender");
                }
            }
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn local_addr(&self) -> net::SocketAddr {
        self.socket.local_addr()
    }

    pub fn peer_addr(&self) -> Option<net::SocketAddr> {
        self.peer_addr
    }
}
