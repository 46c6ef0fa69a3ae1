use std::net;
use std::time;

use ccsim::experiment::FlowConfig;
use ccsim::Message;

/// Loopback flow parameters for short test runs.
pub fn short_flow(duration_ms: u64, linger_ms: u64) -> FlowConfig {
    let mut config = FlowConfig {
        duration: time::Duration::from_millis(duration_ms),
        ..Default::default()
    };
    config.sender.handshake_timeout_ms = 2_000;
    config.sender.linger_ms = linger_ms;
    config.receiver.handshake_timeout_ms = 2_000;
    config.receiver.receive_wait_ms = 10;
    config
}

/// A blocking UDP socket standing in for one side of a flow.
pub struct RawPeer {
    pub socket: net::UdpSocket,
}

impl RawPeer {
    pub fn bind() -> Self {
        let socket = net::UdpSocket::bind(("127.0.0.1", 0)).unwrap();
        socket
            .set_read_timeout(Some(time::Duration::from_secs(2)))
            .unwrap();
        Self { socket }
    }

    pub fn local_addr(&self) -> net::SocketAddr {
        self.socket.local_addr().unwrap()
    }

    pub fn send(&self, message: Message, addr: net::SocketAddr) {
        self.socket.send_to(&message.encode(), addr).unwrap();
    }

    /// Blocks until a message arrives, or panics after the read timeout.
    pub fn recv(&self) -> (Message, net::SocketAddr) {
        let mut buf = [0u8; 1600];
        let (len, addr) = self.socket.recv_from(&mut buf).unwrap();
        (Message::decode(&buf[..len]).unwrap(), addr)
    }
}
