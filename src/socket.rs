use std::io;
use std::net;
use std::time;

use super::message::DATAGRAM_SIZE_MAX;

const SOCKET_POLLING_KEY: usize = 0;

/// Which readiness events a wait should report.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Interest {
    Read,
    ReadWrite,
}

/// Result of a readiness wait. Both flags are false if the wait timed out.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
}

/// A non-blocking UDP endpoint with its own poller. Exactly one is owned by each sender or
/// receiver.
pub struct Socket {
    socket: net::UdpSocket,
    // Cached from socket initialization
    local_addr: net::SocketAddr,
    // Polling objects
    poller: polling::Poller,
    poller_events: polling::Events,
    // Always-allocated receive buffer
    recv_buffer: Box<[u8]>,
}

impl Socket {
    pub fn bind<A>(bind_address: A) -> io::Result<Self>
    where
        A: net::ToSocketAddrs,
    {
        let socket = net::UdpSocket::bind(bind_address)?;
        socket.set_nonblocking(true)?;

        let local_addr = socket.local_addr()?;

        let poller = polling::Poller::new()?;

        // SAFETY: the socket is removed from the poller in Drop, before it is closed
        unsafe {
            poller.add(&socket, polling::Event::readable(SOCKET_POLLING_KEY))?;
        }

        Ok(Self {
            socket,
            local_addr,
            poller,
            poller_events: polling::Events::new(),
            recv_buffer: vec![0; DATAGRAM_SIZE_MAX].into_boxed_slice(),
        })
    }

    /// Sends a datagram. Returns Ok(false) if the socket buffer is full and the datagram was not
    /// sent.
    pub fn send_to(&self, datagram: &[u8], addr: &net::SocketAddr) -> io::Result<bool> {
        match self.socket.send_to(datagram, addr) {
            Ok(_) => Ok(true),
            Err(err) => match err.kind() {
                io::ErrorKind::WouldBlock => Ok(false),
                _ => Err(err),
            },
        }
    }

    /// If a datagram can be read from the socket, returns it. Returns Ok(None) otherwise.
    pub fn try_recv_from(&mut self) -> io::Result<Option<(&[u8], net::SocketAddr)>> {
        match self.socket.recv_from(&mut self.recv_buffer) {
            Ok((len, sender_addr)) => Ok(Some((&self.recv_buffer[..len], sender_addr))),
            Err(err) => match err.kind() {
                // The only acceptable error is WouldBlock, indicating no datagram
                io::ErrorKind::WouldBlock => Ok(None),
                _ => Err(err),
            },
        }
    }

    /// Blocks for up to `timeout` until the socket is ready for `interest`.
    pub fn wait(
        &mut self,
        interest: Interest,
        timeout: Option<time::Duration>,
    ) -> io::Result<Readiness> {
        let event = match interest {
            Interest::Read => polling::Event::readable(SOCKET_POLLING_KEY),
            Interest::ReadWrite => polling::Event::all(SOCKET_POLLING_KEY),
        };

        // Interest is oneshot and must be re-armed prior to each wait() call
        self.poller.modify(&self.socket, event)?;

        self.poller_events.clear();

        let mut readiness = Readiness::default();

        match self.poller.wait(&mut self.poller_events, timeout) {
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::Interrupted => return Ok(readiness),
            Err(err) => return Err(err),
        }

        for ev in self.poller_events.iter() {
            if ev.key == SOCKET_POLLING_KEY {
                readiness.readable |= ev.readable;
                readiness.writable |= ev.writable;
            }
        }

        Ok(readiness)
    }

    /// Returns the pending socket error (`SO_ERROR`), if any, as an Err.
    pub fn check_error(&self) -> io::Result<()> {
        match self.socket.take_error()? {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn local_addr(&self) -> net::SocketAddr {
        self.local_addr
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        let _ = self.poller.delete(&self.socket);
    }
}
