//! Messages exchanged between a sender and a receiver, one per datagram.
//!
//! Messages are JSON objects distinguished by their field names:
//!
//! ```text
//! handshake:  {"handshake": true}
//! data:       {"sequence_number": 7, "send_timestamp": 1.25, "sent_bytes": 1000}
//! ack:        {"sequence_number": 7, "send_timestamp": 1.25, "ack_bytes": 1000}
//! ```

use serde::{Deserialize, Serialize};

use super::error::DecodeError;

/// Largest datagram either side will send or accept.
pub const DATAGRAM_SIZE_MAX: usize = 1600;

/// A data unit, created by a strategy when it is permitted to send.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Packet {
    pub sequence_number: u64,
    /// Seconds on the sending flow's clock.
    pub send_timestamp: f64,
    pub payload_size: u32,
}

/// An acknowledgment of a single data unit, or the handshake marker.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ack {
    pub sequence_number: u64,
    pub ack_bytes: u32,
    /// Echoed from the acknowledged packet.
    pub send_timestamp: f64,
    pub is_handshake: bool,
}

impl Ack {
    pub fn handshake() -> Self {
        Self {
            sequence_number: 0,
            ack_bytes: 0,
            send_timestamp: 0.0,
            is_handshake: true,
        }
    }

    /// Builds the acknowledgment a receiver returns for `packet`.
    pub fn for_packet(packet: &Packet) -> Self {
        Self {
            sequence_number: packet.sequence_number,
            ack_bytes: packet.payload_size,
            send_timestamp: packet.send_timestamp,
            is_handshake: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Message {
    Handshake,
    Data(Packet),
    Ack(Ack),
}

// Field layout on the wire. Variant order matters: a data unit is recognized by `sent_bytes`,
// an ack by `ack_bytes`.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum Wire {
    Handshake {
        handshake: bool,
    },
    Data {
        sequence_number: u64,
        send_timestamp: f64,
        sent_bytes: u32,
    },
    Ack {
        sequence_number: u64,
        send_timestamp: f64,
        ack_bytes: u32,
    },
}

impl Message {
    pub fn encode(&self) -> Vec<u8> {
        let wire = match *self {
            Message::Handshake => Wire::Handshake { handshake: true },
            Message::Data(packet) => Wire::Data {
                sequence_number: packet.sequence_number,
                send_timestamp: packet.send_timestamp,
                sent_bytes: packet.payload_size,
            },
            Message::Ack(ack) if ack.is_handshake => Wire::Handshake { handshake: true },
            Message::Ack(ack) => Wire::Ack {
                sequence_number: ack.sequence_number,
                send_timestamp: ack.send_timestamp,
                ack_bytes: ack.ack_bytes,
            },
        };

        // Serializing plain numeric fields cannot fail
        serde_json::to_vec(&wire).unwrap_or_default()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() > DATAGRAM_SIZE_MAX {
            return Err(DecodeError::Oversize(bytes.len()));
        }

        let message = match serde_json::from_slice::<Wire>(bytes)? {
            Wire::Handshake { handshake: true } => Message::Handshake,
            Wire::Handshake { handshake: false } => return Err(DecodeError::InvalidHandshake),
            Wire::Data {
                sequence_number,
                send_timestamp,
                sent_bytes,
            } => Message::Data(Packet {
                sequence_number,
                send_timestamp,
                payload_size: sent_bytes,
            }),
            Wire::Ack {
                sequence_number,
                send_timestamp,
                ack_bytes,
            } => Message::Ack(Ack {
                sequence_number,
                ack_bytes,
                send_timestamp,
                is_handshake: false,
            }),
        };

        Ok(message)
    }

    /// Interprets this message as input to a strategy's ack processor. Data units are not
    /// acknowledgments and yield `None`.
    pub fn into_ack(self) -> Option<Ack> {
        match self {
            Message::Handshake => Some(Ack::handshake()),
            Message::Ack(ack) => Some(ack),
            Message::Data(_) => None,
        }
    }
}
