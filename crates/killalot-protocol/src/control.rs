//! Link-control datagrams: heartbeat, peer requests and peer errors.
//!
//! CTLREQ and CTLERR share one payload layout: `[kind, code, 0, 0, 0, 0, 0, 0]`.

use std::fmt;

use killalot_frame::{indicator, Datagram, PAYLOAD_LEN};
use serde::Serialize;

/// What a CTLREQ asks of the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Stop,
    Resend,
    Unknown(u8),
}

impl RequestKind {
    pub fn from_wire(kind: u8) -> Self {
        match kind {
            0 => RequestKind::Stop,
            1 => RequestKind::Resend,
            other => RequestKind::Unknown(other),
        }
    }

    pub fn wire_code(self) -> u8 {
        match self {
            RequestKind::Stop => 0,
            RequestKind::Resend => 1,
            RequestKind::Unknown(other) => other,
        }
    }
}

/// What went wrong on the peer, as reported by CTLERR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkErrorKind {
    BufferFull,
    Unknown(u8),
}

impl NetworkErrorKind {
    pub fn from_wire(kind: u8) -> Self {
        match kind {
            0 => NetworkErrorKind::BufferFull,
            other => NetworkErrorKind::Unknown(other),
        }
    }

    pub fn wire_code(self) -> u8 {
        match self {
            NetworkErrorKind::BufferFull => 0,
            NetworkErrorKind::Unknown(other) => other,
        }
    }
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkErrorKind::BufferFull => f.write_str("buffer full"),
            NetworkErrorKind::Unknown(kind) => write!(f, "unknown error kind {kind}"),
        }
    }
}

/// A single-datagram control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    Heartbeat,
    Request { kind: RequestKind, code: u8 },
    Error { kind: NetworkErrorKind, code: u8 },
}

impl ControlMessage {
    pub fn to_datagram(&self) -> Datagram {
        let (ind, kind, code) = match *self {
            ControlMessage::Heartbeat => (indicator::HEARTBEAT, 0, 0),
            ControlMessage::Request { kind, code } => (indicator::CTLREQ, kind.wire_code(), code),
            ControlMessage::Error { kind, code } => (indicator::CTLERR, kind.wire_code(), code),
        };
        let mut payload = [0u8; PAYLOAD_LEN];
        payload[0] = kind;
        payload[1] = code;
        Datagram::new([ind, 0, 0, 0], payload)
    }

    /// `None` when the datagram is not a control datagram.
    pub fn from_datagram(datagram: &Datagram) -> Option<Self> {
        let [kind, code, ..] = datagram.payload;
        match datagram.indicator() {
            indicator::HEARTBEAT => Some(ControlMessage::Heartbeat),
            indicator::CTLREQ => Some(ControlMessage::Request {
                kind: RequestKind::from_wire(kind),
                code,
            }),
            indicator::CTLERR => Some(ControlMessage::Error {
                kind: NetworkErrorKind::from_wire(kind),
                code,
            }),
            _ => None,
        }
    }
}
