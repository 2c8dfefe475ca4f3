//! Error types for message passing.
//!
//! Two very different failure classes exist:
//!
//! - [`SendError`] is ordinary backpressure. The sender keeps the refused
//!   message and retries once notified that capacity freed up.
//! - [`WiringError`] describes a programming error in how ports and
//!   connections were assembled. These are raised as panics: a miswired
//!   model cannot produce a meaningful simulation.

use thiserror::Error;

use crate::msg::Msg;
use crate::types::{MsgId, PortId};

/// A message could not be accepted.
#[derive(Debug, Error)]
pub enum SendError<M: Msg> {
    /// The sending port's buffer on the connection is at capacity. The
    /// message is handed back unchanged.
    #[error("connection buffer full")]
    BufferFull(M),
}

impl<M: Msg> SendError<M> {
    /// Returns the refused message.
    pub fn into_msg(self) -> M {
        match self {
            SendError::BufferFull(msg) => msg,
        }
    }

    /// Returns a reference to the refused message.
    pub fn msg(&self) -> &M {
        match self {
            SendError::BufferFull(msg) => msg,
        }
    }
}

/// Invalid port/connection assembly or routing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WiringError {
    #[error("message {msg} has no source port")]
    MissingSource { msg: MsgId },

    #[error("message {msg} has no destination port")]
    MissingDestination { msg: MsgId },

    #[error("message {msg} is sent from {port} to itself")]
    SelfLoop { msg: MsgId, port: PortId },

    #[error("source {port} of message {msg} is not plugged into this connection")]
    UnknownSource { msg: MsgId, port: PortId },

    #[error("destination {port} of message {msg} is not plugged into this connection")]
    UnknownDestination { msg: MsgId, port: PortId },

    #[error("port {name} ({port}) is already plugged in")]
    DuplicatePort { name: String, port: PortId },

    #[error("port {name} is not plugged into any connection")]
    Unconnected { name: String },

    #[error("buffer capacity of port {name} must be positive")]
    ZeroCapacity { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg::SampleMsg;

    #[test]
    fn test_send_error_returns_message() {
        let err = SendError::BufferFull(SampleMsg::new("m1"));
        assert_eq!(err.to_string(), "connection buffer full");
        assert_eq!(err.msg().meta.id, "m1");

        let msg = err.into_msg();
        assert_eq!(msg.meta.id, "m1");
    }

    #[test]
    fn test_wiring_error_messages() {
        let err = WiringError::MissingSource { msg: "m7".into() };
        assert_eq!(err.to_string(), "message m7 has no source port");

        let port = PortId::next();
        let err = WiringError::SelfLoop {
            msg: "m8".into(),
            port,
        };
        assert!(err.to_string().contains("to itself"));
        assert!(err.to_string().contains(&port.to_string()));
    }
}
