//! Message definitions.
//!
//! Every message exchanged through a connection carries a [`MsgMeta`]
//! envelope: identity, source and destination ports, send time and the
//! receive time stamped by the connection on delivery. Concrete message
//! types expose their envelope through the [`Msg`] trait; connections and
//! ports are generic over the message type, so each network is statically
//! typed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{MsgId, PortId, SimTime};

/// Routing and timing envelope of a message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgMeta {
    /// Unique identifier of the message
    pub id: MsgId,
    /// The port the message is sent through
    pub src: Option<PortId>,
    /// The port that should receive the message
    pub dst: Option<PortId>,
    /// Time at which the sender handed the message to its port
    pub send_time: SimTime,
    /// Time at which the connection delivered the message (unset before)
    pub recv_time: Option<SimTime>,
}

impl MsgMeta {
    /// Creates an envelope with the given id and no routing yet.
    pub fn new(id: impl Into<MsgId>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Sets the source port.
    pub fn with_src(mut self, src: PortId) -> Self {
        self.src = Some(src);
        self
    }

    /// Sets the destination port.
    pub fn with_dst(mut self, dst: PortId) -> Self {
        self.dst = Some(dst);
        self
    }

    /// Sets the send time.
    pub fn with_send_time(mut self, time: SimTime) -> Self {
        self.send_time = time;
        self
    }

    /// Returns true once the message has been delivered.
    pub fn is_delivered(&self) -> bool {
        self.recv_time.is_some()
    }
}

/// Behavior shared by every message type.
pub trait Msg: fmt::Debug + 'static {
    /// Returns the routing envelope.
    fn meta(&self) -> &MsgMeta;

    /// Returns the routing envelope for modification.
    fn meta_mut(&mut self) -> &mut MsgMeta;
}

/// A payload-free message, useful for traffic generation and tests.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleMsg {
    /// The envelope
    pub meta: MsgMeta,
}

impl SampleMsg {
    /// Creates a sample message with the given id.
    pub fn new(id: impl Into<MsgId>) -> Self {
        Self {
            meta: MsgMeta::new(id),
        }
    }

    /// Creates a routed sample message.
    pub fn routed(id: impl Into<MsgId>, src: PortId, dst: PortId, send_time: SimTime) -> Self {
        Self {
            meta: MsgMeta::new(id)
                .with_src(src)
                .with_dst(dst)
                .with_send_time(send_time),
        }
    }
}

impl Msg for SampleMsg {
    fn meta(&self) -> &MsgMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut MsgMeta {
        &mut self.meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_builder() {
        let src = PortId::next();
        let dst = PortId::next();
        let meta = MsgMeta::new("m1")
            .with_src(src)
            .with_dst(dst)
            .with_send_time(10);

        assert_eq!(meta.id, "m1");
        assert_eq!(meta.src, Some(src));
        assert_eq!(meta.dst, Some(dst));
        assert_eq!(meta.send_time, 10);
        assert!(!meta.is_delivered());
    }

    #[test]
    fn test_sample_msg_unrouted_by_default() {
        let msg = SampleMsg::new("m2");
        assert!(msg.meta().src.is_none());
        assert!(msg.meta().dst.is_none());
        assert_eq!(msg.meta().recv_time, None);
    }

    #[test]
    fn test_sample_msg_routed() {
        let src = PortId::next();
        let dst = PortId::next();
        let mut msg = SampleMsg::routed("m3", src, dst, 7);

        msg.meta_mut().recv_time = Some(8);

        assert_eq!(msg.meta().send_time, 7);
        assert!(msg.meta().is_delivered());
    }
}
