//! Memory-system models: request/response protocol, backing storage and the
//! components that speak it.

pub mod cache;
pub mod ideal_memory;
pub mod storage;

use serde::{Deserialize, Serialize};

use crate::msg::{Msg, MsgMeta};
use crate::types::{MsgId, PortId, SimTime};

pub use ideal_memory::IdealMemory;
pub use storage::Storage;

/// Control commands accepted by components with a control port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlCmd {
    /// Stop the data pipeline.
    Pause,
    /// Restart the data pipeline.
    Continue,
    /// Drop every cached block.
    Invalidate,
}

/// What a memory message asks for or answers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemPayload {
    ReadReq { address: u64, size: u64 },
    WriteReq { address: u64, data: Vec<u8> },
    DataReady { respond_to: MsgId, data: Vec<u8> },
    WriteDone { respond_to: MsgId },
    Control(ControlCmd),
    ControlAck { respond_to: MsgId, cmd: ControlCmd },
}

/// A message on a memory network.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemMsg {
    pub meta: MsgMeta,
    pub payload: MemPayload,
}

impl MemMsg {
    fn with_payload(id: impl Into<MsgId>, dst: PortId, now: SimTime, payload: MemPayload) -> Self {
        Self {
            meta: MsgMeta::new(id).with_dst(dst).with_send_time(now),
            payload,
        }
    }

    /// Read `size` bytes at `address`.
    pub fn read(id: impl Into<MsgId>, dst: PortId, now: SimTime, address: u64, size: u64) -> Self {
        Self::with_payload(id, dst, now, MemPayload::ReadReq { address, size })
    }

    /// Write `data` at `address`.
    pub fn write(id: impl Into<MsgId>, dst: PortId, now: SimTime, address: u64, data: Vec<u8>) -> Self {
        Self::with_payload(id, dst, now, MemPayload::WriteReq { address, data })
    }

    /// Answer to a read.
    pub fn data_ready(id: impl Into<MsgId>, req: &MemMsg, now: SimTime, data: Vec<u8>) -> Self {
        Self::with_payload(
            id,
            reply_port(req),
            now,
            MemPayload::DataReady {
                respond_to: req.meta.id.clone(),
                data,
            },
        )
    }

    /// Answer to a write.
    pub fn write_done(id: impl Into<MsgId>, req: &MemMsg, now: SimTime) -> Self {
        Self::with_payload(
            id,
            reply_port(req),
            now,
            MemPayload::WriteDone {
                respond_to: req.meta.id.clone(),
            },
        )
    }

    /// A control command.
    pub fn control(id: impl Into<MsgId>, dst: PortId, now: SimTime, cmd: ControlCmd) -> Self {
        Self::with_payload(id, dst, now, MemPayload::Control(cmd))
    }

    /// Acknowledgement of a control command.
    pub fn control_ack(id: impl Into<MsgId>, req: &MemMsg, now: SimTime, cmd: ControlCmd) -> Self {
        Self::with_payload(
            id,
            reply_port(req),
            now,
            MemPayload::ControlAck {
                respond_to: req.meta.id.clone(),
                cmd,
            },
        )
    }

    /// Returns the target address of a request.
    pub fn address(&self) -> Option<u64> {
        match &self.payload {
            MemPayload::ReadReq { address, .. } | MemPayload::WriteReq { address, .. } => {
                Some(*address)
            }
            _ => None,
        }
    }

    /// Returns the id of the request this message answers.
    pub fn respond_to(&self) -> Option<&MsgId> {
        match &self.payload {
            MemPayload::DataReady { respond_to, .. }
            | MemPayload::WriteDone { respond_to }
            | MemPayload::ControlAck { respond_to, .. } => Some(respond_to),
            _ => None,
        }
    }
}

impl Msg for MemMsg {
    fn meta(&self) -> &MsgMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut MsgMeta {
        &mut self.meta
    }
}

fn reply_port(req: &MemMsg) -> PortId {
    match req.meta.src {
        Some(src) => src,
        None => panic!("request {} has no source port to reply to", req.meta.id),
    }
}

/// Finds the lower-level port serving an address.
pub trait LowModuleFinder {
    fn find(&self, address: u64) -> PortId;
}

/// Sends every address to the same port.
#[derive(Clone, Copy, Debug)]
pub struct SingleLowModuleFinder {
    pub port: PortId,
}

impl LowModuleFinder for SingleLowModuleFinder {
    fn find(&self, _address: u64) -> PortId {
        self.port
    }
}

/// Spreads addresses over several ports in fixed-size chunks.
#[derive(Clone, Debug)]
pub struct InterleavedLowModuleFinder {
    pub ports: Vec<PortId>,
    pub log2_interleave: u32,
}

impl LowModuleFinder for InterleavedLowModuleFinder {
    fn find(&self, address: u64) -> PortId {
        let chunk = (address >> self.log2_interleave) as usize;
        self.ports[chunk % self.ports.len()]
    }
}
