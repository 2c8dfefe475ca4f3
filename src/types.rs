//! Core type definitions for the simulation kernel.
//!
//! This module defines the fundamental types used throughout the kernel.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Virtual time unit (e.g., picoseconds or global cycles).
///
/// Every scheduled event, message timestamp and clock boundary uses the same
/// `SimTime` representation, giving all components a single timeline.
pub type SimTime = u64;

/// Unique identifier of a message.
pub type MsgId = String;

/// Identity of a port.
///
/// Port ids are only compared for equality and used as lookup keys; they never
/// decide an iteration order, so the values handed out do not influence the
/// simulated timeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortId(u64);

static NEXT_PORT_ID: AtomicU64 = AtomicU64::new(1);

impl PortId {
    /// Allocates a fresh port identity.
    pub fn next() -> Self {
        PortId(NEXT_PORT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port#{}", self.0)
    }
}
