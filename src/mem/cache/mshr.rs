//! Miss-status holding registers.

use serde::Serialize;

use crate::mem::cache::transaction::TxnId;
use crate::types::MsgId;

/// One outstanding line fetch and the transactions waiting on it.
#[derive(Clone, Debug, Serialize)]
pub struct MshrEntry {
    pub block_addr: u64,
    pub fetch_id: MsgId,
    pub waiting: Vec<TxnId>,
}

/// Bounded table of outstanding misses.
#[derive(Debug)]
pub struct Mshr {
    capacity: usize,
    entries: Vec<MshrEntry>,
}

impl Mshr {
    /// Creates a table tracking at most `capacity` fetches.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Returns the entry fetching `block_addr`.
    pub fn query(&mut self, block_addr: u64) -> Option<&mut MshrEntry> {
        self.entries.iter_mut().find(|e| e.block_addr == block_addr)
    }

    /// Returns the entry whose fetch is `fetch_id`.
    pub fn query_by_fetch(&self, fetch_id: &str) -> Option<&MshrEntry> {
        self.entries.iter().find(|e| e.fetch_id == fetch_id)
    }

    /// Records a new fetch.
    ///
    /// # Panics
    /// Panics if the table is full.
    pub fn add(&mut self, block_addr: u64, fetch_id: MsgId, txn: TxnId) {
        assert!(!self.is_full(), "MSHR overflow");
        self.entries.push(MshrEntry {
            block_addr,
            fetch_id,
            waiting: vec![txn],
        });
    }

    /// Retires the entry of a completed fetch.
    pub fn remove_by_fetch(&mut self, fetch_id: &str) -> Option<MshrEntry> {
        let pos = self.entries.iter().position(|e| e.fetch_id == fetch_id)?;
        Some(self.entries.remove(pos))
    }

    /// Returns true if no further fetch can be tracked.
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Number of outstanding fetches.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Outstanding fetches, oldest first.
    pub fn entries(&self) -> &[MshrEntry] {
        &self.entries
    }
}
