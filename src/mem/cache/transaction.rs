//! In-flight cache work.

use std::collections::{HashMap, VecDeque};

use crate::mem::MemMsg;
use crate::types::MsgId;

pub type TxnId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxnKind {
    Read,
    Write,
}

/// One cache access, possibly serving several coalesced reads.
#[derive(Debug)]
pub struct Transaction {
    pub id: TxnId,
    pub kind: TxnKind,
    pub block_addr: u64,
    /// Top-side requests still owed a response, oldest first.
    pub requests: VecDeque<MemMsg>,
    /// Location of the cached block serving a read hit.
    pub block: Option<(usize, usize)>,
    /// The whole cache line, once read or fetched.
    pub block_data: Option<Vec<u8>>,
    /// Id of the write forwarded to the lower module.
    pub bottom_write: Option<MsgId>,
    pub done: bool,
}

/// All live transactions, in creation order.
///
/// Responses leave the cache in this order.
#[derive(Debug, Default)]
pub struct TransactionTable {
    order: VecDeque<TxnId>,
    by_id: HashMap<TxnId, Transaction>,
    next_id: TxnId,
}

impl TransactionTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a transaction for `req` and returns its id.
    pub fn create(&mut self, kind: TxnKind, block_addr: u64, req: MemMsg) -> TxnId {
        let id = self.next_id;
        self.next_id += 1;

        self.by_id.insert(
            id,
            Transaction {
                id,
                kind,
                block_addr,
                requests: VecDeque::from([req]),
                block: None,
                block_data: None,
                bottom_write: None,
                done: false,
            },
        );
        self.order.push_back(id);
        id
    }

    /// Looks a live transaction up by id.
    pub fn get(&self, id: TxnId) -> Option<&Transaction> {
        self.by_id.get(&id)
    }

    /// Looks a live transaction up by id, for modification.
    pub fn get_mut(&mut self, id: TxnId) -> Option<&mut Transaction> {
        self.by_id.get_mut(&id)
    }

    /// Oldest live transaction.
    pub fn front(&self) -> Option<&Transaction> {
        self.order.front().and_then(|id| self.by_id.get(id))
    }

    /// Oldest live transaction, for modification.
    pub fn front_mut(&mut self) -> Option<&mut Transaction> {
        let id = *self.order.front()?;
        self.by_id.get_mut(&id)
    }

    /// Newest live transaction.
    pub fn back_mut(&mut self) -> Option<&mut Transaction> {
        let id = *self.order.back()?;
        self.by_id.get_mut(&id)
    }

    /// Destroys the oldest transaction.
    pub fn remove_front(&mut self) -> Option<Transaction> {
        let id = self.order.pop_front()?;
        self.by_id.remove(&id)
    }

    /// Finds the transaction whose lower-level write is `write_id`.
    pub fn find_by_bottom_write(&mut self, write_id: &str) -> Option<&mut Transaction> {
        let id = self.order.iter().copied().find(|id| {
            self.by_id
                .get(id)
                .and_then(|t| t.bottom_write.as_deref())
                == Some(write_id)
        })?;
        self.by_id.get_mut(&id)
    }

    /// Iterates live transactions, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.order.iter().filter_map(|id| self.by_id.get(id))
    }

    /// Number of live transactions.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
