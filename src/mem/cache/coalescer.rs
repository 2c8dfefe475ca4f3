//! The coalesce stage: the entry of the cache pipeline.

use tracing::trace;

use super::transaction::TxnKind;
use super::CacheCore;
use crate::mem::MemPayload;
use crate::pipeline::Stage;
use crate::types::SimTime;

/// Turns top-port requests into transactions.
///
/// A read to the same line as the newest transaction, when that transaction
/// is also a read, joins it instead of opening a new one.
pub(super) struct Coalescer;

impl Stage<CacheCore> for Coalescer {
    fn tick(&mut self, c: &mut CacheCore, now: SimTime) -> bool {
        let (kind, address, size) = match c.top_port.peek() {
            None => return false,
            Some(req) => match &req.payload {
                MemPayload::ReadReq { address, size } => (TxnKind::Read, *address, *size),
                MemPayload::WriteReq { address, data } => {
                    (TxnKind::Write, *address, data.len() as u64)
                }
                other => panic!("{}: cannot process {:?} on the top port", c.name, other),
            },
        };

        let block_addr = c.block_addr(address);
        if address - block_addr + size > c.block_size() {
            panic!(
                "{}: access of {} bytes at {:#x} crosses a line boundary",
                c.name, size, address
            );
        }

        let joins_newest = kind == TxnKind::Read
            && c.txns
                .back_mut()
                .is_some_and(|t| t.kind == TxnKind::Read && t.block_addr == block_addr);
        if joins_newest {
            let Some(req) = c.top_port.retrieve(now) else {
                return false;
            };
            if let Some(txn) = c.txns.back_mut() {
                txn.requests.push_back(req);
            }
            c.stats.coalesced_reads += 1;
            return true;
        }

        if c.txns.len() >= c.max_num_concurrent_trans {
            c.stats.transaction_stalls += 1;
            trace!(cache = %c.name, "transaction slots exhausted");
            return false;
        }
        if !c.dir_buf.can_push() {
            return false;
        }

        let Some(req) = c.top_port.retrieve(now) else {
            return false;
        };
        let id = c.txns.create(kind, block_addr, req);
        c.dir_buf.push(id);
        c.stats.transactions_created += 1;
        trace!(cache = %c.name, txn = id, block_addr, ?kind, "transaction created");
        true
    }
}
