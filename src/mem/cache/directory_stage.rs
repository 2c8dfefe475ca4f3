//! The directory stage: tag lookup, miss handling and write forwarding.

use tracing::trace;

use super::transaction::{TxnId, TxnKind};
use super::CacheCore;
use crate::mem::{MemMsg, MemPayload};
use crate::pipeline::Stage;
use crate::types::SimTime;

/// Looks transactions up in the tag directory, one per cycle.
///
/// Read hits go to the line's bank. Read misses join or open an MSHR entry
/// and fetch the line from below. Writes are forwarded below and drop any
/// cached copy of the line.
pub(super) struct DirectoryStage;

impl Stage<CacheCore> for DirectoryStage {
    fn tick(&mut self, c: &mut CacheCore, now: SimTime) -> bool {
        let Some(&id) = c.dir_buf.peek() else {
            return false;
        };
        let Some((kind, block_addr)) = c.txns.get(id).map(|t| (t.kind, t.block_addr)) else {
            return false;
        };

        let progress = match kind {
            TxnKind::Read => handle_read(c, id, block_addr, now),
            TxnKind::Write => handle_write(c, id, block_addr, now),
        };
        if progress {
            c.dir_buf.pop();
        }
        progress
    }
}

fn handle_read(c: &mut CacheCore, id: TxnId, block_addr: u64, now: SimTime) -> bool {
    if let Some((set, way)) = c.directory.lookup(block_addr) {
        let bank = c.bank_of(set, way);
        if !c.bank_bufs[bank].can_push() {
            return false;
        }

        c.directory.visit(set, way);
        c.directory.block_mut(set, way).read_count += 1;
        if let Some(txn) = c.txns.get_mut(id) {
            txn.block = Some((set, way));
        }
        c.bank_bufs[bank].push(id);
        c.stats.read_hits += 1;
        return true;
    }

    if let Some(entry) = c.mshr.query(block_addr) {
        entry.waiting.push(id);
        c.stats.read_mshr_hits += 1;
        return true;
    }

    if c.mshr.is_full() {
        c.stats.mshr_stalls += 1;
        trace!(cache = %c.name, block_addr, "MSHR full");
        return false;
    }

    let fetch_id = c.next_msg_id();
    let dst = c.low_module_finder.find(block_addr);
    let fetch = MemMsg::read(fetch_id.clone(), dst, now, block_addr, c.block_size());
    if c.bottom_port.send(fetch).is_err() {
        return false;
    }

    c.mshr.add(block_addr, fetch_id, id);
    c.stats.read_misses += 1;
    true
}

fn handle_write(c: &mut CacheCore, id: TxnId, block_addr: u64, now: SimTime) -> bool {
    // The line being fetched would come back stale.
    if c.mshr.query(block_addr).is_some() {
        return false;
    }

    let Some((address, data)) = c
        .txns
        .get(id)
        .and_then(|t| t.requests.front())
        .and_then(|req| match &req.payload {
            MemPayload::WriteReq { address, data } => Some((*address, data.clone())),
            _ => None,
        })
    else {
        return false;
    };

    let write_id = c.next_msg_id();
    let dst = c.low_module_finder.find(address);
    let write = MemMsg::write(write_id.clone(), dst, now, address, data);
    if c.bottom_port.send(write).is_err() {
        return false;
    }

    if let Some((set, way)) = c.directory.lookup(block_addr) {
        c.directory.invalidate(set, way);
        c.stats.write_hits += 1;
    } else {
        c.stats.write_misses += 1;
    }

    if let Some(txn) = c.txns.get_mut(id) {
        txn.bottom_write = Some(write_id);
    }
    true
}
