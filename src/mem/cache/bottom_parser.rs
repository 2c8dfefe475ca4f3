//! The parse-bottom stage, which consumes responses from the lower module.

use tracing::trace;

use super::CacheCore;
use crate::mem::MemPayload;
use crate::pipeline::Stage;
use crate::types::SimTime;

/// Handles responses arriving from the lower module.
///
/// A line fill is written into a victim way and completes every transaction
/// waiting on its MSHR entry. A write acknowledgement completes the write
/// transaction that sent it.
pub(super) struct BottomParser;

enum Incoming {
    Fill { fetch_id: String },
    WriteDone { write_id: String },
}

impl Stage<CacheCore> for BottomParser {
    fn tick(&mut self, c: &mut CacheCore, now: SimTime) -> bool {
        let incoming = match c.bottom_port.peek() {
            None => return false,
            Some(rsp) => match &rsp.payload {
                MemPayload::DataReady { respond_to, .. } => Incoming::Fill {
                    fetch_id: respond_to.clone(),
                },
                MemPayload::WriteDone { respond_to } => Incoming::WriteDone {
                    write_id: respond_to.clone(),
                },
                other => panic!("{}: cannot process {:?} on the bottom port", c.name, other),
            },
        };

        match incoming {
            Incoming::Fill { fetch_id } => fill(c, &fetch_id, now),
            Incoming::WriteDone { write_id } => {
                let Some(txn) = c.txns.find_by_bottom_write(&write_id) else {
                    panic!("{}: write {} was never sent", c.name, write_id);
                };
                txn.done = true;
                c.bottom_port.retrieve(now);
                true
            }
        }
    }
}

fn fill(c: &mut CacheCore, fetch_id: &str, now: SimTime) -> bool {
    let Some(block_addr) = c.mshr.query_by_fetch(fetch_id).map(|e| e.block_addr) else {
        panic!("{}: fetch {} has no MSHR entry", c.name, fetch_id);
    };

    let Some((set, way)) = c.directory.find_victim(block_addr) else {
        trace!(cache = %c.name, block_addr, "no victim for line fill");
        return false;
    };

    let Some(rsp) = c.bottom_port.retrieve(now) else {
        return false;
    };
    let MemPayload::DataReady { data, .. } = rsp.payload else {
        return false;
    };

    let offset = c.data_offset(set, way);
    c.storage.write(offset, &data);
    c.directory.fill(set, way, block_addr);
    c.directory.visit(set, way);

    if let Some(entry) = c.mshr.remove_by_fetch(fetch_id) {
        for id in entry.waiting {
            if let Some(txn) = c.txns.get_mut(id) {
                txn.block_data = Some(data.clone());
                txn.done = true;
            }
        }
    }

    c.stats.fills += 1;
    trace!(cache = %c.name, block_addr, set, way, "line filled");
    true
}
