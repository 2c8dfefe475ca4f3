//! The respond stage, which answers requests in the order they arrived.

use super::transaction::TxnKind;
use super::CacheCore;
use crate::mem::{MemMsg, MemPayload};
use crate::pipeline::Stage;
use crate::types::SimTime;

/// Sends responses for the oldest transaction, one request at a time.
pub(super) struct RespondStage;

impl Stage<CacheCore> for RespondStage {
    fn tick(&mut self, c: &mut CacheCore, now: SimTime) -> bool {
        match c.txns.front() {
            Some(txn) if txn.done => {}
            _ => return false,
        }

        let id = c.next_msg_id();
        let rsp = {
            let Some(txn) = c.txns.front() else {
                return false;
            };
            let Some(req) = txn.requests.front() else {
                return false;
            };
            match (txn.kind, &req.payload) {
                (TxnKind::Read, MemPayload::ReadReq { address, size }) => {
                    let start = (address - txn.block_addr) as usize;
                    let data = txn
                        .block_data
                        .as_deref()
                        .map(|line| line[start..start + *size as usize].to_vec())
                        .unwrap_or_default();
                    MemMsg::data_ready(id, req, now, data)
                }
                (TxnKind::Write, _) => MemMsg::write_done(id, req, now),
                (kind, payload) => {
                    panic!("{}: {:?} transaction holds {:?}", c.name, kind, payload)
                }
            }
        };

        if c.top_port.send(rsp).is_err() {
            return false;
        }
        c.stats.responses_sent += 1;

        let drained = match c.txns.front_mut() {
            Some(txn) => {
                txn.requests.pop_front();
                txn.requests.is_empty()
            }
            None => false,
        };
        if drained {
            c.txns.remove_front();
        }
        true
    }
}
