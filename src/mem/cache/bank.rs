//! Data-array banks.
//!
//! Each bank has its own input buffer filled by the directory stage and
//! serves read hits with a fixed, pipelined latency.

use std::collections::VecDeque;

use super::CacheCore;
use crate::pipeline::Stage;
use crate::types::SimTime;

use super::transaction::TxnId;

struct Access {
    txn: TxnId,
    remaining: u64,
}

/// One data-array bank.
///
/// Starts at most one access per cycle; each access takes `latency` cycles.
/// Accesses are pipelined, so a new one may start while older ones are
/// still counting down.
pub(super) struct BankStage {
    index: usize,
    latency: u64,
    in_flight: VecDeque<Access>,
}

impl BankStage {
    pub(super) fn new(index: usize, latency: u64) -> Self {
        Self {
            index,
            latency,
            in_flight: VecDeque::new(),
        }
    }

    fn finish(&self, c: &mut CacheCore, txn_id: TxnId) {
        let Some((set, way)) = c.txns.get(txn_id).and_then(|t| t.block) else {
            return;
        };

        let data = c.storage.read(c.data_offset(set, way), c.block_size());
        let block = c.directory.block_mut(set, way);
        block.read_count = block.read_count.saturating_sub(1);

        if let Some(txn) = c.txns.get_mut(txn_id) {
            txn.block_data = Some(data);
            txn.done = true;
        }
    }
}

impl Stage<CacheCore> for BankStage {
    fn tick(&mut self, c: &mut CacheCore, _now: SimTime) -> bool {
        let mut progress = false;

        for access in self.in_flight.iter_mut() {
            if access.remaining > 0 {
                access.remaining -= 1;
                progress = true;
            }
        }

        if self.in_flight.front().is_some_and(|a| a.remaining == 0) {
            if let Some(access) = self.in_flight.pop_front() {
                self.finish(c, access.txn);
                progress = true;
            }
        }

        if let Some(txn) = c.bank_bufs[self.index].pop() {
            self.in_flight.push_back(Access {
                txn,
                remaining: self.latency,
            });
            c.stats.bank_accesses += 1;
            progress = true;
        }

        progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::cache::transaction::TxnKind;
    use crate::mem::cache::Cache;
    use crate::mem::{MemMsg, SingleLowModuleFinder};
    use crate::engine::SerialEngine;
    use crate::config::CacheConfig;
    use crate::types::PortId;
    use std::rc::Rc;

    fn core() -> Rc<std::cell::RefCell<crate::component::TickingComponent<Cache>>> {
        let engine = Rc::new(SerialEngine::new());
        Cache::builder(engine)
            .with_config(CacheConfig {
                num_sets: 1,
                way_associativity: 2,
                num_banks: 1,
                ..CacheConfig::default()
            })
            .with_low_module_finder(SingleLowModuleFinder {
                port: PortId::next(),
            })
            .build("cache")
            .unwrap()
    }

    #[test]
    fn test_same_cycle_accesses_complete_in_different_cycles() {
        let cache = core();
        let mut cache = cache.borrow_mut();
        let c = &mut cache.inner_mut().core;

        c.directory.fill(0, 0, 0x000);
        c.directory.fill(0, 1, 0x040);
        let mut ids = Vec::new();
        for (i, (way, addr)) in [(0, 0x000), (1, 0x040)].into_iter().enumerate() {
            let req = MemMsg::read(format!("r{i}"), PortId::next(), 0, addr, 4);
            let id = c.txns.create(TxnKind::Read, addr, req);
            c.txns.get_mut(id).unwrap().block = Some((0, way));
            c.directory.block_mut(0, way).read_count += 1;
            c.bank_bufs[0].push(id);
            ids.push(id);
        }

        let mut bank = BankStage::new(0, 2);
        let mut done_at = vec![None; 2];
        for now in 0..10 {
            bank.tick(c, now);
            for (slot, id) in ids.iter().enumerate() {
                if done_at[slot].is_none() && c.txns.get(*id).unwrap().done {
                    done_at[slot] = Some(now);
                }
            }
        }

        assert_eq!(done_at, vec![Some(2), Some(3)]);
        assert_eq!(c.stats.bank_accesses, 2);
        assert_eq!(c.directory.block(0, 0).read_count, 0);
    }

    #[test]
    fn test_idle_bank_makes_no_progress() {
        let cache = core();
        let mut cache = cache.borrow_mut();
        let c = &mut cache.inner_mut().core;

        let mut bank = BankStage::new(0, 2);
        assert!(!bank.tick(c, 0));
    }
}
