//! A write-around L1 cache built from pipelined stages.
//!
//! Requests enter through the top port and flow through
//!
//! ```text
//! top port -> coalesce -> directory -> bank -> respond -> top port
//!                            |                    ^
//!                            v                    |
//!                       bottom port -> parse-bottom
//! ```
//!
//! Every cycle the stages tick in reverse pipeline order: respond,
//! parse-bottom, each bank, directory, coalesce. Respond, parse-bottom and
//! coalesce tick `num_req_per_cycle` times; the directory and each bank tick
//! once. A control stage on its own port pauses, resumes and invalidates the
//! cache; it ticks even while the data pipeline is paused.
//!
//! Reads that miss fetch a whole line through the MSHR. Writes go around the
//! cache to the lower module and invalidate a cached copy of the line.

mod bank;
mod bottom_parser;
mod coalescer;
mod control;
pub mod directory;
mod directory_stage;
pub mod mshr;
mod respond;
pub mod transaction;

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;
use tracing::debug;

use crate::component::{Ticker, TickingComponent};
use crate::config::{CacheConfig, ConfigError, ConfigResult};
use crate::engine::Engine;
use crate::mem::{LowModuleFinder, MemMsg, Storage};
use crate::monitor::{FieldDescriptor, FieldKind, Inspectable};
use crate::pipeline::{tick_each, tick_repeated, Buffer, Stage};
use crate::port::LimitedPort;
use crate::types::{MsgId, SimTime};

use bank::BankStage;
use bottom_parser::BottomParser;
use coalescer::Coalescer;
use control::ControlStage;
use directory::Directory;
use directory_stage::DirectoryStage;
use mshr::Mshr;
use respond::RespondStage;
use transaction::{TransactionTable, TxnId};

/// Counters kept by a cache.
#[derive(Clone, Debug, Default, Serialize)]
pub struct CacheStats {
    pub transactions_created: u64,
    pub coalesced_reads: u64,
    pub read_hits: u64,
    pub read_mshr_hits: u64,
    pub read_misses: u64,
    pub write_hits: u64,
    pub write_misses: u64,
    pub fills: u64,
    pub bank_accesses: u64,
    pub responses_sent: u64,
    pub transaction_stalls: u64,
    pub mshr_stalls: u64,
    pub control_msgs: u64,
}

/// State shared by all stages of one cache.
pub struct CacheCore {
    name: String,
    top_port: Rc<LimitedPort<MemMsg>>,
    bottom_port: Rc<LimitedPort<MemMsg>>,
    control_port: Rc<LimitedPort<MemMsg>>,
    log2_block_size: u32,
    directory: Directory,
    mshr: Mshr,
    storage: Storage,
    low_module_finder: Box<dyn LowModuleFinder>,
    dir_buf: Buffer<TxnId>,
    bank_bufs: Vec<Buffer<TxnId>>,
    txns: TransactionTable,
    max_num_concurrent_trans: usize,
    paused: bool,
    next_msg: u64,
    stats: CacheStats,
}

impl CacheCore {
    fn block_size(&self) -> u64 {
        1 << self.log2_block_size
    }

    fn block_addr(&self, address: u64) -> u64 {
        address & !(self.block_size() - 1)
    }

    /// Bank serving a cache line.
    fn bank_of(&self, set: usize, way: usize) -> usize {
        (set * self.directory.num_ways() + way) % self.bank_bufs.len()
    }

    /// Offset of a cache line in the data array.
    fn data_offset(&self, set: usize, way: usize) -> u64 {
        ((set * self.directory.num_ways() + way) as u64) << self.log2_block_size
    }

    fn next_msg_id(&mut self) -> MsgId {
        let id = format!("{}.msg{}", self.name, self.next_msg);
        self.next_msg += 1;
        id
    }
}

/// The cache component.
pub struct Cache {
    core: CacheCore,
    num_req_per_cycle: usize,
    coalescer: Coalescer,
    directory_stage: DirectoryStage,
    bank_stages: Vec<BankStage>,
    bottom_parser: BottomParser,
    respond: RespondStage,
    control: ControlStage,
}

/// Builds [`Cache`] components.
pub struct CacheBuilder {
    engine: Rc<dyn Engine>,
    config: CacheConfig,
    low_module_finder: Option<Box<dyn LowModuleFinder>>,
}

impl CacheBuilder {
    /// Replaces the default geometry and timing.
    pub fn with_config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the finder that tells which lower port serves an address.
    pub fn with_low_module_finder(mut self, finder: impl LowModuleFinder + 'static) -> Self {
        self.low_module_finder = Some(Box::new(finder));
        self
    }

    /// Creates the cache.
    ///
    /// # Errors
    /// Returns [`ConfigError::Validation`] if the configuration is invalid or
    /// no low module finder was given.
    pub fn build(self, name: impl Into<String>) -> ConfigResult<Rc<RefCell<TickingComponent<Cache>>>> {
        let Self {
            engine,
            config,
            low_module_finder,
        } = self;
        config.validate()?;
        let low_module_finder = low_module_finder.ok_or_else(|| {
            ConfigError::Validation("cache needs a low module finder".to_string())
        })?;

        let name = name.into();
        debug!(cache = %name, sets = config.num_sets, ways = config.way_associativity, banks = config.num_banks, "building cache");

        Ok(TickingComponent::build(name.clone(), engine, config.freq(), |scheduler| {
            let port = |suffix: &str| {
                LimitedPort::new(scheduler.clone(), config.port_capacity, format!("{name}.{suffix}"))
            };

            let core = CacheCore {
                top_port: port("TopPort"),
                bottom_port: port("BottomPort"),
                control_port: port("ControlPort"),
                log2_block_size: config.log2_block_size,
                directory: Directory::new(
                    config.num_sets,
                    config.way_associativity,
                    config.log2_block_size,
                ),
                mshr: Mshr::new(config.num_mshr_entry),
                storage: Storage::new(),
                low_module_finder,
                dir_buf: Buffer::new(format!("{name}.DirBuf"), config.dir_buffer_size),
                bank_bufs: (0..config.num_banks)
                    .map(|i| Buffer::new(format!("{name}.BankBuf{i}"), config.bank_buffer_size))
                    .collect(),
                txns: TransactionTable::new(),
                max_num_concurrent_trans: config.max_num_concurrent_trans,
                paused: false,
                next_msg: 0,
                stats: CacheStats::default(),
                name,
            };

            Cache {
                core,
                num_req_per_cycle: config.num_req_per_cycle,
                coalescer: Coalescer,
                directory_stage: DirectoryStage,
                bank_stages: (0..config.num_banks)
                    .map(|i| BankStage::new(i, config.bank_latency))
                    .collect(),
                bottom_parser: BottomParser,
                respond: RespondStage,
                control: ControlStage,
            }
        }))
    }
}

impl Cache {
    /// Starts building a cache driven by `engine`.
    pub fn builder(engine: Rc<dyn Engine>) -> CacheBuilder {
        CacheBuilder {
            engine,
            config: CacheConfig::default(),
            low_module_finder: None,
        }
    }

    /// Returns the component name.
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Port receiving requests from above.
    pub fn top_port(&self) -> &Rc<LimitedPort<MemMsg>> {
        &self.core.top_port
    }

    /// Port talking to the lower module.
    pub fn bottom_port(&self) -> &Rc<LimitedPort<MemMsg>> {
        &self.core.bottom_port
    }

    /// Port receiving control commands.
    pub fn control_port(&self) -> &Rc<LimitedPort<MemMsg>> {
        &self.core.control_port
    }

    /// Returns true while a pause command holds the data pipeline.
    pub fn is_paused(&self) -> bool {
        self.core.paused
    }

    /// Returns the counters.
    pub fn stats(&self) -> &CacheStats {
        &self.core.stats
    }

    /// Number of live transactions.
    pub fn num_transactions(&self) -> usize {
        self.core.txns.len()
    }

    /// Number of outstanding line fetches.
    pub fn num_mshr_entries(&self) -> usize {
        self.core.mshr.len()
    }

    /// Returns the tag directory.
    pub fn directory(&self) -> &Directory {
        &self.core.directory
    }

    /// Exports statistics as JSON.
    pub fn export_stats(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.core.name,
            "stats": self.core.stats,
            "transactions": self.core.txns.len(),
            "mshr_entries": self.core.mshr.len(),
            "valid_blocks": self.core.directory.num_valid(),
            "paused": self.core.paused,
        })
    }

    fn run_pipeline(&mut self, now: SimTime) -> bool {
        let n = self.num_req_per_cycle;
        let core = &mut self.core;

        let mut progress = false;
        progress |= tick_repeated(&mut self.respond, core, now, n);
        progress |= tick_repeated(&mut self.bottom_parser, core, now, n);
        progress |= tick_each(&mut self.bank_stages, core, now);
        progress |= self.directory_stage.tick(core, now);
        progress |= tick_repeated(&mut self.coalescer, core, now, n);
        progress
    }
}

impl Ticker for Cache {
    fn tick(&mut self, now: SimTime) -> bool {
        let mut progress = false;

        if !self.core.paused {
            progress |= self.run_pipeline(now);
        }

        progress |= self.control.tick(&mut self.core, now);
        progress
    }
}

static FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("name", FieldKind::Text, "component name"),
    FieldDescriptor::new("paused", FieldKind::Bool, "data pipeline halted"),
    FieldDescriptor::new("num_req_per_cycle", FieldKind::Number, "issue width"),
    FieldDescriptor::new("transactions", FieldKind::List, "live transactions, oldest first"),
    FieldDescriptor::new("mshr", FieldKind::List, "outstanding line fetches"),
    FieldDescriptor::new("dir_buf", FieldKind::Number, "transactions waiting for the directory"),
    FieldDescriptor::new("bank_bufs", FieldKind::List, "transactions waiting per bank"),
    FieldDescriptor::new("stats", FieldKind::Object, "cache counters"),
];

impl Inspectable for Cache {
    fn fields(&self) -> &'static [FieldDescriptor] {
        FIELDS
    }

    fn field_value(&self, field: &str) -> Option<serde_json::Value> {
        let core = &self.core;
        let value = match field {
            "name" => serde_json::json!(core.name),
            "paused" => serde_json::json!(core.paused),
            "num_req_per_cycle" => serde_json::json!(self.num_req_per_cycle),
            "transactions" => serde_json::Value::Array(
                core.txns
                    .iter()
                    .map(|txn| {
                        serde_json::json!({
                            "id": txn.id,
                            "kind": format!("{:?}", txn.kind),
                            "block_addr": txn.block_addr,
                            "pending_responses": txn.requests.len(),
                            "done": txn.done,
                        })
                    })
                    .collect(),
            ),
            "mshr" => serde_json::json!(core.mshr.entries()),
            "dir_buf" => serde_json::json!(core.dir_buf.len()),
            "bank_bufs" => serde_json::json!(core
                .bank_bufs
                .iter()
                .map(Buffer::len)
                .collect::<Vec<_>>()),
            "stats" => serde_json::json!(core.stats),
            _ => return None,
        };
        Some(value)
    }
}
