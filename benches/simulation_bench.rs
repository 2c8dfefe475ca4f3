//! Performance benchmarks for the lockstep kernel.
//!
//! Run with: `cargo bench`
//! Or for specific bench: `cargo bench --bench simulation_bench`

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use lockstep::component::{Ticker, TickingComponent};
use lockstep::config::CacheConfig;
use lockstep::connection::{Connection, DirectConnection};
use lockstep::engine::{Engine, SerialEngine};
use lockstep::event::{Event, Handler};
use lockstep::freq::Freq;
use lockstep::mem::cache::Cache;
use lockstep::mem::{IdealMemory, MemMsg, SingleLowModuleFinder};
use lockstep::parallel::run_replicas;
use lockstep::port::{LimitedPort, Port};
use lockstep::scenario::AllToAllScenario;
use lockstep::types::SimTime;

// ============================================================================
// Engine Benchmarks
// ============================================================================

/// Reschedules itself until a budget runs out.
struct Chain {
    engine: Rc<SerialEngine>,
    me: Option<Rc<RefCell<dyn Handler>>>,
    remaining: u64,
}

impl Handler for Chain {
    fn handle(&mut self, event: &Event) {
        if self.remaining == 0 {
            self.me = None;
            return;
        }
        self.remaining -= 1;
        if let Some(me) = &self.me {
            self.engine.schedule(Event::new(event.time() + 1, me.clone()));
        }
    }
}

fn bench_event_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_queue");

    for chains in [1, 16, 256].iter() {
        let events_per_chain = 1000;
        group.throughput(Throughput::Elements((*chains * events_per_chain) as u64));
        group.bench_with_input(BenchmarkId::new("chains", chains), chains, |b, &chains| {
            b.iter(|| {
                let engine = Rc::new(SerialEngine::new());
                for _ in 0..chains {
                    let chain = Rc::new(RefCell::new(Chain {
                        engine: engine.clone(),
                        me: None,
                        remaining: events_per_chain as u64,
                    }));
                    let handler: Rc<RefCell<dyn Handler>> = chain.clone();
                    chain.borrow_mut().me = Some(handler.clone());
                    engine.schedule(Event::new(0, handler));
                }
                engine.run();
                black_box(engine.current_time());
            });
        });
    }

    group.finish();
}

// ============================================================================
// Connection Benchmarks
// ============================================================================

fn bench_all_to_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("all_to_all");
    group.sample_size(10);

    for num_agents in [4, 10, 32].iter() {
        let msgs_per_agent = 200;
        group.throughput(Throughput::Elements((*num_agents * msgs_per_agent) as u64));
        group.bench_with_input(
            BenchmarkId::new("agents", num_agents),
            num_agents,
            |b, &num_agents| {
                let scenario = AllToAllScenario::new(num_agents, msgs_per_agent).with_seed(1);
                b.iter(|| black_box(scenario.run().final_time));
            },
        );
    }

    group.finish();
}

fn bench_replicas(c: &mut Criterion) {
    let mut group = c.benchmark_group("replicas");
    group.sample_size(10);

    let seeds: Vec<u64> = (0..8).collect();
    group.bench_function("8x_all_to_all", |b| {
        b.iter(|| {
            black_box(run_replicas(&seeds, |seed| {
                AllToAllScenario::new(8, 200).with_seed(seed).run().final_time
            }))
        });
    });

    group.finish();
}

// ============================================================================
// Cache Benchmarks
// ============================================================================

/// Issues a stream of reads with a given stride.
struct Streamer {
    port: Rc<LimitedPort<MemMsg>>,
    to_send: VecDeque<MemMsg>,
    responses: usize,
}

impl Ticker for Streamer {
    fn tick(&mut self, now: SimTime) -> bool {
        let mut progress = false;
        if self.port.retrieve(now).is_some() {
            self.responses += 1;
            progress = true;
        }
        if let Some(mut req) = self.to_send.pop_front() {
            req.meta.send_time = now;
            match self.port.send(req) {
                Ok(()) => progress = true,
                Err(err) => self.to_send.push_front(err.into_msg()),
            }
        }
        progress
    }
}

fn run_cache_stream(num_reads: u64, stride: u64) -> usize {
    let engine = Rc::new(SerialEngine::new());
    let memory = IdealMemory::build("Mem", engine.clone(), Freq::new(1), 50, 4, 16);
    let mem_port = memory.borrow().inner().top_port().clone();
    let cache = Cache::builder(engine.clone())
        .with_config(CacheConfig::default())
        .with_low_module_finder(SingleLowModuleFinder { port: mem_port.id() })
        .build("L1")
        .expect("default cache config is valid");
    let top = cache.borrow().inner().top_port().clone();

    let reads = (0..num_reads)
        .map(|i| MemMsg::read(format!("r{i}"), top.id(), 0, (i * stride) % 0x4000, 4))
        .collect();
    let cpu = TickingComponent::build("CPU", engine.clone(), Freq::new(1), |s| Streamer {
        port: LimitedPort::new(s.clone(), 4, "CPU.Port"),
        to_send: reads,
        responses: 0,
    });

    let top_conn = DirectConnection::<MemMsg>::builder(engine.clone()).build("TopConn");
    top_conn.borrow_mut().plug_in(cpu.borrow().inner().port.clone(), 1);
    top_conn.borrow_mut().plug_in(top, 1);
    let bottom_conn = DirectConnection::<MemMsg>::builder(engine.clone()).build("BottomConn");
    bottom_conn
        .borrow_mut()
        .plug_in(cache.borrow().inner().bottom_port().clone(), 1);
    bottom_conn.borrow_mut().plug_in(mem_port, 1);

    cpu.borrow().tick_later(0);
    engine.run();
    let responses = cpu.borrow().inner().responses;
    responses
}

fn bench_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache");
    group.sample_size(20);

    for (label, stride) in [("sequential", 4u64), ("line_stride", 64), ("scattered", 4160)] {
        group.throughput(Throughput::Elements(1000));
        group.bench_function(label, |b| {
            b.iter(|| black_box(run_cache_stream(1000, stride)));
        });
    }

    group.finish();
}

// ============================================================================
// Criterion Groups
// ============================================================================

criterion_group!(
    benches,
    bench_event_queue,
    bench_all_to_all,
    bench_replicas,
    bench_cache,
);

criterion_main!(benches);
