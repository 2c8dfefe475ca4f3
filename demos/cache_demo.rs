//! Write-around cache example.
//!
//! A CPU model streams reads and writes into an L1 cache backed by an ideal
//! memory. Halfway through, a controller pauses the cache, invalidates it and
//! lets it continue. The monitor is used to print cache state at the end.

use std::collections::VecDeque;
use std::rc::Rc;

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

use lockstep::component::{Ticker, TickingComponent};
use lockstep::config::CacheConfig;
use lockstep::connection::{Connection, DirectConnection};
use lockstep::engine::{Engine, SerialEngine};
use lockstep::freq::Freq;
use lockstep::mem::cache::Cache;
use lockstep::mem::{ControlCmd, IdealMemory, MemMsg, MemPayload, SingleLowModuleFinder};
use lockstep::monitor::Monitor;
use lockstep::port::{LimitedPort, Port};
use lockstep::stats::StatsCollector;
use lockstep::types::SimTime;

const NUM_ACCESSES: usize = 2000;
const FOOTPRINT: u64 = 16 * 1024;
const WRITE_RATIO: f64 = 0.2;

/// Issues queued messages one per cycle and counts what comes back.
struct Requester {
    port: Rc<LimitedPort<MemMsg>>,
    to_send: VecDeque<MemMsg>,
    data_ready: u64,
    write_done: u64,
    acks: u64,
}

impl Ticker for Requester {
    fn tick(&mut self, now: SimTime) -> bool {
        let mut progress = false;
        if let Some(rsp) = self.port.retrieve(now) {
            match rsp.payload {
                MemPayload::DataReady { .. } => self.data_ready += 1,
                MemPayload::WriteDone { .. } => self.write_done += 1,
                MemPayload::ControlAck { .. } => self.acks += 1,
                _ => {}
            }
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

fn requester(engine: &Rc<SerialEngine>, name: &str) -> Rc<std::cell::RefCell<TickingComponent<Requester>>> {
    let port_name = format!("{name}.Port");
    TickingComponent::build(name, engine.clone(), Freq::new(1), |s| Requester {
        port: LimitedPort::new(s.clone(), 4, port_name),
        to_send: VecDeque::new(),
        data_ready: 0,
        write_done: 0,
        acks: 0,
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    lockstep::init_logging("info");

    let engine = Rc::new(SerialEngine::new());
    let memory = IdealMemory::build("DRAM", engine.clone(), Freq::new(1), 100, 2, 8);
    let mem_port = memory.borrow().inner().top_port().clone();
    let cache = Cache::builder(engine.clone())
        .with_config(CacheConfig {
            num_banks: 2,
            bank_latency: 4,
            ..CacheConfig::default()
        })
        .with_low_module_finder(SingleLowModuleFinder { port: mem_port.id() })
        .build("L1")?;
    let cpu = requester(&engine, "CPU");
    let ctrl = requester(&engine, "Ctrl");

    let (top, bottom, control) = {
        let c = cache.borrow();
        let c = c.inner();
        (c.top_port().clone(), c.bottom_port().clone(), c.control_port().clone())
    };
    let top_id = top.id();
    let control_id = control.id();

    let conns: Vec<_> = [
        ("TopConn", cpu.borrow().inner().port.clone(), top),
        ("BottomConn", bottom, mem_port),
        ("CtrlConn", ctrl.borrow().inner().port.clone(), control),
    ]
    .into_iter()
    .map(|(name, a, b)| {
        let conn = DirectConnection::<MemMsg>::builder(engine.clone()).build(name);
        conn.borrow_mut().plug_in(a, 1);
        conn.borrow_mut().plug_in(b, 1);
        conn
    })
    .collect();

    let mut rng = Xoshiro256StarStar::seed_from_u64(7);
    {
        let mut cpu = cpu.borrow_mut();
        for i in 0..NUM_ACCESSES {
            let address = rng.gen_range(0..FOOTPRINT) & !0x3;
            let msg = if rng.gen_bool(WRITE_RATIO) {
                MemMsg::write(format!("w{i}"), top_id, 0, address, vec![i as u8; 4])
            } else {
                MemMsg::read(format!("r{i}"), top_id, 0, address, 4)
            };
            cpu.inner_mut().to_send.push_back(msg);
        }
    }

    let mut monitor = Monitor::new(engine.clone(), engine.run_control());
    monitor.register_component(&cache);
    monitor.register_component(&memory);
    for conn in &conns {
        monitor.register_connection(conn);
    }

    let mut collector = StatsCollector::new("cache_demo");
    collector.start();

    cpu.borrow().tick_later(0);
    engine.run_until(2000);

    {
        let mut ctrl = ctrl.borrow_mut();
        for (i, cmd) in [ControlCmd::Pause, ControlCmd::Invalidate, ControlCmd::Continue]
            .into_iter()
            .enumerate()
        {
            ctrl.inner_mut()
                .to_send
                .push_back(MemMsg::control(format!("c{i}"), control_id, 0, cmd));
        }
        ctrl.tick_later(engine.current_time());
    }
    engine.run();
    collector.stop();

    collector.record_engine(&engine);
    collector.record_component(&*cache.borrow());
    collector.record_component(&*memory.borrow());
    for conn in &conns {
        collector.record_connection(&*conn.borrow());
    }

    {
        let cpu = cpu.borrow();
        let cpu = cpu.inner();
        println!(
            "CPU: {} reads answered, {} writes acknowledged",
            cpu.data_ready, cpu.write_done
        );
        println!("controller: {} acks", ctrl.borrow().inner().acks);
    }
    println!("L1 stats: {}", monitor.handle("/api/component/L1")?);
    println!(
        "read hits: {}",
        monitor.handle(r#"/api/field/{"comp_name":"L1","field_name":"stats.read_hits"}"#)?
    );
    println!();
    print!("{}", collector.stats().summary());

    Ok(())
}
