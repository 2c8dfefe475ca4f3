//! A fixed-latency memory with unlimited bandwidth behind one port.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use tracing::trace;

use crate::component::{Ticker, TickingComponent};
use crate::engine::Engine;
use crate::freq::Freq;
use crate::mem::{MemMsg, MemPayload, Storage};
use crate::monitor::{FieldDescriptor, FieldKind, Inspectable};
use crate::port::LimitedPort;
use crate::types::SimTime;

struct Pending {
    req: MemMsg,
    remaining: u64,
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStats {
    pub reads: u64,
    pub writes: u64,
}

/// Answers every request `latency` cycles after taking it, in arrival order.
pub struct IdealMemory {
    name: String,
    top_port: Rc<LimitedPort<MemMsg>>,
    storage: Storage,
    latency: u64,
    width: usize,
    in_flight: VecDeque<Pending>,
    next_rsp: u64,
    stats: MemoryStats,
}

impl IdealMemory {
    /// Creates the memory as a ticking component.
    ///
    /// `width` requests are accepted per cycle; the top port buffers
    /// `port_capacity` incoming requests.
    pub fn build(
        name: impl Into<String>,
        engine: Rc<dyn Engine>,
        freq: Freq,
        latency: u64,
        width: usize,
        port_capacity: usize,
    ) -> Rc<RefCell<TickingComponent<IdealMemory>>> {
        let name = name.into();
        TickingComponent::build(name.clone(), engine, freq, |scheduler| {
            let top_port = LimitedPort::new(scheduler.clone(), port_capacity, format!("{name}.TopPort"));
            IdealMemory {
                name,
                top_port,
                storage: Storage::new(),
                latency,
                width,
                in_flight: VecDeque::new(),
                next_rsp: 0,
                stats: MemoryStats::default(),
            }
        })
    }

    pub fn top_port(&self) -> &Rc<LimitedPort<MemMsg>> {
        &self.top_port
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut Storage {
        &mut self.storage
    }

    pub fn stats(&self) -> &MemoryStats {
        &self.stats
    }

    fn respond(&mut self, now: SimTime) -> bool {
        let mut progress = false;

        while let Some(pending) = self.in_flight.front() {
            if pending.remaining > 0 {
                break;
            }

            let id = format!("{}.rsp{}", self.name, self.next_rsp);
            let rsp = self.make_response(id, &pending.req, now);
            if self.top_port.send(rsp).is_err() {
                trace!(memory = %self.name, "response stalled");
                break;
            }

            self.next_rsp += 1;
            if let Some(done) = self.in_flight.pop_front() {
                self.commit(&done.req);
            }
            progress = true;
        }

        progress
    }

    fn make_response(&self, id: String, req: &MemMsg, now: SimTime) -> MemMsg {
        match &req.payload {
            MemPayload::ReadReq { address, size } => {
                MemMsg::data_ready(id, req, now, self.storage.read(*address, *size))
            }
            MemPayload::WriteReq { .. } => MemMsg::write_done(id, req, now),
            other => panic!("{} cannot serve {:?}", self.name, other),
        }
    }

    fn commit(&mut self, req: &MemMsg) {
        match &req.payload {
            MemPayload::ReadReq { .. } => self.stats.reads += 1,
            MemPayload::WriteReq { address, data } => {
                self.storage.write(*address, data);
                self.stats.writes += 1;
            }
            _ => {}
        }
    }
}

impl Ticker for IdealMemory {
    fn tick(&mut self, now: SimTime) -> bool {
        let mut progress = false;

        // A request taken at T with latency L is answered at T + L.
        for pending in self.in_flight.iter_mut() {
            if pending.remaining > 0 {
                pending.remaining -= 1;
                progress = true;
            }
        }

        progress |= self.respond(now);

        for _ in 0..self.width {
            let Some(req) = self.top_port.retrieve(now) else {
                break;
            };
            self.in_flight.push_back(Pending {
                req,
                remaining: self.latency,
            });
            progress = true;
        }

        progress
    }
}

static FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("name", FieldKind::Text, "component name"),
    FieldDescriptor::new("latency", FieldKind::Number, "cycles from request to response"),
    FieldDescriptor::new("in_flight", FieldKind::Number, "requests being served"),
    FieldDescriptor::new("stats", FieldKind::Object, "served reads and writes"),
];

impl Inspectable for IdealMemory {
    fn fields(&self) -> &'static [FieldDescriptor] {
        FIELDS
    }

    fn field_value(&self, field: &str) -> Option<serde_json::Value> {
        let value = match field {
            "name" => serde_json::json!(self.name),
            "latency" => serde_json::json!(self.latency),
            "in_flight" => serde_json::json!(self.in_flight.len()),
            "stats" => serde_json::json!({
                "reads": self.stats.reads,
                "writes": self.stats.writes,
            }),
            _ => return None,
        };
        Some(value)
    }
}
