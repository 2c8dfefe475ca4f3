//! Traffic-generating component.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use serde::Serialize;
use tracing::trace;

use crate::component::{Ticker, TickingComponent};
use crate::engine::Engine;
use crate::freq::Freq;
use crate::monitor::{FieldDescriptor, FieldKind, Inspectable};
use crate::msg::SampleMsg;
use crate::port::LimitedPort;
use crate::types::SimTime;

/// Counters kept by a traffic agent.
#[derive(Clone, Debug, Default, Serialize)]
pub struct AgentStats {
    pub sent: u64,
    pub received: u64,
    pub send_retries: u64,
}

/// Sends a queue of prepared messages through one port while collecting
/// whatever arrives on the same port.
///
/// Each cycle the agent takes at most one incoming message and sends at most
/// one outgoing message. A refused send is retried once the port is woken.
pub struct TrafficAgent {
    name: String,
    port: Rc<LimitedPort<SampleMsg>>,
    msgs_out: VecDeque<SampleMsg>,
    msgs_in: Vec<SampleMsg>,
    stats: AgentStats,
}

impl TrafficAgent {
    /// Creates an agent whose port buffers `port_capacity` incoming messages.
    pub fn build(
        name: impl Into<String>,
        engine: Rc<dyn Engine>,
        freq: Freq,
        port_capacity: usize,
    ) -> Rc<RefCell<TickingComponent<TrafficAgent>>> {
        let name = name.into();
        TickingComponent::build(name.clone(), engine, freq, |scheduler| TrafficAgent {
            port: LimitedPort::new(scheduler.clone(), port_capacity, format!("{name}.OutPort")),
            name,
            msgs_out: VecDeque::new(),
            msgs_in: Vec::new(),
            stats: AgentStats::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn port(&self) -> &Rc<LimitedPort<SampleMsg>> {
        &self.port
    }

    /// Queues a message for sending. Its send time is set when it leaves.
    pub fn enqueue(&mut self, msg: SampleMsg) {
        self.msgs_out.push_back(msg);
    }

    /// Number of messages not sent yet.
    pub fn num_pending(&self) -> usize {
        self.msgs_out.len()
    }

    /// Messages received so far, in arrival order.
    pub fn received(&self) -> &[SampleMsg] {
        &self.msgs_in
    }

    pub fn stats(&self) -> &AgentStats {
        &self.stats
    }
}

impl Ticker for TrafficAgent {
    fn tick(&mut self, now: SimTime) -> bool {
        let mut progress = false;

        if let Some(msg) = self.port.retrieve(now) {
            self.msgs_in.push(msg);
            self.stats.received += 1;
            progress = true;
        }

        if let Some(mut msg) = self.msgs_out.pop_front() {
            msg.meta.send_time = now;
            match self.port.send(msg) {
                Ok(()) => {
                    self.stats.sent += 1;
                    progress = true;
                }
                Err(err) => {
                    self.stats.send_retries += 1;
                    trace!(agent = %self.name, "send refused");
                    self.msgs_out.push_front(err.into_msg());
                }
            }
        }

        progress
    }
}

static FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("name", FieldKind::Text, "component name"),
    FieldDescriptor::new("pending", FieldKind::Number, "messages waiting to be sent"),
    FieldDescriptor::new("received", FieldKind::Number, "messages collected"),
    FieldDescriptor::new("stats", FieldKind::Object, "agent counters"),
];

impl Inspectable for TrafficAgent {
    fn fields(&self) -> &'static [FieldDescriptor] {
        FIELDS
    }

    fn field_value(&self, field: &str) -> Option<serde_json::Value> {
        let value = match field {
            "name" => serde_json::json!(self.name),
            "pending" => serde_json::json!(self.msgs_out.len()),
            "received" => serde_json::json!(self.msgs_in.len()),
            "stats" => serde_json::json!(self.stats),
            _ => return None,
        };
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{Connection, DirectConnection};
    use crate::engine::SerialEngine;
    use crate::port::Port;

    #[test]
    fn test_pair_exchanges_messages() {
        let engine = Rc::new(SerialEngine::new());
        let conn = DirectConnection::<SampleMsg>::builder(engine.clone()).build("conn");
        let a = TrafficAgent::build("a", engine.clone(), Freq::new(1), 4);
        let b = TrafficAgent::build("b", engine.clone(), Freq::new(1), 4);

        let pa = a.borrow().inner().port().clone();
        let pb = b.borrow().inner().port().clone();
        conn.borrow_mut().plug_in(pa.clone(), 1);
        conn.borrow_mut().plug_in(pb.clone(), 1);

        for i in 0..3 {
            a.borrow_mut()
                .inner_mut()
                .enqueue(SampleMsg::routed(format!("a{i}"), pa.id(), pb.id(), 0));
        }
        a.borrow().tick_later(0);
        engine.run();

        let b = b.borrow();
        let received = b.inner().received();
        assert_eq!(received.len(), 3);
        let ids: Vec<_> = received.iter().map(|m| m.meta.id.as_str()).collect();
        assert_eq!(ids, ["a0", "a1", "a2"]);
        assert!(received.iter().all(|m| m.meta.recv_time.is_some()));
        assert_eq!(a.borrow().inner().num_pending(), 0);
    }
}
