//! Connections move messages between ports.
//!
//! [`DirectConnection`] delivers with zero added latency beyond one
//! connection tick. Each plugged-in port gets an [`End`] on the connection:
//! a bounded FIFO holding the messages that port has sent and that have not
//! been delivered yet. A full End refuses further sends from its port
//! (backpressure) until a delivery frees a slot, at which point the port is
//! notified.
//!
//! # Ticking
//!
//! The connection ticks with *secondary* events, so at any timestamp it runs
//! after all components have ticked. A send requests a tick at the send
//! time; requests for the same cycle coalesce into one event. On each tick
//! every End, in plug-in order, tries to deliver its head message. Deliveries
//! are therefore deterministic: the same inputs always produce the same
//! delivery order and times.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::{Rc, Weak};

use serde::Serialize;
use tracing::{debug, trace};

use crate::component::TickScheduler;
use crate::engine::Engine;
use crate::error::{SendError, WiringError};
use crate::event::{Event, Handler};
use crate::freq::Freq;
use crate::msg::Msg;
use crate::port::{ConnectionRef, Port};
use crate::types::{PortId, SimTime};

/// The connection contract consumed by ports.
pub trait Connection<M: Msg> {
    /// Returns the connection name.
    fn name(&self) -> &str;

    /// Registers a port with a buffer of `buffer_capacity` pending sends.
    ///
    /// # Panics
    /// Panics if the port is already registered or the capacity is zero.
    fn plug_in(&mut self, port: Rc<dyn Port<M>>, buffer_capacity: usize);

    /// Accepts a message for later delivery.
    ///
    /// # Errors
    /// [`SendError::BufferFull`] if the sender's End is at capacity.
    ///
    /// # Panics
    /// Panics with a [`WiringError`] if the message is unroutable.
    fn send(&mut self, msg: M) -> Result<(), SendError<M>>;

    /// Returns true if a send from `src` would currently be buffered.
    fn can_send(&self, src: PortId) -> bool;

    /// A destination freed capacity; try delivering again at `now`.
    fn notify_available(&mut self, now: SimTime);
}

/// Whether an End owes its port a "capacity available" notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum EndState {
    /// Nothing refused; no notification pending.
    Idle,
    /// A send was refused or a delivery bounced; the port is notified after
    /// the next successful delivery from this End.
    PendingRetry,
}

/// Per-port buffering on a connection.
pub struct End<M: Msg> {
    port: Rc<dyn Port<M>>,
    buf: VecDeque<M>,
    capacity: usize,
    state: EndState,
}

impl<M: Msg> End<M> {
    fn new(port: Rc<dyn Port<M>>, capacity: usize) -> Self {
        Self {
            port,
            buf: VecDeque::with_capacity(capacity),
            capacity,
            state: EndState::Idle,
        }
    }

    /// Returns the port this End belongs to.
    pub fn port(&self) -> &Rc<dyn Port<M>> {
        &self.port
    }

    /// Returns the buffered messages, oldest first.
    pub fn buffered(&self) -> impl Iterator<Item = &M> {
        self.buf.iter()
    }

    /// Returns the number of buffered messages.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Returns the buffer capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the retry state.
    pub fn state(&self) -> EndState {
        self.state
    }

    fn is_full(&self) -> bool {
        self.buf.len() >= self.capacity
    }
}

/// Counters kept by a connection.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ConnectionStats {
    pub msgs_accepted: u64,
    pub sends_refused: u64,
    pub msgs_delivered: u64,
    pub deliveries_refused: u64,
    pub ticks: u64,
}

/// Builds [`DirectConnection`]s.
pub struct DirectConnectionBuilder {
    engine: Rc<dyn Engine>,
    freq: Freq,
}

impl DirectConnectionBuilder {
    /// Sets the connection clock.
    pub fn with_freq(mut self, freq: Freq) -> Self {
        self.freq = freq;
        self
    }

    /// Replaces the engine.
    pub fn with_engine(mut self, engine: Rc<dyn Engine>) -> Self {
        self.engine = engine;
        self
    }

    /// Creates the connection.
    pub fn build<M: Msg>(self, name: impl Into<String>) -> Rc<RefCell<DirectConnection<M>>> {
        let name = name.into();
        let Self { engine, freq } = self;

        Rc::new_cyclic(|weak: &Weak<RefCell<DirectConnection<M>>>| {
            let handler: Weak<RefCell<dyn Handler>> = weak.clone();
            let scheduler = TickScheduler::new_secondary(name.clone(), handler, engine, freq);
            RefCell::new(DirectConnection {
                name,
                self_ref: weak.clone(),
                scheduler,
                ends: Vec::new(),
                index: HashMap::new(),
                stats: ConnectionStats::default(),
            })
        })
    }
}

/// A connection delivering messages between any pair of its ports.
pub struct DirectConnection<M: Msg> {
    name: String,
    self_ref: Weak<RefCell<DirectConnection<M>>>,
    scheduler: TickScheduler,
    ends: Vec<End<M>>,
    index: HashMap<PortId, usize>,
    stats: ConnectionStats,
}

impl<M: Msg> DirectConnection<M> {
    /// Starts building a connection driven by `engine`.
    pub fn builder(engine: Rc<dyn Engine>) -> DirectConnectionBuilder {
        DirectConnectionBuilder {
            engine,
            freq: Freq::default(),
        }
    }

    /// Returns the End of a port, if the port is plugged in.
    pub fn end(&self, port: PortId) -> Option<&End<M>> {
        self.index.get(&port).map(|&i| &self.ends[i])
    }

    /// Returns all Ends in plug-in order.
    pub fn ends(&self) -> &[End<M>] {
        &self.ends
    }

    /// Returns the number of messages waiting for delivery.
    pub fn num_buffered(&self) -> usize {
        self.ends.iter().map(End::len).sum()
    }

    /// Returns the counters.
    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// Returns the time of the latest scheduled tick.
    pub fn next_tick_time(&self) -> Option<SimTime> {
        self.scheduler.next_tick_time()
    }

    /// Requests a delivery pass at the next cycle boundary.
    pub fn tick_later(&self, now: SimTime) {
        self.scheduler.tick_later(now);
    }

    /// Exports statistics as JSON.
    pub fn export_stats(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "stats": self.stats,
            "buffered": self.num_buffered(),
            "ends": self.ends.iter().map(|end| serde_json::json!({
                "port": end.port.name(),
                "buffered": end.len(),
                "capacity": end.capacity,
                "state": end.state,
            })).collect::<Vec<_>>(),
        })
    }

    /// Runs one connection cycle.
    ///
    /// Each End, in plug-in order, offers its head message to the
    /// destination. Returns true if anything was delivered.
    pub fn tick(&mut self, now: SimTime) -> bool {
        self.stats.ticks += 1;

        let mut progress = false;
        for i in 0..self.ends.len() {
            progress |= self.forward_head(i, now);
        }
        progress
    }

    fn forward_head(&mut self, src: usize, now: SimTime) -> bool {
        let Some(dst) = self.ends[src].buf.front().and_then(|m| m.meta().dst) else {
            return false;
        };
        let Some(&dst_idx) = self.index.get(&dst) else {
            // Destinations are validated on send.
            return false;
        };
        let dst_port = Rc::clone(&self.ends[dst_idx].port);

        let end = &mut self.ends[src];
        let Some(mut msg) = end.buf.pop_front() else {
            return false;
        };
        msg.meta_mut().recv_time = Some(now);

        match dst_port.recv(msg) {
            Ok(()) => {
                self.stats.msgs_delivered += 1;
                if end.state == EndState::PendingRetry {
                    end.state = EndState::Idle;
                    end.port.notify_available(now);
                }
                true
            }
            Err(mut msg) => {
                msg.meta_mut().recv_time = None;
                end.buf.push_front(msg);
                end.state = EndState::PendingRetry;
                self.stats.deliveries_refused += 1;
                trace!(conn = %self.name, dst = %dst_port.name(), "delivery refused");
                false
            }
        }
    }

    fn route(&self, msg: &M) -> Result<usize, WiringError> {
        let meta = msg.meta();
        let src = meta.src.ok_or_else(|| WiringError::MissingSource {
            msg: meta.id.clone(),
        })?;
        let src_idx = *self.index.get(&src).ok_or_else(|| WiringError::UnknownSource {
            msg: meta.id.clone(),
            port: src,
        })?;
        let dst = meta.dst.ok_or_else(|| WiringError::MissingDestination {
            msg: meta.id.clone(),
        })?;
        if src == dst {
            return Err(WiringError::SelfLoop {
                msg: meta.id.clone(),
                port: src,
            });
        }
        if !self.index.contains_key(&dst) {
            return Err(WiringError::UnknownDestination {
                msg: meta.id.clone(),
                port: dst,
            });
        }
        Ok(src_idx)
    }
}

impl<M: Msg> Connection<M> for DirectConnection<M> {
    fn name(&self) -> &str {
        &self.name
    }

    fn plug_in(&mut self, port: Rc<dyn Port<M>>, buffer_capacity: usize) {
        let id = port.id();
        if self.index.contains_key(&id) {
            panic!(
                "{}",
                WiringError::DuplicatePort {
                    name: port.name().to_string(),
                    port: id,
                }
            );
        }
        if buffer_capacity == 0 {
            panic!(
                "{}",
                WiringError::ZeroCapacity {
                    name: port.name().to_string()
                }
            );
        }

        let conn: ConnectionRef<M> = self.self_ref.clone();
        port.set_connection(conn);

        debug!(conn = %self.name, port = %port.name(), capacity = buffer_capacity, "port plugged in");
        self.index.insert(id, self.ends.len());
        self.ends.push(End::new(port, buffer_capacity));
    }

    fn send(&mut self, msg: M) -> Result<(), SendError<M>> {
        let src_idx = match self.route(&msg) {
            Ok(i) => i,
            Err(err) => panic!("{}: {}", self.name, err),
        };

        let end = &mut self.ends[src_idx];
        if end.is_full() {
            end.state = EndState::PendingRetry;
            self.stats.sends_refused += 1;
            return Err(SendError::BufferFull(msg));
        }

        let send_time = msg.meta().send_time;
        end.buf.push_back(msg);
        self.stats.msgs_accepted += 1;

        self.scheduler.tick_now(send_time);
        Ok(())
    }

    fn can_send(&self, src: PortId) -> bool {
        self.end(src).is_some_and(|end| !end.is_full())
    }

    fn notify_available(&mut self, now: SimTime) {
        self.scheduler.tick_now(now);
    }
}

impl<M: Msg> Handler for DirectConnection<M> {
    fn handle(&mut self, event: &Event) {
        let now = event.time();
        let progress = self.tick(now);

        // A blocked head still has to be retried; the destination may also
        // wake us earlier through `notify_available`.
        if progress || self.ends.iter().any(|end| !end.is_empty()) {
            self.scheduler.tick_later(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SerialEngine;
    use crate::msg::SampleMsg;
    use std::cell::Cell;

    /// Accepts everything and remembers what arrived.
    struct SinkPort {
        id: PortId,
        received: RefCell<Vec<SampleMsg>>,
        available: Cell<u32>,
    }

    impl SinkPort {
        fn new() -> Rc<Self> {
            Rc::new(Self {
                id: PortId::next(),
                received: RefCell::new(Vec::new()),
                available: Cell::new(0),
            })
        }
    }

    impl Port<SampleMsg> for SinkPort {
        fn id(&self) -> PortId {
            self.id
        }
        fn name(&self) -> &str {
            "sink"
        }
        fn set_connection(&self, _conn: ConnectionRef<SampleMsg>) {}
        fn recv(&self, msg: SampleMsg) -> Result<(), SampleMsg> {
            self.received.borrow_mut().push(msg);
            Ok(())
        }
        fn notify_available(&self, _now: SimTime) {
            self.available.set(self.available.get() + 1);
        }
    }

    #[test]
    fn test_can_send_tracks_capacity() {
        let engine = Rc::new(SerialEngine::new());
        let conn = DirectConnection::<SampleMsg>::builder(engine).build("conn");
        let a = SinkPort::new();
        let b = SinkPort::new();
        conn.borrow_mut().plug_in(a.clone(), 1);
        conn.borrow_mut().plug_in(b.clone(), 1);

        assert!(conn.borrow().can_send(a.id));
        conn.borrow_mut()
            .send(SampleMsg::routed("m", a.id, b.id, 0))
            .unwrap();
        assert!(!conn.borrow().can_send(a.id));
        assert!(!conn.borrow().can_send(PortId::next()));
    }

    #[test]
    fn test_engine_run_delivers_everything() {
        let engine = Rc::new(SerialEngine::new());
        let conn = DirectConnection::<SampleMsg>::builder(engine.clone()).build("conn");
        let a = SinkPort::new();
        let b = SinkPort::new();
        conn.borrow_mut().plug_in(a.clone(), 4);
        conn.borrow_mut().plug_in(b.clone(), 4);

        for i in 0..3 {
            conn.borrow_mut()
                .send(SampleMsg::routed(format!("m{i}"), a.id, b.id, 2))
                .unwrap();
        }
        engine.run();

        let times: Vec<_> = b
            .received
            .borrow()
            .iter()
            .map(|m| m.meta.recv_time)
            .collect();
        assert_eq!(times, vec![Some(2), Some(3), Some(4)]);
        assert_eq!(conn.borrow().num_buffered(), 0);
        assert_eq!(conn.borrow().stats().msgs_delivered, 3);
    }

    #[test]
    fn test_export_stats_lists_ends() {
        let engine = Rc::new(SerialEngine::new());
        let conn = DirectConnection::<SampleMsg>::builder(engine).build("conn");
        conn.borrow_mut().plug_in(SinkPort::new(), 2);

        let stats = conn.borrow().export_stats();
        assert_eq!(stats["name"], "conn");
        assert_eq!(stats["ends"][0]["capacity"], 2);
        assert_eq!(stats["ends"][0]["state"], "Idle");
    }
}
