//! Global virtual-time engine.
//!
//! The [`Engine`] trait is the contract every component and connection is
//! built against; [`SerialEngine`] is the single-threaded implementation.
//! Engines are passed explicitly (as `Rc<dyn Engine>`) to whatever needs
//! to schedule events; there is no process-wide engine.
//!
//! # Ordering
//!
//! Events are processed in non-decreasing time order. At equal timestamps
//! every primary event runs before any secondary event, and events of the
//! same kind run in the order they were scheduled. This total order is what
//! makes two runs with the same inputs produce identical traces.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info};

use crate::event::Event;
use crate::types::SimTime;

/// The contract consumed by connections and ticking components.
pub trait Engine {
    /// Adds an event to the queue.
    ///
    /// # Panics
    /// Panics if the event is scheduled before the current time.
    fn schedule(&self, event: Event);

    /// Returns the time of the event being processed (or last processed).
    fn current_time(&self) -> SimTime;

    /// Processes events until the queue is empty.
    fn run(&self);

    /// Stops event processing before the next event.
    fn pause(&self);

    /// Lets a paused engine continue.
    fn resume(&self);
}

/// Pause/continue switch of an engine.
///
/// Cloned handles share the same state and may live on other threads, so an
/// operator (for instance a monitoring front end) can pause a running
/// simulation. A paused engine blocks before its next event until resumed.
#[derive(Clone, Debug, Default)]
pub struct RunControl {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl RunControl {
    /// Creates a new, running control.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a pause before the next event.
    pub fn pause(&self) {
        let (paused, _) = &*self.inner;
        *paused.lock() = true;
    }

    /// Clears a pause and wakes the blocked engine.
    pub fn resume(&self) {
        let (paused, resumed) = &*self.inner;
        *paused.lock() = false;
        resumed.notify_all();
    }

    /// Returns true if a pause is in effect.
    pub fn is_paused(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Blocks the calling thread while paused.
    fn wait_while_paused(&self) {
        let (paused, resumed) = &*self.inner;
        let mut guard = paused.lock();
        while *guard {
            resumed.wait(&mut guard);
        }
    }
}

/// Statistics collected by the engine.
#[derive(Clone, Debug, Default)]
pub struct EngineStats {
    /// Total number of events processed
    pub events_processed: u64,
    /// Number of primary events processed
    pub primary_events: u64,
    /// Number of secondary events processed
    pub secondary_events: u64,
    /// Largest number of events pending at once
    pub peak_queue_len: usize,
}

/// Queue entry. Ordered so that `BinaryHeap` (a max-heap) pops the smallest
/// `(time, secondary, seq)` first.
struct Scheduled {
    time: SimTime,
    secondary: bool,
    seq: u64,
    event: Event,
}

impl Scheduled {
    fn key(&self) -> (SimTime, bool, u64) {
        (self.time, self.secondary, self.seq)
    }
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse for min-heap behavior
        other.key().cmp(&self.key())
    }
}

/// Single-threaded engine.
///
/// All methods take `&self`: handlers schedule new events while the engine
/// is dispatching, so queue state lives in cells that are never borrowed
/// across a handler invocation.
///
/// # Example
///
/// ```
/// use std::rc::Rc;
/// use lockstep::engine::{Engine, SerialEngine};
///
/// let engine = Rc::new(SerialEngine::new());
/// engine.run();
/// assert_eq!(engine.current_time(), 0);
/// ```
pub struct SerialEngine {
    queue: RefCell<BinaryHeap<Scheduled>>,
    now: Cell<SimTime>,
    next_seq: Cell<u64>,
    control: RunControl,
    stats: RefCell<EngineStats>,
}

impl SerialEngine {
    /// Creates an engine with an empty queue at time zero.
    pub fn new() -> Self {
        Self {
            queue: RefCell::new(BinaryHeap::new()),
            now: Cell::new(0),
            next_seq: Cell::new(0),
            control: RunControl::new(),
            stats: RefCell::new(EngineStats::default()),
        }
    }

    /// Returns a handle that pauses and resumes this engine from anywhere.
    pub fn run_control(&self) -> RunControl {
        self.control.clone()
    }

    /// Returns the number of events waiting in the queue.
    pub fn pending_events(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Processes events whose time is at most `deadline`.
    ///
    /// Returns true if events remain queued after the deadline.
    pub fn run_until(&self, deadline: SimTime) -> bool {
        loop {
            self.control.wait_while_paused();

            let due = self
                .queue
                .borrow()
                .peek()
                .is_some_and(|next| next.time <= deadline);
            if !due {
                break;
            }

            self.step();
        }

        !self.queue.borrow().is_empty()
    }

    /// Processes exactly one event, if any is queued.
    ///
    /// Returns false when the queue was empty.
    pub fn step(&self) -> bool {
        // The queue borrow must end before the handler runs; handlers schedule.
        let next = self.queue.borrow_mut().pop();
        let Some(Scheduled { time, event, .. }) = next else {
            return false;
        };

        self.now.set(time);
        {
            let mut stats = self.stats.borrow_mut();
            stats.events_processed += 1;
            if event.is_secondary() {
                stats.secondary_events += 1;
            } else {
                stats.primary_events += 1;
            }
        }

        event.handler().borrow_mut().handle(&event);
        true
    }

    /// Returns a snapshot of the engine statistics.
    pub fn stats(&self) -> EngineStats {
        self.stats.borrow().clone()
    }

    /// Exports statistics as JSON.
    pub fn export_stats(&self) -> serde_json::Value {
        let stats = self.stats.borrow();
        serde_json::json!({
            "current_time": self.now.get(),
            "events_processed": stats.events_processed,
            "primary_events": stats.primary_events,
            "secondary_events": stats.secondary_events,
            "peak_queue_len": stats.peak_queue_len,
            "pending_events": self.queue.borrow().len(),
        })
    }
}

impl Default for SerialEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for SerialEngine {
    fn schedule(&self, event: Event) {
        let now = self.now.get();
        assert!(
            event.time() >= now,
            "event scheduled at {} is in the past (now = {})",
            event.time(),
            now
        );

        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);

        let mut queue = self.queue.borrow_mut();
        queue.push(Scheduled {
            time: event.time(),
            secondary: event.is_secondary(),
            seq,
            event,
        });

        let mut stats = self.stats.borrow_mut();
        stats.peak_queue_len = stats.peak_queue_len.max(queue.len());
    }

    fn current_time(&self) -> SimTime {
        self.now.get()
    }

    fn run(&self) {
        info!(now = self.now.get(), pending = self.pending_events(), "engine run started");

        loop {
            self.control.wait_while_paused();
            if !self.step() {
                break;
            }
        }

        let stats = self.stats.borrow();
        info!(
            now = self.now.get(),
            events = stats.events_processed,
            "engine run finished"
        );
    }

    fn pause(&self) {
        debug!(now = self.now.get(), "engine paused");
        self.control.pause();
    }

    fn resume(&self) {
        debug!(now = self.now.get(), "engine resumed");
        self.control.resume();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Handler;
    use std::rc::Rc;

    /// Records (label, time) for every event it receives.
    struct Probe {
        label: &'static str,
        log: Rc<RefCell<Vec<(&'static str, SimTime)>>>,
    }

    impl Handler for Probe {
        fn handle(&mut self, event: &Event) {
            self.log.borrow_mut().push((self.label, event.time()));
        }
    }

    fn probe(
        label: &'static str,
        log: &Rc<RefCell<Vec<(&'static str, SimTime)>>>,
    ) -> Rc<RefCell<Probe>> {
        Rc::new(RefCell::new(Probe {
            label,
            log: log.clone(),
        }))
    }

    #[test]
    fn test_engine_creation() {
        let engine = SerialEngine::new();
        assert_eq!(engine.current_time(), 0);
        assert_eq!(engine.pending_events(), 0);
        assert!(!engine.step());
    }

    #[test]
    fn test_events_run_in_time_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let engine = SerialEngine::new();

        engine.schedule(Event::new(30, probe("c", &log)));
        engine.schedule(Event::new(10, probe("a", &log)));
        engine.schedule(Event::new(20, probe("b", &log)));
        engine.run();

        assert_eq!(*log.borrow(), vec![("a", 10), ("b", 20), ("c", 30)]);
        assert_eq!(engine.current_time(), 30);
        assert_eq!(engine.stats().events_processed, 3);
    }

    #[test]
    fn test_primary_before_secondary_at_same_time() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let engine = SerialEngine::new();

        engine.schedule(Event::secondary(10, probe("delivery", &log)));
        engine.schedule(Event::new(10, probe("tick1", &log)));
        engine.schedule(Event::new(10, probe("tick2", &log)));
        engine.run();

        assert_eq!(
            *log.borrow(),
            vec![("tick1", 10), ("tick2", 10), ("delivery", 10)]
        );

        let stats = engine.stats();
        assert_eq!(stats.primary_events, 2);
        assert_eq!(stats.secondary_events, 1);
    }

    #[test]
    fn test_fifo_among_equal_events() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let engine = SerialEngine::new();

        for label in ["first", "second", "third"] {
            engine.schedule(Event::secondary(5, probe(label, &log)));
        }
        engine.run();

        let labels: Vec<_> = log.borrow().iter().map(|(l, _)| *l).collect();
        assert_eq!(labels, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_run_until_stops_at_deadline() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let engine = SerialEngine::new();

        engine.schedule(Event::new(10, probe("a", &log)));
        engine.schedule(Event::new(50, probe("b", &log)));

        let remaining = engine.run_until(20);
        assert!(remaining);
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(engine.current_time(), 10);

        let remaining = engine.run_until(100);
        assert!(!remaining);
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    #[should_panic(expected = "in the past")]
    fn test_schedule_in_past_panics() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let engine = SerialEngine::new();

        engine.schedule(Event::new(10, probe("a", &log)));
        engine.run();
        engine.schedule(Event::new(5, probe("late", &log)));
    }

    #[test]
    fn test_pause_blocks_until_resumed_from_other_thread() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let engine = SerialEngine::new();
        engine.schedule(Event::new(1, probe("a", &log)));

        let control = engine.run_control();
        engine.pause();
        assert!(control.is_paused());

        let resumer = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            control.resume();
        });

        engine.run();
        resumer.join().unwrap();

        assert_eq!(log.borrow().len(), 1);
        assert!(!engine.run_control().is_paused());
    }

    #[test]
    fn test_export_stats() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let engine = SerialEngine::new();
        engine.schedule(Event::new(10, probe("a", &log)));
        engine.schedule(Event::secondary(10, probe("b", &log)));
        engine.run();

        let stats = engine.export_stats();
        assert_eq!(stats["current_time"], 10);
        assert_eq!(stats["events_processed"], 2);
        assert_eq!(stats["peak_queue_len"], 2);
        assert_eq!(stats["pending_events"], 0);
    }
}
