//! Ticking components.
//!
//! A ticking component advances one clock cycle per [`Ticker::tick`] and
//! reports whether it made progress. The [`TickingComponent`] wrapper turns
//! a ticker into an engine [`Handler`]: as long as ticks make progress the
//! next cycle is scheduled automatically; once a tick makes no progress the
//! component sleeps until something external (a message arriving, buffer
//! space freeing up, an operator request) calls
//! [`TickScheduler::tick_later`].
//!
//! Components composed of several internal stages tick every stage and OR
//! the results (see [`crate::pipeline`]).

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::engine::Engine;
use crate::event::{Event, Handler};
use crate::freq::Freq;
use crate::types::SimTime;

/// The per-cycle behavior of a component.
pub trait Ticker {
    /// Advances the component by one cycle.
    ///
    /// # Returns
    /// `true` if any state changed; the component is then ticked again on the
    /// next cycle. `false` lets it sleep until woken.
    fn tick(&mut self, now: SimTime) -> bool;
}

/// Entity that owns ports and wants to hear about their activity.
pub trait PortOwner {
    /// Name of the owning component.
    fn name(&self) -> &str;

    /// A message arrived on one of the owner's ports.
    fn notify_recv(&self, now: SimTime);

    /// One of the owner's ports may send again.
    fn notify_port_free(&self, now: SimTime);
}

/// Schedules tick events for one handler without ever scheduling the same
/// tick twice.
///
/// The scheduler remembers the latest tick it has put on the engine; a
/// request for a tick at or before that time is dropped. This is what
/// coalesces many wake-ups within one cycle into a single event.
pub struct TickScheduler {
    name: String,
    handler: Weak<RefCell<dyn Handler>>,
    engine: Rc<dyn Engine>,
    freq: Freq,
    secondary: bool,
    next_tick_time: Cell<Option<SimTime>>,
}

impl TickScheduler {
    /// Creates a scheduler that issues primary tick events.
    pub fn new(
        name: impl Into<String>,
        handler: Weak<RefCell<dyn Handler>>,
        engine: Rc<dyn Engine>,
        freq: Freq,
    ) -> Self {
        Self {
            name: name.into(),
            handler,
            engine,
            freq,
            secondary: false,
            next_tick_time: Cell::new(None),
        }
    }

    /// Creates a scheduler that issues secondary tick events.
    pub fn new_secondary(
        name: impl Into<String>,
        handler: Weak<RefCell<dyn Handler>>,
        engine: Rc<dyn Engine>,
        freq: Freq,
    ) -> Self {
        Self {
            secondary: true,
            ..Self::new(name, handler, engine, freq)
        }
    }

    /// Requests a tick at the current cycle boundary (at or after `now`).
    pub fn tick_now(&self, now: SimTime) {
        self.schedule_at(self.freq.this_tick(now));
    }

    /// Requests a tick at the first cycle boundary after `now`.
    pub fn tick_later(&self, now: SimTime) {
        self.schedule_at(self.freq.next_tick(now));
    }

    /// Returns the time of the latest scheduled tick, if any.
    pub fn next_tick_time(&self) -> Option<SimTime> {
        self.next_tick_time.get()
    }

    /// Returns the clock.
    pub fn freq(&self) -> Freq {
        self.freq
    }

    /// Returns the engine this scheduler feeds.
    pub fn engine(&self) -> &Rc<dyn Engine> {
        &self.engine
    }

    /// Returns the scheduled component's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn schedule_at(&self, time: SimTime) {
        if self.next_tick_time.get().is_some_and(|at| at >= time) {
            return;
        }

        // The handler is gone once its component has been dropped.
        let Some(handler) = self.handler.upgrade() else {
            return;
        };

        self.next_tick_time.set(Some(time));
        trace!(component = %self.name, time, secondary = self.secondary, "tick scheduled");

        let event = if self.secondary {
            Event::secondary(time, handler)
        } else {
            Event::new(time, handler)
        };
        self.engine.schedule(event);
    }
}

impl PortOwner for TickScheduler {
    fn name(&self) -> &str {
        &self.name
    }

    fn notify_recv(&self, now: SimTime) {
        self.tick_later(now);
    }

    fn notify_port_free(&self, now: SimTime) {
        self.tick_later(now);
    }
}

/// Statistics collected by a ticking component.
#[derive(Clone, Debug, Default)]
pub struct TickStats {
    /// Total number of ticks executed
    pub ticks_executed: u64,
    /// Ticks that made progress
    pub progress_ticks: u64,
    /// Ticks that made no progress (the component went to sleep after them)
    pub idle_ticks: u64,
}

/// A [`Ticker`] bound to an engine and a clock.
///
/// # Example
///
/// ```
/// use std::rc::Rc;
/// use lockstep::component::{Ticker, TickingComponent};
/// use lockstep::engine::{Engine, SerialEngine};
/// use lockstep::freq::Freq;
/// use lockstep::types::SimTime;
///
/// struct Countdown(u32);
///
/// impl Ticker for Countdown {
///     fn tick(&mut self, _now: SimTime) -> bool {
///         if self.0 == 0 {
///             return false;
///         }
///         self.0 -= 1;
///         true
///     }
/// }
///
/// let engine = Rc::new(SerialEngine::new());
/// let comp = TickingComponent::build("countdown", engine.clone(), Freq::new(1), |_| Countdown(3));
/// comp.borrow().tick_later(0);
/// engine.run();
///
/// assert_eq!(comp.borrow().inner().0, 0);
/// assert_eq!(engine.current_time(), 4);
/// ```
pub struct TickingComponent<T> {
    scheduler: Rc<TickScheduler>,
    inner: T,
    stats: TickStats,
}

impl<T: Ticker + 'static> TickingComponent<T> {
    /// Creates a ticking component.
    ///
    /// `make` receives the component's scheduler, which is also the owner to
    /// hand to the component's ports.
    pub fn build<F>(
        name: impl Into<String>,
        engine: Rc<dyn Engine>,
        freq: Freq,
        make: F,
    ) -> Rc<RefCell<Self>>
    where
        F: FnOnce(&Rc<TickScheduler>) -> T,
    {
        let name = name.into();
        Rc::new_cyclic(|weak: &Weak<RefCell<Self>>| {
            let handler: Weak<RefCell<dyn Handler>> = weak.clone();
            let scheduler = Rc::new(TickScheduler::new(name, handler, engine, freq));
            let inner = make(&scheduler);
            RefCell::new(Self {
                scheduler,
                inner,
                stats: TickStats::default(),
            })
        })
    }
}

impl<T> TickingComponent<T> {
    /// Returns the component name.
    pub fn name(&self) -> &str {
        self.scheduler.name()
    }

    /// Returns the scheduler driving this component.
    pub fn scheduler(&self) -> &Rc<TickScheduler> {
        &self.scheduler
    }

    /// Wakes the component for the next cycle.
    pub fn tick_later(&self, now: SimTime) {
        self.scheduler.tick_later(now);
    }

    /// Returns the wrapped ticker.
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Returns the wrapped ticker for modification.
    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Returns the tick statistics.
    pub fn stats(&self) -> &TickStats {
        &self.stats
    }

    /// Exports statistics as JSON.
    pub fn export_stats(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name(),
            "ticks_executed": self.stats.ticks_executed,
            "progress_ticks": self.stats.progress_ticks,
            "idle_ticks": self.stats.idle_ticks,
        })
    }
}

impl<T: Ticker> Handler for TickingComponent<T> {
    fn handle(&mut self, event: &Event) {
        let now = event.time();
        self.stats.ticks_executed += 1;

        if self.inner.tick(now) {
            self.stats.progress_ticks += 1;
            self.scheduler.tick_later(now);
        } else {
            self.stats.idle_ticks += 1;
            trace!(component = %self.scheduler.name(), now, "no progress, sleeping");
        }
    }
}
