//! Event definitions for the simulation kernel.
//!
//! Events are the only way virtual time advances. Each event carries the
//! time at which it fires, a primary/secondary flag and the handler that
//! receives it.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::types::SimTime;

/// Anything that can receive events from the engine.
///
/// The engine never invokes a handler while another invocation of the same
/// handler is in progress, so implementations need no internal locking.
pub trait Handler {
    /// Processes an event that fired at `event.time()`.
    fn handle(&mut self, event: &Event);
}

/// Shared reference to a handler, as stored inside scheduled events.
pub type HandlerRef = Rc<RefCell<dyn Handler>>;

/// A scheduled tick for a handler.
///
/// Secondary events fire after every primary event with the same timestamp.
/// Connection deliveries are secondary so that component-local work at a
/// given time always happens before the messages it produced are moved.
#[derive(Clone)]
pub struct Event {
    time: SimTime,
    secondary: bool,
    handler: HandlerRef,
}

impl Event {
    /// Creates a primary event.
    pub fn new(time: SimTime, handler: HandlerRef) -> Self {
        Self {
            time,
            secondary: false,
            handler,
        }
    }

    /// Creates a secondary event.
    pub fn secondary(time: SimTime, handler: HandlerRef) -> Self {
        Self {
            time,
            secondary: true,
            handler,
        }
    }

    /// Returns the time at which the event fires.
    pub fn time(&self) -> SimTime {
        self.time
    }

    /// Returns true if the event is ordered after primary events at the same time.
    pub fn is_secondary(&self) -> bool {
        self.secondary
    }

    /// Returns the handler that receives the event.
    pub fn handler(&self) -> &HandlerRef {
        &self.handler
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("time", &self.time)
            .field("secondary", &self.secondary)
            .finish()
    }
}
