//! Ports: the endpoints components use to talk to connections.
//!
//! A connection only sees the [`Port`] trait. [`LimitedPort`] is the
//! standard implementation used by components: it owns a bounded incoming
//! buffer, forwards sends to its connection and wakes its owner when
//! messages arrive or when sending becomes possible again.

use std::cell::{Ref, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::component::PortOwner;
use crate::connection::Connection;
use crate::error::{SendError, WiringError};
use crate::msg::Msg;
use crate::types::{PortId, SimTime};

/// Shared, type-erased reference to a connection carrying `M`.
pub type ConnectionRef<M> = Weak<RefCell<dyn Connection<M>>>;

/// The port contract consumed by connections.
pub trait Port<M: Msg> {
    /// Returns the port identity.
    fn id(&self) -> PortId;

    /// Returns the port name.
    fn name(&self) -> &str;

    /// Records the connection this port is plugged into.
    fn set_connection(&self, conn: ConnectionRef<M>);

    /// Offers a delivered message to the port.
    ///
    /// # Errors
    /// Returns the message unchanged if the port cannot take it now.
    fn recv(&self, msg: M) -> Result<(), M>;

    /// Tells the port that a previously refused send may now succeed.
    fn notify_available(&self, now: SimTime);
}

/// Counters kept by a [`LimitedPort`].
#[derive(Clone, Debug, Default)]
pub struct PortStats {
    pub sent: u64,
    pub send_refused: u64,
    pub received: u64,
    pub recv_refused: u64,
}

struct PortState<M> {
    incoming: VecDeque<M>,
    conn: Option<ConnectionRef<M>>,
    stats: PortStats,
}

/// A port with a bounded incoming buffer.
pub struct LimitedPort<M: Msg> {
    id: PortId,
    name: String,
    capacity: usize,
    owner: Rc<dyn PortOwner>,
    state: RefCell<PortState<M>>,
}

impl<M: Msg> LimitedPort<M> {
    /// Creates a port holding at most `capacity` received messages.
    pub fn new(owner: Rc<dyn PortOwner>, capacity: usize, name: impl Into<String>) -> Rc<Self> {
        let name = name.into();
        if capacity == 0 {
            panic!("{}", WiringError::ZeroCapacity { name });
        }

        Rc::new(Self {
            id: PortId::next(),
            name,
            capacity,
            owner,
            state: RefCell::new(PortState {
                incoming: VecDeque::with_capacity(capacity),
                conn: None,
                stats: PortStats::default(),
            }),
        })
    }

    /// Sends a message through the connection.
    ///
    /// The message source is stamped with this port. The caller is
    /// responsible for the destination and the send time.
    ///
    /// # Errors
    /// Returns [`SendError::BufferFull`] with the message when the connection
    /// is congested. The owner is woken once it may retry.
    ///
    /// # Panics
    /// Panics if the port is not plugged into a connection.
    pub fn send(&self, mut msg: M) -> Result<(), SendError<M>> {
        msg.meta_mut().src = Some(self.id);
        let conn = self.connection();

        let result = conn.borrow_mut().send(msg);

        let mut state = self.state.borrow_mut();
        match &result {
            Ok(()) => state.stats.sent += 1,
            Err(_) => {
                state.stats.send_refused += 1;
                trace!(port = %self.name, "send refused, waiting for capacity");
            }
        }
        result
    }

    /// Returns true if the connection currently has room for a send.
    pub fn can_send(&self) -> bool {
        self.connection().borrow().can_send(self.id)
    }

    /// Takes the oldest received message.
    ///
    /// Freeing a slot of a full buffer tells the connection that deliveries
    /// to this port may resume.
    pub fn retrieve(&self, now: SimTime) -> Option<M> {
        let (msg, was_full, conn) = {
            let mut state = self.state.borrow_mut();
            let was_full = state.incoming.len() >= self.capacity;
            let msg = state.incoming.pop_front();
            (msg, was_full, state.conn.clone())
        };

        if msg.is_some() && was_full {
            if let Some(conn) = conn.and_then(|c| c.upgrade()) {
                conn.borrow_mut().notify_available(now);
            }
        }
        msg
    }

    /// Returns the oldest received message without removing it.
    pub fn peek(&self) -> Option<Ref<'_, M>> {
        Ref::filter_map(self.state.borrow(), |state| state.incoming.front()).ok()
    }

    /// Returns the number of buffered incoming messages.
    pub fn num_incoming(&self) -> usize {
        self.state.borrow().incoming.len()
    }

    /// Returns the incoming buffer capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns a snapshot of the port counters.
    pub fn stats(&self) -> PortStats {
        self.state.borrow().stats.clone()
    }

    /// Returns true if the port is plugged into a live connection.
    pub fn is_connected(&self) -> bool {
        self.state
            .borrow()
            .conn
            .as_ref()
            .is_some_and(|c| c.strong_count() > 0)
    }

    fn connection(&self) -> Rc<RefCell<dyn Connection<M>>> {
        let conn = self.state.borrow().conn.as_ref().and_then(|c| c.upgrade());
        match conn {
            Some(conn) => conn,
            None => panic!(
                "{}",
                WiringError::Unconnected {
                    name: self.name.clone()
                }
            ),
        }
    }
}

impl<M: Msg> Port<M> for LimitedPort<M> {
    fn id(&self) -> PortId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_connection(&self, conn: ConnectionRef<M>) {
        self.state.borrow_mut().conn = Some(conn);
    }

    fn recv(&self, msg: M) -> Result<(), M> {
        let now = msg.meta().recv_time.unwrap_or(msg.meta().send_time);
        {
            let mut state = self.state.borrow_mut();
            if state.incoming.len() >= self.capacity {
                state.stats.recv_refused += 1;
                return Err(msg);
            }
            state.incoming.push_back(msg);
            state.stats.received += 1;
        }

        self.owner.notify_recv(now);
        Ok(())
    }

    fn notify_available(&self, now: SimTime) {
        self.owner.notify_port_free(now);
    }
}
