//! Operator control plane.
//!
//! The [`Monitor`] lets an operator pause and continue the engine, read the
//! current time, list registered components, wake a component and inspect
//! component state. It carries no transport; [`Monitor::handle`] accepts
//! route-style requests and returns JSON strings, so any front end (HTTP,
//! a REPL, a test) can sit on top of it.
//!
//! Components describe themselves through a static table of
//! [`FieldDescriptor`]s and answer value queries as `serde_json::Value`.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::component::{Ticker, TickingComponent};
use crate::connection::{Connection, DirectConnection};
use crate::engine::{Engine, RunControl};
use crate::msg::Msg;
use crate::types::SimTime;

/// Shape of an inspectable field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum FieldKind {
    Text,
    Number,
    Bool,
    Object,
    List,
}

/// Static description of one inspectable field.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
    pub doc: &'static str,
}

impl FieldDescriptor {
    pub const fn new(name: &'static str, kind: FieldKind, doc: &'static str) -> Self {
        Self { name, kind, doc }
    }
}

/// A component whose state can be read by the monitor.
pub trait Inspectable {
    /// The fields this component exposes.
    fn fields(&self) -> &'static [FieldDescriptor];

    /// Current value of a top-level field, or `None` if there is no such
    /// field.
    fn field_value(&self, field: &str) -> Option<Value>;

    /// Descriptor table with current values.
    fn describe(&self) -> Value {
        Value::Array(
            self.fields()
                .iter()
                .map(|desc| {
                    serde_json::json!({
                        "name": desc.name,
                        "kind": desc.kind,
                        "doc": desc.doc,
                        "value": self.field_value(desc.name).unwrap_or(Value::Null),
                    })
                })
                .collect(),
        )
    }
}

impl<T: Ticker + Inspectable> Inspectable for TickingComponent<T> {
    fn fields(&self) -> &'static [FieldDescriptor] {
        self.inner().fields()
    }

    fn field_value(&self, field: &str) -> Option<Value> {
        self.inner().field_value(field)
    }
}

static CONNECTION_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("name", FieldKind::Text, "connection name"),
    FieldDescriptor::new("buffered", FieldKind::Number, "messages awaiting delivery"),
    FieldDescriptor::new("next_tick_time", FieldKind::Number, "latest scheduled tick"),
    FieldDescriptor::new("ends", FieldKind::List, "per-port buffers in plug-in order"),
    FieldDescriptor::new("stats", FieldKind::Object, "connection counters"),
];

impl<M: Msg> Inspectable for DirectConnection<M> {
    fn fields(&self) -> &'static [FieldDescriptor] {
        CONNECTION_FIELDS
    }

    fn field_value(&self, field: &str) -> Option<Value> {
        let value = match field {
            "name" => serde_json::json!(self.name()),
            "buffered" => serde_json::json!(self.num_buffered()),
            "next_tick_time" => serde_json::json!(self.next_tick_time()),
            "ends" => self.export_stats()["ends"].take(),
            "stats" => serde_json::json!(self.stats()),
            _ => return None,
        };
        Some(value)
    }
}

/// Errors returned to control-plane callers.
///
/// None of them changes simulation state.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("unknown route: {0}")]
    UnknownRoute(String),

    #[error("malformed request: {0}")]
    MalformedRequest(#[from] serde_json::Error),

    #[error("unknown component: {0}")]
    UnknownComponent(String),

    #[error("component {comp} has no field {field}")]
    UnknownField { comp: String, field: String },

    #[error("index {index} is out of range for {path}")]
    BadIndex { path: String, index: String },

    #[error("component {0} cannot be ticked")]
    NotTickable(String),
}

pub type MonitorResult<T> = std::result::Result<T, MonitorError>;

/// Body of a field request.
#[derive(Debug, serde::Deserialize)]
pub struct FieldRequest {
    pub comp_name: String,
    pub field_name: String,
}

type Waker = Box<dyn Fn(SimTime)>;

struct Registered {
    name: String,
    target: Weak<RefCell<dyn Inspectable>>,
    waker: Option<Waker>,
}

/// Registry of inspectable components bound to one engine.
pub struct Monitor {
    engine: Rc<dyn Engine>,
    run_control: RunControl,
    components: Vec<Registered>,
}

impl Monitor {
    /// Creates a monitor for `engine`, pausing through `run_control`.
    pub fn new(engine: Rc<dyn Engine>, run_control: RunControl) -> Self {
        Self {
            engine,
            run_control,
            components: Vec::new(),
        }
    }

    /// Registers a ticking component.
    pub fn register_component<T>(&mut self, comp: &Rc<RefCell<TickingComponent<T>>>)
    where
        T: Ticker + Inspectable + 'static,
    {
        let (name, scheduler) = {
            let comp = comp.borrow();
            (comp.name().to_string(), Rc::clone(comp.scheduler()))
        };
        let target: Rc<RefCell<dyn Inspectable>> = comp.clone();
        self.push(name, Rc::downgrade(&target), Some(Box::new(move |now| scheduler.tick_later(now))));
    }

    /// Registers a connection.
    pub fn register_connection<M: Msg + 'static>(&mut self, conn: &Rc<RefCell<DirectConnection<M>>>) {
        let name = conn.borrow().name().to_string();
        let weak = Rc::downgrade(conn);
        let target: Rc<RefCell<dyn Inspectable>> = conn.clone();
        let waker: Waker = Box::new(move |now| {
            if let Some(conn) = weak.upgrade() {
                conn.borrow().tick_later(now);
            }
        });
        self.push(name, Rc::downgrade(&target), Some(waker));
    }

    /// Registers a component that can be inspected but not woken.
    pub fn register_passive(&mut self, name: impl Into<String>, target: &Rc<RefCell<dyn Inspectable>>) {
        self.push(name.into(), Rc::downgrade(target), None);
    }

    fn push(&mut self, name: String, target: Weak<RefCell<dyn Inspectable>>, waker: Option<Waker>) {
        debug!(component = %name, "registered with monitor");
        self.components.push(Registered { name, target, waker });
    }

    /// Pauses the engine before its next event.
    pub fn pause(&self) {
        info!("simulation paused by operator");
        self.run_control.pause();
    }

    /// Lets a paused engine continue.
    pub fn resume(&self) {
        info!("simulation resumed by operator");
        self.run_control.resume();
    }

    /// Runs the engine until its queue drains and returns the final time.
    ///
    /// Blocks while the run control is paused.
    pub fn run(&self) -> SimTime {
        info!(now = self.now(), "simulation run requested by operator");
        self.engine.run();
        self.now()
    }

    /// Returns the current virtual time.
    pub fn now(&self) -> SimTime {
        self.engine.current_time()
    }

    /// Returns registered component names in registration order.
    pub fn list_components(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.name.as_str()).collect()
    }

    /// Wakes a component at the next cycle boundary.
    pub fn tick(&self, name: &str) -> MonitorResult<()> {
        let entry = self.find(name)?;
        let waker = entry
            .waker
            .as_ref()
            .ok_or_else(|| MonitorError::NotTickable(name.to_string()))?;
        waker(self.now());
        debug!(component = %name, now = self.now(), "tick requested by operator");
        Ok(())
    }

    /// Returns a component's descriptor table with current values.
    pub fn component_details(&self, name: &str) -> MonitorResult<Value> {
        let target = self.target(name)?;
        let details = target.borrow().describe();
        Ok(serde_json::json!({
            "name": name,
            "fields": details,
        }))
    }

    /// Returns the value at a dotted field path such as `stats.read_hits` or
    /// `ends.0.buffered`.
    ///
    /// # Panics
    /// Panics if the path continues past a scalar value.
    pub fn field(&self, comp_name: &str, field_path: &str) -> MonitorResult<Value> {
        let target = self.target(comp_name)?;
        let mut segments = field_path.split('.');
        let head = segments.next().unwrap_or_default();
        let unknown = || MonitorError::UnknownField {
            comp: comp_name.to_string(),
            field: field_path.to_string(),
        };

        let mut value = target.borrow().field_value(head).ok_or_else(unknown)?;
        for segment in segments {
            value = match value {
                Value::Object(mut map) => map.remove(segment).ok_or_else(unknown)?,
                Value::Array(mut items) => {
                    let index = segment
                        .parse::<usize>()
                        .ok()
                        .filter(|&i| i < items.len())
                        .ok_or_else(|| MonitorError::BadIndex {
                            path: field_path.to_string(),
                            index: segment.to_string(),
                        })?;
                    items.swap_remove(index)
                }
                scalar => panic!(
                    "field path {field_path} of {comp_name} descends into scalar {scalar}"
                ),
            };
        }
        Ok(value)
    }

    /// Serves one route-style request and returns a JSON body.
    ///
    /// Routes: `/api/pause`, `/api/continue`, `/api/run`, `/api/now`,
    /// `/api/list_components`, `/api/tick/{name}`, `/api/component/{name}`
    /// and `/api/field/{json}` where the JSON names `comp_name` and
    /// `field_name`.
    pub fn handle(&self, route: &str) -> MonitorResult<String> {
        let path = route.trim_end_matches('/');
        let body = match path {
            "/api/pause" => {
                self.pause();
                serde_json::json!({ "paused": true })
            }
            "/api/continue" => {
                self.resume();
                serde_json::json!({ "paused": false })
            }
            "/api/run" => serde_json::json!({ "now": self.run() }),
            "/api/now" => serde_json::json!({ "now": self.now() }),
            "/api/list_components" => serde_json::json!(self.list_components()),
            _ => {
                if let Some(name) = path.strip_prefix("/api/tick/") {
                    self.tick(name)?;
                    serde_json::json!({ "ticked": name })
                } else if let Some(name) = path.strip_prefix("/api/component/") {
                    self.component_details(name)?
                } else if let Some(json) = route.strip_prefix("/api/field/") {
                    let req: FieldRequest = serde_json::from_str(json)?;
                    self.field(&req.comp_name, &req.field_name)?
                } else {
                    return Err(MonitorError::UnknownRoute(route.to_string()));
                }
            }
        };
        Ok(body.to_string())
    }

    fn find(&self, name: &str) -> MonitorResult<&Registered> {
        self.components
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| MonitorError::UnknownComponent(name.to_string()))
    }

    fn target(&self, name: &str) -> MonitorResult<Rc<RefCell<dyn Inspectable>>> {
        self.find(name)?
            .target
            .upgrade()
            .ok_or_else(|| MonitorError::UnknownComponent(name.to_string()))
    }
}
