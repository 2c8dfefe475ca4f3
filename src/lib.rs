//! # Lockstep
//!
//! A deterministic virtual-time simulation kernel for hardware models.
//!
//! ## Design Principles
//!
//! - **Explicit engine**: every component and connection is handed the
//!   [`Engine`] it schedules on; there is no global engine.
//! - **Tick until idle**: components implement [`Ticker`] and keep ticking
//!   once per cycle while they make progress. Idle components sleep until a
//!   port wakes them.
//! - **Timed connections**: [`DirectConnection`] buffers sends per port,
//!   pushes back on full buffers and delivers on secondary tick events, so
//!   delivery always follows component work at the same timestamp.
//! - **Determinism**: the same inputs and seed always produce the same event
//!   order, final time and receive times.
//!
//! ## Features
//!
//! - `parallel` - Run independent replicas on a rayon thread pool
//!
//! ## Quick Start
//!
//! ```rust
//! use std::rc::Rc;
//! use lockstep::agent::TrafficAgent;
//! use lockstep::connection::{Connection, DirectConnection};
//! use lockstep::engine::{Engine, SerialEngine};
//! use lockstep::freq::Freq;
//! use lockstep::msg::SampleMsg;
//! use lockstep::port::Port;
//!
//! let engine = Rc::new(SerialEngine::new());
//! let conn = DirectConnection::<SampleMsg>::builder(engine.clone()).build("Conn");
//! let a = TrafficAgent::build("A", engine.clone(), Freq::new(1), 4);
//! let b = TrafficAgent::build("B", engine.clone(), Freq::new(1), 4);
//!
//! let pa = a.borrow().inner().port().clone();
//! let pb = b.borrow().inner().port().clone();
//! conn.borrow_mut().plug_in(pa.clone(), 1);
//! conn.borrow_mut().plug_in(pb.clone(), 1);
//!
//! a.borrow_mut().inner_mut().enqueue(SampleMsg::routed("hello", pa.id(), pb.id(), 0));
//! a.borrow().tick_later(0);
//! engine.run();
//!
//! assert_eq!(b.borrow().inner().received().len(), 1);
//! ```
//!
//! ## Configuration-Driven Setup
//!
//! ```rust,ignore
//! use lockstep::config::SimConfig;
//! use lockstep::scenario::AllToAllScenario;
//!
//! let config = SimConfig::from_file("simulation.yaml")?;
//! lockstep::init_logging(&config.simulation.log_level);
//! let report = AllToAllScenario::from_config(&config)?.run();
//! ```

pub mod agent;
pub mod component;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod event;
pub mod freq;
pub mod mem;
pub mod monitor;
pub mod msg;
pub mod parallel;
pub mod pipeline;
pub mod port;
pub mod scenario;
pub mod stats;
pub mod types;

// Re-export commonly used types
pub use types::{MsgId, PortId, SimTime};
pub use event::{Event, Handler};
pub use engine::{Engine, EngineStats, RunControl, SerialEngine};
pub use freq::Freq;
pub use msg::{Msg, MsgMeta, SampleMsg};
pub use port::{LimitedPort, Port};
pub use connection::{Connection, DirectConnection, EndState};
pub use component::{PortOwner, TickScheduler, Ticker, TickingComponent};
pub use error::{SendError, WiringError};
pub use config::{ConfigError, SimConfig, SimConfigBuilder};
pub use monitor::{Inspectable, Monitor, MonitorError};
pub use stats::{SimulationStats, StatsCollector, Timer};
pub use scenario::{AllToAllScenario, ScenarioReport};
pub use parallel::run_replicas;

/// Initialize the tracing subscriber for logging.
///
/// `RUST_LOG`, when set, overrides `level`.
///
/// # Example
///
/// ```rust,ignore
/// lockstep::init_logging("info");
/// ```
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
