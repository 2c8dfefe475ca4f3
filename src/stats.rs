//! Statistics collection and export.
//!
//! Engines, components and connections each export their counters as JSON.
//! [`StatsCollector`] gathers those exports into one [`SimulationStats`]
//! that can be written as JSON, CSV or a human-readable summary.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::component::TickingComponent;
use crate::connection::{Connection, DirectConnection};
use crate::engine::SerialEngine;
use crate::msg::Msg;
use crate::types::SimTime;

/// Aggregate statistics for a simulation run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimulationStats {
    /// Simulation metadata
    pub metadata: SimulationMetadata,

    /// Engine-level statistics
    pub engine: EngineSummary,

    /// Per-component tick statistics, by component name
    pub components: BTreeMap<String, ComponentSummary>,

    /// Per-connection delivery statistics, by connection name
    pub connections: BTreeMap<String, ConnectionSummary>,

    /// Timing statistics
    pub timing: TimingStats,
}

/// Metadata about the simulation run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimulationMetadata {
    pub name: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub version: String,
    /// Seed used to build random traffic
    pub seed: Option<u64>,
}

/// Engine-level statistics.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EngineSummary {
    pub final_time: SimTime,
    pub events_processed: u64,
    pub primary_events: u64,
    pub secondary_events: u64,
    pub peak_queue_len: usize,
}

/// Tick statistics of one component.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ComponentSummary {
    pub ticks_executed: u64,
    pub progress_ticks: u64,
    pub idle_ticks: u64,
}

/// Delivery statistics of one connection.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ConnectionSummary {
    pub msgs_accepted: u64,
    pub sends_refused: u64,
    pub msgs_delivered: u64,
    pub deliveries_refused: u64,
    pub ticks: u64,
}

/// Timing/performance statistics.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TimingStats {
    /// Total wall-clock time in milliseconds
    pub total_wall_time_ms: f64,

    /// Simulated time per wall-clock second
    pub sim_time_per_second: f64,

    /// Events processed per wall-clock second
    pub events_per_second: f64,
}

impl SimulationStats {
    pub fn new() -> Self {
        Self {
            metadata: SimulationMetadata {
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..SimulationMetadata::default()
            },
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.metadata.name = name.into();
        self
    }

    /// Updates timing statistics based on wall clock time.
    pub fn compute_timing(&mut self, wall_time_ms: f64) {
        self.timing.total_wall_time_ms = wall_time_ms;

        if wall_time_ms > 0.0 {
            let seconds = wall_time_ms / 1000.0;
            self.timing.sim_time_per_second = self.engine.final_time as f64 / seconds;
            self.timing.events_per_second = self.engine.events_processed as f64 / seconds;
        }
    }

    /// Total messages delivered over all connections.
    pub fn total_delivered(&self) -> u64 {
        self.connections.values().map(|c| c.msgs_delivered).sum()
    }

    /// Exports statistics to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Exports statistics to a JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Exports summary statistics to CSV.
    pub fn to_csv(&self) -> String {
        let mut csv = String::from("metric,value\n");
        let _ = writeln!(csv, "final_time,{}", self.engine.final_time);
        let _ = writeln!(csv, "events_processed,{}", self.engine.events_processed);
        let _ = writeln!(csv, "primary_events,{}", self.engine.primary_events);
        let _ = writeln!(csv, "secondary_events,{}", self.engine.secondary_events);
        let _ = writeln!(csv, "peak_queue_len,{}", self.engine.peak_queue_len);
        let _ = writeln!(csv, "msgs_delivered,{}", self.total_delivered());
        let _ = writeln!(csv, "wall_time_ms,{:.2}", self.timing.total_wall_time_ms);
        let _ = writeln!(csv, "events_per_second,{:.2}", self.timing.events_per_second);
        csv
    }

    /// Exports summary statistics to a CSV file.
    pub fn to_csv_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        std::fs::write(path, self.to_csv())
    }

    /// Exports per-component statistics to CSV.
    pub fn components_to_csv(&self) -> String {
        let mut csv = String::from("component,ticks_executed,progress_ticks,idle_ticks\n");
        for (name, c) in &self.components {
            let _ = writeln!(
                csv,
                "{},{},{},{}",
                name, c.ticks_executed, c.progress_ticks, c.idle_ticks
            );
        }
        csv
    }

    /// Writes a human-readable summary.
    pub fn write_summary<W: Write>(&self, w: &mut W) -> std::fmt::Result {
        writeln!(w, "=== Simulation Statistics ===")?;
        if !self.metadata.name.is_empty() {
            writeln!(w, "Name: {}", self.metadata.name)?;
        }
        if let Some(seed) = self.metadata.seed {
            writeln!(w, "Seed: {seed}")?;
        }
        writeln!(w)?;

        writeln!(w, "--- Engine ---")?;
        writeln!(w, "Final simulation time: {}", self.engine.final_time)?;
        writeln!(
            w,
            "Events processed: {} ({} primary, {} secondary)",
            self.engine.events_processed, self.engine.primary_events, self.engine.secondary_events
        )?;
        writeln!(w, "Peak queue length: {}", self.engine.peak_queue_len)?;
        writeln!(w)?;

        writeln!(w, "--- Timing ---")?;
        writeln!(w, "Wall time: {:.2} ms", self.timing.total_wall_time_ms)?;
        writeln!(w, "Events/sec: {:.2}", self.timing.events_per_second)?;

        if !self.connections.is_empty() {
            writeln!(w)?;
            writeln!(w, "--- Connections ---")?;
            for (name, c) in &self.connections {
                writeln!(
                    w,
                    "{name}: {} delivered, {} refused sends, {} refused deliveries",
                    c.msgs_delivered, c.sends_refused, c.deliveries_refused
                )?;
            }
        }

        if !self.components.is_empty() {
            writeln!(w)?;
            writeln!(w, "--- Components ---")?;
            for (name, c) in &self.components {
                writeln!(
                    w,
                    "{name}: {} ticks, {} with progress",
                    c.ticks_executed, c.progress_ticks
                )?;
            }
        }

        Ok(())
    }

    /// Returns the summary as a string.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = self.write_summary(&mut out);
        out
    }
}

/// A simple timer for measuring wall-clock time.
#[derive(Debug)]
pub struct Timer {
    start: std::time::Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Returns elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}

fn unix_now() -> String {
    let now = std::time::SystemTime::now();
    let duration = now.duration_since(std::time::UNIX_EPOCH).unwrap_or_default();
    format!("{}s", duration.as_secs())
}

/// Gathers statistics from the parts of a simulation.
#[derive(Debug, Default)]
pub struct StatsCollector {
    stats: SimulationStats,
    timer: Option<Timer>,
}

impl StatsCollector {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            stats: SimulationStats::new().with_name(name),
            timer: None,
        }
    }

    pub fn set_seed(&mut self, seed: u64) {
        self.stats.metadata.seed = Some(seed);
    }

    /// Starts timing.
    pub fn start(&mut self) {
        self.timer = Some(Timer::start());
        self.stats.metadata.start_time = Some(unix_now());
    }

    /// Stops timing and computes rates.
    pub fn stop(&mut self) {
        self.stats.metadata.end_time = Some(unix_now());
        if let Some(ref timer) = self.timer {
            self.stats.compute_timing(timer.elapsed_ms());
        }
    }

    pub fn record_engine(&mut self, engine: &SerialEngine) {
        self.update_engine_from_json(&engine.export_stats());
    }

    /// Reads an engine export (as produced by [`SerialEngine::export_stats`]).
    pub fn update_engine_from_json(&mut self, json: &serde_json::Value) {
        let e = &mut self.stats.engine;
        e.final_time = json["current_time"].as_u64().unwrap_or(0);
        e.events_processed = json["events_processed"].as_u64().unwrap_or(0);
        e.primary_events = json["primary_events"].as_u64().unwrap_or(0);
        e.secondary_events = json["secondary_events"].as_u64().unwrap_or(0);
        e.peak_queue_len = json["peak_queue_len"].as_u64().unwrap_or(0) as usize;
    }

    pub fn record_component<T>(&mut self, comp: &TickingComponent<T>) {
        let stats = comp.stats();
        self.stats.components.insert(
            comp.name().to_string(),
            ComponentSummary {
                ticks_executed: stats.ticks_executed,
                progress_ticks: stats.progress_ticks,
                idle_ticks: stats.idle_ticks,
            },
        );
    }

    pub fn record_connection<M: Msg>(&mut self, conn: &DirectConnection<M>) {
        let stats = conn.stats();
        self.stats.connections.insert(
            conn.name().to_string(),
            ConnectionSummary {
                msgs_accepted: stats.msgs_accepted,
                sends_refused: stats.sends_refused,
                msgs_delivered: stats.msgs_delivered,
                deliveries_refused: stats.deliveries_refused,
                ticks: stats.ticks,
            },
        );
    }

    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    pub fn into_stats(self) -> SimulationStats {
        self.stats
    }
}
