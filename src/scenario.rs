//! The all-to-all traffic scenario.
//!
//! `N` [`TrafficAgent`]s share one [`DirectConnection`]. Each agent sends
//! `K` messages, each to a randomly picked peer other than itself. Peer
//! choice is driven by a seeded `Xoshiro256StarStar`, so a given seed always
//! yields the same traffic and, the engine being deterministic, the same
//! final time and receive times.

use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Instant;

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use serde::Serialize;
use tracing::info;

use crate::agent::TrafficAgent;
use crate::config::{ConfigResult, SimConfig};
use crate::connection::{Connection, DirectConnection};
use crate::engine::{Engine, SerialEngine};
use crate::freq::Freq;
use crate::msg::SampleMsg;
use crate::port::Port;
use crate::stats::{SimulationStats, StatsCollector};
use crate::types::{MsgId, SimTime};

/// Outcome of one scenario run.
#[derive(Clone, Debug, Serialize)]
pub struct ScenarioReport {
    pub seed: u64,
    pub final_time: SimTime,
    pub sent: u64,
    pub received: u64,
    pub expected: u64,
    pub events_processed: u64,
    /// Receive time of every delivered message, by message id.
    pub recv_times: BTreeMap<MsgId, SimTime>,
    /// Wall-clock duration of the run in milliseconds.
    #[serde(skip)]
    pub wall_ms: f64,
    /// Engine, connection and agent counters, when collection was enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<SimulationStats>,
}

impl ScenarioReport {
    /// Returns true if every sent message was received.
    pub fn is_complete(&self) -> bool {
        self.received == self.expected
    }
}

/// Parameters of an all-to-all run.
#[derive(Clone, Debug)]
pub struct AllToAllScenario {
    pub num_agents: usize,
    pub msgs_per_agent: usize,
    pub port_capacity: usize,
    pub end_capacity: usize,
    pub agent_freq: Freq,
    pub conn_freq: Freq,
    pub seed: u64,
    pub max_time: Option<SimTime>,
    pub collect_stats: bool,
}

impl AllToAllScenario {
    /// A scenario with port capacity 4, End capacity 1 and unit clocks.
    ///
    /// # Panics
    /// Panics if fewer than two agents are requested.
    pub fn new(num_agents: usize, msgs_per_agent: usize) -> Self {
        assert!(num_agents >= 2, "all-to-all traffic needs at least two agents");
        Self {
            num_agents,
            msgs_per_agent,
            port_capacity: 4,
            end_capacity: 1,
            agent_freq: Freq::default(),
            conn_freq: Freq::default(),
            seed: 42,
            max_time: None,
            collect_stats: false,
        }
    }

    /// Builds a scenario from the `traffic`, `connection` and `simulation`
    /// sections of a configuration.
    pub fn from_config(config: &SimConfig) -> ConfigResult<Self> {
        config.validate()?;
        let traffic = &config.traffic;
        Ok(Self {
            num_agents: traffic.num_agents,
            msgs_per_agent: traffic.msgs_per_agent,
            port_capacity: traffic.port_capacity,
            end_capacity: config.connection.end_capacity,
            agent_freq: Freq::new(traffic.freq_period),
            conn_freq: config.connection.freq(),
            seed: config.simulation.seed,
            max_time: config.simulation.max_time,
            collect_stats: config.simulation.collect_stats,
        })
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_port_capacity(mut self, capacity: usize) -> Self {
        self.port_capacity = capacity;
        self
    }

    pub fn with_end_capacity(mut self, capacity: usize) -> Self {
        self.end_capacity = capacity;
        self
    }

    /// Attaches a [`SimulationStats`] snapshot to every report.
    pub fn with_stats(mut self, enable: bool) -> Self {
        self.collect_stats = enable;
        self
    }

    /// Builds the system, runs it to completion and reports.
    pub fn run(&self) -> ScenarioReport {
        let started = Instant::now();
        let engine = Rc::new(SerialEngine::new());
        let conn = DirectConnection::<SampleMsg>::builder(engine.clone())
            .with_freq(self.conn_freq)
            .build("Conn");

        let agents: Vec<_> = (0..self.num_agents)
            .map(|i| {
                let agent = TrafficAgent::build(
                    format!("Agent[{i}]"),
                    engine.clone(),
                    self.agent_freq,
                    self.port_capacity,
                );
                let port = agent.borrow().inner().port().clone();
                conn.borrow_mut().plug_in(port, self.end_capacity);
                agent
            })
            .collect();

        let ports: Vec<_> = agents
            .iter()
            .map(|a| {
                let a = a.borrow();
                (a.inner().port().id(), a.name().to_string())
            })
            .collect();

        let mut rng = Xoshiro256StarStar::seed_from_u64(self.seed);
        for (src, agent) in agents.iter().enumerate() {
            let mut agent = agent.borrow_mut();
            for i in 0..self.msgs_per_agent {
                let mut dst = rng.gen_range(0..ports.len());
                while dst == src {
                    dst = rng.gen_range(0..ports.len());
                }
                let id = format!("{}({})->{}", ports[src].1, i, ports[dst].1);
                agent
                    .inner_mut()
                    .enqueue(SampleMsg::routed(id, ports[src].0, ports[dst].0, 0));
            }
            agent.tick_later(0);
        }

        info!(
            agents = self.num_agents,
            msgs_per_agent = self.msgs_per_agent,
            seed = self.seed,
            "all-to-all run started"
        );
        let mut collector = self.collect_stats.then(|| {
            let mut collector = StatsCollector::new("all_to_all");
            collector.set_seed(self.seed);
            collector.start();
            collector
        });
        match self.max_time {
            Some(deadline) => {
                engine.run_until(deadline);
            }
            None => engine.run(),
        }

        let mut report = ScenarioReport {
            seed: self.seed,
            final_time: engine.current_time(),
            sent: 0,
            received: 0,
            expected: (self.num_agents * self.msgs_per_agent) as u64,
            events_processed: engine.stats().events_processed,
            recv_times: BTreeMap::new(),
            wall_ms: 0.0,
            stats: None,
        };
        for agent in &agents {
            let agent = agent.borrow();
            let agent = agent.inner();
            report.sent += agent.stats().sent;
            for msg in agent.received() {
                report.received += 1;
                if let Some(t) = msg.meta.recv_time {
                    report.recv_times.insert(msg.meta.id.clone(), t);
                }
            }
        }
        report.wall_ms = started.elapsed().as_secs_f64() * 1000.0;

        if let Some(collector) = collector.as_mut() {
            collector.record_engine(&engine);
            collector.record_connection(&*conn.borrow());
            for agent in &agents {
                collector.record_component(&*agent.borrow());
            }
            collector.stop();
        }
        report.stats = collector.map(StatsCollector::into_stats);

        info!(
            final_time = report.final_time,
            received = report.received,
            expected = report.expected,
            "all-to-all run finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_run_delivers_everything() {
        let report = AllToAllScenario::new(3, 20).with_seed(7).run();

        assert!(report.is_complete());
        assert_eq!(report.sent, 60);
        assert_eq!(report.recv_times.len(), 60);
        assert!(report.final_time > 0);
    }

    #[test]
    fn test_deadline_stops_early() {
        let mut scenario = AllToAllScenario::new(4, 50);
        scenario.max_time = Some(5);
        let report = scenario.run();

        assert!(report.final_time <= 5);
        assert!(report.received < report.expected);
    }

    #[test]
    fn test_stats_attached_only_when_enabled() {
        let plain = AllToAllScenario::new(3, 10).with_seed(3).run();
        assert!(plain.stats.is_none());

        let report = AllToAllScenario::new(3, 10).with_seed(3).with_stats(true).run();
        let stats = report.stats.as_ref().unwrap();
        assert_eq!(stats.metadata.seed, Some(3));
        assert_eq!(stats.engine.final_time, report.final_time);
        assert_eq!(stats.engine.events_processed, report.events_processed);
        assert_eq!(stats.total_delivered(), 30);
        assert_eq!(stats.components.len(), 3);
        assert!(stats.components.contains_key("Agent[0]"));
    }

    #[test]
    #[should_panic(expected = "at least two agents")]
    fn test_single_agent_rejected() {
        AllToAllScenario::new(1, 1);
    }
}
