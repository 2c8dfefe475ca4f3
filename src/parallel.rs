//! Running independent simulations side by side.
//!
//! A simulation is single-threaded: its engine, components and connections
//! share `Rc` handles and never cross threads. What can run in parallel is
//! a set of *replicas*, each one built and run entirely inside one worker
//! and returning a `Send` result.
//!
//! # Feature Flag
//!
//! Parallel execution requires the `parallel` feature:
//! ```toml
//! [dependencies]
//! lockstep = { version = "0.1", features = ["parallel"] }
//! ```
//! Without it replicas run one after another on the calling thread.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use tracing::info;

/// Runs `f(seed)` for every seed and returns the results in seed order.
///
/// # Example
///
/// ```
/// use lockstep::parallel::run_replicas;
/// use lockstep::scenario::AllToAllScenario;
///
/// let times = run_replicas(&[1, 2], |seed| {
///     AllToAllScenario::new(3, 10).with_seed(seed).run().final_time
/// });
/// assert_eq!(times.len(), 2);
/// ```
pub fn run_replicas<R, F>(seeds: &[u64], f: F) -> Vec<R>
where
    R: Send,
    F: Fn(u64) -> R + Sync + Send,
{
    ReplicaRunner::new().run(seeds, f)
}

/// Replica runner with an optional worker count.
#[derive(Clone, Debug, Default)]
pub struct ReplicaRunner {
    num_threads: usize,
}

impl ReplicaRunner {
    /// Creates a runner using the default worker count.
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits the number of workers (0 = rayon default). Ignored without the
    /// `parallel` feature.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = threads;
        self
    }

    /// Runs `f(seed)` for every seed; results come back in seed order.
    #[cfg(feature = "parallel")]
    pub fn run<R, F>(&self, seeds: &[u64], f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(u64) -> R + Sync + Send,
    {
        info!(replicas = seeds.len(), threads = self.num_threads, "running replicas in parallel");
        let run_all = || seeds.par_iter().map(|&seed| f(seed)).collect();

        if self.num_threads == 0 {
            return run_all();
        }
        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads)
            .build()
        {
            Ok(pool) => pool.install(run_all),
            // Fall back to the global pool.
            Err(_) => run_all(),
        }
    }

    /// Runs `f(seed)` for every seed; results come back in seed order.
    #[cfg(not(feature = "parallel"))]
    pub fn run<R, F>(&self, seeds: &[u64], f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(u64) -> R + Sync + Send,
    {
        info!(replicas = seeds.len(), "running replicas sequentially");
        seeds.iter().map(|&seed| f(seed)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_results_follow_seed_order() {
        let seeds = [5, 1, 9, 3];
        let out = run_replicas(&seeds, |seed| seed * 10);
        assert_eq!(out, vec![50, 10, 90, 30]);
    }

    #[test]
    fn test_thread_limit() {
        let out = ReplicaRunner::new()
            .with_threads(2)
            .run(&[1, 2, 3], |seed| seed + 1);
        assert_eq!(out, vec![2, 3, 4]);
    }

    #[test]
    fn test_empty_seed_list() {
        let out: Vec<u64> = run_replicas(&[], |seed| seed);
        assert!(out.is_empty());
    }
}
