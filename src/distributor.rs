//! Task distribution: enumerate (machine × player × session) tasks and
//! run them on the work-stealing executor.
//!
//! Each worker carries a [`WorkerContext`] (its private PRNG stream and
//! instance pool) built once when the worker starts. A task borrows the
//! fingerprinted (player, machine) pair from the pool, runs one session,
//! returns the pair, and publishes the record. A task that panics or
//! fails is counted and its instance pair is discarded, never returned
//! to the pool. `completed + failed` always equals the task total.

use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{error, info};

use crate::executor::{Job, WorkerPool};
use crate::factory::Factories;
use crate::pool::InstancePool;
use crate::rng::{deterministic_worker_seed, worker_seed};
use crate::session::SessionController;
use crate::sink::ResultSink;
use crate::types::{MachineConfig, PlayerConfig, SessionLimits, SessionTask};

/// Private per-worker state threaded through every task.
pub struct WorkerContext {
    pub rng: SmallRng,
    pub pool: InstancePool,
}

pub struct TaskDistributor {
    executor: WorkerPool<WorkerContext>,
    factories: Arc<Factories>,
    completed: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
}

impl TaskDistributor {
    /// Build the worker pool. With a single worker the PRNG seed omits
    /// the thread salt, so one-threaded runs with a fixed seed reproduce
    /// byte-identical results.
    pub fn new(factories: Arc<Factories>, thread_count: usize, base_seed: u64) -> Self {
        let executor = WorkerPool::new(thread_count, move |worker_id| {
            let seed = if thread_count == 1 {
                deterministic_worker_seed(base_seed, worker_id)
            } else {
                worker_seed(base_seed, worker_id)
            };
            WorkerContext {
                rng: SmallRng::seed_from_u64(seed),
                pool: InstancePool::new(),
            }
        });
        Self {
            executor,
            factories,
            completed: Arc::new(AtomicU64::new(0)),
            failed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Cartesian enumeration: every machine × every player ×
    /// `sessions_per_pair` session indices.
    pub fn generate_tasks(
        machines: &[MachineConfig],
        players: &[PlayerConfig],
        sessions_per_pair: u32,
    ) -> Vec<SessionTask> {
        let mut tasks = Vec::with_capacity(
            machines.len() * players.len() * sessions_per_pair as usize,
        );
        let mut task_id = 0u64;
        for machine in machines {
            for player in players {
                for session_seq in 0..sessions_per_pair {
                    tasks.push(SessionTask {
                        task_id,
                        session_seq,
                        player_version: player.model_version.clone(),
                        player_cluster: player.cluster_id.clone(),
                        machine_id: machine.machine_id.clone(),
                    });
                    task_id += 1;
                }
            }
        }
        info!(
            "generated {} session tasks ({} machines x {} players x {} sessions)",
            tasks.len(),
            machines.len(),
            players.len(),
            sessions_per_pair
        );
        tasks
    }

    /// Submit every task to the executor. Returns immediately; pair with
    /// [`TaskDistributor::wait_for_completion`].
    pub fn execute(
        &self,
        tasks: Vec<SessionTask>,
        sink: Arc<ResultSink>,
        limits: SessionLimits,
        record_spins: bool,
        apply_think_time: bool,
    ) {
        let jobs: Vec<Job<WorkerContext>> = tasks
            .into_iter()
            .map(|task| {
                let factories = Arc::clone(&self.factories);
                let sink = Arc::clone(&sink);
                let completed = Arc::clone(&self.completed);
                let failed = Arc::clone(&self.failed);
                Box::new(move |ctx: &mut WorkerContext| {
                    run_session_task(
                        &task,
                        ctx,
                        &factories,
                        &sink,
                        &limits,
                        record_spins,
                        apply_think_time,
                        &completed,
                        &failed,
                    );
                }) as Job<WorkerContext>
            })
            .collect();
        self.executor.submit_batch(jobs);
    }

    pub fn wait_for_completion(&self) {
        self.executor.wait_for_completion();
    }

    pub fn shutdown(&mut self) {
        self.executor.shutdown();
    }

    pub fn thread_count(&self) -> usize {
        self.executor.thread_count()
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

#[allow(clippy::too_many_arguments)]
fn run_session_task(
    task: &SessionTask,
    ctx: &mut WorkerContext,
    factories: &Factories,
    sink: &ResultSink,
    limits: &SessionLimits,
    record_spins: bool,
    apply_think_time: bool,
    completed: &AtomicU64,
    failed: &AtomicU64,
) {
    let fingerprint = task.fingerprint();
    let (mut player, mut machine) = match ctx.pool.borrow(&fingerprint, factories, &mut ctx.rng) {
        Ok(pair) => pair,
        Err(err) => {
            error!("task {}: failed to build instances: {}", task.task_id, err);
            failed.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };

    let session_id = task.session_id();
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        SessionController::new(&mut player, &mut machine, record_spins, apply_think_time)
            .run(&session_id, limits)
    }));

    match outcome {
        Ok(outcome) => {
            // The pair survived the session; hand it back for reuse.
            ctx.pool.give_back(&fingerprint, player, machine);

            let published = sink.publish(outcome.stats).and_then(|_| {
                if record_spins {
                    sink.publish_spins(&session_id, &outcome.spins)
                } else {
                    Ok(())
                }
            });
            match published {
                Ok(()) => {
                    completed.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    error!("session {}: sink rejected record: {}", session_id, err);
                    failed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        Err(_) => {
            // Abandon the session and discard the pair: its state is
            // suspect after a panic.
            error!("session {}: panicked, record dropped", session_id);
            failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}
