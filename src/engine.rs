//! Engine orchestrator: wires configuration, factories, sink, executor
//! and reports into one run.
//!
//! Ownership is a DAG rooted here: the engine owns the factories and the
//! sink; workers see both behind `Arc` and keep everything else
//! (players, machines, PRNGs, pools) thread-local.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use log::{error, info};

use crate::config;
use crate::distributor::TaskDistributor;
use crate::error::SimResult;
use crate::factory::Factories;
use crate::reports;
use crate::sink::{run_directory, ResultSink};

/// Final run accounting.
#[derive(Clone, Debug)]
pub struct RunStats {
    pub machines: usize,
    pub player_types: usize,
    pub total_tasks: u64,
    pub completed: u64,
    pub failed: u64,
    pub elapsed_secs: f64,
    pub output_dir: PathBuf,
    pub success: bool,
}

/// Run a full simulation from a config file. `thread_override` replaces
/// the configured worker count when non-zero.
pub fn run(config_path: &std::path::Path, thread_override: usize) -> SimResult<RunStats> {
    let start = Instant::now();

    let sim_config = config::load(config_path)?;
    let thread_count = if thread_override > 0 {
        thread_override
    } else {
        sim_config.thread_count
    };

    // Fatal before any task is generated: unknown ids, bad machine
    // geometry, oracle construction.
    let factories = Arc::new(Factories::new(&sim_config.machines, &sim_config.players)?);
    for machine in &sim_config.machines {
        factories.build_machine(&machine.machine_id, 0)?;
    }
    for player in &sim_config.players {
        factories.build_player(&player.model_version, &player.cluster_id, 0)?;
    }

    let output_dir = run_directory(&sim_config.output_base_dir);
    let sink = Arc::new(ResultSink::create(
        &output_dir,
        sim_config.record_raw_spins,
        sim_config.batch_write_size,
        sim_config.max_spin_buffer,
    )?);
    info!("output directory: {}", output_dir.display());

    let mut distributor = TaskDistributor::new(Arc::clone(&factories), thread_count, sim_config.seed);
    info!("executor started with {} workers", distributor.thread_count());

    let tasks = TaskDistributor::generate_tasks(
        &sim_config.machines,
        &sim_config.players,
        sim_config.sessions_per_pair,
    );
    let total_tasks = tasks.len() as u64;

    distributor.execute(
        tasks,
        Arc::clone(&sink),
        sim_config.session_limits(),
        sim_config.record_raw_spins,
        sim_config.apply_think_time,
    );
    distributor.wait_for_completion();
    distributor.shutdown();

    sink.flush()?;

    let completed = distributor.completed();
    let failed = distributor.failed();
    info!(
        "execution finished: {} completed, {} failed, {} rows written",
        completed,
        failed,
        sink.rows_written()
    );

    if sim_config.generate_reports {
        let sessions = sink.take_sessions();
        reports::write_reports(&output_dir, &sessions)?;
    }

    let success = failed == 0 && !sink.has_failed();
    if !success {
        error!("run finished with {} failed sessions", failed);
    }

    Ok(RunStats {
        machines: sim_config.machines.len(),
        player_types: sim_config.players.len(),
        total_tasks,
        completed,
        failed,
        elapsed_secs: start.elapsed().as_secs_f64(),
        output_dir,
        success,
    })
}
