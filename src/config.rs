//! Run-file loading and validation.
//!
//! One JSON document carries the simulation parameters plus the machine
//! and player records. The loader enforces exactly the invariants the
//! engine relies on: non-empty reels and paylines, payout vectors of
//! length ≥ 3, monotonic balance bounds, known model versions, and a
//! `normal` reel set per machine. Everything else is taken at face
//! value.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use log::info;

use crate::error::{SimError, SimResult};
use crate::players::{MODEL_RANDOM, MODEL_V1};
use crate::types::{MachineConfig, PlayerConfig, SimulationConfig};

/// Load and validate a run file.
pub fn load(path: &Path) -> SimResult<SimulationConfig> {
    let file = File::open(path).map_err(|e| {
        SimError::Config(format!("cannot open config {}: {}", path.display(), e))
    })?;
    let config: SimulationConfig = serde_json::from_reader(BufReader::new(file))?;
    validate(&config)?;
    info!(
        "loaded config: {} machines, {} players, {} sessions per pair",
        config.machines.len(),
        config.players.len(),
        config.sessions_per_pair
    );
    Ok(config)
}

pub fn validate(config: &SimulationConfig) -> SimResult<()> {
    if config.machines.is_empty() {
        return Err(SimError::Config("no machines configured".into()));
    }
    if config.players.is_empty() {
        return Err(SimError::Config("no players configured".into()));
    }
    if config.sessions_per_pair == 0 {
        return Err(SimError::Config("sessions_per_pair must be positive".into()));
    }
    for machine in &config.machines {
        validate_machine(machine)?;
    }
    for player in &config.players {
        validate_player(player)?;
    }
    Ok(())
}

fn validate_machine(machine: &MachineConfig) -> SimResult<()> {
    let id = &machine.machine_id;
    if machine.window_size == 0 {
        return Err(SimError::Config(format!("{}: window_size must be >= 1", id)));
    }
    let normal = machine
        .reels
        .get("normal")
        .ok_or_else(|| SimError::Config(format!("{}: missing 'normal' reel set", id)))?;
    if normal.is_empty() {
        return Err(SimError::Config(format!("{}: empty reel set", id)));
    }
    for (set_name, strips) in &machine.reels {
        for (reel_key, strip) in strips {
            if strip.is_empty() {
                return Err(SimError::Config(format!(
                    "{}: reel {}/{} is empty",
                    id, set_name, reel_key
                )));
            }
        }
    }
    if machine.paylines.is_empty() {
        return Err(SimError::Config(format!("{}: no paylines", id)));
    }
    let grid_len = normal.len() * machine.window_size;
    for (i, payline) in machine.paylines.iter().enumerate() {
        if payline.len() != normal.len() {
            return Err(SimError::Config(format!(
                "{}: payline {} has {} cells for {} reels",
                id,
                i,
                payline.len(),
                normal.len()
            )));
        }
        if payline.iter().any(|&idx| idx >= grid_len) {
            return Err(SimError::Config(format!(
                "{}: payline {} indexes past the {}-cell grid",
                id, i, grid_len
            )));
        }
    }
    for (symbol, payouts) in &machine.pay_table {
        if symbol.parse::<u32>().is_err() {
            return Err(SimError::Config(format!(
                "{}: pay_table key '{}' is not a symbol",
                id, symbol
            )));
        }
        if payouts.len() < 3 {
            return Err(SimError::Config(format!(
                "{}: pay_table row '{}' needs at least 3 entries",
                id, symbol
            )));
        }
    }
    if machine.free_spins_multiplier < 0.0 {
        return Err(SimError::Config(format!(
            "{}: free_spins_multiplier must be non-negative",
            id
        )));
    }
    Ok(())
}

fn validate_player(player: &PlayerConfig) -> SimResult<()> {
    let id = &player.player_id;
    match player.model_version.as_str() {
        MODEL_RANDOM | MODEL_V1 => {}
        other => {
            return Err(SimError::Config(format!(
                "{}: unknown model_version '{}'",
                id, other
            )))
        }
    }
    let dist = &player.initial_balance;
    if dist.min > dist.max {
        return Err(SimError::Config(format!(
            "{}: balance bounds are not monotonic ({} > {})",
            id, dist.min, dist.max
        )));
    }
    if dist.std_dev < 0.0 || !dist.std_dev.is_finite() {
        return Err(SimError::Config(format!(
            "{}: balance std_dev must be finite and non-negative",
            id
        )));
    }
    if player.currency.is_empty() {
        return Err(SimError::Config(format!("{}: empty currency", id)));
    }
    Ok(())
}
