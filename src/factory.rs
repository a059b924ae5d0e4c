//! Registries mapping config ids to buildable instances.
//!
//! The orchestrator owns one [`Factories`] value; workers hold it behind
//! an `Arc` and construct players and machines on pool misses. Unknown
//! ids are startup-time errors: validation walks every (machine,
//! player) pair before any task is generated.

use std::collections::HashMap;

use crate::error::{SimError, SimResult};
use crate::machine::SlotMachine;
use crate::oracle::OracleRegistry;
use crate::players::{Player, MODEL_RANDOM, MODEL_V1};
use crate::types::{MachineConfig, PlayerConfig};

pub struct Factories {
    machines: HashMap<String, MachineConfig>,
    /// Keyed by `(model_version, cluster_id)`.
    players: HashMap<(String, String), PlayerConfig>,
    oracles: OracleRegistry,
}

impl Factories {
    /// Register every config and eagerly load the oracles the v1
    /// profiles need. Oracle construction failure aborts the run here,
    /// before any worker starts.
    pub fn new(machines: &[MachineConfig], players: &[PlayerConfig]) -> SimResult<Self> {
        let mut machine_map = HashMap::new();
        for config in machines {
            if machine_map
                .insert(config.machine_id.clone(), config.clone())
                .is_some()
            {
                return Err(SimError::Config(format!(
                    "duplicate machine id: {}",
                    config.machine_id
                )));
            }
        }

        let mut player_map = HashMap::new();
        let mut oracles = OracleRegistry::new();
        for config in players {
            match config.model_version.as_str() {
                MODEL_RANDOM => {}
                MODEL_V1 => oracles.register(&config.cluster_id)?,
                other => {
                    return Err(SimError::UnknownPlayer(
                        other.to_string(),
                        config.cluster_id.clone(),
                    ))
                }
            }
            let key = (config.model_version.clone(), config.cluster_id.clone());
            if player_map.insert(key, config.clone()).is_some() {
                return Err(SimError::Config(format!(
                    "duplicate player profile: {}/{}",
                    config.model_version, config.cluster_id
                )));
            }
        }

        Ok(Self {
            machines: machine_map,
            players: player_map,
            oracles,
        })
    }

    pub fn machine_ids(&self) -> impl Iterator<Item = &String> {
        self.machines.keys()
    }

    pub fn is_machine_registered(&self, machine_id: &str) -> bool {
        self.machines.contains_key(machine_id)
    }

    pub fn is_player_registered(&self, version: &str, cluster: &str) -> bool {
        self.players
            .contains_key(&(version.to_string(), cluster.to_string()))
    }

    pub fn build_machine(&self, machine_id: &str, seed: u64) -> SimResult<SlotMachine> {
        let config = self
            .machines
            .get(machine_id)
            .ok_or_else(|| SimError::UnknownMachine(machine_id.to_string()))?;
        SlotMachine::new(config, seed)
    }

    pub fn build_player(&self, version: &str, cluster: &str, seed: u64) -> SimResult<Player> {
        let config = self
            .players
            .get(&(version.to_string(), cluster.to_string()))
            .ok_or_else(|| {
                SimError::UnknownPlayer(version.to_string(), cluster.to_string())
            })?;
        Player::from_config(config, &self.oracles, seed)
    }
}
