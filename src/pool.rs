//! Per-worker instance pool.
//!
//! Sessions of the same `(player-version, player-cluster, machine-id)`
//! fingerprint reuse Player and Machine instances instead of paying
//! construction cost per session. Each worker owns its pool outright:
//! no locks, no cross-worker sharing. Instances are reset when returned
//! (balance resampled, machine state cleared); their PRNG streams
//! persist across sessions by design.

use rand::rngs::SmallRng;
use rand::Rng;
use std::collections::HashMap;

use crate::error::SimResult;
use crate::factory::Factories;
use crate::machine::SlotMachine;
use crate::players::Player;
use crate::types::Fingerprint;

/// Most instances kept per fingerprint; extras returned beyond this are
/// dropped.
pub const MAX_POOLED: usize = 3;

#[derive(Default)]
pub struct InstancePool {
    players: HashMap<Fingerprint, Vec<Player>>,
    machines: HashMap<Fingerprint, Vec<SlotMachine>>,
}

impl InstancePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pop a pooled pair or construct a fresh one. New instances are
    /// seeded from the worker's PRNG so machine streams stay per-worker.
    pub fn borrow(
        &mut self,
        fingerprint: &Fingerprint,
        factories: &Factories,
        rng: &mut SmallRng,
    ) -> SimResult<(Player, SlotMachine)> {
        let player = match self
            .players
            .get_mut(fingerprint)
            .and_then(|stack| stack.pop())
        {
            Some(player) => player,
            None => factories.build_player(
                &fingerprint.player_version,
                &fingerprint.player_cluster,
                rng.random(),
            )?,
        };
        let machine = match self
            .machines
            .get_mut(fingerprint)
            .and_then(|stack| stack.pop())
        {
            Some(machine) => machine,
            None => factories.build_machine(&fingerprint.machine_id, rng.random())?,
        };
        Ok((player, machine))
    }

    /// Reset and return a pair. Pushes back when there is room; a full
    /// stack simply drops the instance.
    pub fn give_back(
        &mut self,
        fingerprint: &Fingerprint,
        mut player: Player,
        mut machine: SlotMachine,
    ) {
        player.reset();
        machine.reset_state();

        let players = self.players.entry(fingerprint.clone()).or_default();
        if players.len() < MAX_POOLED {
            players.push(player);
        }
        let machines = self.machines.entry(fingerprint.clone()).or_default();
        if machines.len() < MAX_POOLED {
            machines.push(machine);
        }
    }

    pub fn pooled_players(&self, fingerprint: &Fingerprint) -> usize {
        self.players.get(fingerprint).map_or(0, Vec::len)
    }

    pub fn pooled_machines(&self, fingerprint: &Fingerprint) -> usize {
        self.machines.get(fingerprint).map_or(0, Vec::len)
    }

    pub fn clear(&mut self) {
        self.players.clear();
        self.machines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BalanceDistribution, MachineConfig, PlayerConfig, Symbol};
    use rand::SeedableRng;
    use std::collections::BTreeMap;

    fn factories() -> Factories {
        let strips: BTreeMap<String, Vec<Symbol>> = (0..5)
            .map(|i| (format!("reel_{}", i), vec![1, 2, 3]))
            .collect();
        let mut sets = BTreeMap::new();
        sets.insert("normal".to_string(), strips);
        let mut pay = BTreeMap::new();
        pay.insert("1".to_string(), vec![1.0, 2.0, 5.0]);
        let mut bets = BTreeMap::new();
        bets.insert("USD".to_string(), vec![1.0]);
        let machine = MachineConfig {
            machine_id: "m1".to_string(),
            window_size: 3,
            active_lines: 1,
            free_spins_count: 8,
            free_spins_multiplier: 2.0,
            wild_symbols: vec![],
            scatter_symbol: 200,
            reels: sets,
            paylines: vec![vec![0, 1, 2, 3, 4]],
            pay_table: pay,
            bet_table: bets,
        };
        let player = PlayerConfig {
            player_id: "p1".to_string(),
            model_version: "random".to_string(),
            cluster_id: "cluster_0".to_string(),
            currency: "USD".to_string(),
            initial_balance: BalanceDistribution {
                mean: 100.0,
                std_dev: 10.0,
                min: 1.0,
                max: 500.0,
            },
            random: None,
            v1: None,
        };
        Factories::new(&[machine], &[player]).unwrap()
    }

    fn fingerprint() -> Fingerprint {
        Fingerprint {
            player_version: "random".to_string(),
            player_cluster: "cluster_0".to_string(),
            machine_id: "m1".to_string(),
        }
    }

    #[test]
    fn test_borrow_constructs_on_miss() {
        let factories = factories();
        let mut pool = InstancePool::new();
        let mut rng = SmallRng::seed_from_u64(1);
        let fp = fingerprint();
        assert_eq!(pool.pooled_players(&fp), 0);
        let (player, machine) = pool.borrow(&fp, &factories, &mut rng).unwrap();
        assert_eq!(player.id(), "p1");
        assert_eq!(machine.id(), "m1");
    }

    #[test]
    fn test_give_back_then_borrow_reuses() {
        let factories = factories();
        let mut pool = InstancePool::new();
        let mut rng = SmallRng::seed_from_u64(1);
        let fp = fingerprint();

        let (player, machine) = pool.borrow(&fp, &factories, &mut rng).unwrap();
        pool.give_back(&fp, player, machine);
        assert_eq!(pool.pooled_players(&fp), 1);
        assert_eq!(pool.pooled_machines(&fp), 1);

        let _ = pool.borrow(&fp, &factories, &mut rng).unwrap();
        assert_eq!(pool.pooled_players(&fp), 0);
        assert_eq!(pool.pooled_machines(&fp), 0);
    }

    #[test]
    fn test_pool_is_bounded() {
        let factories = factories();
        let mut pool = InstancePool::new();
        let mut rng = SmallRng::seed_from_u64(1);
        let fp = fingerprint();

        let pairs: Vec<_> = (0..MAX_POOLED + 2)
            .map(|_| pool.borrow(&fp, &factories, &mut rng).unwrap())
            .collect();
        for (player, machine) in pairs {
            pool.give_back(&fp, player, machine);
        }
        assert_eq!(pool.pooled_players(&fp), MAX_POOLED);
        assert_eq!(pool.pooled_machines(&fp), MAX_POOLED);
    }

    #[test]
    fn test_give_back_resets_balance() {
        let factories = factories();
        let mut pool = InstancePool::new();
        let mut rng = SmallRng::seed_from_u64(1);
        let fp = fingerprint();

        let (mut player, machine) = pool.borrow(&fp, &factories, &mut rng).unwrap();
        player.debit(player.balance()); // drain to zero
        assert_eq!(player.balance(), 0.0);
        pool.give_back(&fp, player, machine);

        let (player, _machine) = pool.borrow(&fp, &factories, &mut rng).unwrap();
        assert!(player.balance() >= 1.0 && player.balance() <= 500.0);
    }

    #[test]
    fn test_clear_empties_pool() {
        let factories = factories();
        let mut pool = InstancePool::new();
        let mut rng = SmallRng::seed_from_u64(1);
        let fp = fingerprint();
        let (player, machine) = pool.borrow(&fp, &factories, &mut rng).unwrap();
        pool.give_back(&fp, player, machine);
        pool.clear();
        assert_eq!(pool.pooled_players(&fp), 0);
    }
}
