//! Slot machine: composes reel sets and the paytable, resolves one spin
//! including the free-spin sub-mode.
//!
//! Free spins are granted when the scatter symbol lands on at least 3
//! distinct reel columns anywhere in the window. Free-spin mode uses the
//! `bonus` reel set when configured (falling back to `normal`),
//! multiplies line wins by `free_spins_multiplier`, decrements the
//! remaining count, and never re-triggers.

use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::collections::BTreeMap;

use crate::error::{SimError, SimResult};
use crate::paytable::{grid_win, Paytable};
use crate::reels::ReelSet;
use crate::types::{MachineConfig, PaylineIndices, SpinGrid, SpinOutcome, Symbol};

const NORMAL_SET: &str = "normal";
const BONUS_SET: &str = "bonus";

pub struct SlotMachine {
    id: String,
    reel_sets: BTreeMap<String, ReelSet>,
    paytable: Paytable,
    paylines: Vec<PaylineIndices>,
    bet_table: BTreeMap<String, Vec<f64>>,
    wilds: Vec<Symbol>,
    scatter: Symbol,
    window_size: usize,
    active_lines: usize,
    free_spins_count: u32,
    free_spins_multiplier: f64,
    rng: SmallRng,
}

impl SlotMachine {
    pub fn new(config: &MachineConfig, seed: u64) -> SimResult<Self> {
        let mut reel_sets = BTreeMap::new();
        for (name, strips) in &config.reels {
            reel_sets.insert(name.clone(), ReelSet::new(strips, config.window_size)?);
        }
        if !reel_sets.contains_key(NORMAL_SET) {
            return Err(SimError::Config(format!(
                "machine {} has no '{}' reel set",
                config.machine_id, NORMAL_SET
            )));
        }
        if config.paylines.is_empty() {
            return Err(SimError::Config(format!(
                "machine {} has no paylines",
                config.machine_id
            )));
        }

        let num_reels = reel_sets[NORMAL_SET].num_reels();
        let grid_len = num_reels * config.window_size;
        for (i, line) in config.paylines.iter().enumerate() {
            if line.len() != num_reels {
                return Err(SimError::Config(format!(
                    "machine {} payline {} has {} cells for {} reels",
                    config.machine_id,
                    i,
                    line.len(),
                    num_reels
                )));
            }
            if line.iter().any(|&idx| idx >= grid_len) {
                return Err(SimError::Config(format!(
                    "machine {} payline {} indexes past the grid",
                    config.machine_id, i
                )));
            }
        }

        Ok(Self {
            id: config.machine_id.clone(),
            reel_sets,
            paytable: Paytable::new(&config.pay_table)?,
            paylines: config.paylines.clone(),
            bet_table: config.bet_table.clone(),
            wilds: config.wild_symbols.clone(),
            scatter: config.scatter_symbol,
            window_size: config.window_size,
            active_lines: config.active_lines.min(config.paylines.len()),
            free_spins_count: config.free_spins_count,
            free_spins_multiplier: config.free_spins_multiplier,
            rng: SmallRng::seed_from_u64(seed),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn active_lines(&self) -> usize {
        self.active_lines
    }

    /// Admissible bets for a currency; empty when the currency is unknown.
    pub fn bet_options(&self, currency: &str) -> &[f64] {
        self.bet_table
            .get(currency)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// A bet is valid iff it is listed for the currency. The balance
    /// check belongs to the session controller.
    pub fn is_valid_bet(&self, bet: f64, currency: &str) -> bool {
        self.bet_options(currency).iter().any(|&b| b == bet)
    }

    /// Resolve one spin. `remaining` is the free-spin count *before*
    /// this spin when `in_free_spins` is set.
    pub fn spin(&mut self, bet: f64, in_free_spins: bool, remaining: u32) -> SpinOutcome {
        let set = if in_free_spins && self.reel_sets.contains_key(BONUS_SET) {
            &self.reel_sets[BONUS_SET]
        } else {
            &self.reel_sets[NORMAL_SET]
        };
        let grid = set.spin_grid(&mut self.rng);

        let mut win = grid_win(
            &grid,
            &self.paylines,
            self.active_lines,
            &self.wilds,
            &self.paytable,
            bet,
        );

        let (trigger, free_spins_remaining) = if in_free_spins {
            win *= self.free_spins_multiplier;
            // No re-trigger inside free-spin mode.
            (false, remaining.saturating_sub(1))
        } else if self.scatter_triggered(&grid) {
            (true, self.free_spins_count)
        } else {
            (false, 0)
        };

        // spin_number and timestamp are stamped by the session
        // controller, which owns the sequence and the logical clock.
        SpinOutcome {
            spin_number: 0,
            bet,
            win,
            profit: win - bet,
            trigger_free_spins: trigger,
            free_spins_remaining,
            in_free_spins,
            timestamp: 0.0,
            grid,
        }
    }

    /// Machines carry no cross-spin state beyond the PRNG, which
    /// deliberately persists across sessions on the same worker.
    pub fn reset_state(&mut self) {}

    /// Scatter on at least 3 distinct reel columns anywhere in the window.
    fn scatter_triggered(&self, grid: &SpinGrid) -> bool {
        let num_reels = grid.len() / self.window_size;
        let mut columns = 0;
        for col in 0..num_reels {
            let hit = (0..self.window_size).any(|row| grid[row * num_reels + col] == self.scatter);
            if hit {
                columns += 1;
                if columns >= 3 {
                    return true;
                }
            }
        }
        false
    }
}
