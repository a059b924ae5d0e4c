//! Property-based tests for the spin-resolution core.

use proptest::prelude::*;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::collections::BTreeMap;

use slotsim::machine::SlotMachine;
use slotsim::paytable::{left_run, Paytable};
use slotsim::reels::ReelSet;
use slotsim::types::{BalanceDistribution, MachineConfig, Symbol};

const WILD: Symbol = 101;
const SCATTER: Symbol = 200;

/// Strategy: a reel strip of 1-16 symbols drawn from a small alphabet
/// that includes the wild and the scatter.
fn strip_strategy() -> impl Strategy<Value = Vec<Symbol>> {
    prop::collection::vec(
        prop_oneof![4 => 0u32..6, 1 => Just(WILD), 1 => Just(SCATTER)],
        1..16,
    )
}

/// Strategy: 3-5 strips plus a window height of 1-4.
fn reel_set_strategy() -> impl Strategy<Value = (Vec<Vec<Symbol>>, usize)> {
    (prop::collection::vec(strip_strategy(), 3..6), 1usize..5)
}

/// Strategy: a payline symbol sequence of length 3-6.
fn line_strategy() -> impl Strategy<Value = Vec<Symbol>> {
    prop::collection::vec(
        prop_oneof![3 => 0u32..6, 1 => Just(WILD)],
        3..7,
    )
}

fn machine_from(strips: &[Vec<Symbol>], window: usize, seed: u64) -> SlotMachine {
    let named: BTreeMap<String, Vec<Symbol>> = strips
        .iter()
        .enumerate()
        .map(|(i, s)| (format!("reel_{:02}", i), s.clone()))
        .collect();
    let mut sets = BTreeMap::new();
    sets.insert("normal".to_string(), named);

    let mut pay_table = BTreeMap::new();
    for symbol in 0u32..6 {
        pay_table.insert(symbol.to_string(), vec![1.0, 2.0, 5.0]);
    }
    pay_table.insert(WILD.to_string(), vec![2.0, 4.0, 10.0]);

    let num_reels = strips.len();
    // First row straight across.
    let payline: Vec<usize> = (0..num_reels).collect();
    let mut bet_table = BTreeMap::new();
    bet_table.insert("USD".to_string(), vec![1.0, 2.0]);

    let config = MachineConfig {
        machine_id: "prop_m".to_string(),
        window_size: window,
        active_lines: 1,
        free_spins_count: 8,
        free_spins_multiplier: 2.0,
        wild_symbols: vec![WILD],
        scatter_symbol: SCATTER,
        reels: sets,
        paylines: vec![payline],
        pay_table,
        bet_table,
    };
    SlotMachine::new(&config, seed).unwrap()
}

proptest! {
    // Grid length is always num_reels * window_size.
    #[test]
    fn grid_length_invariant((strips, window) in reel_set_strategy(), seed in any::<u64>()) {
        let named: BTreeMap<String, Vec<Symbol>> = strips
            .iter()
            .enumerate()
            .map(|(i, s)| (format!("reel_{:02}", i), s.clone()))
            .collect();
        let set = ReelSet::new(&named, window).unwrap();
        let mut rng = SmallRng::seed_from_u64(seed);
        let grid = set.spin_grid(&mut rng);
        prop_assert_eq!(grid.len(), strips.len() * window);
        // Every symbol in the grid exists on some strip.
        for &symbol in &grid {
            prop_assert!(strips.iter().any(|s| s.contains(&symbol)));
        }
    }

    // For every spin: profit == win - bet, and the win is bounded by the
    // best paytable row (times the free-spin multiplier ceiling of 1 in
    // base play).
    #[test]
    fn spin_profit_and_win_bound((strips, window) in reel_set_strategy(), seed in any::<u64>()) {
        let mut machine = machine_from(&strips, window, seed);
        let max_mult = 10.0; // wild row is the largest configured
        for _ in 0..32 {
            let spin = machine.spin(2.0, false, 0);
            prop_assert!((spin.profit - (spin.win - spin.bet)).abs() < 1e-9);
            prop_assert!(spin.win <= max_mult * spin.bet + 1e-9);
            prop_assert!(spin.win >= 0.0);
        }
    }

    // A free-spin trigger implies the scatter landed on >= 3 distinct
    // reel columns of the visible window.
    #[test]
    fn trigger_implies_scatter_columns((strips, window) in reel_set_strategy(), seed in any::<u64>()) {
        let mut machine = machine_from(&strips, window, seed);
        let num_reels = strips.len();
        for _ in 0..64 {
            let spin = machine.spin(1.0, false, 0);
            let scatter_columns = (0..num_reels)
                .filter(|&col| {
                    (0..window).any(|row| spin.grid[row * num_reels + col] == SCATTER)
                })
                .count();
            if spin.trigger_free_spins {
                prop_assert!(scatter_columns >= 3);
                prop_assert_eq!(spin.free_spins_remaining, 8);
            } else {
                prop_assert!(scatter_columns < 3);
            }
        }
    }

    // left_run contract: the run is a prefix; every symbol in it is the
    // anchor or a wild; a None anchor means the whole line is wild.
    #[test]
    fn left_run_contract(symbols in line_strategy()) {
        let wilds = [WILD];
        let (anchor, run) = left_run(&symbols, &wilds);
        prop_assert!(run >= 1);
        prop_assert!(run <= symbols.len());
        match anchor {
            None => {
                prop_assert!(symbols.iter().all(|&s| s == WILD));
                prop_assert_eq!(run, symbols.len());
            }
            Some(a) => {
                prop_assert_ne!(a, WILD);
                for &s in &symbols[..run] {
                    prop_assert!(s == a || s == WILD);
                }
                // The run really is maximal.
                if run < symbols.len() {
                    let next = symbols[run];
                    prop_assert!(next != a && next != WILD);
                }
            }
        }
    }

    // Payout lookup never exceeds the row maximum and clamps long runs.
    #[test]
    fn payout_clamp(count in 0usize..12) {
        let mut rows = BTreeMap::new();
        rows.insert("1".to_string(), vec![1.0, 2.0, 5.0]);
        let paytable = Paytable::new(&rows).unwrap();
        let multiplier = paytable.multiplier(1, count);
        if count < 3 {
            prop_assert_eq!(multiplier, 0.0);
        } else {
            prop_assert!(multiplier <= 5.0);
            prop_assert!(multiplier >= 1.0);
        }
        if count >= 5 {
            prop_assert_eq!(multiplier, 5.0);
        }
    }

    // Sampled initial balances always respect the configured bounds.
    #[test]
    fn balance_bounds(
        mean in -100.0f64..1000.0,
        std_dev in 0.0f64..200.0,
        lo in 0.0f64..200.0,
        span in 0.0f64..500.0,
        seed in any::<u64>(),
    ) {
        let dist = BalanceDistribution {
            mean,
            std_dev,
            min: lo,
            max: lo + span,
        };
        let mut rng = SmallRng::seed_from_u64(seed);
        for _ in 0..16 {
            let balance = dist.sample(&mut rng);
            prop_assert!(balance >= dist.min && balance <= dist.max);
        }
    }
}
