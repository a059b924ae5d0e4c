//! Session controller — drives the player↔machine loop.
//!
//! Each iteration builds an observation, asks the player to decide,
//! validates the wager, resolves the spin, and folds the result into the
//! session record. The controller is the sole writer of that record; the
//! player and machine are non-reentrant within a session.
//!
//! Termination: the player stops, the bet is invalid (not an error), or
//! one of the caps fires (spin count, wall clock, logical clock). The
//! logical clock advances by the player's declared think time whether or
//! not the wall-clock sleep is enabled.

use std::collections::VecDeque;
use std::time::Instant;

use log::debug;

use crate::machine::SlotMachine;
use crate::players::Player;
use crate::types::{SessionLimits, SessionObservation, SessionStats, SpinOutcome};

/// How many recent spins the player gets to see.
const OBSERVATION_WINDOW: usize = 10;

/// A finished session: the summary record plus, when raw recording is
/// on, every spin in order.
pub struct SessionOutcome {
    pub stats: SessionStats,
    pub spins: Vec<SpinOutcome>,
}

pub struct SessionController<'a> {
    player: &'a mut Player,
    machine: &'a mut SlotMachine,
    record_spins: bool,
    apply_think_time: bool,
}

impl<'a> SessionController<'a> {
    pub fn new(
        player: &'a mut Player,
        machine: &'a mut SlotMachine,
        record_spins: bool,
        apply_think_time: bool,
    ) -> Self {
        Self {
            player,
            machine,
            record_spins,
            apply_think_time,
        }
    }

    pub fn run(&mut self, session_id: &str, limits: &SessionLimits) -> SessionOutcome {
        let start = Instant::now();

        let mut stats = SessionStats {
            session_id: session_id.to_string(),
            player_id: self.player.id().to_string(),
            machine_id: self.machine.id().to_string(),
            initial_balance: self.player.balance(),
            final_balance: self.player.balance(),
            ..SessionStats::default()
        };

        let mut recent: VecDeque<SpinOutcome> = VecDeque::with_capacity(OBSERVATION_WINDOW + 1);
        let mut all_spins: Vec<SpinOutcome> = Vec::new();
        let mut in_free_spins = false;
        let mut free_spins_remaining: u32 = 0;
        let mut logical_clock = 0.0f64;
        let mut loss_run = 0.0f64;

        loop {
            if stats.total_spins >= limits.max_spins {
                break;
            }
            if start.elapsed().as_secs_f64() >= limits.max_wall_secs {
                break;
            }
            if logical_clock >= limits.max_logical_secs {
                break;
            }

            let decision = {
                recent.make_contiguous();
                let observation = SessionObservation {
                    balance: self.player.balance(),
                    recent_spins: recent.as_slices().0,
                    totals: &stats,
                    available_bets: self.machine.bet_options(self.player.currency()),
                    in_free_spins,
                    free_spins_remaining,
                };
                self.player.decide(&observation)
            };

            if !decision.keep_playing || decision.bet <= 0.0 {
                debug!("session {}: player ended", session_id);
                break;
            }
            if !self.machine.is_valid_bet(decision.bet, self.player.currency()) {
                debug!(
                    "session {}: bet {} not in the bet table",
                    session_id, decision.bet
                );
                break;
            }
            if decision.bet > self.player.balance() {
                debug!(
                    "session {}: bet {} exceeds balance {}",
                    session_id,
                    decision.bet,
                    self.player.balance()
                );
                break;
            }

            self.player.debit(decision.bet);
            let mut spin = self
                .machine
                .spin(decision.bet, in_free_spins, free_spins_remaining);
            self.player.credit(spin.win);

            if spin.trigger_free_spins && !in_free_spins {
                in_free_spins = true;
                free_spins_remaining = spin.free_spins_remaining;
            } else if in_free_spins {
                free_spins_remaining = spin.free_spins_remaining;
                if free_spins_remaining == 0 {
                    in_free_spins = false;
                }
            }

            spin.spin_number = stats.total_spins + 1;
            spin.timestamp = logical_clock;
            stats.record_spin(&spin, &mut loss_run);

            if self.record_spins {
                all_spins.push(spin.clone());
            }
            recent.push_back(spin);
            if recent.len() > OBSERVATION_WINDOW {
                recent.pop_front();
            }

            logical_clock += decision.delay.max(0.0);
            if self.apply_think_time && decision.delay > 0.0 {
                std::thread::sleep(std::time::Duration::from_secs_f64(decision.delay));
            }
        }

        // Logical time, not wall time: identical seeds must produce
        // identical records regardless of host load.
        stats.session_duration = logical_clock;
        stats.final_balance = self.player.balance();
        stats.finalize_rtp();

        SessionOutcome {
            stats,
            spins: all_spins,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::OracleRegistry;
    use crate::types::{
        BalanceDistribution, MachineConfig, PlayerConfig, RandomProfileConfig, SessionLimits,
        Symbol,
    };
    use std::collections::BTreeMap;

    fn machine_config(reels: &[&[Symbol]], pay: &[(Symbol, &[f64])]) -> MachineConfig {
        let strips: BTreeMap<String, Vec<Symbol>> = reels
            .iter()
            .enumerate()
            .map(|(i, s)| (format!("reel_{}", i), s.to_vec()))
            .collect();
        let mut sets = BTreeMap::new();
        sets.insert("normal".to_string(), strips);
        let pay_table: BTreeMap<String, Vec<f64>> = pay
            .iter()
            .map(|(s, p)| (s.to_string(), p.to_vec()))
            .collect();
        let mut bet_table = BTreeMap::new();
        bet_table.insert("USD".to_string(), vec![1.0]);
        MachineConfig {
            machine_id: "m_sess".to_string(),
            window_size: 1,
            active_lines: 1,
            free_spins_count: 8,
            free_spins_multiplier: 1.0,
            wild_symbols: vec![],
            scatter_symbol: 200,
            reels: sets,
            paylines: vec![vec![0, 1, 2, 3, 4]],
            pay_table,
            bet_table,
        }
    }

    fn random_player(balance: f64, profile: RandomProfileConfig) -> Player {
        let config = PlayerConfig {
            player_id: "p_sess".to_string(),
            model_version: "random".to_string(),
            cluster_id: "cluster_0".to_string(),
            currency: "USD".to_string(),
            initial_balance: BalanceDistribution {
                mean: balance,
                std_dev: 0.0,
                min: 0.0,
                max: balance.max(1.0) * 10.0,
            },
            random: Some(profile),
            v1: None,
        };
        Player::from_config(&config, &OracleRegistry::new(), 11).unwrap()
    }

    fn relaxed() -> RandomProfileConfig {
        RandomProfileConfig {
            min_delay: 0.0,
            max_delay: 0.0,
            end_probability: 0.0,
            max_consecutive_losses: u32::MAX,
            session_budget: Some(f64::INFINITY),
            max_spins_per_session: u32::MAX,
        }
    }

    fn limits(max_spins: u32) -> SessionLimits {
        SessionLimits {
            max_spins,
            max_wall_secs: 60.0,
            max_logical_secs: f64::INFINITY,
        }
    }

    #[test]
    fn test_exhaustion_scenario_runs_exactly_ten_spins() {
        // Balance 10, bets [1], paytable never pays: 10 spins then broke.
        let mut machine = SlotMachine::new(
            &machine_config(&[&[1], &[2], &[1], &[2], &[1]], &[(1, &[1.0, 2.0, 5.0])]),
            0,
        )
        .unwrap();
        let mut player = random_player(10.0, relaxed());

        let outcome =
            SessionController::new(&mut player, &mut machine, false, false).run("s1", &limits(1000));

        assert_eq!(outcome.stats.total_spins, 10);
        assert_eq!(outcome.stats.final_balance, 0.0);
        assert_eq!(outcome.stats.total_bet, 10.0);
        assert_eq!(outcome.stats.total_win, 0.0);
        assert_eq!(outcome.stats.rtp, 0.0);
    }

    #[test]
    fn test_trivial_win_session_rtp() {
        // Five [A] reels, pays 5x every spin.
        let mut machine = SlotMachine::new(
            &machine_config(&[&[1], &[1], &[1], &[1], &[1]], &[(1, &[1.0, 2.0, 5.0])]),
            0,
        )
        .unwrap();
        let mut player = random_player(10.0, relaxed());

        let outcome =
            SessionController::new(&mut player, &mut machine, false, false).run("s2", &limits(10));

        assert_eq!(outcome.stats.total_spins, 10);
        assert_eq!(outcome.stats.total_bet, 10.0);
        assert_eq!(outcome.stats.total_win, 50.0);
        assert!((outcome.stats.rtp - 5.0).abs() < 1e-12);
        assert!(
            (outcome.stats.final_balance
                - (outcome.stats.initial_balance + outcome.stats.total_profit))
                .abs()
                < 1e-9
        );
    }

    #[test]
    fn test_spin_cap_terminates() {
        let mut machine = SlotMachine::new(
            &machine_config(&[&[1], &[1], &[1], &[1], &[1]], &[(1, &[1.0, 2.0, 5.0])]),
            0,
        )
        .unwrap();
        let mut player = random_player(100.0, relaxed());
        let outcome =
            SessionController::new(&mut player, &mut machine, false, false).run("s3", &limits(7));
        assert_eq!(outcome.stats.total_spins, 7);
    }

    #[test]
    fn test_logical_clock_cap_terminates() {
        let mut profile = relaxed();
        profile.min_delay = 1.0;
        profile.max_delay = 1.0;
        let mut machine = SlotMachine::new(
            &machine_config(&[&[1], &[1], &[1], &[1], &[1]], &[(1, &[1.0, 2.0, 5.0])]),
            0,
        )
        .unwrap();
        let mut player = random_player(100.0, profile);
        let lims = SessionLimits {
            max_spins: 1000,
            max_wall_secs: 60.0,
            max_logical_secs: 5.0,
        };
        // Think time is NOT applied as wall sleep; only the logical clock
        // advances, so 5 seconds of budget buys exactly 5 one-second spins.
        let outcome =
            SessionController::new(&mut player, &mut machine, false, false).run("s4", &lims);
        assert_eq!(outcome.stats.total_spins, 5);
        assert!((outcome.stats.session_duration - 5.0).abs() < 1e-9);
        // Spin timestamps follow the logical clock.
        let mut player = random_player(100.0, {
            let mut p = relaxed();
            p.min_delay = 1.0;
            p.max_delay = 1.0;
            p
        });
        let outcome =
            SessionController::new(&mut player, &mut machine, true, false).run("s4b", &lims);
        for (i, spin) in outcome.spins.iter().enumerate() {
            assert!((spin.timestamp - i as f64).abs() < 1e-9);
        }
    }

    #[test]
    fn test_spin_records_only_when_enabled() {
        let mut machine = SlotMachine::new(
            &machine_config(&[&[1], &[1], &[1], &[1], &[1]], &[(1, &[1.0, 2.0, 5.0])]),
            0,
        )
        .unwrap();
        let mut player = random_player(100.0, relaxed());
        let outcome =
            SessionController::new(&mut player, &mut machine, false, false).run("s5", &limits(5));
        assert!(outcome.spins.is_empty());

        let mut player = random_player(100.0, relaxed());
        let outcome =
            SessionController::new(&mut player, &mut machine, true, false).run("s6", &limits(5));
        assert_eq!(outcome.spins.len(), 5);
        // Spin numbers are 1-based and sequential.
        for (i, spin) in outcome.spins.iter().enumerate() {
            assert_eq!(spin.spin_number as usize, i + 1);
            assert!((spin.profit - (spin.win - spin.bet)).abs() < 1e-12);
        }
    }

    #[test]
    fn test_free_spin_state_machine() {
        // Scatter columns 0,2,4 land every base spin: first spin triggers,
        // then 2 free spins are played out without re-trigger.
        let mut config = machine_config(
            &[&[200], &[1], &[200], &[1], &[200]],
            &[(1, &[1.0, 2.0, 5.0])],
        );
        config.free_spins_count = 2;
        let mut machine = SlotMachine::new(&config, 0).unwrap();
        let mut player = random_player(100.0, relaxed());

        let outcome =
            SessionController::new(&mut player, &mut machine, true, false).run("s7", &limits(4));

        let spins = &outcome.spins;
        assert_eq!(spins.len(), 4);
        assert!(spins[0].trigger_free_spins);
        assert!(!spins[0].in_free_spins);
        assert!(spins[1].in_free_spins);
        assert!(spins[2].in_free_spins);
        assert!(!spins[1].trigger_free_spins);
        assert!(!spins[2].trigger_free_spins);
        // Free-spin block exhausted after two; the 4th spin re-triggers.
        assert!(!spins[3].in_free_spins);
        assert!(spins[3].trigger_free_spins);
        assert_eq!(outcome.stats.free_spins_triggered, 2);
        assert_eq!(outcome.stats.free_spins_played, 2);
    }

    #[test]
    fn test_session_totals_match_spin_sums() {
        let mut machine = SlotMachine::new(
            &machine_config(&[&[1, 2], &[1, 2], &[1], &[2], &[1]], &[(1, &[1.0, 2.0, 5.0])]),
            123,
        )
        .unwrap();
        let mut player = random_player(50.0, relaxed());
        let outcome =
            SessionController::new(&mut player, &mut machine, true, false).run("s8", &limits(30));

        let bet_sum: f64 = outcome.spins.iter().map(|s| s.bet).sum();
        let win_sum: f64 = outcome.spins.iter().map(|s| s.win).sum();
        assert!((outcome.stats.total_bet - bet_sum).abs() < 1e-9);
        assert!((outcome.stats.total_win - win_sum).abs() < 1e-9);
        assert_eq!(outcome.stats.total_spins as usize, outcome.spins.len());
    }
}
