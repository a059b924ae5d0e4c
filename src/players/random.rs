//! Random behavioral profile.
//!
//! Picks uniformly among affordable bets with a uniform think-time
//! delay. Stops on any of: per-spin end probability, a run of
//! consecutive losses, the session wager budget, the profile's own spin
//! budget, or a depleted balance.

use rand::Rng;

use crate::players::PlayerCore;
use crate::types::{
    random_affordable_bet, random_delay, PlayerConfig, PlayerDecision, RandomProfileConfig,
    SessionObservation,
};

pub struct RandomPlayer {
    pub(crate) core: PlayerCore,
    profile: RandomProfileConfig,
    consecutive_losses: u32,
    session_spent: f64,
    session_budget: f64,
}

impl RandomPlayer {
    pub fn new(config: &PlayerConfig, seed: u64) -> Self {
        let profile = config.random.clone().unwrap_or_default();
        let core = PlayerCore::new(config, seed);
        let session_budget = profile.session_budget.unwrap_or(core.balance() * 0.9);
        Self {
            core,
            profile,
            consecutive_losses: 0,
            session_spent: 0.0,
            session_budget,
        }
    }

    pub fn decide(&mut self, obs: &SessionObservation<'_>) -> PlayerDecision {
        // Fold the latest result into the loss run before deciding.
        if let Some(last) = obs.recent_spins.last() {
            if last.profit <= 0.0 {
                self.consecutive_losses += 1;
            } else {
                self.consecutive_losses = 0;
            }
        }

        if self.should_end(obs) {
            return PlayerDecision::stop();
        }

        let bet = match random_affordable_bet(obs.available_bets, obs.balance, &mut self.core.rng) {
            Some(bet) => bet,
            None => return PlayerDecision::stop(),
        };
        let delay = random_delay(self.profile.min_delay, self.profile.max_delay, &mut self.core.rng);

        self.session_spent += bet;
        PlayerDecision::play(bet, delay)
    }

    pub fn reset(&mut self) {
        self.core.reset();
        self.consecutive_losses = 0;
        self.session_spent = 0.0;
        self.session_budget = self
            .profile
            .session_budget
            .unwrap_or(self.core.balance() * 0.9);
    }

    fn should_end(&mut self, obs: &SessionObservation<'_>) -> bool {
        if self.profile.end_probability > 0.0
            && self.core.rng.random::<f64>() < self.profile.end_probability
        {
            return true;
        }
        if self.consecutive_losses >= self.profile.max_consecutive_losses {
            return true;
        }
        if self.session_spent >= self.session_budget {
            return true;
        }
        if obs.totals.total_spins >= self.profile.max_spins_per_session {
            return true;
        }
        obs.balance <= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BalanceDistribution, SessionStats, SpinOutcome};

    fn config(profile: RandomProfileConfig) -> PlayerConfig {
        PlayerConfig {
            player_id: "rand_p".to_string(),
            model_version: "random".to_string(),
            cluster_id: "cluster_0".to_string(),
            currency: "USD".to_string(),
            initial_balance: BalanceDistribution {
                mean: 100.0,
                std_dev: 0.0,
                min: 0.0,
                max: 1000.0,
            },
            random: Some(profile),
            v1: None,
        }
    }

    fn relaxed_profile() -> RandomProfileConfig {
        RandomProfileConfig {
            min_delay: 0.0,
            max_delay: 0.0,
            end_probability: 0.0,
            max_consecutive_losses: u32::MAX,
            session_budget: Some(f64::INFINITY),
            max_spins_per_session: u32::MAX,
        }
    }

    fn losing_spin(n: u32) -> SpinOutcome {
        SpinOutcome {
            spin_number: n,
            bet: 1.0,
            win: 0.0,
            profit: -1.0,
            trigger_free_spins: false,
            free_spins_remaining: 0,
            in_free_spins: false,
            timestamp: 0.0,
            grid: vec![],
        }
    }

    fn obs<'a>(
        balance: f64,
        recent: &'a [SpinOutcome],
        totals: &'a SessionStats,
        bets: &'a [f64],
    ) -> SessionObservation<'a> {
        SessionObservation {
            balance,
            recent_spins: recent,
            totals,
            available_bets: bets,
            in_free_spins: false,
            free_spins_remaining: 0,
        }
    }

    #[test]
    fn test_picks_affordable_bet() {
        let mut player = RandomPlayer::new(&config(relaxed_profile()), 1);
        let totals = SessionStats::default();
        let bets = [1.0, 5.0, 500.0];
        for _ in 0..50 {
            let d = player.decide(&obs(100.0, &[], &totals, &bets));
            assert!(d.keep_playing);
            assert!(d.bet == 1.0 || d.bet == 5.0);
        }
    }

    #[test]
    fn test_stops_when_nothing_affordable() {
        let mut player = RandomPlayer::new(&config(relaxed_profile()), 1);
        let totals = SessionStats::default();
        let d = player.decide(&obs(0.5, &[], &totals, &[1.0, 5.0]));
        assert!(!d.keep_playing);
    }

    #[test]
    fn test_stops_on_consecutive_losses() {
        let mut profile = relaxed_profile();
        profile.max_consecutive_losses = 3;
        let mut player = RandomPlayer::new(&config(profile), 1);
        let totals = SessionStats::default();
        let bets = [1.0];

        let spins: Vec<SpinOutcome> = (1..=3).map(losing_spin).collect();
        // Two losses seen: keeps playing.
        let d = player.decide(&obs(100.0, &spins[..2], &totals, &bets));
        let d2 = player.decide(&obs(100.0, &spins[1..3], &totals, &bets));
        // After folding three losses the threshold fires.
        let d3 = player.decide(&obs(100.0, &spins[2..], &totals, &bets));
        assert!(d.keep_playing);
        assert!(d2.keep_playing);
        assert!(!d3.keep_playing);
    }

    #[test]
    fn test_stops_on_budget() {
        let mut profile = relaxed_profile();
        profile.session_budget = Some(2.0);
        let mut player = RandomPlayer::new(&config(profile), 1);
        let totals = SessionStats::default();
        let bets = [1.0];

        assert!(player.decide(&obs(100.0, &[], &totals, &bets)).keep_playing);
        assert!(player.decide(&obs(100.0, &[], &totals, &bets)).keep_playing);
        assert!(!player.decide(&obs(100.0, &[], &totals, &bets)).keep_playing);
    }

    #[test]
    fn test_stops_on_spin_budget() {
        let mut profile = relaxed_profile();
        profile.max_spins_per_session = 10;
        let mut player = RandomPlayer::new(&config(profile), 1);
        let mut totals = SessionStats::default();
        totals.total_spins = 10;
        assert!(!player.decide(&obs(100.0, &[], &totals, &[1.0])).keep_playing);
    }

    #[test]
    fn test_end_probability_one_stops_immediately() {
        let mut profile = relaxed_profile();
        profile.end_probability = 1.0;
        let mut player = RandomPlayer::new(&config(profile), 1);
        let totals = SessionStats::default();
        assert!(!player.decide(&obs(100.0, &[], &totals, &[1.0])).keep_playing);
    }

    #[test]
    fn test_delay_within_bounds() {
        let mut profile = relaxed_profile();
        profile.min_delay = 0.25;
        profile.max_delay = 0.75;
        let mut player = RandomPlayer::new(&config(profile), 1);
        let totals = SessionStats::default();
        for _ in 0..50 {
            let d = player.decide(&obs(100.0, &[], &totals, &[1.0]));
            assert!(d.delay >= 0.25 && d.delay <= 0.75);
        }
    }

    #[test]
    fn test_reset_clears_session_state() {
        let mut profile = relaxed_profile();
        profile.max_consecutive_losses = 2;
        let mut player = RandomPlayer::new(&config(profile), 1);
        let totals = SessionStats::default();
        let spins: Vec<SpinOutcome> = (1..=2).map(losing_spin).collect();

        player.decide(&obs(100.0, &spins[..1], &totals, &[1.0]));
        player.decide(&obs(100.0, &spins[1..], &totals, &[1.0]));
        player.reset();
        // Fresh loss counter after reset.
        let d = player.decide(&obs(100.0, &[], &totals, &[1.0]));
        assert!(d.keep_playing);
    }
}
