//! Model-driven v1 behavioral profile.
//!
//! The first bet is drawn from a categorical `bet -> weight` map by
//! inverse-CDF sampling over the normalized weights. Subsequent bets and
//! the stop decision come from the cluster's oracle (see
//! [`crate::oracle`]): a 12-feature bet predictor whose invalid outputs
//! fall back to a random affordable bet, and an 8-feature termination
//! predictor thresholded at 0.5 with an anomaly-score override. A failed
//! prediction falls back to the random policy for that one decision.

use std::sync::Arc;

use log::debug;
use rand::Rng;

use crate::oracle::{ModelOracle, BET_FEATURES, TERMINATION_FEATURES};
use crate::players::PlayerCore;
use crate::types::{
    random_affordable_bet, random_delay, BetWeight, PlayerConfig, PlayerDecision,
    SessionObservation, V1ProfileConfig,
};

const V1_MIN_DELAY: f64 = 0.1;
const V1_MAX_DELAY: f64 = 1.0;

/// Fallback first-bet categorical, frequency-weighted as observed in
/// production traces.
fn default_first_bet_weights() -> Vec<BetWeight> {
    [
        (0.5, 6_617_486.0),
        (1.0, 12_389_649.0),
        (2.5, 17_502_407.0),
        (5.0, 11_196_115.0),
        (8.0, 3_892_178.0),
        (15.0, 2_314_774.0),
        (25.0, 876_125.0),
        (50.0, 200_001.0),
        (70.0, 40_075.0),
        (100.0, 36_310.0),
        (250.0, 12_000.0),
        (500.0, 6_763.0),
        (1000.0, 2_800.0),
        (2000.0, 1_995.0),
        (5000.0, 191.0),
    ]
    .iter()
    .map(|&(bet, weight)| BetWeight { bet, weight })
    .collect()
}

pub struct V1Player {
    pub(crate) core: PlayerCore,
    profile: V1ProfileConfig,
    oracle: Arc<dyn ModelOracle>,
    /// Cumulative distribution over first bets: `(bet, cumulative)`.
    first_bet_cdf: Vec<(f64, f64)>,
    first_decision: bool,
}

impl V1Player {
    pub fn new(config: &PlayerConfig, oracle: Arc<dyn ModelOracle>, seed: u64) -> Self {
        let profile = config.v1.clone().unwrap_or_default();
        let weights = if profile.first_bet_weights.is_empty() {
            default_first_bet_weights()
        } else {
            profile.first_bet_weights.clone()
        };
        Self {
            core: PlayerCore::new(config, seed),
            profile,
            oracle,
            first_bet_cdf: build_cdf(&weights),
            first_decision: true,
        }
    }

    pub fn decide(&mut self, obs: &SessionObservation<'_>) -> PlayerDecision {
        if obs.balance <= 0.0 {
            return PlayerDecision::stop();
        }

        if self.first_decision {
            self.first_decision = false;
            let bet = self.sample_first_bet();
            let delay = random_delay(V1_MIN_DELAY, V1_MAX_DELAY, &mut self.core.rng);
            return PlayerDecision::play(bet, delay);
        }

        match self.should_terminate(obs) {
            Ok(true) => return PlayerDecision::stop(),
            Ok(false) => {}
            Err(err) => {
                debug!("v1 termination fallback for {}: {}", self.core.id, err);
                return self.random_fallback(obs);
            }
        }

        let bet = match self.predict_bet(obs) {
            Ok(bet) => bet,
            Err(err) => {
                debug!("v1 bet fallback for {}: {}", self.core.id, err);
                return self.random_fallback(obs);
            }
        };
        let bet = match bet {
            Some(bet) => bet,
            None => return PlayerDecision::stop(),
        };

        let delay = random_delay(V1_MIN_DELAY, V1_MAX_DELAY, &mut self.core.rng);
        PlayerDecision::play(bet, delay)
    }

    pub fn reset(&mut self) {
        self.core.reset();
        self.first_decision = true;
    }

    /// Inverse-CDF sample over the normalized first-bet weights.
    fn sample_first_bet(&mut self) -> f64 {
        if self.first_bet_cdf.is_empty() {
            return 1.0;
        }
        let u: f64 = self.core.rng.random();
        for &(bet, cumulative) in &self.first_bet_cdf {
            if u <= cumulative {
                return bet;
            }
        }
        self.first_bet_cdf.last().map(|&(bet, _)| bet).unwrap_or(1.0)
    }

    /// Oracle bet, validated against the bet list and balance; invalid
    /// outputs degrade to a random affordable choice. `None` means no
    /// bet fits the bankroll at all.
    fn predict_bet(
        &mut self,
        obs: &SessionObservation<'_>,
    ) -> Result<Option<f64>, crate::error::SimError> {
        let features = betting_features(obs);
        let predicted = self.oracle.predict_bet(&features)? as f64;

        let listed = obs.available_bets.iter().any(|&b| b == predicted);
        if predicted > 0.0 && listed && predicted <= obs.balance {
            return Ok(Some(predicted));
        }
        Ok(random_affordable_bet(
            obs.available_bets,
            obs.balance,
            &mut self.core.rng,
        ))
    }

    fn should_terminate(
        &mut self,
        obs: &SessionObservation<'_>,
    ) -> Result<bool, crate::error::SimError> {
        let features = termination_features(obs);
        let signal = self.oracle.predict_termination(&features)?;
        Ok(signal.score > 0.5 || signal.anomaly > self.profile.anomaly_threshold)
    }

    fn random_fallback(&mut self, obs: &SessionObservation<'_>) -> PlayerDecision {
        match random_affordable_bet(obs.available_bets, obs.balance, &mut self.core.rng) {
            Some(bet) => {
                let delay = random_delay(V1_MIN_DELAY, V1_MAX_DELAY, &mut self.core.rng);
                PlayerDecision::play(bet, delay)
            }
            None => PlayerDecision::stop(),
        }
    }
}

fn build_cdf(weights: &[BetWeight]) -> Vec<(f64, f64)> {
    let total: f64 = weights.iter().map(|w| w.weight.max(0.0)).sum();
    if total <= 0.0 {
        return Vec::new();
    }
    let mut cumulative = 0.0;
    weights
        .iter()
        .filter(|w| w.weight > 0.0)
        .map(|w| {
            cumulative += w.weight / total;
            (w.bet, cumulative)
        })
        .collect()
}

/// Signed win/loss streak over the recent spins: +n for n straight
/// winning spins, −n for n straight losing spins.
fn streak(recent: &[crate::types::SpinOutcome]) -> f32 {
    let last = match recent.last() {
        Some(spin) => spin,
        None => return 0.0,
    };
    let winning = last.profit > 0.0;
    let mut run = 0.0;
    for spin in recent.iter().rev() {
        if (spin.profit > 0.0) == winning {
            run += if winning { 1.0 } else { -1.0 };
        } else {
            break;
        }
    }
    run
}

/// The fixed 12-vector consumed by the bet predictor.
fn betting_features(obs: &SessionObservation<'_>) -> [f32; BET_FEATURES] {
    let last = obs.recent_spins.last();
    let prev = obs
        .recent_spins
        .len()
        .checked_sub(2)
        .and_then(|i| obs.recent_spins.get(i));

    let last_profit = last.map(|s| s.profit).unwrap_or(0.0);
    let prev_bet = last.map(|s| s.bet).unwrap_or(0.0);
    let delta_profit = match (last, prev) {
        (Some(l), Some(p)) => l.profit - p.profit,
        _ => 0.0,
    };
    let delta_payout = match (last, prev) {
        (Some(l), Some(p)) => l.win - p.win,
        _ => 0.0,
    };

    [
        obs.balance as f32,
        last_profit as f32,
        streak(obs.recent_spins),
        1.0, // slot-type constant
        obs.balance as f32,
        1.0, // delta_t constant
        delta_profit as f32,
        delta_payout as f32,
        prev_bet as f32,
        obs.balance as f32,
        prev.map(|s| s.profit).unwrap_or(0.0) as f32,
        1.0, // currency flag
    ]
}

/// The fixed 8-vector consumed by the termination predictor.
fn termination_features(obs: &SessionObservation<'_>) -> [f32; TERMINATION_FEATURES] {
    let last = obs.recent_spins.last();
    let prev = obs
        .recent_spins
        .len()
        .checked_sub(2)
        .and_then(|i| obs.recent_spins.get(i));

    let current_bet = last.map(|s| s.bet).unwrap_or(0.0);
    let prev_bet = prev.map(|s| s.bet).unwrap_or(0.0);
    let run = streak(obs.recent_spins);

    [
        obs.balance as f32,
        obs.totals.total_profit as f32,
        current_bet as f32,
        run,
        run.max(0.0),
        prev_bet as f32,
        obs.balance as f32,
        obs.totals.total_profit as f32,
    ]
}
