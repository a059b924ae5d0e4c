//! Model-oracle contract for the v1 player profile.
//!
//! The real inference backend is external; the engine sees two opaque
//! functions per player cluster. Oracles must be thread-safe for
//! read-only inference: one instance is loaded per cluster at startup
//! and shared across all workers.
//!
//! [`HeuristicOracle`] is the built-in stand-in: a deterministic scorer
//! with mild per-cluster variation, enough to exercise the full v1
//! decision path without an ML runtime.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{SimError, SimResult};
use crate::rng::splitmix64;

/// Width of the bet-predictor feature vector:
/// `[balance, profit, streak, slot_type, base_point, delta_t,
///   delta_profit, delta_payout, prev_bet, prev_basepoint, prev_profit,
///   currency_flag]`.
pub const BET_FEATURES: usize = 12;

/// Width of the termination-predictor feature vector:
/// `[balance, total_profit, current_bet, streak, win_streak, prev_bet,
///   prev_balance, prev_profit]`.
pub const TERMINATION_FEATURES: usize = 8;

/// Termination model output: a continue/stop score thresholded at 0.5,
/// plus an out-of-distribution anomaly score.
#[derive(Clone, Copy, Debug)]
pub struct TerminationSignal {
    pub score: f32,
    pub anomaly: f32,
}

pub trait ModelOracle: Send + Sync {
    /// Next-bet prediction. Non-positive or unlisted outputs make the
    /// caller fall back to a random affordable bet.
    fn predict_bet(&self, features: &[f32; BET_FEATURES]) -> SimResult<f32>;

    /// Stop/continue prediction plus anomaly score.
    fn predict_termination(
        &self,
        features: &[f32; TERMINATION_FEATURES],
    ) -> SimResult<TerminationSignal>;
}

/// Deterministic heuristic oracle standing in for the external backend.
///
/// Bet prediction echoes the previous bet, scaled up slightly on win
/// streaks and down on loss streaks. Termination pressure grows with
/// drawdown and loss streaks; the anomaly score reacts to balances far
/// outside the cluster's typical range.
pub struct HeuristicOracle {
    cluster_ordinal: u64,
    aggression: f32,
    caution: f32,
}

impl HeuristicOracle {
    pub fn new(cluster_id: &str) -> Self {
        let ordinal = cluster_id
            .rsplit('_')
            .next()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);
        // Per-cluster personality derived from the cluster id alone so
        // every worker sees the same oracle.
        let mix = splitmix64(ordinal.wrapping_add(0xC0FFEE));
        let aggression = 0.05 + (mix & 0xFF) as f32 / 255.0 * 0.15;
        let caution = 0.3 + ((mix >> 8) & 0xFF) as f32 / 255.0 * 0.4;
        Self {
            cluster_ordinal: ordinal,
            aggression,
            caution,
        }
    }

    pub fn cluster_ordinal(&self) -> u64 {
        self.cluster_ordinal
    }
}

impl ModelOracle for HeuristicOracle {
    fn predict_bet(&self, features: &[f32; BET_FEATURES]) -> SimResult<f32> {
        let streak = features[2];
        let prev_bet = features[8];
        if prev_bet <= 0.0 {
            // Nothing to anchor on; the caller falls back to random.
            return Ok(0.0);
        }
        let scale = 1.0 + self.aggression * (streak / 5.0).tanh();
        Ok(prev_bet * scale)
    }

    fn predict_termination(
        &self,
        features: &[f32; TERMINATION_FEATURES],
    ) -> SimResult<TerminationSignal> {
        let balance = features[0];
        let total_profit = features[1];
        let current_bet = features[2];
        let streak = features[3];

        if !balance.is_finite() || !total_profit.is_finite() {
            return Err(SimError::Oracle(
                "non-finite termination features".to_string(),
            ));
        }

        let drawdown = if balance > 0.0 {
            (-total_profit / balance).max(0.0)
        } else {
            1.0
        };
        let loss_pressure = (-streak / 10.0).max(0.0);
        let score = sigmoid(self.caution * drawdown + loss_pressure - 1.5);

        // Out-of-distribution when the bet dwarfs the bankroll.
        let anomaly = if balance > 0.0 {
            (current_bet / balance).clamp(0.0, 1.0)
        } else {
            1.0
        };

        Ok(TerminationSignal { score, anomaly })
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// One oracle per v1 player cluster, built at startup. A missing entry
/// at build-player time is a startup bug, surfaced as an error.
#[derive(Default)]
pub struct OracleRegistry {
    oracles: HashMap<String, Arc<dyn ModelOracle>>,
}

impl OracleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load (or reuse) the oracle for a cluster. Construction failure is
    /// fatal for the run.
    pub fn register(&mut self, cluster_id: &str) -> SimResult<()> {
        if !self.oracles.contains_key(cluster_id) {
            let oracle = HeuristicOracle::new(cluster_id);
            self.oracles.insert(cluster_id.to_string(), Arc::new(oracle));
        }
        Ok(())
    }

    pub fn get(&self, cluster_id: &str) -> SimResult<Arc<dyn ModelOracle>> {
        self.oracles
            .get(cluster_id)
            .cloned()
            .ok_or_else(|| SimError::Oracle(format!("no oracle loaded for {}", cluster_id)))
    }

    pub fn len(&self) -> usize {
        self.oracles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.oracles.is_empty()
    }
}
