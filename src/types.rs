//! Core data model: spin results, session statistics, decisions, tasks,
//! and the configuration records consumed from the run file.
//!
//! All monetary quantities are `f64`. Symbols are small non-negative
//! integers; each machine partitions them into a normal set, a wild set
//! (substitutes in line evaluation) and one scatter value (free-spin
//! trigger).

use rand::rngs::SmallRng;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Symbol identifier as it appears on a reel strip.
pub type Symbol = u32;

/// Flat row-major symbol grid: cell (row, reel) lives at
/// `row * num_reels + reel`. Length is always `num_reels * window_size`.
pub type SpinGrid = Vec<Symbol>;

/// Grid indices making up one payline, one entry per reel.
pub type PaylineIndices = Vec<usize>;

// ── Per-spin and per-session records ────────────────────────────────

/// Outcome of a single resolved spin.
#[derive(Clone, Debug)]
pub struct SpinOutcome {
    /// 1-based sequence number within the session.
    pub spin_number: u32,
    pub bet: f64,
    pub win: f64,
    /// Always `win - bet`.
    pub profit: f64,
    pub trigger_free_spins: bool,
    pub free_spins_remaining: u32,
    pub in_free_spins: bool,
    /// Unix epoch seconds at resolution time.
    pub timestamp: f64,
    pub grid: SpinGrid,
}

/// What the player wants to do next.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayerDecision {
    pub bet: f64,
    /// Simulated think time in seconds; advances the session's logical clock.
    pub delay: f64,
    pub keep_playing: bool,
}

impl PlayerDecision {
    pub fn play(bet: f64, delay: f64) -> Self {
        Self {
            bet,
            delay,
            keep_playing: bet > 0.0,
        }
    }

    pub fn stop() -> Self {
        Self {
            bet: 0.0,
            delay: 0.0,
            keep_playing: false,
        }
    }
}

/// Summary record for one completed session. Created by the session
/// controller, mutated only by it, published immutably to the sink.
#[derive(Clone, Debug, Default)]
pub struct SessionStats {
    pub session_id: String,
    pub player_id: String,
    pub machine_id: String,
    pub total_spins: u32,
    pub total_bet: f64,
    pub total_win: f64,
    pub total_profit: f64,
    pub initial_balance: f64,
    pub final_balance: f64,
    /// Logical-clock seconds from session start to termination
    /// (accumulated think time).
    pub session_duration: f64,
    pub free_spins_triggered: u32,
    pub free_spins_played: u32,
    /// Largest single-spin win.
    pub max_win: f64,
    /// Most negative running sum over consecutive losing spins (≤ 0).
    pub max_loss_streak: f64,
    /// `total_win / total_bet`, or 0 when nothing was wagered.
    pub rtp: f64,
}

impl SessionStats {
    /// Fold one spin into the running totals.
    pub fn record_spin(&mut self, spin: &SpinOutcome, loss_run: &mut f64) {
        self.total_spins += 1;
        self.total_bet += spin.bet;
        self.total_win += spin.win;
        self.total_profit += spin.profit;

        if spin.trigger_free_spins {
            self.free_spins_triggered += 1;
        }
        if spin.in_free_spins {
            self.free_spins_played += 1;
        }
        if spin.win > self.max_win {
            self.max_win = spin.win;
        }

        // Loss streak: accumulate while losing, reset on a winning spin.
        if spin.profit < 0.0 {
            *loss_run += spin.profit;
            if *loss_run < self.max_loss_streak {
                self.max_loss_streak = *loss_run;
            }
        } else if spin.profit > 0.0 {
            *loss_run = 0.0;
        }
    }

    /// Recompute the RTP from the accumulated totals.
    pub fn finalize_rtp(&mut self) {
        self.rtp = if self.total_bet > 0.0 {
            self.total_win / self.total_bet
        } else {
            0.0
        };
    }
}

/// Snapshot handed to the player before each decision.
pub struct SessionObservation<'a> {
    pub balance: f64,
    /// Up to the last 10 spins, oldest first.
    pub recent_spins: &'a [SpinOutcome],
    pub totals: &'a SessionStats,
    pub available_bets: &'a [f64],
    pub in_free_spins: bool,
    pub free_spins_remaining: u32,
}

// ── Tasks ───────────────────────────────────────────────────────────

/// Descriptor for one session to run. Immutable; one task produces
/// exactly one session record (or one failure).
#[derive(Clone, Debug)]
pub struct SessionTask {
    pub task_id: u64,
    pub session_seq: u32,
    pub player_version: String,
    pub player_cluster: String,
    pub machine_id: String,
}

impl SessionTask {
    /// Instance-pool key for this task's (player, machine) pairing.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            player_version: self.player_version.clone(),
            player_cluster: self.player_cluster.clone(),
            machine_id: self.machine_id.clone(),
        }
    }

    pub fn session_id(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.player_version, self.player_cluster, self.machine_id, self.session_seq
        )
    }
}

/// `(player-version, player-cluster, machine-id)` pool key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub player_version: String,
    pub player_cluster: String,
    pub machine_id: String,
}

/// Per-session termination caps enforced by the controller.
#[derive(Clone, Copy, Debug)]
pub struct SessionLimits {
    pub max_spins: u32,
    pub max_wall_secs: f64,
    pub max_logical_secs: f64,
}

// ── Configuration records ───────────────────────────────────────────

/// Truncated normal distribution for initial balances.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct BalanceDistribution {
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

impl BalanceDistribution {
    /// Draw a balance; the sample is always within `[min, max]`.
    pub fn sample(&self, rng: &mut SmallRng) -> f64 {
        if self.std_dev <= 0.0 {
            return self.mean.clamp(self.min, self.max);
        }
        // Normal::new only fails on non-finite or negative std_dev,
        // which validation rejects at load.
        let normal = Normal::new(self.mean, self.std_dev)
            .unwrap_or_else(|_| Normal::new(self.mean, 1.0).expect("unit normal"));
        normal.sample(rng).clamp(self.min, self.max)
    }
}

/// Machine record as it appears in the run file. Reel sets map
/// `set name -> (reel key -> strip)`; reels within a set are ordered by
/// key so a given seed reproduces identical grids.
#[derive(Clone, Debug, Deserialize)]
pub struct MachineConfig {
    pub machine_id: String,
    pub window_size: usize,
    /// Number of paylines actually scored; clamped to the payline count.
    pub active_lines: usize,
    pub free_spins_count: u32,
    pub free_spins_multiplier: f64,
    #[serde(default)]
    pub wild_symbols: Vec<Symbol>,
    pub scatter_symbol: Symbol,
    pub reels: BTreeMap<String, BTreeMap<String, Vec<Symbol>>>,
    pub paylines: Vec<PaylineIndices>,
    /// Symbol (as decimal string key) -> payout multipliers for 3, 4, 5…
    /// consecutive matches.
    pub pay_table: BTreeMap<String, Vec<f64>>,
    /// Currency code -> admissible bet amounts, ascending.
    pub bet_table: BTreeMap<String, Vec<f64>>,
}

/// Behavioral knobs for the random profile.
#[derive(Clone, Debug, Deserialize)]
pub struct RandomProfileConfig {
    #[serde(default = "default_min_delay")]
    pub min_delay: f64,
    #[serde(default = "default_max_delay")]
    pub max_delay: f64,
    #[serde(default = "default_end_probability")]
    pub end_probability: f64,
    #[serde(default = "default_max_losses")]
    pub max_consecutive_losses: u32,
    /// Total wager budget for one session; `None` derives 90% of the
    /// sampled starting balance.
    #[serde(default)]
    pub session_budget: Option<f64>,
    #[serde(default = "default_profile_spins")]
    pub max_spins_per_session: u32,
}

fn default_min_delay() -> f64 {
    0.1
}
fn default_max_delay() -> f64 {
    2.0
}
fn default_end_probability() -> f64 {
    0.001
}
fn default_max_losses() -> u32 {
    10
}
fn default_profile_spins() -> u32 {
    1000
}

impl Default for RandomProfileConfig {
    fn default() -> Self {
        Self {
            min_delay: default_min_delay(),
            max_delay: default_max_delay(),
            end_probability: default_end_probability(),
            max_consecutive_losses: default_max_losses(),
            session_budget: None,
            max_spins_per_session: default_profile_spins(),
        }
    }
}

/// One `bet -> weight` entry of the v1 first-bet categorical.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct BetWeight {
    pub bet: f64,
    pub weight: f64,
}

/// Model-specific knobs for the v1 profile.
#[derive(Clone, Debug, Deserialize)]
pub struct V1ProfileConfig {
    #[serde(default)]
    pub first_bet_weights: Vec<BetWeight>,
    #[serde(default = "default_anomaly_threshold")]
    pub anomaly_threshold: f32,
}

fn default_anomaly_threshold() -> f32 {
    0.8
}

impl Default for V1ProfileConfig {
    fn default() -> Self {
        Self {
            first_bet_weights: Vec::new(),
            anomaly_threshold: default_anomaly_threshold(),
        }
    }
}

/// Player behavioral profile record.
#[derive(Clone, Debug, Deserialize)]
pub struct PlayerConfig {
    pub player_id: String,
    /// `"random"` or `"v1"`.
    pub model_version: String,
    #[serde(default = "default_cluster")]
    pub cluster_id: String,
    pub currency: String,
    pub initial_balance: BalanceDistribution,
    #[serde(default)]
    pub random: Option<RandomProfileConfig>,
    #[serde(default)]
    pub v1: Option<V1ProfileConfig>,
}

fn default_cluster() -> String {
    "cluster_0".to_string()
}

/// Top-level run file: simulation parameters plus inline machine and
/// player records.
#[derive(Clone, Debug, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_sessions_per_pair")]
    pub sessions_per_pair: u32,
    #[serde(default = "default_max_spins")]
    pub max_spins_per_session: u32,
    /// Wall-clock cap per session, seconds.
    #[serde(default = "default_max_duration")]
    pub max_session_duration: f64,
    /// Logical-clock cap per session, seconds of accumulated think time.
    #[serde(default = "default_max_logical")]
    pub max_logical_duration: f64,
    /// 0 = hardware concurrency.
    #[serde(default)]
    pub thread_count: usize,
    /// When false (the default for large runs) think-time delays only
    /// advance the logical clock and never sleep.
    #[serde(default)]
    pub apply_think_time: bool,
    #[serde(default)]
    pub record_raw_spins: bool,
    #[serde(default = "default_true")]
    pub generate_reports: bool,
    #[serde(default = "default_batch_write_size")]
    pub batch_write_size: usize,
    #[serde(default = "default_spin_buffer")]
    pub max_spin_buffer: usize,
    #[serde(default = "default_output_dir")]
    pub output_base_dir: String,
    #[serde(default = "default_seed")]
    pub seed: u64,
    pub machines: Vec<MachineConfig>,
    pub players: Vec<PlayerConfig>,
}

fn default_sessions_per_pair() -> u32 {
    1
}
fn default_max_spins() -> u32 {
    10_000
}
fn default_max_duration() -> f64 {
    300.0
}
fn default_max_logical() -> f64 {
    f64::INFINITY
}
fn default_true() -> bool {
    true
}
fn default_batch_write_size() -> usize {
    300
}
fn default_spin_buffer() -> usize {
    10_000
}
fn default_output_dir() -> String {
    "output".to_string()
}
fn default_seed() -> u64 {
    42
}

impl SimulationConfig {
    pub fn session_limits(&self) -> SessionLimits {
        SessionLimits {
            max_spins: self.max_spins_per_session,
            max_wall_secs: self.max_session_duration,
            max_logical_secs: self.max_logical_duration,
        }
    }
}

// ── Randomness helpers shared by players ────────────────────────────

/// Uniform choice among the bets the player can afford. Returns `None`
/// when no listed bet fits the balance.
pub fn random_affordable_bet(
    available: &[f64],
    balance: f64,
    rng: &mut SmallRng,
) -> Option<f64> {
    let affordable: Vec<f64> = available
        .iter()
        .copied()
        .filter(|&b| b > 0.0 && b <= balance)
        .collect();
    if affordable.is_empty() {
        return None;
    }
    Some(affordable[rng.random_range(0..affordable.len())])
}

/// Uniform think-time delay in `[min_delay, max_delay]` seconds.
pub fn random_delay(min_delay: f64, max_delay: f64, rng: &mut SmallRng) -> f64 {
    if max_delay <= min_delay {
        return min_delay.max(0.0);
    }
    rng.random_range(min_delay..=max_delay)
}
