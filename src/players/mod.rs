//! Player behavioral profiles.
//!
//! A player is a sum type over the known model versions; common state
//! (identity, currency, bankroll, PRNG) lives in [`PlayerCore`], owned
//! by each variant. There is no shared mutable base state, and factories
//! are `match`-style constructors keyed on the `model_version` tag.
//!
//! - [`random`]: uniform bets and delays with stochastic termination.
//! - [`v1`]: model-driven bets and termination behind the oracle
//!   contract of [`crate::oracle`].

pub mod random;
pub mod v1;

use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::error::{SimError, SimResult};
use crate::oracle::OracleRegistry;
use crate::types::{BalanceDistribution, PlayerConfig, PlayerDecision, SessionObservation};

pub use random::RandomPlayer;
pub use v1::V1Player;

pub const MODEL_RANDOM: &str = "random";
pub const MODEL_V1: &str = "v1";

/// Identity and bankroll shared by every profile variant.
pub struct PlayerCore {
    pub id: String,
    pub version: String,
    pub cluster: String,
    pub currency: String,
    balance: f64,
    distribution: BalanceDistribution,
    pub rng: SmallRng,
}

impl PlayerCore {
    pub fn new(config: &PlayerConfig, seed: u64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let balance = config.initial_balance.sample(&mut rng);
        Self {
            id: config.player_id.clone(),
            version: config.model_version.clone(),
            cluster: config.cluster_id.clone(),
            currency: config.currency.clone(),
            balance,
            distribution: config.initial_balance,
            rng,
        }
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn debit(&mut self, amount: f64) {
        self.balance -= amount;
    }

    pub fn credit(&mut self, amount: f64) {
        self.balance += amount;
    }

    /// Resample the bankroll from the configured distribution. The PRNG
    /// stream is deliberately *not* reseeded.
    pub fn reset(&mut self) {
        self.balance = self.distribution.sample(&mut self.rng);
    }
}

/// The player capability surface: decide, reset, balance.
pub enum Player {
    Random(RandomPlayer),
    V1(V1Player),
}

impl Player {
    /// Construct the variant named by the config's `model_version`.
    pub fn from_config(
        config: &PlayerConfig,
        oracles: &OracleRegistry,
        seed: u64,
    ) -> SimResult<Self> {
        match config.model_version.as_str() {
            MODEL_RANDOM => Ok(Player::Random(RandomPlayer::new(config, seed))),
            MODEL_V1 => {
                let oracle = oracles.get(&config.cluster_id)?;
                Ok(Player::V1(V1Player::new(config, oracle, seed)))
            }
            other => Err(SimError::UnknownPlayer(
                other.to_string(),
                config.cluster_id.clone(),
            )),
        }
    }

    pub fn decide(&mut self, obs: &SessionObservation<'_>) -> PlayerDecision {
        match self {
            Player::Random(p) => p.decide(obs),
            Player::V1(p) => p.decide(obs),
        }
    }

    pub fn reset(&mut self) {
        match self {
            Player::Random(p) => p.reset(),
            Player::V1(p) => p.reset(),
        }
    }

    fn core(&self) -> &PlayerCore {
        match self {
            Player::Random(p) => &p.core,
            Player::V1(p) => &p.core,
        }
    }

    fn core_mut(&mut self) -> &mut PlayerCore {
        match self {
            Player::Random(p) => &mut p.core,
            Player::V1(p) => &mut p.core,
        }
    }

    pub fn balance(&self) -> f64 {
        self.core().balance()
    }

    pub fn debit(&mut self, amount: f64) {
        self.core_mut().debit(amount);
    }

    pub fn credit(&mut self, amount: f64) {
        self.core_mut().credit(amount);
    }

    pub fn id(&self) -> &str {
        &self.core().id
    }

    pub fn version(&self) -> &str {
        &self.core().version
    }

    pub fn cluster(&self) -> &str {
        &self.core().cluster
    }

    pub fn currency(&self) -> &str {
        &self.core().currency
    }
}
