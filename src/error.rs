//! Error types shared across the engine.
//!
//! Startup errors (config, registry, oracle construction) are fatal and
//! propagate out of [`crate::engine::run`]. Hot-path session failures are
//! handled inside the task distributor and never cross task boundaries.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("config error: {0}")]
    Config(String),

    #[error("unknown machine id: {0}")]
    UnknownMachine(String),

    #[error("unknown player profile: {0}/{1}")]
    UnknownPlayer(String, String),

    #[error("oracle error: {0}")]
    Oracle(String),

    #[error("sink failure: {0}")]
    Sink(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type SimResult<T> = Result<T, SimError>;
