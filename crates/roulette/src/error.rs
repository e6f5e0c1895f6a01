// ABOUTME: Error types for the roulette library.
// ABOUTME: Covers catalog validation, configuration loading, and cancelled simulations.

use crate::tier::Tier;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Catalog must contain at least one item")]
    EmptyCatalog,

    #[error("Duplicate item name '{0}'")]
    DuplicateItem(String),

    #[error("Catalog mixes tier-based and weight-based items")]
    MixedOdds,

    #[error("Target item '{0}' is not in the catalog")]
    UnknownTarget(String),

    #[error("Tier {0} has a non-zero probability but no items")]
    EmptyTier(Tier),

    #[error("Tier probabilities must be finite, non-negative and sum to 1.0 (got {0})")]
    InvalidTierTable(f64),

    #[error("Invalid catalog config: {0}")]
    Config(String),

    #[error("Failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Simulation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
