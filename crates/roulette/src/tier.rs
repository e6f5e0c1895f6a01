// ABOUTME: Rarity tiers and the injectable table of their nominal probabilities.
// ABOUTME: Tier probabilities are fixed per tier, independent of how many items occupy it.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tolerance when checking that a tier table sums to one.
const SUM_TOLERANCE: f64 = 1e-9;

/// A rarity tier. Declaration order is the canonical walk order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Common,
    Rare,
    Epic,
    Legendary,
    Godly,
}

impl Tier {
    /// All tiers in canonical order (Common → Godly).
    pub const ALL: [Tier; 5] = [
        Tier::Common,
        Tier::Rare,
        Tier::Epic,
        Tier::Legendary,
        Tier::Godly,
    ];

    /// Position of this tier in the canonical order.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Tier::Common => "Common",
            Tier::Rare => "Rare",
            Tier::Epic => "Epic",
            Tier::Legendary => "Legendary",
            Tier::Godly => "Godly",
        }
    }

    /// Flavour category shown next to the tier.
    pub fn category(self) -> &'static str {
        match self {
            Tier::Common => "Cardio",
            Tier::Rare => "Bodyweight",
            Tier::Epic => "Strength",
            Tier::Legendary => "Reward",
            Tier::Godly => "Ultimate",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Nominal selection probability of each tier.
///
/// Probabilities are validated on construction: each must be finite and
/// non-negative, and together they must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TierTableConfig", into = "TierTableConfig")]
pub struct TierTable {
    probabilities: [f64; 5],
}

impl TierTable {
    /// Build a table from probabilities listed in canonical tier order.
    pub fn new(probabilities: [f64; 5]) -> Result<Self> {
        let sum: f64 = probabilities.iter().sum();
        let valid = probabilities.iter().all(|p| p.is_finite() && *p >= 0.0);
        if !valid || (sum - 1.0).abs() > SUM_TOLERANCE {
            return Err(Error::InvalidTierTable(sum));
        }
        Ok(Self { probabilities })
    }

    /// Nominal probability of drawing any item from `tier`.
    pub fn probability(&self, tier: Tier) -> f64 {
        self.probabilities[tier.index()]
    }

    /// Tiers paired with their probabilities, in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (Tier, f64)> + '_ {
        Tier::ALL.iter().map(move |&tier| (tier, self.probability(tier)))
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            probabilities: [0.50, 0.30, 0.15, 0.04, 0.01],
        }
    }
}

/// On-disk shape of a tier table: one named field per tier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct TierTableConfig {
    common: f64,
    rare: f64,
    epic: f64,
    legendary: f64,
    godly: f64,
}

impl TryFrom<TierTableConfig> for TierTable {
    type Error = Error;

    fn try_from(c: TierTableConfig) -> Result<Self> {
        TierTable::new([c.common, c.rare, c.epic, c.legendary, c.godly])
    }
}

impl From<TierTable> for TierTableConfig {
    fn from(table: TierTable) -> Self {
        let [common, rare, epic, legendary, godly] = table.probabilities;
        Self {
            common,
            rare,
            epic,
            legendary,
            godly,
        }
    }
}
