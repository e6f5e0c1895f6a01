// ABOUTME: Exercise items and the validated catalog the engine operates on.
// ABOUTME: Handles TOML loading, the built-in catalogs, shuffling, and per-item odds.

use crate::error::{Error, Result};
use crate::sampler::Rng;
use crate::tier::{Tier, TierTable};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// How an item's selection probability is determined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Odds {
    /// Member of a rarity tier; shares the tier's probability equally.
    Tier(Tier),
    /// Raw relative weight (legacy variant), normalized over the catalog.
    Weight(f64),
}

/// A single exercise (or reward) that can be landed on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub name: String,
    pub odds: Odds,
    /// Minutes spent performing the item.
    pub duration: f64,
    /// Landing on this item ends the workout.
    pub is_exit: bool,
}

impl Item {
    pub fn tiered(name: impl Into<String>, tier: Tier, duration: f64, is_exit: bool) -> Self {
        Self {
            name: name.into(),
            odds: Odds::Tier(tier),
            duration,
            is_exit,
        }
    }

    pub fn weighted(name: impl Into<String>, weight: f64, duration: f64, is_exit: bool) -> Self {
        Self {
            name: name.into(),
            odds: Odds::Weight(weight),
            duration,
            is_exit,
        }
    }

    /// Duration clamped to a finite, non-negative value.
    pub fn clamped_duration(&self) -> f64 {
        clamp_non_negative(self.duration)
    }
}

/// Clamp a weight or duration to be finite and non-negative.
pub fn clamp_non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Whether a summed weight can be normalized against.
pub(crate) fn usable_total(total: f64) -> bool {
    total.is_finite() && total > 0.0
}

/// The selection model a catalog uses. All items in a catalog share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    Tiered,
    Weighted,
}

/// A non-empty, validated list of items plus the tier table it is drawn with.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    items: Vec<Item>,
    tiers: TierTable,
    target: Option<String>,
}

impl Catalog {
    /// Build a catalog using the default tier table.
    pub fn new(items: Vec<Item>) -> Result<Self> {
        Self::with_tiers(items, TierTable::default())
    }

    /// Build a catalog with an explicit tier table.
    pub fn with_tiers(items: Vec<Item>, tiers: TierTable) -> Result<Self> {
        if items.is_empty() {
            return Err(Error::EmptyCatalog);
        }

        let mut seen = HashSet::new();
        for item in &items {
            if !seen.insert(item.name.as_str()) {
                return Err(Error::DuplicateItem(item.name.clone()));
            }
        }

        let tiered = matches!(items[0].odds, Odds::Tier(_));
        if items
            .iter()
            .any(|item| matches!(item.odds, Odds::Tier(_)) != tiered)
        {
            return Err(Error::MixedOdds);
        }

        if tiered {
            if let Some(&tier) = Tier::ALL.iter().find(|&&tier| {
                tiers.probability(tier) > 0.0
                    && !items.iter().any(|item| item.odds == Odds::Tier(tier))
            }) {
                return Err(Error::EmptyTier(tier));
            }
        }

        Ok(Self {
            items,
            tiers,
            target: None,
        })
    }

    /// Name the exit item whose conditional odds should be reported.
    pub fn with_target(mut self, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if self.index_of(&name).is_none() {
            return Err(Error::UnknownTarget(name));
        }
        self.target = Some(name);
        Ok(self)
    }

    /// The tier-based catalog the roulette ships with.
    pub fn workout() -> Self {
        let items = vec![
            Item::tiered("10 mins run", Tier::Common, 10.0, false),
            Item::tiered("10 mins row (cardio)", Tier::Common, 10.0, false),
            Item::tiered("10 mins cycle", Tier::Common, 10.0, false),
            Item::tiered("1 min battle ropes", Tier::Rare, 1.0, false),
            Item::tiered("1 min pushups", Tier::Rare, 1.0, false),
            Item::tiered("1 min plank", Tier::Rare, 1.0, false),
            Item::tiered("10 mins squats", Tier::Epic, 10.0, false),
            Item::tiered("10 mins bench press", Tier::Epic, 10.0, false),
            Item::tiered("10 mins rows (strength)", Tier::Epic, 10.0, false),
            Item::tiered("shawarma", Tier::Legendary, 0.0, true),
            Item::tiered("Shawarma + Beer", Tier::Godly, 0.0, true),
        ];
        Self {
            items,
            tiers: TierTable::default(),
            target: Some("shawarma".to_string()),
        }
    }

    /// The earlier weight-based catalog.
    pub fn legacy_weighted() -> Self {
        let items = vec![
            Item::weighted("10 mins run", 1.0, 10.0, false),
            Item::weighted("10 mins row", 1.0, 10.0, false),
            Item::weighted("10 mins cycle", 1.0, 10.0, false),
            Item::weighted("1 min pushups", 1.0, 1.0, false),
            Item::weighted("1 min plank", 1.0, 1.0, false),
            Item::weighted("10 mins squats", 0.25, 10.0, false),
            Item::weighted("shawarma", 1.0, 0.0, true),
        ];
        Self {
            items,
            tiers: TierTable::default(),
            target: Some("shawarma".to_string()),
        }
    }

    /// Parse a catalog from TOML.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: CatalogConfig =
            toml::from_str(input).map_err(|e| Error::Config(e.to_string()))?;
        config.into_catalog()
    }

    /// Load a catalog from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Return a copy with the items in random order (Fisher-Yates).
    pub fn shuffled(&self, rng: &mut impl Rng) -> Self {
        let mut items = self.items.clone();
        for i in (1..items.len()).rev() {
            let j = rng.below(i + 1);
            items.swap(i, j);
        }
        Self {
            items,
            tiers: self.tiers,
            target: self.target.clone(),
        }
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Always false; an empty catalog cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn tiers(&self) -> &TierTable {
        &self.tiers
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn model(&self) -> Model {
        match self.items[0].odds {
            Odds::Tier(_) => Model::Tiered,
            Odds::Weight(_) => Model::Weighted,
        }
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.items.iter().position(|item| item.name == name)
    }

    /// Number of items occupying `tier`.
    pub fn tier_count(&self, tier: Tier) -> usize {
        self.items
            .iter()
            .filter(|item| item.odds == Odds::Tier(tier))
            .count()
    }

    /// Sum of clamped weights. Zero for tiered catalogs.
    pub fn total_weight(&self) -> f64 {
        self.items
            .iter()
            .map(|item| match item.odds {
                Odds::Weight(w) => clamp_non_negative(w),
                Odds::Tier(_) => 0.0,
            })
            .sum()
    }

    /// Whether a weighted catalog has no usable weight and draws uniformly.
    pub fn uses_uniform_fallback(&self) -> bool {
        self.model() == Model::Weighted && !usable_total(self.total_weight())
    }

    /// Probability of drawing each item, in list order.
    pub fn item_probabilities(&self) -> Vec<f64> {
        match self.model() {
            Model::Tiered => {
                let counts: Vec<usize> = Tier::ALL.iter().map(|&t| self.tier_count(t)).collect();
                self.items
                    .iter()
                    .map(|item| match item.odds {
                        Odds::Tier(tier) => {
                            self.tiers.probability(tier) / counts[tier.index()] as f64
                        }
                        Odds::Weight(_) => 0.0,
                    })
                    .collect()
            }
            Model::Weighted => {
                let total = self.total_weight();
                if !usable_total(total) {
                    let uniform = 1.0 / self.items.len() as f64;
                    return vec![uniform; self.items.len()];
                }
                self.items
                    .iter()
                    .map(|item| match item.odds {
                        Odds::Weight(w) => clamp_non_negative(w) / total,
                        Odds::Tier(_) => 0.0,
                    })
                    .collect()
            }
        }
    }
}

/// On-disk shape of a catalog.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogConfig {
    target: Option<String>,
    tiers: Option<TierTable>,
    items: Vec<ItemConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ItemConfig {
    name: String,
    tier: Option<Tier>,
    weight: Option<f64>,
    #[serde(default)]
    duration: f64,
    #[serde(default)]
    exit: bool,
}

impl CatalogConfig {
    fn into_catalog(self) -> Result<Catalog> {
        let items = self
            .items
            .into_iter()
            .map(ItemConfig::into_item)
            .collect::<Result<Vec<_>>>()?;

        let catalog = Catalog::with_tiers(items, self.tiers.unwrap_or_default())?;
        match self.target {
            Some(target) => catalog.with_target(target),
            None => Ok(catalog),
        }
    }
}

impl ItemConfig {
    fn into_item(self) -> Result<Item> {
        let odds = match (self.tier, self.weight) {
            (Some(tier), None) => Odds::Tier(tier),
            (None, Some(weight)) => Odds::Weight(weight),
            _ => {
                return Err(Error::Config(format!(
                    "item '{}' needs exactly one of `tier` or `weight`",
                    self.name
                )))
            }
        };
        Ok(Item {
            name: self.name,
            odds,
            duration: self.duration,
            is_exit: self.exit,
        })
    }
}
