// ABOUTME: Weighted random selection of a single catalog item per spin.
// ABOUTME: Two-stage tier-then-item draws, legacy weight walks, and the RNG abstraction.

use crate::catalog::{clamp_non_negative, usable_total, Catalog, Model, Odds};
use crate::tier::Tier;

/// Trait for random number generation, allowing for testing with fixed values.
pub trait Rng {
    /// Generate a uniform random number in [0, 1).
    fn next_f64(&mut self) -> f64;

    /// Generate a uniform random index in [0, n). `n` must be non-zero.
    fn below(&mut self, n: usize) -> usize;
}

/// Default RNG using fastrand.
pub struct FastRng(fastrand::Rng);

impl FastRng {
    pub fn new() -> Self {
        Self(fastrand::Rng::new())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self(fastrand::Rng::with_seed(seed))
    }
}

impl Default for FastRng {
    fn default() -> Self {
        Self::new()
    }
}

impl Rng for FastRng {
    fn next_f64(&mut self) -> f64 {
        self.0.f64()
    }

    fn below(&mut self, n: usize) -> usize {
        self.0.usize(..n)
    }
}

/// Draw one item index with the default RNG.
pub fn draw_one(catalog: &Catalog) -> usize {
    draw_with_rng(catalog, &mut FastRng::new())
}

/// Draw one item index with a custom RNG.
///
/// The probability of returning `i` equals item `i`'s configured probability.
pub fn draw_with_rng(catalog: &Catalog, rng: &mut impl Rng) -> usize {
    Sampler::new(catalog).draw(rng)
}

/// A catalog prepared for repeated draws.
#[derive(Debug, Clone)]
pub struct Sampler<'a> {
    catalog: &'a Catalog,
    plan: Plan,
}

#[derive(Debug, Clone)]
enum Plan {
    /// Tiers with positive probability, in canonical order, with their member indices.
    Tiered(Vec<(f64, Vec<usize>)>),
    /// Clamped weight of each item and their total.
    Weighted { weights: Vec<f64>, total: f64 },
    Uniform,
}

impl<'a> Sampler<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        let plan = match catalog.model() {
            Model::Tiered => {
                let mut buckets: [Vec<usize>; 5] = Default::default();
                for (i, item) in catalog.items().iter().enumerate() {
                    if let Odds::Tier(tier) = item.odds {
                        buckets[tier.index()].push(i);
                    }
                }
                let tiers = Tier::ALL
                    .iter()
                    .zip(buckets)
                    .map(|(&tier, members)| (catalog.tiers().probability(tier), members))
                    .filter(|(probability, members)| *probability > 0.0 && !members.is_empty())
                    .collect();
                Plan::Tiered(tiers)
            }
            Model::Weighted => {
                let weights: Vec<f64> = catalog
                    .items()
                    .iter()
                    .map(|item| match item.odds {
                        Odds::Weight(w) => clamp_non_negative(w),
                        Odds::Tier(_) => 0.0,
                    })
                    .collect();
                let total: f64 = weights.iter().sum();
                if usable_total(total) {
                    Plan::Weighted { weights, total }
                } else {
                    Plan::Uniform
                }
            }
        };
        Self { catalog, plan }
    }

    /// Draw one item index.
    pub fn draw(&self, rng: &mut impl Rng) -> usize {
        match &self.plan {
            Plan::Tiered(tiers) => self.draw_tiered(tiers, rng),
            Plan::Weighted { weights, total } => draw_weighted(weights, *total, rng),
            Plan::Uniform => rng.below(self.catalog.len()),
        }
    }

    fn draw_tiered(&self, tiers: &[(f64, Vec<usize>)], rng: &mut impl Rng) -> usize {
        let roll = rng.next_f64();
        let mut cumulative = 0.0;
        for (probability, members) in tiers {
            cumulative += probability;
            if roll < cumulative {
                return members[rng.below(members.len())];
            }
        }

        // Floating-point residue: the table sums to one only within tolerance.
        match tiers.last() {
            Some((_, members)) => members[rng.below(members.len())],
            None => rng.below(self.catalog.len()),
        }
    }
}

fn draw_weighted(weights: &[f64], total: f64, rng: &mut impl Rng) -> usize {
    let roll = rng.next_f64() * total;
    let mut cumulative = 0.0;
    let mut last_positive = 0;
    for (i, &weight) in weights.iter().enumerate() {
        if weight <= 0.0 {
            continue;
        }
        cumulative += weight;
        last_positive = i;
        if roll < cumulative {
            return i;
        }
    }

    // Floating-point residue: roll landed at or past the accumulated total.
    last_positive
}
