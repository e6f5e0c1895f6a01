// ABOUTME: Core library for the workout roulette probability engine.
// ABOUTME: Weighted sampling, closed-form geometric statistics, and Monte Carlo validation.

//! # Roulette
//!
//! Spin a catalog of exercises until an exit item comes up, and know the odds
//! of every outcome before you do.
//!
//! ## Quick Start
//!
//! ```
//! use roulette::{compute_stats, draw_one, run_simulation, Catalog};
//!
//! let catalog = Catalog::workout();
//!
//! // Spin once
//! let index = draw_one(&catalog);
//! println!("{}", catalog.items()[index].name);
//!
//! // Closed-form statistics
//! let stats = compute_stats(&catalog);
//! println!("Expected spins: {:.1}", stats.expected_spins_until_end); // 20.0
//!
//! // Monte Carlo cross-check
//! let sim = run_simulation(&catalog, 10_000, Some(42));
//! println!("Mean length: {:.2}", sim.mean_length); // ~20
//! ```
//!
//! ## Selection models
//!
//! - Tiered: each item belongs to a rarity tier (Common 50%, Rare 30%,
//!   Epic 15%, Legendary 4%, Godly 1%) and shares the tier's odds equally.
//! - Weighted: each item carries a raw weight, normalized over the catalog,
//!   falling back to uniform odds when no weight is usable.
//!
//! Expected values that do not exist (no exit item) are `f64::INFINITY`.

pub mod catalog;
pub mod error;
pub mod geometric;
pub mod sampler;
pub mod sim;
pub mod stats;
pub mod tier;

pub use catalog::{Catalog, Item, Model, Odds};
pub use error::{Error, Result};
pub use geometric::{format_expected, format_percent, spins_for_cdf};
pub use sampler::{draw_one, draw_with_rng, FastRng, Rng, Sampler};
pub use sim::{
    simulate, simulate_cancellable, simulate_seeded, simulate_with_rng, spawn_simulation,
    CancelToken, GroupFrequency, SimHandle, SimResult, TARGET_DRAW_CHOICES,
};
pub use stats::{
    compute_stats, target_odds, Group, GroupKey, LengthCurvePoint, Milestone, Stats, TargetOdds,
};
pub use tier::{Tier, TierTable};

/// Run a Monte Carlo simulation, seeded when `seed` is given.
///
/// # Examples
///
/// ```
/// use roulette::{run_simulation, Catalog};
///
/// let a = run_simulation(&Catalog::workout(), 1_000, Some(7));
/// let b = run_simulation(&Catalog::workout(), 1_000, Some(7));
/// assert_eq!(a.mean_length, b.mean_length);
/// ```
pub fn run_simulation(catalog: &Catalog, target_draws: usize, seed: Option<u64>) -> SimResult {
    match seed {
        Some(seed) => simulate_seeded(catalog, target_draws, seed),
        None => simulate(catalog, target_draws),
    }
}

/// Spin `count` times with one prepared sampler.
///
/// # Examples
///
/// ```
/// use roulette::{spin_many, Catalog, FastRng};
///
/// let mut rng = FastRng::with_seed(42);
/// let picks = spin_many(&Catalog::workout(), 5, &mut rng);
/// assert_eq!(picks.len(), 5);
/// ```
pub fn spin_many(catalog: &Catalog, count: usize, rng: &mut impl Rng) -> Vec<usize> {
    let sampler = Sampler::new(catalog);
    (0..count).map(|_| sampler.draw(rng)).collect()
}
