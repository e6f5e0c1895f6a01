// ABOUTME: Monte Carlo simulation of whole workouts to cross-check the closed-form stats.
// ABOUTME: Runs draws until exit, tallies groups and run lengths, supports background cancellation.

use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::geometric::pmf;
use crate::sampler::{FastRng, Rng, Sampler};
use crate::stats::{compute_stats, GroupKey};
use serde::Serialize;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// A single run is abandoned after this many draws without an exit.
pub const MAX_RUN_LENGTH: usize = 1000;

/// Longest run length shown by [`SimResult::histogram_window`].
pub const HISTOGRAM_WINDOW: usize = 80;

/// Draw counts offered to users.
pub const TARGET_DRAW_CHOICES: [usize; 6] = [10, 100, 1_000, 10_000, 100_000, 1_000_000];

/// Draws between cancellation checks.
const CHUNK_DRAWS: usize = 4096;

/// Empirical versus nominal frequency of one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupFrequency {
    pub key: GroupKey,
    /// Nominal probability from the closed-form stats.
    pub expected: f64,
    /// Observed share of all draws.
    pub actual: f64,
    pub count: usize,
}

impl GroupFrequency {
    pub fn delta(&self) -> f64 {
        self.actual - self.expected
    }
}

/// Result of a Monte Carlo simulation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimResult {
    /// Individual draws across all runs.
    pub total_draws: usize,
    /// Completed (or aborted) runs.
    pub runs: usize,
    /// Runs that hit [`MAX_RUN_LENGTH`] without exiting.
    pub aborted_runs: usize,
    pub exit_draws: usize,
    pub group_frequencies: Vec<GroupFrequency>,
    /// Observed share of draws that were exits.
    pub exit_frequency: f64,
    pub expected_exit_probability: f64,
    /// Mean run length in draws.
    pub mean_length: f64,
    /// Population standard deviation of run length.
    pub std_dev: f64,
    pub expected_length: f64,
    /// Run length -> number of runs.
    pub length_histogram: BTreeMap<usize, usize>,
}

impl SimResult {
    /// Run-length counts for lengths 1..=min(longest, 80), zero-filled.
    pub fn histogram_window(&self) -> Vec<(usize, usize)> {
        let Some((&longest, _)) = self.length_histogram.last_key_value() else {
            return Vec::new();
        };
        (1..=longest.min(HISTOGRAM_WINDOW))
            .map(|len| (len, self.length_histogram.get(&len).copied().unwrap_or(0)))
            .collect()
    }

    /// Closed-form run counts over the same window as [`Self::histogram_window`].
    pub fn expected_histogram(&self) -> Vec<(usize, f64)> {
        self.histogram_window()
            .into_iter()
            .map(|(len, _)| {
                let expected = pmf(self.expected_exit_probability, len as i64) * self.runs as f64;
                (len, expected)
            })
            .collect()
    }

    /// Pearson chi-squared statistic of group counts against nominal odds.
    ///
    /// Groups with no nominal mass are skipped.
    pub fn chi_squared(&self) -> f64 {
        let n = self.total_draws as f64;
        self.group_frequencies
            .iter()
            .filter(|g| g.expected > 0.0)
            .map(|g| {
                let expected = g.expected * n;
                let diff = g.count as f64 - expected;
                diff * diff / expected
            })
            .sum()
    }

    /// Degrees of freedom for [`Self::chi_squared`].
    pub fn degrees_of_freedom(&self) -> usize {
        self.group_frequencies
            .iter()
            .filter(|g| g.expected > 0.0)
            .count()
            .saturating_sub(1)
    }

    /// Relative error of the observed exit frequency.
    pub fn exit_frequency_error(&self) -> f64 {
        relative_error(self.exit_frequency, self.expected_exit_probability)
    }

    /// Relative error of the observed mean run length.
    pub fn mean_length_error(&self) -> f64 {
        relative_error(self.mean_length, self.expected_length)
    }
}

fn relative_error(actual: f64, expected: f64) -> f64 {
    if expected.is_finite() && expected > 0.0 {
        (actual - expected).abs() / expected
    } else {
        f64::INFINITY
    }
}

/// Shared flag used to stop a simulation early.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A simulation running on a background thread.
pub struct SimHandle {
    token: CancelToken,
    handle: JoinHandle<Result<SimResult>>,
}

impl SimHandle {
    /// Ask the simulation to stop at its next checkpoint.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the background thread has returned; `join` will not block.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the simulation. Returns [`Error::Cancelled`] if it was stopped.
    pub fn join(self) -> Result<SimResult> {
        match self.handle.join() {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

/// Run a Monte Carlo simulation until at least `target_draws` draws are made.
///
/// # Arguments
/// * `catalog` - The items to draw from
/// * `target_draws` - Minimum number of individual draws across all runs
pub fn simulate(catalog: &Catalog, target_draws: usize) -> SimResult {
    simulate_with_rng(catalog, target_draws, &mut FastRng::new())
}

/// Run a simulation with a seeded RNG for reproducibility.
pub fn simulate_seeded(catalog: &Catalog, target_draws: usize, seed: u64) -> SimResult {
    simulate_with_rng(catalog, target_draws, &mut FastRng::with_seed(seed))
}

/// Run a simulation with a custom RNG.
pub fn simulate_with_rng(catalog: &Catalog, target_draws: usize, rng: &mut impl Rng) -> SimResult {
    match run(catalog, target_draws, rng, || Ok::<(), Infallible>(())) {
        Ok(result) => result,
        Err(never) => match never {},
    }
}

/// Run a simulation that stops with [`Error::Cancelled`] once `token` is set.
pub fn simulate_cancellable(
    catalog: &Catalog,
    target_draws: usize,
    rng: &mut impl Rng,
    token: &CancelToken,
) -> Result<SimResult> {
    run(catalog, target_draws, rng, || {
        if token.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    })
}

/// Start a simulation on a background thread.
pub fn spawn_simulation(catalog: Catalog, target_draws: usize, seed: Option<u64>) -> SimHandle {
    let token = CancelToken::new();
    let thread_token = token.clone();
    let handle = thread::spawn(move || {
        let mut rng = match seed {
            Some(seed) => FastRng::with_seed(seed),
            None => FastRng::new(),
        };
        simulate_cancellable(&catalog, target_draws, &mut rng, &thread_token)
    });
    SimHandle { token, handle }
}

/// Core loop. `checkpoint` runs between chunks of draws and at the end;
/// an error from it aborts the simulation.
fn run<E>(
    catalog: &Catalog,
    target_draws: usize,
    rng: &mut impl Rng,
    mut checkpoint: impl FnMut() -> std::result::Result<(), E>,
) -> std::result::Result<SimResult, E> {
    let stats = compute_stats(catalog);
    let sampler = Sampler::new(catalog);

    // Group index of every item.
    let item_group: Vec<usize> = catalog
        .items()
        .iter()
        .map(|item| {
            stats
                .groups
                .iter()
                .position(|g| g.items.contains(&item.name))
                .unwrap_or(0)
        })
        .collect();

    let mut group_counts = vec![0usize; stats.groups.len()];
    let mut length_histogram: BTreeMap<usize, usize> = BTreeMap::new();
    let mut total_draws = 0usize;
    let mut runs = 0usize;
    let mut aborted_runs = 0usize;
    let mut exit_draws = 0usize;
    let mut sum_sq = 0f64;
    let mut next_check = CHUNK_DRAWS;

    while total_draws < target_draws {
        if total_draws >= next_check {
            checkpoint().inspect_err(|_| debug!(total_draws, runs, "simulation stopped"))?;
            next_check = total_draws + CHUNK_DRAWS;
        }

        runs += 1;
        let mut length = 0usize;
        loop {
            let index = sampler.draw(rng);
            length += 1;
            group_counts[item_group[index]] += 1;

            if catalog.items()[index].is_exit {
                exit_draws += 1;
                break;
            }
            if length >= MAX_RUN_LENGTH {
                aborted_runs += 1;
                break;
            }
        }

        total_draws += length;
        sum_sq += (length * length) as f64;
        *length_histogram.entry(length).or_insert(0) += 1;
    }

    checkpoint()?;
    if aborted_runs > 0 {
        warn!(
            aborted_runs,
            max_run_length = MAX_RUN_LENGTH,
            "runs stopped at the safety cap without an exit"
        );
    }

    let n = total_draws as f64;
    let share = |count: usize| if total_draws > 0 { count as f64 / n } else { 0.0 };

    let group_frequencies = stats
        .groups
        .iter()
        .zip(&group_counts)
        .map(|(group, &count)| GroupFrequency {
            key: group.key,
            expected: group.group_probability,
            actual: share(count),
            count,
        })
        .collect();

    let (mean_length, std_dev) = if runs > 0 {
        let mean = n / runs as f64;
        let variance = sum_sq / runs as f64 - mean * mean;
        (mean, variance.max(0.0).sqrt())
    } else {
        (0.0, 0.0)
    };

    debug!(total_draws, runs, mean_length, "simulation finished");

    Ok(SimResult {
        total_draws,
        runs,
        aborted_runs,
        exit_draws,
        group_frequencies,
        exit_frequency: share(exit_draws),
        expected_exit_probability: stats.exit_probability,
        mean_length,
        std_dev,
        expected_length: stats.expected_spins_until_end,
        length_histogram,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Item;
    use crate::sampler::tests::TestRng;
    use crate::tier::{Tier, TierTable};

    fn coin_catalog() -> Catalog {
        Catalog::new(vec![
            Item::weighted("burpees", 1.0, 2.0, false),
            Item::weighted("done", 1.0, 0.0, true),
        ])
        .unwrap()
    }

    #[test]
    fn test_simulate_scripted_runs() {
        // roll * 2.0 < 1.0 picks burpees, otherwise done: runs of length 3 then 1
        let mut rng = TestRng::new(vec![0.1, 0.2, 0.9, 0.7], vec![0]);
        let result = simulate_with_rng(&coin_catalog(), 4, &mut rng);

        assert_eq!(result.total_draws, 4);
        assert_eq!(result.runs, 2);
        assert_eq!(result.exit_draws, 2);
        assert_eq!(result.length_histogram[&3], 1);
        assert_eq!(result.length_histogram[&1], 1);
        assert_eq!(result.mean_length, 2.0);
        assert_eq!(result.std_dev, 1.0);
        assert_eq!(result.exit_frequency, 0.5);
        assert_eq!(result.group_frequencies.len(), 1);
        assert_eq!(result.group_frequencies[0].count, 4);
    }

    #[test]
    fn test_simulate_finishes_last_run() {
        // Target reached mid-run: the run still completes.
        let mut rng = TestRng::new(vec![0.1, 0.1, 0.1, 0.9], vec![0]);
        let result = simulate_with_rng(&coin_catalog(), 2, &mut rng);
        assert_eq!(result.runs, 1);
        assert_eq!(result.total_draws, 4);
    }

    #[test]
    fn test_simulate_zero_target() {
        let result = simulate_seeded(&Catalog::workout(), 0, 1);
        assert_eq!(result.total_draws, 0);
        assert_eq!(result.runs, 0);
        assert_eq!(result.mean_length, 0.0);
        assert!(result.histogram_window().is_empty());
        assert!(result.group_frequencies.iter().all(|g| g.actual == 0.0));
    }

    #[test]
    fn test_simulate_seeded_reproducible() {
        let result1 = simulate_seeded(&Catalog::workout(), 5000, 42);
        let result2 = simulate_seeded(&Catalog::workout(), 5000, 42);
        assert_eq!(result1, result2);
    }

    #[test]
    fn test_safety_cap_without_exit() {
        let tiers = TierTable::new([0.6, 0.4, 0.0, 0.0, 0.0]).unwrap();
        let catalog = Catalog::with_tiers(
            vec![
                Item::tiered("run", Tier::Common, 10.0, false),
                Item::tiered("plank", Tier::Rare, 1.0, false),
            ],
            tiers,
        )
        .unwrap();
        let result = simulate_seeded(&catalog, 2500, 3);

        assert_eq!(result.runs, 3);
        assert_eq!(result.aborted_runs, 3);
        assert_eq!(result.total_draws, 3 * MAX_RUN_LENGTH);
        assert_eq!(result.mean_length, MAX_RUN_LENGTH as f64);
        assert!(result.expected_length.is_infinite());
        assert!(result.mean_length_error().is_infinite());
    }

    #[test]
    fn test_convergence_one_million() {
        let result = simulate_seeded(&Catalog::workout(), 1_000_000, 2024);

        assert!(result.total_draws >= 1_000_000);
        assert_eq!(result.aborted_runs, 0);
        assert!((result.exit_frequency - 0.05).abs() < 0.005);
        assert!(result.exit_frequency_error() < 0.1);
        assert!(result.mean_length_error() < 0.02);
        assert!((result.mean_length - 20.0).abs() < 0.4);
        // Geometric std dev: sqrt(1 - p) / p ≈ 19.49
        assert!((result.std_dev - 19.49).abs() < 1.0);
    }

    #[test]
    fn test_tier_frequencies_fit() {
        let result = simulate_seeded(&Catalog::workout(), 20_000, 7);

        assert_eq!(result.group_frequencies.len(), 5);
        assert_eq!(result.degrees_of_freedom(), 4);
        for group in &result.group_frequencies {
            assert!(group.delta().abs() < 0.02, "{:?}", group);
        }
        // Critical value for 4 degrees of freedom at the 0.01 level.
        assert!(result.chi_squared() < 13.277);
    }

    #[test]
    fn test_legacy_frequencies_fit() {
        let result = simulate_seeded(&Catalog::legacy_weighted(), 20_000, 11);
        assert_eq!(result.degrees_of_freedom(), 1);
        assert!((result.exit_frequency - 0.16).abs() < 0.015);
        // Critical value for 1 degree of freedom at the 0.01 level.
        assert!(result.chi_squared() < 6.635);
    }

    #[test]
    fn test_histogram_window() {
        let result = simulate_seeded(&Catalog::workout(), 100_000, 5);
        let window = result.histogram_window();

        assert_eq!(window.len(), HISTOGRAM_WINDOW);
        assert_eq!(window[0].0, 1);
        let counted: usize = window.iter().map(|(_, c)| c).sum();
        assert!(counted <= result.runs);

        let expected = result.expected_histogram();
        assert_eq!(expected.len(), window.len());
        assert!((expected[0].1 - 0.05 * result.runs as f64).abs() < 1e-6);
    }

    #[test]
    fn test_histogram_window_zero_fills() {
        let mut rng = TestRng::new(vec![0.1, 0.1, 0.9], vec![0]);
        let result = simulate_with_rng(&coin_catalog(), 1, &mut rng);
        assert_eq!(result.histogram_window(), vec![(1, 0), (2, 0), (3, 1)]);
    }

    #[test]
    fn test_cancelled_before_start() {
        let token = CancelToken::new();
        token.cancel();
        let mut rng = FastRng::with_seed(1);
        let result = simulate_cancellable(&Catalog::workout(), 1_000_000, &mut rng, &token);
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn test_not_cancelled_completes() {
        let token = CancelToken::new();
        let mut rng = FastRng::with_seed(1);
        let result = simulate_cancellable(&Catalog::workout(), 10_000, &mut rng, &token).unwrap();
        assert!(result.total_draws >= 10_000);
    }

    #[test]
    fn test_spawn_matches_seeded() {
        let handle = spawn_simulation(Catalog::workout(), 10_000, Some(99));
        let background = handle.join().unwrap();
        assert_eq!(background, simulate_seeded(&Catalog::workout(), 10_000, 99));
    }

    #[test]
    fn test_spawn_reports_finished() {
        let handle = spawn_simulation(Catalog::legacy_weighted(), 1_000, Some(3));
        while !handle.is_finished() {
            thread::yield_now();
        }
        assert!(handle.join().unwrap().total_draws >= 1_000);
    }

    #[test]
    fn test_spawn_cancel() {
        let handle = spawn_simulation(Catalog::workout(), usize::MAX, None);
        handle.cancel();
        assert!(matches!(handle.join(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_target_choices() {
        assert_eq!(TARGET_DRAW_CHOICES.first(), Some(&10));
        assert_eq!(TARGET_DRAW_CHOICES.last(), Some(&1_000_000));
    }
}
