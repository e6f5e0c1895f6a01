// ABOUTME: Python bindings for the roulette engine using PyO3.
// ABOUTME: Exposes draw_one, compute_stats, and run_simulation to Python.

use ::roulette as core;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use std::collections::BTreeMap;

fn catalog_from(toml: Option<&str>) -> PyResult<core::Catalog> {
    match toml {
        Some(input) => {
            core::Catalog::from_toml_str(input).map_err(|e| PyValueError::new_err(e.to_string()))
        }
        None => Ok(core::Catalog::workout()),
    }
}

fn rng_from(seed: Option<u64>) -> core::FastRng {
    match seed {
        Some(seed) => core::FastRng::with_seed(seed),
        None => core::FastRng::new(),
    }
}

fn group_label(key: &core::GroupKey) -> String {
    match key {
        core::GroupKey::Tier(tier) => tier.name().to_lowercase(),
        core::GroupKey::Weight(w) => format!("weight:{}", w),
    }
}

/// Items sharing a tier or weight.
#[pyclass]
#[derive(Clone)]
pub struct Group {
    #[pyo3(get)]
    pub label: String,
    #[pyo3(get)]
    pub items: Vec<String>,
    #[pyo3(get)]
    pub group_probability: f64,
    #[pyo3(get)]
    pub per_item_probability: f64,
    #[pyo3(get)]
    pub has_exit: bool,
    #[pyo3(get)]
    pub expected_hits_per_workout: f64,
}

#[pymethods]
impl Group {
    fn __repr__(&self) -> String {
        format!(
            "Group({}, p={:.4}, hits={:.2})",
            self.label, self.group_probability, self.expected_hits_per_workout
        )
    }
}

/// Closed-form statistics of a catalog. Undefined expectations are `inf`.
#[pyclass]
#[derive(Clone)]
pub struct Stats {
    #[pyo3(get)]
    pub exit_probability: f64,
    #[pyo3(get)]
    pub expected_spins_until_end: f64,
    #[pyo3(get)]
    pub expected_exercises_before_end: f64,
    #[pyo3(get)]
    pub expected_duration_per_spin: f64,
    #[pyo3(get)]
    pub expected_total_duration: f64,
    #[pyo3(get)]
    pub uses_uniform_fallback: bool,
    #[pyo3(get)]
    pub exit_item_count: usize,
    #[pyo3(get)]
    pub groups: Vec<Group>,
    /// (spins, probability_end_on_spin, cumulative_probability, duration_at_spin)
    #[pyo3(get)]
    pub length_curve: Vec<(usize, f64, f64, f64)>,
    #[pyo3(get)]
    pub target_given_exit: Option<f64>,
}

#[pymethods]
impl Stats {
    /// Chance the workout ends within `spins` spins.
    fn chance_end_within(&self, spins: i64) -> f64 {
        core::geometric::cdf(self.exit_probability, spins)
    }

    fn __repr__(&self) -> String {
        format!(
            "Stats(p={:.4}, spins={}, minutes={})",
            self.exit_probability,
            core::format_expected(self.expected_spins_until_end),
            core::format_expected(self.expected_total_duration)
        )
    }
}

impl From<core::Stats> for Stats {
    fn from(s: core::Stats) -> Self {
        Self {
            exit_probability: s.exit_probability,
            expected_spins_until_end: s.expected_spins_until_end,
            expected_exercises_before_end: s.expected_exercises_before_end,
            expected_duration_per_spin: s.expected_duration_per_spin,
            expected_total_duration: s.expected_total_duration,
            uses_uniform_fallback: s.uses_uniform_fallback,
            exit_item_count: s.exit_item_count,
            groups: s
                .groups
                .into_iter()
                .map(|g| Group {
                    label: group_label(&g.key),
                    items: g.items,
                    group_probability: g.group_probability,
                    per_item_probability: g.per_item_probability,
                    has_exit: g.has_exit,
                    expected_hits_per_workout: g.expected_hits_per_workout,
                })
                .collect(),
            length_curve: s
                .length_curve
                .iter()
                .map(|p| {
                    (
                        p.spins,
                        p.probability_end_on_spin,
                        p.cumulative_probability,
                        p.duration_at_spin,
                    )
                })
                .collect(),
            target_given_exit: s.target.map(|t| t.given_exit),
        }
    }
}

/// Result of a Monte Carlo simulation.
#[pyclass]
#[derive(Clone)]
pub struct SimResult {
    #[pyo3(get)]
    pub total_draws: usize,
    #[pyo3(get)]
    pub runs: usize,
    #[pyo3(get)]
    pub aborted_runs: usize,
    #[pyo3(get)]
    pub exit_frequency: f64,
    #[pyo3(get)]
    pub mean_length: f64,
    #[pyo3(get)]
    pub std_dev: f64,
    #[pyo3(get)]
    pub expected_length: f64,
    #[pyo3(get)]
    pub chi_squared: f64,
    /// label -> (expected, actual, count)
    #[pyo3(get)]
    pub groups: BTreeMap<String, (f64, f64, usize)>,
    #[pyo3(get)]
    pub length_histogram: BTreeMap<usize, usize>,
}

#[pymethods]
impl SimResult {
    fn __repr__(&self) -> String {
        format!(
            "SimResult(draws={}, runs={}, mean={:.2}, std_dev={:.2})",
            self.total_draws, self.runs, self.mean_length, self.std_dev
        )
    }
}

impl From<core::SimResult> for SimResult {
    fn from(r: core::SimResult) -> Self {
        Self {
            chi_squared: r.chi_squared(),
            total_draws: r.total_draws,
            runs: r.runs,
            aborted_runs: r.aborted_runs,
            exit_frequency: r.exit_frequency,
            mean_length: r.mean_length,
            std_dev: r.std_dev,
            expected_length: r.expected_length,
            groups: r
                .group_frequencies
                .iter()
                .map(|g| (group_label(&g.key), (g.expected, g.actual, g.count)))
                .collect(),
            length_histogram: r.length_histogram,
        }
    }
}

/// Spin once.
///
/// Args:
///     seed: Optional seed for a reproducible spin
///     catalog: Optional TOML catalog; the built-in workout catalog otherwise
///
/// Returns:
///     (index, name) of the selected item
///
/// Example:
///     >>> index, name = draw_one(42)
///     >>> print(name)
#[pyfunction]
#[pyo3(signature = (seed=None, catalog=None))]
fn draw_one(seed: Option<u64>, catalog: Option<&str>) -> PyResult<(usize, String)> {
    let catalog = catalog_from(catalog)?;
    let index = core::draw_with_rng(&catalog, &mut rng_from(seed));
    Ok((index, catalog.items()[index].name.clone()))
}

/// Compute the closed-form statistics of a catalog.
///
/// Example:
///     >>> stats = compute_stats()
///     >>> stats.expected_spins_until_end
///     20.0
#[pyfunction]
#[pyo3(signature = (catalog=None))]
fn compute_stats(catalog: Option<&str>) -> PyResult<Stats> {
    let catalog = catalog_from(catalog)?;
    Ok(core::compute_stats(&catalog).into())
}

/// Simulate workouts until at least `n` spins have been made.
///
/// The GIL is released while the simulation runs.
///
/// Example:
///     >>> sim = run_simulation(n=100000, seed=1)
///     >>> sim.mean_length  # ~20.0
#[pyfunction]
#[pyo3(signature = (n=10000, seed=None, catalog=None))]
fn run_simulation(
    py: Python<'_>,
    n: usize,
    seed: Option<u64>,
    catalog: Option<&str>,
) -> PyResult<SimResult> {
    let catalog = catalog_from(catalog)?;
    let result = py.allow_threads(|| core::run_simulation(&catalog, n, seed));
    Ok(result.into())
}

/// Python module for roulette.
#[pymodule]
fn roulette(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(draw_one, m)?)?;
    m.add_function(wrap_pyfunction!(compute_stats, m)?)?;
    m.add_function(wrap_pyfunction!(run_simulation, m)?)?;
    m.add_class::<Group>()?;
    m.add_class::<Stats>()?;
    m.add_class::<SimResult>()?;
    Ok(())
}
