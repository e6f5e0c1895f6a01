// ABOUTME: Closed-form statistics of the spin-until-exit stopping process.
// ABOUTME: Expected spins and duration, the length curve, per-group hits, and target odds.

use crate::catalog::{clamp_non_negative, Catalog, Model, Odds};
use crate::geometric::{cdf, pmf, spins_for_cdf};
use crate::sim::MAX_RUN_LENGTH;
use crate::tier::Tier;
use serde::Serialize;
use tracing::{debug, warn};

/// Cumulative probability the length curve must reach before it stops.
pub const LENGTH_CURVE_TARGET_CDF: f64 = 0.95;

/// Number of length curve points used when the run never ends.
pub const DEFAULT_CURVE_POINTS: usize = 20;

/// Longest length curve; a rare exit stops the curve here short of the target CDF.
pub const MAX_CURVE_POINTS: usize = MAX_RUN_LENGTH;

/// What a group of items has in common.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKey {
    Tier(Tier),
    Weight(f64),
}

/// Items bucketed by tier (or by weight value) with their shared odds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    pub key: GroupKey,
    /// Names of member items, in catalog order.
    pub items: Vec<String>,
    /// Probability that a spin lands anywhere in this group.
    pub group_probability: f64,
    /// Probability of landing on one particular member.
    pub per_item_probability: f64,
    pub has_exit: bool,
    /// Exit groups: the group's own probability. Other groups: expected
    /// exercises before the end times the group's probability.
    pub expected_hits_per_workout: f64,
}

impl Group {
    /// Workouts expected before landing in this group once.
    pub fn workouts_until_hit(&self) -> f64 {
        if self.expected_hits_per_workout > 0.0 {
            1.0 / self.expected_hits_per_workout
        } else {
            f64::INFINITY
        }
    }
}

/// One point of the workout length distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LengthCurvePoint {
    pub spins: usize,
    pub probability_end_on_spin: f64,
    pub cumulative_probability: f64,
    /// Minutes of exercise completed if the run ends on this spin.
    pub duration_at_spin: f64,
}

/// Odds of a run ending on one specific exit item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetOdds {
    pub name: String,
    /// Per-spin probability of drawing the target.
    pub probability: f64,
    /// P(target | exit).
    pub given_exit: f64,
    pub expected_runs_until_target: f64,
}

/// A reference run length with its odds and duration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Milestone {
    pub spins: f64,
    /// Chance the run is over within `spins`.
    pub chance: f64,
    /// Exercise minutes completed by then.
    pub duration: f64,
}

/// Every derived quantity for a catalog.
///
/// Undefined expectations (zero exit probability) are `f64::INFINITY`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    pub total_weight: f64,
    pub exit_weight: f64,
    pub non_exit_weight: f64,
    pub uses_uniform_fallback: bool,
    pub exit_item_count: usize,
    pub exit_probability: f64,
    pub expected_spins_until_end: f64,
    pub expected_exercises_before_end: f64,
    pub expected_duration_per_spin: f64,
    pub expected_total_duration: f64,
    pub groups: Vec<Group>,
    pub length_curve: Vec<LengthCurvePoint>,
    pub target: Option<TargetOdds>,
    pub median_length: Milestone,
    pub typical_length: Milestone,
}

impl Stats {
    /// Chance the run ends within `spins` spins.
    pub fn chance_end_within(&self, spins: i64) -> f64 {
        cdf(self.exit_probability, spins)
    }

    /// The group holding items of `tier`, if occupied.
    pub fn tier_group(&self, tier: Tier) -> Option<&Group> {
        self.groups.iter().find(|g| g.key == GroupKey::Tier(tier))
    }
}

/// Compute all statistics for a catalog from scratch.
pub fn compute_stats(catalog: &Catalog) -> Stats {
    let probabilities = catalog.item_probabilities();
    let uses_uniform_fallback = catalog.uses_uniform_fallback();
    if uses_uniform_fallback {
        warn!("catalog has no usable weights, falling back to uniform odds");
    }

    let mut exit_probability = 0.0;
    let mut non_exit_probability = 0.0;
    let mut weighted_duration = 0.0;
    for (item, &prob) in catalog.items().iter().zip(&probabilities) {
        if item.is_exit {
            exit_probability += prob;
        } else {
            non_exit_probability += prob;
            weighted_duration += prob * item.clamped_duration();
        }
    }
    let exit_item_count = catalog.items().iter().filter(|i| i.is_exit).count();

    let (total_weight, exit_weight, non_exit_weight) = match catalog.model() {
        Model::Tiered => (
            exit_probability + non_exit_probability,
            exit_probability,
            non_exit_probability,
        ),
        Model::Weighted if uses_uniform_fallback => {
            let n = catalog.len();
            (n as f64, exit_item_count as f64, (n - exit_item_count) as f64)
        }
        Model::Weighted => {
            let exit: f64 = catalog
                .items()
                .iter()
                .filter(|i| i.is_exit)
                .map(|i| match i.odds {
                    Odds::Weight(w) => clamp_non_negative(w),
                    Odds::Tier(_) => 0.0,
                })
                .sum();
            let total = catalog.total_weight();
            (total, exit, total - exit)
        }
    };

    let p = exit_probability;
    let expected_spins_until_end = if p > 0.0 { 1.0 / p } else { f64::INFINITY };
    let expected_exercises_before_end = if p > 0.0 {
        (1.0 - p) / p
    } else {
        f64::INFINITY
    };
    let expected_duration_per_spin = if non_exit_probability > 0.0 {
        weighted_duration / non_exit_probability
    } else {
        0.0
    };
    let expected_total_duration = if expected_exercises_before_end.is_finite() {
        expected_exercises_before_end * expected_duration_per_spin
    } else {
        f64::INFINITY
    };

    let groups = build_groups(catalog, &probabilities, expected_exercises_before_end);
    let length_curve = build_length_curve(p, expected_duration_per_spin);

    let target = catalog
        .target()
        .and_then(|name| odds_for(catalog, &probabilities, p, name));

    let median_length = milestone(p, spins_for_cdf(p, 0.5), expected_duration_per_spin);
    let typical_length = milestone(
        p,
        expected_spins_until_end.round(),
        expected_duration_per_spin,
    );

    debug!(
        exit_probability = p,
        expected_spins = expected_spins_until_end,
        groups = groups.len(),
        "computed catalog statistics"
    );

    Stats {
        total_weight,
        exit_weight,
        non_exit_weight,
        uses_uniform_fallback,
        exit_item_count,
        exit_probability: p,
        expected_spins_until_end,
        expected_exercises_before_end,
        expected_duration_per_spin,
        expected_total_duration,
        groups,
        length_curve,
        target,
        median_length,
        typical_length,
    }
}

/// Conditional odds of a run ending on the item called `name`.
pub fn target_odds(catalog: &Catalog, name: &str) -> Option<TargetOdds> {
    let probabilities = catalog.item_probabilities();
    let p: f64 = catalog
        .items()
        .iter()
        .zip(&probabilities)
        .filter(|(item, _)| item.is_exit)
        .map(|(_, prob)| prob)
        .sum();
    odds_for(catalog, &probabilities, p, name)
}

fn odds_for(
    catalog: &Catalog,
    probabilities: &[f64],
    exit_probability: f64,
    name: &str,
) -> Option<TargetOdds> {
    let index = catalog.index_of(name)?;
    let probability = probabilities[index];
    let given_exit = if exit_probability > 0.0 {
        probability / exit_probability
    } else {
        0.0
    };
    let expected_runs_until_target = if given_exit > 0.0 {
        1.0 / given_exit
    } else {
        f64::INFINITY
    };
    Some(TargetOdds {
        name: name.to_string(),
        probability,
        given_exit,
        expected_runs_until_target,
    })
}

fn build_groups(
    catalog: &Catalog,
    probabilities: &[f64],
    expected_exercises_before_end: f64,
) -> Vec<Group> {
    // (key, member indices)
    let mut buckets: Vec<(GroupKey, Vec<usize>)> = Vec::new();
    for (i, item) in catalog.items().iter().enumerate() {
        let key = match item.odds {
            Odds::Tier(tier) => GroupKey::Tier(tier),
            Odds::Weight(w) => GroupKey::Weight(clamp_non_negative(w)),
        };
        match buckets.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(i),
            None => buckets.push((key, vec![i])),
        }
    }

    buckets.sort_by(|(a, _), (b, _)| match (a, b) {
        (GroupKey::Tier(x), GroupKey::Tier(y)) => x.cmp(y),
        (GroupKey::Weight(x), GroupKey::Weight(y)) => y.total_cmp(x),
        _ => std::cmp::Ordering::Equal,
    });

    buckets
        .into_iter()
        .map(|(key, members)| {
            let group_probability = match key {
                GroupKey::Tier(tier) => catalog.tiers().probability(tier),
                GroupKey::Weight(_) => members.iter().map(|&i| probabilities[i]).sum(),
            };
            let per_item_probability = group_probability / members.len() as f64;
            let has_exit = members.iter().any(|&i| catalog.items()[i].is_exit);

            let expected_hits_per_workout = if has_exit {
                group_probability
            } else if group_probability <= 0.0 {
                0.0
            } else if expected_exercises_before_end.is_finite() {
                expected_exercises_before_end * group_probability
            } else {
                f64::INFINITY
            };

            Group {
                key,
                items: members
                    .iter()
                    .map(|&i| catalog.items()[i].name.clone())
                    .collect(),
                group_probability,
                per_item_probability,
                has_exit,
                expected_hits_per_workout,
            }
        })
        .collect()
}

fn build_length_curve(p: f64, duration_per_spin: f64) -> Vec<LengthCurvePoint> {
    let k95 = spins_for_cdf(p, LENGTH_CURVE_TARGET_CDF);
    let points = if k95.is_finite() {
        (k95 as usize).min(MAX_CURVE_POINTS)
    } else {
        DEFAULT_CURVE_POINTS
    };

    (1..=points)
        .map(|spins| {
            let k = spins as i64;
            LengthCurvePoint {
                spins,
                probability_end_on_spin: pmf(p, k),
                cumulative_probability: cdf(p, k),
                duration_at_spin: (spins - 1) as f64 * duration_per_spin,
            }
        })
        .collect()
}

fn milestone(p: f64, spins: f64, duration_per_spin: f64) -> Milestone {
    if !spins.is_finite() {
        return Milestone {
            spins,
            chance: 0.0,
            duration: f64::INFINITY,
        };
    }
    Milestone {
        spins,
        chance: cdf(p, spins as i64),
        duration: (spins - 1.0).max(0.0) * duration_per_spin,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Item;
    use crate::tier::TierTable;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_workout_exit_probability() {
        let stats = compute_stats(&Catalog::workout());
        assert!(close(stats.exit_probability, 0.05));
        assert_eq!(stats.exit_item_count, 2);
        assert!(!stats.uses_uniform_fallback);
    }

    #[test]
    fn test_workout_expectations() {
        let stats = compute_stats(&Catalog::workout());
        assert!(stats.expected_spins_until_end.is_finite());
        assert_eq!(stats.expected_spins_until_end, 1.0 / stats.exit_probability);
        assert!(close(stats.expected_spins_until_end, 20.0));
        assert!(close(stats.expected_exercises_before_end, 19.0));

        // (0.5 * 10 + 0.3 * 1 + 0.15 * 10) / 0.95
        assert!(close(stats.expected_duration_per_spin, 6.8 / 0.95));
        assert!(close(stats.expected_total_duration, 136.0));
    }

    #[test]
    fn test_workout_groups() {
        let stats = compute_stats(&Catalog::workout());
        let keys: Vec<GroupKey> = stats.groups.iter().map(|g| g.key).collect();
        let expected: Vec<GroupKey> = Tier::ALL.iter().map(|&t| GroupKey::Tier(t)).collect();
        assert_eq!(keys, expected);

        let common = stats.tier_group(Tier::Common).unwrap();
        assert_eq!(common.items.len(), 3);
        assert!(close(common.per_item_probability, 0.5 / 3.0));
        assert!(!common.has_exit);
        assert!(close(common.expected_hits_per_workout, 9.5));

        let legendary = stats.tier_group(Tier::Legendary).unwrap();
        assert!(legendary.has_exit);
        assert!(close(legendary.expected_hits_per_workout, 0.04));
        assert!(close(legendary.workouts_until_hit(), 25.0));
    }

    #[test]
    fn test_workout_target() {
        let stats = compute_stats(&Catalog::workout());
        let target = stats.target.unwrap();
        assert_eq!(target.name, "shawarma");
        assert!(close(target.given_exit, 0.8));
        assert!(close(target.expected_runs_until_target, 1.25));
    }

    #[test]
    fn test_length_curve() {
        let stats = compute_stats(&Catalog::workout());
        assert_eq!(stats.length_curve.len(), 59);

        let first = stats.length_curve[0];
        assert_eq!(first.spins, 1);
        assert!(close(first.probability_end_on_spin, 0.05));
        assert_eq!(first.duration_at_spin, 0.0);

        let last = stats.length_curve.last().unwrap();
        assert!(last.cumulative_probability >= 0.95);

        let sum: f64 = stats
            .length_curve
            .iter()
            .map(|pt| pt.probability_end_on_spin)
            .sum();
        assert!((sum - last.cumulative_probability).abs() < 1e-9);
    }

    #[test]
    fn test_chance_end_within() {
        let stats = compute_stats(&Catalog::workout());
        assert_eq!(stats.chance_end_within(0), 0.0);
        let mut previous = 0.0;
        for k in 1..200 {
            let chance = stats.chance_end_within(k);
            assert!(chance >= previous);
            previous = chance;
        }
        assert!(previous > 0.9999);
    }

    #[test]
    fn test_milestones() {
        let stats = compute_stats(&Catalog::workout());
        assert_eq!(stats.median_length.spins, 14.0);
        assert!(stats.median_length.chance >= 0.5);
        assert!(close(
            stats.median_length.duration,
            13.0 * stats.expected_duration_per_spin
        ));
        assert_eq!(stats.typical_length.spins, 20.0);
    }

    #[test]
    fn test_legacy_weighted() {
        let stats = compute_stats(&Catalog::legacy_weighted());
        assert!(close(stats.exit_probability, 0.16));
        assert!(close(stats.expected_exercises_before_end, 5.25));
        assert_eq!(stats.total_weight, 6.25);
        assert_eq!(stats.exit_weight, 1.0);
        assert_eq!(stats.non_exit_weight, 5.25);
        assert!(close(stats.expected_duration_per_spin, 34.5 / 5.25));
    }

    #[test]
    fn test_legacy_weight_groups() {
        let stats = compute_stats(&Catalog::legacy_weighted());
        assert_eq!(stats.groups.len(), 2);

        let heavy = &stats.groups[0];
        assert_eq!(heavy.key, GroupKey::Weight(1.0));
        assert_eq!(heavy.items.len(), 6);
        assert!(heavy.has_exit);
        assert!(close(heavy.group_probability, 0.96));
        assert!(close(heavy.expected_hits_per_workout, heavy.group_probability));

        let light = &stats.groups[1];
        assert_eq!(light.key, GroupKey::Weight(0.25));
        assert!(!light.has_exit);
        assert!(close(light.expected_hits_per_workout, 5.25 * 0.04));
    }

    #[test]
    fn test_uniform_fallback_stats() {
        let items = vec![
            Item::weighted("a", 0.0, 4.0, false),
            Item::weighted("b", f64::NAN, 2.0, false),
            Item::weighted("c", -1.0, 0.0, true),
            Item::weighted("d", 0.0, 6.0, false),
        ];
        let stats = compute_stats(&Catalog::new(items).unwrap());
        assert!(stats.uses_uniform_fallback);
        assert!(close(stats.exit_probability, 0.25));
        assert_eq!(stats.total_weight, 4.0);
        assert_eq!(stats.exit_weight, 1.0);
        assert!(close(stats.expected_duration_per_spin, 4.0));
    }

    #[test]
    fn test_no_exit_is_infinite() {
        let tiers = TierTable::new([0.6, 0.4, 0.0, 0.0, 0.0]).unwrap();
        let items = vec![
            Item::tiered("run", Tier::Common, 10.0, false),
            Item::tiered("plank", Tier::Rare, 1.0, false),
        ];
        let catalog = Catalog::with_tiers(items, tiers)
            .unwrap()
            .with_target("run")
            .unwrap();
        let stats = compute_stats(&catalog);

        assert_eq!(stats.exit_probability, 0.0);
        assert!(!stats.expected_spins_until_end.is_finite());
        assert!(stats.expected_spins_until_end > 0.0);
        assert!(stats.expected_exercises_before_end.is_infinite());
        assert!(stats.expected_total_duration.is_infinite());
        assert_eq!(stats.length_curve.len(), DEFAULT_CURVE_POINTS);
        assert!(stats
            .length_curve
            .iter()
            .all(|pt| pt.probability_end_on_spin == 0.0 && pt.cumulative_probability == 0.0));
        assert!(stats.groups.iter().all(|g| g.expected_hits_per_workout.is_infinite()));
        assert_eq!(stats.chance_end_within(100), 0.0);

        let target = stats.target.unwrap();
        assert_eq!(target.given_exit, 0.0);
        assert!(target.expected_runs_until_target.is_infinite());
        assert!(stats.median_length.duration.is_infinite());
    }

    #[test]
    fn test_exit_probability_custom_tiers() {
        let tiers = TierTable::new([0.4, 0.3, 0.2, 0.0, 0.1]).unwrap();
        let items = vec![
            Item::tiered("a", Tier::Common, 1.0, false),
            Item::tiered("b", Tier::Rare, 1.0, false),
            Item::tiered("c", Tier::Epic, 1.0, true),
            Item::tiered("d", Tier::Godly, 0.0, true),
        ];
        let stats = compute_stats(&Catalog::with_tiers(items, tiers).unwrap());
        assert!(close(stats.exit_probability, 0.3));
        assert!(close(stats.expected_spins_until_end, 1.0 / 0.3));
    }

    #[test]
    fn test_mixed_tier_duration_uses_item_odds() {
        // Rare holds an exercise and an exit: each item gets 0.25.
        let tiers = TierTable::new([0.5, 0.5, 0.0, 0.0, 0.0]).unwrap();
        let items = vec![
            Item::tiered("run", Tier::Common, 10.0, false),
            Item::tiered("plank", Tier::Rare, 2.0, false),
            Item::tiered("done", Tier::Rare, 0.0, true),
        ];
        let stats = compute_stats(&Catalog::with_tiers(items, tiers).unwrap());

        assert!(close(stats.exit_probability, 0.25));
        // (0.5 * 10 + 0.25 * 2) / 0.75
        assert!(close(stats.expected_duration_per_spin, 5.5 / 0.75));
        assert!(close(stats.expected_total_duration, 3.0 * 5.5 / 0.75));

        let rare = stats.tier_group(Tier::Rare).unwrap();
        assert!(rare.has_exit);
        assert!(close(rare.per_item_probability, 0.25));
    }

    #[test]
    fn test_rare_exit_curve_is_capped() {
        let items = vec![
            Item::weighted("run", 1.0, 10.0, false),
            Item::weighted("done", 1e-10, 0.0, true),
        ];
        let stats = compute_stats(&Catalog::new(items).unwrap());

        assert!(stats.expected_spins_until_end > 1e9);
        assert_eq!(stats.length_curve.len(), MAX_CURVE_POINTS);
        let last = stats.length_curve.last().unwrap();
        assert_eq!(last.spins, MAX_CURVE_POINTS);
        assert!(last.cumulative_probability < LENGTH_CURVE_TARGET_CDF);
        assert!(stats.median_length.spins.is_finite());
    }

    #[test]
    fn test_overflowing_weights_fall_back() {
        let items = vec![
            Item::weighted("run", f64::MAX, 10.0, false),
            Item::weighted("done", f64::MAX, 0.0, true),
        ];
        let stats = compute_stats(&Catalog::new(items).unwrap());

        assert!(stats.uses_uniform_fallback);
        assert!(close(stats.exit_probability, 0.5));
        assert!(close(stats.expected_spins_until_end, 2.0));
        assert_eq!(stats.total_weight, 2.0);
    }

    #[test]
    fn test_target_odds_any_item() {
        let catalog = Catalog::workout();
        let beer = target_odds(&catalog, "Shawarma + Beer").unwrap();
        assert!(close(beer.given_exit, 0.2));
        assert!(close(beer.expected_runs_until_target, 5.0));
        assert!(target_odds(&catalog, "missing").is_none());
    }

    #[test]
    fn test_stats_pure() {
        let catalog = Catalog::workout();
        assert_eq!(compute_stats(&catalog), compute_stats(&catalog));
    }
}
