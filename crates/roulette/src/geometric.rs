// ABOUTME: Closed-form helpers for the geometric distribution of workout length.
// ABOUTME: CDF, PMF, inverse-CDF search, and display formatting for probabilities.

/// Upper clamp for inverse-CDF targets so `ln(1 - target)` stays finite.
const MAX_TARGET_CDF: f64 = 0.999_999;

/// Cumulative probability P(L ≤ k) that a run ends within `k` spins.
///
/// Returns 0 for `k <= 0` or `p <= 0`.
pub fn cdf(p: f64, k: i64) -> f64 {
    if p <= 0.0 || k <= 0 {
        return 0.0;
    }
    1.0 - (1.0 - p).powf(k as f64)
}

/// Point probability P(L = k) that a run ends on exactly spin `k`.
pub fn pmf(p: f64, k: i64) -> f64 {
    if p <= 0.0 || k < 1 {
        return 0.0;
    }
    (1.0 - p).powf((k - 1) as f64) * p
}

/// Smallest `k >= 1` with `cdf(p, k) >= target`.
///
/// Infinite when `p` is non-finite or not positive; 1 when `p >= 1`.
/// The target is clamped into [0, 0.999999].
pub fn spins_for_cdf(p: f64, target: f64) -> f64 {
    if !p.is_finite() || p <= 0.0 {
        return f64::INFINITY;
    }
    if p >= 1.0 {
        return 1.0;
    }
    let target = target.clamp(0.0, MAX_TARGET_CDF);
    ((1.0 - target).ln() / (1.0 - p).ln()).ceil().max(1.0)
}

/// Format a probability as a percentage with precision that grows as it shrinks.
pub fn format_percent(probability: f64) -> String {
    if !probability.is_finite() || probability <= 0.0 {
        return "0%".to_string();
    }
    let pct = probability * 100.0;
    if pct >= 10.0 {
        format!("{:.1}%", pct)
    } else if pct >= 1.0 {
        format!("{:.2}%", pct)
    } else {
        format!("{:.3}%", pct)
    }
}

/// Format an expected value, rendering infinity as "∞".
pub fn format_expected(value: f64) -> String {
    if value.is_finite() {
        format!("{:.2}", value)
    } else {
        "∞".to_string()
    }
}
