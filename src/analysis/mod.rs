//! Performance analysis: trial classification, grouped aggregation,
//! and signal-detection statistics.
//!
//! The math — Macmillan-Kaplan corrected d-prime/bias, the
//! confusion-matrix helpers, the rounding rules, and the criteria
//! check — is carried over from the original analyzer this system
//! replaces, translated from a pandas-groupby pipeline into a plain
//! grouped-sum pipeline over the same classification table.

mod aggregate;
mod classify;
mod criteria;
mod ingest;
mod rename;

pub use aggregate::{aggregate, FilterOp, GroupKey, GroupSummary};
pub use classify::{classify, Indicator};
pub use criteria::{check_criteria, Criteria, CriteriaReport, PropCorrectClass, PropCorrectCriterion};
pub use ingest::{ingest_directory, IngestedTrial};
pub use rename::rewrite_legacy_block_name;

use statrs::distribution::{Beta, ContinuousCDF, Normal};

/// Standard normal inverse CDF, `Φ⁻¹`.
fn probit(p: f64) -> f64 {
    let normal = Normal::new(0.0, 1.0).expect("standard normal always constructs");
    normal.inverse_cdf(p)
}

/// Macmillan-Kaplan correction: clamp a rate away from 0/1 by
/// `1/(2*n)`, or by `1e-10` when `n == 0`.
fn corrected_rate(hits_or_fa: f64, n: f64) -> f64 {
    let nudge = if n > 0.0 { 1.0 / (2.0 * n) } else { 1e-10 };
    let rate = if n > 0.0 { hits_or_fa / n } else { 0.0 };
    if rate <= 0.0 {
        nudge
    } else if rate >= 1.0 {
        1.0 - nudge
    } else {
        rate
    }
}

/// Confusion-matrix d-prime and bias (β) from raw hit/miss/FA/CR
/// counts, Macmillan-Kaplan corrected. Returns `None` only when both
/// row sums are zero (no data at all to compute a rate from).
pub fn dprime(hit: u64, miss: u64, fa: u64, cr: u64) -> Option<(f64, f64)> {
    let signal_n = (hit + miss) as f64;
    let noise_n = (fa + cr) as f64;
    if signal_n == 0.0 && noise_n == 0.0 {
        return None;
    }
    let hit_rate = corrected_rate(hit as f64, signal_n);
    let fa_rate = corrected_rate(fa as f64, noise_n);
    let z_hit = probit(hit_rate);
    let z_fa = probit(fa_rate);
    let d = z_hit - z_fa;
    let c = -0.5 * (z_hit + z_fa);
    let beta = (d * c).exp();
    Some((d, beta))
}

/// `β` is only reportable once a group has accumulated at least 10
/// trials total.
pub fn beta_reportable(total_trials: u64) -> bool {
    total_trials >= 10
}

/// Plain accuracy: proportion of an NxN confusion matrix's diagonal
/// over its total. `None` when the matrix is empty.
pub fn accuracy(matrix: &[Vec<u64>]) -> Option<f64> {
    let total: u64 = matrix.iter().flatten().sum();
    if total == 0 {
        return None;
    }
    let correct: u64 = matrix
        .iter()
        .enumerate()
        .map(|(i, row)| row.get(i).copied().unwrap_or(0))
        .sum();
    Some(correct as f64 / total as f64)
}

/// Beta-distribution confidence interval around an accuracy
/// proportion: `Beta(x, n - x)`'s central `1 - alpha` interval,
/// i.e. `[ppf(alpha/2), ppf(1 - alpha/2)]`.
pub fn accuracy_confidence_interval(x: u64, n: u64, alpha: f64) -> Option<(f64, f64)> {
    if n == 0 || x > n {
        return None;
    }
    let beta = Beta::new(x as f64, (n - x) as f64).ok()?;
    Some((beta.inverse_cdf(alpha / 2.0), beta.inverse_cdf(1.0 - alpha / 2.0)))
}

/// Matthews correlation coefficient for a 2x2 confusion matrix
/// `[[hit, miss], [fa, cr]]`.
pub fn mcc(hit: u64, miss: u64, fa: u64, cr: u64) -> Option<f64> {
    let (tp, fn_, fp, tn) = (hit as f64, miss as f64, fa as f64, cr as f64);
    let denom = ((tp + fp) * (tp + fn_) * (tn + fp) * (tn + fn_)).sqrt();
    if denom == 0.0 {
        return None;
    }
    Some((tp * tn - fp * fn_) / denom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn dprime_worked_example() {
        let (d, _beta) = dprime(20, 5, 3, 22).unwrap();
        assert_relative_eq!(d, 2.0166, epsilon = 1e-3);
    }

    #[test]
    fn beta_reportability_boundary() {
        assert!(!beta_reportable(9));
        assert!(beta_reportable(10));
    }

    #[test]
    fn empty_confusion_matrix_has_no_accuracy() {
        assert_eq!(accuracy(&[vec![0, 0], vec![0, 0]]), None);
    }

    #[test]
    fn mcc_perfect_classifier() {
        let m = mcc(10, 0, 0, 10).unwrap();
        assert_relative_eq!(m, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn accuracy_confidence_interval_brackets_the_point_estimate() {
        let (lo, hi) = accuracy_confidence_interval(80, 100, 0.05).unwrap();
        assert!(lo < 0.8 && 0.8 < hi);
    }

    #[test]
    fn accuracy_confidence_interval_empty_sample_is_none() {
        assert_eq!(accuracy_confidence_interval(0, 0, 0.05), None);
    }
}
