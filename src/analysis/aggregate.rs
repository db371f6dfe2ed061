//! Grouped aggregation over ingested trials, plus filtering and the
//! proportion/d-prime columns computed per group.

use std::collections::BTreeMap;

use crate::analysis::classify::Indicator;
use crate::analysis::ingest::IngestedTrial;
use crate::analysis::{beta_reportable, dprime};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum GroupKey {
    Date(chrono::NaiveDate),
    Hour(u32),
    Block(String),
}

#[derive(Debug, Clone, Default)]
pub struct GroupSummary {
    pub key: Vec<GroupKey>,
    pub counts: BTreeMap<&'static str, u64>,
    pub trials: u64,
    pub probe_trials: u64,
    pub dprime: Option<f64>,
    pub dprime_nr: Option<f64>,
    pub bias: Option<f64>,
    pub s_plus_correct: Option<f64>,
    pub s_plus_correct_nr: Option<f64>,
    pub s_minus_correct: Option<f64>,
    pub s_minus_correct_nr: Option<f64>,
    pub total_correct: Option<f64>,
    pub total_correct_nr: Option<f64>,
    pub probe_s_plus_correct: Option<f64>,
    pub probe_s_plus_correct_nr: Option<f64>,
    pub probe_s_minus_correct: Option<f64>,
    pub probe_s_minus_correct_nr: Option<f64>,
    pub probe_total_correct: Option<f64>,
    pub probe_total_correct_nr: Option<f64>,
}

impl GroupSummary {
    /// S+ (with-NR variant when `use_nr`), mirroring the original
    /// analyzer's "Use NR" flag selecting the with-NR column variant.
    pub fn s_plus(&self, use_nr: bool) -> Option<f64> {
        if use_nr {
            self.s_plus_correct_nr
        } else {
            self.s_plus_correct
        }
    }

    pub fn s_minus(&self, use_nr: bool) -> Option<f64> {
        if use_nr {
            self.s_minus_correct_nr
        } else {
            self.s_minus_correct
        }
    }

    pub fn total(&self, use_nr: bool) -> Option<f64> {
        if use_nr {
            self.total_correct_nr
        } else {
            self.total_correct
        }
    }

    pub fn probe_s_plus(&self, use_nr: bool) -> Option<f64> {
        if use_nr {
            self.probe_s_plus_correct_nr
        } else {
            self.probe_s_plus_correct
        }
    }

    pub fn probe_s_minus(&self, use_nr: bool) -> Option<f64> {
        if use_nr {
            self.probe_s_minus_correct_nr
        } else {
            self.probe_s_minus_correct
        }
    }

    pub fn probe_total(&self, use_nr: bool) -> Option<f64> {
        if use_nr {
            self.probe_total_correct_nr
        } else {
            self.probe_total_correct
        }
    }
}

fn indicator_name(i: Indicator) -> &'static str {
    use Indicator::*;
    match i {
        ResponseHit => "Hit",
        ResponseMiss => "Miss",
        ResponseMissNr => "Miss_NR",
        ResponseFa => "FA",
        ResponseCr => "CR",
        ResponseCrNr => "CR_NR",
        ProbeHit => "probe_hit",
        ProbeMiss => "probe_Miss",
        ProbeMissNr => "probe_Miss_NR",
        ProbeFa => "probe_FA",
        ProbeCr => "probe_CR",
        ProbeCrNr => "probe_CR_NR",
    }
}

fn round5(v: f64) -> f64 {
    (v * 100_000.0).round() / 100_000.0
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

fn ratio(numerator: u64, denominator: u64) -> Option<f64> {
    if denominator == 0 {
        None
    } else {
        Some(round5(numerator as f64 / denominator as f64))
    }
}

/// A single-field equality/inequality filter, applied to a trial's
/// Date/Block/hour fields before grouping.
pub enum FilterOp {
    DateOnOrAfter(chrono::NaiveDate),
    BlockEquals(String),
}

fn key_for(trial: &IngestedTrial, keys: &[&str]) -> Vec<GroupKey> {
    keys.iter()
        .map(|k| match *k {
            "Date" => GroupKey::Date(trial.date),
            "hour" => GroupKey::Hour(trial.hour),
            "Block" => GroupKey::Block(trial.block.clone()),
            other => panic!("unknown group key: {other}"),
        })
        .collect()
}

/// Group trials by the given key names (any of `Date`, `hour`,
/// `Block`, in any combination/order) and compute the per-group
/// signal-detection summary. Insertion order of first appearance is
/// preserved.
pub fn aggregate(
    trials: &[IngestedTrial],
    group_keys: &[&str],
    filters: &[FilterOp],
) -> Vec<GroupSummary> {
    let mut order: Vec<Vec<GroupKey>> = Vec::new();
    let mut groups: BTreeMap<Vec<GroupKey>, BTreeMap<&'static str, u64>> = BTreeMap::new();
    let mut trial_totals: BTreeMap<Vec<GroupKey>, u64> = BTreeMap::new();
    let mut probe_totals: BTreeMap<Vec<GroupKey>, u64> = BTreeMap::new();

    'outer: for trial in trials {
        for f in filters {
            match f {
                FilterOp::DateOnOrAfter(d) if trial.date < *d => continue 'outer,
                FilterOp::BlockEquals(b) if &trial.block != b => continue 'outer,
                _ => {}
            }
        }
        let Some(indicator) = trial.indicator else {
            continue;
        };
        let key = key_for(trial, group_keys);
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        let entry = groups.entry(key.clone()).or_default();
        *entry.entry(indicator_name(indicator)).or_insert(0) += 1;
        *trial_totals.entry(key.clone()).or_insert(0) += 1;
        if matches!(
            indicator,
            Indicator::ProbeHit | Indicator::ProbeMiss | Indicator::ProbeMissNr | Indicator::ProbeFa | Indicator::ProbeCr | Indicator::ProbeCrNr
        ) {
            *probe_totals.entry(key.clone()).or_insert(0) += 1;
        }
    }

    order
        .into_iter()
        .map(|key| {
            let counts = groups.remove(&key).unwrap_or_default();
            let get = |name: &str| *counts.get(name).unwrap_or(&0);
            let hit = get("Hit");
            let miss = get("Miss");
            let miss_nr = get("Miss_NR");
            let fa = get("FA");
            let cr = get("CR");
            let cr_nr = get("CR_NR");
            let probe_hit = get("probe_hit");
            let probe_miss = get("probe_Miss");
            let probe_miss_nr = get("probe_Miss_NR");
            let probe_fa = get("probe_FA");
            let probe_cr = get("probe_CR");
            let probe_cr_nr = get("probe_CR_NR");
            let trials_total = trial_totals.get(&key).copied().unwrap_or(0);
            let probes_total = probe_totals.get(&key).copied().unwrap_or(0);

            let dp = dprime(hit, miss, fa, cr);
            let dp_nr = dprime(hit, miss + miss_nr, fa, cr + cr_nr);
            let bias = if beta_reportable(trials_total) {
                dp.map(|(_, b)| round3(b))
            } else {
                None
            };

            GroupSummary {
                key,
                counts,
                trials: trials_total,
                probe_trials: probes_total,
                dprime: dp.map(|(d, _)| round3(d)),
                dprime_nr: dp_nr.map(|(d, _)| round3(d)),
                bias,
                s_plus_correct: ratio(hit, hit + miss),
                s_plus_correct_nr: ratio(hit, hit + miss + miss_nr),
                s_minus_correct: ratio(cr, cr + fa),
                s_minus_correct_nr: ratio(cr + cr_nr, fa + cr + cr_nr),
                total_correct: ratio(hit + cr, hit + miss + fa + cr),
                total_correct_nr: ratio(hit + cr + cr_nr, trials_total),
                probe_s_plus_correct: ratio(probe_hit, probe_hit + probe_miss),
                probe_s_plus_correct_nr: ratio(probe_hit, probe_hit + probe_miss + probe_miss_nr),
                probe_s_minus_correct: ratio(probe_cr, probe_cr + probe_fa),
                probe_s_minus_correct_nr: ratio(probe_cr + probe_cr_nr, probe_fa + probe_cr + probe_cr_nr),
                probe_total_correct: ratio(probe_hit + probe_cr, probe_hit + probe_cr + probe_miss + probe_fa),
                probe_total_correct_nr: ratio(probe_hit + probe_cr + probe_cr_nr, probes_total),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::{TrialClass, TrialResponse};

    fn trial(date: &str, class: TrialClass, response: TrialResponse) -> IngestedTrial {
        IngestedTrial {
            date: date.parse().unwrap(),
            hour: 10,
            block: "training 125".into(),
            class,
            response,
            indicator: crate::analysis::classify::classify(class, response),
        }
    }

    #[test]
    fn grouping_by_date_sums_indicators() {
        let trials = vec![
            trial("2026-01-01", TrialClass::SPlus, TrialResponse::SPlus),
            trial("2026-01-01", TrialClass::SMinus, TrialResponse::SPlus),
            trial("2026-01-02", TrialClass::SPlus, TrialResponse::SPlus),
        ];
        let groups = aggregate(&trials, &["Date"], &[]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].trials, 2);
        assert_eq!(groups[1].trials, 1);
    }

    #[test]
    fn zero_denominator_proportion_is_none() {
        let trials = vec![trial("2026-01-01", TrialClass::SMinus, TrialResponse::SPlus)];
        let groups = aggregate(&trials, &["Date"], &[]);
        assert_eq!(groups[0].s_plus_correct, None);
    }

    #[test]
    fn no_response_counts_toward_nr_variant_only() {
        let trials = vec![
            trial("2026-01-01", TrialClass::SPlus, TrialResponse::SPlus),
            trial("2026-01-01", TrialClass::SPlus, TrialResponse::None),
        ];
        let groups = aggregate(&trials, &["Date"], &[]);
        let group = &groups[0];
        assert_eq!(group.s_plus_correct, Some(1.0));
        assert_eq!(group.s_plus_correct_nr, Some(0.5));
    }
}
