//! Pass/fail criteria check over aggregated groups: minimum trial
//! count, minimum d-prime, per-class minimum proportion correct, and
//! an optional minimum number of passing days.

use crate::analysis::aggregate::GroupSummary;

/// Which proportion-correct column a [`PropCorrectCriterion`] checks.
/// `Total` is the default when a criterion names no class, matching
/// the original analyzer falling back to `totalCorr`/`totalNRCorr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropCorrectClass {
    SPlus,
    SMinus,
    Total,
    ProbeSPlus,
    ProbeSMinus,
    ProbeTotal,
}

impl PropCorrectClass {
    fn value(self, group: &GroupSummary, use_nr: bool) -> Option<f64> {
        match self {
            PropCorrectClass::SPlus => group.s_plus(use_nr),
            PropCorrectClass::SMinus => group.s_minus(use_nr),
            PropCorrectClass::Total => group.total(use_nr),
            PropCorrectClass::ProbeSPlus => group.probe_s_plus(use_nr),
            PropCorrectClass::ProbeSMinus => group.probe_s_minus(use_nr),
            PropCorrectClass::ProbeTotal => group.probe_total(use_nr),
        }
    }

    fn label(self) -> &'static str {
        match self {
            PropCorrectClass::SPlus => "S+",
            PropCorrectClass::SMinus => "S-",
            PropCorrectClass::Total => "Total",
            PropCorrectClass::ProbeSPlus => "Probe S+",
            PropCorrectClass::ProbeSMinus => "Probe S-",
            PropCorrectClass::ProbeTotal => "Probe Tot Corr",
        }
    }
}

/// One entry of a per-class proportion-correct check, mirroring the
/// original analyzer's `criteria['propCorrect']` list of category
/// dicts (`{'type': ..., 'minimum': ...}`).
#[derive(Debug, Clone, Copy)]
pub struct PropCorrectCriterion {
    pub class: PropCorrectClass,
    pub minimum: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Criteria {
    pub min_trials: Option<u64>,
    pub min_dprime: Option<f64>,
    pub min_prop_correct: Vec<PropCorrectCriterion>,
    pub min_passing_days: Option<u64>,
    pub use_nr: bool,
}

#[derive(Debug, Clone)]
pub struct CriteriaReport {
    pub passed: bool,
    pub passing_days: u64,
    pub reasons: Vec<String>,
}

/// Evaluate `criteria` against one group summary per day, returning
/// the overall pass/fail and a human-readable reason trace.
pub fn check_criteria(groups: &[GroupSummary], criteria: &Criteria) -> CriteriaReport {
    let mut reasons = Vec::new();
    let mut passing_days = 0u64;

    for group in groups {
        let mut day_ok = true;

        if let Some(min_trials) = criteria.min_trials {
            if group.trials < min_trials {
                day_ok = false;
                reasons.push(format!(
                    "{:?}: trials {} below minimum {}",
                    group.key, group.trials, min_trials
                ));
            }
        }

        if let Some(min_d) = criteria.min_dprime {
            let d = if criteria.use_nr { group.dprime_nr } else { group.dprime };
            match d {
                Some(d) if d >= min_d => {}
                Some(d) => {
                    day_ok = false;
                    reasons.push(format!("{:?}: d' {} below minimum {}", group.key, d, min_d));
                }
                None => {
                    day_ok = false;
                    reasons.push(format!("{:?}: d' unavailable", group.key));
                }
            }
        }

        for category in &criteria.min_prop_correct {
            match category.class.value(group, criteria.use_nr) {
                Some(p) if p >= category.minimum => {}
                _ => {
                    day_ok = false;
                    reasons.push(format!(
                        "{:?}: {} proportion correct below minimum {}",
                        group.key,
                        category.class.label(),
                        category.minimum
                    ));
                }
            }
        }

        if day_ok {
            passing_days += 1;
        }
    }

    let passed = match criteria.min_passing_days {
        Some(min_days) => passing_days >= min_days,
        None => !groups.is_empty() && reasons.is_empty(),
    };

    CriteriaReport {
        passed,
        passing_days,
        reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::aggregate::GroupKey;
    use std::collections::BTreeMap;

    fn group(trials: u64, dprime: Option<f64>, total_correct: Option<f64>) -> GroupSummary {
        GroupSummary {
            key: vec![GroupKey::Hour(0)],
            counts: BTreeMap::new(),
            trials,
            dprime,
            dprime_nr: dprime,
            total_correct,
            ..Default::default()
        }
    }

    #[test]
    fn passes_when_all_thresholds_met_every_day() {
        let groups = vec![group(50, Some(2.0), Some(0.85)); 3];
        let criteria = Criteria {
            min_trials: Some(40),
            min_dprime: Some(1.5),
            min_prop_correct: vec![PropCorrectCriterion {
                class: PropCorrectClass::Total,
                minimum: 0.8,
            }],
            min_passing_days: Some(3),
            use_nr: false,
        };
        let report = check_criteria(&groups, &criteria);
        assert!(report.passed);
        assert_eq!(report.passing_days, 3);
    }

    #[test]
    fn use_nr_selects_with_nr_column_variant() {
        let group = GroupSummary {
            key: vec![GroupKey::Hour(0)],
            total_correct: Some(0.5),
            total_correct_nr: Some(0.9),
            ..Default::default()
        };
        let criteria = Criteria {
            min_prop_correct: vec![PropCorrectCriterion {
                class: PropCorrectClass::Total,
                minimum: 0.8,
            }],
            use_nr: true,
            ..Default::default()
        };
        let report = check_criteria(&[group], &criteria);
        assert!(report.reasons.is_empty());
    }

    #[test]
    fn fails_when_dprime_missing() {
        let groups = vec![group(50, None, Some(0.9))];
        let criteria = Criteria {
            min_dprime: Some(1.0),
            ..Default::default()
        };
        let report = check_criteria(&groups, &criteria);
        assert!(!report.reasons.is_empty());
    }
}
