//! Per-session trial logging: an append-only CSV plus an atomically
//! published JSON summary snapshot, and an `error.log` append path.
//!
//! Grounded on the header-exists-before-append CSV writer pattern
//! used for metrics export, generalized from "metrics row" to
//! "trial row"; the atomic summary publication is new, required by
//! the no-partial-write invariant external readers depend on.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::config::{write_atomic, ExperimentConfig};
use crate::error::OperantError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialClass {
    #[serde(rename = "sPlus")]
    SPlus,
    #[serde(rename = "sMinus")]
    SMinus,
    #[serde(rename = "probePlus")]
    ProbePlus,
    #[serde(rename = "probeMinus")]
    ProbeMinus,
}

impl fmt::Display for TrialClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrialClass::SPlus => "sPlus",
            TrialClass::SMinus => "sMinus",
            TrialClass::ProbePlus => "probePlus",
            TrialClass::ProbeMinus => "probeMinus",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialResponse {
    #[serde(rename = "sPlus")]
    SPlus,
    #[serde(rename = "sMinus")]
    SMinus,
    #[serde(rename = "none")]
    None,
    #[serde(rename = "ERR")]
    Err,
}

impl fmt::Display for TrialResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrialResponse::SPlus => "sPlus",
            TrialResponse::SMinus => "sMinus",
            TrialResponse::None => "none",
            TrialResponse::Err => "ERR",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Trial {
    pub session_index: usize,
    pub index: usize,
    pub stimulus_path: String,
    pub class: TrialClass,
    pub response: TrialResponse,
    pub response_latency_seconds: Option<f64>,
    pub reward_issued: bool,
    pub punish_issued: bool,
    pub timestamp: DateTime<Local>,
}

/// The `<subject>.summaryDAT` snapshot, rewritten atomically after
/// every trial.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummarySnapshot {
    pub phase: String,
    pub last_trial_time: Option<DateTime<Local>>,
    pub trials: u64,
    pub probe_trials: u64,
    pub feeds: u64,
    pub correct_responses: u64,
    pub false_alarms: u64,
    pub misses: u64,
    pub splus_nr: u64,
    pub correct_rejections: u64,
    pub sminus_nr: u64,
    pub probe_hit: u64,
    pub probe_fa: u64,
    pub probe_miss: u64,
    pub probe_miss_nr: u64,
    pub probe_cr: u64,
    pub probe_cr_nr: u64,
    pub dprime: Option<f64>,
    pub dprime_nr: Option<f64>,
    pub bias: Option<f64>,
    pub bias_nr: Option<f64>,
    pub bias_description: Option<String>,
    pub bias_description_nr: Option<String>,
}

impl SummarySnapshot {
    fn apply(&mut self, trial: &Trial) {
        self.trials += 1;
        self.last_trial_time = Some(trial.timestamp);
        if trial.reward_issued {
            self.feeds += 1;
        }
        let is_probe = matches!(trial.class, TrialClass::ProbePlus | TrialClass::ProbeMinus);
        if is_probe {
            self.probe_trials += 1;
        }
        match (trial.class, trial.response) {
            (TrialClass::SPlus, TrialResponse::SPlus) => self.correct_responses += 1,
            (TrialClass::SPlus, TrialResponse::SMinus) => self.misses += 1,
            (TrialClass::SPlus, TrialResponse::None) => self.splus_nr += 1,
            (TrialClass::SMinus, TrialResponse::SPlus) => self.false_alarms += 1,
            (TrialClass::SMinus, TrialResponse::SMinus) => self.correct_rejections += 1,
            (TrialClass::SMinus, TrialResponse::None) => self.sminus_nr += 1,
            (TrialClass::ProbePlus, TrialResponse::SPlus) => self.probe_hit += 1,
            (TrialClass::ProbePlus, TrialResponse::SMinus) => self.probe_miss += 1,
            (TrialClass::ProbePlus, TrialResponse::None) => self.probe_miss_nr += 1,
            (TrialClass::ProbeMinus, TrialResponse::SPlus) => self.probe_fa += 1,
            (TrialClass::ProbeMinus, TrialResponse::SMinus) => self.probe_cr += 1,
            (TrialClass::ProbeMinus, TrialResponse::None) => self.probe_cr_nr += 1,
            (_, TrialResponse::Err) => {}
        }

        let dp = crate::analysis::dprime(
            self.correct_responses,
            self.misses,
            self.false_alarms,
            self.correct_rejections,
        );
        let dp_nr = crate::analysis::dprime(
            self.correct_responses,
            self.misses + self.splus_nr,
            self.false_alarms,
            self.correct_rejections + self.sminus_nr,
        );
        self.dprime = dp.map(|v| round3(v.0));
        self.bias = dp.map(|v| round3(v.1));
        self.dprime_nr = dp_nr.map(|v| round3(v.0));
        self.bias_nr = dp_nr.map(|v| round3(v.1));
        self.bias_description = self.bias.map(describe_bias);
        self.bias_description_nr = self.bias_nr.map(describe_bias);
    }
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

fn describe_bias(beta: f64) -> String {
    if beta > 1.0 {
        "conservative".to_string()
    } else if beta < 1.0 {
        "liberal".to_string()
    } else {
        "neutral".to_string()
    }
}

pub struct TrialLogger {
    csv_path: PathBuf,
    summary_path: PathBuf,
    error_log_path: PathBuf,
    summary: SummarySnapshot,
}

impl TrialLogger {
    /// Create the session's on-disk layout and publish the config
    /// snapshot the Analyzer's block-name lookup depends on
    /// (`settings_files/<subject>_<sessionISO>.json`).
    pub fn new(
        session_dir: &Path,
        subject: &str,
        session_started: DateTime<Local>,
        config: &ExperimentConfig,
    ) -> std::io::Result<Self> {
        let trialdata_dir = session_dir.join("trialdata");
        let settings_dir = session_dir.join("settings_files");
        std::fs::create_dir_all(&trialdata_dir)?;
        std::fs::create_dir_all(&settings_dir)?;

        let stamp = session_started.format("%Y%m%d%H%M%S");
        let csv_path = trialdata_dir.join(format!("{subject}_{stamp}.csv"));
        let settings_path = settings_dir.join(format!("{subject}_{stamp}.json"));
        let summary_path = session_dir.join(format!("{subject}.summaryDAT"));
        let error_log_path = session_dir.join("error.log");

        let snapshot = serde_json::to_string_pretty(config).expect("ExperimentConfig always serializes");
        write_atomic(&settings_path, snapshot.as_bytes())?;

        Ok(TrialLogger {
            csv_path,
            summary_path,
            error_log_path,
            summary: SummarySnapshot {
                phase: "shaping".to_string(),
                ..Default::default()
            },
        })
    }

    pub fn append(&mut self, trial: &Trial) -> Result<(), OperantError> {
        let header_needed = !self.csv_path.exists();
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.csv_path)?,
            );
        if header_needed {
            writer.write_record([
                "session_index",
                "index",
                "stimulus_path",
                "class",
                "response",
                "response_latency_seconds",
                "reward_issued",
                "punish_issued",
                "timestamp",
            ])?;
        }
        writer.write_record([
            trial.session_index.to_string(),
            trial.index.to_string(),
            trial.stimulus_path.clone(),
            trial.class.to_string(),
            trial.response.to_string(),
            trial
                .response_latency_seconds
                .map(|v| v.to_string())
                .unwrap_or_default(),
            trial.reward_issued.to_string(),
            trial.punish_issued.to_string(),
            trial.timestamp.to_rfc3339(),
        ])?;
        writer.flush()?;

        self.summary.apply(trial);
        self.write_summary()?;
        Ok(())
    }

    fn write_summary(&self) -> std::io::Result<()> {
        let text = serde_json::to_string_pretty(&self.summary).expect("summary always serializes");
        write_atomic(&self.summary_path, text.as_bytes())
    }

    pub fn log_error(&self, message: &str) -> std::io::Result<()> {
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.error_log_path)?;
        writeln!(f, "[{}] {}", Local::now().to_rfc3339(), message)
    }

    pub fn summary(&self) -> &SummarySnapshot {
        &self.summary
    }
}

#[allow(dead_code)]
fn touch(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trial(class: TrialClass, response: TrialResponse) -> Trial {
        Trial {
            session_index: 1,
            index: 1,
            stimulus_path: "a.wav".into(),
            class,
            response,
            response_latency_seconds: Some(0.4),
            reward_issued: response == TrialResponse::SPlus && class == TrialClass::SPlus,
            punish_issued: false,
            timestamp: Local::now(),
        }
    }

    fn sample_config() -> ExperimentConfig {
        ExperimentConfig {
            subject: "z1".into(),
            paradigm: "2ac".into(),
            light_schedule: vec![],
            blocks: vec![],
            stimulus_dir: None,
            idle_poll_interval_secs: 5,
            punishment_duration_secs: None,
            block_design_order: vec!["training 125".into()],
        }
    }

    #[test]
    fn append_creates_header_once_and_updates_summary() {
        let dir = tempfile::tempdir().unwrap();
        let config = sample_config();
        let mut logger = TrialLogger::new(dir.path(), "z1", Local::now(), &config).unwrap();
        logger.append(&sample_trial(TrialClass::SPlus, TrialResponse::SPlus)).unwrap();
        logger.append(&sample_trial(TrialClass::SMinus, TrialResponse::SPlus)).unwrap();

        let content = std::fs::read_to_string(&logger.csv_path).unwrap();
        assert_eq!(content.lines().count(), 3); // header + 2 rows
        assert_eq!(logger.summary().trials, 2);
        assert_eq!(logger.summary().correct_responses, 1);
        assert_eq!(logger.summary().false_alarms, 1);

        let summary_text = std::fs::read_to_string(&logger.summary_path).unwrap();
        let parsed: SummarySnapshot = serde_json::from_str(&summary_text).unwrap();
        assert_eq!(parsed.trials, 2);
    }

    #[test]
    fn new_writes_settings_snapshot_for_ingest_block_name_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let config = sample_config();
        let started = Local::now();
        let _logger = TrialLogger::new(dir.path(), "z1", started, &config).unwrap();

        let stamp = started.format("%Y%m%d%H%M%S");
        let settings_path = dir.path().join("settings_files").join(format!("z1_{stamp}.json"));
        let text = std::fs::read_to_string(&settings_path).unwrap();
        let parsed: ExperimentConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.block_design_order, vec!["training 125".to_string()]);
    }

    #[test]
    fn classification_indicator_is_exclusive() {
        let mut s = SummarySnapshot::default();
        s.apply(&sample_trial(TrialClass::SMinus, TrialResponse::SPlus));
        assert_eq!(s.false_alarms, 1);
        assert_eq!(s.correct_responses, 0);
        assert_eq!(s.misses, 0);
    }
}
