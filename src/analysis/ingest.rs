//! Reads a subject's `trialdata/*.csv` files paired with their
//! sibling `settings_files/*.json` snapshots and produces the flat,
//! classified row set the aggregation stage groups over.

use std::path::Path;

use chrono::{DateTime, Datelike, Local, Timelike};
use serde::Deserialize;

use crate::analysis::classify::{classify, Indicator};
use crate::config::ExperimentConfig;
use crate::error::{ConfigError, OperantError};
use crate::logger::{TrialClass, TrialResponse};

#[derive(Debug, Clone)]
pub struct IngestedTrial {
    pub date: chrono::NaiveDate,
    pub hour: u32,
    pub block: String,
    pub class: TrialClass,
    pub response: TrialResponse,
    pub indicator: Option<Indicator>,
}

#[derive(Debug, Deserialize)]
struct Row {
    session_index: usize,
    class: String,
    response: String,
    timestamp: String,
}

fn parse_class(s: &str) -> Option<TrialClass> {
    match s {
        "sPlus" => Some(TrialClass::SPlus),
        "sMinus" => Some(TrialClass::SMinus),
        "probePlus" => Some(TrialClass::ProbePlus),
        "probeMinus" => Some(TrialClass::ProbeMinus),
        _ => None,
    }
}

fn parse_response(s: &str) -> TrialResponse {
    match s {
        "sPlus" => TrialResponse::SPlus,
        "sMinus" => TrialResponse::SMinus,
        "none" => TrialResponse::None,
        _ => TrialResponse::Err,
    }
}

/// Read every CSV under `session_dir/trialdata`, pairing each with
/// the settings file of the same stem (if any) for block-name
/// lookup.
pub fn ingest_directory(session_dir: &Path) -> Result<Vec<IngestedTrial>, OperantError> {
    let trialdata_dir = session_dir.join("trialdata");
    let settings_dir = session_dir.join("settings_files");
    let mut out = Vec::new();

    if !trialdata_dir.is_dir() {
        return Ok(out);
    }

    for entry in std::fs::read_dir(&trialdata_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("csv") {
            continue;
        }
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("").to_string();
        let settings_path = settings_dir.join(format!("{stem}.json"));
        let config = if settings_path.exists() {
            Some(ExperimentConfig::load(&settings_path)?)
        } else {
            None
        };

        let mut reader = csv::Reader::from_path(&path)?;
        for record in reader.deserialize::<Row>() {
            let row: Row = record.map_err(|e| {
                OperantError::Config(ConfigError::TrialRow {
                    path: path.clone(),
                    detail: e.to_string(),
                })
            })?;
            let Some(class) = parse_class(&row.class) else {
                continue;
            };
            let response = parse_response(&row.response);
            let indicator = classify(class, response);
            let timestamp: DateTime<Local> = row
                .timestamp
                .parse()
                .unwrap_or_else(|_| Local::now());
            let block = config
                .as_ref()
                .and_then(|c| c.block_name_for_session(row.session_index))
                .map(super::rewrite_legacy_block_name)
                .unwrap_or("unknown")
                .to_string();

            out.push(IngestedTrial {
                date: timestamp.date_naive(),
                hour: timestamp.hour(),
                block,
                class,
                response,
                indicator,
            });
        }
    }

    Ok(out)
}

impl From<csv::Error> for OperantError {
    fn from(e: csv::Error) -> Self {
        OperantError::Config(ConfigError::TrialRow {
            path: Path::new("<csv>").to_path_buf(),
            detail: e.to_string(),
        })
    }
}
