//! Persisted configuration: host-level `settings.json`, per-subject
//! experiment config, and the crash-recovery `SettingsSnapshot`.
//!
//! Unrecognized keys in on-disk JSON are ignored rather than
//! rejected: these files are hand-edited by researchers and gain
//! fields over time. Missing *required* fields are a [`ConfigError`].

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ConfigError;

/// One `(HH:MM, HH:MM)` window during which a chamber's house light
/// is scheduled on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LightEpoch {
    pub start: (u32, u32),
    pub end: (u32, u32),
}

impl LightEpoch {
    pub fn parse(start: &str, end: &str) -> Result<Self, ConfigError> {
        Ok(LightEpoch {
            start: parse_hhmm(start)?,
            end: parse_hhmm(end)?,
        })
    }

    /// Whether `(hour, minute, second)` local time falls within this
    /// epoch, inclusive of the start boundary, exclusive of the end.
    pub fn contains(&self, hour: u32, minute: u32, second: u32) -> bool {
        let now = hour * 3600 + minute * 60 + second;
        let start = self.start.0 * 3600 + self.start.1 * 60;
        let end = self.end.0 * 3600 + self.end.1 * 60;
        now >= start && now < end
    }
}

fn parse_hhmm(s: &str) -> Result<(u32, u32), ConfigError> {
    let mut parts = s.splitn(2, ':');
    let h: u32 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| ConfigError::MissingField("light schedule hour"))?;
    let m: u32 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| ConfigError::MissingField("light schedule minute"))?;
    Ok((h, m))
}

/// Per-block shaping parameters: how many responses advance the
/// block, and how long without a response reverts it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BlockParams {
    pub reps: u32,
    /// `None` means revert is disabled for this block.
    pub revert_timeout_secs: Option<u64>,
}

/// The per-subject experiment configuration snapshot, written once
/// per session alongside that session's trial log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub subject: String,
    pub paradigm: String,
    pub light_schedule: Vec<LightEpoch>,
    pub blocks: Vec<BlockParams>,
    #[serde(default)]
    pub stimulus_dir: Option<PathBuf>,
    #[serde(default = "default_idle_poll_interval")]
    pub idle_poll_interval_secs: u64,
    #[serde(default)]
    pub punishment_duration_secs: Option<u64>,
    #[serde(default)]
    pub block_design_order: Vec<String>,
}

fn default_idle_poll_interval() -> u64 {
    5
}

impl ExperimentConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let text = fs::read_to_string(path).map_err(|_| ConfigError::NotFound(path.to_path_buf()))?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Block name for 1-based `session_index`, per `block_design_order`
    /// (a length-1 order applies to every session).
    pub fn block_name_for_session(&self, session_index: usize) -> Option<&str> {
        if self.block_design_order.is_empty() {
            return None;
        }
        if self.block_design_order.len() == 1 {
            return Some(self.block_design_order[0].as_str());
        }
        self.block_design_order
            .get(session_index.saturating_sub(1))
            .map(|s| s.as_str())
    }
}

/// One row of the host-level `settings.json` roster.
#[derive(Debug, Clone)]
pub struct ChamberEntry {
    pub index: usize,
    pub param_file: PathBuf,
    pub subject: String,
    pub active: bool,
}

/// Host-level `settings.json`: the chamber roster plus the clean-
/// shutdown flag used for crash recovery.
///
/// The roster is kept in memory as one row per chamber ([`ChamberEntry`])
/// but serializes/deserializes through the documented on-disk schema:
/// three parallel index-tagged arrays (`paramFiles`, `birds`, `active`)
/// rather than an array of objects.
#[derive(Debug, Clone)]
pub struct HostSettings {
    pub chambers: Vec<ChamberEntry>,
    pub shutdown_proper: bool,
}

/// The literal on-disk shape: `{paramFiles, birds, active, shutdownProper}`.
#[derive(Serialize, Deserialize)]
struct HostSettingsWire {
    #[serde(rename = "paramFiles")]
    param_files: Vec<(usize, PathBuf)>,
    birds: Vec<(usize, String)>,
    active: Vec<(usize, bool)>,
    #[serde(rename = "shutdownProper")]
    shutdown_proper: bool,
}

impl Serialize for HostSettings {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let wire = HostSettingsWire {
            param_files: self.chambers.iter().map(|c| (c.index, c.param_file.clone())).collect(),
            birds: self.chambers.iter().map(|c| (c.index, c.subject.clone())).collect(),
            active: self.chambers.iter().map(|c| (c.index, c.active)).collect(),
            shutdown_proper: self.shutdown_proper,
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for HostSettings {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wire = HostSettingsWire::deserialize(deserializer)?;
        let mut by_index: BTreeMap<usize, ChamberEntry> = BTreeMap::new();
        fn entry(
            by_index: &mut BTreeMap<usize, ChamberEntry>,
            index: usize,
        ) -> &mut ChamberEntry {
            by_index.entry(index).or_insert_with(|| ChamberEntry {
                index,
                param_file: PathBuf::new(),
                subject: String::new(),
                active: false,
            })
        }
        for (index, param_file) in wire.param_files {
            entry(&mut by_index, index).param_file = param_file;
        }
        for (index, subject) in wire.birds {
            entry(&mut by_index, index).subject = subject;
        }
        for (index, active) in wire.active {
            entry(&mut by_index, index).active = active;
        }
        Ok(HostSettings {
            chambers: by_index.into_values().collect(),
            shutdown_proper: wire.shutdown_proper,
        })
    }
}

impl HostSettings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let text = fs::read_to_string(path).map_err(|_| ConfigError::NotFound(path.to_path_buf()))?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write atomically: serialize to a sibling temp file, then
    /// rename over the destination so readers never observe a
    /// partial write.
    pub fn save_atomic(&self, path: &Path) -> std::io::Result<()> {
        let text = serde_json::to_string_pretty(self).expect("HostSettings always serializes");
        write_atomic(path, text.as_bytes())
    }
}

pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp_path = dir.join(format!(
        ".{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("settings")
    ));
    {
        let mut f = fs::File::create(&tmp_path)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(&tmp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn light_epoch_boundary() {
        let epoch = LightEpoch::parse("08:30", "22:30").unwrap();
        assert!(!epoch.contains(8, 29, 59));
        assert!(epoch.contains(8, 30, 0));
        assert!(epoch.contains(22, 29, 59));
        assert!(!epoch.contains(22, 30, 0));
    }

    #[test]
    fn block_name_single_order_applies_to_all_sessions() {
        let cfg = ExperimentConfig {
            subject: "z1".into(),
            paradigm: "2ac".into(),
            light_schedule: vec![],
            blocks: vec![],
            stimulus_dir: None,
            idle_poll_interval_secs: 5,
            punishment_duration_secs: None,
            block_design_order: vec!["training 125".into()],
        };
        assert_eq!(cfg.block_name_for_session(1), Some("training 125"));
        assert_eq!(cfg.block_name_for_session(40), Some("training 125"));
    }

    #[test]
    fn atomic_write_survives_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = HostSettings {
            chambers: vec![ChamberEntry {
                index: 0,
                param_file: "cfg.json".into(),
                subject: "z1".into(),
                active: true,
            }],
            shutdown_proper: false,
        };
        settings.save_atomic(&path).unwrap();
        let loaded = HostSettings::load(&path).unwrap();
        assert!(!loaded.shutdown_proper);
        assert_eq!(loaded.chambers[0].subject, "z1");
    }

    #[test]
    fn host_settings_serializes_as_parallel_indexed_arrays() {
        let settings = HostSettings {
            chambers: vec![ChamberEntry {
                index: 0,
                param_file: "cfg.json".into(),
                subject: "z1".into(),
                active: true,
            }],
            shutdown_proper: false,
        };
        let value: serde_json::Value = serde_json::to_value(&settings).unwrap();
        assert_eq!(value["paramFiles"], serde_json::json!([[0, "cfg.json"]]));
        assert_eq!(value["birds"], serde_json::json!([[0, "z1"]]));
        assert_eq!(value["active"], serde_json::json!([[0, true]]));
        assert_eq!(value["shutdownProper"], serde_json::json!(false));
    }

    #[test]
    fn host_settings_deserializes_documented_schema() {
        let text = r#"{"paramFiles":[[0,"cfg.json"]],"birds":[[0,"z1"]],"active":[[0,true]],"shutdownProper":false}"#;
        let settings: HostSettings = serde_json::from_str(text).unwrap();
        assert!(!settings.shutdown_proper);
        assert_eq!(settings.chambers.len(), 1);
        assert_eq!(settings.chambers[0].index, 0);
        assert_eq!(settings.chambers[0].param_file, PathBuf::from("cfg.json"));
        assert_eq!(settings.chambers[0].subject, "z1");
        assert!(settings.chambers[0].active);
    }
}
