//! The chamber supervisor: per-chamber worker lifecycle, crash
//! detection, sleep/wake scheduling, hot-plug reaction, and
//! power-loss recovery.
//!
//! Grounded on the donor's `main.rs` spawn/shutdown orchestration
//! (one thread per unit of concurrency, a shared `AtomicBool`
//! shutdown flag, joined on exit) and its `DashMap`-based concurrent
//! table; the bounded stderr-capture queue is the donor's
//! `EventRecorder` (`ArrayQueue` + background consumer) pattern
//! narrowed from "every event" to "error lines only".

mod device_monitor;

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Timelike;
use crossbeam_queue::ArrayQueue;
use dashmap::DashMap;
use log::{error, info, warn};

use crate::config::{ChamberEntry, ExperimentConfig, HostSettings};
use crate::error::OperantError;

pub use device_monitor::DeviceMonitor;

const TICK_INTERVAL: Duration = Duration::from_secs(5);
const STDERR_QUEUE_CAPACITY: usize = 256;
const BENIGN_PREFIXES: &[&str] = &["ALSA", "pydev", "debug"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChamberState {
    Detected,
    Disconnected,
    Stopped,
    Running,
    Sleeping,
    Errored,
}

pub struct ChamberHandle {
    pub index: usize,
    pub state: ChamberState,
    pub subject: Option<String>,
    pub device_path: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub active: bool,
    pub last_error: Option<String>,
    worker: Option<Child>,
    stderr_capture: Option<Arc<ArrayQueue<String>>>,
    in_schedule: Option<bool>,
}

impl ChamberHandle {
    fn new(index: usize) -> Self {
        ChamberHandle {
            index,
            state: ChamberState::Disconnected,
            subject: None,
            device_path: None,
            config_path: None,
            active: false,
            last_error: None,
            worker: None,
            stderr_capture: None,
            in_schedule: None,
        }
    }
}

/// Owns the per-chamber table and the periodic tick that reconciles
/// worker liveness, the light schedule, and hardware presence.
pub struct Supervisor {
    chambers: Arc<DashMap<usize, ChamberHandle>>,
    settings_path: PathBuf,
    settings: HostSettings,
    worker_binary: PathBuf,
    shutdown: Arc<AtomicBool>,
}

impl Supervisor {
    pub fn new(settings_path: PathBuf, worker_binary: PathBuf) -> Result<Self, OperantError> {
        let settings = HostSettings::load(&settings_path)?;
        let chambers = Arc::new(DashMap::new());
        for entry in &settings.chambers {
            let mut handle = ChamberHandle::new(entry.index);
            handle.subject = Some(entry.subject.clone());
            handle.config_path = Some(entry.param_file.clone());
            handle.active = entry.active;
            chambers.insert(entry.index, handle);
        }
        Ok(Supervisor {
            chambers,
            settings_path,
            settings,
            worker_binary,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Power-loss recovery plus the ordered `shutdown_clean` write,
    /// then enter the tick loop until `stop` is called.
    pub fn run(&mut self) -> Result<(), OperantError> {
        if !self.settings.shutdown_proper {
            warn!("previous run did not shut down cleanly; auto-starting active chambers");
            let active: Vec<usize> = self
                .chambers
                .iter()
                .filter(|e| e.active)
                .map(|e| e.index)
                .collect();
            for idx in active {
                if let Err(e) = self.start_chamber(idx) {
                    error!("auto-start of chamber {idx} failed: {e}");
                }
            }
        }

        // Write shutdown_clean=false before accepting any further
        // input, so a crash after this point is correctly detected
        // as unclean on the next run.
        self.settings.shutdown_proper = false;
        self.persist_settings()?;

        while !self.shutdown.load(Ordering::SeqCst) {
            self.tick();
            std::thread::sleep(TICK_INTERVAL);
        }

        self.settings.shutdown_proper = true;
        self.persist_settings()?;
        Ok(())
    }

    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    fn persist_settings(&self) -> Result<(), OperantError> {
        self.settings.save_atomic(&self.settings_path)?;
        Ok(())
    }

    fn tick(&mut self) {
        let indices: Vec<usize> = self.chambers.iter().map(|e| e.index).collect();
        for idx in indices {
            self.tick_chamber(idx);
        }
    }

    fn tick_chamber(&mut self, idx: usize) {
        let (state, has_schedule) = {
            let Some(handle) = self.chambers.get(&idx) else { return };
            (handle.state, handle.config_path.is_some())
        };

        if state == ChamberState::Running {
            let exited = {
                let mut handle = self.chambers.get_mut(&idx).unwrap();
                match handle.worker.as_mut().map(|w| w.try_wait()) {
                    Some(Ok(Some(status))) => Some(status.to_string()),
                    Some(Err(e)) => Some(e.to_string()),
                    _ => None,
                }
            };
            if let Some(detail) = exited {
                let mut handle = self.chambers.get_mut(&idx).unwrap();
                handle.state = ChamberState::Errored;
                handle.last_error = Some(detail.clone());
                error!("chamber {idx} worker crashed: {detail}");
                return;
            }
        }

        if has_schedule && matches!(state, ChamberState::Running | ChamberState::Sleeping) {
            self.apply_schedule(idx, state);
        }
    }

    fn apply_schedule(&mut self, idx: usize, state: ChamberState) {
        let config_path = {
            let Some(handle) = self.chambers.get(&idx) else { return };
            handle.config_path.clone()
        };
        let Some(path) = config_path else { return };
        let Ok(config) = ExperimentConfig::load(&path) else { return };

        let now = chrono::Local::now();
        let in_schedule = config
            .light_schedule
            .iter()
            .any(|e| e.contains(now.hour(), now.minute(), now.second()));

        let mut handle = self.chambers.get_mut(&idx).unwrap();
        let was_in_schedule = handle.in_schedule.unwrap_or(in_schedule);
        handle.in_schedule = Some(in_schedule);

        if was_in_schedule && !in_schedule && state == ChamberState::Running {
            info!("chamber {idx} leaving light schedule, stopping for sleep");
            handle.state = ChamberState::Sleeping;
        } else if !was_in_schedule && in_schedule && state == ChamberState::Sleeping {
            info!("chamber {idx} entering light schedule, waking");
            handle.state = ChamberState::Running;
        }
    }

    /// Start a chamber's worker. Refuses unless the chamber is
    /// active, has a subject and config, and its device node exists.
    pub fn start_chamber(&mut self, idx: usize) -> Result<(), OperantError> {
        let (subject, config_path, device_path, active) = {
            let handle = self
                .chambers
                .get(&idx)
                .ok_or(OperantError::DeviceMissing(idx))?;
            (
                handle.subject.clone(),
                handle.config_path.clone(),
                handle.device_path.clone(),
                handle.active,
            )
        };

        if !active {
            return Err(OperantError::Config(crate::error::ConfigError::MissingField(
                "chamber not marked active",
            )));
        }
        let subject = subject.ok_or(OperantError::Config(crate::error::ConfigError::MissingField("subject")))?;
        let config_path = config_path.ok_or_else(|| {
            OperantError::Config(crate::error::ConfigError::NotFound(PathBuf::from("<unset>")))
        })?;
        if !config_path.exists() {
            return Err(OperantError::Config(crate::error::ConfigError::NotFound(config_path)));
        }
        let device_path = device_path.ok_or(OperantError::DeviceMissing(idx))?;
        if !device_path.exists() {
            return Err(OperantError::DeviceMissing(idx));
        }
        let config = ExperimentConfig::load(&config_path)?;

        let mut child = Command::new(&self.worker_binary)
            .arg("-P")
            .arg(idx.to_string())
            .arg("-S")
            .arg(&subject)
            .arg(&config.paradigm)
            .arg("-c")
            .arg(&config_path)
            .stderr(Stdio::piped())
            .spawn()?;

        let queue = Arc::new(ArrayQueue::new(STDERR_QUEUE_CAPACITY));
        if let Some(stderr) = child.stderr.take() {
            spawn_stderr_capture(stderr, queue.clone());
        }

        // Give the worker a moment to fail fast on bad config before
        // declaring it started.
        std::thread::sleep(Duration::from_millis(200));
        if let Some(line) = queue.pop() {
            if !BENIGN_PREFIXES.iter().any(|p| line.starts_with(p)) {
                let _ = child.kill();
                return Err(OperantError::WorkerCrash {
                    chamber: idx,
                    detail: line,
                });
            }
        }

        let mut handle = self.chambers.get_mut(&idx).unwrap();
        handle.worker = Some(child);
        handle.stderr_capture = Some(queue);
        handle.state = ChamberState::Running;
        handle.last_error = None;
        info!("chamber {idx} started for subject {subject}");
        Ok(())
    }

    pub fn stop_chamber(&mut self, idx: usize) -> Result<(), OperantError> {
        let mut handle = self
            .chambers
            .get_mut(&idx)
            .ok_or(OperantError::DeviceMissing(idx))?;
        if let Some(mut child) = handle.worker.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        handle.state = ChamberState::Stopped;
        Ok(())
    }

    /// React to a device path appearing or disappearing for the
    /// chamber it belongs to.
    pub fn on_device_event(&mut self, idx: usize, path: PathBuf, present: bool) {
        let Some(mut handle) = self.chambers.get_mut(&idx) else { return };
        if present {
            handle.device_path = Some(path);
            if handle.state == ChamberState::Disconnected {
                handle.state = ChamberState::Stopped;
            }
        } else {
            handle.device_path = None;
            drop(handle);
            let _ = self.stop_chamber(idx);
            if let Some(mut handle) = self.chambers.get_mut(&idx) {
                handle.state = ChamberState::Disconnected;
            }
        }
    }

    pub fn chamber_state(&self, idx: usize) -> Option<ChamberState> {
        self.chambers.get(&idx).map(|h| h.state)
    }
}

fn spawn_stderr_capture(stderr: std::process::ChildStderr, queue: Arc<ArrayQueue<String>>) {
    use std::io::{BufRead, BufReader};
    std::thread::spawn(move || {
        let reader = BufReader::new(stderr);
        for line in reader.lines().flatten() {
            if queue.force_push(line).is_some() {
                warn!("stderr capture queue full, dropping oldest line");
            }
        }
    });
}

/// Device path's chamber index, per the `Board<N>` enumeration
/// convention: `/dev/.../Board04` is chamber index 3 (0-based).
pub fn chamber_index_from_device_path(path: &str) -> Option<usize> {
    let digits: String = path.chars().rev().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() || !path.ends_with(&digits.chars().rev().collect::<String>()) {
        return None;
    }
    let n: usize = digits.chars().rev().collect::<String>().parse().ok()?;
    n.checked_sub(1)
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        let indices: Vec<usize> = self.chambers.iter().map(|e| e.index).collect();
        for idx in indices {
            let _ = self.stop_chamber(idx);
        }
    }
}

#[allow(dead_code)]
fn elapsed_since(t: Instant) -> Duration {
    t.elapsed()
}

#[allow(dead_code)]
fn roster_from_entries(entries: &[ChamberEntry]) -> Vec<usize> {
    entries.iter().map(|e| e.index).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_path_chamber_index_is_zero_based() {
        assert_eq!(chamber_index_from_device_path("/dev/ttyXXX/Board04"), Some(3));
        assert_eq!(chamber_index_from_device_path("/dev/ttyXXX/Board01"), Some(0));
        assert_eq!(chamber_index_from_device_path("/dev/ttyXXX/NoMatch"), None);
    }

    #[test]
    fn benign_stderr_prefix_does_not_fail_start() {
        assert!(BENIGN_PREFIXES.iter().any(|p| "ALSA: underrun".starts_with(p)));
        assert!(!BENIGN_PREFIXES.iter().any(|p| "Traceback".starts_with(p)));
    }
}
