//! Hot-plug watcher over the chamber device directory, translating
//! filesystem events into chamber indices the supervisor can react to.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};

use log::warn;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use super::chamber_index_from_device_path;

pub struct DeviceMonitor {
    _watcher: RecommendedWatcher,
    events: Receiver<(usize, PathBuf, bool)>,
}

impl DeviceMonitor {
    /// Watch `device_dir` (non-recursively) for device nodes appearing
    /// or disappearing, filtering to paths whose name encodes a
    /// chamber index.
    pub fn watch(device_dir: &Path) -> notify::Result<Self> {
        let (raw_tx, raw_rx) = channel::<notify::Result<Event>>();
        let mut watcher = notify::recommended_watcher(raw_tx)?;
        watcher.watch(device_dir, RecursiveMode::NonRecursive)?;

        let (tx, rx) = channel();
        std::thread::spawn(move || {
            for res in raw_rx {
                let event = match res {
                    Ok(e) => e,
                    Err(e) => {
                        warn!("device watcher error: {e}");
                        continue;
                    }
                };
                let present = matches!(event.kind, EventKind::Create(_));
                let removed = matches!(event.kind, EventKind::Remove(_));
                if !present && !removed {
                    continue;
                }
                for path in event.paths {
                    let Some(name) = path.to_str() else { continue };
                    if let Some(idx) = chamber_index_from_device_path(name) {
                        if tx.send((idx, path.clone(), present)).is_err() {
                            return;
                        }
                    }
                }
            }
        });

        Ok(DeviceMonitor {
            _watcher: watcher,
            events: rx,
        })
    }

    /// Drain events observed since the last call without blocking.
    pub fn poll(&self) -> Vec<(usize, PathBuf, bool)> {
        self.events.try_iter().collect()
    }
}
