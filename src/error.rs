//! Error hierarchy shared by every subsystem.
//!
//! Each variant corresponds to one of the error kinds enumerated for
//! the system: hardware/protocol failures that halt a chamber,
//! configuration failures that prevent a chamber from starting, and
//! stimulus failures that abort a single trial without stopping the
//! worker. `BenignNoise` is deliberately not a variant here — it is a
//! classification the supervisor applies to captured stderr text
//! before deciding whether to construct a `WorkerCrash`.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("serial read/write timed out")]
    Timeout,
    #[error("serial I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("link not open")]
    NotOpen,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed response on channel {channel}: expected {expected} byte(s), got {got}")]
    Malformed {
        channel: u8,
        expected: usize,
        got: usize,
    },
    #[error("unexpected identify response")]
    BadIdentity,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("shaper block is declared but not implemented: {0}")]
    UnimplementedShaperBlock(&'static str),
    #[error("unknown paradigm: {0}")]
    UnknownParadigm(String),
    #[error("malformed trial log row in {path}: {detail}")]
    TrialRow { path: PathBuf, detail: String },
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("malformed light schedule entry: {0}")]
    Malformed(String),
    #[error("light schedule is empty")]
    Empty,
}

#[derive(Debug, Error)]
pub enum StimulusError {
    #[error("no stimulus file available for class {0:?}")]
    NoStimulus(String),
    #[error("stimulus directory missing: {0}")]
    MissingDirectory(PathBuf),
    #[error("trial logged with no active trial class; state graph reached a reward/outcome state without starting a trial first")]
    NoActiveTrial,
}

#[derive(Debug, Error)]
pub enum OperantError {
    #[error("device missing for chamber {0}")]
    DeviceMissing(usize),
    #[error("worker for chamber {chamber} crashed: {detail}")]
    WorkerCrash { chamber: usize, detail: String },
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Stimulus(#[from] StimulusError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, OperantError>;
