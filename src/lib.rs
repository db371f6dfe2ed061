//! Multi-chamber behavioral-conditioning host.
//!
//! Three subsystems do the real work: [`engine`] drives one shaping
//! session per chamber through a block-structured state graph,
//! [`supervisor`] owns the per-chamber worker lifecycle and hardware
//! reconciliation, and [`analysis`] turns recorded trials into
//! signal-detection statistics. [`hardware`] and [`panel`] are the
//! thin layers between the engine and the physical chamber;
//! [`logger`] and [`config`] are the persistence boundary.

pub mod analysis;
pub mod config;
pub mod engine;
pub mod error;
pub mod hardware;
pub mod logger;
pub mod panel;
pub mod supervisor;

pub use error::OperantError;
