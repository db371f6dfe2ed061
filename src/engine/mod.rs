//! The per-chamber shaping engine: a generic state-graph runner
//! (`runner`), the primitive state factories built on the panel
//! (`primitives`), the per-session mutable context (`session`), and
//! the catalog of training paradigms (`shaper`).

pub mod primitives;
pub mod runner;
pub mod session;
pub mod shaper;

pub use runner::{StateFn, StateMachine};
pub use session::SessionCtx;
pub use shaper::{build_shaper, Shaper};
