//! Generic named-state-graph executor.
//!
//! Each state is a nullary function of the session context returning
//! either a successor label or `None` (terminate). There is no
//! side-channel control flow — everything routes through the
//! returned label, mirroring the closure-per-state driver this
//! engine's training paradigms are built from.

use std::collections::HashMap;

use log::{debug, error};

use crate::engine::session::SessionCtx;
use crate::error::OperantError;

pub type StateFn = Box<dyn FnMut(&mut SessionCtx) -> Result<Option<String>, OperantError> + Send>;

pub struct StateMachine {
    states: HashMap<String, StateFn>,
    initial: String,
    error_state: Option<String>,
}

impl StateMachine {
    pub fn new(initial: impl Into<String>) -> Self {
        StateMachine {
            states: HashMap::new(),
            initial: initial.into(),
            error_state: None,
        }
    }

    pub fn add_state(&mut self, name: impl Into<String>, f: StateFn) -> &mut Self {
        self.states.insert(name.into(), f);
        self
    }

    pub fn with_error_state(mut self, name: impl Into<String>) -> Self {
        self.error_state = Some(name.into());
        self
    }

    /// Drive the graph to completion. Returns `Ok(())` when a state
    /// returns `None`. An error inside a state routes once to the
    /// declared error state (if any and if distinct from the failing
    /// state) before propagating; with no error state declared the
    /// error propagates immediately.
    pub fn run(&mut self, ctx: &mut SessionCtx) -> Result<(), OperantError> {
        let mut current = self.initial.clone();
        loop {
            let state = self
                .states
                .get_mut(&current)
                .unwrap_or_else(|| panic!("unknown state label: {current}"));
            debug!("chamber {}: entering state {current}", ctx.chamber_id);
            match state(ctx) {
                Ok(Some(next)) => current = next,
                Ok(None) => {
                    debug!("chamber {}: state machine terminated in {current}", ctx.chamber_id);
                    return Ok(());
                }
                Err(e) => {
                    error!("chamber {}: error in state {current}: {e}", ctx.chamber_id);
                    match &self.error_state {
                        Some(err_state) if err_state != &current => {
                            current = err_state.clone();
                        }
                        _ => return Err(e),
                    }
                }
            }
        }
    }
}
