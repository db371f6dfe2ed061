//! Mutable per-session context threaded through every state.

use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::ExperimentConfig;
use crate::logger::{Trial, TrialClass, TrialLogger, TrialResponse};
use crate::panel::Panel;

/// A trial class / stimulus pairing the `play_audio` primitive asks
/// a caller-supplied provider to resolve to a file path.
pub type StimulusProvider = Box<dyn FnMut(TrialClass) -> Option<std::path::PathBuf> + Send>;

pub struct SessionCtx {
    pub chamber_id: usize,
    pub panel: Panel,
    pub config: ExperimentConfig,
    pub logger: TrialLogger,
    pub rng: StdRng,
    pub stimulus: StimulusProvider,

    /// Current training block, 1-based.
    pub block: usize,
    pub block_entry: Instant,
    pub responded: bool,
    pub response_count: u32,
    pub trial_index: usize,

    /// Set by `pre_reward`/response-handling primitives before the
    /// trial is logged; cleared at the start of every trial.
    pub current_class: Option<TrialClass>,
    pub current_response: Option<TrialResponse>,
    pub current_latency: Option<f64>,
}

impl SessionCtx {
    pub fn new(
        chamber_id: usize,
        panel: Panel,
        config: ExperimentConfig,
        logger: TrialLogger,
        stimulus: StimulusProvider,
    ) -> Self {
        SessionCtx {
            chamber_id,
            panel,
            config,
            logger,
            rng: StdRng::from_os_rng(),
            stimulus,
            block: 1,
            block_entry: Instant::now(),
            responded: false,
            response_count: 0,
            trial_index: 0,
            current_class: None,
            current_response: None,
            current_latency: None,
        }
    }

    pub fn enter_block(&mut self, block: usize) {
        self.block = block;
        self.block_entry = Instant::now();
        self.responded = false;
        self.response_count = 0;
    }

    pub fn reset_trial(&mut self, class: TrialClass) {
        self.trial_index += 1;
        self.current_class = Some(class);
        self.current_response = None;
        self.current_latency = None;
    }

    /// Emit the current trial to the logger and clear the scratch
    /// fields.
    pub fn log_trial(
        &mut self,
        response: TrialResponse,
        reward_issued: bool,
        punish_issued: bool,
    ) -> Result<(), crate::error::OperantError> {
        let class = self
            .current_class
            .ok_or(crate::error::StimulusError::NoActiveTrial)?;
        let trial = Trial {
            session_index: self.trial_index,
            index: self.trial_index,
            stimulus_path: String::new(),
            class,
            response,
            response_latency_seconds: self.current_latency,
            reward_issued,
            punish_issued,
            timestamp: chrono::Local::now(),
        };
        self.logger.append(&trial)?;
        self.current_response = Some(response);
        Ok(())
    }
}
