//! The catalog of training paradigms. Each variant composes the
//! primitive factories in [`crate::engine::primitives`] into a block
//! graph matching the topology of the paradigm it names.
//!
//! The chamber panel exposes exactly two pollable sensors
//! (`trial_sensor`, `response_sensor`) rather than the richer
//! left/center/right peck arrays some of these paradigms were
//! historically run against; `trial_sensor` stands in for the
//! trial-initiation/center key and `response_sensor` for the
//! response key throughout. Block topology, reps/revert-timeout
//! semantics, and termination rules are unaffected by that
//! substitution.

use std::time::Duration;

use crate::config::{BlockParams, ExperimentConfig};
use crate::engine::primitives::*;
use crate::engine::runner::{StateFn, StateMachine};
use crate::error::ConfigError;
use crate::logger::{TrialClass, TrialResponse};
use crate::panel::InputComponent::{ResponseSensor, TrialSensor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shaper {
    TwoAc,
    GoNogoInterrupt { punish: bool },
    ThreeAc,
    ThreeAcMatching,
    GoNogo,
    FemalePref,
}

impl Shaper {
    pub fn parse(paradigm: &str) -> Result<Self, ConfigError> {
        match paradigm {
            "2ac" => Ok(Shaper::TwoAc),
            "gonogo_interrupt" => Ok(Shaper::GoNogoInterrupt { punish: false }),
            "gonogo_interrupt_punish" => Ok(Shaper::GoNogoInterrupt { punish: true }),
            "3ac" => Ok(Shaper::ThreeAc),
            "3ac_matching" => Ok(Shaper::ThreeAcMatching),
            "gonogo" => Ok(Shaper::GoNogo),
            "female_pref" => Ok(Shaper::FemalePref),
            other => Err(ConfigError::UnknownParadigm(other.to_string())),
        }
    }
}

fn block_params(config: &ExperimentConfig, idx: usize) -> BlockParams {
    config.blocks.get(idx).copied().unwrap_or(BlockParams {
        reps: 100,
        revert_timeout_secs: None,
    })
}

fn revert_duration(params: BlockParams) -> Option<Duration> {
    params.revert_timeout_secs.map(Duration::from_secs)
}

fn idle_poll(config: &ExperimentConfig) -> Duration {
    Duration::from_secs(config.idle_poll_interval_secs)
}

/// Build the runnable state graph for `paradigm`.
pub fn build_shaper(paradigm: &str, config: &ExperimentConfig) -> Result<StateMachine, ConfigError> {
    let shaper = Shaper::parse(paradigm)?;
    Ok(shaper.build(config))
}

impl Shaper {
    pub fn build(&self, config: &ExperimentConfig) -> StateMachine {
        match self {
            Shaper::TwoAc => build_2ac(config),
            Shaper::GoNogoInterrupt { punish } => build_gonogo_interrupt(config, *punish),
            Shaper::ThreeAc => build_3ac(config),
            Shaper::ThreeAcMatching => build_3ac_matching(config),
            Shaper::GoNogo => build_gonogo_stub(config),
            Shaper::FemalePref => build_female_pref_stub(config),
        }
    }
}

fn unimplemented_state(name: &'static str) -> StateFn {
    Box::new(move |_ctx: &mut crate::engine::session::SessionCtx| {
        Err(ConfigError::UnimplementedShaperBlock(name).into())
    })
}

/// `ShaperGoNogo`'s center-peck-without-flash block is declared but
/// was never implemented in the system this one replaces; reaching
/// it is a fatal configuration error.
fn build_gonogo_stub(config: &ExperimentConfig) -> StateMachine {
    let idle = idle_poll(config);
    let mut m = StateMachine::new("gate1").with_error_state("error");
    m.add_state("gate1", schedule_gate("center_peck_no_flash", "sleep1"));
    m.add_state("sleep1", sleep_block(idle, "gate1"));
    m.add_state(
        "center_peck_no_flash",
        unimplemented_state("ShaperGoNogo::_center_peck_no_flash_block"),
    );
    m.add_state("error", terminal_error_state());
    m
}

/// `ShaperFemalePref`'s two blocks were both left unimplemented.
fn build_female_pref_stub(config: &ExperimentConfig) -> StateMachine {
    let idle = idle_poll(config);
    let mut m = StateMachine::new("gate1").with_error_state("error");
    m.add_state("gate1", schedule_gate("pref_block1", "sleep1"));
    m.add_state("sleep1", sleep_block(idle, "gate1"));
    m.add_state("pref_block1", unimplemented_state("ShaperFemalePref::block1"));
    m.add_state("error", terminal_error_state());
    m
}

fn terminal_error_state() -> StateFn {
    Box::new(|ctx: &mut crate::engine::session::SessionCtx| {
        let _ = ctx.logger.log_error("shaping engine entered terminal error state");
        Ok(None)
    })
}

/// Two-alternative choice: hopper training, center-peck training,
/// then chained center→side trials with a flashing then non-flashing
/// center cue.
fn build_2ac(config: &ExperimentConfig) -> StateMachine {
    let idle = idle_poll(config);
    let b1 = block_params(config, 0);
    let b2 = block_params(config, 1);
    let b3 = block_params(config, 2);
    let b4 = block_params(config, 3);

    let mut m = StateMachine::new("gate1").with_error_state("error");

    // Block 1: hopper-VI. Any peck on the response key is rewarded.
    m.add_state("gate1", schedule_gate("b1_entry", "sleep1"));
    m.add_state("sleep1", sleep_block(idle, "gate1"));
    m.add_state("b1_entry", enter_block(1, "b1_begin"));
    m.add_state("b1_begin", begin_trial(TrialClass::SPlus, "b1_wait"));
    m.add_state("b1_wait", wait(10, 40, "b1_flash"));
    m.add_state("b1_flash", flash_poll(ResponseSensor, Duration::from_secs(5), "b1_wait", "b1_prereward"));
    m.add_state("b1_prereward", pre_reward(TrialResponse::SPlus, "b1_reward"));
    m.add_state("b1_reward", reward(Duration::from_secs(5), "b1_check"));
    m.add_state(
        "b1_check",
        check_and_route(b1.reps, revert_duration(b1), "gate2", "gate1", "gate1"),
    );

    // Block 2: center-peck training, flashing cue, 10s loop.
    m.add_state("gate2", schedule_gate("b2_entry", "sleep2"));
    m.add_state("sleep2", sleep_block(idle, "gate2"));
    m.add_state("b2_entry", enter_block(2, "b2_begin"));
    m.add_state("b2_begin", begin_trial(TrialClass::SPlus, "b2_flash"));
    m.add_state("b2_flash", flash_poll(TrialSensor, Duration::from_secs(10), "b2_flash", "b2_prereward"));
    m.add_state("b2_prereward", pre_reward(TrialResponse::SPlus, "b2_reward"));
    m.add_state("b2_reward", reward(Duration::from_secs(4), "b2_check"));
    m.add_state(
        "b2_check",
        check_and_route(b2.reps, revert_duration(b2), "gate3", "gate1", "gate2"),
    );

    // Block 3: center peck (flashing) then a response-key peck.
    m.add_state("gate3", schedule_gate("b3_entry", "sleep3"));
    m.add_state("sleep3", sleep_block(idle, "gate3"));
    m.add_state("b3_entry", enter_block(3, "b3_begin"));
    m.add_state("b3_begin", begin_trial(TrialClass::SPlus, "b3_center"));
    m.add_state("b3_center", flash_poll(TrialSensor, Duration::from_secs(10), "b3_center", "b3_side"));
    m.add_state("b3_side", poll(ResponseSensor, Duration::from_secs(10), "b3_center", "b3_prereward"));
    m.add_state("b3_prereward", pre_reward(TrialResponse::SPlus, "b3_reward"));
    m.add_state("b3_reward", reward(Duration::from_secs(3), "b3_check"));
    m.add_state(
        "b3_check",
        check_and_route(b3.reps, revert_duration(b3), "gate4", "gate2", "gate3"),
    );

    // Block 4: as block 3, but the center peck is not flashing.
    m.add_state("gate4", schedule_gate("b4_entry", "sleep4"));
    m.add_state("sleep4", sleep_block(idle, "gate4"));
    m.add_state("b4_entry", enter_block(4, "b4_begin"));
    m.add_state("b4_begin", begin_trial(TrialClass::SPlus, "b4_center"));
    m.add_state("b4_center", poll(TrialSensor, Duration::from_secs(10), "b4_center", "b4_side"));
    m.add_state("b4_side", poll(ResponseSensor, Duration::from_secs(10), "b4_center", "b4_prereward"));
    m.add_state("b4_prereward", pre_reward(TrialResponse::SPlus, "b4_reward"));
    m.add_state("b4_reward", reward(Duration::from_millis(2500), "b4_check"));
    m.add_state(
        "b4_check",
        check_and_route(b4.reps, revert_duration(b4), "done", "gate3", "gate4"),
    );
    m.add_state("done", Box::new(|_ctx: &mut crate::engine::session::SessionCtx| Ok(None)));

    m.add_state("error", terminal_error_state());
    m
}

/// Go/No-go with mid-trial interrupt: silent trainer, then the
/// gated stimulus-response block, then the same block without
/// passive reward. `punish` selects the variant that runs a
/// house-light-off punishment on an incorrect (sMinus) response.
fn build_gonogo_interrupt(config: &ExperimentConfig, punish_variant: bool) -> StateMachine {
    let idle = idle_poll(config);
    let b1 = block_params(config, 0);
    let b2 = block_params(config, 1);
    let b3 = block_params(config, 2);
    let punish_secs = config.punishment_duration_secs.unwrap_or(10);

    let mut m = StateMachine::new("gate1").with_error_state("error");

    // Block 1: silent reward trainer.
    m.add_state("gate1", schedule_gate("b1_entry", "sleep1"));
    m.add_state("sleep1", sleep_block(idle, "gate1"));
    m.add_state("b1_entry", enter_block(1, "b1_begin"));
    m.add_state("b1_begin", begin_trial(TrialClass::SPlus, "b1_wait"));
    m.add_state("b1_wait", wait(10, 40, "b1_poll"));
    m.add_state("b1_poll", poll(ResponseSensor, Duration::from_secs(5), "b1_prereward", "b1_prereward"));
    m.add_state("b1_prereward", pre_reward(TrialResponse::SPlus, "b1_reward"));
    m.add_state("b1_reward", reward(Duration::from_secs(1), "b1_check"));
    m.add_state(
        "b1_check",
        check_and_route(b1.reps, revert_duration(b1), "gate2", "gate1", "gate1"),
    );

    // Block 2: trial-gated stimulus, coin-flip sPlus/sMinus, audio,
    // then dual-poll trial vs response sensor.
    m.add_state("gate2", schedule_gate("b2_entry", "sleep2"));
    m.add_state("sleep2", sleep_block(idle, "gate2"));
    m.add_state("b2_entry", enter_block(2, "b2_cue_on"));
    m.add_state("b2_cue_on", light_poll(TrialSensor, Duration::from_secs(30), "b2_cue_on", "b2_choose"));
    m.add_state("b2_choose", random_choice(&["b2_audio_splus", "b2_audio_sminus"]));
    m.add_state("b2_audio_splus", play_audio(TrialClass::SPlus, "b2_lockout_splus"));
    m.add_state("b2_audio_sminus", play_audio(TrialClass::SMinus, "b2_lockout_sminus"));
    m.add_state("b2_lockout_splus", wait(0, 0, "b2_poll_splus"));
    m.add_state("b2_lockout_sminus", wait(0, 0, "b2_poll_sminus"));
    m.add_state(
        "b2_poll_splus",
        dual_poll(
            TrialSensor,
            ResponseSensor,
            Duration::from_secs(5),
            "b2_splus_timeout",
            "b2_splus_interrupted",
            "b2_splus_prereward",
        ),
    );
    m.add_state("b2_splus_interrupted", close_audio("b2_poll_splus"));
    m.add_state("b2_splus_prereward", pre_reward(TrialResponse::SPlus, "b2_splus_reward"));
    m.add_state("b2_splus_reward", reward(Duration::from_millis(500), "b2_close_splus_ok"));
    m.add_state("b2_close_splus_ok", close_audio("b2_check"));
    m.add_state("b2_splus_timeout", log_outcome(TrialResponse::None, false, "b2_splus_passive"));
    m.add_state("b2_splus_passive", reward(Duration::from_millis(500), "b2_close_splus_passive"));
    m.add_state("b2_close_splus_passive", close_audio("b2_check"));

    m.add_state(
        "b2_poll_sminus",
        dual_poll(
            TrialSensor,
            ResponseSensor,
            Duration::from_secs(5),
            "b2_sminus_exit",
            "b2_sminus_exit",
            "b2_sminus_exit",
        ),
    );
    m.add_state(
        "b2_sminus_exit",
        if punish_variant {
            log_outcome(TrialResponse::SMinus, true, "b2_sminus_punish")
        } else {
            log_outcome(TrialResponse::SMinus, false, "b2_close_sminus")
        },
    );
    m.add_state("b2_sminus_punish", punish(Duration::from_secs(punish_secs), "b2_close_sminus"));
    m.add_state("b2_close_sminus", close_audio("b2_check"));

    m.add_state(
        "b2_check",
        check_and_route(b2.reps, revert_duration(b2), "gate3", "gate1", "gate2"),
    );

    // Block 3: as block 2, without the passive reward on timeout.
    m.add_state("gate3", schedule_gate("b3_entry", "sleep3"));
    m.add_state("sleep3", sleep_block(idle, "gate3"));
    m.add_state("b3_entry", enter_block(3, "b3_cue_on"));
    m.add_state("b3_cue_on", light_poll(TrialSensor, Duration::from_secs(30), "b3_cue_on", "b3_choose"));
    m.add_state("b3_choose", random_choice(&["b3_audio_splus", "b3_audio_sminus"]));
    m.add_state("b3_audio_splus", play_audio(TrialClass::SPlus, "b3_poll_splus"));
    m.add_state("b3_audio_sminus", play_audio(TrialClass::SMinus, "b3_poll_sminus"));
    m.add_state(
        "b3_poll_splus",
        dual_poll(
            TrialSensor,
            ResponseSensor,
            Duration::from_secs(5),
            "b3_splus_timeout",
            "b3_splus_interrupted",
            "b3_splus_prereward",
        ),
    );
    m.add_state("b3_splus_interrupted", close_audio("b3_poll_splus"));
    m.add_state("b3_splus_prereward", pre_reward(TrialResponse::SPlus, "b3_splus_reward"));
    m.add_state("b3_splus_reward", reward(Duration::from_millis(500), "b3_close_splus_ok"));
    m.add_state("b3_close_splus_ok", close_audio("b3_check"));
    m.add_state("b3_splus_timeout", log_outcome(TrialResponse::None, false, "b3_close_splus_timeout"));
    m.add_state("b3_close_splus_timeout", close_audio("b3_check"));
    m.add_state(
        "b3_poll_sminus",
        dual_poll(
            TrialSensor,
            ResponseSensor,
            Duration::from_secs(5),
            "b3_sminus_exit",
            "b3_sminus_exit",
            "b3_sminus_exit",
        ),
    );
    m.add_state("b3_sminus_exit", log_outcome(TrialResponse::SMinus, false, "b3_close_sminus"));
    m.add_state("b3_close_sminus", close_audio("b3_check"));
    m.add_state(
        "b3_check",
        check_and_route(b3.reps, revert_duration(b3), "done", "gate2", "gate3"),
    );
    m.add_state("done", Box::new(|_ctx: &mut crate::engine::session::SessionCtx| Ok(None)));

    m.add_state("error", terminal_error_state());
    m
}

/// Three-alternative choice: as [`build_2ac`], with a three-way coin
/// flip fanning out to per-branch audio/poll chains.
fn build_3ac(config: &ExperimentConfig) -> StateMachine {
    build_nac(config, false)
}

/// Matching-to-sample variant: as [`build_3ac`], with each branch's
/// audio chosen via the stimulus provider rather than a fixed class.
fn build_3ac_matching(config: &ExperimentConfig) -> StateMachine {
    build_nac(config, true)
}

fn build_nac(config: &ExperimentConfig, matching: bool) -> StateMachine {
    let idle = idle_poll(config);
    let b1 = block_params(config, 0);
    let b2 = block_params(config, 1);

    let mut m = StateMachine::new("gate1").with_error_state("error");

    m.add_state("gate1", schedule_gate("b1_entry", "sleep1"));
    m.add_state("sleep1", sleep_block(idle, "gate1"));
    m.add_state("b1_entry", enter_block(1, "b1_begin"));
    m.add_state("b1_begin", begin_trial(TrialClass::SPlus, "b1_wait"));
    m.add_state("b1_wait", wait(10, 40, "b1_poll"));
    m.add_state("b1_poll", flash_poll(TrialSensor, Duration::from_secs(10), "b1_wait", "b1_prereward"));
    m.add_state("b1_prereward", pre_reward(TrialResponse::SPlus, "b1_reward"));
    m.add_state("b1_reward", reward(Duration::from_secs(4), "b1_check"));
    m.add_state(
        "b1_check",
        check_and_route(b1.reps, revert_duration(b1), "gate2", "gate1", "gate1"),
    );

    m.add_state("gate2", schedule_gate("b2_entry", "sleep2"));
    m.add_state("sleep2", sleep_block(idle, "gate2"));
    m.add_state("b2_entry", enter_block(2, "b2_center"));
    m.add_state("b2_center", flash_poll(TrialSensor, Duration::from_secs(10), "b2_center", "b2_choose"));
    m.add_state(
        "b2_choose",
        random_choice(&["b2_audio_a", "b2_audio_b", "b2_audio_c"]),
    );
    // `matching` selects the stimulus-class tag only; the actual file
    // resolution always goes through the session's stimulus provider,
    // which a matching-to-sample caller wires up to the comparison
    // stimulus for the chosen branch.
    let class_a = if matching { TrialClass::ProbePlus } else { TrialClass::SPlus };
    m.add_state("b2_audio_a", play_audio(class_a, "b2_poll_a"));
    m.add_state("b2_audio_b", play_audio(TrialClass::SMinus, "b2_poll_b"));
    m.add_state("b2_audio_c", play_audio(TrialClass::ProbeMinus, "b2_poll_c"));
    m.add_state("b2_poll_a", poll(ResponseSensor, Duration::from_secs(8), "b2_a_timeout", "b2_a_prereward"));
    m.add_state("b2_a_prereward", pre_reward(TrialResponse::SPlus, "b2_a_reward"));
    m.add_state("b2_a_reward", reward(Duration::from_secs(3), "b2_close_a"));
    m.add_state("b2_a_timeout", log_outcome(TrialResponse::None, false, "b2_close_a"));
    m.add_state("b2_close_a", close_audio("b2_check"));
    m.add_state("b2_poll_b", poll(ResponseSensor, Duration::from_secs(8), "b2_b_timeout", "b2_b_hit"));
    m.add_state("b2_b_hit", log_outcome(TrialResponse::SMinus, false, "b2_close_b"));
    m.add_state("b2_b_timeout", log_outcome(TrialResponse::None, false, "b2_close_b"));
    m.add_state("b2_close_b", close_audio("b2_check"));
    m.add_state("b2_poll_c", poll(ResponseSensor, Duration::from_secs(8), "b2_c_timeout", "b2_c_hit"));
    m.add_state("b2_c_hit", log_outcome(TrialResponse::SMinus, false, "b2_close_c"));
    m.add_state("b2_c_timeout", log_outcome(TrialResponse::None, false, "b2_close_c"));
    m.add_state("b2_close_c", close_audio("b2_check"));
    m.add_state(
        "b2_check",
        check_and_route(b2.reps, revert_duration(b2), "done", "gate1", "gate2"),
    );
    m.add_state("done", Box::new(|_ctx: &mut crate::engine::session::SessionCtx| Ok(None)));

    m.add_state("error", terminal_error_state());
    m
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_paradigms() {
        assert_eq!(Shaper::parse("2ac").unwrap(), Shaper::TwoAc);
        assert_eq!(
            Shaper::parse("gonogo_interrupt_punish").unwrap(),
            Shaper::GoNogoInterrupt { punish: true }
        );
    }

    #[test]
    fn unknown_paradigm_is_a_config_error() {
        assert!(matches!(
            Shaper::parse("not_a_real_paradigm"),
            Err(ConfigError::UnknownParadigm(_))
        ));
    }

    fn sample_config() -> ExperimentConfig {
        ExperimentConfig {
            subject: "z1".into(),
            paradigm: "2ac".into(),
            light_schedule: vec![crate::config::LightEpoch::parse("00:00", "23:59").unwrap()],
            blocks: vec![
                BlockParams { reps: 5, revert_timeout_secs: None },
                BlockParams { reps: 5, revert_timeout_secs: None },
                BlockParams { reps: 5, revert_timeout_secs: None },
                BlockParams { reps: 5, revert_timeout_secs: None },
            ],
            stimulus_dir: None,
            idle_poll_interval_secs: 1,
            punishment_duration_secs: Some(1),
            block_design_order: vec![],
        }
    }

    #[test]
    fn all_paradigms_build_without_panicking() {
        let cfg = sample_config();
        for shaper in [
            Shaper::TwoAc,
            Shaper::GoNogoInterrupt { punish: false },
            Shaper::GoNogoInterrupt { punish: true },
            Shaper::ThreeAc,
            Shaper::ThreeAcMatching,
            Shaper::GoNogo,
            Shaper::FemalePref,
        ] {
            let _m = shaper.build(&cfg);
        }
    }
}
