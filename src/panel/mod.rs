//! Named chamber components over a [`HardwareLink`]: digital output
//! (on/off/pulse), digital input with edge-triggered event capture,
//! and the audio sink.
//!
//! Edge detection is polled, not interrupt-driven: the sample period
//! is fixed at 15ms and lives in [`SAMPLE_PERIOD`], matched by the
//! polling primitives in [`crate::engine::primitives`].

use std::thread;
use std::time::Duration;

use spin_sleep::SpinSleeper;

use crate::error::LinkError;
use crate::hardware::{HardwareLink, HOUSE_LIGHT_CHANNEL, SOLENOID_CHANNEL};

pub const SAMPLE_PERIOD: Duration = Duration::from_millis(15);

/// The two pollable digital inputs a panel exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputComponent {
    TrialSensor,
    ResponseSensor,
}

/// A digital output component (house light, solenoid).
pub struct DigitalOutput {
    link_channel: u8,
}

impl DigitalOutput {
    pub fn on(&self, link: &mut HardwareLink) -> Result<(), LinkError> {
        link.write(self.link_channel, true)
    }

    pub fn off(&self, link: &mut HardwareLink) -> Result<(), LinkError> {
        link.write(self.link_channel, false)
    }

    pub fn pulse(&self, link: &mut HardwareLink, duration: Duration) -> Result<(), LinkError> {
        self.on(link)?;
        thread::sleep(duration);
        self.off(link)
    }
}

/// A digital input component (trial sensor, response sensor) with a
/// rising-edge detector sampled at [`SAMPLE_PERIOD`].
pub struct DigitalInput {
    link_channel: u8,
    last_level: bool,
    pending_event: bool,
}

impl DigitalInput {
    fn new(link_channel: u8) -> Self {
        DigitalInput {
            link_channel,
            last_level: false,
            pending_event: false,
        }
    }

    pub fn status(&mut self, link: &mut HardwareLink) -> Result<bool, LinkError> {
        link.read_level(self.link_channel)
    }

    /// Sample once, updating the edge detector. Call on a
    /// [`SAMPLE_PERIOD`] cadence from the polling primitives.
    pub fn sample(&mut self, link: &mut HardwareLink) -> Result<(), LinkError> {
        let level = link.read_level(self.link_channel)?;
        if level && !self.last_level {
            self.pending_event = true;
        }
        self.last_level = level;
        Ok(())
    }

    /// Read-and-clear: true exactly once per rising edge since the
    /// last call.
    pub fn consume_event(&mut self) -> bool {
        std::mem::replace(&mut self.pending_event, false)
    }
}

/// The audio sink. Playback is fire-and-forget from the engine's
/// perspective: `play` starts it and returns immediately.
pub struct Speaker {
    queued: Option<std::path::PathBuf>,
    playing: bool,
}

impl Speaker {
    fn new() -> Self {
        Speaker {
            queued: None,
            playing: false,
        }
    }

    pub fn queue(&mut self, path: std::path::PathBuf) {
        self.queued = Some(path);
    }

    pub fn play(&mut self) {
        self.playing = self.queued.is_some();
    }

    pub fn stop(&mut self) {
        self.playing = false;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }
}

/// All named components for one chamber, backed by a single
/// exclusively-owned [`HardwareLink`].
pub struct Panel {
    link: HardwareLink,
    pub house_light: DigitalOutput,
    pub solenoid: DigitalOutput,
    pub trial_sensor: DigitalInput,
    pub response_sensor: DigitalInput,
    pub speaker: Speaker,
    sleeper: SpinSleeper,
}

impl Panel {
    pub fn new(
        mut link: HardwareLink,
        trial_sensor_channel: u8,
        response_sensor_channel: u8,
    ) -> Result<Self, LinkError> {
        link.configure(HOUSE_LIGHT_CHANNEL, true)?;
        link.configure(SOLENOID_CHANNEL, true)?;
        link.configure(trial_sensor_channel, false)?;
        link.configure(response_sensor_channel, false)?;

        Ok(Panel {
            link,
            house_light: DigitalOutput {
                link_channel: HOUSE_LIGHT_CHANNEL,
            },
            solenoid: DigitalOutput {
                link_channel: SOLENOID_CHANNEL,
            },
            trial_sensor: DigitalInput::new(trial_sensor_channel),
            response_sensor: DigitalInput::new(response_sensor_channel),
            speaker: Speaker::new(),
            sleeper: SpinSleeper::default(),
        })
    }

    pub fn link(&mut self) -> &mut HardwareLink {
        &mut self.link
    }

    /// Open the solenoid, hold for `duration`, close it.
    pub fn reward(&mut self, duration: Duration) -> Result<(), LinkError> {
        self.solenoid.pulse(&mut self.link, duration)
    }

    pub fn house_light_on(&mut self) -> Result<(), LinkError> {
        self.house_light.on(&mut self.link)
    }

    pub fn house_light_off(&mut self) -> Result<(), LinkError> {
        self.house_light.off(&mut self.link)
    }

    fn input_mut(&mut self, component: InputComponent) -> &mut DigitalInput {
        match component {
            InputComponent::TrialSensor => &mut self.trial_sensor,
            InputComponent::ResponseSensor => &mut self.response_sensor,
        }
    }

    /// Sample one digital input, updating its edge detector.
    pub fn sample(&mut self, component: InputComponent) -> Result<(), LinkError> {
        match component {
            InputComponent::TrialSensor => self.trial_sensor.sample(&mut self.link),
            InputComponent::ResponseSensor => self.response_sensor.sample(&mut self.link),
        }
    }

    /// Read-and-clear the named input's pending rising-edge flag.
    pub fn consume_event(&mut self, component: InputComponent) -> bool {
        self.input_mut(component).consume_event()
    }

    /// Sample both digital inputs once and sleep the remainder of one
    /// [`SAMPLE_PERIOD`] tick.
    pub fn tick(&mut self) -> Result<(), LinkError> {
        let start = std::time::Instant::now();
        self.trial_sensor.sample(&mut self.link)?;
        self.response_sensor.sample(&mut self.link)?;
        let elapsed = start.elapsed();
        if elapsed < SAMPLE_PERIOD {
            self.sleeper.sleep(SAMPLE_PERIOD - elapsed);
        }
        Ok(())
    }
}
