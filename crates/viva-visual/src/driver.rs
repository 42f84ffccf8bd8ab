//! Lip-Sync Driver - mouth parameters, motions and expressions during speech
//!
//! ```text
//! Idle --start--> Active --stop/underrun--> Idle
//! ```
//!
//! While Active every display frame writes the latest mouth signal into the
//! model. Entering Active at stream start plays one talking motion; leaving
//! it puts the mouth back to neutral.

use serde::{Deserialize, Serialize};

use viva_core::{MouthSignal, VivaError, VivaResult};

use crate::{ExpressionRef, MotionChoice, MotionSelector, SharedTarget, DEFAULT_MOTION_GROUPS};

/// Driver configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LipSyncConfig {
    /// Parameter receiving mouth opening
    pub mouth_open_param: String,
    /// Parameter receiving mouth form
    pub mouth_form_param: String,
    /// Talking motion groups, tried in order
    pub motion_groups: Vec<String>,
    pub motion_priority: u8,
    /// Also pick a random expression when speech starts
    pub expression_on_start: bool,
    /// Reset the expression when speech ends
    pub reset_expression_on_stop: bool,
    /// Expression to return to instead of the model default
    pub default_expression: Option<usize>,
    /// Write mouth parameters each frame. Off when the model does its own lip sync.
    pub write_mouth: bool,
    /// Fixed seed for motion selection
    pub seed: Option<u64>,
}

impl Default for LipSyncConfig {
    fn default() -> Self {
        Self {
            mouth_open_param: "ParamMouthOpenY".to_string(),
            mouth_form_param: "ParamMouthForm".to_string(),
            motion_groups: DEFAULT_MOTION_GROUPS.iter().map(|g| g.to_string()).collect(),
            motion_priority: 3,
            expression_on_start: false,
            reset_expression_on_stop: false,
            default_expression: None,
            write_mouth: true,
            seed: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DriverState {
    #[default]
    Idle,
    Active,
}

/// What the frame callback asks of its scheduler
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameRequest {
    /// Schedule exactly one more frame
    Reschedule,
    /// Schedule nothing
    Stop,
}

/// One-shot frame scheduling guard
///
/// At most one frame request is outstanding. Once closed, no new request is
/// issued and a frame that was already pending is refused when it fires.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameGate {
    open: bool,
    pending: bool,
}

impl FrameGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow frames. Returns true if the caller must request one.
    pub fn open(&mut self) -> bool {
        self.open = true;
        self.request()
    }

    /// Refuse any further frames
    pub fn close(&mut self) {
        self.open = false;
    }

    /// A requested frame fired. Returns true if it should run.
    pub fn fire(&mut self) -> bool {
        self.pending = false;
        self.open
    }

    /// Ask for the next frame. Returns true if the caller must request it.
    pub fn request(&mut self) -> bool {
        if !self.open || self.pending {
            return false;
        }
        self.pending = true;
        true
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }
}

/// Pushes mouth signals and talking gestures into the render target
pub struct LipSyncDriver {
    config: LipSyncConfig,
    target: SharedTarget,
    selector: MotionSelector,
    state: DriverState,
    last_signal: MouthSignal,
    frames_written: u64,
    motions_played: u64,
}

impl LipSyncDriver {
    pub fn new(config: LipSyncConfig, target: SharedTarget) -> Self {
        let selector = MotionSelector::new(config.motion_groups.clone(), config.seed);
        Self {
            config,
            target,
            selector,
            state: DriverState::Idle,
            last_signal: MouthSignal::NEUTRAL,
            frames_written: 0,
            motions_played: 0,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == DriverState::Active
    }

    pub fn config(&self) -> &LipSyncConfig {
        &self.config
    }

    pub fn target(&self) -> &SharedTarget {
        &self.target
    }

    /// Frames in which the mouth was written
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn motions_played(&self) -> u64 {
        self.motions_played
    }

    pub fn last_signal(&self) -> MouthSignal {
        self.last_signal
    }

    /// Enter Active
    ///
    /// With `with_motion` a talking motion (and optionally an expression) is
    /// triggered. Returns the motion played, if any. Calling it while already
    /// Active changes nothing.
    pub fn start(&mut self, with_motion: bool) -> Option<MotionChoice> {
        if self.is_active() {
            return None;
        }
        self.state = DriverState::Active;
        tracing::debug!(with_motion, "lip sync active");

        if !with_motion {
            return None;
        }

        let mut target = self.target.lock();
        let choice = self.selector.pick_motion(&*target);
        if let Some(choice) = &choice {
            match target.play_motion(&choice.group, choice.index, self.config.motion_priority) {
                Ok(()) => self.motions_played += 1,
                Err(error) => tracing::debug!(%error, group = %choice.group, "talking motion not played"),
            }
        }

        if self.config.expression_on_start {
            if let Some(index) = self.selector.pick_expression(&*target) {
                if let Err(error) = target.set_expression(&ExpressionRef::Index(index)) {
                    tracing::debug!(%error, "expression not set");
                }
            }
        }
        choice
    }

    /// Write one frame's mouth signal
    pub fn tick(&mut self, signal: MouthSignal) -> FrameRequest {
        if !self.is_active() {
            return FrameRequest::Stop;
        }
        self.last_signal = signal;
        if self.config.write_mouth {
            self.write_mouth(signal);
            self.frames_written += 1;
        }
        FrameRequest::Reschedule
    }

    /// Leave Active, closing the mouth
    pub fn stop(&mut self) {
        if !self.is_active() {
            return;
        }
        self.state = DriverState::Idle;
        self.last_signal = MouthSignal::NEUTRAL;
        self.write_mouth(MouthSignal::NEUTRAL);

        if self.config.reset_expression_on_stop {
            let mut target = self.target.lock();
            let result = match self.config.default_expression {
                Some(index) => target.set_expression(&ExpressionRef::Index(index)),
                None => target.reset_expression(),
            };
            if let Err(error) = result {
                tracing::debug!(%error, "expression not reset");
            }
        }
        tracing::debug!("lip sync idle");
    }

    /// Stop every motion; used when a session is cancelled
    pub fn stop_motions(&mut self) {
        if let Err(error) = self.target.lock().stop_motions() {
            tracing::debug!(%error, "motions not stopped");
        }
    }

    /// Hand accumulated audio to the model's own lip sync
    pub fn feed_target_audio(&mut self, wav: &[u8], volume: f32) -> VivaResult<()> {
        self.target.lock().speak(wav, volume)
    }

    fn write_mouth(&self, signal: MouthSignal) {
        let mut target = self.target.lock();
        for (name, value) in [
            (&self.config.mouth_open_param, signal.open()),
            (&self.config.mouth_form_param, signal.form()),
        ] {
            match target.set_mouth_parameter(name, value) {
                Ok(()) | Err(VivaError::MissingCapability(_)) => {}
                Err(error) => tracing::trace!(%error, param = %name, "mouth write failed"),
            }
        }
    }
}
