//! Render target that records every capability call

use std::collections::HashMap;

use viva_core::VivaResult;
use viva_visual::{missing, ExpressionRef, RenderTarget};

pub const MOUTH_OPEN: &str = "ParamMouthOpenY";
pub const MOUTH_FORM: &str = "ParamMouthForm";

/// A played motion
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MotionRecord {
    pub group: String,
    pub index: usize,
    pub priority: u8,
}

/// In-memory character model
#[derive(Debug, Default)]
pub struct RecordingTarget {
    params: HashMap<String, f32>,
    groups: HashMap<String, Vec<String>>,
    expressions: Vec<String>,
    can_speak: bool,

    /// Every successful parameter write, in order
    pub writes: Vec<(String, f32)>,
    pub motions: Vec<MotionRecord>,
    pub expression: Option<ExpressionRef>,
    pub expression_resets: u64,
    /// (wav length, volume) per `speak`
    pub spoken: Vec<(usize, f32)>,
    pub motion_stops: u64,
}

impl RecordingTarget {
    /// Model with mouth parameters, `TapBody`/`Idle` motions and three expressions
    pub fn new() -> Self {
        let mut target = Self::bare()
            .with_parameter(MOUTH_OPEN)
            .with_parameter(MOUTH_FORM)
            .with_motions("TapBody", 3)
            .with_motions("Idle", 2);
        target.expressions = vec!["smile".into(), "surprised".into(), "sad".into()];
        target
    }

    /// Model with nothing at all
    pub fn bare() -> Self {
        Self::default()
    }

    pub fn with_parameter(mut self, name: &str) -> Self {
        self.params.insert(name.to_string(), 0.0);
        self
    }

    pub fn with_motions(mut self, group: &str, count: usize) -> Self {
        let names = (0..count).map(|i| format!("{group}_{i:02}")).collect();
        self.groups.insert(group.to_string(), names);
        self
    }

    /// Accept accumulated WAV audio
    pub fn speaking(mut self) -> Self {
        self.can_speak = true;
        self
    }

    /// Current value, 0 for unknown parameters
    pub fn param(&self, name: &str) -> f32 {
        self.params.get(name).copied().unwrap_or(0.0)
    }

    /// Writes of `name` with a value other than zero
    pub fn nonzero_writes(&self, name: &str) -> usize {
        self.writes
            .iter()
            .filter(|(param, value)| param == name && *value != 0.0)
            .count()
    }

    pub fn max_written(&self, name: &str) -> f32 {
        self.writes
            .iter()
            .filter(|(param, _)| param == name)
            .map(|(_, value)| *value)
            .fold(0.0, f32::max)
    }
}

impl RenderTarget for RecordingTarget {
    fn mouth_parameter(&self, name: &str) -> VivaResult<f32> {
        self.params.get(name).copied().ok_or_else(|| missing(name))
    }

    fn set_mouth_parameter(&mut self, name: &str, value: f32) -> VivaResult<()> {
        let slot = self.params.get_mut(name).ok_or_else(|| missing(name))?;
        *slot = value;
        self.writes.push((name.to_string(), value));
        Ok(())
    }

    fn play_motion(&mut self, group: &str, index: usize, priority: u8) -> VivaResult<()> {
        let count = self.groups.get(group).map_or(0, Vec::len);
        if index >= count {
            return Err(missing(format!("motion {group}[{index}]")));
        }
        self.motions.push(MotionRecord {
            group: group.to_string(),
            index,
            priority,
        });
        Ok(())
    }

    fn list_motions(&self, group: &str) -> Vec<String> {
        self.groups.get(group).cloned().unwrap_or_default()
    }

    fn list_expressions(&self) -> Vec<String> {
        self.expressions.clone()
    }

    fn set_expression(&mut self, expression: &ExpressionRef) -> VivaResult<()> {
        let known = match expression {
            ExpressionRef::Index(i) => *i < self.expressions.len(),
            ExpressionRef::Name(name) => self.expressions.iter().any(|e| e == name),
        };
        if !known {
            return Err(missing(format!("expression {expression}")));
        }
        self.expression = Some(expression.clone());
        Ok(())
    }

    fn reset_expression(&mut self) -> VivaResult<()> {
        self.expression = None;
        self.expression_resets += 1;
        Ok(())
    }

    fn speak(&mut self, wav: &[u8], volume: f32) -> VivaResult<()> {
        if !self.can_speak {
            return Err(missing("speak"));
        }
        self.spoken.push((wav.len(), volume));
        Ok(())
    }

    fn stop_motions(&mut self) -> VivaResult<()> {
        self.motion_stops += 1;
        Ok(())
    }
}
