//! Render target capability interface

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use viva_core::{VivaError, VivaResult};

/// Expression chosen by position or by name
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExpressionRef {
    Index(usize),
    Name(String),
}

impl fmt::Display for ExpressionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpressionRef::Index(i) => write!(f, "#{}", i),
            ExpressionRef::Name(name) => write!(f, "{}", name),
        }
    }
}

/// Capabilities of a loaded character model
///
/// Every method may fail with `MissingCapability` when the model does not
/// have the parameter, group or expression asked for.
pub trait RenderTarget: Send {
    /// Current value of a named mouth parameter
    fn mouth_parameter(&self, name: &str) -> VivaResult<f32>;

    fn set_mouth_parameter(&mut self, name: &str, value: f32) -> VivaResult<()>;

    /// Start motion `index` of `group` at `priority`
    fn play_motion(&mut self, group: &str, index: usize, priority: u8) -> VivaResult<()>;

    /// Motion names in `group`, empty if the group does not exist
    fn list_motions(&self, group: &str) -> Vec<String>;

    fn list_expressions(&self) -> Vec<String>;

    fn set_expression(&mut self, expression: &ExpressionRef) -> VivaResult<()>;

    fn reset_expression(&mut self) -> VivaResult<()>;

    /// Drive the model's own audio-based lip sync with a complete WAV file
    fn speak(&mut self, _wav: &[u8], _volume: f32) -> VivaResult<()> {
        Err(missing("speak"))
    }

    fn stop_motions(&mut self) -> VivaResult<()> {
        Ok(())
    }
}

/// Render target shared between the driver and manual UI writes
///
/// Writes from both sides are not ordered; the last one wins.
pub type SharedTarget = Arc<Mutex<dyn RenderTarget>>;

pub fn shared<T: RenderTarget + 'static>(target: T) -> SharedTarget {
    Arc::new(Mutex::new(target))
}

/// `MissingCapability` error for `what`
pub fn missing(what: impl Into<String>) -> VivaError {
    VivaError::MissingCapability(what.into())
}

/// Target with parameters only, no motions or expressions
///
/// Used when no model is loaded.
#[derive(Debug, Default)]
pub struct NullTarget {
    parameters: HashMap<String, f32>,
}

impl NullTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose a parameter so it can be written
    pub fn with_parameter(mut self, name: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), 0.0);
        self
    }
}

impl RenderTarget for NullTarget {
    fn mouth_parameter(&self, name: &str) -> VivaResult<f32> {
        self.parameters.get(name).copied().ok_or_else(|| missing(name))
    }

    fn set_mouth_parameter(&mut self, name: &str, value: f32) -> VivaResult<()> {
        match self.parameters.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(missing(name)),
        }
    }

    fn play_motion(&mut self, group: &str, _index: usize, _priority: u8) -> VivaResult<()> {
        Err(missing(format!("motion group {group}")))
    }

    fn list_motions(&self, _group: &str) -> Vec<String> {
        Vec::new()
    }

    fn list_expressions(&self) -> Vec<String> {
        Vec::new()
    }

    fn set_expression(&mut self, expression: &ExpressionRef) -> VivaResult<()> {
        Err(missing(format!("expression {expression}")))
    }

    fn reset_expression(&mut self) -> VivaResult<()> {
        Ok(())
    }
}
