//! Runtime configuration
//!
//! Every section has working defaults, so a JSON file only needs to name
//! what it changes:
//!
//! ```json
//! { "analyzer": { "gain": 4.0 }, "playback": { "max_buffered_chunks": 4 } }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use viva_core::{VivaError, VivaResult, DEFAULT_SAMPLE_RATE};
use viva_visual::LipSyncConfig;
use viva_voice::AnalyzerConfig;

use crate::LogConfig;

/// Session level behavior
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Voice requested when a session does not name one
    pub default_voice: String,
    /// Attach a WAV of the whole session to its `Finished` outcome
    pub export_recording: bool,
    /// Keep the text of every chunk
    pub keep_transcript: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            default_voice: "af_heart".to_string(),
            export_recording: false,
            keep_transcript: true,
        }
    }
}

/// Audio scheduling
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Rate of the producer's PCM
    pub sample_rate: u32,
    /// Chunks the engine may hold before credits are withheld. 0 disables the throttle.
    pub max_buffered_chunks: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            max_buffered_chunks: 16,
        }
    }
}

/// Async host settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Display refresh period driving lip-sync frames
    pub frame_interval_ms: u64,
    /// Capacity of the command channel
    pub command_capacity: usize,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 16,
            command_capacity: 32,
        }
    }
}

impl StageConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

/// Complete runtime configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub coordinator: CoordinatorConfig,
    pub playback: PlaybackConfig,
    pub analyzer: AnalyzerConfig,
    pub lipsync: LipSyncConfig,
    pub stage: StageConfig,
    pub log: LogConfig,
}

impl RuntimeConfig {
    pub fn from_json_str(text: &str) -> VivaResult<Self> {
        let config: RuntimeConfig =
            serde_json::from_str(text).map_err(|e| VivaError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> VivaResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| VivaError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    pub fn to_json_pretty(&self) -> VivaResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| VivaError::Config(e.to_string()))
    }

    pub fn validate(&self) -> VivaResult<()> {
        if self.playback.sample_rate == 0 {
            return Err(VivaError::Config("sample_rate must be positive".into()));
        }
        if self.stage.frame_interval_ms == 0 {
            return Err(VivaError::Config("frame_interval_ms must be positive".into()));
        }
        if self.stage.command_capacity == 0 {
            return Err(VivaError::Config("command_capacity must be positive".into()));
        }
        if self.lipsync.mouth_open_param.is_empty() || self.lipsync.mouth_form_param.is_empty() {
            return Err(VivaError::Config("mouth parameter names must not be empty".into()));
        }
        self.analyzer.validate()
    }
}
