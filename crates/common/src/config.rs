use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default number of ticks of per-tick input history kept by the client.
pub const DEFAULT_INPUT_HISTORY_TICKS: u32 = 64;

/// Errors from loading or validating a tick-rate configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported config format: {0:?}")]
    UnsupportedFormat(String),
    #[error("fixed_time_step must be finite and positive, got {0}")]
    InvalidTimeStep(f64),
    #[error("partial_tick_clamp_threshold_pct must be finite, got {0}")]
    InvalidClampThreshold(f32),
    #[error("input_history_ticks must be at least 1")]
    EmptyInputHistory,
}

/// How the host should pace frames. Informational to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameRateMode {
    /// Spin until the next tick is due.
    #[default]
    BusyWait,
    /// Sleep for the time remaining until the next tick.
    Sleep,
}

/// Tick-rate configuration shared by the server and client drivers.
///
/// Batch-size limits below 1 are accepted and clamped to 1 by the accessors;
/// only a broken time step is rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickRateConfig {
    /// Simulated seconds per tick.
    pub fixed_time_step: f64,
    /// Maximum server invocations per frame.
    pub max_steps_per_frame: i32,
    /// Maximum ticks a single server catch-up invocation may cover.
    pub max_batch_length: i32,
    /// Rollback batch cap while replaying already predicted history.
    pub max_batch_size_repeat: i32,
    /// Rollback batch cap once predicting ticks for the first time.
    pub max_batch_size_first_time: i32,
    pub frame_rate_mode: FrameRateMode,
    /// Percentage of a tick around each boundary that snaps to the boundary
    /// for presentation time.
    pub partial_tick_clamp_threshold_pct: f32,
    /// Skip prediction entirely while no predicted entity exists.
    pub require_predicted_ghost: bool,
    /// Ticks of input history retained; older rollback ticks are dropped.
    pub input_history_ticks: u32,
}

impl Default for TickRateConfig {
    fn default() -> Self {
        Self {
            fixed_time_step: 1.0 / 60.0,
            max_steps_per_frame: 4,
            max_batch_length: 4,
            max_batch_size_repeat: 1,
            max_batch_size_first_time: 1,
            frame_rate_mode: FrameRateMode::BusyWait,
            partial_tick_clamp_threshold_pct: 5.0,
            require_predicted_ghost: false,
            input_history_ticks: DEFAULT_INPUT_HISTORY_TICKS,
        }
    }
}

impl TickRateConfig {
    /// Configuration ticking at `rate` Hz with all other options defaulted.
    pub fn with_tick_rate(rate: u32) -> Self {
        Self {
            fixed_time_step: 1.0 / f64::from(rate.max(1)),
            ..Self::default()
        }
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.yaml`/`.yml` or `.json` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let config = match ext.as_str() {
            "yaml" | "yml" => Self::from_yaml_str(&text)?,
            "json" => Self::from_json_str(&text)?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };
        tracing::debug!(path = %path.display(), "loaded tick rate config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.fixed_time_step.is_finite() || self.fixed_time_step <= 0.0 {
            return Err(ConfigError::InvalidTimeStep(self.fixed_time_step));
        }
        if !self.partial_tick_clamp_threshold_pct.is_finite() {
            return Err(ConfigError::InvalidClampThreshold(
                self.partial_tick_clamp_threshold_pct,
            ));
        }
        if self.input_history_ticks == 0 {
            return Err(ConfigError::EmptyInputHistory);
        }
        Ok(())
    }

    pub fn max_steps(&self) -> u32 {
        self.max_steps_per_frame.max(1) as u32
    }

    pub fn max_batch(&self) -> u32 {
        self.max_batch_length.max(1) as u32
    }

    pub fn batch_size_repeat(&self) -> u32 {
        self.max_batch_size_repeat.max(1) as u32
    }

    pub fn batch_size_first_time(&self) -> u32 {
        self.max_batch_size_first_time.max(1) as u32
    }

    /// Clamp band as a fraction of a tick, limited to `[0, 0.5]`.
    pub fn partial_tick_clamp_threshold(&self) -> f32 {
        (self.partial_tick_clamp_threshold_pct / 100.0).clamp(0.0, 0.5)
    }

    /// Retained input history in ticks, never below one.
    pub fn input_history(&self) -> u32 {
        self.input_history_ticks.max(1)
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(self.fixed_time_step)
    }
}
