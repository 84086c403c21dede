//! Scheduler configuration (stop conditions and resource limits).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ForgecastResult, ValidationError};
use crate::time::SimTime;

/// Settings that bound and steer a scheduling run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Scheduling points after this time are not processed.
    pub horizon: Option<SimTime>,
    /// Also schedule at the next process completion of any state.
    pub follow_completions: bool,
    /// Maximum number of processed scheduling points.
    pub max_steps: usize,
    /// Maximum number of distinct world states after a step.
    pub max_states: usize,
    /// Evaluate per-state work on the rayon pool.
    pub parallel: bool,
    /// Allowed drift of total mass before a warning is logged.
    pub mass_tolerance: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            horizon: None,
            follow_completions: true,
            max_steps: 10_000,
            max_states: 100_000,
            parallel: false,
            mass_tolerance: 1e-9,
        }
    }
}

impl SchedulerConfig {
    /// Validate configuration.
    ///
    /// This is called when constructing a `Scheduler`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_steps == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "max_steps must be > 0".to_string(),
            });
        }
        if self.max_states == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "max_states must be > 0".to_string(),
            });
        }
        if !self.mass_tolerance.is_finite() || self.mass_tolerance < 0.0 {
            return Err(ValidationError::InvalidConfig {
                reason: format!(
                    "mass_tolerance must be finite and >= 0, got {}",
                    self.mass_tolerance
                ),
            });
        }
        Ok(())
    }

    /// Parses and validates a JSON configuration. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> ForgecastResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| ValidationError::InvalidConfig {
            reason: format!("failed to parse configuration: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> ForgecastResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ValidationError::InvalidConfig {
            reason: format!("failed to read {}: {e}", path.display()),
        })?;
        Self::from_json_str(&json)
    }
}
