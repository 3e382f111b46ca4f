//! Engine configuration loaded from an optional `guardian.toml`.
//!
//! A missing file is not an error; every knob has a default that matches the
//! shipped behavior.

use crate::core::error::GuardianError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct GuardianConfig {
    /// Interval between lightweight top-priority polls.
    pub local_interval_secs: u64,
    /// Interval between full comprehensive sweeps.
    pub sweep_interval_secs: u64,
    /// Minimum gap between outbound alerts of the same category.
    pub alert_cooldown_secs: u64,
    /// Occurrence count at which an issue becomes an escalation candidate.
    pub escalation_threshold: u32,
    /// Ring-buffer capacity of the repair log.
    pub repair_log_capacity: usize,
    /// When true, repairs are applied directly; otherwise every repair is
    /// simulated in the sandbox before commit.
    pub trusted_repairs: bool,
}

impl Default for GuardianConfig {
    fn default() -> Self {
        Self {
            local_interval_secs: 30,
            sweep_interval_secs: 120,
            alert_cooldown_secs: 30 * 60,
            escalation_threshold: 3,
            repair_log_capacity: 100,
            trusted_repairs: false,
        }
    }
}

/// Load config from `<root>/guardian.toml`, falling back to defaults.
pub fn load_config(root: &Path) -> Result<GuardianConfig, GuardianError> {
    let config_path = root.join("guardian.toml");
    if config_path.exists() {
        let content = fs::read_to_string(&config_path).map_err(GuardianError::IoError)?;
        let config: GuardianConfig =
            toml::from_str(&content).map_err(|e| GuardianError::ValidationError(e.to_string()))?;
        return Ok(config);
    }
    Ok(GuardianConfig::default())
}
