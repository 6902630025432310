//! Manager Configuration

use serde::{Deserialize, Serialize};

/// Overall manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Volume applied to applications with no persisted record
    pub default_volume: f32,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            default_volume: 1.0,
        }
    }
}

impl ManagerConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.default_volume) {
            return Err(format!("Invalid default volume: {}", self.default_volume));
        }
        Ok(())
    }
}
