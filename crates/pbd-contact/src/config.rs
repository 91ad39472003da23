use serde::{Deserialize, Serialize};

/// When an island may fall asleep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SleepConfig {
    /// Speed below which a body counts as resting.
    pub linear_threshold: f64,
    /// Angular speed below which a body counts as resting.
    pub angular_threshold: f64,
    /// Consecutive resting steps before the island sleeps.
    pub counter_threshold: usize,
}

impl Default for SleepConfig {
    fn default() -> Self {
        Self {
            linear_threshold: 1.0,
            angular_threshold: 1.0,
            counter_threshold: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactGraphConfig {
    /// Bucket edges by distance from anchors before color.
    pub use_levels: bool,
    pub sleep: SleepConfig,
}

impl Default for ContactGraphConfig {
    fn default() -> Self {
        Self {
            use_levels: true,
            sleep: SleepConfig::default(),
        }
    }
}
