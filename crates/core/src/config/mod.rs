use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Top-level configuration structure for the trainer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub filter: FilterConfig,
    pub history: HistoryConfig,
    pub persistence: PersistenceConfig,
    pub sync: SyncConfig,
    pub sensor: SensorConfig,
    pub matcher: MatcherConfig,
}

impl AppConfig {
    /// Parses a configuration document. Absent fields keep their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Reads and parses a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}

/// Smoothing applied to every raw axis value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub alpha: f32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self { alpha: 0.5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Number of conditioned readings kept for display.
    pub capacity: usize,
    /// Upper bound on the readings captured by a single recording.
    pub max_sample_len: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: 30,
            max_sample_len: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub debounce_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self { debounce_ms: 1000 }
    }
}

/// Settings for the request/response channel to the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Value of the envelope `type` field.
    pub channel: String,
    pub ext_id: String,
    pub request_timeout_ms: u64,
    /// Resends allowed after the first attempt times out.
    pub max_retries: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            channel: "pxtpkgext".to_string(),
            ext_id: "gesture-trainer".to_string(),
            request_timeout_ms: 5000,
            max_retries: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Token that opens an acceleration triple in the console stream.
    pub marker: String,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            marker: "A".to_string(),
        }
    }
}

/// Tuning for the bundled template matcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub threshold_margin: f32,
    pub min_threshold: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            threshold_margin: 1.25,
            min_threshold: 50.0,
        }
    }
}
