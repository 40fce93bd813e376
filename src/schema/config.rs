//! Capture configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_workers() -> usize {
    2
}

fn default_drain_timeout_ms() -> u64 {
    10_000
}

/// Configuration for a capture session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Directory under which bundle directories are created.
    pub base_dir: PathBuf,
    /// Bundle directory name prefix (`<prefix>_<yyyyMMdd_HHmmss>.pcv`).
    pub bundle_prefix: String,
    /// Capture scheduling rate in frames per second; recorded in the
    /// bundle metadata and used to pace playback.
    pub frame_rate: f32,
    /// Background encode/write worker threads.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Maximum time `stop()` waits for in-flight encode jobs before
    /// abandoning them, in milliseconds.
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            bundle_prefix: "capture".to_string(),
            frame_rate: 30.0,
            workers: default_workers(),
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

impl CaptureConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.frame_rate.is_finite() && self.frame_rate > 0.0) {
            return Err(ConfigError::InvalidFrameRate(self.frame_rate));
        }
        if self.workers == 0 {
            return Err(ConfigError::InvalidWorkerCount);
        }
        if self.bundle_prefix.is_empty()
            || self.bundle_prefix.contains(['/', '\\'])
        {
            return Err(ConfigError::InvalidBundlePrefix(
                self.bundle_prefix.clone(),
            ));
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Frame rate must be positive and finite (got {0})")]
    InvalidFrameRate(f32),
    #[error("Worker count must be non-zero")]
    InvalidWorkerCount,
    #[error("Bundle prefix {0:?} is empty or contains path separators")]
    InvalidBundlePrefix(String),
}
