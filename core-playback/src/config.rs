//! # Playback Configuration
//!
//! Configuration types for the playback controller, the adaptive timeout
//! estimator and the chunk preloader.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Playback controller configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// How often `play()`/`seek()` re-check the chunk registry while waiting.
    ///
    /// Default: 50 ms.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: Duration,

    /// Adaptive wait bound settings.
    #[serde(default)]
    pub timeout: AdaptiveTimeoutConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            timeout: AdaptiveTimeoutConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.poll_interval.is_zero() {
            return Err("poll_interval must be > 0".to_string());
        }
        self.timeout.validate()
    }
}

/// Settings for the exponential-moving-average timeout estimator.
///
/// With history, the timeout is
/// `clamp(max(ema * multiplier, p95 * percentile_margin), min_timeout, max_timeout)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveTimeoutConfig {
    /// Timeout used before any load has been observed.
    ///
    /// Default: 10 seconds.
    #[serde(default = "default_initial_timeout")]
    pub initial_timeout: Duration,

    /// Lower bound.
    ///
    /// Default: 2 seconds.
    #[serde(default = "default_min_timeout")]
    pub min_timeout: Duration,

    /// Upper bound.
    ///
    /// Default: 30 seconds.
    #[serde(default = "default_max_timeout")]
    pub max_timeout: Duration,

    /// EMA smoothing factor in (0, 1]. Higher reacts faster.
    ///
    /// Default: 0.3.
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    /// Headroom applied to the EMA.
    ///
    /// Default: 3.0.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Headroom applied to the 95th percentile.
    ///
    /// Default: 1.25.
    #[serde(default = "default_percentile_margin")]
    pub percentile_margin: f64,

    /// Number of recent samples kept for the percentile.
    ///
    /// Default: 20.
    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

impl Default for AdaptiveTimeoutConfig {
    fn default() -> Self {
        Self {
            initial_timeout: default_initial_timeout(),
            min_timeout: default_min_timeout(),
            max_timeout: default_max_timeout(),
            alpha: default_alpha(),
            multiplier: default_multiplier(),
            percentile_margin: default_percentile_margin(),
            history_size: default_history_size(),
        }
    }
}

impl AdaptiveTimeoutConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_timeout.is_zero() {
            return Err("min_timeout must be > 0".to_string());
        }

        if self.min_timeout > self.max_timeout {
            return Err("min_timeout cannot exceed max_timeout".to_string());
        }

        if self.initial_timeout.is_zero() {
            return Err("initial_timeout must be > 0".to_string());
        }

        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err("alpha must be in (0.0, 1.0]".to_string());
        }

        if !(self.multiplier.is_finite() && self.multiplier >= 1.0) {
            return Err("multiplier must be >= 1.0".to_string());
        }

        if !(self.percentile_margin.is_finite() && self.percentile_margin >= 1.0) {
            return Err("percentile_margin must be >= 1.0".to_string());
        }

        if self.history_size == 0 {
            return Err("history_size must be > 0".to_string());
        }

        Ok(())
    }
}

/// Chunk preloader configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreloadConfig {
    /// Chunks fetched past the target (and its neighbours) at normal priority.
    ///
    /// Default: 2.
    #[serde(default = "default_lookahead_chunks")]
    pub lookahead_chunks: usize,

    /// Maximum loads in flight at once.
    ///
    /// Default: 3.
    #[serde(default = "default_max_concurrent_loads")]
    pub max_concurrent_loads: usize,
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            lookahead_chunks: default_lookahead_chunks(),
            max_concurrent_loads: default_max_concurrent_loads(),
        }
    }
}

impl PreloadConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_loads == 0 {
            return Err("max_concurrent_loads must be > 0".to_string());
        }

        if self.lookahead_chunks > 64 {
            return Err("lookahead_chunks cannot exceed 64".to_string());
        }

        Ok(())
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_poll_interval() -> Duration {
    Duration::from_millis(50)
}

fn default_initial_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_min_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_max_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_alpha() -> f64 {
    0.3
}

fn default_multiplier() -> f64 {
    3.0
}

fn default_percentile_margin() -> f64 {
    1.25
}

fn default_history_size() -> usize {
    20
}

fn default_lookahead_chunks() -> usize {
    2
}

fn default_max_concurrent_loads() -> usize {
    3
}
