//! # Adaptive Chunk Timeouts
//!
//! Derives the "wait for chunk" bound from observed load latencies so the
//! controller neither gives up too early on a slow link nor hangs for the
//! worst case on a fast one.
//!
//! The estimate comes from a [`TimeoutEstimator`]. The default
//! [`EmaEstimator`] combines an exponential moving average with the 95th
//! percentile of a bounded history:
//!
//! ```text
//! timeout = clamp(max(ema * multiplier, p95 * margin), min, max)
//! ```
//!
//! With no history the configured initial timeout is used.
//!
//! ```rust
//! use core_playback::timeout::AdaptiveTimeoutManager;
//! use core_playback::config::AdaptiveTimeoutConfig;
//!
//! let manager = AdaptiveTimeoutManager::new(AdaptiveTimeoutConfig::default());
//! assert_eq!(manager.get_timeout_ms(), 10_000);
//!
//! manager.record_chunk_load(0, 1_000);
//! assert_eq!(manager.get_timeout_ms(), 3_000);
//! ```

use crate::config::AdaptiveTimeoutConfig;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tracing::trace;

/// Turns observed latencies into a timeout.
pub trait TimeoutEstimator: Send {
    /// Feed one observed latency.
    fn observe(&mut self, sample: Duration);

    /// The bound to use for the next wait.
    fn current_timeout(&self) -> Duration;

    /// Forget all history.
    fn reset(&mut self);

    fn sample_count(&self) -> usize;

    /// Smoothed latency in milliseconds, if the estimator tracks one.
    fn ema_ms(&self) -> Option<f64> {
        None
    }

    /// 95th percentile latency in milliseconds, if the estimator tracks one.
    fn p95_ms(&self) -> Option<f64> {
        None
    }
}

/// EMA plus percentile estimator over a bounded history.
#[derive(Debug, Clone)]
pub struct EmaEstimator {
    config: AdaptiveTimeoutConfig,
    ema_ms: Option<f64>,
    history: VecDeque<f64>,
}

impl EmaEstimator {
    pub fn new(config: AdaptiveTimeoutConfig) -> Self {
        let capacity = config.history_size;
        Self {
            config,
            ema_ms: None,
            history: VecDeque::with_capacity(capacity),
        }
    }

    /// Nearest-rank percentile of the history.
    fn percentile_ms(&self, percentile: f64) -> Option<f64> {
        if self.history.is_empty() {
            return None;
        }
        let mut sorted: Vec<f64> = self.history.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let rank = (percentile * sorted.len() as f64).ceil() as usize;
        let index = rank.clamp(1, sorted.len()) - 1;
        Some(sorted[index])
    }
}

impl TimeoutEstimator for EmaEstimator {
    fn observe(&mut self, sample: Duration) {
        let sample_ms = sample.as_secs_f64() * 1000.0;
        let alpha = self.config.alpha;

        self.ema_ms = Some(match self.ema_ms {
            Some(previous) => alpha * sample_ms + (1.0 - alpha) * previous,
            None => sample_ms,
        });

        if self.history.len() == self.config.history_size {
            self.history.pop_front();
        }
        self.history.push_back(sample_ms);
    }

    fn current_timeout(&self) -> Duration {
        let (Some(ema), Some(p95)) = (self.ema_ms, self.percentile_ms(0.95)) else {
            return self.config.initial_timeout;
        };

        let candidate_ms = (ema * self.config.multiplier).max(p95 * self.config.percentile_margin);
        let min_ms = self.config.min_timeout.as_secs_f64() * 1000.0;
        let max_ms = self.config.max_timeout.as_secs_f64() * 1000.0;

        Duration::from_millis(candidate_ms.clamp(min_ms, max_ms).round() as u64)
    }

    fn reset(&mut self) {
        self.ema_ms = None;
        self.history.clear();
    }

    fn sample_count(&self) -> usize {
        self.history.len()
    }

    fn ema_ms(&self) -> Option<f64> {
        self.ema_ms
    }

    fn p95_ms(&self) -> Option<f64> {
        self.percentile_ms(0.95)
    }
}

/// Snapshot of the timeout estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeoutStats {
    pub samples: usize,
    pub ema_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub last_chunk: Option<usize>,
    pub current_timeout_ms: u64,
}

struct ManagerState {
    estimator: Box<dyn TimeoutEstimator>,
    last_chunk: Option<usize>,
}

/// Shared, internally synchronized front for a [`TimeoutEstimator`].
pub struct AdaptiveTimeoutManager {
    state: Mutex<ManagerState>,
}

impl AdaptiveTimeoutManager {
    pub fn new(config: AdaptiveTimeoutConfig) -> Self {
        Self::with_estimator(Box::new(EmaEstimator::new(config)))
    }

    pub fn with_estimator(estimator: Box<dyn TimeoutEstimator>) -> Self {
        Self {
            state: Mutex::new(ManagerState {
                estimator,
                last_chunk: None,
            }),
        }
    }

    pub fn get_timeout(&self) -> Duration {
        self.state.lock().estimator.current_timeout()
    }

    pub fn get_timeout_ms(&self) -> u64 {
        self.get_timeout().as_millis() as u64
    }

    pub fn get_timeout_seconds(&self) -> f64 {
        self.get_timeout().as_secs_f64()
    }

    /// Record how long the wait for `chunk_index` took, in milliseconds.
    pub fn record_chunk_load(&self, chunk_index: usize, load_ms: u64) {
        self.record_duration(chunk_index, Duration::from_millis(load_ms));
    }

    pub fn record_duration(&self, chunk_index: usize, elapsed: Duration) {
        let mut state = self.state.lock();
        state.estimator.observe(elapsed);
        state.last_chunk = Some(chunk_index);
        trace!(
            chunk_index,
            elapsed_ms = elapsed.as_millis() as u64,
            timeout_ms = state.estimator.current_timeout().as_millis() as u64,
            "Recorded chunk load latency"
        );
    }

    /// Forget all history. Called when a new track is loaded.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.estimator.reset();
        state.last_chunk = None;
    }

    pub fn stats(&self) -> TimeoutStats {
        let state = self.state.lock();
        TimeoutStats {
            samples: state.estimator.sample_count(),
            ema_ms: state.estimator.ema_ms(),
            p95_ms: state.estimator.p95_ms(),
            last_chunk: state.last_chunk,
            current_timeout_ms: state.estimator.current_timeout().as_millis() as u64,
        }
    }
}

impl Default for AdaptiveTimeoutManager {
    fn default() -> Self {
        Self::new(AdaptiveTimeoutConfig::default())
    }
}

impl fmt::Debug for AdaptiveTimeoutManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptiveTimeoutManager")
            .field("stats", &self.stats())
            .finish()
    }
}
