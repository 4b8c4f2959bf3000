//! Search configuration
//!
//! [`MatchConfig`] holds every tunable of a search. It deserializes with
//! defaults for missing fields, so partial JSON/TOML requests are accepted:
//!
//! ```rust
//! use shapescan::config::{MatchConfig, Timeframe};
//!
//! let config = MatchConfig::for_timeframe(Timeframe::Weekly);
//! assert_eq!(config.max_lag, 1);
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};

use crate::dtw::DEFAULT_RADIUS;
use crate::search::default_window_sizes;
use crate::{MatchError, Result};

/// Distance at which similarity has decayed to `1/e`
pub const DEFAULT_SIMILARITY_SCALE: f64 = 100.0;
/// Recency horizon for daily bars
pub const DEFAULT_MAX_LAG: usize = 3;

// ============================================================
// TIMEFRAME
// ============================================================

/// Bar timeframe of the searched series
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[default]
    #[serde(rename = "1d")]
    Daily,
    #[serde(rename = "1wk")]
    Weekly,
    #[serde(rename = "1mo")]
    Monthly,
}

impl Timeframe {
    /// How many bars back a match may end and still count as forming now
    #[inline]
    pub fn default_max_lag(self) -> usize {
        match self {
            Timeframe::Daily => DEFAULT_MAX_LAG,
            Timeframe::Weekly | Timeframe::Monthly => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::Daily => "1d",
            Timeframe::Weekly => "1wk",
            Timeframe::Monthly => "1mo",
        }
    }
}

// ============================================================
// MATCH CONFIG
// ============================================================

/// Options for matching a pattern against one or many series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Sliding-search window; `None` uses the pattern length
    pub window_size: Option<usize>,
    /// Sliding-search step in bars
    pub step_size: usize,
    /// DTW band radius
    pub radius: usize,
    /// Only accept windows ending within `max_lag` bars of the last bar
    pub recent_only: bool,
    /// Recency-search window sizes; `None` derives them from the pattern length
    pub window_size_range: Option<Vec<usize>>,
    pub max_lag: usize,
    /// Decay constant of `exp(-distance / scale)`
    pub similarity_scale: f64,
    pub include_correlation: bool,
    /// Check timestamps and prices of each series before searching it
    pub validate_series: bool,
    /// Worker threads for batch ranking; `None` uses the global pool
    pub threads: Option<usize>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            window_size: None,
            step_size: 1,
            radius: DEFAULT_RADIUS,
            recent_only: true,
            window_size_range: None,
            max_lag: DEFAULT_MAX_LAG,
            similarity_scale: DEFAULT_SIMILARITY_SCALE,
            include_correlation: true,
            validate_series: true,
            threads: None,
        }
    }
}

/// Which window search a config resolves to for a given pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchStrategy {
    Sliding { window_size: usize, step: usize },
    Recent { window_sizes: Vec<usize>, max_lag: usize },
}

impl MatchConfig {
    pub fn for_timeframe(timeframe: Timeframe) -> Self {
        Self {
            max_lag: timeframe.default_max_lag(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.step_size == 0 {
            return Err(MatchError::InvalidConfig("step_size must be > 0".into()));
        }
        if let Some(size) = self.window_size {
            if size < 2 {
                return Err(MatchError::InvalidConfig(format!(
                    "window_size must be >= 2, got {size}"
                )));
            }
        }
        if let Some(ref sizes) = self.window_size_range {
            if sizes.is_empty() {
                return Err(MatchError::InvalidConfig(
                    "window_size_range cannot be empty".into(),
                ));
            }
            if let Some(&bad) = sizes.iter().find(|&&s| s < 2) {
                return Err(MatchError::InvalidConfig(format!(
                    "window_size_range entries must be >= 2, got {bad}"
                )));
            }
        }
        if !self.similarity_scale.is_finite() || self.similarity_scale <= 0.0 {
            return Err(MatchError::OutOfRange {
                field: "similarity_scale",
                value: self.similarity_scale,
                min: f64::MIN_POSITIVE,
                max: f64::MAX,
            });
        }
        if self.threads == Some(0) {
            return Err(MatchError::InvalidConfig("threads must be > 0".into()));
        }
        Ok(())
    }

    /// Resolve the search to run for a pattern of `pattern_len` points.
    pub fn strategy(&self, pattern_len: usize) -> SearchStrategy {
        if self.recent_only {
            SearchStrategy::Recent {
                window_sizes: self
                    .window_size_range
                    .clone()
                    .unwrap_or_else(|| default_window_sizes(pattern_len)),
                max_lag: self.max_lag,
            }
        } else {
            SearchStrategy::Sliding {
                window_size: self.window_size.unwrap_or(pattern_len),
                step: self.step_size,
            }
        }
    }
}

// ============================================================
// TESTS
// ============================================================
