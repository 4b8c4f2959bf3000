//! # shapescan - shape-based price pattern search
//!
//! Ranks instruments by how closely their recent price history resembles a
//! query shape. Shapes are compared after z-score normalization with an
//! approximate dynamic time warping distance, so scale, offset and small
//! timing differences do not matter.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::collections::HashMap;
//! use shapescan::prelude::*;
//!
//! // (unix seconds, close)
//! let bars: Vec<(i64, f64)> = (0..120)
//!     .map(|i| (1_700_000_000 + i * 86_400, 100.0 + (i as f64 * 0.3).sin() * 4.0))
//!     .collect();
//! let mut data = HashMap::new();
//! data.insert("ACME".to_string(), bars);
//!
//! let engine = EngineBuilder::new().top_n(5).build().unwrap();
//! let query: Vec<f64> = (0..30).map(|i| (i as f64 * 0.3).sin()).collect();
//! let report = engine.search(&query, &["ACME"], &data).unwrap();
//! assert_eq!(report.results.searched, 1);
//! ```

pub mod config;
pub mod dtw;
pub mod matcher;
pub mod normalize;
pub mod ranker;
pub mod search;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{MatchConfig, Timeframe};
use crate::matcher::MatchResult;
use crate::normalize::{Pattern, PatternStats, DEFAULT_MIN_POINTS, DEFAULT_MIN_STD};
use crate::ranker::RankedMatchList;

pub mod prelude {
    pub use crate::{
        // Config
        config::{MatchConfig, SearchStrategy, Timeframe},
        // Comparator
        dtw::{align, distance, Alignment},
        // Matching
        matcher::{correlation, match_against_one, similarity, MatchResult, SkipReason},
        // Normalization
        normalize::{
            pattern_stats, prepare_pattern, resample, standardize, validate_pattern, Pattern,
            PatternRejection, PatternStats,
        },
        // Ranking
        ranker::{match_against_many, RankedMatchList, SkippedSymbol},
        // Search
        search::{recent_search, sliding_search, CandidateScore, Window},
        // Series
        validate_series,
        Bar,
        // Engine
        EngineBuilder,
        EngineConfig,
        MatchEngine,
        // Errors
        MatchError,
        PriceBar,
        Result,
        SearchReport,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, MatchError>;

/// Errors that can occur while preparing or running a search
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MatchError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Insufficient data: need {need} bars, got {got}")]
    InsufficientData { need: usize, got: usize },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid series at index {index}: {reason}")]
    InvalidSeries { index: usize, reason: &'static str },

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

// ============================================================
// SERIES INPUT
// ============================================================

/// One bar of an instrument's price series
pub trait PriceBar {
    /// Bar time as unix seconds (UTC)
    fn timestamp(&self) -> i64;
    fn close(&self) -> f64;
}

impl PriceBar for (i64, f64) {
    #[inline]
    fn timestamp(&self) -> i64 {
        self.0
    }

    #[inline]
    fn close(&self) -> f64 {
        self.1
    }
}

impl<T: PriceBar + ?Sized> PriceBar for &T {
    #[inline]
    fn timestamp(&self) -> i64 {
        (**self).timestamp()
    }

    #[inline]
    fn close(&self) -> f64 {
        (**self).close()
    }
}

/// OHLCV bar as delivered by market-data providers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar for Bar {
    #[inline]
    fn timestamp(&self) -> i64 {
        self.timestamp
    }

    #[inline]
    fn close(&self) -> f64 {
        self.close
    }
}

/// Check that timestamps strictly increase and closes are finite.
pub fn validate_series<T: PriceBar>(bars: &[T]) -> Result<()> {
    let mut prev: Option<i64> = None;
    for (index, bar) in bars.iter().enumerate() {
        if !bar.close().is_finite() {
            return Err(MatchError::InvalidSeries {
                index,
                reason: "non-finite close",
            });
        }
        let ts = bar.timestamp();
        if prev.is_some_and(|p| ts <= p) {
            return Err(MatchError::InvalidSeries {
                index,
                reason: "timestamps not strictly increasing",
            });
        }
        prev = Some(ts);
    }
    Ok(())
}

// ============================================================
// MATCH ENGINE
// ============================================================

/// Engine-level options on top of [`MatchConfig`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub matching: MatchConfig,
    pub min_points: usize,
    pub min_std: f64,
    pub top_n: usize,
    /// Drop results below this similarity
    pub min_similarity: Option<f64>,
    /// Resample raw patterns to this many points before standardizing
    pub pattern_points: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            matching: MatchConfig::default(),
            min_points: DEFAULT_MIN_POINTS,
            min_std: DEFAULT_MIN_STD,
            top_n: 10,
            min_similarity: None,
            pattern_points: None,
        }
    }
}

/// Everything a search request reports back
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchReport {
    pub pattern_stats: PatternStats,
    pub results: RankedMatchList,
}

/// Pattern search over many instruments with fixed settings
#[derive(Debug, Clone)]
pub struct MatchEngine {
    config: EngineConfig,
}

impl MatchEngine {
    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Resample (when `target_length` is given) and standardize raw values,
    /// then check them against the engine's validation limits.
    pub fn prepare(&self, raw: &[f64], target_length: Option<usize>) -> Result<Pattern> {
        let pattern = normalize::prepare_pattern(raw, target_length)?;
        normalize::validate_pattern(pattern.values(), self.config.min_points, self.config.min_std)?;
        Ok(pattern)
    }

    /// Match an already prepared pattern against one series.
    pub fn match_one<T: PriceBar>(
        &self,
        pattern: &Pattern,
        symbol: &str,
        bars: &[T],
    ) -> Option<MatchResult> {
        matcher::match_against_one(pattern, symbol, bars, &self.config.matching)
            .filter(|m| self.should_include(m))
    }

    /// Rank an already prepared pattern against many series.
    pub fn rank<S, T>(
        &self,
        pattern: &Pattern,
        symbols: &[S],
        series_by_symbol: &HashMap<String, Vec<T>>,
    ) -> RankedMatchList
    where
        S: AsRef<str> + Sync,
        T: PriceBar + Sync,
    {
        // filter before truncating so top_n counts only accepted results
        let mut list = ranker::match_against_many(
            pattern,
            symbols,
            series_by_symbol,
            &self.config.matching,
            usize::MAX,
        );
        list.matches.retain(|m| self.should_include(m));
        list.matched = list.matches.len();
        list.matches.truncate(self.config.top_n);
        list
    }

    /// Full request: prepare and validate the raw pattern (resampled to
    /// `pattern_points` when set), then rank.
    ///
    /// An unusable pattern rejects the whole request; unusable series are
    /// only skipped.
    pub fn search<S, T>(
        &self,
        raw_pattern: &[f64],
        symbols: &[S],
        series_by_symbol: &HashMap<String, Vec<T>>,
    ) -> Result<SearchReport>
    where
        S: AsRef<str> + Sync,
        T: PriceBar + Sync,
    {
        let pattern = self.prepare(raw_pattern, self.config.pattern_points)?;
        debug!(points = pattern.len(), symbols = symbols.len(), "searching pattern");

        Ok(SearchReport {
            pattern_stats: normalize::pattern_stats(pattern.values()),
            results: self.rank(&pattern, symbols, series_by_symbol),
        })
    }

    fn should_include(&self, m: &MatchResult) -> bool {
        match self.config.min_similarity {
            Some(min) => m.similarity >= min,
            None => true,
        }
    }

    fn validate(&self) -> Result<()> {
        self.config.matching.validate()?;
        if self.config.min_points < 2 {
            return Err(MatchError::InvalidConfig(format!(
                "min_points must be >= 2, got {}",
                self.config.min_points
            )));
        }
        if !self.config.min_std.is_finite() || self.config.min_std < 0.0 {
            return Err(MatchError::InvalidConfig(format!(
                "min_std must be a finite non-negative number, got {}",
                self.config.min_std
            )));
        }
        if let Some(points) = self.config.pattern_points {
            if points < self.config.min_points {
                return Err(MatchError::InvalidConfig(format!(
                    "pattern_points must be >= min_points ({}), got {points}",
                    self.config.min_points
                )));
            }
        }
        if self.config.top_n == 0 {
            return Err(MatchError::InvalidConfig("top_n must be > 0".into()));
        }
        if let Some(min) = self.config.min_similarity {
            if !(0.0..=1.0).contains(&min) {
                return Err(MatchError::OutOfRange {
                    field: "min_similarity",
                    value: min,
                    min: 0.0,
                    max: 1.0,
                });
            }
        }
        Ok(())
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating MatchEngine instances
#[derive(Debug, Clone, Default)]
pub struct EngineBuilder {
    config: EngineConfig,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing matching config
    pub fn matching(mut self, config: MatchConfig) -> Self {
        self.config.matching = config;
        self
    }

    /// Use the recency horizon of `timeframe`
    pub fn timeframe(mut self, timeframe: Timeframe) -> Self {
        self.config.matching.max_lag = timeframe.default_max_lag();
        self
    }

    pub fn radius(mut self, radius: usize) -> Self {
        self.config.matching.radius = radius;
        self
    }

    /// Search the whole history with a fixed window instead of recent windows only
    pub fn full_history(mut self, window_size: Option<usize>, step_size: usize) -> Self {
        self.config.matching.recent_only = false;
        self.config.matching.window_size = window_size;
        self.config.matching.step_size = step_size;
        self
    }

    /// Window sizes tried by the recency search
    pub fn window_sizes(mut self, sizes: impl IntoIterator<Item = usize>) -> Self {
        self.config.matching.recent_only = true;
        self.config.matching.window_size_range = Some(sizes.into_iter().collect());
        self
    }

    pub fn max_lag(mut self, max_lag: usize) -> Self {
        self.config.matching.max_lag = max_lag;
        self
    }

    pub fn similarity_scale(mut self, scale: f64) -> Self {
        self.config.matching.similarity_scale = scale;
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.config.matching.threads = Some(threads);
        self
    }

    /// Pattern validation limits
    pub fn pattern_limits(mut self, min_points: usize, min_std: f64) -> Self {
        self.config.min_points = min_points;
        self.config.min_std = min_std;
        self
    }

    /// Resample every raw pattern to `points` values
    pub fn pattern_points(mut self, points: usize) -> Self {
        self.config.pattern_points = Some(points);
        self
    }

    pub fn top_n(mut self, top_n: usize) -> Self {
        self.config.top_n = top_n;
        self
    }

    /// Set minimum similarity filter
    pub fn min_similarity(mut self, similarity: f64) -> Self {
        self.config.min_similarity = Some(similarity);
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<MatchEngine> {
        let engine = MatchEngine {
            config: self.config,
        };
        engine.validate()?;
        Ok(engine)
    }
}

// ============================================================
// TESTS
// ============================================================
