//! Per-series matching
//!
//! Runs the configured window search over one instrument and turns the best
//! window into a [`MatchResult`]. Data problems with the series are reported
//! as a [`SkipReason`], never as a panic or a batch-level error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{MatchConfig, SearchStrategy};
use crate::normalize::{self, Pattern};
use crate::search::{self, CandidateScore};
use crate::{validate_series, MatchError, PriceBar, Result};

/// Outcome of matching a pattern against one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub symbol: String,
    /// Approximate DTW distance, lower is better
    pub distance: f64,
    /// `exp(-distance / scale)` in `0.0..=1.0`, higher is better
    pub similarity: f64,
    /// Pearson correlation of the resampled pattern and the standardized window
    pub correlation: Option<f64>,
    pub start_date: String,
    pub end_date: String,
    pub start_index: usize,
    pub end_index: usize,
    pub window_size: usize,
    /// Bars between the window's end and the last bar
    pub end_offset: usize,
    /// Raw closes of the matched window
    pub matched_prices: Vec<f64>,
}

/// Why a symbol produced no result
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
pub enum SkipReason {
    #[error("no series supplied")]
    MissingSeries,

    #[error("series is empty")]
    EmptySeries,

    #[error("invalid bar at index {index}: {reason}")]
    InvalidSeries { index: usize, reason: &'static str },

    #[error("need {need} bars, got {got}")]
    InsufficientData { need: usize, got: usize },

    #[error("no candidate window")]
    NoMatch,

    #[error("{0}")]
    Failed(String),
}

impl From<MatchError> for SkipReason {
    fn from(e: MatchError) -> Self {
        match e {
            MatchError::InsufficientData { need, got } => SkipReason::InsufficientData { need, got },
            MatchError::InvalidSeries { index, reason } => SkipReason::InvalidSeries { index, reason },
            other => SkipReason::Failed(other.to_string()),
        }
    }
}

// ============================================================
// SCORING
// ============================================================

/// Map a distance to `0.0..=1.0` by exponential decay; `scale` is the
/// distance at which similarity falls to `1/e`.
#[inline]
pub fn similarity(distance: f64, scale: f64) -> f64 {
    let s = (-distance / scale).exp();
    if s.is_nan() {
        0.0
    } else {
        s.clamp(0.0, 1.0)
    }
}

/// Pearson correlation of two equal-length sequences.
///
/// Fewer than two points, or zero variance in either operand, yields `0.0`.
pub fn correlation(a: &[f64], b: &[f64]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(MatchError::InvalidInput(format!(
            "correlation needs equal lengths, got {} and {}",
            a.len(),
            b.len()
        )));
    }
    if a.len() < 2 {
        return Ok(0.0);
    }

    let (mean_a, _) = normalize::mean_std(a);
    let (mean_b, _) = normalize::mean_std(b);
    let (cov, var_a, var_b) = a.iter().zip(b).fold((0.0, 0.0, 0.0), |(c, va, vb), (x, y)| {
        let (dx, dy) = (x - mean_a, y - mean_b);
        (c + dx * dy, va + dx * dx, vb + dy * dy)
    });

    let denom = (var_a * var_b).sqrt();
    if denom <= 0.0 || !denom.is_finite() {
        return Ok(0.0);
    }
    let r = cov / denom;
    Ok(if r.is_finite() { r.clamp(-1.0, 1.0) } else { 0.0 })
}

fn format_date(timestamp: i64, index: usize) -> Result<String> {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .ok_or(MatchError::InvalidSeries {
            index,
            reason: "timestamp out of range",
        })
}

// ============================================================
// MATCH BUILDER
// ============================================================

/// Turn the chosen window of `bars` into a [`MatchResult`].
pub fn build_match<T: PriceBar>(
    pattern: &Pattern,
    symbol: &str,
    bars: &[T],
    best: CandidateScore,
    config: &MatchConfig,
) -> Result<MatchResult> {
    let window = best.window;
    if window.start > window.end || window.end >= bars.len() {
        return Err(MatchError::InvalidInput(format!(
            "window [{}, {}] outside series of {} bars",
            window.start,
            window.end,
            bars.len()
        )));
    }

    let slice = &bars[window.start..=window.end];
    let matched_prices: Vec<f64> = slice.iter().map(PriceBar::close).collect();

    let correlation = if config.include_correlation {
        let normalized = normalize::standardize(&matched_prices)?;
        let shaped = pattern.resampled(normalized.len())?;
        correlation(&shaped, &normalized).ok()
    } else {
        None
    };

    Ok(MatchResult {
        symbol: symbol.to_string(),
        distance: best.distance,
        similarity: similarity(best.distance, config.similarity_scale),
        correlation,
        start_date: format_date(slice[0].timestamp(), window.start)?,
        end_date: format_date(slice[slice.len() - 1].timestamp(), window.end)?,
        start_index: window.start,
        end_index: window.end,
        window_size: window.len(),
        end_offset: window.end_offset(bars.len()),
        matched_prices,
    })
}

// ============================================================
// SINGLE SERIES
// ============================================================

/// Search one series and build its result, or say why there is none.
pub fn try_match<T: PriceBar>(
    pattern: &Pattern,
    symbol: &str,
    bars: &[T],
    config: &MatchConfig,
) -> std::result::Result<MatchResult, SkipReason> {
    if bars.is_empty() {
        return Err(SkipReason::EmptySeries);
    }
    if config.validate_series {
        validate_series(bars)?;
    }

    let closes: Vec<f64> = bars.iter().map(PriceBar::close).collect();

    let best = match config.strategy(pattern.len()) {
        SearchStrategy::Sliding { window_size, step } => search::sliding_search(
            pattern.values(),
            &closes,
            window_size,
            step,
            config.radius,
        )?,
        SearchStrategy::Recent {
            window_sizes,
            max_lag,
        } => search::recent_search(
            pattern.values(),
            &closes,
            &window_sizes,
            max_lag,
            config.radius,
        )?
        .ok_or_else(|| match window_sizes.iter().min() {
            Some(&need) => SkipReason::InsufficientData {
                need,
                got: closes.len(),
            },
            None => SkipReason::NoMatch,
        })?,
    };

    Ok(build_match(pattern, symbol, bars, best, config)?)
}

/// Match `pattern` against one instrument. `None` when the series cannot
/// produce a match.
pub fn match_against_one<T: PriceBar>(
    pattern: &Pattern,
    symbol: &str,
    bars: &[T],
    config: &MatchConfig,
) -> Option<MatchResult> {
    match try_match(pattern, symbol, bars, config) {
        Ok(m) => Some(m),
        Err(reason) => {
            debug!(symbol, %reason, "no match");
            None
        }
    }
}

// ============================================================
// TESTS
// ============================================================
