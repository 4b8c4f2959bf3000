//! Shape normalization
//!
//! Converts raw price sequences into a scale-invariant form so that only their
//! relative up/down structure is compared:
//! - [`standardize`]: z-score with population standard deviation
//! - [`resample`]: piecewise-linear interpolation to a fixed number of points
//! - [`prepare_pattern`]: resample, then standardize, producing a [`Pattern`]
//! - [`validate_pattern`]: reject patterns that carry no usable shape
//!
//! # Example
//!
//! ```rust
//! use shapescan::normalize::{prepare_pattern, validate_pattern};
//!
//! let raw: Vec<f64> = (0..12).map(|i| (i as f64 * 0.7).sin()).collect();
//! let pattern = prepare_pattern(&raw, Some(20)).unwrap();
//! assert_eq!(pattern.len(), 20);
//! assert!(validate_pattern(pattern.values(), 10, 0.01).is_ok());
//! ```

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::{MatchError, Result};

/// Minimum pattern length accepted by default
pub const DEFAULT_MIN_POINTS: usize = 10;
/// Minimum standard deviation accepted by default
pub const DEFAULT_MIN_STD: f64 = 0.01;

// ============================================================
// STANDARDIZATION
// ============================================================

/// Mean and population standard deviation (ddof = 0).
#[inline]
pub(crate) fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.max(0.0).sqrt())
}

/// Z-score a sequence: `(x - mean) / std`.
///
/// A single value, or a sequence with zero variance, maps to zeros.
pub fn standardize(values: &[f64]) -> Result<Vec<f64>> {
    if values.is_empty() {
        return Err(MatchError::InvalidInput(
            "cannot standardize an empty sequence".into(),
        ));
    }
    if values.len() == 1 {
        return Ok(vec![0.0]);
    }

    let (mean, std) = mean_std(values);
    if std == 0.0 {
        return Ok(vec![0.0; values.len()]);
    }

    Ok(values.iter().map(|v| (v - mean) / std).collect())
}

// ============================================================
// RESAMPLING
// ============================================================

/// Linearly interpolate `values` over the index range `[0, len - 1]` to
/// exactly `target_length` evenly spaced points.
///
/// Input that already has `target_length` points is returned as-is.
pub fn resample(values: &[f64], target_length: usize) -> Result<Vec<f64>> {
    resample_cow(values, target_length).map(Cow::into_owned)
}

pub(crate) fn resample_cow(values: &[f64], target_length: usize) -> Result<Cow<'_, [f64]>> {
    if values.is_empty() {
        return Err(MatchError::InvalidInput(
            "cannot resample an empty sequence".into(),
        ));
    }
    if target_length == 0 {
        return Err(MatchError::InvalidInput(
            "resample target length must be > 0".into(),
        ));
    }
    if values.len() == target_length {
        return Ok(Cow::Borrowed(values));
    }

    let last = values.len() - 1;
    if target_length == 1 || last == 0 {
        return Ok(Cow::Owned(vec![values[0]; target_length]));
    }

    let step = last as f64 / (target_length - 1) as f64;
    let out = (0..target_length)
        .map(|k| {
            let x = k as f64 * step;
            let i = x.floor() as usize;
            if i >= last {
                values[last]
            } else {
                let frac = x - i as f64;
                values[i] + (values[i + 1] - values[i]) * frac
            }
        })
        .collect();

    Ok(Cow::Owned(out))
}

// ============================================================
// PATTERN
// ============================================================

/// A standardized query shape.
///
/// Built with [`prepare_pattern`]; immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pattern {
    values: Vec<f64>,
}

impl Pattern {
    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The pattern stretched or compressed to `len` points.
    /// Borrows when no interpolation is needed.
    pub fn resampled(&self, len: usize) -> Result<Cow<'_, [f64]>> {
        resample_cow(&self.values, len)
    }
}

impl AsRef<[f64]> for Pattern {
    fn as_ref(&self) -> &[f64] {
        &self.values
    }
}

/// Build a [`Pattern`] from raw values.
///
/// Resamples to `target_length` first (when given and different), then
/// standardizes. The order is fixed so scores are reproducible.
pub fn prepare_pattern(raw: &[f64], target_length: Option<usize>) -> Result<Pattern> {
    if raw.is_empty() {
        return Err(MatchError::InvalidInput("pattern cannot be empty".into()));
    }
    if let Some(index) = raw.iter().position(|v| !v.is_finite()) {
        return Err(MatchError::InvalidInput(format!(
            "pattern contains a non-finite value at index {index}"
        )));
    }

    let shaped = match target_length {
        Some(len) => resample_cow(raw, len)?,
        None => Cow::Borrowed(raw),
    };

    Ok(Pattern {
        values: standardize(&shaped)?,
    })
}

// ============================================================
// VALIDATION
// ============================================================

/// Why a pattern was rejected
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PatternRejection {
    #[error("pattern must have at least {min} points, got {got}")]
    TooShort { min: usize, got: usize },

    #[error("pattern contains a non-finite value at index {index}")]
    NonFinite { index: usize },

    #[error("insufficient variation (std={std:.4})")]
    InsufficientVariation { std: f64 },
}

impl From<PatternRejection> for MatchError {
    fn from(r: PatternRejection) -> Self {
        MatchError::InvalidInput(r.to_string())
    }
}

/// Check that `values` carry enough shape to be worth matching.
pub fn validate_pattern(
    values: &[f64],
    min_points: usize,
    min_std: f64,
) -> std::result::Result<(), PatternRejection> {
    if values.len() < min_points {
        return Err(PatternRejection::TooShort {
            min: min_points,
            got: values.len(),
        });
    }
    if let Some(index) = values.iter().position(|v| !v.is_finite()) {
        return Err(PatternRejection::NonFinite { index });
    }

    let (_, std) = mean_std(values);
    if std < min_std {
        return Err(PatternRejection::InsufficientVariation { std });
    }

    Ok(())
}

// ============================================================
// STATISTICS
// ============================================================

/// Summary statistics of a pattern, reported back to callers
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternStats {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub range: f64,
}

pub fn pattern_stats(values: &[f64]) -> PatternStats {
    if values.is_empty() {
        return PatternStats::default();
    }

    let (mean, std) = mean_std(values);
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });

    PatternStats {
        count: values.len(),
        mean,
        std,
        min,
        max,
        range: max - min,
    }
}

// ============================================================
// TESTS
// ============================================================
