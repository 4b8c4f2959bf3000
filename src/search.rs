//! Window search strategies
//!
//! Both strategies propose sub-windows of one price series and score each
//! against the query pattern with the approximate DTW comparator:
//!
//! - [`sliding_search`]: every window of a fixed size across the whole history,
//!   scored against the series standardized once as a whole.
//! - [`recent_search`]: only windows ending within `max_lag` bars of the last bar,
//!   for several candidate sizes, each window standardized on its own values.
//!
//! Ties keep the earliest candidate. For the recency search the order is
//! window sizes as given, then offsets ascending (offset 0 = last bar).

use serde::{Deserialize, Serialize};

use crate::{dtw, normalize, MatchError, Result};

/// Contiguous index range `[start, end]` within a series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: usize,
    pub end: usize,
}

impl Window {
    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// Bars between the window's end and the last bar of a series of length `n`
    #[inline]
    pub fn end_offset(&self, n: usize) -> usize {
        n.saturating_sub(1 + self.end)
    }
}

/// A scored window
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CandidateScore {
    pub window: Window,
    /// Approximate DTW distance, lower is more similar
    pub distance: f64,
}

/// Keep `best` unless `next` is strictly closer.
#[inline]
fn keep_better(best: Option<CandidateScore>, next: CandidateScore) -> Option<CandidateScore> {
    match best {
        Some(b) if b.distance <= next.distance => Some(b),
        _ => Some(next),
    }
}

// ============================================================
// EXHAUSTIVE SLIDING SEARCH
// ============================================================

/// Best window of `window_size` bars anywhere in `values`, sliding by `step`.
///
/// Fails with [`MatchError::InsufficientData`] when the series is shorter
/// than one window.
pub fn sliding_search(
    pattern: &[f64],
    values: &[f64],
    window_size: usize,
    step: usize,
    radius: usize,
) -> Result<CandidateScore> {
    if window_size == 0 {
        return Err(MatchError::InvalidInput("window size must be > 0".into()));
    }
    if step == 0 {
        return Err(MatchError::InvalidInput("step size must be > 0".into()));
    }
    if values.len() < window_size {
        return Err(MatchError::InsufficientData {
            need: window_size,
            got: values.len(),
        });
    }

    let normalized = normalize::standardize(values)?;

    let best = (0..=values.len() - window_size)
        .step_by(step)
        .map(|start| Window {
            start,
            end: start + window_size - 1,
        })
        .try_fold(None, |best, window| -> Result<Option<CandidateScore>> {
            let distance =
                dtw::distance(pattern, &normalized[window.start..=window.end], radius)?;
            Ok(keep_better(best, CandidateScore { window, distance }))
        })?;

    best.ok_or(MatchError::InsufficientData {
        need: window_size,
        got: values.len(),
    })
}

// ============================================================
// RECENCY-CONSTRAINED MULTI-WINDOW SEARCH
// ============================================================

/// Window sizes tried around a pattern of `len` points when none are given.
pub fn default_window_sizes(len: usize) -> Vec<usize> {
    vec![
        len.saturating_sub(20).max(20),
        len.saturating_sub(10).max(20),
        len,
        len + 10,
        len + 20,
    ]
}

/// Windows of `window_size` bars ending `0..=max_lag` bars before the last
/// bar of an `n`-bar series, as `(end_offset, window)`. Windows that would
/// start before the first bar are skipped.
pub fn recent_windows(
    n: usize,
    window_size: usize,
    max_lag: usize,
) -> impl Iterator<Item = (usize, Window)> {
    (0..=max_lag).filter_map(move |offset| {
        if window_size == 0 {
            return None;
        }
        let end = n.checked_sub(1 + offset)?;
        let start = (end + 1).checked_sub(window_size)?;
        Some((offset, Window { start, end }))
    })
}

/// Best window ending within `max_lag` bars of the last bar, over every size
/// in `window_sizes` that fits the series.
///
/// The pattern is resampled to each window size when lengths differ.
/// Returns `Ok(None)` when no size/offset combination fits.
pub fn recent_search(
    pattern: &[f64],
    values: &[f64],
    window_sizes: &[usize],
    max_lag: usize,
    radius: usize,
) -> Result<Option<CandidateScore>> {
    if pattern.is_empty() {
        return Err(MatchError::InvalidInput("pattern cannot be empty".into()));
    }
    let n = values.len();

    window_sizes
        .iter()
        .copied()
        .filter(|&size| size > 0 && size <= n)
        .try_fold(None, |best, size| -> Result<Option<CandidateScore>> {
            let shaped = normalize::resample_cow(pattern, size)?;
            recent_windows(n, size, max_lag).try_fold(
                best,
                |best, (_, window)| -> Result<Option<CandidateScore>> {
                    let segment = normalize::standardize(&values[window.start..=window.end])?;
                    let distance = dtw::distance(&shaped, &segment, radius)?;
                    Ok(keep_better(best, CandidateScore { window, distance }))
                },
            )
        })
}

// ============================================================
// TESTS
// ============================================================
