//! Approximate elastic alignment distance (FastDTW)
//!
//! Dynamic time warping aligns two sequences monotonically, allowing local
//! stretching of the time axis, and sums the pointwise cost `|a - b|` along the
//! cheapest alignment. The exact algorithm is quadratic; this module uses the
//! multi-resolution FastDTW scheme instead:
//!
//! 1. Halve both sequences (pairwise means) and solve the coarse problem recursively
//! 2. Project the coarse warp path onto the full resolution
//! 3. Widen it by `radius` cells on every side
//! 4. Run the dynamic program only inside that band
//!
//! Below `radius + 2` points the full matrix is cheap and is solved directly.
//! The result is never below the exact DTW distance and converges to it as
//! `radius` grows.

use std::cmp::Ordering;

use serde::Serialize;

use crate::{MatchError, Result};

/// Default band radius
pub const DEFAULT_RADIUS: usize = 10;

/// Warp found between two sequences
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alignment {
    /// Cumulative `|a[i] - b[j]|` along `path`
    pub distance: f64,
    /// Aligned index pairs from `(0, 0)` to `(len_a - 1, len_b - 1)`
    pub path: Vec<(usize, usize)>,
}

/// Approximate DTW distance between `a` and `b`.
#[inline]
pub fn distance(a: &[f64], b: &[f64], radius: usize) -> Result<f64> {
    align(a, b, radius).map(|al| al.distance)
}

/// Approximate DTW alignment between `a` and `b`.
///
/// The operands are processed in a canonical order (shorter first, then
/// lexicographically smaller first), so `align(a, b)` and `align(b, a)`
/// report the same distance and transposed paths.
pub fn align(a: &[f64], b: &[f64], radius: usize) -> Result<Alignment> {
    check_operand(a)?;
    check_operand(b)?;
    // any radius this wide already covers the full grid
    let radius = radius.min(a.len().max(b.len()));

    if needs_swap(a, b) {
        let mut al = fast_dtw(b, a, radius);
        for p in &mut al.path {
            *p = (p.1, p.0);
        }
        Ok(al)
    } else {
        Ok(fast_dtw(a, b, radius))
    }
}

fn check_operand(v: &[f64]) -> Result<()> {
    if v.is_empty() {
        return Err(MatchError::InvalidInput(
            "cannot align an empty sequence".into(),
        ));
    }
    if let Some(index) = v.iter().position(|x| !x.is_finite()) {
        return Err(MatchError::InvalidInput(format!(
            "non-finite value at index {index} in aligned sequence"
        )));
    }
    Ok(())
}

fn needs_swap(a: &[f64], b: &[f64]) -> bool {
    match a.len().cmp(&b.len()) {
        Ordering::Less => false,
        Ordering::Greater => true,
        Ordering::Equal => a.iter().partial_cmp(b.iter()) == Some(Ordering::Greater),
    }
}

// ============================================================
// MULTI-RESOLUTION RECURSION
// ============================================================

fn fast_dtw(a: &[f64], b: &[f64], radius: usize) -> Alignment {
    let min_size = radius.saturating_add(2);
    if a.len() < min_size || b.len() < min_size {
        return dtw_in_band(a, b, &Band::full(a.len(), b.len()));
    }

    let coarse = fast_dtw(&coarsen(a), &coarsen(b), radius);
    let band = Band::around_path(&coarse.path, a.len(), b.len(), radius);
    dtw_in_band(a, b, &band)
}

/// Halve resolution by averaging adjacent pairs. An odd trailing point is dropped.
#[inline]
fn coarsen(v: &[f64]) -> Vec<f64> {
    v.chunks_exact(2).map(|p| (p[0] + p[1]) / 2.0).collect()
}

// ============================================================
// SEARCH BAND
// ============================================================

/// Inclusive column range `[lo[i], hi[i]]` explored for every row `i`.
#[derive(Debug, Clone)]
struct Band {
    lo: Vec<usize>,
    hi: Vec<usize>,
}

impl Band {
    fn full(rows: usize, cols: usize) -> Self {
        Self {
            lo: vec![0; rows],
            hi: vec![cols - 1; rows],
        }
    }

    /// Project a coarse path (half resolution) onto a `rows x cols` grid,
    /// widened by `radius` coarse cells in both directions.
    fn around_path(path: &[(usize, usize)], rows: usize, cols: usize, radius: usize) -> Self {
        let coarse_rows = path.last().map_or(1, |&(i, _)| i + 1);
        let mut path_lo = vec![usize::MAX; coarse_rows];
        let mut path_hi = vec![0usize; coarse_rows];
        for &(i, j) in path {
            path_lo[i] = path_lo[i].min(j);
            path_hi[i] = path_hi[i].max(j);
        }

        let mut lo = Vec::with_capacity(rows);
        let mut hi = Vec::with_capacity(rows);
        for i in 0..rows {
            let c = i / 2;
            let first = c.saturating_sub(radius).min(coarse_rows - 1);
            let last = c.saturating_add(radius).min(coarse_rows - 1);
            let (l, h) = (first..=last).fold((usize::MAX, 0), |(l, h), r| {
                (l.min(path_lo[r]), h.max(path_hi[r]))
            });
            lo.push((l.saturating_sub(radius) * 2).min(cols - 1));
            hi.push(h.saturating_add(radius).saturating_mul(2).saturating_add(1).min(cols - 1));
        }

        // Keep the band monotone and connected so (rows-1, cols-1) is reachable.
        lo[0] = 0;
        hi[0] = hi[0].max(lo[0]);
        for i in 1..rows {
            lo[i] = lo[i].max(lo[i - 1]).min(hi[i - 1] + 1).min(cols - 1);
            hi[i] = hi[i].max(lo[i]);
        }
        hi[rows - 1] = cols - 1;

        Self { lo, hi }
    }
}

// ============================================================
// BANDED DYNAMIC PROGRAM
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Start,
    Diag,
    Up,
    Left,
}

fn dtw_in_band(a: &[f64], b: &[f64], band: &Band) -> Alignment {
    let rows = a.len();

    let mut offsets = Vec::with_capacity(rows);
    let mut total = 0usize;
    for i in 0..rows {
        offsets.push(total);
        total += band.hi[i] - band.lo[i] + 1;
    }

    let mut cost = vec![f64::INFINITY; total];
    let mut steps = vec![Step::Start; total];

    let cell = |i: usize, j: usize| -> Option<usize> {
        (j >= band.lo[i] && j <= band.hi[i]).then(|| offsets[i] + j - band.lo[i])
    };

    for i in 0..rows {
        for j in band.lo[i]..=band.hi[i] {
            let idx = offsets[i] + j - band.lo[i];
            let d = (a[i] - b[j]).abs();

            if i == 0 && j == 0 {
                cost[idx] = d;
                continue;
            }

            let at = |c: Option<usize>, cost: &[f64]| c.map_or(f64::INFINITY, |k| cost[k]);
            let diag = if i > 0 && j > 0 {
                at(cell(i - 1, j - 1), &cost)
            } else {
                f64::INFINITY
            };
            let up = if i > 0 {
                at(cell(i - 1, j), &cost)
            } else {
                f64::INFINITY
            };
            let left = if j > band.lo[i] {
                cost[idx - 1]
            } else {
                f64::INFINITY
            };

            let mut best = (diag, Step::Diag);
            if up < best.0 {
                best = (up, Step::Up);
            }
            if left < best.0 {
                best = (left, Step::Left);
            }

            if best.0.is_finite() {
                cost[idx] = d + best.0;
                steps[idx] = best.1;
            }
        }
    }

    let cols = b.len();
    let (mut i, mut j) = (rows - 1, cols - 1);
    let distance = cell(i, j).map_or(f64::INFINITY, |k| cost[k]);

    let mut path = Vec::with_capacity(rows + cols);
    loop {
        path.push((i, j));
        let step = cell(i, j).map_or(Step::Start, |k| steps[k]);
        match step {
            Step::Start => break,
            Step::Diag => {
                i -= 1;
                j -= 1;
            }
            Step::Up => i -= 1,
            Step::Left => j -= 1,
        }
    }
    path.reverse();

    Alignment { distance, path }
}

// ============================================================
// TESTS
// ============================================================
