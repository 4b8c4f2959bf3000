//! Multi-series ranking
//!
//! Matches one pattern against many instruments in parallel, drops the ones
//! that cannot produce a match, and orders the rest best-first.

use std::cmp::Ordering;
use std::collections::HashMap;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::MatchConfig;
use crate::matcher::{try_match, MatchResult, SkipReason};
use crate::normalize::Pattern;
use crate::PriceBar;

/// A symbol that produced no result, and why
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedSymbol {
    pub symbol: String,
    pub reason: SkipReason,
}

/// Results of one batch query, best match first
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RankedMatchList {
    /// Sorted by similarity descending, then distance ascending; at most `top_n`
    pub matches: Vec<MatchResult>,
    /// Symbols attempted
    pub searched: usize,
    /// Symbols that produced an accepted match, before truncation to `top_n`
    pub matched: usize,
    pub skipped: Vec<SkippedSymbol>,
}

impl RankedMatchList {
    #[inline]
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MatchResult> {
        self.matches.iter()
    }
}

impl<'a> IntoIterator for &'a RankedMatchList {
    type Item = &'a MatchResult;
    type IntoIter = std::slice::Iter<'a, MatchResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.matches.iter()
    }
}

/// Ranking order: similarity descending, distance ascending.
#[inline]
pub fn compare_matches(a: &MatchResult, b: &MatchResult) -> Ordering {
    b.similarity
        .total_cmp(&a.similarity)
        .then_with(|| a.distance.total_cmp(&b.distance))
}

/// Stable sort by [`compare_matches`], then keep the first `top_n`.
pub fn rank(mut matches: Vec<MatchResult>, top_n: usize) -> Vec<MatchResult> {
    matches.sort_by(compare_matches);
    matches.truncate(top_n);
    matches
}

type Outcome = Result<MatchResult, SkippedSymbol>;

fn match_all<S, T>(
    pattern: &Pattern,
    symbols: &[S],
    series_by_symbol: &HashMap<String, Vec<T>>,
    config: &MatchConfig,
) -> Vec<Outcome>
where
    S: AsRef<str> + Sync,
    T: PriceBar + Sync,
{
    symbols
        .par_iter()
        .map(|symbol| {
            let symbol = symbol.as_ref();
            let outcome = match series_by_symbol.get(symbol) {
                Some(bars) => try_match(pattern, symbol, bars, config),
                None => Err(SkipReason::MissingSeries),
            };
            outcome.map_err(|reason| {
                debug!(symbol, %reason, "symbol skipped");
                SkippedSymbol {
                    symbol: symbol.to_string(),
                    reason,
                }
            })
        })
        .collect()
}

/// Match `pattern` against every symbol and return the `top_n` best.
///
/// Symbols without usable data are skipped and listed in
/// [`RankedMatchList::skipped`]; they never abort the batch.
pub fn match_against_many<S, T>(
    pattern: &Pattern,
    symbols: &[S],
    series_by_symbol: &HashMap<String, Vec<T>>,
    config: &MatchConfig,
    top_n: usize,
) -> RankedMatchList
where
    S: AsRef<str> + Sync,
    T: PriceBar + Sync,
{
    let run = || match_all(pattern, symbols, series_by_symbol, config);

    let outcomes = match config.threads {
        Some(n) => match rayon::ThreadPoolBuilder::new().num_threads(n).build() {
            Ok(pool) => pool.install(run),
            Err(e) => {
                warn!(threads = n, error = %e, "worker pool unavailable, using global pool");
                run()
            }
        },
        None => run(),
    };

    let mut matches = Vec::new();
    let mut skipped = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(m) => matches.push(m),
            Err(s) => skipped.push(s),
        }
    }

    let matched = matches.len();
    info!(
        searched = symbols.len(),
        matched,
        skipped = skipped.len(),
        "pattern batch complete"
    );

    RankedMatchList {
        matches: rank(matches, top_n),
        searched: symbols.len(),
        matched,
        skipped,
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::prepare_pattern;

    fn result(symbol: &str, distance: f64, similarity: f64) -> MatchResult {
        MatchResult {
            symbol: symbol.into(),
            distance,
            similarity,
            correlation: None,
            start_date: String::new(),
            end_date: String::new(),
            start_index: 0,
            end_index: 0,
            window_size: 1,
            end_offset: 0,
            matched_prices: vec![],
        }
    }

    fn bars(closes: &[f64]) -> Vec<(i64, f64)> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| (1_700_000_000 + i as i64 * 86_400, c))
            .collect()
    }

    fn wave(n: usize, phase: f64) -> Vec<f64> {
        (0..n)
            .map(|i| 50.0 + (i as f64 * 0.25 + phase).sin() * 5.0)
            .collect()
    }

    #[test]
    fn test_rank_order_and_truncate() {
        let ranked = rank(
            vec![
                result("A", 5.0, 0.5),
                result("B", 1.0, 0.9),
                result("C", 2.0, 0.9),
                result("D", 0.5, 0.9),
            ],
            3,
        );
        let order: Vec<_> = ranked.iter().map(|m| m.symbol.as_str()).collect();
        assert_eq!(order, vec!["D", "B", "C"]);
    }

    #[test]
    fn test_rank_is_stable_for_full_ties() {
        let ranked = rank(vec![result("X", 1.0, 0.8), result("Y", 1.0, 0.8)], 10);
        assert_eq!(ranked[0].symbol, "X");
        assert_eq!(ranked[1].symbol, "Y");
    }

    #[test]
    fn test_batch_skips_empty_and_missing() {
        let closes = wave(80, 0.0);
        let pattern = prepare_pattern(&closes[50..80], None).unwrap();

        let mut data = HashMap::new();
        data.insert("GOOD".to_string(), bars(&closes));
        data.insert("ALSO".to_string(), bars(&wave(80, 1.0)));
        data.insert("EMPTY".to_string(), vec![]);

        let symbols = ["GOOD", "EMPTY", "ALSO", "GONE"];
        let list = match_against_many(&pattern, &symbols, &data, &MatchConfig::default(), 10);

        assert_eq!(list.searched, 4);
        assert_eq!(list.matched, 2);
        assert_eq!(list.len(), 2);
        assert_eq!(list.matches[0].symbol, "GOOD");
        assert!(list.iter().all(|m| m.symbol != "EMPTY" && m.symbol != "GONE"));

        let reasons: HashMap<_, _> = list
            .skipped
            .iter()
            .map(|s| (s.symbol.as_str(), s.reason.clone()))
            .collect();
        assert_eq!(reasons["EMPTY"], SkipReason::EmptySeries);
        assert_eq!(reasons["GONE"], SkipReason::MissingSeries);
    }

    #[test]
    fn test_batch_with_unbounded_radius() {
        let closes = wave(90, 0.7);
        let pattern = prepare_pattern(&closes[60..90], None).unwrap();
        let mut data = HashMap::new();
        data.insert("A".to_string(), bars(&closes));

        let config = MatchConfig {
            radius: usize::MAX,
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let list = match_against_many(&pattern, &["A"], &data, &config, 5);
        assert_eq!(list.matched, 1);
        assert!(list.skipped.is_empty());
        assert!(list.matches[0].distance.abs() < 1e-9);
    }

    #[test]
    fn test_batch_with_dedicated_pool() {
        let closes = wave(60, 0.3);
        let pattern = prepare_pattern(&closes[30..60], None).unwrap();
        let mut data = HashMap::new();
        data.insert("A".to_string(), bars(&closes));

        let config = MatchConfig {
            threads: Some(2),
            ..Default::default()
        };
        let list = match_against_many(&pattern, &["A"], &data, &config, 5);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_batch_all_unusable_is_empty() {
        let pattern = prepare_pattern(&wave(30, 0.0), None).unwrap();
        let mut data: HashMap<String, Vec<(i64, f64)>> = HashMap::new();
        data.insert("SHORT".to_string(), bars(&wave(5, 0.0)));

        let list = match_against_many(&pattern, &["SHORT"], &data, &MatchConfig::default(), 10);
        assert!(list.is_empty());
        assert_eq!(list.searched, 1);
        assert_eq!(list.skipped.len(), 1);
    }
}
