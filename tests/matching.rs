//! Integration tests for shapescan pattern search.
//!
//! These tests drive the public API end to end with synthetic daily series.

use std::collections::HashMap;

use shapescan::prelude::*;

/// Simple daily bar
#[derive(Debug, Clone, Copy)]
struct TestBar {
    t: i64,
    c: f64,
}

impl PriceBar for TestBar {
    fn timestamp(&self) -> i64 {
        self.t
    }

    fn close(&self) -> f64 {
        self.c
    }
}

// 2023-01-02T00:00:00Z
const START: i64 = 1_672_617_600;
const DAY: i64 = 86_400;

fn make_bars(closes: &[f64]) -> Vec<TestBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| TestBar {
            t: START + i as i64 * DAY,
            c,
        })
        .collect()
}

/// Deterministic pseudo-random values in [-1, 1)
fn jitter(n: usize, seed: u64) -> Vec<f64> {
    let mut state = seed;
    (0..n)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((state >> 33) % 2000) as f64 / 1000.0 - 1.0
        })
        .collect()
}

/// Random walk around `base`
fn random_walk(n: usize, base: f64, seed: u64) -> Vec<f64> {
    jitter(n, seed)
        .into_iter()
        .scan(base, |price, step| {
            *price += step;
            Some(*price)
        })
        .collect()
}

/// Noisy linear uptrend
fn noisy_uptrend(n: usize, seed: u64) -> Vec<f64> {
    jitter(n, seed)
        .into_iter()
        .enumerate()
        .map(|(i, e)| 80.0 + i as f64 * 0.6 + e * 0.8)
        .collect()
}

// ============================================================
// SCENARIOS
// ============================================================

#[test]
fn test_recent_uptrend_found_near_end() {
    let segment = noisy_uptrend(50, 42);
    let mut closes = random_walk(249, 90.0, 7);
    closes.extend_from_slice(&segment);
    closes.push(closes[closes.len() - 1] - 3.0);
    assert_eq!(closes.len(), 300);

    let pattern = prepare_pattern(&segment, None).unwrap();
    assert!(validate_pattern(pattern.values(), 10, 0.01).is_ok());

    let config = MatchConfig::default();
    let m = match_against_one(&pattern, "UP", &make_bars(&closes), &config).unwrap();

    assert!(m.distance < 1e-9, "distance {}", m.distance);
    assert!((m.similarity - 1.0).abs() < 1e-9);
    assert!(m.end_offset <= config.max_lag);
    assert_eq!(m.end_offset, 1);
    assert_eq!(m.window_size, 50);
    assert_eq!(m.matched_prices, segment);
    assert!((m.correlation.unwrap() - 1.0).abs() < 1e-9);
}

#[test]
fn test_flat_pattern_rejected() {
    let pattern = prepare_pattern(&[7.0; 10], None).unwrap();
    let rejection = validate_pattern(pattern.values(), 10, 0.01).unwrap_err();
    assert!(matches!(
        rejection,
        PatternRejection::InsufficientVariation { .. }
    ));
    assert!(rejection.to_string().starts_with("insufficient variation"));
}

#[test]
fn test_window_sizes_larger_than_series_are_skipped() {
    let closes = random_walk(45, 50.0, 3);
    let pattern = prepare_pattern(&noisy_uptrend(50, 1), None).unwrap();

    let best = recent_search(pattern.values(), &closes, &[40, 50, 60], 3, 10)
        .unwrap()
        .unwrap();
    assert_eq!(best.window.len(), 40);

    let config = MatchConfig {
        window_size_range: Some(vec![40, 50, 60]),
        ..Default::default()
    };
    let m = match_against_one(&pattern, "S", &make_bars(&closes), &config).unwrap();
    assert_eq!(m.window_size, 40);
    assert!(m.end_offset <= 3);
}

#[test]
fn test_batch_with_empty_series() {
    let pattern = prepare_pattern(&noisy_uptrend(40, 9), None).unwrap();

    let mut data: HashMap<String, Vec<TestBar>> = HashMap::new();
    for (i, symbol) in ["AAA", "BBB", "CCC"].iter().enumerate() {
        data.insert(
            symbol.to_string(),
            make_bars(&random_walk(200, 100.0, i as u64 + 100)),
        );
    }
    data.insert("EMP1".to_string(), vec![]);
    data.insert("EMP2".to_string(), vec![]);

    let symbols = ["AAA", "EMP1", "BBB", "EMP2", "CCC"];
    let list = match_against_many(&pattern, &symbols, &data, &MatchConfig::default(), 10);

    assert!(list.len() <= 3);
    assert_eq!(list.searched, 5);
    assert!(list
        .iter()
        .all(|m| m.symbol != "EMP1" && m.symbol != "EMP2"));
    let skipped: Vec<_> = list.skipped.iter().map(|s| s.symbol.as_str()).collect();
    assert!(skipped.contains(&"EMP1") && skipped.contains(&"EMP2"));
}

#[test]
fn test_batch_ranking_order() {
    let segment = noisy_uptrend(40, 5);
    let pattern = prepare_pattern(&segment, None).unwrap();

    let mut data: HashMap<String, Vec<TestBar>> = HashMap::new();
    let mut exact = random_walk(120, 70.0, 11);
    exact.extend_from_slice(&segment);
    data.insert("EXACT".to_string(), make_bars(&exact));
    for i in 0..6u64 {
        data.insert(
            format!("RW{i}"),
            make_bars(&random_walk(160, 100.0, 500 + i)),
        );
    }

    let mut symbols: Vec<String> = (0..6).map(|i| format!("RW{i}")).collect();
    symbols.push("EXACT".to_string());

    let list = match_against_many(&pattern, &symbols, &data, &MatchConfig::default(), 4);
    assert_eq!(list.len(), 4);
    assert_eq!(list.matched, 7);
    assert_eq!(list.matches[0].symbol, "EXACT");

    for pair in list.matches.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert!(
            a.similarity > b.similarity
                || (a.similarity == b.similarity && a.distance <= b.distance)
        );
    }
}

#[test]
fn test_full_history_search() {
    let segment = noisy_uptrend(30, 77);
    let mut closes = random_walk(100, 60.0, 8);
    closes.extend_from_slice(&segment);
    closes.extend(random_walk(100, 60.0, 9));

    let bars = make_bars(&closes);
    let pattern = prepare_pattern(&segment, None).unwrap();

    let config = MatchConfig {
        recent_only: false,
        ..Default::default()
    };
    let m = match_against_one(&pattern, "HIST", &bars, &config).unwrap();
    assert_eq!(m.window_size, 30);
    assert!(m.similarity > 0.0 && m.similarity <= 1.0);
    assert_eq!(m.matched_prices.len(), 30);

    // a recent-only search cannot reach the middle of the history
    let recent = match_against_one(&pattern, "HIST", &bars, &MatchConfig::default()).unwrap();
    assert!(recent.end_offset <= 3);
}

#[test]
fn test_result_dates_follow_timestamps() {
    let closes = noisy_uptrend(60, 3);
    let pattern = prepare_pattern(&closes[30..60], None).unwrap();
    let m = match_against_one(&pattern, "D", &make_bars(&closes), &MatchConfig::default())
        .unwrap();
    // index 30 and 59 days after 2023-01-02
    assert_eq!(m.start_date, "2023-02-01");
    assert_eq!(m.end_date, "2023-03-02");
}

#[test]
fn test_engine_end_to_end_json() {
    let segment = noisy_uptrend(40, 21);
    let mut closes = random_walk(100, 80.0, 4);
    closes.extend_from_slice(&segment);

    let bars: Vec<Bar> = closes
        .iter()
        .enumerate()
        .map(|(i, &c)| Bar {
            timestamp: START + i as i64 * DAY,
            open: c,
            high: c + 0.5,
            low: c - 0.5,
            close: c,
            volume: 1.0e6,
        })
        .collect();
    let mut data = HashMap::new();
    data.insert("JSON".to_string(), bars);

    let engine = EngineBuilder::new()
        .timeframe(Timeframe::Daily)
        .top_n(3)
        .build()
        .unwrap();
    let report = engine.search(&segment, &["JSON"], &data).unwrap();

    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(value["results"]["searched"], 1);
    assert_eq!(value["results"]["matches"][0]["symbol"], "JSON");
    assert_eq!(value["pattern_stats"]["count"], 40);

    let first: MatchResult =
        serde_json::from_value(value["results"]["matches"][0].clone()).unwrap();
    let original = &report.results.matches[0];
    assert_eq!(first.symbol, original.symbol);
    assert_eq!(first.start_date, original.start_date);
    assert_eq!(first.window_size, original.window_size);
    assert_eq!(first.matched_prices.len(), original.matched_prices.len());
    assert!((first.similarity - original.similarity).abs() < 1e-12);
}
