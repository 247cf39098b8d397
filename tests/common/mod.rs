#![allow(dead_code)]

use chanlun::domain::bar::RawBar;
use chanlun::domain::config::ChanConfig;
use chanlun::domain::sequence::CandleSequence;
use chanlun::ports::config_port::{ConfigPort, parse_bool};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn minute(index: usize) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 4)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap()
        + chrono::Duration::minutes(index as i64)
}

/// Bar whose open sits at the low and close at the high.
pub fn make_bar(index: usize, high: f64, low: f64) -> RawBar {
    RawBar::new(index, minute(index), low, high, low, high, 1_000.0)
}

/// One bar per (high, low) pair, indexed from zero.
pub fn bars_from(points: &[(f64, f64)]) -> Vec<RawBar> {
    points
        .iter()
        .enumerate()
        .map(|(i, (h, l))| make_bar(i, *h, *l))
        .collect()
}

/// Bars walking linearly between pivots, one unit wide, so consecutive bars
/// on a leg never merge and every pivot ends up as a fractal.
pub fn wave_bars(pivots: &[f64], bars_per_leg: usize) -> Vec<RawBar> {
    let mut prices = Vec::new();
    for pair in pivots.windows(2) {
        let (from, to) = (pair[0], pair[1]);
        for step in 0..bars_per_leg {
            prices.push(from + (to - from) * step as f64 / bars_per_leg as f64);
        }
    }
    if let Some(last) = pivots.last() {
        prices.push(*last);
    }
    prices
        .iter()
        .enumerate()
        .map(|(i, p)| make_bar(i, p + 0.5, p - 0.5))
        .collect()
}

/// Pivots from alternating signed moves starting at 100.
pub fn pivots_from_moves(moves: &[f64]) -> Vec<f64> {
    let mut pivots = vec![100.0];
    let mut price = 100.0;
    for (i, m) in moves.iter().enumerate() {
        price += if i % 2 == 0 { *m } else { -*m };
        pivots.push(price);
    }
    pivots
}

/// Deterministic trending zigzag: rises, a long consolidation, then a fall.
pub fn trend_pivots() -> Vec<f64> {
    let mut moves = Vec::new();
    let mut seed: u64 = 17;
    for leg in 0..60 {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let jitter = (seed >> 33) as f64 / (1u64 << 31) as f64;
        let bias = match leg / 20 {
            0 => if leg % 2 == 0 { 6.0 } else { 3.0 },
            1 => 4.0,
            _ => if leg % 2 == 0 { 3.0 } else { 6.0 },
        };
        moves.push(bias + jitter * 2.0);
    }
    pivots_from_moves(&moves)
}

pub fn config(streaming: bool) -> ChanConfig {
    ChanConfig {
        streaming,
        ..ChanConfig::default()
    }
}

pub fn run(config: ChanConfig, bars: &[RawBar]) -> CandleSequence {
    let mut sequence = CandleSequence::new(config).unwrap();
    sequence.ingest_all(bars.iter().cloned()).unwrap();
    if sequence.is_streaming() {
        sequence.cascade().unwrap();
    }
    sequence
}

/// Map-backed config source keyed by (section, key).
pub struct MockConfigPort {
    pub values: HashMap<(String, String), String>,
}

impl MockConfigPort {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    pub fn with(mut self, section: &str, key: &str, value: &str) -> Self {
        self.values
            .insert((section.to_string(), key.to_string()), value.to_string());
        self
    }
}

impl ConfigPort for MockConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.values
            .get(&(section.to_string(), key.to_string()))
            .cloned()
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.get_string(section, key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.get_string(section, key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.get_string(section, key)
            .and_then(|v| parse_bool(&v))
            .unwrap_or(default)
    }
}
