//! Incremental MACD and the MACD-derived strength metrics used for divergence.
//!
//! fast EMA  = (2 * close + (fast - 1) * prev_fast) / (fast + 1)
//! slow EMA  = (2 * close + (slow - 1) * prev_slow) / (slow + 1)
//! DIF       = fast EMA - slow EMA
//! DEA       = (2 * DIF + (signal - 1) * prev_DEA) / (signal + 1)
//! histogram = 2 * (DIF - DEA)
//!
//! The first bar seeds both EMAs with its close; DIF and DEA start at zero.
//! Default parameters: fast=12, slow=26, signal=9

use crate::domain::bar::{MacdPoint, RawBar};
use crate::domain::candle::Direction;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

/// Floor added to accumulated metrics so ratios never divide by zero.
const METRIC_FLOOR: f64 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacdParams {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

impl Default for MacdParams {
    fn default() -> Self {
        Self {
            fast: DEFAULT_FAST,
            slow: DEFAULT_SLOW,
            signal: DEFAULT_SIGNAL,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacdState {
    params: MacdParams,
    fast_ema: f64,
    slow_ema: f64,
    dea: f64,
    count: usize,
}

impl MacdState {
    pub fn new(params: MacdParams) -> Self {
        Self {
            params,
            fast_ema: 0.0,
            slow_ema: 0.0,
            dea: 0.0,
            count: 0,
        }
    }

    pub fn next(&mut self, close: f64) -> MacdPoint {
        self.count += 1;
        if self.count == 1 {
            self.fast_ema = close;
            self.slow_ema = close;
            self.dea = 0.0;
        } else {
            self.fast_ema = ema_step(close, self.fast_ema, self.params.fast);
            self.slow_ema = ema_step(close, self.slow_ema, self.params.slow);
            let dif = self.fast_ema - self.slow_ema;
            self.dea = ema_step(dif, self.dea, self.params.signal);
        }
        let dif = self.fast_ema - self.slow_ema;
        MacdPoint {
            fast_ema: self.fast_ema,
            slow_ema: self.slow_ema,
            dif,
            dea: self.dea,
            histogram: 2.0 * (dif - self.dea),
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

fn ema_step(value: f64, prev: f64, period: usize) -> f64 {
    let n = period as f64;
    (2.0 * value + (n - 1.0) * prev) / (n + 1.0)
}

/// Strength measure compared between the entering and exiting legs of a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacdAlgo {
    /// Largest same-signed histogram bar.
    Peak,
    /// Same-signed histogram run adjacent to the leg's start (or end, reversed).
    Area,
    /// Sum of every same-signed histogram bar over the leg.
    FullArea,
    /// Histogram range over the leg.
    Diff,
    /// Relative price move per bar.
    Slope,
    /// Relative price move.
    Amp,
}

impl MacdAlgo {
    pub fn as_str(&self) -> &'static str {
        match self {
            MacdAlgo::Peak => "peak",
            MacdAlgo::Area => "area",
            MacdAlgo::FullArea => "full_area",
            MacdAlgo::Diff => "diff",
            MacdAlgo::Slope => "slope",
            MacdAlgo::Amp => "amp",
        }
    }
}

impl fmt::Display for MacdAlgo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MacdAlgo {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "peak" => Ok(MacdAlgo::Peak),
            "area" => Ok(MacdAlgo::Area),
            "full_area" => Ok(MacdAlgo::FullArea),
            "diff" => Ok(MacdAlgo::Diff),
            "slope" => Ok(MacdAlgo::Slope),
            "amp" => Ok(MacdAlgo::Amp),
            other => Err(format!(
                "unsupported macd_algo '{other}', expected one of peak/area/full_area/diff/slope/amp"
            )),
        }
    }
}

/// A directional leg measured over its raw bars.
///
/// `bars` covers every bar of the merged candles the leg spans, in order;
/// `begin` and `end` are the sequence indices of the leg's extreme bars.
#[derive(Debug, Clone)]
pub struct LegSpan<'a> {
    pub bars: Vec<&'a RawBar>,
    pub direction: Direction,
    pub begin: usize,
    pub end: usize,
}

impl LegSpan<'_> {
    pub fn metric(&self, algo: MacdAlgo, reverse: bool) -> f64 {
        match algo {
            MacdAlgo::Peak => self.peak(),
            MacdAlgo::Area if reverse => self.half_area_reverse(),
            MacdAlgo::Area => self.half_area(),
            MacdAlgo::FullArea => self.full_area(),
            MacdAlgo::Diff => self.diff(),
            MacdAlgo::Slope => self.slope(),
            MacdAlgo::Amp => self.amp(),
        }
    }

    fn same_sign(&self, histogram: f64) -> bool {
        match self.direction {
            Direction::Up => histogram > 0.0,
            Direction::Down => histogram < 0.0,
        }
    }

    fn peak(&self) -> f64 {
        self.bars
            .iter()
            .map(|b| b.macd.histogram)
            .filter(|h| self.same_sign(*h))
            .fold(METRIC_FLOOR, |acc, h| acc.max(h.abs()))
    }

    fn full_area(&self) -> f64 {
        self.bars
            .iter()
            .filter(|b| b.index >= self.begin && b.index <= self.end)
            .map(|b| b.macd.histogram)
            .filter(|h| self.same_sign(*h))
            .fold(METRIC_FLOOR, |acc, h| acc + h.abs())
    }

    fn half_area(&self) -> f64 {
        let Some(first) = self.bars.iter().find(|b| b.index == self.begin) else {
            return METRIC_FLOOR;
        };
        let anchor = first.macd.histogram;
        let mut sum = METRIC_FLOOR;
        for bar in self.bars.iter().filter(|b| b.index >= self.begin) {
            if bar.macd.histogram * anchor > 0.0 {
                sum += bar.macd.histogram.abs();
            } else {
                break;
            }
        }
        sum
    }

    fn half_area_reverse(&self) -> f64 {
        let Some(last) = self.bars.iter().find(|b| b.index == self.end) else {
            return METRIC_FLOOR;
        };
        let anchor = last.macd.histogram;
        let mut sum = METRIC_FLOOR;
        for bar in self.bars.iter().rev().filter(|b| b.index <= self.end) {
            if bar.macd.histogram * anchor > 0.0 {
                sum += bar.macd.histogram.abs();
            } else {
                break;
            }
        }
        sum
    }

    fn diff(&self) -> f64 {
        let (min, max) = self
            .bars
            .iter()
            .map(|b| b.macd.histogram)
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), h| {
                (lo.min(h), hi.max(h))
            });
        if min.is_finite() { max - min } else { 0.0 }
    }

    fn endpoints(&self) -> Option<(&RawBar, &RawBar)> {
        let begin = self.bars.iter().find(|b| b.index == self.begin)?;
        let end = self.bars.iter().find(|b| b.index == self.end)?;
        Some((begin, end))
    }

    fn slope(&self) -> f64 {
        let Some((begin, end)) = self.endpoints() else {
            return 0.0;
        };
        let span = end.index.saturating_sub(begin.index) as f64 + 1.0;
        match self.direction {
            Direction::Up => (end.high - begin.low) / end.high / span,
            Direction::Down => (begin.high - end.low) / begin.high / span,
        }
    }

    fn amp(&self) -> f64 {
        let Some((begin, end)) = self.endpoints() else {
            return 0.0;
        };
        match self.direction {
            Direction::Up => (end.high - begin.low) / begin.low,
            Direction::Down => (begin.high - end.low) / begin.high,
        }
    }
}
