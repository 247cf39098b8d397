//! Merged candles: runs of raw bars folded into one unit by the inclusion rule.

use crate::domain::bar::RawBar;
use crate::domain::collaborator::CandleRule;
use crate::domain::error::ChanError;
use chrono::NaiveDateTime;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fractal {
    Top,
    Bottom,
    Unknown,
}

impl Fractal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Fractal::Top => "top",
            Fractal::Bottom => "bottom",
            Fractal::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Fractal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of testing a new bar against the tail candle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Merge,
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedCandle {
    pub index: usize,
    pub direction: Direction,
    pub high: f64,
    pub low: f64,
    pub fractal: Fractal,
    /// Contributing bars in ingestion order; never empty.
    pub bars: Vec<RawBar>,
    pub prev: Option<usize>,
    pub next: Option<usize>,
}

impl MergedCandle {
    pub fn new(index: usize, bar: RawBar, direction: Direction, prev: Option<usize>) -> Self {
        Self {
            index,
            direction,
            high: bar.high,
            low: bar.low,
            fractal: Fractal::Unknown,
            bars: vec![bar],
            prev,
            next: None,
        }
    }

    pub fn time_begin(&self) -> NaiveDateTime {
        self.first_bar().time
    }

    pub fn time_end(&self) -> NaiveDateTime {
        self.last_bar().time
    }

    pub fn first_bar(&self) -> &RawBar {
        &self.bars[0]
    }

    pub fn last_bar(&self) -> &RawBar {
        &self.bars[self.bars.len() - 1]
    }

    /// The latest bar that sets the candle's high (or low).
    pub fn peak_bar(&self, is_high: bool) -> Result<&RawBar, ChanError> {
        self.bars
            .iter()
            .rev()
            .find(|b| {
                if is_high {
                    b.high == self.high
                } else {
                    b.low == self.low
                }
            })
            .ok_or_else(|| {
                ChanError::structure(format!("candle {} has no bar at its extreme", self.index))
            })
    }

    /// Fold a contained or containing bar into the candle.
    ///
    /// Up candles keep the higher high and higher low, down candles the lower
    /// pair. A one-price bar sitting on the current extreme leaves the bounds
    /// untouched.
    pub fn absorb(&mut self, bar: RawBar) {
        let one_price = bar.high == bar.low;
        match self.direction {
            Direction::Up => {
                if !one_price || bar.high != self.high {
                    self.high = self.high.max(bar.high);
                    self.low = self.low.max(bar.low);
                }
            }
            Direction::Down => {
                if !one_price || bar.low != self.low {
                    self.high = self.high.min(bar.high);
                    self.low = self.low.min(bar.low);
                }
            }
        }
        self.bars.push(bar);
    }

    pub fn has_gap_with(&self, next: &MergedCandle) -> bool {
        !crate::domain::component::has_overlap(self.low, self.high, next.low, next.high, true)
    }
}

/// Standard inclusion merge and strict three-candle fractal test.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardCandleRule;

impl CandleRule for StandardCandleRule {
    fn merge_test(&self, tail: &MergedCandle, bar: &RawBar) -> Result<MergeOutcome, ChanError> {
        let contains = tail.high >= bar.high && tail.low <= bar.low;
        let contained = tail.high <= bar.high && tail.low >= bar.low;
        if contains || contained {
            return Ok(MergeOutcome::Merge);
        }
        if tail.high > bar.high && tail.low > bar.low {
            return Ok(MergeOutcome::Down);
        }
        if tail.high < bar.high && tail.low < bar.low {
            return Ok(MergeOutcome::Up);
        }
        Err(ChanError::structure(format!(
            "bar {} has no defined merge relation to candle {}",
            bar.index, tail.index
        )))
    }

    fn update_fractal(&self, prev: &MergedCandle, cur: &mut MergedCandle, next: &MergedCandle) {
        if prev.high < cur.high && next.high < cur.high && prev.low < cur.low && next.low < cur.low
        {
            cur.fractal = Fractal::Top;
        } else if prev.high > cur.high
            && next.high > cur.high
            && prev.low > cur.low
            && next.low > cur.low
        {
            cur.fractal = Fractal::Bottom;
        }
    }
}
