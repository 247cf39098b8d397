//! Raw price bar representation.

use crate::domain::error::ChanError;
use chrono::NaiveDateTime;

/// MACD state attached to a raw bar at ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MacdPoint {
    pub fast_ema: f64,
    pub slow_ema: f64,
    pub dif: f64,
    pub dea: f64,
    /// 2 * (dif - dea)
    pub histogram: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawBar {
    pub index: usize,
    pub time: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Index of the previously ingested bar.
    pub prev: Option<usize>,
    pub macd: MacdPoint,
}

impl RawBar {
    pub fn new(
        index: usize,
        time: NaiveDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            index,
            time,
            open,
            high,
            low,
            close,
            volume,
            prev: None,
            macd: MacdPoint::default(),
        }
    }

    pub fn mark(&self) -> BarMark {
        BarMark {
            index: self.index,
            time: self.time,
        }
    }

    /// High must bound open/close from above and low from below.
    pub fn validate(&self) -> Result<(), ChanError> {
        let values = [self.open, self.high, self.low, self.close];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ChanError::InvalidBar {
                index: self.index,
                reason: "prices must be finite".to_string(),
            });
        }
        let max = self.open.max(self.close).max(self.low);
        let min = self.open.min(self.close).min(self.high);
        if self.high < max {
            return Err(ChanError::InvalidBar {
                index: self.index,
                reason: format!(
                    "high {} is not the max of open {} close {} low {}",
                    self.high, self.open, self.close, self.low
                ),
            });
        }
        if self.low > min {
            return Err(ChanError::InvalidBar {
                index: self.index,
                reason: format!(
                    "low {} is not the min of open {} close {} high {}",
                    self.low, self.open, self.close, self.high
                ),
            });
        }
        Ok(())
    }
}

/// Pointer to a raw bar by sequence index and timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BarMark {
    pub index: usize,
    pub time: NaiveDateTime,
}
