//! Capability set shared by strokes and segments.
//!
//! Everything above the stroke level (segments, zones, signals) is written
//! against this trait so one implementation serves both fractal levels.

use crate::domain::bar::BarMark;
use crate::domain::candle::Direction;

pub trait Component {
    fn index(&self) -> usize;
    fn direction(&self) -> Direction;
    fn is_sure(&self) -> bool;

    /// Sure, or sure but currently stretched by a tentative end.
    fn is_confirmed(&self) -> bool {
        self.is_sure()
    }

    fn begin_value(&self) -> f64;
    fn end_value(&self) -> f64;
    fn begin_mark(&self) -> BarMark;
    fn end_mark(&self) -> BarMark;
    fn begin_candle(&self) -> usize;
    fn end_candle(&self) -> usize;

    /// Index of the owning segment one level up, once assigned.
    fn segment_index(&self) -> Option<usize>;
    fn set_segment_index(&mut self, index: usize);

    fn high(&self) -> f64 {
        self.begin_value().max(self.end_value())
    }

    fn low(&self) -> f64 {
        self.begin_value().min(self.end_value())
    }

    fn amplitude(&self) -> f64 {
        (self.end_value() - self.begin_value()).abs()
    }

    fn is_up(&self) -> bool {
        self.direction() == Direction::Up
    }

    fn is_down(&self) -> bool {
        self.direction() == Direction::Down
    }
}

/// Whether `[l1, h1]` and `[l2, h2]` overlap; `equal` admits touching ranges.
pub fn has_overlap(l1: f64, h1: f64, l2: f64, h2: f64, equal: bool) -> bool {
    if equal {
        h2 >= l1 && h1 >= l2
    } else {
        h2 > l1 && h1 > l2
    }
}
