//! Strokes: the minimal directional unit between two opposite fractals.

use crate::domain::bar::BarMark;
use crate::domain::candle::{Direction, Fractal, MergedCandle};
use crate::domain::component::Component;
use crate::domain::error::ChanError;

#[derive(Debug, Clone, PartialEq)]
pub struct Stroke {
    pub index: usize,
    pub direction: Direction,
    pub is_sure: bool,
    pub begin_candle: usize,
    pub end_candle: usize,
    /// Confirmed end candles displaced by a tentative extension, oldest first.
    pub sure_end: Vec<usize>,
    pub segment_index: Option<usize>,
    begin_value: f64,
    end_value: f64,
    begin_mark: BarMark,
    end_mark: BarMark,
}

impl Stroke {
    /// Direction follows the begin candle's fractal: a bottom starts an up stroke.
    pub fn new(
        index: usize,
        begin: &MergedCandle,
        end: &MergedCandle,
        is_sure: bool,
    ) -> Result<Self, ChanError> {
        let direction = match begin.fractal {
            Fractal::Bottom => Direction::Up,
            Fractal::Top => Direction::Down,
            Fractal::Unknown => {
                return Err(ChanError::structure(format!(
                    "stroke {index} starts at candle {} which is not a fractal",
                    begin.index
                )));
            }
        };
        let (begin_value, begin_mark) = match direction {
            Direction::Up => (begin.low, begin.peak_bar(false)?.mark()),
            Direction::Down => (begin.high, begin.peak_bar(true)?.mark()),
        };
        let mut stroke = Self {
            index,
            direction,
            is_sure,
            begin_candle: begin.index,
            end_candle: begin.index,
            sure_end: Vec::new(),
            segment_index: None,
            begin_value,
            end_value: begin_value,
            begin_mark,
            end_mark: begin_mark,
        };
        stroke.set_end(end)?;
        Ok(stroke)
    }

    /// Move the end to `end`, keeping sureness.
    pub fn set_end(&mut self, end: &MergedCandle) -> Result<(), ChanError> {
        let valid = match self.direction {
            Direction::Down => self.begin_value > end.low,
            Direction::Up => self.begin_value < end.high,
        };
        if !valid {
            return Err(ChanError::structure(format!(
                "{} stroke {} cannot end at candle {} ({} -> {}..{})",
                self.direction, self.index, end.index, self.begin_value, end.low, end.high
            )));
        }
        let (end_value, end_mark) = match self.direction {
            Direction::Up => (end.high, end.peak_bar(true)?.mark()),
            Direction::Down => (end.low, end.peak_bar(false)?.mark()),
        };
        self.end_candle = end.index;
        self.end_value = end_value;
        self.end_mark = end_mark;
        Ok(())
    }

    /// Stretch to a tentative end, remembering the confirmed one.
    pub fn extend_tentatively(&mut self, end: &MergedCandle) -> Result<(), ChanError> {
        self.sure_end.push(self.end_candle);
        self.set_end(end)?;
        self.is_sure = false;
        Ok(())
    }

    /// Undo a tentative extension, returning to the confirmed end.
    pub fn restore_sure_end(&mut self, end: &MergedCandle) -> Result<(), ChanError> {
        self.is_sure = true;
        self.set_end(end)?;
        self.sure_end.clear();
        Ok(())
    }

    pub fn candle_count(&self) -> usize {
        self.end_candle - self.begin_candle + 1
    }

    pub fn bar_count(&self) -> usize {
        self.end_mark.index.saturating_sub(self.begin_mark.index) + 1
    }
}

impl Component for Stroke {
    fn index(&self) -> usize {
        self.index
    }

    fn direction(&self) -> Direction {
        self.direction
    }

    fn is_sure(&self) -> bool {
        self.is_sure
    }

    fn is_confirmed(&self) -> bool {
        self.is_sure || !self.sure_end.is_empty()
    }

    fn begin_value(&self) -> f64 {
        self.begin_value
    }

    fn end_value(&self) -> f64 {
        self.end_value
    }

    fn begin_mark(&self) -> BarMark {
        self.begin_mark
    }

    fn end_mark(&self) -> BarMark {
        self.end_mark
    }

    fn begin_candle(&self) -> usize {
        self.begin_candle
    }

    fn end_candle(&self) -> usize {
        self.end_candle
    }

    fn segment_index(&self) -> Option<usize> {
        self.segment_index
    }

    fn set_segment_index(&mut self, index: usize) {
        self.segment_index = Some(index);
    }
}
