//! Standard stroke builder: pairs opposite fractals into strokes.
//!
//! Sure strokes only ever grow at the tail. In streaming mode one tentative
//! stroke (or a tentative extension of the last sure stroke) sits on the
//! frontier; it is discarded and the confirmed end restored at the start of
//! every update.

use crate::domain::candle::{Direction, Fractal, MergedCandle};
use crate::domain::collaborator::StrokeUpdate;
use crate::domain::component::Component;
use crate::domain::config::{FxCheck, StrokeAlgo, StrokeConfig};
use crate::domain::error::ChanError;
use crate::domain::stroke::Stroke;

#[derive(Debug, Clone, PartialEq)]
pub struct StrokeList {
    config: StrokeConfig,
    strokes: Vec<Stroke>,
    /// End candle of the last stroke, or the newest free fractal before the first stroke.
    last_end: Option<usize>,
    /// Fractal candles seen before the first stroke exists.
    free_candles: Vec<usize>,
}

/// Observable state of the stroke tail, compared across an update.
#[derive(Debug, Clone, Copy, PartialEq)]
struct TailFingerprint {
    len: usize,
    begin_candle: usize,
    end_candle: usize,
    is_sure: bool,
    end_value: u64,
    end_bar: usize,
    end_candle_bars: usize,
}

fn candle_at(candles: &[MergedCandle], index: usize) -> Result<&MergedCandle, ChanError> {
    candles
        .get(index)
        .ok_or_else(|| ChanError::structure(format!("candle {index} is out of range")))
}

fn linked<'a>(
    candles: &'a [MergedCandle],
    link: Option<usize>,
    from: usize,
) -> Result<&'a MergedCandle, ChanError> {
    let index = link.ok_or_else(|| {
        ChanError::structure(format!("candle {from} is missing a neighbour"))
    })?;
    candle_at(candles, index)
}

impl StrokeList {
    pub fn new(config: StrokeConfig) -> Self {
        Self {
            config,
            strokes: Vec::new(),
            last_end: None,
            free_candles: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.strokes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }

    pub fn last_end(&self) -> Option<usize> {
        self.last_end
    }

    pub(crate) fn free_candles(&self) -> &[usize] {
        &self.free_candles
    }

    pub(crate) fn from_parts(
        config: StrokeConfig,
        strokes: Vec<Stroke>,
        last_end: Option<usize>,
        free_candles: Vec<usize>,
    ) -> Self {
        Self {
            config,
            strokes,
            last_end,
            free_candles,
        }
    }

    pub fn config(&self) -> &StrokeConfig {
        &self.config
    }

    fn fingerprint(&self, candles: &[MergedCandle]) -> Option<TailFingerprint> {
        let last = self.strokes.last()?;
        Some(TailFingerprint {
            len: self.strokes.len(),
            begin_candle: last.begin_candle,
            end_candle: last.end_candle,
            is_sure: last.is_sure,
            end_value: last.end_value().to_bits(),
            end_bar: last.end_mark().index,
            end_candle_bars: candles.get(last.end_candle).map_or(0, |c| c.bars.len()),
        })
    }

    fn add_stroke(
        &mut self,
        candles: &[MergedCandle],
        begin: usize,
        end: usize,
        is_sure: bool,
    ) -> Result<(), ChanError> {
        let stroke = Stroke::new(
            self.strokes.len(),
            candle_at(candles, begin)?,
            candle_at(candles, end)?,
            is_sure,
        )?;
        self.strokes.push(stroke);
        Ok(())
    }

    /// Drop the tentative tail and restore any confirmed end it displaced.
    fn delete_virtual(&mut self, candles: &[MergedCandle]) -> Result<(), ChanError> {
        let tentative = self.strokes.last().is_some_and(|s| !s.is_sure);
        if tentative {
            let sure_end = self
                .strokes
                .last()
                .map(|s| s.sure_end.clone())
                .unwrap_or_default();
            if let Some((first, rest)) = sure_end.split_first() {
                let restored = candle_at(candles, *first)?;
                if let Some(last) = self.strokes.last_mut() {
                    last.restore_sure_end(restored)?;
                }
                let mut end = *first;
                for next in rest {
                    self.add_stroke(candles, end, *next, true)?;
                    end = *next;
                }
            } else {
                self.strokes.pop();
            }
        }
        self.last_end = self.strokes.last().map(|s| s.end_candle);
        Ok(())
    }

    fn try_create_first(&mut self, candles: &[MergedCandle], index: usize) -> Result<(), ChanError> {
        let fractal = candle_at(candles, index)?.fractal;
        let free = self.free_candles.clone();
        for begin in free {
            if candle_at(candles, begin)?.fractal == fractal {
                continue;
            }
            if self.can_make(candles, index, begin, false)? {
                self.add_stroke(candles, begin, index, true)?;
                self.last_end = Some(index);
                return Ok(());
            }
        }
        self.free_candles.push(index);
        self.last_end = Some(index);
        Ok(())
    }

    /// Move the last stroke's end further out when `index` makes a new extreme.
    fn try_update_end(
        &mut self,
        candles: &[MergedCandle],
        index: usize,
        for_virtual: bool,
    ) -> Result<bool, ChanError> {
        let candle = candle_at(candles, index)?;
        let Some(last) = self.strokes.last_mut() else {
            return Ok(false);
        };
        let (check_top, check_bottom) = if for_virtual {
            (
                candle.direction == Direction::Up,
                candle.direction == Direction::Down,
            )
        } else {
            (
                candle.fractal == Fractal::Top,
                candle.fractal == Fractal::Bottom,
            )
        };
        let extends = (last.is_up() && check_top && candle.high >= last.end_value())
            || (last.is_down() && check_bottom && candle.low <= last.end_value());
        if !extends {
            return Ok(false);
        }
        if for_virtual {
            last.extend_tentatively(candle)?;
        } else {
            last.set_end(candle)?;
        }
        self.last_end = Some(index);
        Ok(true)
    }

    fn update_sure(&mut self, candles: &[MergedCandle], index: usize) -> Result<(), ChanError> {
        self.delete_virtual(candles)?;
        let fractal = candle_at(candles, index)?.fractal;
        if fractal == Fractal::Unknown {
            return Ok(());
        }
        let last_end = match self.last_end {
            Some(end) if !self.strokes.is_empty() => end,
            _ => return self.try_create_first(candles, index),
        };
        if fractal == candle_at(candles, last_end)?.fractal {
            self.try_update_end(candles, index, false)?;
        } else if self.can_make(candles, index, last_end, false)? {
            self.add_stroke(candles, last_end, index, true)?;
            self.last_end = Some(index);
        }
        Ok(())
    }

    fn try_add_virtual(
        &mut self,
        candles: &[MergedCandle],
        index: usize,
        delete_end: bool,
    ) -> Result<(), ChanError> {
        if delete_end {
            self.delete_virtual(candles)?;
        }
        let Some(last) = self.strokes.last() else {
            return Ok(());
        };
        let last_end = last.end_candle;
        if index == last_end {
            return Ok(());
        }
        let candle = candle_at(candles, index)?;
        let end = candle_at(candles, last_end)?;
        if (last.is_up() && candle.high >= end.high) || (last.is_down() && candle.low <= end.low) {
            if let Some(last) = self.strokes.last_mut() {
                last.extend_tentatively(candle)?;
            }
            return Ok(());
        }
        let mut cursor = Some(index);
        while let Some(current) = cursor {
            if current <= last_end {
                break;
            }
            if self.can_make(candles, current, last_end, true)? {
                self.add_stroke(candles, last_end, current, false)?;
                return Ok(());
            }
            cursor = candle_at(candles, current)?.prev;
        }
        Ok(())
    }

    fn can_make(
        &self,
        candles: &[MergedCandle],
        index: usize,
        last_end: usize,
        for_virtual: bool,
    ) -> Result<bool, ChanError> {
        if self.config.algo != StrokeAlgo::Fx && !self.satisfy_span(candles, index, last_end)? {
            return Ok(false);
        }
        if !self.check_fx_valid(candles, last_end, index, for_virtual)? {
            return Ok(false);
        }
        if self.config.end_is_peak && !end_is_peak(candles, last_end, index)? {
            return Ok(false);
        }
        Ok(true)
    }

    fn satisfy_span(
        &self,
        candles: &[MergedCandle],
        index: usize,
        last_end: usize,
    ) -> Result<bool, ChanError> {
        let span = self.candle_span(candles, index, last_end)?;
        if self.config.is_strict {
            return Ok(span >= 4);
        }
        let mut bar_count = 0;
        let mut cursor = candle_at(candles, last_end)?.next;
        while let Some(current) = cursor {
            let candle = candle_at(candles, current)?;
            bar_count += candle.bars.len();
            match candle.next {
                None => return Ok(false),
                Some(next) if next < index => cursor = Some(next),
                Some(_) => break,
            }
        }
        Ok(span >= 3 && bar_count >= 3)
    }

    fn candle_span(
        &self,
        candles: &[MergedCandle],
        index: usize,
        last_end: usize,
    ) -> Result<usize, ChanError> {
        let mut span = index.saturating_sub(last_end);
        if !self.config.gap_as_candle || span >= 4 {
            return Ok(span);
        }
        for current in last_end..index {
            let candle = candle_at(candles, current)?;
            if let Some(next) = candle.next {
                if candle.has_gap_with(candle_at(candles, next)?) {
                    span += 1;
                }
            }
        }
        Ok(span)
    }

    fn check_fx_valid(
        &self,
        candles: &[MergedCandle],
        from: usize,
        to: usize,
        for_virtual: bool,
    ) -> Result<bool, ChanError> {
        let cur = candle_at(candles, from)?;
        let item = candle_at(candles, to)?;
        let method = self.config.fx_check;
        match cur.fractal {
            Fractal::Top => {
                if for_virtual && item.direction != Direction::Down {
                    return Ok(false);
                }
                let (item_high, cur_low) = match method {
                    FxCheck::Half => {
                        let item_prev = linked(candles, item.prev, to)?;
                        let cur_next = linked(candles, cur.next, from)?;
                        (item_prev.high.max(item.high), cur.low.min(cur_next.low))
                    }
                    FxCheck::Loss => (item.high, cur.low),
                    FxCheck::Strict | FxCheck::Totally => {
                        let item_prev = linked(candles, item.prev, to)?;
                        let mut high = item_prev.high.max(item.high);
                        if !for_virtual {
                            high = high.max(linked(candles, item.next, to)?.high);
                        }
                        let cur_prev = linked(candles, cur.prev, from)?;
                        let cur_next = linked(candles, cur.next, from)?;
                        (high, cur_prev.low.min(cur.low).min(cur_next.low))
                    }
                };
                if method == FxCheck::Totally {
                    Ok(cur.low > item_high)
                } else {
                    Ok(cur.high > item_high && item.low < cur_low)
                }
            }
            Fractal::Bottom => {
                if for_virtual && item.direction != Direction::Up {
                    return Ok(false);
                }
                let (item_low, cur_high) = match method {
                    FxCheck::Half => {
                        let item_prev = linked(candles, item.prev, to)?;
                        let cur_next = linked(candles, cur.next, from)?;
                        (item_prev.low.min(item.low), cur.high.max(cur_next.high))
                    }
                    FxCheck::Loss => (item.low, cur.high),
                    FxCheck::Strict | FxCheck::Totally => {
                        let item_prev = linked(candles, item.prev, to)?;
                        let mut low = item_prev.low.min(item.low);
                        if !for_virtual {
                            low = low.min(linked(candles, item.next, to)?.low);
                        }
                        let cur_prev = linked(candles, cur.prev, from)?;
                        let cur_next = linked(candles, cur.next, from)?;
                        (low, cur_prev.high.max(cur.high).max(cur_next.high))
                    }
                };
                if method == FxCheck::Totally {
                    Ok(cur.high < item_low)
                } else {
                    Ok(cur.low < item_low && item.high > cur_high)
                }
            }
            Fractal::Unknown => Err(ChanError::structure(format!(
                "stroke end candle {from} carries no fractal"
            ))),
        }
    }
}

/// No candle strictly between the two ends may exceed the new end.
fn end_is_peak(candles: &[MergedCandle], last_end: usize, end: usize) -> Result<bool, ChanError> {
    let begin = candle_at(candles, last_end)?;
    let target = candle_at(candles, end)?;
    let between = candles.get(last_end + 1..end).unwrap_or(&[]);
    Ok(match begin.fractal {
        Fractal::Bottom => between.iter().all(|c| c.high <= target.high),
        Fractal::Top => between.iter().all(|c| c.low >= target.low),
        Fractal::Unknown => true,
    })
}

impl StrokeUpdate for StrokeList {
    fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    fn strokes_mut(&mut self) -> &mut [Stroke] {
        &mut self.strokes
    }

    fn update(&mut self, candles: &[MergedCandle], streaming: bool) -> Result<bool, ChanError> {
        if candles.len() < 2 {
            return Ok(false);
        }
        let before = self.fingerprint(candles);
        self.update_sure(candles, candles.len() - 2)?;
        if streaming {
            self.try_add_virtual(candles, candles.len() - 1, false)?;
        }
        Ok(before != self.fingerprint(candles))
    }

    fn try_extend_virtual(
        &mut self,
        candles: &[MergedCandle],
        delete_end: bool,
    ) -> Result<bool, ChanError> {
        let Some(last) = candles.len().checked_sub(1) else {
            return Ok(false);
        };
        let before = self.fingerprint(candles);
        self.try_add_virtual(candles, last, delete_end)?;
        Ok(before != self.fingerprint(candles))
    }
}
