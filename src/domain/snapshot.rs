//! Deep copies of the candle chain and the lists derived from it.
//!
//! Candles and bars are copied in two phases: every node is allocated and
//! registered in a [`CloneMap`] first, then links are resolved through the
//! map. Derived lists hold plain indices, so their copies are checked against
//! the lengths of the copied lists they point into.

use crate::domain::candle::MergedCandle;
use crate::domain::error::ChanError;
use crate::domain::segment::Segment;
use crate::domain::signal::SignalList;
use crate::domain::stroke::Stroke;
use crate::domain::zone::Zone;
use std::collections::HashMap;

/// Source identity to position in the copy.
#[derive(Debug, Default)]
pub struct CloneMap {
    candles: HashMap<usize, usize>,
    bars: HashMap<usize, usize>,
}

impl CloneMap {
    fn register_candle(&mut self, source: usize, position: usize) -> Result<(), ChanError> {
        if self.candles.insert(source, position).is_some() {
            return Err(ChanError::structure(format!(
                "candle {source} appears twice in the chain"
            )));
        }
        Ok(())
    }

    fn register_bar(&mut self, source: usize, candle: usize) -> Result<(), ChanError> {
        if self.bars.insert(source, candle).is_some() {
            return Err(ChanError::structure(format!(
                "bar {source} appears twice in the chain"
            )));
        }
        Ok(())
    }

    fn candle(&self, source: usize) -> Result<usize, ChanError> {
        self.candles
            .get(&source)
            .copied()
            .ok_or_else(|| ChanError::structure(format!("link to unknown candle {source}")))
    }

    /// Position of the candle holding bar `source`.
    fn bar_owner(&self, source: usize) -> Result<usize, ChanError> {
        self.bars
            .get(&source)
            .copied()
            .ok_or_else(|| ChanError::structure(format!("link to unknown bar {source}")))
    }
}

/// Copy the chain, rebuilding candle and bar links through a [`CloneMap`].
pub fn clone_candle_chain(source: &[MergedCandle]) -> Result<Vec<MergedCandle>, ChanError> {
    let mut map = CloneMap::default();
    let mut copies = Vec::with_capacity(source.len());
    for (position, candle) in source.iter().enumerate() {
        map.register_candle(candle.index, position)?;
        let mut copy = candle.clone();
        copy.prev = None;
        copy.next = None;
        for bar in copy.bars.iter_mut() {
            map.register_bar(bar.index, position)?;
            bar.prev = None;
        }
        copies.push(copy);
    }
    for (copy, candle) in copies.iter_mut().zip(source) {
        copy.prev = candle.prev.map(|p| map.candle(p)).transpose()?;
        copy.next = candle.next.map(|n| map.candle(n)).transpose()?;
        for (bar, source_bar) in copy.bars.iter_mut().zip(&candle.bars) {
            if let Some(prev) = source_bar.prev {
                map.bar_owner(prev)?;
                bar.prev = Some(prev);
            }
        }
    }
    Ok(copies)
}

pub fn clone_strokes(strokes: &[Stroke], candle_count: usize) -> Result<Vec<Stroke>, ChanError> {
    strokes
        .iter()
        .map(|stroke| {
            let dangling = stroke.begin_candle >= candle_count
                || stroke.end_candle >= candle_count
                || stroke.sure_end.iter().any(|c| *c >= candle_count);
            if dangling {
                return Err(ChanError::structure(format!(
                    "stroke {} refers past candle {}",
                    stroke.index,
                    candle_count.saturating_sub(1)
                )));
            }
            Ok(stroke.clone())
        })
        .collect()
}

pub fn clone_segments<C: Clone>(
    segments: &[Segment<C>],
    component_count: usize,
) -> Result<Vec<Segment<C>>, ChanError> {
    let count = segments.len();
    segments
        .iter()
        .map(|segment| {
            let dangling = segment.end >= component_count
                || segment.prev.is_some_and(|p| p >= count)
                || segment.next.is_some_and(|n| n >= count);
            if dangling {
                return Err(ChanError::structure(format!(
                    "segment {} ({}..={}) refers outside the copied lists",
                    segment.index, segment.start, segment.end
                )));
            }
            for zone in &segment.zones {
                check_zone(zone, component_count)?;
            }
            Ok(segment.clone())
        })
        .collect()
}

fn check_zone(zone: &Zone, component_count: usize) -> Result<(), ChanError> {
    let dangling = zone.end >= component_count
        || zone.entering.is_some_and(|i| i >= component_count)
        || zone.exiting.is_some_and(|i| i >= component_count)
        || zone.members.iter().any(|m| *m >= component_count);
    if dangling {
        return Err(ChanError::structure(format!(
            "zone {}..{} refers past component {}",
            zone.begin,
            zone.end,
            component_count.saturating_sub(1)
        )));
    }
    Ok(())
}

pub fn clone_zones(zones: &[Zone], component_count: usize) -> Result<Vec<Zone>, ChanError> {
    zones
        .iter()
        .map(|zone| {
            check_zone(zone, component_count)?;
            Ok(zone.clone())
        })
        .collect()
}

pub fn clone_signals(list: &SignalList, component_count: usize) -> Result<SignalList, ChanError> {
    let primaries = list.primaries.len();
    for signal in list.signals.iter().chain(&list.primaries) {
        if signal.component >= component_count
            || signal.related_primary.is_some_and(|p| p >= primaries)
        {
            return Err(ChanError::structure(format!(
                "signal at component {} refers outside the copied lists",
                signal.component
            )));
        }
    }
    Ok(list.clone())
}
