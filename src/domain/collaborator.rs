//! Seams between the cascade and the pluggable structure algorithms.
//!
//! The cascade owns ordering and truncation; the collaborators own the
//! arithmetic. Each trait has one standard implementation in this crate.

use crate::domain::bar::RawBar;
use crate::domain::candle::{MergeOutcome, MergedCandle};
use crate::domain::component::Component;
use crate::domain::error::ChanError;
use crate::domain::segment::Segment;
use crate::domain::signal::SignalList;
use crate::domain::stroke::Stroke;
use crate::domain::zone::Zone;

pub trait CandleRule {
    /// Relation of a new bar to the tail candle.
    fn merge_test(&self, tail: &MergedCandle, bar: &RawBar) -> Result<MergeOutcome, ChanError>;

    /// Mark `cur` as a top or bottom from its two neighbours.
    fn update_fractal(&self, prev: &MergedCandle, cur: &mut MergedCandle, next: &MergedCandle);
}

pub trait StrokeUpdate {
    fn strokes(&self) -> &[Stroke];

    fn strokes_mut(&mut self) -> &mut [Stroke];

    /// Feed the second-to-last candle after an append. In streaming mode the
    /// last candle also gets a tentative stroke. Returns whether the observable
    /// stroke tail changed.
    fn update(&mut self, candles: &[MergedCandle], streaming: bool) -> Result<bool, ChanError>;

    /// Tentatively extend toward the last candle, optionally dropping the
    /// previous tentative end first. Returns whether the stroke tail changed.
    fn try_extend_virtual(
        &mut self,
        candles: &[MergedCandle],
        delete_end: bool,
    ) -> Result<bool, ChanError>;
}

pub trait SegmentRefresh<C: Component> {
    /// Bring `segments` up to date with `components`.
    fn refresh(&mut self, components: &[C], segments: &mut Vec<Segment<C>>) -> Result<(), ChanError>;
}

pub trait ZoneRecompute<C: Component> {
    fn recompute(
        &mut self,
        components: &[C],
        segments: &[Segment<C>],
        zones: &mut Vec<Zone>,
    ) -> Result<(), ChanError>;
}

pub trait SignalRecompute<C: Component> {
    /// Rebuild `signals` from the component and segment lists.
    fn recompute(
        &self,
        candles: &[MergedCandle],
        components: &[C],
        segments: &[Segment<C>],
        signals: &mut SignalList,
    ) -> Result<(), ChanError>;
}
