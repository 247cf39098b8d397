//! Bar ingestion and the cascade that keeps every derived layer in step.
//!
//! One [`CandleSequence`] owns the merged candle chain and everything built on
//! it: strokes, two levels of segments, their zones and signals. Streaming
//! sequences cascade whenever the stroke tail moves; batch sequences cascade
//! once, from [`CandleSequence::cascade`].

use crate::domain::bar::{BarMark, RawBar};
use crate::domain::candle::{Direction, MergeOutcome, MergedCandle, StandardCandleRule};
use crate::domain::collaborator::{CandleRule, SignalRecompute, StrokeUpdate, ZoneRecompute};
use crate::domain::config::ChanConfig;
use crate::domain::config_validation::validate_chan_config;
use crate::domain::error::ChanError;
use crate::domain::indicator::MacdState;
use crate::domain::report::Reports;
use crate::domain::segment::Segment;
use crate::domain::segment_builder::SegmentBuilder;
use crate::domain::segment_cascade::recompute_segments;
use crate::domain::signal_builder::SignalBuilder;
use crate::domain::signal::{SignalList, SignalRecord};
use crate::domain::snapshot;
use crate::domain::stroke::Stroke;
use crate::domain::stroke_builder::StrokeList;
use crate::domain::zone::Zone;
use crate::domain::zone_builder::ZoneBuilder;
use crate::domain::zone_linkage::relink_zones;
use log::{debug, trace, warn};

pub type StrokeSegment = Segment<Stroke>;
pub type SegmentSegment = Segment<Segment<Stroke>>;

#[derive(Debug)]
pub struct CandleSequence {
    config: ChanConfig,
    rule: StandardCandleRule,
    macd: MacdState,
    last_bar: Option<BarMark>,
    candles: Vec<MergedCandle>,
    strokes: StrokeList,
    segment_builder: SegmentBuilder,
    segment_segment_builder: SegmentBuilder,
    segments: Vec<StrokeSegment>,
    segment_segments: Vec<SegmentSegment>,
    zone_builder: ZoneBuilder,
    segment_zone_builder: ZoneBuilder,
    zones: Vec<Zone>,
    segment_zones: Vec<Zone>,
    signal_builder: SignalBuilder,
    segment_signal_builder: SignalBuilder,
    signals: SignalList,
    segment_signals: SignalList,
    signal_history: Vec<SignalRecord>,
    segment_signal_history: Vec<SignalRecord>,
}

impl CandleSequence {
    /// Validates `config`; nothing is ingested on failure.
    pub fn new(config: ChanConfig) -> Result<Self, ChanError> {
        validate_chan_config(&config)?;
        if config.seg_algo.is_deprecated() {
            warn!(
                "seg_algo={} is deprecated and no longer maintained",
                config.seg_algo.as_str()
            );
        }
        Ok(Self {
            rule: StandardCandleRule,
            macd: MacdState::new(config.macd),
            last_bar: None,
            candles: Vec::new(),
            strokes: StrokeList::new(config.stroke.clone()),
            segment_builder: SegmentBuilder::new(config.seg_algo, config.segment.clone()),
            segment_segment_builder: SegmentBuilder::new(config.seg_algo, config.segment.clone()),
            segments: Vec::new(),
            segment_segments: Vec::new(),
            zone_builder: ZoneBuilder::new(config.zone.clone()),
            segment_zone_builder: ZoneBuilder::new(config.zone.clone()),
            zones: Vec::new(),
            segment_zones: Vec::new(),
            signal_builder: SignalBuilder::new(config.signal.clone()),
            segment_signal_builder: SignalBuilder::new(config.seg_signal.clone()),
            signals: SignalList::new(),
            segment_signals: SignalList::new(),
            signal_history: Vec::new(),
            segment_signal_history: Vec::new(),
            config,
        })
    }

    pub fn config(&self) -> &ChanConfig {
        &self.config
    }

    pub fn is_streaming(&self) -> bool {
        self.config.streaming
    }

    /// Add one bar. Ordering and bar shape are checked before anything,
    /// including indicator state, is touched.
    pub fn ingest(&mut self, mut bar: RawBar) -> Result<(), ChanError> {
        if let Some(last) = self.last_bar {
            if bar.index <= last.index || bar.time <= last.time {
                return Err(ChanError::OutOfOrder {
                    previous: last.index,
                    received: bar.index,
                });
            }
        }
        bar.validate()?;
        bar.prev = self.last_bar.map(|m| m.index);
        bar.macd = self.macd.next(bar.close);
        self.last_bar = Some(bar.mark());

        let index = self.candles.len();
        let Some(tail) = self.candles.last_mut() else {
            trace!("bar {} opens candle 0", bar.index);
            self.candles
                .push(MergedCandle::new(0, bar, Direction::Up, None));
            return Ok(());
        };
        match self.rule.merge_test(tail, &bar)? {
            MergeOutcome::Merge => {
                trace!("bar {} merges into candle {}", bar.index, tail.index);
                tail.absorb(bar);
                if self.config.streaming
                    && self.strokes.try_extend_virtual(&self.candles, true)?
                {
                    self.run_cascade()?;
                }
            }
            outcome => {
                let direction = match outcome {
                    MergeOutcome::Down => Direction::Down,
                    _ => Direction::Up,
                };
                trace!("bar {} opens {} candle {index}", bar.index, direction);
                tail.next = Some(index);
                self.candles
                    .push(MergedCandle::new(index, bar, direction, Some(index - 1)));
                self.mark_fractal();
                if self.strokes.update(&self.candles, self.config.streaming)?
                    && self.config.streaming
                {
                    self.run_cascade()?;
                }
            }
        }
        Ok(())
    }

    /// Ingest every bar; a batch sequence then cascades once.
    pub fn ingest_all<I>(&mut self, bars: I) -> Result<(), ChanError>
    where
        I: IntoIterator<Item = RawBar>,
    {
        for bar in bars {
            self.ingest(bar)?;
        }
        if !self.config.streaming {
            self.cascade()?;
        }
        Ok(())
    }

    /// Recompute every derived layer. A batch sequence first represents the
    /// open tail as a tentative stroke.
    pub fn cascade(&mut self) -> Result<(), ChanError> {
        if !self.config.streaming {
            self.strokes.try_extend_virtual(&self.candles, true)?;
        }
        self.run_cascade()
    }

    fn mark_fractal(&mut self) {
        let len = self.candles.len();
        if len < 3 {
            return;
        }
        let (head, tail) = self.candles.split_at_mut(len - 2);
        let (middle, right) = tail.split_at_mut(1);
        if let (Some(left), Some(cur), Some(next)) = (head.last(), middle.first_mut(), right.first())
        {
            self.rule.update_fractal(left, cur, next);
        }
    }

    fn run_cascade(&mut self) -> Result<(), ChanError> {
        recompute_segments(
            &mut self.segment_builder,
            self.strokes.strokes_mut(),
            &mut self.segments,
        )?;
        let strokes = self.strokes.strokes();
        self.zone_builder
            .recompute(strokes, &self.segments, &mut self.zones)?;
        relink_zones(strokes, &mut self.segments, &mut self.zones)?;

        recompute_segments(
            &mut self.segment_segment_builder,
            &mut self.segments,
            &mut self.segment_segments,
        )?;
        self.segment_zone_builder.recompute(
            &self.segments,
            &self.segment_segments,
            &mut self.segment_zones,
        )?;
        relink_zones(
            &self.segments,
            &mut self.segment_segments,
            &mut self.segment_zones,
        )?;

        self.segment_signal_builder.recompute(
            &self.candles,
            &self.segments,
            &self.segment_segments,
            &mut self.segment_signals,
        )?;
        if let Some(record) = self.segment_signals.latest_record() {
            self.segment_signal_history.push(record);
        }
        self.signal_builder.recompute(
            &self.candles,
            self.strokes.strokes(),
            &self.segments,
            &mut self.signals,
        )?;
        if let Some(record) = self.signals.latest_record() {
            self.signal_history.push(record);
        }
        debug!(
            "cascade: {} candles, {} strokes, {} segments, {} segment segments, {} zones, {} segment zones, {} signals, {} segment signals",
            self.candles.len(),
            self.strokes.len(),
            self.segments.len(),
            self.segment_segments.len(),
            self.zones.len(),
            self.segment_zones.len(),
            self.signals.len(),
            self.segment_signals.len()
        );
        Ok(())
    }

    pub fn candles(&self) -> &[MergedCandle] {
        &self.candles
    }

    pub fn strokes(&self) -> &[Stroke] {
        self.strokes.strokes()
    }

    pub fn segments(&self) -> &[StrokeSegment] {
        &self.segments
    }

    pub fn segment_segments(&self) -> &[SegmentSegment] {
        &self.segment_segments
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn segment_zones(&self) -> &[Zone] {
        &self.segment_zones
    }

    pub fn signals(&self) -> &SignalList {
        &self.signals
    }

    pub fn segment_signals(&self) -> &SignalList {
        &self.segment_signals
    }

    pub fn signal_history(&self) -> &[SignalRecord] {
        &self.signal_history
    }

    pub fn segment_signal_history(&self) -> &[SignalRecord] {
        &self.segment_signal_history
    }

    /// Every ingested bar in order.
    pub fn bars(&self) -> impl Iterator<Item = &RawBar> {
        self.candles.iter().flat_map(|c| c.bars.iter())
    }

    pub fn reports(&self) -> Reports {
        Reports::build(self)
    }

    /// Independent copy of the whole structure. Candle links and bar
    /// back-references are rebuilt through a clone map; every index held by a
    /// derived list is checked against the copied lists.
    pub fn deep_clone(&self) -> Result<Self, ChanError> {
        let candles = snapshot::clone_candle_chain(&self.candles)?;
        let strokes = snapshot::clone_strokes(self.strokes.strokes(), candles.len())?;
        let strokes = StrokeList::from_parts(
            self.strokes.config().clone(),
            strokes,
            self.strokes.last_end(),
            self.strokes.free_candles().to_vec(),
        );
        let segments = snapshot::clone_segments(&self.segments, strokes.len())?;
        let segment_segments = snapshot::clone_segments(&self.segment_segments, segments.len())?;
        let zones = snapshot::clone_zones(&self.zones, strokes.len())?;
        let segment_zones = snapshot::clone_zones(&self.segment_zones, segments.len())?;
        let signals = snapshot::clone_signals(&self.signals, strokes.len())?;
        let segment_signals = snapshot::clone_signals(&self.segment_signals, segments.len())?;
        Ok(Self {
            config: self.config.clone(),
            rule: self.rule,
            macd: self.macd.clone(),
            last_bar: self.last_bar,
            candles,
            strokes,
            segment_builder: self.segment_builder.clone(),
            segment_segment_builder: self.segment_segment_builder.clone(),
            segments,
            segment_segments,
            zone_builder: self.zone_builder.clone(),
            segment_zone_builder: self.segment_zone_builder.clone(),
            zones,
            segment_zones,
            signal_builder: self.signal_builder.clone(),
            segment_signal_builder: self.segment_signal_builder.clone(),
            signals,
            segment_signals,
            signal_history: self.signal_history.clone(),
            segment_signal_history: self.segment_signal_history.clone(),
        })
    }
}
