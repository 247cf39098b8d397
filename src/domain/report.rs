//! Flat row-sets describing every derived list, ready for tabular export.

use crate::domain::candle::MergedCandle;
use crate::domain::component::Component;
use crate::domain::segment::Segment;
use crate::domain::sequence::CandleSequence;
use crate::domain::signal::{Signal, SignalList, SignalRecord};
use crate::domain::zone::Zone;
use chrono::NaiveDateTime;
use serde::Serialize;

pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn fmt_time(time: NaiveDateTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandleRow {
    pub index: usize,
    pub begin_time: String,
    pub end_time: String,
    pub high: f64,
    pub low: f64,
    pub direction: &'static str,
    pub fractal: &'static str,
    pub bar_count: usize,
}

impl From<&MergedCandle> for CandleRow {
    fn from(candle: &MergedCandle) -> Self {
        Self {
            index: candle.index,
            begin_time: fmt_time(candle.time_begin()),
            end_time: fmt_time(candle.time_end()),
            high: candle.high,
            low: candle.low,
            direction: candle.direction.as_str(),
            fractal: candle.fractal.as_str(),
            bar_count: candle.bars.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentRow {
    pub index: usize,
    pub begin_time: String,
    pub end_time: String,
    pub begin_value: f64,
    pub end_value: f64,
    pub direction: &'static str,
    pub is_sure: bool,
    pub segment_index: Option<usize>,
    pub begin_candle: usize,
    pub end_candle: usize,
}

impl ComponentRow {
    pub fn from_component<C: Component>(component: &C) -> Self {
        Self {
            index: component.index(),
            begin_time: fmt_time(component.begin_mark().time),
            end_time: fmt_time(component.end_mark().time),
            begin_value: component.begin_value(),
            end_value: component.end_value(),
            direction: component.direction().as_str(),
            is_sure: component.is_sure(),
            segment_index: component.segment_index(),
            begin_candle: component.begin_candle(),
            end_candle: component.end_candle(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentRow {
    pub index: usize,
    pub begin_time: String,
    pub end_time: String,
    pub begin_value: f64,
    pub end_value: f64,
    pub direction: &'static str,
    pub is_sure: bool,
    pub segment_index: Option<usize>,
    pub reason: &'static str,
    pub start: usize,
    pub end: usize,
    pub zone_count: usize,
    pub elements_confirmed: bool,
}

impl<C: Component> From<&Segment<C>> for SegmentRow {
    fn from(segment: &Segment<C>) -> Self {
        Self {
            index: segment.index,
            begin_time: fmt_time(segment.begin_mark().time),
            end_time: fmt_time(segment.end_mark().time),
            begin_value: segment.begin_value(),
            end_value: segment.end_value(),
            direction: segment.direction.as_str(),
            is_sure: segment.is_sure,
            segment_index: segment.segment_index,
            reason: segment.reason,
            start: segment.start,
            end: segment.end,
            zone_count: segment.zones.len(),
            elements_confirmed: segment.elements_confirmed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneRow {
    pub begin: usize,
    pub end: usize,
    pub begin_time: String,
    pub end_time: String,
    pub low: f64,
    pub high: f64,
    pub peak_low: f64,
    pub peak_high: f64,
    pub is_sure: bool,
    pub member_count: usize,
    pub sub_zone_count: usize,
    pub entering: Option<usize>,
    pub entering_time: Option<String>,
    pub exiting: Option<usize>,
    pub exiting_time: Option<String>,
}

impl ZoneRow {
    pub fn new<C: Component>(zone: &Zone, components: &[C]) -> Self {
        let begin_of = |i: Option<usize>| {
            i.and_then(|i| components.get(i))
                .map(|c| fmt_time(c.begin_mark().time))
        };
        Self {
            begin: zone.begin,
            end: zone.end,
            begin_time: fmt_time(zone.begin_mark.time),
            end_time: fmt_time(zone.end_mark.time),
            low: zone.low,
            high: zone.high,
            peak_low: zone.peak_low,
            peak_high: zone.peak_high,
            is_sure: zone.is_sure,
            member_count: zone.members.len(),
            sub_zone_count: zone.sub_zone_count,
            entering: zone.entering,
            entering_time: begin_of(zone.entering),
            exiting: zone.exiting,
            exiting_time: begin_of(zone.exiting),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalRow {
    pub time: String,
    pub bar_index: usize,
    pub kinds: String,
    pub is_buy: bool,
    pub component: usize,
    pub component_begin_time: String,
    pub component_end_time: String,
    pub related_primary_time: Option<String>,
}

impl SignalRow {
    pub fn new(signal: &Signal, list: &SignalList) -> Self {
        Self {
            time: fmt_time(signal.mark.time),
            bar_index: signal.mark.index,
            kinds: signal.kinds_label(),
            is_buy: signal.is_buy,
            component: signal.component,
            component_begin_time: fmt_time(signal.component_begin.time),
            component_end_time: fmt_time(signal.component_end.time),
            related_primary_time: list.related_primary(signal).map(|p| fmt_time(p.mark.time)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRow {
    pub time: String,
    pub kinds: String,
    pub is_buy: bool,
    pub related_primary_time: Option<String>,
    pub component: usize,
    pub component_begin_time: String,
    pub component_end_time: String,
}

impl From<&SignalRecord> for HistoryRow {
    fn from(record: &SignalRecord) -> Self {
        Self {
            time: fmt_time(record.time),
            kinds: record.kinds.clone(),
            is_buy: record.is_buy,
            related_primary_time: record.related_primary_time.map(fmt_time),
            component: record.component,
            component_begin_time: fmt_time(record.component_begin_time),
            component_end_time: fmt_time(record.component_end_time),
        }
    }
}

/// Every exported row-set of one sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Reports {
    pub kline_list: Vec<CandleRow>,
    pub bi_list: Vec<ComponentRow>,
    pub seg_list: Vec<SegmentRow>,
    pub segseg_list: Vec<SegmentRow>,
    pub zs_list: Vec<ZoneRow>,
    pub segzs_list: Vec<ZoneRow>,
    pub bs_point_lst: Vec<SignalRow>,
    pub seg_bs_point_lst: Vec<SignalRow>,
    pub bs_point_history: Vec<HistoryRow>,
    pub seg_bs_point_history: Vec<HistoryRow>,
}

impl Reports {
    pub const NAMES: [&'static str; 10] = [
        "kline_list",
        "bi_list",
        "seg_list",
        "segseg_list",
        "zs_list",
        "segzs_list",
        "bs_point_lst",
        "seg_bs_point_lst",
        "bs_point_history",
        "seg_bs_point_history",
    ];

    pub fn build(sequence: &CandleSequence) -> Self {
        let signal_rows = |list: &SignalList| {
            list.iter()
                .map(|s| SignalRow::new(s, list))
                .collect::<Vec<_>>()
        };
        Self {
            kline_list: sequence.candles().iter().map(CandleRow::from).collect(),
            bi_list: sequence
                .strokes()
                .iter()
                .map(ComponentRow::from_component)
                .collect(),
            seg_list: sequence.segments().iter().map(SegmentRow::from).collect(),
            segseg_list: sequence
                .segment_segments()
                .iter()
                .map(SegmentRow::from)
                .collect(),
            zs_list: sequence
                .zones()
                .iter()
                .map(|z| ZoneRow::new(z, sequence.strokes()))
                .collect(),
            segzs_list: sequence
                .segment_zones()
                .iter()
                .map(|z| ZoneRow::new(z, sequence.segments()))
                .collect(),
            bs_point_lst: signal_rows(sequence.signals()),
            seg_bs_point_lst: signal_rows(sequence.segment_signals()),
            bs_point_history: sequence
                .signal_history()
                .iter()
                .map(HistoryRow::from)
                .collect(),
            seg_bs_point_history: sequence
                .segment_signal_history()
                .iter()
                .map(HistoryRow::from)
                .collect(),
        }
    }

    /// Row counts keyed by report name, in [`Reports::NAMES`] order.
    pub fn sizes(&self) -> [(&'static str, usize); 10] {
        let counts = [
            self.kline_list.len(),
            self.bi_list.len(),
            self.seg_list.len(),
            self.segseg_list.len(),
            self.zs_list.len(),
            self.segzs_list.len(),
            self.bs_point_lst.len(),
            self.seg_bs_point_lst.len(),
            self.bs_point_history.len(),
            self.seg_bs_point_history.len(),
        ];
        let mut sizes = [("", 0); 10];
        for (slot, (name, count)) in sizes.iter_mut().zip(Self::NAMES.iter().zip(counts)) {
            *slot = (*name, count);
        }
        sizes
    }
}
