//! Buy/sell point detection over one component level.
//!
//! Recomputed from scratch on every cascade: primary points first (they feed
//! the follow-up kinds), then pull-backs, then third-type points.

use crate::domain::candle::MergedCandle;
use crate::domain::collaborator::SignalRecompute;
use crate::domain::component::{Component, has_overlap};
use crate::domain::config::{PointConfig, SignalConfig};
use crate::domain::error::ChanError;
use crate::domain::indicator::LegSpan;
use crate::domain::segment::Segment;
use crate::domain::signal::{Signal, SignalKind, SignalList};
use crate::domain::zone::Zone;
use std::collections::BTreeMap;

/// Metrics above this rate accept every exit as divergent.
const UNBOUNDED_DIVERGENCE: f64 = 100.0;
const RATE_FLOOR: f64 = 1e-7;

#[derive(Debug, Clone, PartialEq)]
pub struct SignalBuilder {
    config: SignalConfig,
}

impl SignalBuilder {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }
}

impl<C: Component> SignalRecompute<C> for SignalBuilder {
    fn recompute(
        &self,
        candles: &[MergedCandle],
        components: &[C],
        segments: &[Segment<C>],
        signals: &mut SignalList,
    ) -> Result<(), ChanError> {
        signals.clear();
        let mut pass = Pass {
            config: &self.config,
            candles,
            components,
            segments,
            signals,
        };
        for segment in segments {
            pass.primary(segment)?;
        }
        for segment in segments {
            pass.pull_back(segment)?;
        }
        for segment in segments {
            pass.third(segment)?;
        }
        signals.sort_by_bar();
        Ok(())
    }
}

struct Pass<'a, C> {
    config: &'a SignalConfig,
    candles: &'a [MergedCandle],
    components: &'a [C],
    segments: &'a [Segment<C>],
    signals: &'a mut SignalList,
}

impl<'a, C: Component> Pass<'a, C> {
    fn component(&self, index: usize) -> Result<&'a C, ChanError> {
        self.components
            .get(index)
            .ok_or_else(|| ChanError::structure(format!("component {index} is out of range")))
    }

    fn owner(&self, index: usize) -> Result<usize, ChanError> {
        self.component(index)?.segment_index().ok_or_else(|| {
            ChanError::structure(format!("component {index} has no owning segment"))
        })
    }

    fn metric(&self, index: usize, reverse: bool, conf: &PointConfig) -> Result<f64, ChanError> {
        let component = self.component(index)?;
        let candles = self
            .candles
            .get(component.begin_candle()..=component.end_candle())
            .ok_or_else(|| {
                ChanError::structure(format!(
                    "component {index} spans missing candles {}..={}",
                    component.begin_candle(),
                    component.end_candle()
                ))
            })?;
        let span = LegSpan {
            bars: candles.iter().flat_map(|c| c.bars.iter()).collect(),
            direction: component.direction(),
            begin: component.begin_mark().index,
            end: component.end_mark().index,
        };
        Ok(span.metric(conf.macd_algo, reverse))
    }

    fn add(
        &mut self,
        kind: SignalKind,
        index: usize,
        related_primary: Option<usize>,
        is_target: bool,
        features: BTreeMap<String, f64>,
    ) -> Result<(), ChanError> {
        let component = self.component(index)?;
        let is_buy = component.is_down();
        if let Some(position) = self.signals.position_of_component(index) {
            let existing = &mut self.signals.signals[position];
            if existing.is_buy != is_buy {
                return Err(ChanError::structure(format!(
                    "signal at component {index} is both buy and sell"
                )));
            }
            if !existing.kinds.contains(&kind) {
                existing.kinds.push(kind);
            }
            if existing.related_primary.is_none() {
                existing.related_primary = related_primary;
            }
            existing.features.extend(features);
            return Ok(());
        }
        let is_target = is_target && self.config.side(is_buy).targets(kind);
        if !is_target && !kind.is_primary() {
            return Ok(());
        }
        let signal = Signal {
            kinds: vec![kind],
            is_buy,
            mark: component.end_mark(),
            candle: component.end_candle(),
            component: index,
            component_begin: component.begin_mark(),
            component_end: component.end_mark(),
            related_primary,
            features,
        };
        if kind.is_primary() {
            self.signals.primaries.push(signal.clone());
        }
        if is_target {
            self.signals.signals.push(signal);
        }
        Ok(())
    }

    fn is_target_at(&self, index: usize) -> bool {
        self.signals.position_of_component(index).is_some()
    }

    fn primary(&mut self, segment: &Segment<C>) -> Result<(), ChanError> {
        let config = self.config;
        let conf = config.side(segment.is_down());
        let zone_count = if conf.only_multi_stroke_zone {
            segment.multi_component_zones().count()
        } else {
            segment.zones.len()
        };
        let is_target = conf.min_zone_count == 0 || zone_count >= conf.min_zone_count;
        match segment.zones.last() {
            Some(zone) if leaves_zone(zone, segment.end) => {
                self.zone_primary(segment, zone, conf, is_target)
            }
            _ => self.peak_primary(segment, conf, is_target),
        }
    }

    /// End of a segment leaving its last zone.
    fn zone_primary(
        &mut self,
        segment: &Segment<C>,
        zone: &Zone,
        conf: &PointConfig,
        mut is_target: bool,
    ) -> Result<(), ChanError> {
        if conf.bs1_peak && !self.exit_is_peak(zone, segment.end)? {
            is_target = false;
        }
        let end = self.component(segment.end)?;
        let breaks_zone = (end.is_down() && end.low() < zone.low)
            || (end.is_up() && end.high() > zone.high);
        let mut features = BTreeMap::new();
        if breaks_zone {
            let entering = zone.entering.ok_or_else(|| {
                ChanError::structure(format!(
                    "zone {}..{} has no entering component",
                    zone.begin, zone.end
                ))
            })?;
            let in_metric = self.metric(entering, false, conf)?;
            let out_metric = self.metric(segment.end, true, conf)?;
            let divergent = conf.divergence_rate > UNBOUNDED_DIVERGENCE
                || out_metric <= conf.divergence_rate * in_metric;
            if !divergent {
                is_target = false;
            }
            features.insert("divergence_rate".to_string(), out_metric / in_metric);
        } else {
            is_target = false;
        }
        features.insert("zone_height".to_string(), (zone.high - zone.low) / zone.low);
        features.insert("leg_amp".to_string(), end.amplitude());
        self.add(SignalKind::Bs1, segment.end, None, is_target, features)
    }

    /// Whether the zone's exiting component beats every member up to `end`.
    fn exit_is_peak(&self, zone: &Zone, end: usize) -> Result<bool, ChanError> {
        let Some(exiting) = zone.exiting else {
            return Ok(false);
        };
        let out = self.component(exiting)?;
        for index in zone.begin..=zone.end {
            if index > end {
                break;
            }
            let member = self.component(index)?;
            if (out.is_down() && member.low() < out.low()) || (out.is_up() && member.high() > out.high()) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// End of a segment making a new extreme over the same-direction
    /// component two back, without a usable zone.
    fn peak_primary(
        &mut self,
        segment: &Segment<C>,
        conf: &PointConfig,
        mut is_target: bool,
    ) -> Result<(), ChanError> {
        let Some(previous) = segment.end.checked_sub(2) else {
            return Ok(());
        };
        let last = self.component(segment.end)?;
        let pre = self.component(previous)?;
        if last.segment_index() != pre.segment_index() || last.direction() != segment.direction {
            return Ok(());
        }
        if (last.is_down() && last.low() > pre.low()) || (last.is_up() && last.high() < pre.high()) {
            return Ok(());
        }
        let in_metric = self.metric(previous, false, conf)?;
        let out_metric = self.metric(segment.end, true, conf)?;
        let divergent = out_metric <= conf.divergence_rate * in_metric;
        if !divergent {
            is_target = false;
        }
        let mut features = BTreeMap::new();
        features.insert("leg_amp".to_string(), last.amplitude());
        features.insert("divergence_rate".to_string(), out_metric / (in_metric + RATE_FLOOR));
        self.add(SignalKind::Bs1Peak, segment.end, None, is_target, features)
    }

    fn pull_back(&mut self, segment: &Segment<C>) -> Result<(), ChanError> {
        let config = self.config;
        let side = config.side(segment.is_down());
        if !side.targets(SignalKind::Bs2) && !side.targets(SignalKind::Bs2Strict) {
            return Ok(());
        }
        let (conf, primary, breaking, retrace) = if self.segments.len() > 1 {
            if segment.end + 2 >= self.components.len() {
                return Ok(());
            }
            (side, Some(segment.end), segment.end + 1, segment.end + 2)
        } else {
            if self.components.len() < 2 {
                return Ok(());
            }
            (config.side(segment.is_up()), None, 0, 1)
        };
        if conf.bs2_follow_1 && primary.is_none_or(|p| !self.is_target_at(p)) {
            return Ok(());
        }
        let related = primary.and_then(|p| self.signals.primary_for_component(p));
        let break_amp = self.component(breaking)?.amplitude();
        let retrace_amp = self.component(retrace)?.amplitude();
        let rate = if break_amp > 0.0 {
            retrace_amp / break_amp
        } else {
            f64::INFINITY
        };
        if rate <= conf.max_bs2_rate {
            let mut features = BTreeMap::new();
            features.insert("retrace_rate".to_string(), rate);
            features.insert("break_amp".to_string(), break_amp);
            features.insert("leg_amp".to_string(), retrace_amp);
            self.add(SignalKind::Bs2, retrace, related, true, features)?;
        } else if conf.bs2s_follow_2 {
            return Ok(());
        }
        if !side.targets(SignalKind::Bs2Strict) {
            return Ok(());
        }
        self.strict_pull_backs(retrace, breaking, related, conf)
    }

    /// Later pull-backs that keep overlapping the first one without breaking
    /// the leg that broke out.
    fn strict_pull_backs(
        &mut self,
        retrace: usize,
        breaking: usize,
        related: Option<usize>,
        conf: &PointConfig,
    ) -> Result<(), ChanError> {
        let retrace_owner = self.owner(retrace)?;
        let breaker = self.component(breaking)?;
        let (break_low, break_high, break_end, break_amp) = (
            breaker.low(),
            breaker.high(),
            breaker.end_value(),
            breaker.amplitude(),
        );
        let first = self.component(retrace)?;
        let mut range = (first.low(), first.high());
        let mut bias = 2;
        while retrace + bias < self.components.len() {
            if conf.max_bs2s_level.is_some_and(|max| bias / 2 > max) {
                break;
            }
            let index = retrace + bias;
            let owner = self.owner(index)?;
            if owner != retrace_owner
                && (owner + 1 < self.segments.len()
                    || owner.saturating_sub(retrace_owner) >= 2
                    || self.segments.get(retrace_owner).is_some_and(|s| s.is_sure))
            {
                break;
            }
            let candidate = self.component(index)?;
            if !has_overlap(range.0, range.1, candidate.low(), candidate.high(), false) {
                break;
            }
            if bias == 2 {
                range = (range.0.max(candidate.low()), range.1.min(candidate.high()));
            }
            if (candidate.is_down() && candidate.low() < break_low)
                || (candidate.is_up() && candidate.high() > break_high)
            {
                break;
            }
            let rate = if break_amp > 0.0 {
                (candidate.end_value() - break_end).abs() / break_amp
            } else {
                f64::INFINITY
            };
            if rate > conf.max_bs2_rate {
                break;
            }
            let mut features = BTreeMap::new();
            features.insert("retrace_rate".to_string(), rate);
            features.insert("leg_amp".to_string(), candidate.amplitude());
            self.add(SignalKind::Bs2Strict, index, related, true, features)?;
            bias += 2;
        }
        Ok(())
    }

    fn third(&mut self, segment: &Segment<C>) -> Result<(), ChanError> {
        let config = self.config;
        let segments = self.segments;
        let side = config.side(segment.is_down());
        if !side.targets(SignalKind::Bs3After) && !side.targets(SignalKind::Bs3Before) {
            return Ok(());
        }
        let (conf, primary, next, next_index) = if segments.len() > 1 {
            (
                side,
                Some(segment.end),
                segments.get(segment.index + 1),
                segment.index + 1,
            )
        } else {
            (config.side(segment.is_up()), None, Some(segment), segment.index)
        };
        if conf.bs3_follow_1 && primary.is_none_or(|p| !self.is_target_at(p)) {
            return Ok(());
        }
        let related = primary.and_then(|p| self.signals.primary_for_component(p));
        if let Some(next) = next {
            self.third_after(next, next_index, primary, related, conf)?;
        }
        self.third_before(segment, next, next_index, primary, related, conf)
    }

    /// First pull-back after the next segment's first zone.
    fn third_after(
        &mut self,
        next: &Segment<C>,
        next_index: usize,
        primary: Option<usize>,
        related: Option<usize>,
        conf: &PointConfig,
    ) -> Result<(), ChanError> {
        let Some(zone) = next.multi_component_zones().next() else {
            return Ok(());
        };
        if conf.strict_bs3 && zone.entering != Some(primary.map_or(0, |p| p + 1)) {
            return Ok(());
        }
        let Some(exiting) = zone.exiting else {
            return Ok(());
        };
        let index = exiting + 1;
        if index >= self.components.len() {
            return Ok(());
        }
        match self.segments.iter().find(|s| s.contains(index)) {
            None if next.index + 1 != self.segments.len() => return Ok(()),
            Some(parent) if parent.index != next.index && parent.component_count() >= 3 => {
                return Ok(());
            }
            _ => {}
        }
        let candidate = self.component(index)?;
        if candidate.direction() == next.direction {
            return Ok(());
        }
        if candidate.segment_index() != Some(next_index) && next_index + 2 < self.segments.len() {
            return Ok(());
        }
        if returns_into(candidate, zone) {
            return Ok(());
        }
        let breaks_peak = (candidate.is_down() && candidate.high() >= zone.peak_high)
            || (candidate.is_up() && candidate.low() <= zone.peak_low);
        if conf.bs3_peak && !breaks_peak {
            return Ok(());
        }
        let mut features = BTreeMap::new();
        features.insert("zone_height".to_string(), (zone.high - zone.low) / zone.low);
        features.insert("leg_amp".to_string(), candidate.amplitude());
        self.add(SignalKind::Bs3After, index, related, true, features)
    }

    /// First pull-back after the primary point that stays out of the
    /// segment's final zone.
    fn third_before(
        &mut self,
        segment: &Segment<C>,
        next: Option<&Segment<C>>,
        next_index: usize,
        primary: Option<usize>,
        related: Option<usize>,
        conf: &PointConfig,
    ) -> Result<(), ChanError> {
        let Some(zone) = segment.multi_component_zones().next_back() else {
            return Ok(());
        };
        let Some(primary) = primary else {
            return Ok(());
        };
        if conf.strict_bs3 && zone.exiting != Some(primary) {
            return Ok(());
        }
        let limit = search_limit(next);
        for index in (primary + 2..self.components.len()).step_by(2) {
            if limit.is_some_and(|l| index > l) {
                break;
            }
            let owner = self.owner(index)?;
            if owner != next_index && owner + 1 < self.segments.len() {
                break;
            }
            let candidate = self.component(index)?;
            if returns_into(candidate, zone) {
                continue;
            }
            let mut features = BTreeMap::new();
            features.insert("zone_height".to_string(), (zone.high - zone.low) / zone.low);
            features.insert("leg_amp".to_string(), candidate.amplitude());
            return self.add(SignalKind::Bs3Before, index, related, true, features);
        }
        Ok(())
    }
}

/// A multi-component zone that the segment's end component leaves, entered
/// at least three components earlier.
fn leaves_zone(zone: &Zone, end: usize) -> bool {
    !zone.is_one_component()
        && (zone.exiting.is_some_and(|out| out >= end) || zone.end >= end)
        && zone.entering.is_some_and(|entering| end > entering + 2)
}

fn returns_into<C: Component>(component: &C, zone: &Zone) -> bool {
    (component.is_down() && component.low() < zone.high)
        || (component.is_up() && component.high() > zone.low)
}

/// Last component index a third-type search may reach inside `next`.
fn search_limit<C: Component>(next: Option<&Segment<C>>) -> Option<usize> {
    let next = next?;
    if next.multi_component_zones().next().is_none() && next.next.is_none() {
        return None;
    }
    let exit = next.multi_component_zones().find_map(|z| z.exiting);
    Some(exit.unwrap_or(next.end.saturating_sub(1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::RawBar;
    use crate::domain::candle::Direction;
    use crate::domain::segment::test_support::{Leg, legs};
    use chrono::NaiveDate;

    fn candles(count: usize) -> Vec<MergedCandle> {
        (0..count)
            .map(|i| {
                let time = NaiveDate::from_ymd_opt(2024, 1, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap()
                    + chrono::Duration::hours(i as i64);
                let bar = RawBar::new(i, time, 10.0, 11.0, 9.0, 10.0, 100.0);
                MergedCandle::new(i, bar, Direction::Up, i.checked_sub(1))
            })
            .collect()
    }

    /// Down segment 0..=4 with a zone on legs 1..=3, then an up segment.
    fn fixture(points: &[f64], second_end: usize) -> (Vec<Leg>, Vec<Segment<Leg>>) {
        let mut comps = legs(points);
        let mut segments = vec![
            Segment::new(0, &comps, 0, 4, true, Some(Direction::Down), "normal").unwrap(),
            Segment::new(1, &comps, 5, second_end, false, Some(Direction::Up), "normal").unwrap(),
        ];
        segments[0].next = Some(1);
        for c in comps.iter_mut() {
            let owner = if c.index <= 4 { 0 } else { 1 };
            c.set_segment_index(owner);
        }
        let mut zone = Zone::new(&[&comps[1], &comps[2], &comps[3]], true).unwrap();
        zone.relink(comps.len()).unwrap();
        segments[0].add_zone(zone);
        (comps, segments)
    }

    fn run(comps: &[Leg], segments: &[Segment<Leg>]) -> SignalList {
        let mut list = SignalList::new();
        SignalBuilder::new(SignalConfig::default())
            .recompute(&candles(comps.len() * 4 + 5), comps, segments, &mut list)
            .unwrap();
        list
    }

    #[test]
    fn primary_then_pull_backs() {
        let (comps, segments) = fixture(
            &[50.0, 40.0, 45.0, 41.0, 44.0, 30.0, 36.0, 33.0, 38.0, 35.0, 37.0],
            9,
        );
        let list = run(&comps, &segments);
        let found: Vec<(usize, Vec<SignalKind>)> = list
            .iter()
            .map(|s| (s.component, s.kinds.clone()))
            .collect();
        assert_eq!(
            found,
            vec![
                (4, vec![SignalKind::Bs1]),
                (6, vec![SignalKind::Bs2]),
                (8, vec![SignalKind::Bs2Strict]),
            ]
        );
        assert!(list.iter().all(|s| s.is_buy));
        assert_eq!(list.primaries.len(), 1);
        assert_eq!(list.signals[1].related_primary, Some(0));
        let rate = list.signals[1].features["retrace_rate"];
        assert!((rate - 0.5).abs() < 1e-12);
    }

    #[test]
    fn kinds_merge_on_one_component() {
        let (comps, segments) = fixture(&[50.0, 40.0, 45.0, 41.0, 44.0, 30.0, 46.0, 45.0, 48.0], 7);
        let list = run(&comps, &segments);
        let pull_back = list
            .iter()
            .find(|s| s.component == 6)
            .expect("pull-back signal");
        assert_eq!(pull_back.kinds, vec![SignalKind::Bs2, SignalKind::Bs3Before]);
        assert_eq!(pull_back.kinds_label(), "2,3b");

        // The up segment has no zone, so its peak point is recorded but not targeted.
        assert_eq!(list.primaries.len(), 2);
        assert!(list.primaries[1].has_kind(SignalKind::Bs1Peak));
        assert!(!list.primaries[1].is_buy);
        assert!(list.position_of_component(7).is_none());
    }

    #[test]
    fn no_segments_no_signals() {
        let comps = legs(&[10.0, 20.0, 15.0]);
        let list = run(&comps, &[]);
        assert!(list.is_empty());
        assert!(list.primaries.is_empty());
    }

    #[test]
    fn strict_zone_count_blocks_primary() {
        let (comps, segments) = fixture(
            &[50.0, 40.0, 45.0, 41.0, 44.0, 30.0, 36.0, 33.0, 38.0, 35.0, 37.0],
            9,
        );
        let mut config = SignalConfig::default();
        config.buy.min_zone_count = 2;
        let mut list = SignalList::new();
        SignalBuilder::new(config)
            .recompute(&candles(50), &comps, &segments, &mut list)
            .unwrap();
        assert!(list.is_empty());
        assert_eq!(list.primaries.len(), 1);
    }
}
