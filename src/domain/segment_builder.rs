//! Segment construction over a component list.
//!
//! A refresh keeps every segment up to the last sure one and rebuilds only what
//! follows it. The rebuilt tail is then reconciled with the old tail: segments
//! of unchanged shape keep their objects (zones, confirmation flags, owner
//! indices), the rest are replaced.
//!
//! A segment is sure only when every component its decision read is sure and
//! lies strictly before the last confirmed component. Those components can no
//! longer move, so resuming after a sure segment yields what a build from the
//! first component would.

use crate::domain::candle::Direction;
use crate::domain::collaborator::SegmentRefresh;
use crate::domain::component::Component;
use crate::domain::config::{LeftMethod, SegAlgo, SegmentConfig};
use crate::domain::eigen::EigenFx;
use crate::domain::error::ChanError;
use crate::domain::segment::Segment;
use log::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentBuilder {
    algo: SegAlgo,
    config: SegmentConfig,
}

impl SegmentBuilder {
    pub fn new(algo: SegAlgo, config: SegmentConfig) -> Self {
        Self { algo, config }
    }

    pub fn algo(&self) -> SegAlgo {
        self.algo
    }

    /// Candidate segments for `components`, built from scratch.
    pub fn build<C: Component>(&self, components: &[C]) -> Result<Vec<Segment<C>>, ChanError> {
        self.build_after(components, &[])
    }

    /// Segments following `settled`, which must be a prefix this builder
    /// produced earlier for the same leading components.
    pub fn build_after<C: Component>(
        &self,
        components: &[C],
        settled: &[Segment<C>],
    ) -> Result<Vec<Segment<C>>, ChanError> {
        let mut draft = Draft::new(components, self.config.left_method, settled.last());
        draft.offset = settled.len();
        match self.algo {
            SegAlgo::Chan => draft.chan_segments()?,
            SegAlgo::Break | SegAlgo::OnePlusOne => draft.extreme_segments(self.algo)?,
        }
        draft.collect_left()?;
        Ok(draft.finish())
    }
}

impl<C: Component> SegmentRefresh<C> for SegmentBuilder {
    fn refresh(&mut self, components: &[C], segments: &mut Vec<Segment<C>>) -> Result<(), ChanError> {
        let settled = segments.iter().rposition(|s| s.is_sure).map_or(0, |i| i + 1);
        let fresh = self.build_after(components, &segments[..settled])?;
        let unchanged = segments[settled..]
            .iter()
            .zip(fresh.iter())
            .take_while(|(old, new)| old.same_shape(new))
            .count();
        let keep = settled + unchanged;
        segments.truncate(keep);
        segments.extend(fresh.into_iter().skip(unchanged));
        let len = segments.len();
        for (i, segment) in segments.iter_mut().enumerate().skip(keep.saturating_sub(1)) {
            segment.next = (i + 1 < len).then_some(i + 1);
        }
        Ok(())
    }
}

/// Working list for one build pass.
struct Draft<'a, C> {
    components: &'a [C],
    left_method: LeftMethod,
    /// Index of the last confirmed component; only components before it may
    /// back a sure segment.
    bound: usize,
    /// End and direction of the last settled segment this pass resumes after.
    anchor: Option<(usize, Direction)>,
    /// Number of settled segments ahead of `segments`.
    offset: usize,
    segments: Vec<Segment<C>>,
}

impl<'a, C: Component> Draft<'a, C> {
    fn new(components: &'a [C], left_method: LeftMethod, anchor: Option<&Segment<C>>) -> Self {
        let bound = components
            .iter()
            .rposition(|c| c.is_confirmed())
            .unwrap_or(0);
        Self {
            components,
            left_method,
            bound,
            anchor: anchor.map(|s| (s.end, s.direction)),
            offset: 0,
            segments: Vec::new(),
        }
    }

    fn last_end(&self) -> Option<usize> {
        self.segments
            .last()
            .map(|s| s.end)
            .or(self.anchor.map(|(end, _)| end))
    }

    fn last_direction(&self) -> Option<Direction> {
        self.segments
            .last()
            .map(|s| s.direction)
            .or(self.anchor.map(|(_, direction)| direction))
    }

    fn is_first(&self) -> bool {
        self.anchor.is_none() && self.segments.is_empty()
    }

    fn finish(self) -> Vec<Segment<C>> {
        self.segments
    }

    fn component(&self, index: usize) -> Result<&'a C, ChanError> {
        self.components
            .get(index)
            .ok_or_else(|| ChanError::structure(format!("component {index} is out of range")))
    }

    fn next_start(&self) -> usize {
        self.last_end().map_or(0, |end| end + 1)
    }

    /// Add a segment ending at `end`. Returns false when the first segment
    /// would be sure with inconsistent ends.
    fn add_segment(
        &mut self,
        end: usize,
        is_sure: bool,
        direction: Option<Direction>,
        split_first: bool,
        reason: &'static str,
    ) -> Result<bool, ChanError> {
        if self.is_first() && split_first && end >= 3 {
            let is_high = self.component(end)?.is_down();
            if let Some(peak) = self.find_peak((0..=end - 3).rev(), is_high) {
                let first = self.component(0)?;
                let candidate = self.component(peak)?;
                let split = peak == 0
                    || if candidate.is_down() {
                        candidate.low() < first.low()
                    } else {
                        candidate.high() > first.high()
                    };
                if split {
                    self.add_segment(
                        peak,
                        false,
                        Some(candidate.direction()),
                        true,
                        "split_first_1st",
                    )?;
                    self.add_segment(end, false, None, true, "split_first_2nd")?;
                    return Ok(true);
                }
            }
        }
        let mut segment = Segment::new(
            self.offset + self.segments.len(),
            self.components,
            self.next_start(),
            end,
            is_sure,
            direction,
            reason,
        )?;
        if !segment.ends_consistent() {
            if self.is_first() {
                return Ok(false);
            }
            warn!(
                "{} segment {} ({}..={}) ends beyond its start; kept as unsure",
                segment.direction, segment.index, segment.start, segment.end
            );
            segment.is_sure = false;
        }
        self.segments.push(segment);
        Ok(true)
    }

    /// Latest component holding the running extreme in the scan order,
    /// skipping any overshadowed by the same-direction component two back.
    fn find_peak(&self, indices: impl Iterator<Item = usize>, is_high: bool) -> Option<usize> {
        let mut peak_value = if is_high {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
        let mut peak = None;
        for index in indices {
            let Some(component) = self.components.get(index) else {
                continue;
            };
            let end = component.end_value();
            let candidate = if is_high {
                component.is_up() && end >= peak_value
            } else {
                component.is_down() && end <= peak_value
            };
            if !candidate {
                continue;
            }
            if let Some(before) = index.checked_sub(2).and_then(|i| self.components.get(i)) {
                let shadowed = if is_high {
                    before.end_value() > end
                } else {
                    before.end_value() < end
                };
                if shadowed {
                    continue;
                }
            }
            peak_value = end;
            peak = Some(index);
        }
        peak
    }

    fn chan_segments(&mut self) -> Result<(), ChanError> {
        let mut begin = Some(self.next_start());
        while let Some(start) = begin {
            begin = self.chan_pass(start)?;
        }
        Ok(())
    }

    /// Scan from `begin` until a characteristic fractal appears; returns
    /// where the next scan starts, if any.
    fn chan_pass(&mut self, begin: usize) -> Result<Option<usize>, ChanError> {
        let mut up = EigenFx::new(Direction::Up, true);
        let mut down = EigenFx::new(Direction::Down, true);
        let mut last_direction = self.last_direction();
        for index in begin..self.components.len() {
            let direction = self.component(index)?.direction();
            let mut found = None;
            if direction == Direction::Down && last_direction != Some(Direction::Up) {
                if up.add(self.components, index)? {
                    found = Some(Direction::Up);
                }
            } else if direction == Direction::Up
                && last_direction != Some(Direction::Down)
                && down.add(self.components, index)?
            {
                found = Some(Direction::Down);
            }
            if self.is_first() {
                // The first segment takes the direction whose sequence reaches
                // a second element first.
                if up.has_second() && direction == Direction::Down {
                    last_direction = Some(Direction::Down);
                    down.clear();
                } else if down.has_second() && direction == Direction::Up {
                    up.clear();
                    last_direction = Some(Direction::Up);
                }
                if !up.has_second()
                    && last_direction == Some(Direction::Down)
                    && direction == Direction::Down
                {
                    last_direction = None;
                } else if !down.has_second()
                    && last_direction == Some(Direction::Up)
                    && direction == Direction::Up
                {
                    last_direction = None;
                }
            }
            match found {
                Some(Direction::Up) => return self.treat_fractal(&mut up),
                Some(Direction::Down) => return self.treat_fractal(&mut down),
                None => {}
            }
        }
        Ok(None)
    }

    fn treat_fractal(&mut self, fx: &mut EigenFx) -> Result<Option<usize>, ChanError> {
        let test = fx.can_be_end(self.components, self.bound)?;
        let end = fx.peak_component()?;
        match test {
            Some(false) => Ok(fx.restart_index()),
            decided => {
                let is_end = decided.is_some();
                let sure = is_end && fx.all_items_sure() && fx.max_consulted < self.bound;
                if !self.add_segment(end, sure, None, true, "normal")? {
                    return Ok(Some(end + 1));
                }
                Ok(is_end.then_some(end + 1))
            }
        }
    }

    /// Deprecated variants: a segment ends at its extreme component once a
    /// later opposite component breaks that component's start (`Break`), or
    /// once the next same-direction component fails to exceed it (`OnePlusOne`).
    fn extreme_segments(&mut self, algo: SegAlgo) -> Result<(), ChanError> {
        let mut begin = self.next_start();
        'segments: while begin < self.components.len() {
            let direction = match self.last_direction() {
                Some(last) => last.opposite(),
                None => self.component(begin)?.direction(),
            };
            let is_up = direction == Direction::Up;
            let mut peak: Option<usize> = None;
            let mut all_sure = true;
            for index in begin..self.components.len() {
                let component = self.component(index)?;
                all_sure &= component.is_sure();
                let ended_at = if component.direction() == direction {
                    let exceeds = peak.is_none_or(|p| {
                        let current = &self.components[p];
                        if is_up {
                            component.high() >= current.high()
                        } else {
                            component.low() <= current.low()
                        }
                    });
                    if exceeds {
                        peak = Some(index);
                        None
                    } else if algo == SegAlgo::OnePlusOne {
                        peak.filter(|p| p + 2 == index)
                    } else {
                        None
                    }
                } else if algo == SegAlgo::Break {
                    peak.filter(|p| {
                        let begin_value = self.components[*p].begin_value();
                        if is_up {
                            component.low() < begin_value
                        } else {
                            component.high() > begin_value
                        }
                    })
                } else {
                    None
                };
                if let Some(end) = ended_at.filter(|end| end - begin >= 2) {
                    let sure = all_sure && index < self.bound;
                    if !self.add_segment(end, sure, Some(direction), false, "normal")? {
                        break 'segments;
                    }
                    begin = end + 1;
                    continue 'segments;
                }
            }
            break;
        }
        Ok(())
    }

    fn collect_left(&mut self) -> Result<(), ChanError> {
        if self.is_first() {
            self.collect_first()
        } else {
            self.collect_after_last()
        }
    }

    fn collect_first(&mut self) -> Result<(), ChanError> {
        let len = self.components.len();
        if len < 3 {
            return Ok(());
        }
        let first_begin = self.component(0)?.begin_value();
        match self.left_method {
            LeftMethod::Peak => {
                let high = self
                    .components
                    .iter()
                    .map(|c| c.high())
                    .fold(f64::NEG_INFINITY, f64::max);
                let low = self
                    .components
                    .iter()
                    .map(|c| c.low())
                    .fold(f64::INFINITY, f64::min);
                let towards_high = (high - first_begin).abs() >= (low - first_begin).abs();
                let (direction, reason) = if towards_high {
                    (Direction::Up, "0seg_find_high")
                } else {
                    (Direction::Down, "0seg_find_low")
                };
                if let Some(peak) = self.find_peak(0..len, towards_high) {
                    self.add_segment(peak, false, Some(direction), false, reason)?;
                }
                self.collect_left_as_segment()
            }
            LeftMethod::All => {
                let direction = if self.component(len - 1)?.end_value() >= first_begin {
                    Direction::Up
                } else {
                    Direction::Down
                };
                self.add_segment(len - 1, false, Some(direction), false, "0seg_collect_all")?;
                Ok(())
            }
        }
    }

    fn collect_after_last(&mut self) -> Result<(), ChanError> {
        let Some(last_end) = self.last_end() else {
            return Ok(());
        };
        let last_index = self.components.len().saturating_sub(1);
        if last_index < last_end + 3 {
            return Ok(());
        }
        let end_component = self.component(last_end)?;
        let last = self.component(last_index)?;
        if end_component.is_down() && last.end_value() <= end_component.end_value() {
            if let Some(peak) = self.find_peak(last_end + 3..self.components.len(), true) {
                self.add_segment(
                    peak,
                    false,
                    Some(Direction::Up),
                    true,
                    "collectleft_find_high_force",
                )?;
                return self.collect_left();
            }
            Ok(())
        } else if end_component.is_up() && last.end_value() >= end_component.end_value() {
            if let Some(peak) = self.find_peak(last_end + 3..self.components.len(), false) {
                self.add_segment(
                    peak,
                    false,
                    Some(Direction::Down),
                    true,
                    "collectleft_find_low_force",
                )?;
                return self.collect_left();
            }
            Ok(())
        } else {
            match self.left_method {
                LeftMethod::All => self.collect_left_as_segment(),
                LeftMethod::Peak => self.collect_left_by_peak(last_end),
            }
        }
    }

    fn collect_left_by_peak(&mut self, last_end: usize) -> Result<(), ChanError> {
        let end_is_down = self.component(last_end)?.is_down();
        let (direction, reason) = if end_is_down {
            (Direction::Up, "collectleft_find_high")
        } else {
            (Direction::Down, "collectleft_find_low")
        };
        if let Some(peak) = self.find_peak(last_end + 3..self.components.len(), end_is_down) {
            if peak - last_end >= 3 {
                self.add_segment(peak, false, Some(direction), true, reason)?;
            }
        }
        self.collect_left_as_segment()
    }

    /// Whatever follows the last segment becomes one tentative segment.
    fn collect_left_as_segment(&mut self) -> Result<(), ChanError> {
        let Some(last_end) = self.last_end() else {
            return Ok(());
        };
        let len = self.components.len();
        if last_end + 1 >= len {
            return Ok(());
        }
        let same_direction =
            self.component(last_end)?.direction() == self.component(len - 1)?.direction();
        if same_direction {
            self.add_segment(len - 2, false, None, true, "collect_left_1")?;
        } else {
            self.add_segment(len - 1, false, None, true, "collect_left_0")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::segment::test_support::{Leg, legs};

    fn build(algo: SegAlgo, comps: &[Leg]) -> Vec<Segment<Leg>> {
        SegmentBuilder::new(algo, SegmentConfig::default())
            .build(comps)
            .unwrap()
    }

    // Rises to 30 at leg 4, falls to 5 at leg 10, then rebounds.
    fn zigzag() -> Vec<Leg> {
        legs(&[
            10.0, 20.0, 15.0, 25.0, 18.0, 30.0, 22.0, 26.0, 16.0, 21.0, 12.0, 17.0, 5.0, 9.0,
            7.0, 11.0, 8.0, 14.0, 10.0, 20.0, 15.0,
        ])
    }

    #[test]
    fn too_few_components_yield_nothing() {
        assert!(build(SegAlgo::Chan, &legs(&[10.0, 20.0, 15.0])).is_empty());
    }

    #[test]
    fn first_segment_ends_at_peak() {
        let segments = build(SegAlgo::Chan, &zigzag());
        assert!(segments.len() >= 2);
        let first = &segments[0];
        assert_eq!(first.start, 0);
        assert_eq!(first.end, 4);
        assert_eq!(first.direction, Direction::Up);
        assert!(first.is_sure);
        assert_eq!(segments[1].start, 5);
        assert_eq!(segments[1].direction, Direction::Down);
    }

    #[test]
    fn segments_partition_components() {
        let comps = zigzag();
        let segments = build(SegAlgo::Chan, &comps);
        for pair in segments.windows(2) {
            assert_eq!(pair[0].end + 1, pair[1].start);
        }
        assert_eq!(segments[0].start, 0);
        for (i, s) in segments.iter().enumerate() {
            assert_eq!(s.index, i);
        }
    }

    #[test]
    fn unsure_tail_blocks_sureness() {
        let mut comps = zigzag();
        for c in comps.iter_mut().skip(6) {
            c.sure = false;
        }
        let segments = build(SegAlgo::Chan, &comps);
        assert!(segments.iter().all(|s| !s.is_sure));
    }

    #[test]
    fn break_variant_ends_on_broken_start() {
        let segments = build(SegAlgo::Break, &zigzag());
        assert_eq!(segments[0].end, 4);
        assert_eq!(segments[0].direction, Direction::Up);
        assert!(segments[0].is_sure);
    }

    #[test]
    fn one_plus_one_variant_ends_on_failed_retest() {
        let segments = build(SegAlgo::OnePlusOne, &zigzag());
        assert_eq!(segments[0].end, 4);
        assert!(segments[0].is_sure);
    }

    #[test]
    fn refresh_keeps_unchanged_prefix() {
        let comps = zigzag();
        let mut builder = SegmentBuilder::new(SegAlgo::Chan, SegmentConfig::default());
        let mut segments = Vec::new();
        builder.refresh(&comps, &mut segments).unwrap();
        segments[0].elements_confirmed = true;
        builder.refresh(&comps, &mut segments).unwrap();
        assert!(segments[0].elements_confirmed);
        assert_eq!(segments.last().unwrap().next, None);
        assert_eq!(segments[0].next, Some(1));
    }

    #[test]
    fn resumed_refresh_matches_full_build() {
        let full = zigzag();
        let mut builder = SegmentBuilder::new(SegAlgo::Chan, SegmentConfig::default());
        let mut segments = Vec::new();
        for len in 3..=full.len() {
            builder.refresh(&full[..len], &mut segments).unwrap();
        }
        let scratch = builder.build(&full).unwrap();
        assert_eq!(segments.len(), scratch.len());
        for (kept, fresh) in segments.iter().zip(&scratch) {
            assert!(kept.same_shape(fresh), "{kept:?} != {fresh:?}");
        }
        assert_eq!(segments.last().unwrap().next, None);
    }

    #[test]
    fn refresh_leaves_settled_prefix_alone() {
        let mut comps = zigzag();
        let mut builder = SegmentBuilder::new(SegAlgo::Chan, SegmentConfig::default());
        let mut segments = Vec::new();
        builder.refresh(&comps, &mut segments).unwrap();
        assert!(segments[0].is_sure);
        let first = segments[0].clone();

        // Rewrite legs inside the settled segment; a refresh must not read them.
        comps[1].end = 40.0;
        comps[2].begin = 40.0;
        builder.refresh(&comps, &mut segments).unwrap();
        assert_eq!(segments[0], first);
        assert_eq!(segments[1].start, first.end + 1);
    }

    #[test]
    fn collect_all_spans_everything_without_a_fractal() {
        let comps = legs(&[10.0, 20.0, 15.0, 25.0, 18.0]);
        let builder = SegmentBuilder::new(
            SegAlgo::Chan,
            SegmentConfig {
                left_method: LeftMethod::All,
            },
        );
        let segments = builder.build(&comps).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!((segments[0].start, segments[0].end), (0, 3));
        assert_eq!(segments[0].reason, "0seg_collect_all");
        assert!(!segments[0].is_sure);
    }
}
