//! Builds zones segment by segment from the components against each segment's direction.

use crate::domain::candle::Direction;
use crate::domain::collaborator::ZoneRecompute;
use crate::domain::component::Component;
use crate::domain::config::ZoneConfig;
use crate::domain::error::ChanError;
use crate::domain::segment::Segment;
use crate::domain::zone::Zone;

#[derive(Debug, Clone, PartialEq)]
pub struct ZoneBuilder {
    config: ZoneConfig,
    /// Candidate members not yet part of a zone.
    free: Vec<usize>,
    /// First bar of the newest sure segment seen by the previous pass.
    last_sure_bar: Option<usize>,
    last_segment: usize,
}

impl ZoneBuilder {
    pub fn new(config: ZoneConfig) -> Self {
        Self {
            config,
            free: Vec::new(),
            last_sure_bar: None,
            last_segment: 0,
        }
    }

    fn needs_recompute<C: Component>(&self, segment: &Segment<C>) -> bool {
        self.last_sure_bar
            .is_none_or(|bar| segment.begin_mark().index >= bar)
    }

    fn remember_last_sure<C: Component>(&mut self, segments: &[Segment<C>]) {
        match segments.iter().rev().find(|s| s.is_sure) {
            Some(seg) => {
                self.last_sure_bar = Some(seg.begin_mark().index);
                self.last_segment = seg.index;
            }
            None => {
                self.last_sure_bar = None;
                self.last_segment = 0;
            }
        }
    }

    fn add_range<C: Component>(
        &mut self,
        components: &[C],
        range: &[C],
        direction: Direction,
        is_sure: bool,
        zones: &mut Vec<Zone>,
    ) -> Result<(), ChanError> {
        let mut first = true;
        for item in range.iter().filter(|c| c.direction() != direction) {
            if first {
                self.add_free(components, item.index(), is_sure, zones)?;
                first = false;
            } else {
                self.update(components, item, is_sure, zones)?;
            }
        }
        Ok(())
    }

    fn update<C: Component>(
        &mut self,
        components: &[C],
        item: &C,
        is_sure: bool,
        zones: &mut Vec<Zone>,
    ) -> Result<(), ChanError> {
        if self.free.is_empty() {
            if let Some(last) = zones.last_mut() {
                if last.try_add_to_end(components, item) {
                    self.try_combine(components, zones);
                    return Ok(());
                }
            }
        }
        self.add_free(components, item.index(), is_sure, zones)
    }

    fn add_free<C: Component>(
        &mut self,
        components: &[C],
        index: usize,
        is_sure: bool,
        zones: &mut Vec<Zone>,
    ) -> Result<(), ChanError> {
        if self.free.last() == Some(&index) {
            self.free.pop();
        }
        self.free.push(index);
        if let Some(zone) = self.try_construct(components, is_sure)? {
            if zone.begin > 0 {
                zones.push(zone);
                self.free.clear();
                self.try_combine(components, zones);
            }
        }
        Ok(())
    }

    fn try_construct<C: Component>(
        &self,
        components: &[C],
        is_sure: bool,
    ) -> Result<Option<Zone>, ChanError> {
        let window = if self.config.one_stroke_zone {
            &self.free[..]
        } else if self.free.len() >= 2 {
            &self.free[self.free.len() - 2..]
        } else {
            return Ok(None);
        };
        let items = window
            .iter()
            .map(|i| {
                components.get(*i).ok_or_else(|| {
                    ChanError::structure(format!("zone member {i} is out of range"))
                })
            })
            .collect::<Result<Vec<&C>, ChanError>>()?;
        let min_high = items.iter().map(|c| c.high()).fold(f64::INFINITY, f64::min);
        let max_low = items.iter().map(|c| c.low()).fold(f64::NEG_INFINITY, f64::max);
        if min_high > max_low {
            Ok(Some(Zone::new(&items, is_sure)?))
        } else {
            Ok(None)
        }
    }

    fn try_combine<C: Component>(&self, components: &[C], zones: &mut Vec<Zone>) {
        if !self.config.need_combine {
            return;
        }
        while zones.len() >= 2 {
            let split = zones.len() - 1;
            let (head, tail) = zones.split_at_mut(split);
            let (Some(prev), Some(last)) = (head.last_mut(), tail.first()) else {
                break;
            };
            if prev.combine(last, self.config.combine_mode, components) {
                zones.pop();
            } else {
                break;
            }
        }
    }
}

impl<C: Component> ZoneRecompute<C> for ZoneBuilder {
    /// Zones that start before the last sure segment of the previous pass are
    /// kept; everything after is rebuilt, including a reversed-direction tail
    /// past the last segment.
    fn recompute(
        &mut self,
        components: &[C],
        segments: &[Segment<C>],
        zones: &mut Vec<Zone>,
    ) -> Result<(), ChanError> {
        if let Some(bar) = self.last_sure_bar {
            while zones.last().is_some_and(|z| z.begin_mark.index >= bar) {
                zones.pop();
            }
        } else {
            zones.clear();
        }
        for segment in segments.iter().skip(self.last_segment) {
            if !self.needs_recompute(segment) {
                continue;
            }
            self.free.clear();
            let range = components.get(segment.start..=segment.end).ok_or_else(|| {
                ChanError::structure(format!(
                    "segment {} covers missing components {}..{}",
                    segment.index, segment.start, segment.end
                ))
            })?;
            self.add_range(components, range, segment.direction, segment.is_sure, zones)?;
        }
        if let Some(last) = segments.last() {
            self.free.clear();
            let tail = components.get(last.end + 1..).unwrap_or(&[]);
            self.add_range(components, tail, last.direction.opposite(), false, zones)?;
        }
        self.remember_last_sure(segments);
        Ok(())
    }
}
