//! Central consolidation zones.

use crate::domain::bar::BarMark;
use crate::domain::component::{Component, has_overlap};
use crate::domain::config::ZoneCombineMode;
use crate::domain::error::ChanError;

#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    pub is_sure: bool,
    /// First and last member component index.
    pub begin: usize,
    pub end: usize,
    pub begin_mark: BarMark,
    pub end_mark: BarMark,
    pub low: f64,
    pub high: f64,
    pub peak_low: f64,
    pub peak_high: f64,
    /// Component immediately before the first member.
    pub entering: Option<usize>,
    /// Component immediately after the last member, once it exists.
    pub exiting: Option<usize>,
    pub members: Vec<usize>,
    /// Number of zones folded into this one; zero when never combined.
    pub sub_zone_count: usize,
}

impl Zone {
    /// Zone spanning `items`, bounded by the highest low and lowest high.
    pub fn new<C: Component>(items: &[&C], is_sure: bool) -> Result<Self, ChanError> {
        let first = items
            .first()
            .ok_or_else(|| ChanError::structure("zone needs at least one component"))?;
        let mut zone = Self {
            is_sure,
            begin: first.index(),
            end: first.index(),
            begin_mark: first.begin_mark(),
            end_mark: first.end_mark(),
            low: f64::NEG_INFINITY,
            high: f64::INFINITY,
            peak_low: f64::INFINITY,
            peak_high: f64::NEG_INFINITY,
            entering: None,
            exiting: None,
            members: Vec::new(),
            sub_zone_count: 0,
        };
        zone.update_range(items);
        for item in items {
            zone.update_end(*item);
        }
        Ok(zone)
    }

    fn update_range<C: Component>(&mut self, items: &[&C]) {
        self.low = items.iter().map(|c| c.low()).fold(f64::NEG_INFINITY, f64::max);
        self.high = items.iter().map(|c| c.high()).fold(f64::INFINITY, f64::min);
    }

    fn update_end<C: Component>(&mut self, item: &C) {
        self.end = item.index();
        self.end_mark = item.end_mark();
        self.peak_low = self.peak_low.min(item.low());
        self.peak_high = self.peak_high.max(item.high());
    }

    pub fn mid(&self) -> f64 {
        (self.low + self.high) / 2.0
    }

    pub fn is_one_component(&self) -> bool {
        self.begin == self.end
    }

    /// Strict overlap with the zone bounds; touching does not count.
    pub fn in_range<C: Component>(&self, item: &C) -> bool {
        has_overlap(self.low, self.high, item.low(), item.high(), false)
    }

    /// Whether the zone starts inside `[start, end]`.
    pub fn starts_within(&self, start: usize, end: usize) -> bool {
        start <= self.begin && self.begin <= end
    }

    /// Extend the zone with `item` when it overlaps; a one-component zone
    /// first narrows to the overlap of its member and `item`.
    pub fn try_add_to_end<C: Component>(&mut self, components: &[C], item: &C) -> bool {
        if !self.in_range(item) {
            return false;
        }
        if self.is_one_component() {
            if let Some(first) = components.get(self.begin) {
                self.update_range(&[first, item]);
            }
        }
        self.update_end(item);
        true
    }

    /// Fold `other` into this zone when both start in the same segment and
    /// their bounds overlap under `mode`.
    pub fn combine<C: Component>(
        &mut self,
        other: &Zone,
        mode: ZoneCombineMode,
        components: &[C],
    ) -> bool {
        if other.is_one_component() {
            return false;
        }
        let own_segment = components.get(self.begin).and_then(|c| c.segment_index());
        let other_segment = components.get(other.begin).and_then(|c| c.segment_index());
        if own_segment != other_segment {
            return false;
        }
        let overlaps = match mode {
            ZoneCombineMode::Zs => has_overlap(self.low, self.high, other.low, other.high, true),
            ZoneCombineMode::Peak => has_overlap(
                self.peak_low,
                self.peak_high,
                other.peak_low,
                other.peak_high,
                false,
            ),
        };
        if !overlaps {
            return false;
        }
        self.sub_zone_count = if self.sub_zone_count == 0 {
            2
        } else {
            self.sub_zone_count + 1
        };
        self.low = self.low.min(other.low);
        self.high = self.high.max(other.high);
        self.peak_low = self.peak_low.min(other.peak_low);
        self.peak_high = self.peak_high.max(other.peak_high);
        self.end = other.end;
        self.end_mark = other.end_mark;
        self.exiting = other.exiting;
        true
    }

    /// Point entering/exiting references and the member list at `components`.
    pub fn relink(&mut self, component_count: usize) -> Result<(), ChanError> {
        if self.begin == 0 {
            return Err(ChanError::structure(format!(
                "zone {}..{} starts at the first component",
                self.begin, self.end
            )));
        }
        if self.end >= component_count {
            return Err(ChanError::structure(format!(
                "zone {}..{} ends past component {}",
                self.begin,
                self.end,
                component_count.saturating_sub(1)
            )));
        }
        self.entering = Some(self.begin - 1);
        if self.end + 1 < component_count {
            self.exiting = Some(self.end + 1);
        }
        self.members = (self.begin..=self.end).collect();
        Ok(())
    }
}
