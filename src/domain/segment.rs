//! Generic segment over a run of components (strokes, or level-1 segments).

use crate::domain::bar::BarMark;
use crate::domain::candle::Direction;
use crate::domain::component::Component;
use crate::domain::error::ChanError;
use crate::domain::zone::Zone;
use std::marker::PhantomData;

#[derive(Debug, Clone, PartialEq)]
pub struct Segment<C> {
    pub index: usize,
    pub direction: Direction,
    pub is_sure: bool,
    /// First and last component index, inclusive.
    pub start: usize,
    pub end: usize,
    pub reason: &'static str,
    /// Rebuilt in full by zone linkage on every touch.
    pub zones: Vec<Zone>,
    /// Set once three sure segments follow; linkage never revisits it.
    pub elements_confirmed: bool,
    pub prev: Option<usize>,
    pub next: Option<usize>,
    pub segment_index: Option<usize>,
    begin_value: f64,
    end_value: f64,
    begin_mark: BarMark,
    end_mark: BarMark,
    begin_candle: usize,
    end_candle: usize,
    _component: PhantomData<fn() -> C>,
}

impl<C: Component> Segment<C> {
    /// Build a segment over `components[start..=end]`.
    ///
    /// Fewer than three components can never be sure. Without an explicit
    /// direction the segment takes the direction of its last component.
    pub fn new(
        index: usize,
        components: &[C],
        start: usize,
        end: usize,
        is_sure: bool,
        direction: Option<Direction>,
        reason: &'static str,
    ) -> Result<Self, ChanError> {
        if start > end {
            return Err(ChanError::structure(format!(
                "segment {index} starts at component {start} after its end {end}"
            )));
        }
        let first = components.get(start).ok_or_else(|| {
            ChanError::structure(format!("segment {index} start {start} is out of range"))
        })?;
        let last = components.get(end).ok_or_else(|| {
            ChanError::structure(format!("segment {index} end {end} is out of range"))
        })?;
        Ok(Self {
            index,
            direction: direction.unwrap_or(last.direction()),
            is_sure: is_sure && end - start >= 2,
            start,
            end,
            reason,
            zones: Vec::new(),
            elements_confirmed: false,
            prev: index.checked_sub(1),
            next: None,
            segment_index: None,
            begin_value: first.begin_value(),
            end_value: last.end_value(),
            begin_mark: first.begin_mark(),
            end_mark: last.end_mark(),
            begin_candle: first.begin_candle(),
            end_candle: last.end_candle(),
            _component: PhantomData,
        })
    }

    /// A sure down segment may not end above its start, nor an up one below.
    pub fn ends_consistent(&self) -> bool {
        if !self.is_sure {
            return true;
        }
        match self.direction {
            Direction::Down => self.begin_value >= self.end_value,
            Direction::Up => self.begin_value <= self.end_value,
        }
    }

    pub fn component_count(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn contains(&self, component: usize) -> bool {
        self.start <= component && component <= self.end
    }

    /// Same extent, classification and reason, ignoring zones and linkage state.
    pub fn same_shape(&self, other: &Self) -> bool {
        self.index == other.index
            && self.reason == other.reason
            && self.start == other.start
            && self.end == other.end
            && self.direction == other.direction
            && self.is_sure == other.is_sure
            && self.begin_mark == other.begin_mark
            && self.end_mark == other.end_mark
            && self.begin_value.to_bits() == other.begin_value.to_bits()
            && self.end_value.to_bits() == other.end_value.to_bits()
    }

    /// Zones with at least two members.
    pub fn multi_component_zones(&self) -> impl DoubleEndedIterator<Item = &Zone> {
        self.zones.iter().filter(|z| !z.is_one_component())
    }

    /// Prepend: linkage visits zones newest first.
    pub(crate) fn add_zone(&mut self, zone: Zone) {
        self.zones.insert(0, zone);
    }
}

impl<C: Component> Component for Segment<C> {
    fn index(&self) -> usize {
        self.index
    }

    fn direction(&self) -> Direction {
        self.direction
    }

    fn is_sure(&self) -> bool {
        self.is_sure
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

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::NaiveDate;

    /// Minimal component for exercising segment-level code without candles.
    #[derive(Debug, Clone, PartialEq)]
    pub struct Leg {
        pub index: usize,
        pub begin: f64,
        pub end: f64,
        pub sure: bool,
        pub segment_index: Option<usize>,
    }

    impl Leg {
        fn mark(&self, offset: usize) -> BarMark {
            let bar = self.index * 4 + offset;
            BarMark {
                index: bar,
                time: NaiveDate::from_ymd_opt(2024, 1, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap()
                    + chrono::Duration::hours(bar as i64),
            }
        }
    }

    impl Component for Leg {
        fn index(&self) -> usize {
            self.index
        }
        fn direction(&self) -> Direction {
            if self.end > self.begin {
                Direction::Up
            } else {
                Direction::Down
            }
        }
        fn is_sure(&self) -> bool {
            self.sure
        }
        fn begin_value(&self) -> f64 {
            self.begin
        }
        fn end_value(&self) -> f64 {
            self.end
        }
        fn begin_mark(&self) -> BarMark {
            self.mark(0)
        }
        fn end_mark(&self) -> BarMark {
            self.mark(4)
        }
        fn begin_candle(&self) -> usize {
            self.index * 4
        }
        fn end_candle(&self) -> usize {
            self.index * 4 + 4
        }
        fn segment_index(&self) -> Option<usize> {
            self.segment_index
        }
        fn set_segment_index(&mut self, index: usize) {
            self.segment_index = Some(index);
        }
    }

    /// Chain of sure legs through the given turning points.
    pub fn legs(points: &[f64]) -> Vec<Leg> {
        points
            .windows(2)
            .enumerate()
            .map(|(index, w)| Leg {
                index,
                begin: w[0],
                end: w[1],
                sure: true,
                segment_index: None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::legs;
    use super::*;

    #[test]
    fn takes_values_from_end_components() {
        let comps = legs(&[10.0, 20.0, 15.0, 25.0]);
        let seg = Segment::new(0, &comps, 0, 2, true, None, "normal").unwrap();
        assert_eq!(seg.direction, Direction::Up);
        assert!(seg.is_sure);
        assert!((seg.begin_value() - 10.0).abs() < f64::EPSILON);
        assert!((seg.end_value() - 25.0).abs() < f64::EPSILON);
        assert_eq!(seg.begin_mark().index, 0);
        assert_eq!(seg.end_mark().index, 12);
        assert_eq!(seg.component_count(), 3);
        assert!(seg.ends_consistent());
    }

    #[test]
    fn short_segment_is_never_sure() {
        let comps = legs(&[10.0, 20.0, 15.0]);
        let seg = Segment::new(0, &comps, 0, 1, true, Some(Direction::Up), "normal").unwrap();
        assert!(!seg.is_sure);
    }

    #[test]
    fn inconsistent_sure_ends_detected() {
        let comps = legs(&[10.0, 20.0, 15.0, 8.0]);
        let seg = Segment::new(0, &comps, 0, 2, true, Some(Direction::Up), "normal").unwrap();
        assert!(!seg.ends_consistent());
    }

    #[test]
    fn out_of_range_is_structural() {
        let comps = legs(&[10.0, 20.0]);
        let err = Segment::new(0, &comps, 0, 3, false, None, "normal").unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn prev_link_follows_index() {
        let comps = legs(&[10.0, 20.0, 15.0, 25.0]);
        let first = Segment::new(0, &comps, 0, 0, false, None, "normal").unwrap();
        let second = Segment::new(1, &comps, 1, 2, false, None, "normal").unwrap();
        assert_eq!(first.prev, None);
        assert_eq!(second.prev, Some(0));
        assert!(first.same_shape(&first.clone()));
        assert!(!first.same_shape(&second));
    }

    #[test]
    fn reason_is_part_of_shape() {
        let comps = legs(&[10.0, 20.0, 15.0, 25.0]);
        let tagged = Segment::new(0, &comps, 0, 2, false, None, "split_first_1st").unwrap();
        let retagged = Segment::new(0, &comps, 0, 2, false, None, "0seg_find_high").unwrap();
        assert!(!tagged.same_shape(&retagged));
    }
}
