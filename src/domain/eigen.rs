//! Characteristic sequences: counter-direction components merged by inclusion,
//! scanned for the fractal that ends a segment.

use crate::domain::candle::{Direction, Fractal};
use crate::domain::component::Component;
use crate::domain::error::ChanError;

/// The slice of a component an eigen element needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EigenItem {
    pub index: usize,
    pub direction: Direction,
    pub high: f64,
    pub low: f64,
    pub is_sure: bool,
}

impl EigenItem {
    pub fn of<C: Component>(component: &C) -> Self {
        Self {
            index: component.index(),
            direction: component.direction(),
            high: component.high(),
            low: component.low(),
            is_sure: component.is_sure(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EigenRelation {
    Combine,
    Included,
    Up,
    Down,
}

/// Which shared edge turns an inclusion into a directional step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqualEdge {
    Top,
    Bottom,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Eigen {
    pub high: f64,
    pub low: f64,
    pub items: Vec<EigenItem>,
    pub direction: Direction,
    pub fractal: Fractal,
    pub gap: bool,
}

impl Eigen {
    pub fn new(item: EigenItem, direction: Direction) -> Self {
        Self {
            high: item.high,
            low: item.low,
            items: vec![item],
            direction,
            fractal: Fractal::Unknown,
            gap: false,
        }
    }

    pub fn test_combine(
        &self,
        item: &EigenItem,
        exclude_included: bool,
        equal_edge: Option<EqualEdge>,
    ) -> Result<EigenRelation, ChanError> {
        if self.high >= item.high && self.low <= item.low {
            return Ok(EigenRelation::Combine);
        }
        if self.high <= item.high && self.low >= item.low {
            return Ok(match equal_edge {
                Some(EqualEdge::Top) if self.high == item.high && self.low > item.low => {
                    EigenRelation::Down
                }
                Some(EqualEdge::Bottom) if self.low == item.low && self.high < item.high => {
                    EigenRelation::Up
                }
                _ if exclude_included => EigenRelation::Included,
                _ => EigenRelation::Combine,
            });
        }
        if self.high > item.high && self.low > item.low {
            return Ok(EigenRelation::Down);
        }
        if self.high < item.high && self.low < item.low {
            return Ok(EigenRelation::Up);
        }
        Err(ChanError::structure(format!(
            "component {} has no defined relation to its characteristic element",
            item.index
        )))
    }

    /// Merge `item` when it combines; bounds follow the element's direction.
    pub fn try_add(
        &mut self,
        item: EigenItem,
        exclude_included: bool,
        equal_edge: Option<EqualEdge>,
    ) -> Result<EigenRelation, ChanError> {
        let relation = self.test_combine(&item, exclude_included, equal_edge)?;
        if relation == EigenRelation::Combine {
            let one_price = item.high == item.low;
            match self.direction {
                Direction::Up => {
                    if !one_price || item.high != self.high {
                        self.high = self.high.max(item.high);
                        self.low = self.low.max(item.low);
                    }
                }
                Direction::Down => {
                    if !one_price || item.low != self.low {
                        self.high = self.high.min(item.high);
                        self.low = self.low.min(item.low);
                    }
                }
            }
            self.items.push(item);
        }
        Ok(relation)
    }

    /// Latest member sitting on the element's high (or low).
    pub fn peak_item(&self, is_high: bool) -> Result<&EigenItem, ChanError> {
        self.items
            .iter()
            .rev()
            .find(|i| if is_high { i.high == self.high } else { i.low == self.low })
            .ok_or_else(|| ChanError::structure("characteristic element has no peak member"))
    }

    pub fn update_fractal(
        &mut self,
        pre: &Eigen,
        next: &Eigen,
        exclude_included: bool,
        equal_edge: Option<EqualEdge>,
    ) {
        if exclude_included {
            if pre.high < self.high && next.high <= self.high && next.low < self.low {
                if equal_edge == Some(EqualEdge::Top) || next.high < self.high {
                    self.fractal = Fractal::Top;
                }
            } else if next.high > self.high && pre.low > self.low && next.low >= self.low {
                if equal_edge == Some(EqualEdge::Bottom) || next.low > self.low {
                    self.fractal = Fractal::Bottom;
                }
            }
        } else if pre.high < self.high
            && next.high < self.high
            && pre.low < self.low
            && next.low < self.low
        {
            self.fractal = Fractal::Top;
        } else if pre.high > self.high
            && next.high > self.high
            && pre.low > self.low
            && next.low > self.low
        {
            self.fractal = Fractal::Bottom;
        }
        self.gap = match self.fractal {
            Fractal::Top => pre.high < self.low,
            Fractal::Bottom => pre.low > self.high,
            Fractal::Unknown => false,
        };
    }

    /// Index of the segment-direction component ending at this element's peak.
    pub fn peak_component(&self) -> Result<usize, ChanError> {
        let first = self
            .items
            .first()
            .ok_or_else(|| ChanError::structure("empty characteristic element"))?;
        let peak = match first.direction {
            Direction::Up => self.peak_item(false)?,
            Direction::Down => self.peak_item(true)?,
        };
        peak.index
            .checked_sub(1)
            .ok_or_else(|| ChanError::structure("characteristic peak has no predecessor"))
    }
}

/// Three-element characteristic-sequence fractal detector for one segment direction.
#[derive(Debug, Clone, PartialEq)]
pub struct EigenFx {
    pub direction: Direction,
    pub elements: [Option<Eigen>; 3],
    pub items: Vec<EigenItem>,
    pub exclude_included: bool,
    pub last_evidence: Option<EigenItem>,
    /// Highest component index any decision has read.
    pub max_consulted: usize,
}

fn item_at<C: Component>(components: &[C], index: usize) -> Result<EigenItem, ChanError> {
    components
        .get(index)
        .map(EigenItem::of)
        .ok_or_else(|| ChanError::structure(format!("component {index} is out of range")))
}

impl EigenFx {
    pub fn new(direction: Direction, exclude_included: bool) -> Self {
        Self {
            direction,
            elements: [None, None, None],
            items: Vec::new(),
            exclude_included,
            last_evidence: None,
            max_consulted: 0,
        }
    }

    pub fn is_up(&self) -> bool {
        self.direction == Direction::Up
    }

    pub fn is_down(&self) -> bool {
        self.direction == Direction::Down
    }

    pub fn clear(&mut self) {
        self.elements = [None, None, None];
        self.items.clear();
    }

    pub fn has_second(&self) -> bool {
        self.elements[1].is_some()
    }

    fn consult(&mut self, index: usize) {
        self.max_consulted = self.max_consulted.max(index);
    }

    /// Feed a counter-direction component. Returns true once the middle
    /// element forms the fractal that ends the segment.
    pub fn add<C: Component>(&mut self, components: &[C], index: usize) -> Result<bool, ChanError> {
        let item = item_at(components, index)?;
        if item.direction == self.direction {
            return Err(ChanError::structure(format!(
                "component {index} runs with the {} segment it should oppose",
                self.direction
            )));
        }
        self.consult(index);
        self.items.push(item);
        let filled = (
            self.elements[0].is_some(),
            self.elements[1].is_some(),
            self.elements[2].is_some(),
        );
        match filled {
            (false, _, _) => {
                self.elements[0] = Some(Eigen::new(item, self.direction));
                Ok(false)
            }
            (true, false, _) => self.treat_second(components, item),
            (true, true, false) => self.treat_third(components, item),
            _ => Err(ChanError::structure(format!(
                "characteristic sequence already complete when component {index} arrived"
            ))),
        }
    }

    fn treat_second<C: Component>(
        &mut self,
        components: &[C],
        item: EigenItem,
    ) -> Result<bool, ChanError> {
        let exclude_included = self.exclude_included;
        let direction = self.direction;
        let Some(first) = self.elements[0].as_mut() else {
            return Ok(false);
        };
        if first.try_add(item, exclude_included, None)? == EigenRelation::Combine {
            return Ok(false);
        }
        let second = Eigen::new(item, direction);
        let retreats = match direction {
            Direction::Up => second.high < first.high,
            Direction::Down => second.low > first.low,
        };
        self.elements[1] = Some(second);
        if retreats {
            return self.reset(components);
        }
        Ok(false)
    }

    fn treat_third<C: Component>(
        &mut self,
        components: &[C],
        item: EigenItem,
    ) -> Result<bool, ChanError> {
        self.last_evidence = Some(item);
        let equal_edge = if self.exclude_included {
            Some(if item.direction == Direction::Down {
                EqualEdge::Top
            } else {
                EqualEdge::Bottom
            })
        } else {
            None
        };
        let relation = match self.elements[1].as_mut() {
            Some(second) => second.try_add(item, false, equal_edge)?,
            None => return Ok(false),
        };
        let third_direction = match relation {
            EigenRelation::Combine => return Ok(false),
            EigenRelation::Up => Direction::Up,
            EigenRelation::Down | EigenRelation::Included => Direction::Down,
        };
        self.elements[2] = Some(Eigen::new(item, third_direction));
        if !self.actual_break(components)? {
            return self.reset(components);
        }
        let exclude_included = self.exclude_included;
        let is_fx = match &mut self.elements {
            [Some(first), Some(second), Some(third)] => {
                second.update_fractal(first, third, exclude_included, equal_edge);
                (self.direction == Direction::Up && second.fractal == Fractal::Top)
                    || (self.direction == Direction::Down && second.fractal == Fractal::Bottom)
            }
            _ => false,
        };
        if is_fx { Ok(true) } else { self.reset(components) }
    }

    fn actual_break<C: Component>(&mut self, components: &[C]) -> Result<bool, ChanError> {
        if !self.exclude_included {
            return Ok(true);
        }
        let (second_last, third_item) = match (&self.elements[1], &self.elements[2]) {
            (Some(second), Some(third)) => match (second.items.last(), third.items.first()) {
                (Some(last), Some(item)) => (*last, *item),
                _ => return Ok(false),
            },
            _ => return Ok(false),
        };
        if (self.is_up() && third_item.low < second_last.low)
            || (self.is_down() && third_item.high > second_last.high)
        {
            return Ok(true);
        }
        let after_next = third_item.index + 2;
        if after_next < components.len() {
            self.consult(after_next);
            let follow = item_at(components, after_next)?;
            let breaks = match third_item.direction {
                Direction::Down => follow.low < third_item.low,
                Direction::Up => follow.high > third_item.high,
            };
            if breaks {
                self.last_evidence = Some(follow);
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Restart after a failed candidate. Inclusion-excluding sequences
    /// replay everything after the first item; otherwise the elements shift.
    pub fn reset<C: Component>(&mut self, components: &[C]) -> Result<bool, ChanError> {
        let replay: Vec<EigenItem> = self.items.iter().skip(1).copied().collect();
        if self.exclude_included {
            self.clear();
            for item in replay {
                if self.add(components, item.index)? {
                    return Ok(true);
                }
            }
        } else {
            let keep_from = self.elements[1]
                .as_ref()
                .and_then(|e| e.items.first())
                .map_or(0, |i| i.index);
            self.elements[0] = self.elements[1].take();
            self.elements[1] = self.elements[2].take();
            self.items = replay.into_iter().filter(|i| i.index >= keep_from).collect();
        }
        Ok(false)
    }

    /// Component where the candidate segment ends.
    pub fn peak_component(&self) -> Result<usize, ChanError> {
        self.elements[1]
            .as_ref()
            .ok_or_else(|| ChanError::structure("characteristic sequence has no middle element"))?
            .peak_component()
    }

    /// Whether the fractal really ends the segment. A gap fractal needs a
    /// reverse fractal after the peak; `None` means undecided so far.
    /// Components at or past `bound` are treated as not yet seen.
    pub fn can_be_end<C: Component>(
        &mut self,
        components: &[C],
        bound: usize,
    ) -> Result<Option<bool>, ChanError> {
        let (gap, break_threshold) = match (&self.elements[0], &self.elements[1]) {
            (Some(first), Some(second)) => {
                (second.gap, if self.is_up() { first.low } else { first.high })
            }
            _ => return Err(ChanError::structure("characteristic sequence is incomplete")),
        };
        if !gap {
            return Ok(Some(true));
        }
        let peak = self.peak_component()?;
        let threshold = components
            .get(peak)
            .ok_or_else(|| ChanError::structure(format!("peak component {peak} is out of range")))?
            .end_value();
        self.find_reverse_fractal(components, peak + 2, threshold, break_threshold, bound)
    }

    fn find_reverse_fractal<C: Component>(
        &mut self,
        components: &[C],
        begin: usize,
        threshold: f64,
        break_threshold: f64,
        bound: usize,
    ) -> Result<Option<bool>, ChanError> {
        let limit = components.len().min(bound);
        if begin >= limit {
            return Ok(None);
        }
        let first_direction = item_at(components, begin)?.direction;
        let mut reverse = EigenFx::new(first_direction.opposite(), false);
        for index in (begin..limit).step_by(2) {
            self.consult(index);
            if reverse.add(components, index)? {
                return Ok(Some(true));
            }
            let item = item_at(components, index)?;
            if (item.direction == Direction::Down && item.low < threshold)
                || (item.direction == Direction::Up && item.high > threshold)
            {
                return Ok(Some(false));
            }
            if let Some(second) = &reverse.elements[1] {
                if (item.direction == Direction::Down && second.high > break_threshold)
                    || (item.direction == Direction::Up && second.low < break_threshold)
                {
                    return Ok(Some(true));
                }
            }
        }
        Ok(None)
    }

    /// Every item and the last evidence are sure.
    pub fn all_items_sure(&self) -> bool {
        self.items.iter().all(|i| i.is_sure) && self.last_evidence.is_some_and(|e| e.is_sure)
    }

    /// Index of the second buffered item, where a rejected candidate restarts.
    pub fn restart_index(&self) -> Option<usize> {
        self.items.get(1).map(|i| i.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::segment::test_support::legs;

    fn item(index: usize, high: f64, low: f64, direction: Direction) -> EigenItem {
        EigenItem {
            index,
            direction,
            high,
            low,
            is_sure: true,
        }
    }

    #[test]
    fn combine_relations() {
        let e = Eigen::new(item(1, 20.0, 10.0, Direction::Down), Direction::Up);
        let inside = item(3, 18.0, 12.0, Direction::Down);
        let around = item(3, 22.0, 8.0, Direction::Down);
        assert_eq!(e.test_combine(&inside, true, None).unwrap(), EigenRelation::Combine);
        assert_eq!(e.test_combine(&around, true, None).unwrap(), EigenRelation::Included);
        assert_eq!(e.test_combine(&around, false, None).unwrap(), EigenRelation::Combine);
        assert_eq!(
            e.test_combine(&item(3, 25.0, 15.0, Direction::Down), true, None).unwrap(),
            EigenRelation::Up
        );
        assert_eq!(
            e.test_combine(&item(3, 15.0, 5.0, Direction::Down), true, None).unwrap(),
            EigenRelation::Down
        );
        let same_top = item(3, 20.0, 8.0, Direction::Down);
        assert_eq!(
            e.test_combine(&same_top, false, Some(EqualEdge::Top)).unwrap(),
            EigenRelation::Down
        );
    }

    #[test]
    fn up_element_merges_upward() {
        let mut e = Eigen::new(item(1, 20.0, 10.0, Direction::Down), Direction::Up);
        e.try_add(item(3, 18.0, 12.0, Direction::Down), true, None).unwrap();
        assert!((e.high - 20.0).abs() < f64::EPSILON);
        assert!((e.low - 12.0).abs() < f64::EPSILON);
        assert_eq!(e.items.len(), 2);
        assert_eq!(e.peak_item(false).unwrap().index, 3);
    }

    #[test]
    fn up_segment_ends_at_top_fractal() {
        // Up run peaking at leg 4 (ends at 30), then a down break.
        let comps = legs(&[10.0, 20.0, 15.0, 25.0, 18.0, 30.0, 22.0, 26.0, 16.0]);
        let mut fx = EigenFx::new(Direction::Up, true);
        assert!(!fx.add(&comps, 1).unwrap());
        assert!(!fx.add(&comps, 3).unwrap());
        assert!(!fx.add(&comps, 5).unwrap());
        assert!(fx.add(&comps, 7).unwrap());
        assert_eq!(fx.peak_component().unwrap(), 4);
        assert_eq!(fx.can_be_end(&comps, comps.len()).unwrap(), Some(true));
        assert!(fx.all_items_sure());
        assert_eq!(fx.max_consulted, 7);
    }

    #[test]
    fn direction_mismatch_is_structural() {
        let comps = legs(&[10.0, 20.0, 15.0]);
        let mut fx = EigenFx::new(Direction::Up, true);
        assert!(fx.add(&comps, 0).unwrap_err().is_structural());
    }

    #[test]
    fn unsure_evidence_blocks_sureness() {
        let mut comps = legs(&[10.0, 20.0, 15.0, 25.0, 18.0, 30.0, 22.0, 26.0, 16.0]);
        comps[7].sure = false;
        let mut fx = EigenFx::new(Direction::Up, true);
        for i in [1, 3, 5, 7] {
            fx.add(&comps, i).unwrap();
        }
        assert!(!fx.all_items_sure());
    }

    #[test]
    fn gap_fractal_is_undecided_at_bound() {
        // Down leg 5 gaps above leg 3's range.
        let comps = legs(&[10.0, 20.0, 15.0, 25.0, 21.0, 40.0, 32.0, 36.0, 20.0, 24.0, 18.0]);
        let mut fx = EigenFx::new(Direction::Up, true);
        let mut found = false;
        for i in [1, 3, 5, 7] {
            found = fx.add(&comps, i).unwrap();
        }
        assert!(found);
        assert!(fx.elements[1].as_ref().unwrap().gap);
        assert_eq!(fx.can_be_end(&comps, 7).unwrap(), None);
        assert_eq!(fx.can_be_end(&comps, comps.len()).unwrap(), Some(true));
    }
}
