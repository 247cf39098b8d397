//! Segment refresh plus owning-segment assignment for the component list.

use crate::domain::collaborator::SegmentRefresh;
use crate::domain::component::Component;
use crate::domain::error::ChanError;
use crate::domain::segment::Segment;

/// Refresh `segments` against `components`, then reassign each component's
/// owning segment, skipping the prefix settled behind three sure segments.
pub fn recompute_segments<C, R>(
    refresher: &mut R,
    components: &mut [C],
    segments: &mut Vec<Segment<C>>,
) -> Result<(), ChanError>
where
    C: Component,
    R: SegmentRefresh<C> + ?Sized,
{
    refresher.refresh(components, segments)?;
    assign_segment_indices(components, segments, true)
}

/// Same as [`recompute_segments`] but reassigns every component.
pub fn recompute_segments_untruncated<C, R>(
    refresher: &mut R,
    components: &mut [C],
    segments: &mut Vec<Segment<C>>,
) -> Result<(), ChanError>
where
    C: Component,
    R: SegmentRefresh<C> + ?Sized,
{
    refresher.refresh(components, segments)?;
    assign_segment_indices(components, segments, false)
}

/// Start component of the newest segment preceded by a run of three sure
/// segments counted from the end; a non-sure segment resets the run.
fn truncation_start<C>(segments: &[Segment<C>]) -> usize {
    let mut sure_run = 0usize;
    let mut begin = 0;
    for segment in segments.iter().rev() {
        if segment.is_sure {
            sure_run += 1;
        } else {
            sure_run = 0;
        }
        begin = segment.start;
        if sure_run > 2 {
            break;
        }
    }
    begin
}

fn assign_segment_indices<C: Component>(
    components: &mut [C],
    segments: &[Segment<C>],
    truncate: bool,
) -> Result<(), ChanError> {
    let Some(mut cursor) = segments.len().checked_sub(1) else {
        for component in components.iter_mut() {
            component.set_segment_index(0);
        }
        return Ok(());
    };
    let frozen_before = if truncate {
        truncation_start(segments)
    } else {
        0
    };
    for (i, component) in components.iter_mut().enumerate().rev() {
        if i < frozen_before && component.segment_index().is_some() {
            break;
        }
        // Segments tile the components in order, so one step back suffices.
        if i < segments[cursor].start {
            cursor = cursor.checked_sub(1).ok_or_else(|| {
                ChanError::structure(format!(
                    "component {i} precedes segment {} with no predecessor",
                    segments[cursor].index
                ))
            })?;
            if i < segments[cursor].start {
                return Err(ChanError::structure(format!(
                    "segments are out of order at component {i}"
                )));
            }
        }
        let current = &segments[cursor];
        let owner = if i > current.end {
            current.index + 1
        } else {
            current.index
        };
        component.set_segment_index(owner);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candle::Direction;
    use crate::domain::segment::test_support::{Leg, legs};

    /// Hands back a fixed segment list on every refresh.
    struct Fixed(Vec<(usize, usize, bool)>);

    impl SegmentRefresh<Leg> for Fixed {
        fn refresh(
            &mut self,
            components: &[Leg],
            segments: &mut Vec<Segment<Leg>>,
        ) -> Result<(), ChanError> {
            segments.clear();
            for (i, (start, end, sure)) in self.0.iter().enumerate() {
                let direction = if i % 2 == 0 {
                    Direction::Up
                } else {
                    Direction::Down
                };
                segments.push(Segment::new(
                    i,
                    components,
                    *start,
                    *end,
                    *sure,
                    Some(direction),
                    "normal",
                )?);
            }
            Ok(())
        }
    }

    fn path(count: usize) -> Vec<Leg> {
        let points: Vec<f64> = (0..=count)
            .map(|i| if i % 2 == 0 { 10.0 + i as f64 } else { 20.0 + i as f64 })
            .collect();
        legs(&points)
    }

    fn settled() -> Fixed {
        Fixed(vec![
            (0, 9, true),
            (10, 19, true),
            (20, 29, true),
            (30, 39, true),
            (40, 44, true),
            (45, 47, true),
            (48, 50, true),
        ])
    }

    #[test]
    fn empty_segment_list_assigns_zero() {
        let mut comps = path(3);
        let mut segments = Vec::new();
        recompute_segments(&mut Fixed(Vec::new()), &mut comps, &mut segments).unwrap();
        assert!(comps.iter().all(|c| c.segment_index == Some(0)));
    }

    #[test]
    fn truncation_starts_at_third_sure_segment() {
        let comps = path(51);
        let mut segments = Vec::new();
        settled().refresh(&comps, &mut segments).unwrap();
        assert_eq!(truncation_start(&segments), 40);

        let mut broken = Fixed(vec![
            (0, 9, true),
            (10, 19, true),
            (20, 29, true),
            (30, 39, false),
            (40, 50, true),
        ]);
        broken.refresh(&comps, &mut segments).unwrap();
        assert_eq!(truncation_start(&segments), 0);
    }

    #[test]
    fn appended_component_past_last_segment_keeps_frozen_prefix() {
        let mut comps = path(52);
        for (i, c) in comps.iter_mut().enumerate().take(51) {
            c.segment_index = Some(match i {
                0..=9 => 0,
                10..=19 => 1,
                20..=29 => 2,
                30..=39 => 3,
                40..=44 => 4,
                45..=47 => 5,
                _ => 6,
            });
        }
        // Values behind the boundary stay put even when they disagree with
        // the current segments.
        comps[39].segment_index = Some(99);
        comps[38].segment_index = Some(98);
        comps[5].segment_index = Some(42);
        let mut segments = Vec::new();
        recompute_segments(&mut settled(), &mut comps, &mut segments).unwrap();
        assert_eq!(comps[51].segment_index, Some(7));
        assert_eq!(comps[40].segment_index, Some(4));
        assert_eq!(comps[39].segment_index, Some(99));
        assert_eq!(comps[38].segment_index, Some(98));
        assert_eq!(comps[5].segment_index, Some(42));
    }

    #[test]
    fn unassigned_components_behind_boundary_are_filled() {
        let mut comps = path(52);
        let mut segments = Vec::new();
        recompute_segments(&mut settled(), &mut comps, &mut segments).unwrap();
        assert_eq!(comps[0].segment_index, Some(0));
        assert_eq!(comps[39].segment_index, Some(3));
    }

    #[test]
    fn misordered_segments_are_structural() {
        let mut comps = path(12);
        let mut segments = Vec::new();
        let err = recompute_segments_untruncated(
            &mut Fixed(vec![(0, 3, false), (5, 6, false), (4, 10, false)]),
            &mut comps,
            &mut segments,
        )
        .unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn untruncated_reassigns_everything() {
        let mut comps = path(52);
        for c in comps.iter_mut() {
            c.segment_index = Some(42);
        }
        let mut segments = Vec::new();
        recompute_segments_untruncated(&mut settled(), &mut comps, &mut segments).unwrap();
        assert_eq!(comps[5].segment_index, Some(0));
        assert_eq!(comps[51].segment_index, Some(7));
    }

    #[test]
    fn component_before_first_segment_is_structural() {
        let mut comps = path(6);
        let mut segments = Vec::new();
        let err = recompute_segments(&mut Fixed(vec![(2, 5, false)]), &mut comps, &mut segments)
            .unwrap_err();
        assert!(err.is_structural());
    }
}
