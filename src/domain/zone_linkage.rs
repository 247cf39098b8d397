//! Attaches zones to the segments containing them and relinks their neighbours.

use crate::domain::component::Component;
use crate::domain::error::ChanError;
use crate::domain::segment::Segment;
use crate::domain::zone::Zone;

/// Rebuild each unsettled segment's zone collection, newest segment first.
///
/// The backward scan stops at the first segment whose elements are already
/// confirmed. The sure-segment counter only ever increments; once it passes
/// two, every further segment visited is marked confirmed.
pub fn relink_zones<C: Component>(
    components: &[C],
    segments: &mut [Segment<C>],
    zones: &mut [Zone],
) -> Result<(), ChanError> {
    let mut sure_count = 0usize;
    for segment in segments.iter_mut().rev() {
        if segment.elements_confirmed {
            break;
        }
        if segment.is_sure {
            sure_count += 1;
        }
        segment.zones.clear();
        let segment_begin_bar = segment.begin_mark().index;
        for zone in zones.iter_mut().rev() {
            if zone.end_mark.index < segment_begin_bar {
                break;
            }
            zone.relink(components.len())?;
            if zone.starts_within(segment.start, segment.end) {
                segment.add_zone(zone.clone());
            }
        }
        if sure_count > 2 {
            segment.elements_confirmed = true;
        }
    }
    Ok(())
}
