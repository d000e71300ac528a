use std::collections::BTreeMap;

use crate::image::Image;
use crate::segment::{Category, SegmentFlags};

/// Reorders the segment table into category precedence order and returns
/// the per-category name groups. From this point the table's iteration
/// order is the load-layout order.
pub fn order_segments(image: &mut Image) -> BTreeMap<Category, Vec<String>> {
    let mut groups: BTreeMap<Category, Vec<String>> = Category::ALL
        .iter()
        .map(|category| (*category, Vec::new()))
        .collect();

    for name in image.segments.keys() {
        // every stored segment was classified when it entered the table
        if let Some(category) = image.category_of(name) {
            if let Some(group) = groups.get_mut(&category) {
                group.push(name.clone());
            }
        }
    }

    let mut previous = std::mem::take(&mut image.segments);
    for names in groups.values() {
        for name in names {
            if let Some(segment) = previous.shift_remove(name) {
                image.segments.insert(name.clone(), segment);
            }
        }
    }

    groups
}

/// Assigns addresses to the allocatable segments of one category, walking a
/// cursor from `start`. The first segment lands exactly on `start`; each
/// following one lands on the next alignment boundary past the cursor.
/// After a placement the cursor points at the segment's last occupied byte.
/// Returns the final cursor, 0 if the group held nothing allocatable.
pub fn allocate_category(image: &mut Image, names: &[String], start: u64) -> u64 {
    let quantum = image.config.align_quantum;
    let mut offset = start;
    let mut placed = false;

    for name in names {
        let Some(segment) = image.segments.get_mut(name) else {
            continue;
        };
        if !segment.flags.contains(SegmentFlags::ALLOCATE) {
            continue;
        }
        if placed {
            offset = next_boundary(offset, quantum);
        }
        segment.address = Some(offset);
        offset = offset + segment.size - 1;
        placed = true;
    }

    if placed {
        offset
    } else {
        0
    }
}

/// Orders the table and assigns load addresses: code first, then a whole
/// unused page before initialized data so no mapped page straddles two
/// permission classes, then zero-initialized storage on the next aligned
/// boundary. PR segments never receive addresses but keep their table slot.
pub fn assign_addresses(image: &mut Image) {
    let groups = order_segments(image);
    let config = image.config;

    let mut offset = config.base_address + config.header_size;
    offset = allocate_category(image, &groups[&Category::Apr], offset);

    offset = offset + 1 + config.page_size;
    offset = allocate_category(image, &groups[&Category::Aprw], offset);

    offset = next_boundary(offset, config.align_quantum);
    allocate_category(image, &groups[&Category::Arw], offset);

    tracing::debug!(segments = image.segments.len(), "assigned load addresses");
}

// `value` marks the last occupied byte, so the result is the strictly-next
// multiple of `align`. `align` must be a power of two.
fn next_boundary(value: u64, align: u64) -> u64 {
    let mask = align - 1;
    (value + align) & !mask
}
