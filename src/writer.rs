use std::fmt::Write as _;

use anyhow::{Context, Result};

use crate::image::Image;
use crate::segment::SegmentFlags;

/// First line of every linked image.
pub const IMAGE_MARKER: &str = "LINK";

/// Renders the finished image: marker, header, the segment table in final
/// layout order, then the raw payloads of every present segment.
#[must_use]
pub fn render_image(image: &Image) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(IMAGE_MARKER.as_bytes());
    out.push(b'\n');
    out.extend_from_slice(render_header(image).as_bytes());
    out.push(b'\n');
    out.extend_from_slice(render_segment_table(image).as_bytes());

    for segment in image.segments.values() {
        if !segment.flags.contains(SegmentFlags::PRESENT) {
            continue;
        }
        if let Some(data) = &segment.data {
            out.extend_from_slice(data);
            // TODO: drop this separator; a newline inside the payload
            // stream corrupts consumers that read segment bytes by offset.
            out.push(b'\n');
        }
    }
    out
}

/// Header counts: segments, symbols, relocations. The symbol table is not
/// re-emitted and no relocations survive this stage, so the last two fields
/// are zero by contract.
#[must_use]
pub fn render_header(image: &Image) -> String {
    format!("{} 0 0", image.segments.len())
}

#[must_use]
pub fn render_segment_table(image: &Image) -> String {
    let mut table = String::new();
    for segment in image.segments.values() {
        let address = segment.address.unwrap_or(0);
        let _ = writeln!(
            table,
            "{} {} {:#x} {:#x}",
            segment.name, segment.flags, segment.size, address
        );
    }
    table
}

/// Serializes the image and writes it to `output_path`.
///
/// # Errors
/// Returns an error when writing `output_path` fails.
pub fn write_output(output_path: &str, image: &Image) -> Result<()> {
    let payload = render_image(image);
    std::fs::write(output_path, payload)
        .with_context(|| format!("failed to write {output_path}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::format::obj::Module;
    use crate::image::{Image, LinkConfig};
    use crate::layout::assign_addresses;
    use crate::segment::{Segment, SegmentFlags};

    use super::{render_header, render_image, render_segment_table};

    fn mk_segment(name: &str, size: u64, letters: &str, fill: u8) -> Segment {
        let flags = SegmentFlags::from_letters(letters).expect("flags");
        Segment {
            name: name.to_string(),
            flags,
            size,
            address: None,
            offset: 0,
            data: flags
                .contains(SegmentFlags::PRESENT)
                .then(|| vec![fill; size as usize]),
        }
    }

    fn mk_image(segments: Vec<Segment>) -> Image {
        let mut image = Image::new(LinkConfig::default());
        image
            .ingest(&Module {
                segments,
                symbols: Vec::new(),
            })
            .expect("ingest");
        assign_addresses(&mut image);
        image
    }

    #[test]
    fn header_counts_segments_and_nothing_else() {
        let image = mk_image(vec![
            mk_segment("a.text", 4, "APR", 0x11),
            mk_segment("a.data", 4, "APRW", 0x22),
            mk_segment("a.bss", 4, "ARW", 0),
        ]);
        assert_eq!(render_header(&image), "3 0 0");
    }

    #[test]
    fn artifact_starts_with_marker_and_header() {
        let image = mk_image(vec![mk_segment("a.text", 2, "APR", 0x11)]);
        let artifact = render_image(&image);
        let text = String::from_utf8_lossy(&artifact);
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("LINK"));
        assert_eq!(lines.next(), Some("1 0 0"));
    }

    #[test]
    fn table_lists_name_flags_size_and_address() {
        let image = mk_image(vec![mk_segment("a.text", 0x10, "APR", 0x11)]);
        assert_eq!(
            render_segment_table(&image),
            "a.text APR 0x10 0x4000e8\n"
        );
    }

    #[test]
    fn unallocated_segments_render_a_zero_address() {
        let image = mk_image(vec![mk_segment("notes", 4, "PR", 0x5a)]);
        assert_eq!(render_segment_table(&image), "notes PR 0x4 0x0\n");
    }

    #[test]
    fn payloads_follow_the_table_in_layout_order() {
        let image = mk_image(vec![
            mk_segment("a.data", 2, "APRW", 0x22),
            mk_segment("a.text", 2, "APR", 0x11),
            mk_segment("a.bss", 2, "ARW", 0),
        ]);
        let artifact = render_image(&image);

        // table order is text, data, bss; bss is absent from the payloads
        let tail_len = 3 * 2;
        let tail = &artifact[artifact.len() - tail_len..];
        assert_eq!(tail, &[0x11, 0x11, b'\n', 0x22, 0x22, b'\n'][..]);
    }

    #[test]
    fn absent_segments_emit_no_payload() {
        let with_bss = mk_image(vec![
            mk_segment("a.text", 2, "APR", 0x11),
            mk_segment("a.data", 2, "APRW", 0x22),
            mk_segment("a.bss", 64, "ARW", 0),
        ]);
        let without_bss = mk_image(vec![
            mk_segment("a.text", 2, "APR", 0x11),
            mk_segment("a.data", 2, "APRW", 0x22),
        ]);

        let long = render_image(&with_bss);
        let short = render_image(&without_bss);
        // the bss segment only adds its table line, never payload bytes
        let bss_line = "a.bss ARW 0x40 0x6000ec\n";
        assert_eq!(long.len(), short.len() + bss_line.len());
    }
}
