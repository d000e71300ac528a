use anyhow::Context;

use crate::cli::Args;
use crate::format::obj::parse_module;
use crate::image::{Image, LinkConfig};
use crate::layout::assign_addresses;
use crate::segment::Category;
use crate::writer::write_output;

pub fn run(args: Args) -> anyhow::Result<()> {
    if args.inputs.is_empty() {
        anyhow::bail!("no input files")
    }

    let mut config = LinkConfig::default();
    if let Some(base) = args.base_address {
        config.base_address = base;
    }
    if let Some(page) = args.page_size {
        config.page_size = page;
    }
    if let Some(align) = args.align {
        config.align_quantum = align;
    }

    let mut image = Image::new(config);
    for input in &args.inputs {
        let text = std::fs::read_to_string(input)
            .with_context(|| format!("failed to read {input}"))?;
        let module =
            parse_module(&text).with_context(|| format!("failed to parse {input}"))?;
        image
            .ingest(&module)
            .with_context(|| format!("failed to link {input}"))?;

        if args.verbose {
            println!(
                "linked {input}: {} segment(s), {} symbol(s)",
                module.segments.len(),
                module.symbols.len()
            );
        }
    }

    tracing::info!(modules = image.module_count(), "assigning addresses");
    assign_addresses(&mut image);

    if args.verbose {
        println!("layout:");
        for category in Category::ALL {
            let count = image
                .segments
                .keys()
                .filter(|name| image.category_of(name) == Some(category))
                .count();
            println!("  {category}: {count} segment(s)");
        }
    }

    if let Some(output) = &args.output {
        write_output(output, &image)?;
        if args.verbose {
            println!("wrote output: {output}");
        }
    }

    if args.verbose {
        println!("rlink: linked {} input file(s)", image.module_count());
    }
    Ok(())
}
