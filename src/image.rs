use std::collections::HashMap;

use indexmap::IndexMap;

use crate::format::obj::{Module, Symbol};
use crate::segment::{classify, Category, LinkError, Segment, SegmentFlags, COMMON_PREFIX};

/// Fixed layout constants for one link, passed to the image at construction.
/// `page_size` and `align_quantum` must be powers of two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig {
    pub page_size: u64,
    pub base_address: u64,
    pub header_size: u64,
    pub align_quantum: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            // The first pages stay unmapped so null pointer dereferences
            // keep faulting; code starts above them, after the header.
            page_size: 0x20_0000,
            base_address: 0x40_0000,
            header_size: 0xe8,
            align_quantum: 4,
        }
    }
}

/// An independently-owned snapshot of one module's segments and symbols.
/// Capturing it up front keeps later in-table merges from aliasing anything
/// the caller still holds.
#[derive(Debug, Clone)]
pub struct ModuleView {
    segments: Vec<Segment>,
    symbols: Vec<Symbol>,
}

impl ModuleView {
    #[must_use]
    pub fn capture(module: &Module) -> Self {
        ModuleView {
            segments: module.segments.clone(),
            symbols: module.symbols.clone(),
        }
    }

    #[must_use]
    pub fn into_parts(self) -> (Vec<Segment>, Vec<Symbol>) {
        (self.segments, self.symbols)
    }
}

/// The growing executable image: the merged segment table plus the
/// name→category record that keeps cross-module merges consistent.
#[derive(Debug, Default)]
pub struct Image {
    pub config: LinkConfig,
    pub segments: IndexMap<String, Segment>,
    categories: HashMap<String, Category>,
    modules: usize,
}

impl Image {
    #[must_use]
    pub fn new(config: LinkConfig) -> Self {
        Image {
            config,
            segments: IndexMap::new(),
            categories: HashMap::new(),
            modules: 0,
        }
    }

    /// Merges one parsed module into the image: every non-empty segment is
    /// classified and merged, every common-block symbol request becomes (or
    /// grows) a zero-initialized segment.
    ///
    /// # Errors
    /// Any `LinkError` aborts the link; the image must not be reused after
    /// a failed ingest.
    pub fn ingest(&mut self, module: &Module) -> Result<(), LinkError> {
        let (segments, symbols) = ModuleView::capture(module).into_parts();

        for segment in segments {
            if segment.size > 0 {
                self.add_segment(segment)?;
            }
        }
        for symbol in &symbols {
            if symbol.common_block {
                self.add_common_block(symbol)?;
            }
        }

        self.modules += 1;
        tracing::debug!(
            modules = self.modules,
            segments = self.segments.len(),
            "ingested module"
        );
        Ok(())
    }

    /// Synthesizes the `__common__.<name>` segment for one common-block
    /// request and forwards it to the ordinary merge path, so repeated
    /// requests settle on the maximum size.
    fn add_common_block(&mut self, symbol: &Symbol) -> Result<(), LinkError> {
        if symbol.defined || symbol.value == 0 {
            return Err(LinkError::InvalidCommonBlock {
                name: symbol.name.clone(),
                defined: symbol.defined,
                size: symbol.value,
            });
        }

        self.add_segment(Segment {
            name: format!("{COMMON_PREFIX}{}", symbol.name),
            flags: SegmentFlags::ALLOCATE | SegmentFlags::READ | SegmentFlags::WRITE,
            size: symbol.value,
            address: None,
            offset: 0,
            data: None,
        })
    }

    fn add_segment(&mut self, segment: Segment) -> Result<(), LinkError> {
        let category = classify(&segment.name, segment.flags)?;
        match self.categories.get(&segment.name) {
            None => {
                self.categories.insert(segment.name.clone(), category);
            }
            Some(existing) if *existing != category => {
                return Err(LinkError::ClassificationConflict {
                    name: segment.name.clone(),
                    existing: *existing,
                    incoming: category,
                });
            }
            Some(_) => {}
        }

        let merged = match self.segments.get(&segment.name) {
            None => {
                let mut fresh = segment;
                fresh.offset = 0;
                fresh
            }
            Some(stored) if stored.is_common() => stored.grown_to(segment.size),
            Some(stored) => {
                let (merged, placed_at) = stored.merged_with(&segment);
                tracing::debug!(name = %merged.name, offset = placed_at, "appended to segment run");
                merged
            }
        };
        self.segments.insert(merged.name.clone(), merged);
        Ok(())
    }

    #[must_use]
    pub fn category_of(&self, name: &str) -> Option<Category> {
        self.categories.get(name).copied()
    }

    #[must_use]
    pub fn module_count(&self) -> usize {
        self.modules
    }
}
