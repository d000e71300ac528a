use std::fmt;

use bitflags::bitflags;
use thiserror::Error;

/// Reserved name prefix for segments synthesized from common-block symbols.
pub const COMMON_PREFIX: &str = "__common__.";

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SegmentFlags: u8 {
        const ALLOCATE = 1 << 0;
        const PRESENT = 1 << 1;
        const READ = 1 << 2;
        const WRITE = 1 << 3;
    }
}

impl SegmentFlags {
    /// Parses a subset of the canonical `APRW` alphabet, in any order.
    ///
    /// # Errors
    /// Returns the first letter outside the alphabet.
    pub fn from_letters(letters: &str) -> Result<Self, char> {
        let mut flags = SegmentFlags::empty();
        for letter in letters.chars() {
            flags |= match letter {
                'A' => Self::ALLOCATE,
                'P' => Self::PRESENT,
                'R' => Self::READ,
                'W' => Self::WRITE,
                other => return Err(other),
            };
        }
        Ok(flags)
    }
}

// Rendering order is fixed to A, P, R, W regardless of how the flags were
// written in the module file.
impl fmt::Display for SegmentFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (letter, flag) in [
            ('A', Self::ALLOCATE),
            ('P', Self::PRESENT),
            ('R', Self::READ),
            ('W', Self::WRITE),
        ] {
            if self.contains(flag) {
                write!(f, "{letter}")?;
            }
        }
        Ok(())
    }
}

/// Permission category of a segment. The variant order is the load-layout
/// precedence: code, initialized data, zero-initialized storage, then
/// non-loaded auxiliary data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Apr,
    Aprw,
    Arw,
    Pr,
}

impl Category {
    pub const ALL: [Category; 4] = [Category::Apr, Category::Aprw, Category::Arw, Category::Pr];
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Category::Apr => "APR",
            Category::Aprw => "APRW",
            Category::Arw => "ARW",
            Category::Pr => "PR",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("symbol {name} is not a linkable common block (defined={defined}, requested size {size:#x})")]
    InvalidCommonBlock {
        name: String,
        defined: bool,
        size: u64,
    },
    #[error("segment {name} is already linked as {existing}, cannot merge it as {incoming}")]
    ClassificationConflict {
        name: String,
        existing: Category,
        incoming: Category,
    },
    #[error("segment {name} has an unknown flag combination: {flags}")]
    UnknownCategory { name: String, flags: SegmentFlags },
}

/// One named unit of code or data. Payload bytes are only carried while the
/// `PRESENT` flag is set; the address stays unassigned until allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub name: String,
    pub flags: SegmentFlags,
    pub size: u64,
    pub address: Option<u64>,
    pub offset: u64,
    pub data: Option<Vec<u8>>,
}

impl Segment {
    #[must_use]
    pub fn is_common(&self) -> bool {
        self.name.starts_with(COMMON_PREFIX)
    }

    /// Appends `incoming` to this segment's run, returning the merged value
    /// together with the in-run offset the incoming bytes landed at.
    #[must_use]
    pub fn merged_with(&self, incoming: &Segment) -> (Segment, u64) {
        let placed_at = self.size;
        let mut merged = self.clone();
        merged.size += incoming.size;
        if let Some(bytes) = &incoming.data {
            merged.data.get_or_insert_with(Vec::new).extend_from_slice(bytes);
        }
        (merged, placed_at)
    }

    /// Grows a common-block segment to the larger of the stored and
    /// requested sizes. Common blocks never carry payload.
    #[must_use]
    pub fn grown_to(&self, size: u64) -> Segment {
        let mut grown = self.clone();
        grown.size = grown.size.max(size);
        grown
    }
}

/// Reduces a segment's flag set to its permission category.
///
/// # Errors
/// Returns `LinkError::UnknownCategory` when the flags match none of the
/// four recognized categories.
pub fn classify(name: &str, flags: SegmentFlags) -> Result<Category, LinkError> {
    use SegmentFlags as F;

    let category = if flags == F::ALLOCATE | F::PRESENT | F::READ {
        Category::Apr
    } else if flags == F::ALLOCATE | F::PRESENT | F::READ | F::WRITE {
        Category::Aprw
    } else if flags == F::ALLOCATE | F::READ | F::WRITE {
        Category::Arw
    } else if flags == F::PRESENT | F::READ {
        Category::Pr
    } else {
        return Err(LinkError::UnknownCategory {
            name: name.to_string(),
            flags,
        });
    };
    Ok(category)
}
