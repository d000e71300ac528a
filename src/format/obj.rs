use std::str::SplitWhitespace;

use crate::format::FormatError;
use crate::segment::{Segment, SegmentFlags};

/// One parsed module: the ordered segment records and the symbol table the
/// compiler emitted for a single translation unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub segments: Vec<Segment>,
    pub symbols: Vec<Symbol>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub defined: bool,
    pub value: u64,
    pub common_block: bool,
}

/// Parses one line-oriented module file.
///
/// Records are `segment <name> <size> <FLAGS>`, `data <hex>` (payload of
/// the preceding present segment) and `symbol <name> defined|undefined
/// <value> [common]`. Blank lines and `;` comments are skipped.
///
/// # Errors
/// Returns `FormatError` when a record is malformed or of an unknown kind.
pub fn parse_module(input: &str) -> Result<Module, FormatError> {
    let mut segments: Vec<Segment> = Vec::new();
    let mut symbols = Vec::new();

    for (idx, raw) in input.lines().enumerate() {
        let line = idx + 1;
        let text = raw.trim();
        if text.is_empty() || text.starts_with(';') {
            continue;
        }

        let mut fields = text.split_whitespace();
        match fields.next().unwrap_or_default() {
            "segment" => segments.push(parse_segment(&mut fields, line)?),
            "data" => {
                let payload = fields
                    .next()
                    .ok_or(FormatError::MalformedRecord { kind: "data", line })?;
                let bytes = hex::decode(payload).map_err(|_| FormatError::InvalidPayload(line))?;
                append_payload(&mut segments, &bytes, line)?;
            }
            "symbol" => symbols.push(parse_symbol(&mut fields, line)?),
            other => {
                return Err(FormatError::UnknownRecord {
                    kind: other.to_string(),
                    line,
                })
            }
        }
    }

    Ok(Module { segments, symbols })
}

fn parse_segment(fields: &mut SplitWhitespace, line: usize) -> Result<Segment, FormatError> {
    let malformed = || FormatError::MalformedRecord {
        kind: "segment",
        line,
    };
    let name = fields.next().ok_or_else(malformed)?;
    let size = parse_number(fields.next().ok_or_else(malformed)?, line)?;
    let letters = fields.next().ok_or_else(malformed)?;
    let flags = SegmentFlags::from_letters(letters)
        .map_err(|flag| FormatError::UnknownFlag { flag, line })?;

    // Present segments start with an empty payload so data records can
    // append; all others carry none.
    let data = flags.contains(SegmentFlags::PRESENT).then(Vec::new);
    Ok(Segment {
        name: name.to_string(),
        flags,
        size,
        address: None,
        offset: 0,
        data,
    })
}

fn parse_symbol(fields: &mut SplitWhitespace, line: usize) -> Result<Symbol, FormatError> {
    let malformed = || FormatError::MalformedRecord {
        kind: "symbol",
        line,
    };
    let name = fields.next().ok_or_else(malformed)?;
    let defined = match fields.next() {
        Some("defined") => true,
        Some("undefined") => false,
        _ => return Err(malformed()),
    };
    let value = parse_number(fields.next().ok_or_else(malformed)?, line)?;
    let common_block = match fields.next() {
        None => false,
        Some("common") => true,
        Some(_) => return Err(malformed()),
    };

    Ok(Symbol {
        name: name.to_string(),
        defined,
        value,
        common_block,
    })
}

fn append_payload(
    segments: &mut [Segment],
    bytes: &[u8],
    line: usize,
) -> Result<(), FormatError> {
    let Some(segment) = segments.last_mut() else {
        return Err(FormatError::StrayData(line));
    };
    match &mut segment.data {
        Some(data) => data.extend_from_slice(bytes),
        None => return Err(FormatError::StrayData(line)),
    }
    Ok(())
}

fn parse_number(input: &str, line: usize) -> Result<u64, FormatError> {
    let parsed = if let Some(hex) = input.strip_prefix("0x").or_else(|| input.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else {
        input.parse::<u64>()
    };
    parsed.map_err(|_| FormatError::InvalidNumber {
        value: input.to_string(),
        line,
    })
}
