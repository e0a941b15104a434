//! Bit-packed relation records
//!
//! Consists-of edges are packed into one `u64` each and appears-in edges
//! into one `u32` each, so hundreds of thousands of edges fit in a few
//! megabytes of flat arena instead of an object per edge.
//!
//! ```text
//! consists-of (u64)
//!  bits  0-11  quantity
//!  bits 12-31  item index
//!  bits 32-43  color index
//!  bit     44  extra
//!  bit     45  alternate
//!  bits 46-51  alternate id
//!  bit     52  counterpart
//!  bits 53-63  reserved
//!
//! appears-in (u32)
//!  bits  0-11  low  (color index in a group header, quantity in an entry)
//!  bits 12-31  high (entry count in a group header, item index in an entry)
//! ```

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

pub const QUANTITY_BITS: u32 = 12;
pub const ITEM_INDEX_BITS: u32 = 20;
pub const COLOR_INDEX_BITS: u32 = 12;
pub const ALT_ID_BITS: u32 = 6;

pub const MAX_QUANTITY: u32 = (1 << QUANTITY_BITS) - 1;
pub const MAX_ITEM_INDEX: u32 = (1 << ITEM_INDEX_BITS) - 1;
pub const MAX_COLOR_INDEX: u32 = (1 << COLOR_INDEX_BITS) - 1;
pub const MAX_ALT_ID: u32 = (1 << ALT_ID_BITS) - 1;

const QTY_SHIFT: u32 = 0;
const INDEX_SHIFT: u32 = 12;
const COLOR_SHIFT: u32 = 32;
const EXTRA_SHIFT: u32 = 44;
const ALT_SHIFT: u32 = 45;
const ALT_ID_SHIFT: u32 = 46;
const CPART_SHIFT: u32 = 52;
const RESERVED_MASK: u64 = !((1u64 << 53) - 1);

/// Decoded consists-of edge
///
/// `item` and `color` are dense indices into the current catalog generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsistsOf {
    pub quantity: u16,
    pub item: u32,
    pub color: u32,
    pub extra: bool,
    pub alternate: bool,
    pub alt_id: u8,
    pub counterpart: bool,
}

impl ConsistsOf {
    pub fn new(quantity: u16, item: u32, color: u32) -> Self {
        ConsistsOf {
            quantity,
            item,
            color,
            extra: false,
            alternate: false,
            alt_id: 0,
            counterpart: false,
        }
    }
}

/// One packed consists-of edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ConsistsOfRecord(u64);

impl ConsistsOfRecord {
    /// Pack an edge, rejecting any field that does not fit its bit width
    pub fn encode(entry: &ConsistsOf) -> Result<Self> {
        check("quantity", entry.quantity as u64, MAX_QUANTITY)?;
        check("item_index", entry.item as u64, MAX_ITEM_INDEX)?;
        check("color_index", entry.color as u64, MAX_COLOR_INDEX)?;
        check("alt_id", entry.alt_id as u64, MAX_ALT_ID)?;

        let bits = (entry.quantity as u64) << QTY_SHIFT
            | (entry.item as u64) << INDEX_SHIFT
            | (entry.color as u64) << COLOR_SHIFT
            | (entry.extra as u64) << EXTRA_SHIFT
            | (entry.alternate as u64) << ALT_SHIFT
            | (entry.alt_id as u64) << ALT_ID_SHIFT
            | (entry.counterpart as u64) << CPART_SHIFT;

        Ok(ConsistsOfRecord(bits))
    }

    pub fn decode(self) -> ConsistsOf {
        let bits = self.0;
        ConsistsOf {
            quantity: field(bits, QTY_SHIFT, QUANTITY_BITS) as u16,
            item: field(bits, INDEX_SHIFT, ITEM_INDEX_BITS) as u32,
            color: field(bits, COLOR_SHIFT, COLOR_INDEX_BITS) as u32,
            extra: field(bits, EXTRA_SHIFT, 1) != 0,
            alternate: field(bits, ALT_SHIFT, 1) != 0,
            alt_id: field(bits, ALT_ID_SHIFT, ALT_ID_BITS) as u8,
            counterpart: field(bits, CPART_SHIFT, 1) != 0,
        }
    }

    pub fn from_bits(bits: u64) -> Self {
        ConsistsOfRecord(bits)
    }

    pub fn bits(self) -> u64 {
        self.0
    }

    /// Reserved bits must be zero in any record written by this crate
    pub fn has_reserved_bits(self) -> bool {
        self.0 & RESERVED_MASK != 0
    }
}

/// One packed appears-in word (either a color group header or an entry)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct AppearsInRecord(u32);

impl AppearsInRecord {
    /// Group header: `count` entries follow for `color` (dense index)
    pub fn header(color: u32, count: u32) -> Result<Self> {
        check("color_index", color as u64, MAX_COLOR_INDEX)?;
        check("entry_count", count as u64, MAX_ITEM_INDEX)?;
        Ok(Self::pack(color, count))
    }

    /// Entry: `item` (dense index) uses the part `quantity` times
    ///
    /// Quantities above the 12-bit maximum saturate, the value is
    /// informational only.
    pub fn entry(quantity: u32, item: u32) -> Result<Self> {
        check("item_index", item as u64, MAX_ITEM_INDEX)?;
        Ok(Self::pack(quantity.min(MAX_QUANTITY), item))
    }

    fn pack(low: u32, high: u32) -> Self {
        AppearsInRecord(low | high << QUANTITY_BITS)
    }

    pub fn low(self) -> u32 {
        self.0 & MAX_QUANTITY
    }

    pub fn high(self) -> u32 {
        self.0 >> QUANTITY_BITS
    }

    pub fn from_bits(bits: u32) -> Self {
        AppearsInRecord(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

/// Decoded appears-in entry (dense indices)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AppearsIn {
    pub color: u32,
    pub quantity: u16,
    pub item: u32,
}

/// Walk a grouped appears-in span
///
/// Returns `None` if a group header claims more entries than the span holds.
pub fn decode_appears_in(words: &[u32], color: Option<u32>) -> Option<Vec<AppearsIn>> {
    let mut out = Vec::new();
    let mut pos = 0;

    while pos < words.len() {
        let header = AppearsInRecord::from_bits(words[pos]);
        let group_color = header.low();
        let count = header.high() as usize;
        pos += 1;

        let end = pos.checked_add(count)?;
        if end > words.len() {
            return None;
        }

        if color.map_or(true, |c| c == group_color) {
            out.extend(words[pos..end].iter().map(|&w| {
                let rec = AppearsInRecord::from_bits(w);
                AppearsIn {
                    color: group_color,
                    quantity: rec.low() as u16,
                    item: rec.high(),
                }
            }));
        }
        pos = end;
    }

    Some(out)
}

fn field(bits: u64, shift: u32, width: u32) -> u64 {
    (bits >> shift) & ((1u64 << width) - 1)
}

fn check(field: &'static str, value: u64, max: u32) -> Result<()> {
    if value > max as u64 {
        return Err(EngineError::PackedFieldOverflow {
            field,
            value,
            max: max as u64,
        });
    }
    Ok(())
}
