//! Packed per-cell state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest color index a cell may carry under any configuration.
pub const MAX_COLOR: u8 = 8;
/// Number of auxiliary mark bits stored alongside the color.
pub const MARK_BITS: u8 = 4;

const COLOR_MASK: u8 = 0x0F;

/// A single cell packed as `mark:4 | color:4`.
///
/// Color `0` is the empty state. The mark nibble is an independent flag set
/// that rules can use to remember something across generations.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct CellValue(u8);

impl CellValue {
    /// The empty, unmarked cell.
    pub const EMPTY: Self = Self(0);

    /// Pack a color and a mark nibble. Bits outside each nibble are discarded.
    #[must_use]
    pub const fn new(color: u8, mark: u8) -> Self {
        Self(((mark & COLOR_MASK) << 4) | (color & COLOR_MASK))
    }

    /// Wrap a raw byte as produced by [`CellValue::raw`].
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn color(self) -> u8 {
        self.0 & COLOR_MASK
    }

    #[must_use]
    pub const fn mark(self) -> u8 {
        self.0 >> 4
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.color() == 0
    }

    /// Whether mark bit `bit` (0..4) is set.
    #[must_use]
    pub const fn has_mark(self, bit: u8) -> bool {
        self.mark() & (1 << bit) != 0
    }

    /// Same mark bits, different color.
    #[must_use]
    pub const fn with_color(self, color: u8) -> Self {
        Self::new(color, self.mark())
    }

    /// Same color, different mark bits.
    #[must_use]
    pub const fn with_mark(self, mark: u8) -> Self {
        Self::new(self.color(), mark)
    }
}

impl From<u8> for CellValue {
    fn from(raw: u8) -> Self {
        Self::from_raw(raw)
    }
}

impl From<CellValue> for u8 {
    fn from(cell: CellValue) -> Self {
        cell.raw()
    }
}

impl fmt::Debug for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellValue")
            .field("color", &self.color())
            .field("mark", &format_args!("{:#06b}", self.mark()))
            .finish()
    }
}
