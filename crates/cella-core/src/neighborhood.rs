//! Fixed neighborhood shapes addressable from rule codes.

use serde::{Deserialize, Serialize};

const MOORE: [(i8, i8); 8] = [
    (-1, 0),
    (1, 0),
    (0, -1),
    (0, 1),
    (-1, -1),
    (1, -1),
    (-1, 1),
    (1, 1),
];

/// Neighborhood read by a rule's operands.
///
/// The shapes nest: each one is a prefix of the full Moore ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Neighborhood {
    /// No neighbors; every count operand evaluates to zero.
    None,
    /// Left and right.
    Horizontal,
    /// Left, right, up and down.
    VonNeumann,
    /// All eight surrounding cells.
    Moore,
}

impl Neighborhood {
    /// Rule-code symbols in table order.
    pub const SYMBOLS: &'static str = "0248";

    /// Look up the shape for a rule-code symbol.
    #[must_use]
    pub fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            '0' => Some(Self::None),
            '2' => Some(Self::Horizontal),
            '4' => Some(Self::VonNeumann),
            '8' => Some(Self::Moore),
            _ => None,
        }
    }

    #[must_use]
    pub const fn symbol(self) -> char {
        match self {
            Self::None => '0',
            Self::Horizontal => '2',
            Self::VonNeumann => '4',
            Self::Moore => '8',
        }
    }

    /// Relative `(dx, dy)` offsets, `dy` growing downwards.
    #[must_use]
    pub fn offsets(self) -> &'static [(i8, i8)] {
        &MOORE[..self.len()]
    }

    #[must_use]
    pub const fn len(self) -> usize {
        match self {
            Self::None => 0,
            Self::Horizontal => 2,
            Self::VonNeumann => 4,
            Self::Moore => 8,
        }
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        matches!(self, Self::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_map_to_offset_lists_of_matching_length() {
        for symbol in Neighborhood::SYMBOLS.chars() {
            let shape = Neighborhood::from_symbol(symbol).expect("known symbol");
            assert_eq!(shape.symbol(), symbol);
            assert_eq!(shape.offsets().len(), symbol.to_digit(10).expect("digit") as usize);
        }
        assert!(Neighborhood::from_symbol('6').is_none());
    }

    #[test]
    fn von_neumann_is_orthogonal_only() {
        let offsets = Neighborhood::VonNeumann.offsets();
        assert!(offsets.iter().all(|&(dx, dy)| (dx == 0) != (dy == 0)));
        assert_eq!(Neighborhood::Horizontal.offsets(), &[(-1, 0), (1, 0)]);
        assert!(Neighborhood::None.is_empty());
    }
}
