//! Six-character rule codes and their evaluation.
//!
//! A rule code reads `[neighborhood][target][left][operator][right][action]`:
//!
//! ```text
//! 8 P L < 2 V
//! | | | | | `- action: set color 0 (empty)
//! | | | | `--- right operand: the literal 2
//! | | | `----- operator: less than
//! | | `------- left operand: number of non-empty neighbors
//! | `--------- target: any non-empty cell
//! `----------- neighborhood: the eight surrounding cells
//! ```
//!
//! Codes are compiled once into the enums below; evaluation never touches the
//! alphabets again.

use crate::cell::{CellValue, MARK_BITS};
use crate::grid::Grid;
use crate::neighborhood::Neighborhood;
use rand::{Rng, SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of every rule code, in characters.
pub const RULE_CODE_LEN: usize = 6;

const COLOR_SYMBOLS: &str = "VABCDEFGH";
const NOT_COLOR_TARGET_SYMBOLS: &str = "Pabcdefgh";
const MARK_SYMBOLS: &str = "wxyz";
const UNMARK_SYMBOLS: &str = "WXYZ";
const ANY_CELL_SYMBOL: char = 'T';
const LITERAL_SYMBOLS: &str = "012345678";
const COLOR_COUNT_SYMBOLS: &str = "MABCDEFGH";
const NOT_COLOR_COUNT_SYMBOLS: &str = "Labcdefgh";
const SPECIAL_OPERAND_SYMBOLS: &str = "IJKNOPQRS";
const OPERATOR_SYMBOLS: &str = "MN><=!";
const SPECIAL_ACTION_SYMBOLS: &str = "IJKLMNOoPR";

const SPECIAL_OPERANDS: [Operand; 9] = [
    Operand::SameAsSelf,
    Operand::DifferentFromSelf,
    Operand::DistinctColors,
    Operand::InSet(ColorSet::OneTwo),
    Operand::InSet(ColorSet::ThreeFour),
    Operand::InSet(ColorSet::OneThree),
    Operand::InSet(ColorSet::TwoThree),
    Operand::InSet(ColorSet::OneToThree),
    Operand::InSet(ColorSet::OneToFour),
];

const SPECIAL_ACTIONS: [Action; 10] = [
    Action::NextColor,
    Action::PreviousColor,
    Action::CycleNext,
    Action::CyclePrevious,
    Action::CycleNextColor,
    Action::CyclePreviousColor,
    Action::Cancel,
    Action::EraseMarks,
    Action::FillMajority,
    Action::Random,
];

fn index_in(alphabet: &str, symbol: char) -> Option<u8> {
    alphabet.find(symbol).map(|idx| idx as u8)
}

/// Position of a field inside a rule code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleField {
    Neighborhood,
    Target,
    LeftOperand,
    Operator,
    RightOperand,
    Action,
}

impl RuleField {
    /// Fields in code order.
    pub const ALL: [Self; RULE_CODE_LEN] = [
        Self::Neighborhood,
        Self::Target,
        Self::LeftOperand,
        Self::Operator,
        Self::RightOperand,
        Self::Action,
    ];

    /// Every symbol accepted at this position, assembled from the decoding tables.
    #[must_use]
    pub fn alphabet(self) -> String {
        match self {
            Self::Neighborhood => Neighborhood::SYMBOLS.to_owned(),
            Self::Target => {
                let mut symbols = [
                    COLOR_SYMBOLS,
                    NOT_COLOR_TARGET_SYMBOLS,
                    MARK_SYMBOLS,
                    UNMARK_SYMBOLS,
                ]
                .concat();
                symbols.push(ANY_CELL_SYMBOL);
                symbols
            }
            Self::LeftOperand | Self::RightOperand => [
                LITERAL_SYMBOLS,
                COLOR_COUNT_SYMBOLS,
                NOT_COLOR_COUNT_SYMBOLS,
                SPECIAL_OPERAND_SYMBOLS,
            ]
            .concat(),
            Self::Operator => OPERATOR_SYMBOLS.to_owned(),
            Self::Action => [
                COLOR_SYMBOLS,
                MARK_SYMBOLS,
                UNMARK_SYMBOLS,
                SPECIAL_ACTION_SYMBOLS,
            ]
            .concat(),
        }
    }
}

impl fmt::Display for RuleField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Neighborhood => "neighborhood",
            Self::Target => "target",
            Self::LeftOperand => "left operand",
            Self::Operator => "operator",
            Self::RightOperand => "right operand",
            Self::Action => "action",
        })
    }
}

/// A rule code that could not be compiled.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuleSyntaxError {
    #[error("rule code `{code}` is {len} characters long, expected 6")]
    Length { code: String, len: usize },
    #[error("rule code `{code}`: invalid {field} `{character}` at position {position}")]
    Symbol {
        code: String,
        position: usize,
        character: char,
        field: RuleField,
    },
}

impl RuleSyntaxError {
    /// Zero-based position of the offending character, if the length was right.
    #[must_use]
    pub fn position(&self) -> Option<usize> {
        match self {
            Self::Length { .. } => None,
            Self::Symbol { position, .. } => Some(*position),
        }
    }
}

/// A rule in an ordered list failed to compile.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid rule #{index}: {source}")]
pub struct InvalidRuleSyntax {
    /// Index of the failing code in the submitted list.
    pub index: usize,
    #[source]
    pub source: RuleSyntaxError,
}

/// Predicate over the evaluated cell's own state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    AnyCell,
    ColorEquals(u8),
    /// Non-empty and not of the given color; `ColorNotEquals(0)` means "any
    /// non-empty cell".
    ColorNotEquals(u8),
    MarkSet(u8),
    MarkNotSet(u8),
}

impl Target {
    #[must_use]
    pub fn from_symbol(symbol: char) -> Option<Self> {
        if symbol == ANY_CELL_SYMBOL {
            return Some(Self::AnyCell);
        }
        index_in(COLOR_SYMBOLS, symbol)
            .map(Self::ColorEquals)
            .or_else(|| index_in(NOT_COLOR_TARGET_SYMBOLS, symbol).map(Self::ColorNotEquals))
            .or_else(|| index_in(MARK_SYMBOLS, symbol).map(Self::MarkSet))
            .or_else(|| index_in(UNMARK_SYMBOLS, symbol).map(Self::MarkNotSet))
    }

    #[must_use]
    pub const fn matches(self, cell: CellValue) -> bool {
        match self {
            Self::AnyCell => true,
            Self::ColorEquals(color) => cell.color() == color,
            Self::ColorNotEquals(color) => !cell.is_empty() && cell.color() != color,
            Self::MarkSet(bit) => cell.has_mark(bit),
            Self::MarkNotSet(bit) => !cell.has_mark(bit),
        }
    }
}

/// Fixed color groups countable by a single operand symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorSet {
    OneTwo,
    ThreeFour,
    OneThree,
    TwoThree,
    OneToThree,
    OneToFour,
}

impl ColorSet {
    #[must_use]
    pub const fn contains(self, color: u8) -> bool {
        match self {
            Self::OneTwo => matches!(color, 1 | 2),
            Self::ThreeFour => matches!(color, 3 | 4),
            Self::OneThree => matches!(color, 1 | 3),
            Self::TwoThree => matches!(color, 2 | 3),
            Self::OneToThree => matches!(color, 1..=3),
            Self::OneToFour => matches!(color, 1..=4),
        }
    }
}

/// One side of a rule's comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    Literal(u8),
    /// Neighbors of exactly this color (0 counts empty neighbors).
    ColorCount(u8),
    /// Non-empty neighbors not of this color.
    NotColorCount(u8),
    SameAsSelf,
    DifferentFromSelf,
    /// Distinct non-empty colors among the neighbors.
    DistinctColors,
    InSet(ColorSet),
}

impl Operand {
    #[must_use]
    pub fn from_symbol(symbol: char) -> Option<Self> {
        index_in(LITERAL_SYMBOLS, symbol)
            .map(Self::Literal)
            .or_else(|| index_in(COLOR_COUNT_SYMBOLS, symbol).map(Self::ColorCount))
            .or_else(|| index_in(NOT_COLOR_COUNT_SYMBOLS, symbol).map(Self::NotColorCount))
            .or_else(|| {
                index_in(SPECIAL_OPERAND_SYMBOLS, symbol).map(|idx| SPECIAL_OPERANDS[idx as usize])
            })
    }

    fn resolve(self, cell: CellValue, neighbors: &[CellValue]) -> u32 {
        fn count(neighbors: &[CellValue], pred: impl Fn(u8) -> bool) -> u32 {
            neighbors.iter().filter(|n| pred(n.color())).count() as u32
        }
        let own = cell.color();
        match self {
            Self::Literal(value) => u32::from(value),
            Self::ColorCount(color) => count(neighbors, |c| c == color),
            Self::NotColorCount(color) => count(neighbors, |c| c != 0 && c != color),
            Self::SameAsSelf => count(neighbors, |c| c == own),
            Self::DifferentFromSelf => count(neighbors, |c| c != own),
            Self::DistinctColors => {
                let seen = neighbors
                    .iter()
                    .filter(|n| !n.is_empty())
                    .fold(0u16, |seen, n| seen | (1 << n.color()));
                seen.count_ones()
            }
            Self::InSet(set) => count(neighbors, |c| set.contains(c)),
        }
    }
}

/// Comparison applied to `(left, right)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    DivisibleBy,
    NotDivisibleBy,
    GreaterThan,
    LessThan,
    Equal,
    NotEqual,
}

impl Operator {
    #[must_use]
    pub fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            'M' => Some(Self::DivisibleBy),
            'N' => Some(Self::NotDivisibleBy),
            '>' => Some(Self::GreaterThan),
            '<' => Some(Self::LessThan),
            '=' => Some(Self::Equal),
            '!' => Some(Self::NotEqual),
            _ => None,
        }
    }

    /// Nothing is divisible by zero, so `DivisibleBy` with a zero right-hand
    /// side is false and `NotDivisibleBy` is true.
    #[must_use]
    pub fn apply(self, left: u32, right: u32) -> bool {
        match self {
            Self::DivisibleBy => left.checked_rem(right) == Some(0),
            Self::NotDivisibleBy => left.checked_rem(right) != Some(0),
            Self::GreaterThan => left > right,
            Self::LessThan => left < right,
            Self::Equal => left == right,
            Self::NotEqual => left != right,
        }
    }
}

/// What a firing rule does to its cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Set the color, clamped to the configured maximum.
    SetColor(u8),
    SetMark(u8),
    ClearMark(u8),
    /// One color up, stopping at the maximum.
    NextColor,
    /// One color down, stopping at empty.
    PreviousColor,
    /// Step through `0..=max`, wrapping to empty.
    CycleNext,
    CyclePrevious,
    /// Step through `1..=max`, never landing on empty.
    CycleNextColor,
    CyclePreviousColor,
    /// Keep the generation-start value and stop looking at later rules.
    Cancel,
    EraseMarks,
    /// Adopt the most common non-empty neighbor color.
    FillMajority,
    /// A uniform color in `1..=max`.
    Random,
}

impl Action {
    #[must_use]
    pub fn from_symbol(symbol: char) -> Option<Self> {
        index_in(COLOR_SYMBOLS, symbol)
            .map(Self::SetColor)
            .or_else(|| index_in(MARK_SYMBOLS, symbol).map(Self::SetMark))
            .or_else(|| index_in(UNMARK_SYMBOLS, symbol).map(Self::ClearMark))
            .or_else(|| {
                index_in(SPECIAL_ACTION_SYMBOLS, symbol).map(|idx| SPECIAL_ACTIONS[idx as usize])
            })
    }

    fn apply(
        self,
        cell: CellValue,
        neighbors: &[CellValue],
        (x, y): (usize, usize),
        ctx: &EvalContext,
    ) -> Option<CellValue> {
        let color = cell.color();
        let max = ctx.max_color.max(1);
        let next = match self {
            Self::SetColor(target) => cell.with_color(target.min(max)),
            Self::SetMark(bit) => cell.with_mark(cell.mark() | (1 << bit)),
            Self::ClearMark(bit) => cell.with_mark(cell.mark() & !(1 << bit)),
            Self::NextColor => cell.with_color((color + 1).min(max)),
            Self::PreviousColor => cell.with_color(color.saturating_sub(1)),
            Self::CycleNext => cell.with_color((color + 1) % (max + 1)),
            Self::CyclePrevious => cell.with_color(if color == 0 { max } else { color - 1 }),
            Self::CycleNextColor => cell.with_color(color % max + 1),
            Self::CyclePreviousColor => cell.with_color(if color <= 1 { max } else { color - 1 }),
            Self::Cancel => cell,
            Self::EraseMarks => cell.with_mark(0),
            Self::FillMajority => cell.with_color(majority_color(neighbors)?),
            Self::Random => cell.with_color(ctx.cell_rng(x, y).random_range(1..=max)),
        };
        Some(next)
    }
}

/// Most frequent non-empty color, lowest color on ties; `None` when every
/// neighbor is empty.
fn majority_color(neighbors: &[CellValue]) -> Option<u8> {
    let mut counts = [0u8; 16];
    for neighbor in neighbors {
        counts[neighbor.color() as usize] += 1;
    }
    let mut best: Option<(u8, u8)> = None;
    for (color, &count) in counts.iter().enumerate().skip(1) {
        if count > 0 && best.is_none_or(|(_, top)| count > top) {
            best = Some((color as u8, count));
        }
    }
    best.map(|(color, _)| color)
}

/// Per-generation inputs shared by every evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalContext {
    pub max_color: u8,
    /// Seed material for [`Action::Random`]; the same entropy and coordinate
    /// always yield the same color.
    pub entropy: u64,
}

impl EvalContext {
    #[must_use]
    pub const fn new(max_color: u8, entropy: u64) -> Self {
        Self { max_color, entropy }
    }

    fn cell_rng(&self, x: usize, y: usize) -> SmallRng {
        let key = ((y as u64) << 32) | x as u64;
        SmallRng::seed_from_u64(self.entropy ^ key.wrapping_mul(0x9E37_79B9_7F4A_7C15))
    }
}

/// A compiled rule code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rule {
    code: String,
    pub neighborhood: Neighborhood,
    pub target: Target,
    pub left: Operand,
    pub operator: Operator,
    pub right: Operand,
    pub action: Action,
}

impl Rule {
    /// Compile a six-character code, stopping at the first invalid field.
    pub fn compile(code: &str) -> Result<Self, RuleSyntaxError> {
        let chars: Vec<char> = code.chars().collect();
        let symbols: [char; RULE_CODE_LEN] =
            chars
                .as_slice()
                .try_into()
                .map_err(|_| RuleSyntaxError::Length {
                    code: code.to_owned(),
                    len: chars.len(),
                })?;
        let invalid = |position: usize| RuleSyntaxError::Symbol {
            code: code.to_owned(),
            position,
            character: symbols[position],
            field: RuleField::ALL[position],
        };

        let neighborhood = Neighborhood::from_symbol(symbols[0]).ok_or_else(|| invalid(0))?;
        let target = Target::from_symbol(symbols[1]).ok_or_else(|| invalid(1))?;
        let left = Operand::from_symbol(symbols[2]).ok_or_else(|| invalid(2))?;
        let operator = Operator::from_symbol(symbols[3]).ok_or_else(|| invalid(3))?;
        let right = Operand::from_symbol(symbols[4]).ok_or_else(|| invalid(4))?;
        let action = Action::from_symbol(symbols[5]).ok_or_else(|| invalid(5))?;

        Ok(Self {
            code: code.to_owned(),
            neighborhood,
            target,
            left,
            operator,
            right,
            action,
        })
    }

    /// The source code this rule was compiled from.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Evaluate the rule for the cell at `(x, y)`.
    ///
    /// Returns the new cell value when the target and the comparison both
    /// hold, `None` when the rule does not fire.
    #[must_use]
    pub fn evaluate(&self, x: usize, y: usize, grid: &Grid, ctx: &EvalContext) -> Option<CellValue> {
        let cell = grid.get(x, y)?;
        if !self.target.matches(cell) {
            return None;
        }

        let offsets = self.neighborhood.offsets();
        let mut buffer = [CellValue::EMPTY; 8];
        for (slot, &offset) in buffer.iter_mut().zip(offsets) {
            *slot = grid.neighbor(x, y, offset);
        }
        let neighbors = &buffer[..offsets.len()];

        let left = self.left.resolve(cell, neighbors);
        let right = self.right.resolve(cell, neighbors);
        if !self.operator.apply(left, right) {
            return None;
        }
        self.action.apply(cell, neighbors, (x, y), ctx)
    }
}

impl FromStr for Rule {
    type Err = RuleSyntaxError;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        Self::compile(code)
    }
}

impl TryFrom<String> for Rule {
    type Error = RuleSyntaxError;

    fn try_from(code: String) -> Result<Self, Self::Error> {
        Self::compile(&code)
    }
}

impl From<Rule> for String {
    fn from(rule: Rule) -> Self {
        rule.code
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code)
    }
}

/// Ordered rules; the first one that fires for a cell decides its value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    #[must_use]
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Compile codes in order, reporting the first failure with its index.
    pub fn compile<I, S>(codes: I) -> Result<Self, InvalidRuleSyntax>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        codes
            .into_iter()
            .enumerate()
            .map(|(index, code)| {
                Rule::compile(code.as_ref()).map_err(|source| InvalidRuleSyntax { index, source })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    #[must_use]
    pub fn codes(&self) -> Vec<&str> {
        self.rules.iter().map(Rule::code).collect()
    }

    /// First-match-wins evaluation of `(x, y)`; `None` leaves the cell as it was.
    #[must_use]
    pub fn evaluate(&self, x: usize, y: usize, grid: &Grid, ctx: &EvalContext) -> Option<CellValue> {
        self.rules
            .iter()
            .find_map(|rule| rule.evaluate(x, y, grid, ctx))
    }
}

// Mark bits addressable by the `w..z` / `W..Z` symbols.
const _: () = assert!(MARK_SYMBOLS.len() == MARK_BITS as usize);
