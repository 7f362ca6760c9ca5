//! Core types for Cella: packed cells, the toroidal grid, the six-character
//! rule language and the generation engine.

pub mod cell;
pub mod config;
pub mod dirty;
pub mod engine;
pub mod grid;
pub mod neighborhood;
pub mod rule;

pub use cell::{CellValue, MARK_BITS, MAX_COLOR};
pub use config::{CONWAY_RULES, CellaConfig, ConfigError};
pub use dirty::DirtySet;
pub use engine::{Engine, EngineError, EvaluationMode, StepSummary, check_inputs};
pub use grid::{Grid, GridError, Region};
pub use neighborhood::Neighborhood;
pub use rule::{
    Action, ColorSet, EvalContext, InvalidRuleSyntax, Operand, Operator, RULE_CODE_LEN, Rule,
    RuleField, RuleSet, RuleSyntaxError, Target,
};
