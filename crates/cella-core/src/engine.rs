//! Generation stepping over a toroidal grid.

use crate::cell::MAX_COLOR;
use crate::config::CellaConfig;
use crate::dirty::DirtySet;
use crate::grid::{Grid, GridError};
use crate::rule::{EvalContext, InvalidRuleSyntax, RuleSet};
use rand::{RngCore, SeedableRng, rngs::SmallRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

/// Errors raised when building an engine or handing it a new grid.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    InvalidRuleSyntax(#[from] InvalidRuleSyntax),
    #[error("max color {0} is outside 1..=8")]
    InvalidMaxColor(u8),
    #[error("grid dimension {actual} does not match the established dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error(transparent)]
    Grid(#[from] GridError),
}

/// Which cells are evaluated each generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    /// Only cells whose Moore neighborhood changed last generation.
    #[default]
    Tracked,
    /// Every cell, every generation.
    Exhaustive,
}

/// Outcome of a single [`Engine::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSummary {
    /// Generation number the grid now holds.
    pub generation: u64,
    /// Cells whose rules were run.
    pub evaluated: usize,
    /// Cells whose value differs from the previous generation.
    pub changed: usize,
}

/// Check a grid and color limit the way engine construction does, without
/// building anything.
pub fn check_inputs(grid: &Grid, max_color: u8) -> Result<(), EngineError> {
    if !(1..=MAX_COLOR).contains(&max_color) {
        return Err(EngineError::InvalidMaxColor(max_color));
    }
    grid.check_colors(max_color)?;
    Ok(())
}

/// Owns the current grid, its dirty mask and the compiled rules.
#[derive(Debug, Clone)]
pub struct Engine {
    grid: Grid,
    dirty: DirtySet,
    rules: RuleSet,
    max_color: u8,
    generation: u64,
    seed: u64,
    mode: EvaluationMode,
}

impl Engine {
    /// Compile `codes` and take ownership of `grid`.
    ///
    /// Fails on the first code that does not compile, on a `max_color`
    /// outside `1..=8`, or on a cell whose color exceeds `max_color`.
    pub fn initialize<I, S>(grid: Grid, codes: I, max_color: u8) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules = RuleSet::compile(codes)?;
        Self::with_rules(grid, rules, max_color)
    }

    /// Build an engine from an already compiled rule set.
    pub fn with_rules(grid: Grid, rules: RuleSet, max_color: u8) -> Result<Self, EngineError> {
        check_inputs(&grid, max_color)?;
        let dirty = DirtySet::from_grid(&grid);
        debug!(
            size = grid.size(),
            rules = rules.len(),
            max_color,
            dirty = dirty.count(),
            "engine initialised"
        );
        Ok(Self {
            grid,
            dirty,
            rules,
            max_color,
            generation: 0,
            seed: 0,
            mode: EvaluationMode::default(),
        })
    }

    /// Build an engine using the rules, color limit, seed and mode from `config`.
    pub fn from_config(config: &CellaConfig, grid: Grid) -> Result<Self, EngineError> {
        let engine = Self::initialize(grid, &config.rules, config.max_color)?;
        Ok(engine
            .with_seed(config.rng_seed.unwrap_or_default())
            .with_mode(config.evaluation))
    }

    /// Seed for the random action.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: EvaluationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Replace the current grid, recomputing the dirty mask from scratch.
    ///
    /// The dimension is fixed for the engine's lifetime.
    pub fn adopt_grid(&mut self, grid: Grid) -> Result<(), EngineError> {
        if grid.size() != self.grid.size() {
            return Err(EngineError::DimensionMismatch {
                expected: self.grid.size(),
                actual: grid.size(),
            });
        }
        grid.check_colors(self.max_color)?;
        self.dirty = DirtySet::from_grid(&grid);
        self.grid = grid;
        trace!(dirty = self.dirty.count(), "adopted grid");
        Ok(())
    }

    /// Advance one generation.
    ///
    /// Every evaluation reads the pre-step grid; results land in a fresh
    /// successor that replaces it, together with a fresh dirty mask, once
    /// the whole pass is done.
    pub fn step(&mut self) -> StepSummary {
        let size = self.grid.size();
        let ctx = EvalContext::new(self.max_color, self.entropy());
        let exhaustive = self.mode == EvaluationMode::Exhaustive;
        let evaluated = if exhaustive {
            size * size
        } else {
            self.dirty.count()
        };

        let grid = &self.grid;
        let rules = &self.rules;
        let dirty = &self.dirty;
        let mut next = grid.clone();
        let changed: Vec<(usize, usize)> = next
            .cells_mut()
            .par_chunks_mut(size)
            .enumerate()
            .flat_map_iter(|(y, row)| {
                let mask = dirty.row(y);
                let mut changes = Vec::new();
                for (x, slot) in row.iter_mut().enumerate() {
                    if !exhaustive && !mask[x] {
                        continue;
                    }
                    if let Some(value) = rules.evaluate(x, y, grid, &ctx)
                        && value != *slot
                    {
                        *slot = value;
                        changes.push((x, y));
                    }
                }
                changes
            })
            .collect();

        let mut next_dirty = DirtySet::clean(size);
        for &(x, y) in &changed {
            next_dirty.mark_neighborhood(x, y);
        }

        self.grid = next;
        self.dirty = next_dirty;
        self.generation += 1;

        let summary = StepSummary {
            generation: self.generation,
            evaluated,
            changed: changed.len(),
        };
        trace!(?summary, "generation stepped");
        summary
    }

    /// Advance `n` generations, returning the last summary.
    pub fn steps(&mut self, n: usize) -> Option<StepSummary> {
        (0..n).map(|_| self.step()).last()
    }

    fn entropy(&self) -> u64 {
        SmallRng::seed_from_u64(self.seed ^ self.generation.rotate_left(32)).next_u64()
    }

    #[must_use]
    pub fn current_grid(&self) -> &Grid {
        &self.grid
    }

    #[must_use]
    pub fn into_grid(self) -> Grid {
        self.grid
    }

    #[must_use]
    pub fn dirty(&self) -> &DirtySet {
        &self.dirty
    }

    #[must_use]
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    #[must_use]
    pub const fn max_color(&self) -> u8 {
        self.max_color
    }

    /// Generations stepped since construction.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub const fn mode(&self) -> EvaluationMode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellValue;
    use crate::grid::Region;

    fn grid_with(size: usize, live: &[(usize, usize, u8)]) -> Grid {
        let mut grid = Grid::new(size).expect("grid");
        for &(x, y, color) in live {
            *grid.get_mut(x, y).expect("cell") = CellValue::new(color, 0);
        }
        grid
    }

    #[test]
    fn empty_rule_set_leaves_grid_untouched() {
        let grid = grid_with(8, &[(1, 1, 1), (4, 5, 1), (7, 7, 1)]);
        let mut engine =
            Engine::initialize(grid.clone(), Vec::<String>::new(), 1).expect("engine");
        let summary = engine.step();
        assert_eq!(engine.current_grid(), &grid);
        assert_eq!(summary.changed, 0);
        assert_eq!(summary.generation, 1);
        assert!(engine.dirty().is_empty());
    }

    #[test]
    fn quiet_cells_are_never_evaluated() {
        // "Empty cells become color 1" would flood an exhaustive pass; with
        // tracking only the ring around the seed is touched.
        let grid = grid_with(8, &[(4, 4, 1)]);
        let mut engine = Engine::initialize(grid, ["0V0=0A"], 1).expect("engine");
        let summary = engine.step();
        assert_eq!(summary.evaluated, 9);
        assert_eq!(summary.changed, 8);
        assert_eq!(engine.current_grid().live_count(), 9);
        assert_eq!(engine.current_grid().get(0, 0), Some(CellValue::EMPTY));

        let mut exhaustive = Engine::initialize(grid_with(8, &[(4, 4, 1)]), ["0V0=0A"], 1)
            .expect("engine")
            .with_mode(EvaluationMode::Exhaustive);
        exhaustive.step();
        assert_eq!(exhaustive.current_grid().live_count(), 64);
    }

    #[test]
    fn changed_cells_dirty_their_moore_ring() {
        let grid = grid_with(16, &[(8, 8, 1)]);
        let mut engine = Engine::initialize(grid, ["0A0=0B"], 2).expect("engine");
        engine.step();
        assert_eq!(engine.current_grid().get(8, 8), Some(CellValue::new(2, 0)));
        assert_eq!(engine.dirty().count(), 9);
        assert!(engine.dirty().is_dirty(7, 9));

        // Nothing matches color 2, so the next step settles.
        let summary = engine.step();
        assert_eq!(summary.evaluated, 9);
        assert_eq!(summary.changed, 0);
        assert!(engine.dirty().is_empty());
    }

    #[test]
    fn reads_come_from_the_pre_step_grid() {
        // Empty cells next to a live one come alive. Updating in place from
        // left to right would cascade across the whole row.
        let grid = grid_with(6, &[(0, 0, 1)]);
        let mut engine = Engine::initialize(grid, ["2VA>0A"], 1).expect("engine");
        assert_eq!(engine.rules().codes(), vec!["2VA>0A"]);
        engine.step();
        let row: Vec<u8> = (0..6)
            .map(|x| engine.current_grid().get(x, 0).expect("cell").color())
            .collect();
        assert_eq!(row, vec![1, 1, 0, 0, 0, 1]);
        assert_eq!(engine.current_grid().live_count(), 3);
    }

    #[test]
    fn construction_validates_inputs() {
        let grid = grid_with(4, &[(0, 0, 3)]);
        assert!(matches!(
            Engine::initialize(grid.clone(), ["8PL<2V"], 0),
            Err(EngineError::InvalidMaxColor(0))
        ));
        assert!(matches!(
            Engine::initialize(grid.clone(), ["8PL<2V"], 2),
            Err(EngineError::Grid(GridError::ColorOutOfRange { color: 3, .. }))
        ));
        match Engine::initialize(grid, ["8PL<2V", "8PL<2"], 3) {
            Err(EngineError::InvalidRuleSyntax(err)) => assert_eq!(err.index, 1),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn adopt_grid_recomputes_dirty_mask_and_keeps_dimension() {
        let mut engine = Engine::initialize(grid_with(8, &[]), ["8PL<2V"], 1).expect("engine");
        assert!(engine.dirty().is_empty());

        let mut edited = grid_with(8, &[]);
        edited.paste(&Region::from_colors(&[&[1, 1]]), 7, 0);
        engine.adopt_grid(edited).expect("adopt");
        assert_eq!(engine.dirty().count(), 12);

        assert!(matches!(
            engine.adopt_grid(grid_with(4, &[])),
            Err(EngineError::DimensionMismatch {
                expected: 8,
                actual: 4
            })
        ));
    }

    #[test]
    fn random_action_is_reproducible_for_a_seed() {
        let run = |seed| {
            let grid = grid_with(12, &[(3, 3, 1), (8, 2, 1)]);
            let mut engine = Engine::initialize(grid, ["8TL>0R"], 6)
                .expect("engine")
                .with_seed(seed);
            engine.steps(3);
            engine.into_grid()
        };
        assert_eq!(run(5), run(5));
        assert_ne!(run(5), run(6));
    }
}
