//! Tracking of cells that must be re-evaluated next generation.

use crate::grid::{Grid, wrap};

/// Boolean N x N mask of cells whose rules must run this generation.
///
/// A cell is dirty when anything in its Moore neighborhood (itself included)
/// changed during the previous generation, regardless of how far the active
/// rules actually look.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirtySet {
    size: usize,
    cells: Vec<bool>,
    count: usize,
}

impl DirtySet {
    /// A mask with nothing marked.
    #[must_use]
    pub fn clean(size: usize) -> Self {
        Self {
            size,
            cells: vec![false; size * size],
            count: 0,
        }
    }

    /// Exhaustive initial mask: every non-empty cell plus its Moore ring.
    #[must_use]
    pub fn from_grid(grid: &Grid) -> Self {
        let size = grid.size();
        let mut dirty = Self::clean(size);
        for (idx, cell) in grid.cells().iter().enumerate() {
            if !cell.is_empty() {
                dirty.mark_neighborhood(idx % size, idx / size);
            }
        }
        dirty
    }

    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Number of marked cells.
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    #[must_use]
    pub fn is_dirty(&self, x: usize, y: usize) -> bool {
        self.cells[y * self.size + x]
    }

    /// Row `y` of the mask.
    #[must_use]
    pub fn row(&self, y: usize) -> &[bool] {
        &self.cells[y * self.size..(y + 1) * self.size]
    }

    fn mark(&mut self, x: usize, y: usize) {
        let slot = &mut self.cells[y * self.size + x];
        if !*slot {
            *slot = true;
            self.count += 1;
        }
    }

    /// Mark `(x, y)` and its eight neighbors, wrapping at the edges.
    pub fn mark_neighborhood(&mut self, x: usize, y: usize) {
        for dy in -1..=1isize {
            for dx in -1..=1isize {
                let nx = wrap(x as isize + dx, self.size);
                let ny = wrap(y as isize + dy, self.size);
                self.mark(nx, ny);
            }
        }
    }

    /// Iterate over marked coordinates in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let size = self.size;
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, dirty)| **dirty)
            .map(move |(idx, _)| (idx % size, idx / size))
    }
}
