//! Square toroidal grid of packed cells.

use crate::cell::CellValue;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when building or checking a grid.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GridError {
    #[error("grid dimension must be non-zero")]
    Empty,
    #[error("grid is not square: expected {expected} cells per row, row {row} has {actual}")]
    NotSquare {
        expected: usize,
        row: usize,
        actual: usize,
    },
    #[error("grid has {actual} cells, expected {expected} for its dimension")]
    CellCount { expected: usize, actual: usize },
    #[error("cell ({x}, {y}) has color {color}, above the configured maximum {max_color}")]
    ColorOutOfRange {
        x: usize,
        y: usize,
        color: u8,
        max_color: u8,
    },
}

/// N x N torus of [`CellValue`]s stored row-major (`y * N + x`).
///
/// All neighbor arithmetic wraps in both axes; there is no edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawGrid", into = "RawGrid")]
pub struct Grid {
    size: usize,
    cells: Vec<CellValue>,
}

#[derive(Serialize, Deserialize)]
struct RawGrid {
    size: usize,
    cells: Vec<u8>,
}

impl TryFrom<RawGrid> for Grid {
    type Error = GridError;

    fn try_from(raw: RawGrid) -> Result<Self, Self::Error> {
        Grid::from_cells(
            raw.size,
            raw.cells.into_iter().map(CellValue::from_raw).collect(),
        )
    }
}

impl From<Grid> for RawGrid {
    fn from(grid: Grid) -> Self {
        Self {
            size: grid.size,
            cells: grid.cells.into_iter().map(CellValue::raw).collect(),
        }
    }
}

/// Wrap a signed coordinate onto `0..size`.
#[inline]
pub(crate) fn wrap(coord: isize, size: usize) -> usize {
    coord.rem_euclid(size as isize) as usize
}

impl Grid {
    /// An all-empty grid of dimension `size`.
    pub fn new(size: usize) -> Result<Self, GridError> {
        if size == 0 {
            return Err(GridError::Empty);
        }
        Ok(Self {
            size,
            cells: vec![CellValue::EMPTY; size * size],
        })
    }

    /// Build a grid from row-major cells.
    pub fn from_cells(size: usize, cells: Vec<CellValue>) -> Result<Self, GridError> {
        if size == 0 {
            return Err(GridError::Empty);
        }
        if cells.len() != size * size {
            return Err(GridError::CellCount {
                expected: size * size,
                actual: cells.len(),
            });
        }
        Ok(Self { size, cells })
    }

    /// Build a grid from `rows[y][x]` raw bytes.
    pub fn from_rows(rows: &[Vec<u8>]) -> Result<Self, GridError> {
        let size = rows.len();
        if size == 0 {
            return Err(GridError::Empty);
        }
        let mut cells = Vec::with_capacity(size * size);
        for (row, values) in rows.iter().enumerate() {
            if values.len() != size {
                return Err(GridError::NotSquare {
                    expected: size,
                    row,
                    actual: values.len(),
                });
            }
            cells.extend(values.iter().copied().map(CellValue::from_raw));
        }
        Ok(Self { size, cells })
    }

    /// Export as `rows[y][x]` raw bytes.
    #[must_use]
    pub fn to_rows(&self) -> Vec<Vec<u8>> {
        self.cells
            .chunks(self.size)
            .map(|row| row.iter().map(|cell| cell.raw()).collect())
            .collect()
    }

    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn cells(&self) -> &[CellValue] {
        &self.cells
    }

    #[must_use]
    pub fn cells_mut(&mut self) -> &mut [CellValue] {
        &mut self.cells
    }

    #[inline]
    pub(crate) fn offset(&self, x: usize, y: usize) -> usize {
        y * self.size + x
    }

    pub fn get(&self, x: usize, y: usize) -> Option<CellValue> {
        if x < self.size && y < self.size {
            Some(self.cells[self.offset(x, y)])
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, x: usize, y: usize) -> Option<&mut CellValue> {
        if x < self.size && y < self.size {
            let idx = self.offset(x, y);
            Some(&mut self.cells[idx])
        } else {
            None
        }
    }

    /// Set a cell addressed with toroidal coordinates.
    pub fn set_wrapped(&mut self, x: isize, y: isize, cell: CellValue) {
        let idx = self.offset(wrap(x, self.size), wrap(y, self.size));
        self.cells[idx] = cell;
    }

    /// Read a cell addressed with toroidal coordinates; any `isize` is valid.
    #[inline]
    #[must_use]
    pub fn get_wrapped(&self, x: isize, y: isize) -> CellValue {
        self.cells[self.offset(wrap(x, self.size), wrap(y, self.size))]
    }

    /// Read the cell at `(x + dx, y + dy)` on the torus.
    #[inline]
    #[must_use]
    pub fn neighbor(&self, x: usize, y: usize, (dx, dy): (i8, i8)) -> CellValue {
        self.get_wrapped(x as isize + dx as isize, y as isize + dy as isize)
    }

    /// Fill each cell independently: empty with probability `1 - density`,
    /// otherwise a uniform color in `1..=max_color`.
    pub fn randomize<R: Rng + ?Sized>(&mut self, rng: &mut R, density: f32, max_color: u8) {
        let density = f64::from(density.clamp(0.0, 1.0));
        let max_color = max_color.max(1);
        for cell in &mut self.cells {
            *cell = if rng.random_bool(density) {
                CellValue::new(rng.random_range(1..=max_color), 0)
            } else {
                CellValue::EMPTY
            };
        }
    }

    /// Check every color against `max_color`, reporting the first offender.
    pub fn check_colors(&self, max_color: u8) -> Result<(), GridError> {
        match self
            .cells
            .iter()
            .position(|cell| cell.color() > max_color)
        {
            Some(idx) => Err(GridError::ColorOutOfRange {
                x: idx % self.size,
                y: idx / self.size,
                color: self.cells[idx].color(),
                max_color,
            }),
            None => Ok(()),
        }
    }

    /// Number of cells per color; index 0 counts empty cells.
    #[must_use]
    pub fn population(&self) -> [usize; 16] {
        let mut counts = [0usize; 16];
        for cell in &self.cells {
            counts[cell.color() as usize] += 1;
        }
        counts
    }

    /// Number of non-empty cells.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.cells.iter().filter(|cell| !cell.is_empty()).count()
    }

    /// Copy a `width` x `height` window starting at `(x, y)`, wrapping past
    /// the edges.
    #[must_use]
    pub fn region(&self, x: isize, y: isize, width: usize, height: usize) -> Region {
        let mut cells = Vec::with_capacity(width * height);
        for j in 0..height {
            for i in 0..width {
                cells.push(self.get_wrapped(x + i as isize, y + j as isize));
            }
        }
        Region {
            width,
            height,
            cells,
        }
    }

    /// Stamp `region` with its upper-left corner at `(x, y)`, wrapping past
    /// the edges. Regions larger than the grid overwrite themselves.
    pub fn paste(&mut self, region: &Region, x: isize, y: isize) {
        for j in 0..region.height {
            for i in 0..region.width {
                self.set_wrapped(
                    x + i as isize,
                    y + j as isize,
                    region.cells[j * region.width + i],
                );
            }
        }
    }
}

/// Rectangular block of cells lifted out of (or destined for) a [`Grid`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub width: usize,
    pub height: usize,
    pub cells: Vec<CellValue>,
}

impl Region {
    /// Build a region from `rows[y][x]` colors, all marks clear. Short rows
    /// are padded with empty cells.
    #[must_use]
    pub fn from_colors(rows: &[&[u8]]) -> Self {
        let height = rows.len();
        let width = rows.iter().map(|row| row.len()).max().unwrap_or(0);
        let mut cells = vec![CellValue::EMPTY; width * height];
        for (y, row) in rows.iter().enumerate() {
            for (x, &color) in row.iter().enumerate() {
                cells[y * width + x] = CellValue::new(color, 0);
            }
        }
        Self {
            width,
            height,
            cells,
        }
    }

    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> Option<CellValue> {
        (x < self.width && y < self.height).then(|| self.cells[y * self.width + x])
    }
}
