//! The grid module contains the [`RegionGrid`], which stores one [`RegionId`] per cell.
//!
//! Cells are addressed row-major as `y * horizontal_count + x`. Grid coordinates are mapped to
//! continuous positions through an origin and a per-axis cell size.

use glam::{IVec2, UVec2, Vec2};
use thiserror::Error;

use crate::{Aabb2d, RegionId};

/// A rectangular, fully allocated grid of region IDs.
/// Build with [`RegionGridBuilder`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct RegionGrid {
    /// The number of cells along the x-axis
    horizontal_count: u32,
    /// The number of cells along the y-axis
    vertical_count: u32,
    /// The position of the lower-left corner of cell `(0, 0)`
    origin: Vec2,
    /// The size of a single cell
    cell_size: Vec2,
    /// The region of every cell in `horizontal_count * vertical_count` order
    cells: Vec<RegionId>,
}

impl RegionGrid {
    /// The number of cells along the x-axis.
    #[inline]
    pub fn horizontal_count(&self) -> u32 {
        self.horizontal_count
    }

    /// The number of cells along the y-axis.
    #[inline]
    pub fn vertical_count(&self) -> u32 {
        self.vertical_count
    }

    /// The grid dimensions in cells.
    #[inline]
    pub fn size(&self) -> UVec2 {
        UVec2::new(self.horizontal_count, self.vertical_count)
    }

    /// The position of the lower-left corner of cell `(0, 0)`.
    #[inline]
    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    /// The size of a single cell.
    #[inline]
    pub fn cell_size(&self) -> Vec2 {
        self.cell_size
    }

    /// All cells in row-major order.
    #[inline]
    pub fn cells(&self) -> &[RegionId] {
        &self.cells
    }

    /// The area covered by the grid.
    pub fn bounds(&self) -> Aabb2d {
        Aabb2d {
            min: self.origin,
            max: self.origin + self.size().as_vec2() * self.cell_size,
        }
    }

    #[inline]
    pub(crate) fn cell_index(&self, x: i32, y: i32) -> Option<usize> {
        self.contains(x, y)
            .then(|| x as usize + y as usize * self.horizontal_count as usize)
    }

    /// Returns `true` if `(x, y)` is a valid cell coordinate.
    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.horizontal_count && (y as u32) < self.vertical_count
    }

    /// Returns the region of the cell. Out-of-range coordinates read as [`RegionId::NONE`].
    #[inline]
    pub fn region_id(&self, x: i32, y: i32) -> RegionId {
        self.cell_index(x, y)
            .map(|index| self.cells[index])
            .unwrap_or(RegionId::NONE)
    }

    /// Same as [`RegionGrid::region_id`], taking a coordinate vector.
    #[inline]
    pub fn region_at(&self, coordinate: IVec2) -> RegionId {
        self.region_id(coordinate.x, coordinate.y)
    }

    /// Sets the region of a single cell. Out-of-range coordinates are ignored.
    /// Returns `true` if a cell was written.
    #[inline]
    pub fn set_region_id(&mut self, x: i32, y: i32, region: RegionId) -> bool {
        let Some(index) = self.cell_index(x, y) else {
            return false;
        };
        self.cells[index] = region;
        true
    }

    /// Overwrites the `width * height` cells starting at `(x, y)` with `region`.
    ///
    /// The rectangle is clamped to the grid, cells outside of it are silently skipped.
    /// Returns the number of cells written.
    pub fn set_region(&mut self, x: i32, y: i32, width: u32, height: u32, region: RegionId) -> usize {
        let min_x = x.max(0) as i64;
        let min_y = y.max(0) as i64;
        let max_x = (x as i64 + width as i64).min(self.horizontal_count as i64);
        let max_y = (y as i64 + height as i64).min(self.vertical_count as i64);
        if min_x >= max_x || min_y >= max_y {
            return 0;
        }
        let row_len = self.horizontal_count as usize;
        for row in min_y as usize..max_y as usize {
            let start = row * row_len;
            self.cells[start + min_x as usize..start + max_x as usize].fill(region);
        }
        (max_x - min_x) as usize * (max_y - min_y) as usize
    }

    /// Replaces every occurrence of `from` with `to`. Returns the number of changed cells.
    pub fn replace_region(&mut self, from: RegionId, to: RegionId) -> usize {
        let mut count = 0;
        for cell in self.cells.iter_mut().filter(|cell| **cell == from) {
            *cell = to;
            count += 1;
        }
        count
    }

    /// Resets all cells to [`RegionId::NONE`].
    pub fn clear(&mut self) {
        self.cells.fill(RegionId::NONE);
    }

    /// Returns the coordinates of all cells belonging to `region`, in row-major order.
    pub fn coordinates_of(&self, region: RegionId) -> Vec<IVec2> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| **cell == region)
            .map(|(index, _)| self.index_to_coordinate(index))
            .collect()
    }

    /// Returns every distinct region in the grid except [`RegionId::NONE`], sorted.
    pub fn region_ids(&self) -> Vec<RegionId> {
        let mut ids: Vec<_> = self.cells.iter().copied().filter(|id| id.is_some()).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    #[inline]
    pub(crate) fn index_to_coordinate(&self, index: usize) -> IVec2 {
        let width = self.horizontal_count as usize;
        IVec2::new((index % width) as i32, (index / width) as i32)
    }

    /// Converts a position into the coordinate of the cell containing it.
    /// The result may lie outside of the grid.
    #[inline]
    pub fn position_to_coordinate(&self, position: Vec2) -> IVec2 {
        ((position - self.origin) / self.cell_size).floor().as_ivec2()
    }

    /// Returns the lower-left corner of the cell.
    #[inline]
    pub fn coordinate_to_position(&self, x: i32, y: i32) -> Vec2 {
        self.origin + IVec2::new(x, y).as_vec2() * self.cell_size
    }

    /// Returns the center of the cell.
    #[inline]
    pub fn coordinate_to_center_position(&self, x: i32, y: i32) -> Vec2 {
        self.coordinate_to_position(x, y) + self.cell_size * 0.5
    }

    /// Converts a point on the lattice of cell corners into a position.
    /// Corner `(x, y)` is the lower-left corner of cell `(x, y)`.
    #[inline]
    pub fn corner_to_position(&self, corner: IVec2) -> Vec2 {
        self.coordinate_to_position(corner.x, corner.y)
    }
}

/// A builder for [`RegionGrid`]s. The grid starts out with every cell set to [`RegionId::NONE`].
#[derive(Debug, Clone, PartialEq)]
pub struct RegionGridBuilder {
    /// The number of cells along the x-axis
    pub horizontal_count: u32,
    /// The number of cells along the y-axis
    pub vertical_count: u32,
    /// The position of the lower-left corner of cell `(0, 0)`
    pub origin: Vec2,
    /// The size of a single cell
    pub cell_size: Vec2,
}

impl Default for RegionGridBuilder {
    fn default() -> Self {
        Self {
            horizontal_count: 0,
            vertical_count: 0,
            origin: Vec2::ZERO,
            cell_size: Vec2::ONE,
        }
    }
}

impl RegionGridBuilder {
    /// Builds the grid.
    pub fn build(self) -> Result<RegionGrid, RegionGridBuilderError> {
        if self.horizontal_count == 0 || self.vertical_count == 0 {
            return Err(RegionGridBuilderError::EmptyGrid {
                horizontal_count: self.horizontal_count,
                vertical_count: self.vertical_count,
            });
        }
        if !self.cell_size.is_finite() || self.cell_size.cmple(Vec2::ZERO).any() {
            return Err(RegionGridBuilderError::InvalidCellSize {
                cell_size: self.cell_size,
            });
        }
        if !self.origin.is_finite() {
            return Err(RegionGridBuilderError::InvalidOrigin {
                origin: self.origin,
            });
        }
        let cell_count = self.horizontal_count as u128 * self.vertical_count as u128;
        if cell_count > usize::MAX as u128 || cell_count > i32::MAX as u128 {
            return Err(RegionGridBuilderError::CellCountTooLarge {
                horizontal_count: self.horizontal_count,
                vertical_count: self.vertical_count,
            });
        }
        Ok(RegionGrid {
            horizontal_count: self.horizontal_count,
            vertical_count: self.vertical_count,
            origin: self.origin,
            cell_size: self.cell_size,
            cells: vec![RegionId::NONE; cell_count as usize],
        })
    }
}

/// Errors that can occur when building a [`RegionGrid`] with [`RegionGridBuilder::build`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegionGridBuilderError {
    /// Happens when one of the dimensions is zero.
    #[error("Grid must have at least one cell, got {horizontal_count}x{vertical_count}")]
    EmptyGrid {
        /// The number of cells along the x-axis
        horizontal_count: u32,
        /// The number of cells along the y-axis
        vertical_count: u32,
    },
    /// Happens when the cell size is zero, negative or not finite.
    #[error("Cell size must be positive and finite, got {cell_size}")]
    InvalidCellSize {
        /// The rejected cell size
        cell_size: Vec2,
    },
    /// Happens when the origin is not finite.
    #[error("Origin must be finite, got {origin}")]
    InvalidOrigin {
        /// The rejected origin
        origin: Vec2,
    },
    /// Happens when the cell count is too large to be addressed.
    #[error("Cell count is too large, got {horizontal_count}*{vertical_count}")]
    CellCountTooLarge {
        /// The number of cells along the x-axis
        horizontal_count: u32,
        /// The number of cells along the y-axis
        vertical_count: u32,
    },
}
