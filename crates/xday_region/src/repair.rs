//! Validation and repair of painted grids.
//!
//! Outline tracing needs every region to be made of 4-connected cells without diagonal-only
//! contacts, and the game export expects every cell to belong to some region. The passes in
//! this module fix what they can and report everything they find as [`GridIssue`]s.

use glam::IVec2;

use crate::{
    RegionGrid, RegionId,
    math::{DIAGONALS, dir_offset},
};

/// Component size below which a fragment of a region is reported.
pub const DEFAULT_ISLAND_WARNING_THRESHOLD: usize = 10;

/// Runs the repair passes over a [`RegionGrid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct GridRepair {
    /// Connected components with more than one cell but fewer than this many are reported as
    /// [`GridIssueKind::SmallFragment`].
    pub island_warning_threshold: usize,
}

impl Default for GridRepair {
    fn default() -> Self {
        Self {
            island_warning_threshold: DEFAULT_ISLAND_WARNING_THRESHOLD,
        }
    }
}

impl GridRepair {
    /// Runs the diagonal fill, the empty cell fill and the isolated cell fix, in that order.
    pub fn run(&self, grid: &mut RegionGrid) -> RepairReport {
        let mut report = RepairReport::default();
        fill_diagonal_gaps(grid, &mut report);
        fill_empty_cells(grid, &mut report);
        fix_isolated_cells(grid, self.island_warning_threshold, &mut report);
        report
    }
}

/// Fills one of the two orthogonal cells between diagonal neighbours of the same region, so the
/// region does not touch itself only at a corner.
pub fn fill_diagonal_gaps(grid: &mut RegionGrid, report: &mut RepairReport) {
    for y in 0..grid.vertical_count() as i32 {
        for x in 0..grid.horizontal_count() as i32 {
            let region = grid.region_id(x, y);
            if region.is_none() {
                continue;
            }
            for diagonal in DIAGONALS {
                let other = IVec2::new(x, y) + diagonal;
                if grid.region_at(other) != region {
                    continue;
                }
                let horizontal_gap = IVec2::new(other.x, y);
                let vertical_gap = IVec2::new(x, other.y);
                if grid.region_at(horizontal_gap) == region || grid.region_at(vertical_gap) == region
                {
                    continue;
                }
                let previous = grid.region_at(horizontal_gap);
                grid.set_region_id(horizontal_gap.x, horizontal_gap.y, region);
                report.push(GridIssue {
                    coordinate: horizontal_gap,
                    kind: GridIssueKind::DiagonalGap,
                    action: RepairAction::Reassigned {
                        from: previous,
                        to: region,
                    },
                });
            }
        }
    }
}

/// Assigns every empty cell the first region found by a depth-first search over its
/// 4-neighbours.
///
/// The search stops at the first non-empty cell it visits, which is not necessarily the
/// closest one.
pub fn fill_empty_cells(grid: &mut RegionGrid, report: &mut RepairReport) {
    let cell_count = grid.cells().len();
    let mut visited = vec![false; cell_count];
    let mut touched = Vec::new();
    let mut stack = Vec::new();
    for index in 0..cell_count {
        if grid.cells()[index].is_some() {
            continue;
        }
        let coordinate = grid.index_to_coordinate(index);

        // Reset only what the previous search touched.
        for i in touched.drain(..) {
            visited[i] = false;
        }
        stack.clear();
        stack.push(coordinate);
        visited[index] = true;
        touched.push(index);

        let mut found = RegionId::NONE;
        while let Some(current) = stack.pop() {
            let region = grid.region_at(current);
            if region.is_some() {
                found = region;
                break;
            }
            for dir in 0..4 {
                let neighbour = current + dir_offset(dir);
                let Some(neighbour_index) = grid.cell_index(neighbour.x, neighbour.y) else {
                    continue;
                };
                if visited[neighbour_index] {
                    continue;
                }
                visited[neighbour_index] = true;
                touched.push(neighbour_index);
                stack.push(neighbour);
            }
        }

        if found.is_none() {
            // The grid has no regions at all; nothing later in the loop can succeed either.
            report.push(GridIssue {
                coordinate,
                kind: GridIssueKind::EmptyCell,
                action: RepairAction::Unresolved,
            });
            return;
        }
        grid.set_region_id(coordinate.x, coordinate.y, found);
        report.push(GridIssue {
            coordinate,
            kind: GridIssueKind::EmptyCell,
            action: RepairAction::Reassigned {
                from: RegionId::NONE,
                to: found,
            },
        });
    }
}

/// Reassigns single-cell components to a neighbouring region and reports small fragments.
///
/// Repeats until no single-cell component can be fixed any more, so running it again on the
/// result changes nothing.
pub fn fix_isolated_cells(grid: &mut RegionGrid, warning_threshold: usize, report: &mut RepairReport) {
    let mut unresolved = Vec::new();
    loop {
        let components = connected_components(grid);
        let mut fixed = 0;
        for component in components.iter().filter(|component| component.cells.len() == 1) {
            let cell = component.cells[0];
            if unresolved.contains(&cell) {
                continue;
            }
            let region = grid.region_at(cell);
            // An earlier fix in this pass may have joined this cell to a neighbour already.
            let still_isolated = (0..4).all(|dir| grid.region_at(cell + dir_offset(dir)) != region);
            if !still_isolated {
                continue;
            }
            let replacement = (0..4)
                .map(|dir| grid.region_at(cell + dir_offset(dir)))
                .find(|neighbour| neighbour.is_some());
            match replacement {
                Some(to) => {
                    grid.set_region_id(cell.x, cell.y, to);
                    fixed += 1;
                    report.push(GridIssue {
                        coordinate: cell,
                        kind: GridIssueKind::IsolatedCell,
                        action: RepairAction::Reassigned { from: region, to },
                    });
                }
                None => {
                    unresolved.push(cell);
                    report.push(GridIssue {
                        coordinate: cell,
                        kind: GridIssueKind::IsolatedCell,
                        action: RepairAction::Unresolved,
                    });
                }
            }
        }
        if fixed == 0 {
            for component in components {
                let size = component.cells.len();
                if size > 1 && size < warning_threshold {
                    report.push(GridIssue {
                        coordinate: component.cells[0],
                        kind: GridIssueKind::SmallFragment { size },
                        action: RepairAction::Unresolved,
                    });
                }
            }
            return;
        }
    }
}

/// A set of 4-connected cells sharing one region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    /// The region of the cells
    pub region: RegionId,
    /// The cells, starting with the first one found in row-major order
    pub cells: Vec<IVec2>,
}

/// Finds all 4-connected components of non-empty cells with a stack-based flood fill.
pub fn connected_components(grid: &RegionGrid) -> Vec<Component> {
    let mut visited = vec![false; grid.cells().len()];
    let mut components = Vec::new();
    let mut stack = Vec::new();
    for (index, &region) in grid.cells().iter().enumerate() {
        if region.is_none() || visited[index] {
            continue;
        }
        visited[index] = true;
        stack.push(grid.index_to_coordinate(index));
        let mut cells = Vec::new();
        while let Some(cell) = stack.pop() {
            cells.push(cell);
            for dir in 0..4 {
                let neighbour = cell + dir_offset(dir);
                let Some(neighbour_index) = grid.cell_index(neighbour.x, neighbour.y) else {
                    continue;
                };
                if visited[neighbour_index] || grid.cells()[neighbour_index] != region {
                    continue;
                }
                visited[neighbour_index] = true;
                stack.push(neighbour);
            }
        }
        components.push(Component { region, cells });
    }
    components
}

/// Everything the repair passes found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct RepairReport {
    /// The issues in the order they were found
    pub issues: Vec<GridIssue>,
}

impl RepairReport {
    fn push(&mut self, issue: GridIssue) {
        match issue.action {
            RepairAction::Reassigned { from, to } => tracing::debug!(
                "Repaired {:?} at {}: region {} -> {}",
                issue.kind,
                issue.coordinate,
                from.0,
                to.0
            ),
            RepairAction::Unresolved => tracing::warn!(
                "Found {:?} at {} that needs manual correction",
                issue.kind,
                issue.coordinate
            ),
        }
        self.issues.push(issue);
    }

    /// The number of cells that were changed.
    pub fn changed_cell_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|issue| matches!(issue.action, RepairAction::Reassigned { .. }))
            .count()
    }

    /// Issues that still need manual correction.
    pub fn unresolved(&self) -> impl Iterator<Item = &GridIssue> {
        self.issues
            .iter()
            .filter(|issue| issue.action == RepairAction::Unresolved)
    }

    /// Returns `true` if nothing was found.
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

/// A problem found in a grid, and what was done about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct GridIssue {
    /// The cell the issue is located at
    pub coordinate: IVec2,
    /// What is wrong
    pub kind: GridIssueKind,
    /// What the repair did
    pub action: RepairAction,
}

/// The kinds of [`GridIssue`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum GridIssueKind {
    /// Two cells of a region touched only diagonally.
    DiagonalGap,
    /// The cell had no region.
    EmptyCell,
    /// The cell was the only one of its component.
    IsolatedCell,
    /// A component smaller than the warning threshold.
    SmallFragment {
        /// The number of cells in the component
        size: usize,
    },
}

/// What a repair pass did about a [`GridIssue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum RepairAction {
    /// The cell was moved to another region.
    Reassigned {
        /// The previous region of the cell
        from: RegionId,
        /// The new region of the cell
        to: RegionId,
    },
    /// Nothing was changed.
    Unresolved,
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::*;
    use crate::RegionGridBuilder;

    fn grid_from_rows(rows: &[&[u32]]) -> RegionGrid {
        let mut grid = RegionGridBuilder {
            horizontal_count: rows[0].len() as u32,
            vertical_count: rows.len() as u32,
            origin: Vec2::ZERO,
            cell_size: Vec2::ONE,
        }
        .build()
        .unwrap();
        // First row is the top of the grid.
        for (row, values) in rows.iter().enumerate() {
            let y = (rows.len() - 1 - row) as i32;
            for (x, value) in values.iter().enumerate() {
                grid.set_region_id(x as i32, y, RegionId(*value));
            }
        }
        grid
    }

    fn rows(grid: &RegionGrid) -> Vec<Vec<u32>> {
        (0..grid.vertical_count() as i32)
            .rev()
            .map(|y| {
                (0..grid.horizontal_count() as i32)
                    .map(|x| grid.region_id(x, y).0)
                    .collect()
            })
            .collect()
    }

    #[test]
    fn empty_center_takes_neighbour_region() {
        let mut grid = grid_from_rows(&[&[1, 1, 1], &[1, 0, 1], &[1, 1, 1]]);
        let mut report = RepairReport::default();
        fill_empty_cells(&mut grid, &mut report);
        assert_eq!(grid.region_id(1, 1), RegionId(1));
        assert_eq!(
            report.issues,
            vec![GridIssue {
                coordinate: IVec2::new(1, 1),
                kind: GridIssueKind::EmptyCell,
                action: RepairAction::Reassigned {
                    from: RegionId::NONE,
                    to: RegionId(1)
                },
            }]
        );
    }

    #[test]
    fn empty_cells_far_from_regions_are_filled() {
        let mut grid = grid_from_rows(&[&[0, 0, 0, 0], &[0, 0, 0, 0], &[0, 0, 0, 3]]);
        let mut report = RepairReport::default();
        fill_empty_cells(&mut grid, &mut report);
        assert!(grid.cells().iter().all(|cell| *cell == RegionId(3)));
        assert_eq!(report.changed_cell_count(), 11);
    }

    #[test]
    fn grid_without_regions_is_reported() {
        let mut grid = grid_from_rows(&[&[0, 0], &[0, 0]]);
        let mut report = RepairReport::default();
        fill_empty_cells(&mut grid, &mut report);
        assert_eq!(report.changed_cell_count(), 0);
        assert_eq!(report.unresolved().count(), 1);
    }

    #[test]
    fn isolated_cell_joins_surrounding_region() {
        let mut grid = grid_from_rows(&[
            &[1, 1, 1, 1, 1],
            &[1, 1, 1, 1, 1],
            &[1, 1, 2, 1, 1],
            &[1, 1, 1, 1, 1],
            &[1, 1, 1, 1, 1],
        ]);
        let mut report = RepairReport::default();
        fix_isolated_cells(&mut grid, DEFAULT_ISLAND_WARNING_THRESHOLD, &mut report);
        assert_eq!(grid.region_id(2, 2), RegionId(1));
        assert_eq!(report.changed_cell_count(), 1);
        assert_eq!(report.issues[0].kind, GridIssueKind::IsolatedCell);
    }

    #[test]
    fn adjacent_singletons_end_up_connected() {
        let mut grid = grid_from_rows(&[&[1, 1, 1, 1], &[1, 2, 3, 1], &[1, 1, 1, 1]]);
        let mut report = RepairReport::default();
        fix_isolated_cells(&mut grid, 2, &mut report);
        let components = connected_components(&grid);
        assert!(components.iter().all(|component| component.cells.len() > 1));

        let mut second = RepairReport::default();
        fix_isolated_cells(&mut grid, 2, &mut second);
        assert_eq!(second.changed_cell_count(), 0);
    }

    #[test]
    fn small_fragments_are_only_reported() {
        let mut grid = grid_from_rows(&[
            &[1, 1, 1, 1, 1],
            &[1, 2, 2, 1, 1],
            &[1, 1, 1, 1, 1],
        ]);
        let before = grid.clone();
        let mut report = RepairReport::default();
        fix_isolated_cells(&mut grid, 10, &mut report);
        assert_eq!(grid, before);
        assert_eq!(
            report.issues,
            vec![GridIssue {
                coordinate: IVec2::new(1, 1),
                kind: GridIssueKind::SmallFragment { size: 2 },
                action: RepairAction::Unresolved,
            }]
        );
    }

    #[test]
    fn diagonal_gap_is_filled() {
        let mut grid = grid_from_rows(&[&[1, 0, 0], &[0, 1, 0], &[0, 0, 0]]);
        let mut report = RepairReport::default();
        fill_diagonal_gaps(&mut grid, &mut report);
        assert_eq!(
            rows(&grid),
            vec![vec![1, 0, 0], vec![1, 1, 0], vec![0, 0, 0]]
        );
        assert_eq!(
            report.issues,
            vec![GridIssue {
                coordinate: IVec2::new(0, 1),
                kind: GridIssueKind::DiagonalGap,
                action: RepairAction::Reassigned {
                    from: RegionId::NONE,
                    to: RegionId(1)
                },
            }]
        );
    }

    #[test]
    fn repair_is_idempotent() {
        let mut grid = grid_from_rows(&[
            &[1, 1, 0, 2, 2, 2],
            &[1, 3, 1, 2, 0, 2],
            &[0, 1, 1, 4, 2, 2],
            &[1, 1, 0, 2, 2, 5],
        ]);
        let repair = GridRepair::default();
        let first = repair.run(&mut grid);
        assert!(first.changed_cell_count() > 0);
        assert!(grid.cells().iter().all(|cell| cell.is_some()));
        let after_first = grid.clone();

        let mut second = RepairReport::default();
        fill_empty_cells(&mut grid, &mut second);
        fix_isolated_cells(&mut grid, repair.island_warning_threshold, &mut second);
        assert_eq!(second.changed_cell_count(), 0);
        assert_eq!(grid, after_first);
    }

    #[test]
    fn components_are_four_connected() {
        let grid = grid_from_rows(&[&[1, 0], &[0, 1]]);
        let components = connected_components(&grid);
        assert_eq!(components.len(), 2);
        assert!(components.iter().all(|component| component.cells.len() == 1));
    }
}
