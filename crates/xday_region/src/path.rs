//! Path finding over anything that can describe itself as a walkable grid.
//!
//! [`GridData`] is the contract between a grid and a path finder. [`AStarPathFinder`] is the
//! provided implementation, usable both blocking through [`PathFinder::find_path`] and
//! in the background through [`PathFinder::find_path_async`].

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, VecDeque},
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use bevy_tasks::{
    AsyncComputeTaskPool, Task, TaskPool,
    futures_lite::future::{block_on, poll_once},
};
use glam::{IVec2, Vec2};
use thiserror::Error;

use crate::math::{DIAGONALS, dir_offset};

/// How many neighbours a cell is connected to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum NeighbourCount {
    /// Left, top, right and bottom.
    #[default]
    Four,
    /// The four orthogonal neighbours plus the diagonals.
    Eight,
}

/// A grid that can be searched by a path finder.
///
/// Coordinates outside of `0..horizontal_count` and `0..vertical_count` are never walkable.
pub trait GridData {
    /// The number of cells along the x-axis.
    fn horizontal_count(&self) -> u32;

    /// The number of cells along the y-axis.
    fn vertical_count(&self) -> u32;

    /// Returns `true` if an agent may stand on the cell.
    fn is_walkable(&self, x: i32, y: i32) -> bool;

    /// Converts a position into the coordinate of the cell containing it.
    fn position_to_coordinate(&self, position: Vec2) -> IVec2;

    /// Returns the center of the cell.
    fn coordinate_to_center_position(&self, coordinate: IVec2) -> Vec2;

    /// The cost of stepping from `from` to its neighbour `to`. Defaults to the step length.
    fn cost(&self, from: IVec2, to: IVec2) -> f32 {
        (to - from).as_vec2().length()
    }

    /// Whether diagonal steps are allowed.
    fn neighbour_count(&self) -> NeighbourCount {
        NeighbourCount::Four
    }

    /// Estimate of the cost from `from` to `to`. Must not overestimate when paths should be
    /// optimal.
    fn heuristic(&self, from: IVec2, to: IVec2) -> f32 {
        let delta = (to - from).abs().as_vec2();
        match self.neighbour_count() {
            NeighbourCount::Four => delta.x + delta.y,
            NeighbourCount::Eight => {
                delta.x + delta.y + (std::f32::consts::SQRT_2 - 2.0) * delta.x.min(delta.y)
            }
        }
    }

    /// Returns `true` if any cell of the grid is a teleporter.
    fn has_teleporters(&self) -> bool {
        false
    }

    /// Returns `true` if the cell is a teleporter.
    fn is_teleporter(&self, _x: i32, _y: i32) -> bool {
        false
    }

    /// The coordinate a teleporter cell leads to.
    fn connected_teleporter_coordinate(&self, _x: i32, _y: i32) -> Option<IVec2> {
        None
    }

    /// Returns `true` if the coordinate lies on the grid.
    fn contains(&self, coordinate: IVec2) -> bool {
        coordinate.x >= 0
            && coordinate.y >= 0
            && (coordinate.x as u32) < self.horizontal_count()
            && (coordinate.y as u32) < self.vertical_count()
    }
}

bitflags::bitflags! {
    /// Options for a path query.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
    #[repr(transparent)]
    pub struct PathFlags: u8 {
        /// Start from the closest walkable cell if the source cell is blocked or off the grid.
        const SOURCE_SEARCH_NEAREST_COORDINATE = 1;
        /// End at the closest walkable cell if the target cell is blocked or off the grid.
        const TARGET_SEARCH_NEAREST_COORDINATE = 2;
    }
}

/// Finds paths between world positions.
pub trait PathFinder {
    /// Finds a path and blocks until it is done.
    ///
    /// The path consists of cell centers, from the source cell to the target cell.
    fn find_path(&self, start: Vec2, end: Vec2, flags: PathFlags) -> Result<Vec<Vec2>, PathError>;

    /// Starts finding a path in the background. The calling thread is not blocked.
    fn find_path_async(&self, start: Vec2, end: Vec2, flags: PathFlags) -> PathTask;
}

/// Settings of an [`AStarPathFinder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct PathFinderSettings {
    /// How many steps away from a blocked endpoint to look for a walkable cell.
    pub max_nearest_search_distance: u32,
}

impl Default for PathFinderSettings {
    fn default() -> Self {
        Self {
            max_nearest_search_distance: 32,
        }
    }
}

/// A* search over a shared [`GridData`].
///
/// Diagonal steps are only taken when both orthogonal cells next to them are walkable.
/// Stepping onto a teleporter also connects to its linked coordinate at no cost. If the grid has
/// teleporters, the search drops the heuristic so results stay optimal.
#[derive(Debug)]
pub struct AStarPathFinder<G> {
    grid: Arc<G>,
    settings: PathFinderSettings,
}

impl<G> Clone for AStarPathFinder<G> {
    fn clone(&self) -> Self {
        Self {
            grid: Arc::clone(&self.grid),
            settings: self.settings,
        }
    }
}

impl<G: GridData> AStarPathFinder<G> {
    /// Creates a path finder with default settings.
    pub fn new(grid: Arc<G>) -> Self {
        Self::with_settings(grid, PathFinderSettings::default())
    }

    /// Creates a path finder.
    pub fn with_settings(grid: Arc<G>, settings: PathFinderSettings) -> Self {
        Self { grid, settings }
    }

    /// The grid that is searched.
    pub fn grid(&self) -> &Arc<G> {
        &self.grid
    }

    /// Same as [`PathFinder::find_path`], but in cell coordinates.
    pub fn find_coordinate_path(
        &self,
        start: IVec2,
        end: IVec2,
        flags: PathFlags,
    ) -> Result<Vec<IVec2>, PathError> {
        let grid = self.grid.as_ref();
        let start = self.resolve_endpoint(
            start,
            flags.contains(PathFlags::SOURCE_SEARCH_NEAREST_COORDINATE),
            PathError::SourceOutOfBounds { coordinate: start },
            PathError::SourceBlocked { coordinate: start },
        )?;
        let end = self.resolve_endpoint(
            end,
            flags.contains(PathFlags::TARGET_SEARCH_NEAREST_COORDINATE),
            PathError::TargetOutOfBounds { coordinate: end },
            PathError::TargetBlocked { coordinate: end },
        )?;
        if start == end {
            return Ok(vec![start]);
        }
        search(grid, start, end).ok_or(PathError::Unreachable {
            from: start,
            to: end,
        })
    }

    fn resolve_endpoint(
        &self,
        coordinate: IVec2,
        search_nearest: bool,
        out_of_bounds: PathError,
        blocked: PathError,
    ) -> Result<IVec2, PathError> {
        let grid = self.grid.as_ref();
        if !search_nearest {
            if !grid.contains(coordinate) {
                return Err(out_of_bounds);
            }
            if !grid.is_walkable(coordinate.x, coordinate.y) {
                return Err(blocked);
            }
            return Ok(coordinate);
        }
        let max = IVec2::new(
            grid.horizontal_count() as i32 - 1,
            grid.vertical_count() as i32 - 1,
        );
        if max.min_element() < 0 {
            return Err(out_of_bounds);
        }
        let clamped = coordinate.clamp(IVec2::ZERO, max);
        nearest_walkable(grid, clamped, self.settings.max_nearest_search_distance).ok_or(blocked)
    }
}

impl<G: GridData + Send + Sync + 'static> PathFinder for AStarPathFinder<G> {
    fn find_path(&self, start: Vec2, end: Vec2, flags: PathFlags) -> Result<Vec<Vec2>, PathError> {
        let grid = self.grid.as_ref();
        let path = self.find_coordinate_path(
            grid.position_to_coordinate(start),
            grid.position_to_coordinate(end),
            flags,
        )?;
        Ok(path
            .into_iter()
            .map(|coordinate| grid.coordinate_to_center_position(coordinate))
            .collect())
    }

    fn find_path_async(&self, start: Vec2, end: Vec2, flags: PathFlags) -> PathTask {
        let finder = self.clone();
        let task = AsyncComputeTaskPool::get_or_init(TaskPool::default)
            .spawn(async move { finder.find_path(start, end, flags) });
        PathTask(task)
    }
}

/// A path query running in the background. Dropping it cancels the query.
#[derive(Debug)]
pub struct PathTask(Task<Result<Vec<Vec2>, PathError>>);

impl PathTask {
    /// Returns `true` once the result is available.
    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }

    /// Takes the result if the query is done, without blocking.
    ///
    /// Returns `None` while the query is still running. Once a result was returned, the task is
    /// spent and must not be checked again.
    pub fn try_result(&mut self) -> Option<Result<Vec<Vec2>, PathError>> {
        block_on(poll_once(&mut self.0))
    }

    /// Blocks until the query is done.
    pub fn wait(self) -> Result<Vec<Vec2>, PathError> {
        block_on(self.0)
    }
}

impl Future for PathTask {
    type Output = Result<Vec<Vec2>, PathError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}

/// Errors that can occur when finding a path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// The source lies outside of the grid.
    #[error("Source coordinate {coordinate} is outside of the grid")]
    SourceOutOfBounds {
        /// The source coordinate
        coordinate: IVec2,
    },
    /// The target lies outside of the grid.
    #[error("Target coordinate {coordinate} is outside of the grid")]
    TargetOutOfBounds {
        /// The target coordinate
        coordinate: IVec2,
    },
    /// The source cell is not walkable and no replacement was found.
    #[error("Source coordinate {coordinate} is not walkable")]
    SourceBlocked {
        /// The source coordinate
        coordinate: IVec2,
    },
    /// The target cell is not walkable and no replacement was found.
    #[error("Target coordinate {coordinate} is not walkable")]
    TargetBlocked {
        /// The target coordinate
        coordinate: IVec2,
    },
    /// There is no path between the two cells.
    #[error("No path from {from} to {to}")]
    Unreachable {
        /// The resolved source coordinate
        from: IVec2,
        /// The resolved target coordinate
        to: IVec2,
    },
}

/// Breadth-first search for the closest walkable cell, in steps over the 4-neighbourhood.
fn nearest_walkable<G: GridData + ?Sized>(
    grid: &G,
    coordinate: IVec2,
    max_distance: u32,
) -> Option<IVec2> {
    if grid.is_walkable(coordinate.x, coordinate.y) {
        return Some(coordinate);
    }
    let width = grid.horizontal_count() as usize;
    let mut visited = vec![false; width * grid.vertical_count() as usize];
    let index = |c: IVec2| c.x as usize + c.y as usize * width;
    let mut queue = VecDeque::new();
    visited[index(coordinate)] = true;
    queue.push_back((coordinate, 0));
    while let Some((current, distance)) = queue.pop_front() {
        if grid.is_walkable(current.x, current.y) {
            return Some(current);
        }
        if distance >= max_distance {
            continue;
        }
        for dir in 0..4 {
            let neighbour = current + dir_offset(dir);
            if !grid.contains(neighbour) || visited[index(neighbour)] {
                continue;
            }
            visited[index(neighbour)] = true;
            queue.push_back((neighbour, distance + 1));
        }
    }
    None
}

#[derive(Debug, Clone, Copy)]
struct OpenNode {
    estimate: f32,
    index: usize,
}

impl PartialEq for OpenNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenNode {}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed, so the max-heap pops the lowest estimate first.
        other
            .estimate
            .total_cmp(&self.estimate)
            .then_with(|| other.index.cmp(&self.index))
    }
}

fn search<G: GridData + ?Sized>(grid: &G, start: IVec2, goal: IVec2) -> Option<Vec<IVec2>> {
    let width = grid.horizontal_count() as usize;
    let cell_count = width * grid.vertical_count() as usize;
    let index = |c: IVec2| c.x as usize + c.y as usize * width;
    let coordinate = |i: usize| IVec2::new((i % width) as i32, (i / width) as i32);
    let use_heuristic = !grid.has_teleporters();
    let heuristic = |c: IVec2| {
        if use_heuristic {
            grid.heuristic(c, goal)
        } else {
            0.0
        }
    };

    let mut cost_so_far = vec![f32::INFINITY; cell_count];
    let mut came_from: Vec<Option<usize>> = vec![None; cell_count];
    let mut closed = vec![false; cell_count];
    let mut open = BinaryHeap::new();
    let mut neighbours = Vec::with_capacity(9);

    let start_index = index(start);
    let goal_index = index(goal);
    cost_so_far[start_index] = 0.0;
    open.push(OpenNode {
        estimate: heuristic(start),
        index: start_index,
    });

    while let Some(OpenNode { index: current, .. }) = open.pop() {
        if current == goal_index {
            let mut path = vec![goal];
            let mut cursor = current;
            while let Some(previous) = came_from[cursor] {
                path.push(coordinate(previous));
                cursor = previous;
            }
            path.reverse();
            return Some(path);
        }
        if closed[current] {
            continue;
        }
        closed[current] = true;

        let position = coordinate(current);
        collect_neighbours(grid, position, &mut neighbours);
        for &(neighbour, step_cost) in &neighbours {
            let neighbour_index = index(neighbour);
            if closed[neighbour_index] {
                continue;
            }
            let cost = cost_so_far[current] + step_cost;
            if cost < cost_so_far[neighbour_index] {
                cost_so_far[neighbour_index] = cost;
                came_from[neighbour_index] = Some(current);
                open.push(OpenNode {
                    estimate: cost + heuristic(neighbour),
                    index: neighbour_index,
                });
            }
        }
    }
    None
}

fn collect_neighbours<G: GridData + ?Sized>(
    grid: &G,
    position: IVec2,
    neighbours: &mut Vec<(IVec2, f32)>,
) {
    neighbours.clear();
    let walkable = |c: IVec2| grid.contains(c) && grid.is_walkable(c.x, c.y);
    for dir in 0..4 {
        let neighbour = position + dir_offset(dir);
        if walkable(neighbour) {
            neighbours.push((neighbour, grid.cost(position, neighbour)));
        }
    }
    if grid.neighbour_count() == NeighbourCount::Eight {
        for diagonal in DIAGONALS {
            let neighbour = position + diagonal;
            let no_corner_cutting = walkable(IVec2::new(neighbour.x, position.y))
                && walkable(IVec2::new(position.x, neighbour.y));
            if no_corner_cutting && walkable(neighbour) {
                neighbours.push((neighbour, grid.cost(position, neighbour)));
            }
        }
    }
    if grid.is_teleporter(position.x, position.y) {
        if let Some(target) = grid.connected_teleporter_coordinate(position.x, position.y) {
            if target != position && walkable(target) {
                neighbours.push((target, 0.0));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A grid where `#` is blocked, `.` is walkable, and letters are teleporters linked to the
    /// same letter in upper case.
    struct TestGrid {
        width: u32,
        height: u32,
        cells: Vec<u8>,
        neighbour_count: NeighbourCount,
    }

    impl TestGrid {
        /// The first row is the top of the grid.
        fn new(rows: &[&str], neighbour_count: NeighbourCount) -> Self {
            let height = rows.len() as u32;
            let width = rows[0].len() as u32;
            let mut cells = vec![b'.'; (width * height) as usize];
            for (row, line) in rows.iter().enumerate() {
                let y = height as usize - 1 - row;
                for (x, byte) in line.bytes().enumerate() {
                    cells[x + y * width as usize] = byte;
                }
            }
            Self {
                width,
                height,
                cells,
                neighbour_count,
            }
        }

        fn cell(&self, x: i32, y: i32) -> u8 {
            self.cells[x as usize + y as usize * self.width as usize]
        }
    }

    impl GridData for TestGrid {
        fn horizontal_count(&self) -> u32 {
            self.width
        }

        fn vertical_count(&self) -> u32 {
            self.height
        }

        fn is_walkable(&self, x: i32, y: i32) -> bool {
            self.contains(IVec2::new(x, y)) && self.cell(x, y) != b'#'
        }

        fn position_to_coordinate(&self, position: Vec2) -> IVec2 {
            position.floor().as_ivec2()
        }

        fn coordinate_to_center_position(&self, coordinate: IVec2) -> Vec2 {
            coordinate.as_vec2() + 0.5
        }

        fn neighbour_count(&self) -> NeighbourCount {
            self.neighbour_count
        }

        fn has_teleporters(&self) -> bool {
            self.cells.iter().any(u8::is_ascii_lowercase)
        }

        fn is_teleporter(&self, x: i32, y: i32) -> bool {
            self.cell(x, y).is_ascii_lowercase()
        }

        fn connected_teleporter_coordinate(&self, x: i32, y: i32) -> Option<IVec2> {
            let target = self.cell(x, y).to_ascii_uppercase();
            let index = self.cells.iter().position(|cell| *cell == target)?;
            Some(IVec2::new(
                (index % self.width as usize) as i32,
                (index / self.width as usize) as i32,
            ))
        }
    }

    fn finder(rows: &[&str], neighbour_count: NeighbourCount) -> AStarPathFinder<TestGrid> {
        AStarPathFinder::new(Arc::new(TestGrid::new(rows, neighbour_count)))
    }

    fn assert_connected(path: &[IVec2], neighbour_count: NeighbourCount) {
        for pair in path.windows(2) {
            let delta = (pair[1] - pair[0]).abs();
            match neighbour_count {
                NeighbourCount::Four => assert_eq!(delta.x + delta.y, 1, "{pair:?}"),
                NeighbourCount::Eight => assert!(delta.max_element() == 1, "{pair:?}"),
            }
        }
    }

    #[test]
    fn straight_path() {
        let finder = finder(&["....."], NeighbourCount::Four);
        let path = finder
            .find_coordinate_path(IVec2::new(0, 0), IVec2::new(4, 0), PathFlags::empty())
            .unwrap();
        assert_eq!(path, (0..5).map(|x| IVec2::new(x, 0)).collect::<Vec<_>>());
    }

    #[test]
    fn path_goes_around_wall() {
        let rows = [
            ".....", //
            ".###.", //
            ".#...", //
            ".#.#.", //
            "...#.",
        ];
        let finder = finder(&rows, NeighbourCount::Four);
        let path = finder
            .find_coordinate_path(IVec2::new(2, 1), IVec2::new(4, 0), PathFlags::empty())
            .unwrap();
        assert_eq!(path.first(), Some(&IVec2::new(2, 1)));
        assert_eq!(path.last(), Some(&IVec2::new(4, 0)));
        assert_connected(&path, NeighbourCount::Four);
        for cell in &path {
            assert!(finder.grid().is_walkable(cell.x, cell.y));
        }
        // (2,1) -> (2,2) -> (3,2) -> (4,2) -> (4,1) -> (4,0)
        assert_eq!(path.len(), 6);
    }

    #[test]
    fn diagonal_steps_do_not_cut_corners() {
        let rows = [
            "...", //
            ".#.", //
            "...",
        ];
        let blocked = finder(&rows, NeighbourCount::Eight);
        let path = blocked
            .find_coordinate_path(IVec2::new(0, 0), IVec2::new(2, 2), PathFlags::empty())
            .unwrap();
        assert_connected(&path, NeighbourCount::Eight);
        assert!(!path.contains(&IVec2::new(1, 1)));
        // The blocked center forbids every diagonal, so the path runs along the border.
        assert_eq!(path.len(), 5);

        let open = finder(&["...", "...", "..."], NeighbourCount::Eight)
            .find_coordinate_path(IVec2::new(0, 0), IVec2::new(2, 2), PathFlags::empty())
            .unwrap();
        assert_eq!(
            open,
            vec![IVec2::new(0, 0), IVec2::new(1, 1), IVec2::new(2, 2)]
        );
    }

    #[test]
    fn blocked_endpoints_fail_without_flags() {
        let finder = finder(&["#..#"], NeighbourCount::Four);
        assert_eq!(
            finder.find_coordinate_path(IVec2::new(0, 0), IVec2::new(2, 0), PathFlags::empty()),
            Err(PathError::SourceBlocked {
                coordinate: IVec2::new(0, 0)
            })
        );
        assert_eq!(
            finder.find_coordinate_path(IVec2::new(1, 0), IVec2::new(3, 0), PathFlags::empty()),
            Err(PathError::TargetBlocked {
                coordinate: IVec2::new(3, 0)
            })
        );
        assert_eq!(
            finder.find_coordinate_path(IVec2::new(1, 0), IVec2::new(9, 0), PathFlags::empty()),
            Err(PathError::TargetOutOfBounds {
                coordinate: IVec2::new(9, 0)
            })
        );
    }

    #[test]
    fn blocked_endpoints_snap_with_flags() {
        let finder = finder(&["#..#"], NeighbourCount::Four);
        let flags = PathFlags::SOURCE_SEARCH_NEAREST_COORDINATE
            | PathFlags::TARGET_SEARCH_NEAREST_COORDINATE;
        let path = finder
            .find_coordinate_path(IVec2::new(0, 0), IVec2::new(9, 0), flags)
            .unwrap();
        assert_eq!(path, vec![IVec2::new(1, 0), IVec2::new(2, 0)]);
    }

    #[test]
    fn unreachable_target() {
        let finder = finder(&["..#.."], NeighbourCount::Eight);
        assert_eq!(
            finder.find_coordinate_path(IVec2::new(0, 0), IVec2::new(4, 0), PathFlags::empty()),
            Err(PathError::Unreachable {
                from: IVec2::new(0, 0),
                to: IVec2::new(4, 0)
            })
        );
    }

    #[test]
    fn teleporters_connect_separated_areas() {
        let rows = [
            "a.#..", //
            "..#.A",
        ];
        let finder = finder(&rows, NeighbourCount::Four);
        let path = finder
            .find_coordinate_path(IVec2::new(1, 0), IVec2::new(3, 1), PathFlags::empty())
            .unwrap();
        assert_eq!(path.first(), Some(&IVec2::new(1, 0)));
        assert_eq!(path.last(), Some(&IVec2::new(3, 1)));
        assert!(path.contains(&IVec2::new(0, 1)));
        assert!(path.contains(&IVec2::new(4, 0)));
        assert!(!path.iter().any(|cell| cell.x == 2));
    }

    #[test]
    fn world_positions_are_cell_centers() {
        let finder = finder(&["..."], NeighbourCount::Four);
        let path = finder
            .find_path(Vec2::new(0.2, 0.7), Vec2::new(2.9, 0.1), PathFlags::empty())
            .unwrap();
        assert_eq!(
            path,
            vec![
                Vec2::new(0.5, 0.5),
                Vec2::new(1.5, 0.5),
                Vec2::new(2.5, 0.5)
            ]
        );
    }

    #[test]
    fn async_path_matches_blocking_path() {
        let rows = [
            "......", //
            ".####.", //
            "......",
        ];
        let finder = finder(&rows, NeighbourCount::Eight);
        let start = Vec2::new(0.5, 0.5);
        let end = Vec2::new(5.5, 2.5);
        let blocking = finder.find_path(start, end, PathFlags::empty());
        let task = finder.find_path_async(start, end, PathFlags::empty());
        assert_eq!(task.wait(), blocking);
    }
}
