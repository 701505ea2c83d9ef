//! Outline extraction turns the cells of a region into the closed polygon surrounding them.
//!
//! Border edges are emitted per cell side and live on the lattice of cell corners, so the
//! chaining step works with exact integer keys. The finished outline is converted into
//! continuous positions through the grid's origin and cell size.

use std::collections::{HashMap, HashSet};

use glam::{IVec2, Vec2};
use thiserror::Error;

use crate::{
    RegionGrid, RegionId,
    math::{dir_offset, same_direction},
};

/// A directed segment on the boundary of a region, in cell-corner coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BorderEdge {
    /// The corner the edge starts at
    pub start: IVec2,
    /// The corner the edge ends at
    pub end: IVec2,
}

impl BorderEdge {
    /// The normalized direction of the edge.
    #[inline]
    pub fn direction(&self) -> Vec2 {
        (self.end - self.start).as_vec2().normalize_or_zero()
    }

    /// The edge on side `dir` of cell `cell`, oriented so that all edges of a boundary
    /// run clockwise: left side bottom-to-top, top side left-to-right, right side
    /// top-to-bottom, bottom side right-to-left.
    #[inline]
    fn cell_side(cell: IVec2, dir: u8) -> Self {
        let lower_left = cell;
        let lower_right = cell + IVec2::X;
        let upper_left = cell + IVec2::Y;
        let upper_right = cell + IVec2::ONE;
        let (start, end) = match dir {
            0 => (lower_left, upper_left),
            1 => (upper_left, upper_right),
            2 => (upper_right, lower_right),
            _ => (lower_right, lower_left),
        };
        Self { start, end }
    }
}

/// The closed polygon surrounding one region.
#[derive(Debug, Clone, PartialEq)]
pub struct Outline {
    /// The region this outline belongs to
    pub region: RegionId,
    /// Polygon vertices in clockwise order. The last vertex connects back to the first.
    pub vertices: Vec<Vec2>,
    /// The number of border edges that were found for the region
    pub edge_count: usize,
    /// Border edges that were not part of the traced boundary, e.g. because they surround
    /// a hole or a disjoint part of the region
    pub ignored_edge_count: usize,
}

impl RegionGrid {
    /// Collects the border edges of `region`, keyed by their start corner.
    ///
    /// `cells` are the coordinates owned by the region. A side of a cell becomes an edge if the
    /// neighbour across it has a different region, which includes off-grid neighbours.
    /// If two edges start at the same corner, the first one wins.
    pub fn border_edges(&self, region: RegionId, cells: &[IVec2]) -> HashMap<IVec2, BorderEdge> {
        let mut edges = HashMap::with_capacity(cells.len() * 2);
        for &cell in cells {
            for dir in 0..4 {
                let neighbour = cell + dir_offset(dir);
                if self.region_at(neighbour) == region {
                    continue;
                }
                let edge = BorderEdge::cell_side(cell, dir);
                edges.entry(edge.start).or_insert(edge);
            }
        }
        edges
    }

    /// Traces the outline of `region` over the given cells.
    ///
    /// Only a single boundary is traced, starting from the lowest corner. Holes and disjoint
    /// parts of the region are left out and counted in [`Outline::ignored_edge_count`].
    pub fn trace_outline(&self, region: RegionId, cells: &[IVec2]) -> Result<Outline, OutlineError> {
        let edges = self.border_edges(region, cells);
        let corners = chain_edges(region, &edges)?;
        let ignored_edge_count = edges.len() - corners.edge_count;
        if ignored_edge_count > 0 {
            tracing::debug!(
                "Region {}: ignored {ignored_edge_count} of {} border edges (holes or disjoint parts)",
                region.0,
                edges.len()
            );
        }
        Ok(Outline {
            region,
            vertices: corners
                .corners
                .into_iter()
                .map(|corner| self.corner_to_position(corner))
                .collect(),
            edge_count: edges.len(),
            ignored_edge_count,
        })
    }

    /// Traces the outline of every cell currently painted with `region`.
    pub fn outline(&self, region: RegionId) -> Result<Outline, OutlineError> {
        let cells = self.coordinates_of(region);
        self.trace_outline(region, &cells)
    }
}

/// The corners of a chained boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChainedCorners {
    pub(crate) corners: Vec<IVec2>,
    /// How many edges the chain consumed
    pub(crate) edge_count: usize,
}

/// Chains the edges into a closed cycle, dropping corners between colinear edges.
pub(crate) fn chain_edges(
    region: RegionId,
    edges: &HashMap<IVec2, BorderEdge>,
) -> Result<ChainedCorners, OutlineError> {
    let Some(first) = edges
        .values()
        .min_by_key(|edge| (edge.start.y, edge.start.x))
        .copied()
    else {
        return Err(OutlineError::NoEdges { region });
    };

    let mut chain = Vec::with_capacity(edges.len());
    let mut visited = HashSet::with_capacity(edges.len());
    visited.insert(first.start);
    chain.push(first);

    let mut current = first;
    loop {
        let Some(next) = edges.get(&current.end) else {
            return Err(OutlineError::BrokenChain {
                region,
                corner: current.end,
            });
        };
        if next.start == first.start {
            break;
        }
        if !visited.insert(next.start) || chain.len() >= edges.len() {
            // Walked into a loop that does not return to the first edge.
            return Err(OutlineError::BrokenChain {
                region,
                corner: next.start,
            });
        }
        chain.push(*next);
        current = *next;
    }

    let count = chain.len();
    let mut corners = Vec::with_capacity(count);
    corners.push(first.start);
    for i in 1..count {
        let previous = chain[i - 1];
        let edge = chain[i];
        if same_direction(previous.direction(), edge.direction()) {
            continue;
        }
        corners.push(edge.start);
    }
    Ok(ChainedCorners {
        corners,
        edge_count: count,
    })
}

/// Errors that can occur when tracing an [`Outline`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OutlineError {
    /// The region has no border edges, i.e. it owns no cells.
    #[error("Region {} has no border edges", region.0)]
    NoEdges {
        /// The region that was traced
        region: RegionId,
    },
    /// No edge continues the boundary at `corner`, or the boundary loops without closing.
    #[error("Outline of region {} is broken at corner {corner}", region.0)]
    BrokenChain {
        /// The region that was traced
        region: RegionId,
        /// The corner at which tracing failed
        corner: IVec2,
    },
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::*;
    use crate::RegionGridBuilder;

    fn grid(width: u32, height: u32, cell_size: f32) -> RegionGrid {
        RegionGridBuilder {
            horizontal_count: width,
            vertical_count: height,
            origin: Vec2::ZERO,
            cell_size: Vec2::splat(cell_size),
        }
        .build()
        .unwrap()
    }

    /// Rotates the outline so it starts at its lowest-left vertex.
    fn normalized(vertices: &[Vec2]) -> Vec<Vec2> {
        let start = vertices
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| (a.y, a.x).partial_cmp(&(b.y, b.x)).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        vertices[start..]
            .iter()
            .chain(&vertices[..start])
            .copied()
            .collect()
    }

    #[test]
    fn two_by_two_square_at_origin() {
        let mut grid = grid(4, 4, 10.0);
        grid.set_region(0, 0, 2, 2, RegionId(1));
        let outline = grid.outline(RegionId(1)).unwrap();
        assert_eq!(
            normalized(&outline.vertices),
            vec![
                Vec2::new(0.0, 0.0),
                Vec2::new(0.0, 20.0),
                Vec2::new(20.0, 20.0),
                Vec2::new(20.0, 0.0),
            ]
        );
        assert_eq!(outline.edge_count, 8);
        assert_eq!(outline.ignored_edge_count, 0);
    }

    #[test]
    fn rectangles_reduce_to_four_corners() {
        for (x, y, w, h) in [(0, 0, 1, 1), (1, 2, 5, 1), (3, 0, 2, 7), (0, 0, 8, 8)] {
            let mut grid = grid(8, 8, 1.0);
            grid.set_region(x, y, w, h, RegionId(5));
            let outline = grid.outline(RegionId(5)).unwrap();
            let (x, y, w, h) = (x as f32, y as f32, w as f32, h as f32);
            assert_eq!(
                normalized(&outline.vertices),
                vec![
                    Vec2::new(x, y),
                    Vec2::new(x, y + h),
                    Vec2::new(x + w, y + h),
                    Vec2::new(x + w, y),
                ]
            );
            assert_eq!(outline.edge_count as f32, 2.0 * (w + h));
        }
    }

    #[test]
    fn l_shape_has_six_corners() {
        let mut grid = grid(4, 4, 1.0);
        grid.set_region(0, 0, 3, 1, RegionId(2));
        grid.set_region(0, 1, 1, 2, RegionId(2));
        let outline = grid.outline(RegionId(2)).unwrap();
        assert_eq!(
            normalized(&outline.vertices),
            vec![
                Vec2::new(0.0, 0.0),
                Vec2::new(0.0, 3.0),
                Vec2::new(1.0, 3.0),
                Vec2::new(1.0, 1.0),
                Vec2::new(3.0, 1.0),
                Vec2::new(3.0, 0.0),
            ]
        );
    }

    #[test]
    fn edges_follow_fixed_orientation() {
        let mut grid = grid(3, 3, 1.0);
        grid.set_region_id(1, 1, RegionId(1));
        let edges = grid.border_edges(RegionId(1), &[IVec2::new(1, 1)]);
        assert_eq!(edges.len(), 4);
        assert_eq!(edges[&IVec2::new(1, 1)].end, IVec2::new(1, 2));
        assert_eq!(edges[&IVec2::new(1, 2)].end, IVec2::new(2, 2));
        assert_eq!(edges[&IVec2::new(2, 2)].end, IVec2::new(2, 1));
        assert_eq!(edges[&IVec2::new(2, 1)].end, IVec2::new(1, 1));
    }

    #[test]
    fn neighbouring_regions_do_not_affect_each_other() {
        let mut grid = grid(4, 2, 1.0);
        grid.set_region(0, 0, 2, 2, RegionId(1));
        grid.set_region(2, 0, 2, 2, RegionId(2));
        let left = grid.outline(RegionId(1)).unwrap();
        let right = grid.outline(RegionId(2)).unwrap();
        assert_eq!(left.vertices.len(), 4);
        assert_eq!(right.vertices.len(), 4);
        assert!(right.vertices.contains(&Vec2::new(2.0, 0.0)));
        assert!(right.vertices.contains(&Vec2::new(4.0, 2.0)));
    }

    #[test]
    fn holes_are_ignored() {
        let mut grid = grid(5, 5, 1.0);
        grid.set_region(0, 0, 5, 5, RegionId(1));
        grid.set_region_id(2, 2, RegionId(2));
        let outline = grid.outline(RegionId(1)).unwrap();
        assert_eq!(outline.vertices.len(), 4);
        assert_eq!(outline.edge_count, 24);
        assert_eq!(outline.ignored_edge_count, 4);
    }

    #[test]
    fn disjoint_parts_are_ignored() {
        let mut grid = grid(6, 2, 1.0);
        grid.set_region_id(0, 0, RegionId(1));
        grid.set_region(4, 0, 2, 2, RegionId(1));
        let outline = grid.outline(RegionId(1)).unwrap();
        assert_eq!(
            normalized(&outline.vertices),
            vec![
                Vec2::new(0.0, 0.0),
                Vec2::new(0.0, 1.0),
                Vec2::new(1.0, 1.0),
                Vec2::new(1.0, 0.0),
            ]
        );
        assert_eq!(outline.ignored_edge_count, 8);
    }

    #[test]
    fn empty_region_fails() {
        let grid = grid(2, 2, 1.0);
        assert_eq!(
            grid.outline(RegionId(1)),
            Err(OutlineError::NoEdges {
                region: RegionId(1)
            })
        );
    }

    #[test]
    fn open_chain_fails() {
        let mut edges = HashMap::new();
        let edge = BorderEdge {
            start: IVec2::ZERO,
            end: IVec2::Y,
        };
        edges.insert(edge.start, edge);
        assert_eq!(
            chain_edges(RegionId(3), &edges),
            Err(OutlineError::BrokenChain {
                region: RegionId(3),
                corner: IVec2::Y
            })
        );
    }
}
