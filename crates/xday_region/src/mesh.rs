//! Triangle meshes generated from region outlines.

use glam::{UVec3, Vec2, Vec3A};
use thiserror::Error;

use crate::math::{DIRECTION_EPSILON, signed_area_doubled};

/// Settings for the meshes of one level of detail.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct MeshLodConfig {
    /// Distance from each outline corner at which rounding starts. `[Units: wu]`
    pub border_size: f32,
    /// Segments per rounded corner. A value of zero disables rounding.
    pub corner_segments: u32,
    /// Width of the border strip. A value of zero disables the border mesh. `[Units: wu]`
    pub border_width: f32,
    /// Height of the generated meshes along the y-axis. `[Units: wu]`
    pub height: f32,
}

impl Default for MeshLodConfig {
    fn default() -> Self {
        Self {
            border_size: 0.5,
            corner_segments: 4,
            border_width: 0.2,
            height: 0.0,
        }
    }
}

/// A triangle list in the xz-plane. Outline coordinates `(x, y)` map to `(x, height, y)`.
///
/// All triangles face up, towards +y.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct RegionMesh {
    /// The vertices of the mesh.
    pub vertices: Vec<Vec3A>,
    /// Vertex indices, one entry per triangle.
    pub indices: Vec<UVec3>,
}

impl RegionMesh {
    /// Triangulates a closed polygon by ear clipping. Either winding is accepted.
    ///
    /// Repeated and colinear vertices are dropped before triangulating, so a polygon with `n`
    /// remaining vertices yields `n - 2` triangles.
    pub fn fill(outline: &[Vec2], height: f32) -> Result<Self, MeshError> {
        let mut points = simplify(outline);
        if points.len() < 3 {
            return Err(MeshError::TooFewVertices {
                count: points.len(),
            });
        }
        if signed_area_doubled(&points) < 0.0 {
            points.reverse();
        }

        let mut remaining: Vec<usize> = (0..points.len()).collect();
        let mut indices = Vec::with_capacity(points.len() - 2);
        while remaining.len() > 3 {
            let Some(ear) = find_ear(&points, &remaining) else {
                return Err(MeshError::NoEar {
                    remaining: remaining.len(),
                });
            };
            let len = remaining.len();
            push_up_facing(
                &mut indices,
                &points,
                remaining[prev(ear, len)],
                remaining[ear],
                remaining[next(ear, len)],
            );
            remaining.remove(ear);
        }
        push_up_facing(&mut indices, &points, remaining[0], remaining[1], remaining[2]);

        Ok(Self {
            vertices: lift(&points, height),
            indices,
        })
    }

    /// Builds a strip of quads of the given `width` along the inside of a closed polygon.
    pub fn border(outline: &[Vec2], width: f32, height: f32) -> Result<Self, MeshError> {
        let points = simplify(outline);
        let count = points.len();
        if count < 3 {
            return Err(MeshError::TooFewVertices { count });
        }
        // Inward normal of an edge direction.
        let clockwise = signed_area_doubled(&points) < 0.0;
        let inward = |dir: Vec2| {
            if clockwise {
                Vec2::new(dir.y, -dir.x)
            } else {
                Vec2::new(-dir.y, dir.x)
            }
        };

        let mut ring = Vec::with_capacity(count * 2);
        for i in 0..count {
            let p = points[i];
            let n0 = inward((p - points[prev(i, count)]).normalize_or_zero());
            let n1 = inward((points[next(i, count)] - p).normalize_or_zero());
            let miter = (n0 + n1).normalize_or(n0);
            // Limit the miter on sharp corners.
            let scale = width / miter.dot(n0).max(0.25);
            ring.push(p);
            ring.push(p + miter * scale);
        }

        let mut indices = Vec::with_capacity(count * 2);
        for i in 0..count {
            let outer = 2 * i;
            let inner = outer + 1;
            let next_outer = 2 * next(i, count);
            let next_inner = next_outer + 1;
            push_up_facing(&mut indices, &ring, outer, inner, next_outer);
            push_up_facing(&mut indices, &ring, inner, next_inner, next_outer);
        }

        Ok(Self {
            vertices: lift(&ring, height),
            indices,
        })
    }

    /// Extends the mesh with the vertices and indices of another mesh.
    /// The indices of `other` will be offset by the number of vertices in `self`.
    pub fn extend(&mut self, other: RegionMesh) {
        if self.vertices.len() > u32::MAX as usize {
            panic!("Cannot extend a region mesh with more than 2^32 vertices");
        }
        let next_vertex_index = self.vertices.len() as u32;
        self.vertices.extend(other.vertices);
        self.indices
            .extend(other.indices.iter().map(|i| i + next_vertex_index));
    }

    /// Returns `true` if the mesh has no triangles.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Total area of all triangles, measured in the xz-plane.
    pub fn area(&self) -> f32 {
        self.indices
            .iter()
            .map(|triangle| {
                let a = self.vertices[triangle.x as usize];
                let b = self.vertices[triangle.y as usize];
                let c = self.vertices[triangle.z as usize];
                0.5 * (b - a).cross(c - a).length()
            })
            .sum()
    }
}

/// Errors that can occur when building a [`RegionMesh`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MeshError {
    /// Fewer than three distinct, non-colinear vertices.
    #[error("Polygon has {count} usable vertices, at least 3 are required")]
    TooFewVertices {
        /// The number of usable vertices
        count: usize,
    },
    /// The polygon is self-intersecting, so ear clipping got stuck.
    #[error("Found no ear to clip with {remaining} vertices left, the polygon is not simple")]
    NoEar {
        /// The number of vertices that were left untriangulated
        remaining: usize,
    },
}

#[inline]
fn prev(i: usize, n: usize) -> usize {
    if i >= 1 { i - 1 } else { n - 1 }
}

#[inline]
fn next(i: usize, n: usize) -> usize {
    if i + 1 < n { i + 1 } else { 0 }
}

#[inline]
fn area2(a: Vec2, b: Vec2, c: Vec2) -> f32 {
    (b - a).perp_dot(c - a)
}

fn lift(points: &[Vec2], height: f32) -> Vec<Vec3A> {
    points
        .iter()
        .map(|p| Vec3A::new(p.x, height, p.y))
        .collect()
}

/// Drops repeated vertices and vertices lying on the line through their neighbours.
fn simplify(outline: &[Vec2]) -> Vec<Vec2> {
    let mut points: Vec<Vec2> = Vec::with_capacity(outline.len());
    for &point in outline {
        if points.last().is_none_or(|last| last.distance_squared(point) > f32::EPSILON) {
            points.push(point);
        }
    }
    while points.len() > 1
        && points
            .first()
            .zip(points.last())
            .is_some_and(|(first, last)| first.distance_squared(*last) <= f32::EPSILON)
    {
        points.pop();
    }

    let mut changed = true;
    while changed && points.len() >= 3 {
        changed = false;
        let count = points.len();
        for i in 0..count {
            let a = points[prev(i, count)];
            let b = points[i];
            let c = points[next(i, count)];
            let d0 = (b - a).normalize_or_zero();
            let d1 = (c - b).normalize_or_zero();
            if d0.perp_dot(d1).abs() < DIRECTION_EPSILON && d0.dot(d1) > 0.0 {
                points.remove(i);
                changed = true;
                break;
            }
        }
    }
    points
}

/// Finds a convex vertex of the counter-clockwise polygon `remaining` whose triangle holds no
/// other vertex.
fn find_ear(points: &[Vec2], remaining: &[usize]) -> Option<usize> {
    let len = remaining.len();
    (0..len).find(|&i| {
        let ia = remaining[prev(i, len)];
        let ib = remaining[i];
        let ic = remaining[next(i, len)];
        let (a, b, c) = (points[ia], points[ib], points[ic]);
        if area2(a, b, c) <= f32::EPSILON {
            return false;
        }
        !remaining.iter().any(|&j| {
            if j == ia || j == ib || j == ic {
                return false;
            }
            let p = points[j];
            if p == a || p == b || p == c {
                return false;
            }
            area2(a, b, p) >= 0.0 && area2(b, c, p) >= 0.0 && area2(c, a, p) >= 0.0
        })
    })
}

/// Pushes the triangle so that its normal points along +y once lifted into the xz-plane.
fn push_up_facing(indices: &mut Vec<UVec3>, points: &[Vec2], a: usize, b: usize, c: usize) {
    // Counter-clockwise in (x, y) becomes downward facing in (x, z).
    if area2(points[a], points[b], points[c]) > 0.0 {
        indices.push(UVec3::new(a as u32, c as u32, b as u32));
    } else {
        indices.push(UVec3::new(a as u32, b as u32, c as u32));
    }
}
