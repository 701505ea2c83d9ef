use glam::{IVec2, Vec2};

/// Tolerance used when comparing normalized directions.
pub(crate) const DIRECTION_EPSILON: f32 = 1.0e-4;

/// An axis-aligned bounding box on the grid plane.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Aabb2d {
    /// The minimum point of the box
    pub min: Vec2,
    /// The maximum point of the box
    pub max: Vec2,
}

impl Aabb2d {
    /// Creates a new AABB from a center point and half extents.
    #[inline]
    pub fn new(center: impl Into<Vec2>, half_size: impl Into<Vec2>) -> Self {
        let center = center.into();
        let half_size = half_size.into();
        Self {
            min: center - half_size,
            max: center + half_size,
        }
    }

    /// Computes the AABB of a set of points. Returns `None` if `points` is empty.
    pub fn from_points(points: &[Vec2]) -> Option<Self> {
        let first = *points.first()?;
        let (min, max) = points
            .iter()
            .fold((first, first), |(min, max), p| (min.min(*p), max.max(*p)));
        Some(Self { min, max })
    }

    /// Grows the box to contain `other`.
    #[inline]
    pub fn union(self, other: Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// The center of the box.
    #[inline]
    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    /// Returns `true` if `point` lies inside the box or on its border.
    #[inline]
    pub fn contains(&self, point: Vec2) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }
}

/// Gets the standard x-axis offset for the specified direction.
///
/// Directions are ordered left, top, right, bottom.
#[inline]
pub(crate) fn dir_offset_x(direction: u8) -> i32 {
    const OFFSET: [i32; 4] = [-1, 0, 1, 0];
    OFFSET[direction as usize & 0x03]
}

/// Gets the standard y-axis offset for the specified direction.
///
/// Directions are ordered left, top, right, bottom.
#[inline]
pub(crate) fn dir_offset_y(direction: u8) -> i32 {
    const OFFSET: [i32; 4] = [0, 1, 0, -1];
    OFFSET[direction as usize & 0x03]
}

#[inline]
pub(crate) fn dir_offset(direction: u8) -> IVec2 {
    IVec2::new(dir_offset_x(direction), dir_offset_y(direction))
}

/// The four diagonal offsets.
pub(crate) const DIAGONALS: [IVec2; 4] = [
    IVec2::new(1, 1),
    IVec2::new(1, -1),
    IVec2::new(-1, 1),
    IVec2::new(-1, -1),
];

/// Equivalent to the y component of `a.extend(0).cross(b.extend(0))` when `a` and `b` are
/// lifted onto the XZ plane, i.e. `(x, y)` becomes `(x, 0, y)`.
#[inline]
pub(crate) fn cross_y(a: Vec2, b: Vec2) -> f32 {
    a.y * b.x - a.x * b.y
}

/// `true` if the normalized directions point the same or exactly the opposite way.
#[inline]
pub(crate) fn same_direction(a: Vec2, b: Vec2) -> bool {
    (a.dot(b).abs() - 1.0).abs() < DIRECTION_EPSILON
}

/// Twice the signed area of a polygon. Positive for counter-clockwise winding.
pub(crate) fn signed_area_doubled(points: &[Vec2]) -> f32 {
    let mut area = 0.0;
    let mut j = points.len().wrapping_sub(1);
    for (i, p) in points.iter().enumerate() {
        let q = points[j];
        area += q.perp_dot(*p);
        j = i;
    }
    area
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_y_is_negative_for_left_turns() {
        // east, then north
        assert!(cross_y(Vec2::X, Vec2::Y) < 0.0);
        // east, then south
        assert!(cross_y(Vec2::X, Vec2::NEG_Y) > 0.0);
    }

    #[test]
    fn reversed_directions_count_as_same() {
        assert!(same_direction(Vec2::X, Vec2::X));
        assert!(same_direction(Vec2::X, Vec2::NEG_X));
        assert!(!same_direction(Vec2::X, Vec2::Y));
    }

    #[test]
    fn signed_area_of_ccw_square_is_positive() {
        let square = [Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y];
        assert_eq!(signed_area_doubled(&square), 2.0);
        let mut cw = square;
        cw.reverse();
        assert_eq!(signed_area_doubled(&cw), -2.0);
    }

    #[test]
    fn aabb_from_points() {
        let aabb = Aabb2d::from_points(&[Vec2::new(1.0, 5.0), Vec2::new(-2.0, 3.0)]).unwrap();
        assert_eq!(aabb.min, Vec2::new(-2.0, 3.0));
        assert_eq!(aabb.max, Vec2::new(1.0, 5.0));
        assert!(Aabb2d::from_points(&[]).is_none());
    }
}
