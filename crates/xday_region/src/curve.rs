//! Rounds the corners of an outline.
//!
//! Each corner is replaced by an arc that starts `border_size` before the corner on the
//! incoming edge and ends `border_size` after it on the outgoing edge. For right-angle corners,
//! which is everything a grid outline produces, the arc is a quarter circle around a center
//! inside the turn. Any other corner is rounded with a quadratic Bézier through the same points.

use std::f32::consts::FRAC_PI_2;

use glam::Vec2;

use crate::math::{DIRECTION_EPSILON, cross_y};

/// Settings for [`curve_outline`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct CurveSettings {
    /// Distance from the corner at which the rounding starts. Also the arc radius.
    pub border_size: f32,
    /// Number of segments each rounded corner is made of.
    pub corner_segments: u32,
}

impl Default for CurveSettings {
    fn default() -> Self {
        Self {
            border_size: 0.5,
            corner_segments: 4,
        }
    }
}

/// Returns a copy of the closed polygon `vertices` with rounded corners.
///
/// Every rounded corner contributes `corner_segments + 1` points. Straight and reversed corners,
/// and corners whose adjacent edges are too short, are kept as they are.
pub fn curve_outline(vertices: &[Vec2], settings: CurveSettings) -> Vec<Vec2> {
    let count = vertices.len();
    if count < 3 || settings.border_size <= 0.0 {
        return vertices.to_vec();
    }
    let segments = settings.corner_segments.max(1);
    let mut curve = Vec::with_capacity(count * (segments as usize + 1));

    for i in 0..count {
        let prev = vertices[(i + count - 1) % count];
        let cur = vertices[i];
        let next = vertices[(i + 1) % count];

        let incoming = cur - prev;
        let outgoing = next - cur;
        let cur_to_prev = incoming.normalize_or_zero();
        let next_to_cur = outgoing.normalize_or_zero();
        let cross = cross_y(cur_to_prev, next_to_cur);
        if cur_to_prev == Vec2::ZERO || next_to_cur == Vec2::ZERO || cross.abs() < DIRECTION_EPSILON
        {
            curve.push(cur);
            continue;
        }
        let is_left_turn = cross < 0.0;

        // Keep neighbouring corners from overlapping on short edges.
        let radius = settings
            .border_size
            .min(incoming.length() * 0.5)
            .min(outgoing.length() * 0.5);
        if radius <= f32::EPSILON {
            curve.push(cur);
            continue;
        }

        let start = cur - cur_to_prev * radius;
        let end = cur + next_to_cur * radius;
        let center = start + next_to_cur * radius;

        let quadrant = Quadrant::classify(start - center, end - center);
        match quadrant {
            Some(quadrant) if cur_to_prev.dot(next_to_cur).abs() < DIRECTION_EPSILON => {
                push_arc(
                    &mut curve,
                    center,
                    radius,
                    quadrant,
                    is_left_turn,
                    segments,
                );
            }
            _ => push_bezier(&mut curve, start, cur, end, segments),
        }
    }
    curve
}

fn push_arc(
    curve: &mut Vec<Vec2>,
    center: Vec2,
    radius: f32,
    quadrant: Quadrant,
    is_left_turn: bool,
    segments: u32,
) {
    let start_angle = quadrant.start_angle();
    for k in 0..=segments {
        let t = k as f32 / segments as f32;
        // Left turns sweep counter-clockwise, right turns clockwise.
        let angle = if is_left_turn {
            start_angle + t * FRAC_PI_2
        } else {
            start_angle + FRAC_PI_2 - t * FRAC_PI_2
        };
        curve.push(center + Vec2::from_angle(angle) * radius);
    }
}

fn push_bezier(curve: &mut Vec<Vec2>, start: Vec2, control: Vec2, end: Vec2, segments: u32) {
    for k in 0..=segments {
        let t = k as f32 / segments as f32;
        let u = 1.0 - t;
        curve.push(start * (u * u) + control * (2.0 * u * t) + end * (t * t));
    }
}

/// One of the four quarters of a circle, counter-clockwise from the positive x-axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quadrant {
    First,
    Second,
    Third,
    Fourth,
}

/// A direction that lies on one of the axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    PosX,
    PosY,
    NegX,
    NegY,
}

impl Axis {
    fn classify(offset: Vec2) -> Option<Self> {
        let length = offset.length();
        if length <= f32::EPSILON {
            return None;
        }
        let tolerance = length * DIRECTION_EPSILON;
        if offset.y.abs() <= tolerance {
            Some(if offset.x > 0.0 { Self::PosX } else { Self::NegX })
        } else if offset.x.abs() <= tolerance {
            Some(if offset.y > 0.0 { Self::PosY } else { Self::NegY })
        } else {
            None
        }
    }
}

impl Quadrant {
    /// Finds the quadrant spanned by two offsets from the circle center.
    /// Returns `None` unless both offsets lie on adjacent axes.
    fn classify(a: Vec2, b: Vec2) -> Option<Self> {
        use Axis::*;
        let a = Axis::classify(a)?;
        let b = Axis::classify(b)?;
        match (a, b) {
            (PosX, PosY) | (PosY, PosX) => Some(Self::First),
            (PosY, NegX) | (NegX, PosY) => Some(Self::Second),
            (NegX, NegY) | (NegY, NegX) => Some(Self::Third),
            (NegY, PosX) | (PosX, NegY) => Some(Self::Fourth),
            _ => None,
        }
    }

    fn start_angle(self) -> f32 {
        match self {
            Self::First => 0.0,
            Self::Second => FRAC_PI_2,
            Self::Third => 2.0 * FRAC_PI_2,
            Self::Fourth => 3.0 * FRAC_PI_2,
        }
    }
}
