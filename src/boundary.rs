//! Edge handling shared by every stage.
//!
//! [`BoundaryPolicy::Bounce`] mirrors out-of-grid samples across the wall
//! (half-sample symmetric) and negates the wall-normal velocity component, so
//! the wall face carries no net flow. [`BoundaryPolicy::Clamp`] reads the
//! edge texel unchanged.

use std::ops::{Add, Mul, Sub};

use glam::Vec2;

use crate::constants::TRACE_LIMIT;
use crate::field::{Field, Texel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundaryPolicy {
    Bounce,
    #[default]
    Clamp,
}

impl BoundaryPolicy {
    pub fn from_bounce(is_bounce: bool) -> Self {
        if is_bounce {
            BoundaryPolicy::Bounce
        } else {
            BoundaryPolicy::Clamp
        }
    }

    /// Maps coordinate `i` on an axis of length `n` into the grid. The flag
    /// is set when the sample was mirrored across a wall.
    #[inline]
    pub fn map(self, i: i32, n: u32) -> (u32, bool) {
        let last = n as i32 - 1;
        match self {
            BoundaryPolicy::Clamp => (i.clamp(0, last) as u32, false),
            BoundaryPolicy::Bounce => {
                if i < 0 {
                    ((-i - 1).min(last) as u32, true)
                } else if i > last {
                    ((2 * last + 1 - i).max(0) as u32, true)
                } else {
                    (i as u32, false)
                }
            }
        }
    }
}

/// Texels that can be interpolated and reflected at a wall.
pub trait Sample:
    Texel + Add<Output = Self> + Sub<Output = Self> + Mul<f32, Output = Self>
{
    /// Value seen through a wall perpendicular to x and/or y.
    fn reflect(self, across_x: bool, across_y: bool) -> Self;

    fn channel_min(self, other: Self) -> Self;

    fn channel_max(self, other: Self) -> Self;

    #[inline]
    fn channel_clamp(self, lo: Self, hi: Self) -> Self {
        self.channel_max(lo).channel_min(hi)
    }
}

impl Sample for f32 {
    #[inline]
    fn reflect(self, _across_x: bool, _across_y: bool) -> Self {
        self
    }

    #[inline]
    fn channel_min(self, other: Self) -> Self {
        self.min(other)
    }

    #[inline]
    fn channel_max(self, other: Self) -> Self {
        self.max(other)
    }
}

impl Sample for Vec2 {
    #[inline]
    fn reflect(self, across_x: bool, across_y: bool) -> Self {
        Vec2::new(
            if across_x { -self.x } else { self.x },
            if across_y { -self.y } else { self.y },
        )
    }

    #[inline]
    fn channel_min(self, other: Self) -> Self {
        self.min(other)
    }

    #[inline]
    fn channel_max(self, other: Self) -> Self {
        self.max(other)
    }
}

/// Reads texel `(x, y)`, which may lie outside the grid.
#[inline]
pub fn fetch<T: Sample>(field: &Field<T>, x: i32, y: i32, policy: BoundaryPolicy) -> T {
    let (ix, fx) = policy.map(x, field.width());
    let (iy, fy) = policy.map(y, field.height());
    let value = field.get(ix, iy);
    if fx || fy { value.reflect(fx, fy) } else { value }
}

/// The four texels surrounding a continuous position and their bilinear
/// weights along x and y.
#[derive(Debug, Clone, Copy)]
pub struct Taps<T> {
    pub values: [T; 4],
    pub fx: f32,
    pub fy: f32,
}

impl<T: Sample> Taps<T> {
    pub fn gather(field: &Field<T>, pos: Vec2, policy: BoundaryPolicy) -> Self {
        let w = field.width() as f32;
        let h = field.height() as f32;
        let x = pos.x.clamp(-TRACE_LIMIT * w, (1.0 + TRACE_LIMIT) * w);
        let y = pos.y.clamp(-TRACE_LIMIT * h, (1.0 + TRACE_LIMIT) * h);
        let (x, y) = match policy {
            // Clamp-to-edge: positions past the last texel centre sample the edge.
            BoundaryPolicy::Clamp => (x.clamp(0.0, w - 1.0), y.clamp(0.0, h - 1.0)),
            BoundaryPolicy::Bounce => (x, y),
        };
        let x0 = x.floor();
        let y0 = y.floor();
        let (xi, yi) = (x0 as i32, y0 as i32);
        Self {
            values: [
                fetch(field, xi, yi, policy),
                fetch(field, xi + 1, yi, policy),
                fetch(field, xi, yi + 1, policy),
                fetch(field, xi + 1, yi + 1, policy),
            ],
            fx: x - x0,
            fy: y - y0,
        }
    }

    #[inline]
    pub fn interpolate(&self) -> T {
        let [v00, v10, v01, v11] = self.values;
        let bottom = v00 * (1.0 - self.fx) + v10 * self.fx;
        let top = v01 * (1.0 - self.fx) + v11 * self.fx;
        bottom * (1.0 - self.fy) + top * self.fy
    }

    /// Per-channel (min, max) over the four taps.
    #[inline]
    pub fn bounds(&self) -> (T, T) {
        let [a, b, c, d] = self.values;
        (
            a.channel_min(b).channel_min(c).channel_min(d),
            a.channel_max(b).channel_max(c).channel_max(d),
        )
    }
}

/// Bilinear sample at a continuous grid position.
#[inline]
pub fn sample<T: Sample>(field: &Field<T>, pos: Vec2, policy: BoundaryPolicy) -> T {
    Taps::gather(field, pos, policy).interpolate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::GridSize;

    #[test]
    fn clamp_maps_to_edge() {
        let p = BoundaryPolicy::Clamp;
        assert_eq!(p.map(-1, 8), (0, false));
        assert_eq!(p.map(-5, 8), (0, false));
        assert_eq!(p.map(8, 8), (7, false));
        assert_eq!(p.map(3, 8), (3, false));
    }

    #[test]
    fn bounce_mirrors_half_sample() {
        let p = BoundaryPolicy::Bounce;
        assert_eq!(p.map(-1, 8), (0, true));
        assert_eq!(p.map(-2, 8), (1, true));
        assert_eq!(p.map(8, 8), (7, true));
        assert_eq!(p.map(9, 8), (6, true));
        assert_eq!(p.map(4, 8), (4, false));
        // Degenerate single-texel axis stays in range.
        assert_eq!(p.map(-3, 1), (0, true));
        assert_eq!(p.map(3, 1), (0, true));
    }

    #[test]
    fn bounce_negates_normal_velocity_through_wall() {
        let field = Field::from_fn(GridSize::new(4, 4), |_, _| Vec2::new(1.0, 2.0)).unwrap();
        let left = fetch(&field, -1, 2, BoundaryPolicy::Bounce);
        assert_eq!(left, Vec2::new(-1.0, 2.0));
        let top = fetch(&field, 1, 4, BoundaryPolicy::Bounce);
        assert_eq!(top, Vec2::new(1.0, -2.0));
        let corner = fetch(&field, -1, -1, BoundaryPolicy::Bounce);
        assert_eq!(corner, Vec2::new(-1.0, -2.0));
        let clamped = fetch(&field, -1, 2, BoundaryPolicy::Clamp);
        assert_eq!(clamped, Vec2::new(1.0, 2.0));
    }

    #[test]
    fn bilinear_sample_interpolates() {
        let field = Field::from_fn(GridSize::new(4, 4), |x, y| x as f32 + 10.0 * y as f32).unwrap();
        let v = sample(&field, Vec2::new(1.5, 2.25), BoundaryPolicy::Clamp);
        assert!((v - 24.0).abs() < 1e-5, "got {v}");
        let edge = sample(&field, Vec2::new(-3.0, 0.0), BoundaryPolicy::Clamp);
        assert_eq!(edge, 0.0);
    }

    #[test]
    fn taps_bounds_cover_the_interpolant() {
        let field =
            Field::from_fn(GridSize::new(4, 4), |x, y| ((x * 7 + y * 3) % 5) as f32).unwrap();
        let taps = Taps::gather(&field, Vec2::new(1.3, 1.6), BoundaryPolicy::Bounce);
        let (lo, hi) = taps.bounds();
        let v = taps.interpolate();
        assert!(lo <= v && v <= hi);
    }
}
