//! Discrete divergence of the velocity field.

use glam::Vec2;

use super::par_fill;
use crate::boundary::{BoundaryPolicy, fetch};
use crate::field::Field;

/// Central-difference divergence at one texel.
#[inline]
pub fn at(velocity: &Field<Vec2>, x: u32, y: u32, cell_scale: f32, policy: BoundaryPolicy) -> f32 {
    let (xi, yi) = (x as i32, y as i32);
    let left = fetch(velocity, xi - 1, yi, policy).x;
    let right = fetch(velocity, xi + 1, yi, policy).x;
    let bottom = fetch(velocity, xi, yi - 1, policy).y;
    let top = fetch(velocity, xi, yi + 1, policy).y;
    cell_scale * 0.5 * ((right - left) + (top - bottom))
}

pub fn compute(
    velocity: &Field<Vec2>,
    out: &mut Field<f32>,
    cell_scale: f32,
    policy: BoundaryPolicy,
) {
    par_fill(out, |x, y| at(velocity, x, y, cell_scale, policy));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::GridSize;

    const SIZE: GridSize = GridSize {
        width: 8,
        height: 8,
    };

    #[test]
    fn uniform_flow_has_no_interior_divergence() {
        let velocity = Field::from_fn(SIZE, |_, _| Vec2::new(0.4, -0.2)).unwrap();
        let mut out = Field::zeroed(SIZE).unwrap();
        compute(&velocity, &mut out, 8.0, BoundaryPolicy::Clamp);
        assert!(out.data().iter().all(|d| d.abs() < 1e-6));
    }

    #[test]
    fn radial_outflow_is_positive() {
        let c = SIZE.center();
        let velocity =
            Field::from_fn(SIZE, |x, y| (Vec2::new(x as f32, y as f32) - c) * 0.1).unwrap();
        let mut out = Field::zeroed(SIZE).unwrap();
        compute(&velocity, &mut out, 8.0, BoundaryPolicy::Clamp);
        // d/dx(0.1 x) + d/dy(0.1 y) = 0.2 per cell, times the cell scale.
        assert!((out.get(4, 4) - 1.6).abs() < 1e-5, "{}", out.get(4, 4));
    }

    #[test]
    fn bounce_sees_flow_into_the_wall() {
        let velocity = Field::from_fn(SIZE, |_, _| Vec2::new(-1.0, 0.0)).unwrap();
        let mut bounce = Field::zeroed(SIZE).unwrap();
        let mut clamp = Field::zeroed(SIZE).unwrap();
        compute(&velocity, &mut bounce, 1.0, BoundaryPolicy::Bounce);
        compute(&velocity, &mut clamp, 1.0, BoundaryPolicy::Clamp);
        // Mirrored neighbour carries +1: flow converges at the left wall.
        assert!(bounce.get(0, 4) < 0.0);
        assert_eq!(clamp.get(0, 4), 0.0);
    }
}
