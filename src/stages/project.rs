//! Subtracts the pressure gradient from velocity.

use glam::Vec2;

use super::par_fill;
use crate::boundary::{BoundaryPolicy, fetch};
use crate::field::Field;

#[derive(Debug, Clone, Copy)]
pub struct ProjectParams {
    pub dt: f32,
    pub cell_scale: f32,
    pub policy: BoundaryPolicy,
}

#[inline]
pub fn gradient(
    pressure: &Field<f32>,
    x: u32,
    y: u32,
    cell_scale: f32,
    policy: BoundaryPolicy,
) -> Vec2 {
    let (xi, yi) = (x as i32, y as i32);
    let left = fetch(pressure, xi - 1, yi, policy);
    let right = fetch(pressure, xi + 1, yi, policy);
    let bottom = fetch(pressure, xi, yi - 1, policy);
    let top = fetch(pressure, xi, yi + 1, policy);
    Vec2::new(right - left, top - bottom) * (cell_scale * 0.5)
}

pub fn apply(
    velocity: &Field<Vec2>,
    pressure: &Field<f32>,
    out: &mut Field<Vec2>,
    params: &ProjectParams,
) {
    par_fill(out, |x, y| {
        velocity.get(x, y) - gradient(pressure, x, y, params.cell_scale, params.policy) * params.dt
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::GridSize;

    #[test]
    fn constant_pressure_leaves_velocity_alone() {
        let size = GridSize::new(8, 8);
        let velocity = Field::from_fn(size, |x, _| Vec2::new(x as f32, 1.0)).unwrap();
        let pressure = Field::from_fn(size, |_, _| 3.0).unwrap();
        let mut out = Field::zeroed(size).unwrap();
        let params = ProjectParams {
            dt: 0.02,
            cell_scale: 8.0,
            policy: BoundaryPolicy::Bounce,
        };
        apply(&velocity, &pressure, &mut out, &params);
        assert_eq!(out, velocity);
    }

    #[test]
    fn flow_is_pushed_down_the_gradient() {
        let size = GridSize::new(8, 8);
        let velocity = Field::zeroed(size).unwrap();
        let pressure = Field::from_fn(size, |x, _| x as f32).unwrap();
        let mut out = Field::zeroed(size).unwrap();
        let params = ProjectParams {
            dt: 0.5,
            cell_scale: 2.0,
            policy: BoundaryPolicy::Clamp,
        };
        apply(&velocity, &pressure, &mut out, &params);
        // gradient = 2 * 0.5 * (1 per cell * 2 cells) = 2, times dt = 1.
        let v = out.get(4, 4);
        assert!((v.x + 1.0).abs() < 1e-6, "{v}");
        assert_eq!(v.y, 0.0);
    }
}
