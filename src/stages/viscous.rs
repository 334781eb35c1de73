//! Implicit viscous diffusion by fixed-count Jacobi relaxation.

use glam::Vec2;

use super::par_fill;
use crate::boundary::{BoundaryPolicy, fetch};
use crate::buffer::BufferPair;
use crate::field::Field;

#[derive(Debug, Clone, Copy)]
pub struct ViscousParams {
    pub viscosity: f32,
    pub dt: f32,
    pub policy: BoundaryPolicy,
}

/// One Jacobi sweep: each texel becomes the weighted average of its original
/// value and the four neighbours of the previous iterate.
pub fn jacobi_step(
    original: &Field<Vec2>,
    previous: &Field<Vec2>,
    out: &mut Field<Vec2>,
    params: &ViscousParams,
) {
    let a = params.viscosity * params.dt;
    let inv = 1.0 / (4.0 * (1.0 + a));
    let policy = params.policy;
    par_fill(out, |x, y| {
        let (xi, yi) = (x as i32, y as i32);
        let neighbours = fetch(previous, xi - 1, yi, policy)
            + fetch(previous, xi + 1, yi, policy)
            + fetch(previous, xi, yi - 1, policy)
            + fetch(previous, xi, yi + 1, policy);
        (original.get(x, y) * 4.0 + neighbours * a) * inv
    });
}

/// Runs exactly `iterations` sweeps starting from `original`. The result is
/// left in `iterates.read()`.
pub fn diffuse(
    original: &Field<Vec2>,
    iterates: &mut BufferPair<Vec2>,
    iterations: u32,
    params: &ViscousParams,
) {
    for i in 0..iterations {
        let (previous, out) = iterates.split();
        let previous = if i == 0 { original } else { previous };
        jacobi_step(original, previous, out, params);
        iterates.swap();
    }
}
