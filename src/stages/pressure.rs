//! Pressure Poisson solve.
//!
//! Jacobi relaxation on the two-cell-wide five point stencil. That stencil is
//! exactly divergence-of-gradient for the central differences used by the
//! divergence and projection stages, so the projected field's divergence goes
//! to zero as the iteration converges.

use rayon::prelude::*;

use super::par_fill;
use crate::boundary::{BoundaryPolicy, fetch};
use crate::buffer::BufferPair;
use crate::field::Field;

#[derive(Debug, Clone, Copy)]
pub struct PressureParams {
    pub dt: f32,
    pub cell_scale: f32,
    pub policy: BoundaryPolicy,
}

pub fn jacobi_step(
    previous: &Field<f32>,
    divergence: &Field<f32>,
    out: &mut Field<f32>,
    params: &PressureParams,
) {
    let h = 1.0 / params.cell_scale;
    let rhs_scale = h * h / params.dt;
    let policy = params.policy;
    par_fill(out, |x, y| {
        let (xi, yi) = (x as i32, y as i32);
        let sum = fetch(previous, xi - 2, yi, policy)
            + fetch(previous, xi + 2, yi, policy)
            + fetch(previous, xi, yi - 2, policy)
            + fetch(previous, xi, yi + 2, policy);
        sum * 0.25 - divergence.get(x, y) * rhs_scale
    });
}

/// Runs exactly `iterations` sweeps. The first sweep starts from
/// `warm_start`, the previous frame's pressure; the result is left in
/// `iterates.read()`.
pub fn solve(
    warm_start: &Field<f32>,
    divergence: &Field<f32>,
    iterates: &mut BufferPair<f32>,
    iterations: u32,
    params: &PressureParams,
) {
    for i in 0..iterations {
        let (previous, out) = iterates.split();
        let previous = if i == 0 { warm_start } else { previous };
        jacobi_step(previous, divergence, out, params);
        iterates.swap();
    }
}

/// Shifts `pressure` to zero mean.
///
/// With walls on every side pressure is only defined up to a constant, and
/// Jacobi lets that constant drift when the divergence does not sum to zero.
/// Projection sees only differences, so the velocity is unaffected.
pub fn remove_mean(pressure: &mut Field<f32>) {
    let data = pressure.data_mut();
    if data.is_empty() {
        return;
    }
    let sum: f64 = data.par_iter().map(|&v| f64::from(v)).sum();
    let mean = (sum / data.len() as f64) as f32;
    data.par_iter_mut().for_each(|v| *v -= mean);
}
