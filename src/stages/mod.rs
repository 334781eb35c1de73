//! Per-stage kernels of the frame pipeline.
//!
//! Every kernel is a pure function from read field(s) and parameters to a
//! write field. Rows are evaluated in parallel; a kernel never reads the
//! field it writes.

pub mod advect;
pub mod color;
pub mod divergence;
pub mod dye;
pub mod force;
pub mod pressure;
pub mod project;
pub mod viscous;

use rayon::prelude::*;

use crate::error::{FluidError, Result, Stage};
use crate::field::{Field, Texel};

/// Assigns every texel of `out` exactly once from `f(x, y)`.
pub(crate) fn par_fill<T, F>(out: &mut Field<T>, f: F)
where
    T: Texel,
    F: Fn(u32, u32) -> T + Sync + Send,
{
    let width = out.width() as usize;
    out.data_mut()
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, texel) in row.iter_mut().enumerate() {
                *texel = f(x as u32, y as u32);
            }
        });
}

/// Fails the stage if its output holds NaN or infinity.
pub(crate) fn ensure_finite<T: Texel>(field: &Field<T>, stage: Stage) -> Result<()> {
    match field.first_non_finite() {
        None => Ok(()),
        Some((x, y)) => Err(FluidError::stage(
            stage,
            format!("non-finite value at texel ({x}, {y})"),
        )),
    }
}
