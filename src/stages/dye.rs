//! Dye injection and fade.

use glam::Vec2;
use rayon::prelude::*;

use super::force::Splat;
use super::par_fill;
use crate::field::Field;

/// Writes `source` plus each splat's dye contribution into `out`.
pub fn splat(source: &Field<f32>, out: &mut Field<f32>, splats: &[Splat]) {
    par_fill(out, |x, y| {
        let pos = Vec2::new(x as f32, y as f32);
        splats
            .iter()
            .filter(|s| s.dye != 0.0)
            .fold(source.get(x, y), |d, s| d + s.dye * s.weight_at(pos))
    });
}

/// Scales every texel by `factor`.
pub fn dissipate(field: &mut Field<f32>, factor: f32) {
    field.data_mut().par_iter_mut().for_each(|d| *d *= factor);
}
