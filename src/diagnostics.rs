//! Summary statistics over the committed fields.

use glam::Vec2;
use serde::Serialize;

use crate::boundary::BoundaryPolicy;
use crate::constants::DYE_FOOTPRINT_THRESHOLD;
use crate::field::Field;
use crate::stages::divergence;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FrameStats {
    pub avg_speed: f32,
    pub max_speed: f32,
    pub avg_divergence: f32,
    pub max_divergence: f32,
    pub dye_total: f32,
    pub dye_footprint: f32,
}

impl FrameStats {
    pub fn collect(velocity: &Field<Vec2>, dye: &Field<f32>, policy: BoundaryPolicy) -> Self {
        let cells = velocity.data().len().max(1) as f32;

        let mut sum_speed = 0.0f32;
        let mut max_speed = 0.0f32;
        for v in velocity.data() {
            let s = v.length();
            sum_speed += s;
            max_speed = max_speed.max(s);
        }

        let (sum_div, max_div) = divergence_totals(velocity, policy);

        let mut dye_total = 0.0f32;
        let mut nonzero = 0usize;
        for &d in dye.data() {
            dye_total += d;
            if d > DYE_FOOTPRINT_THRESHOLD {
                nonzero += 1;
            }
        }

        Self {
            avg_speed: sum_speed / cells,
            max_speed,
            avg_divergence: sum_div / cells,
            max_divergence: max_div,
            dye_total,
            dye_footprint: nonzero as f32 / cells,
        }
    }
}

/// Sum and max of `|div|` using the solver's own operator.
fn divergence_totals(velocity: &Field<Vec2>, policy: BoundaryPolicy) -> (f32, f32) {
    let cell_scale = velocity.size().cell_scale();
    let mut sum = 0.0f32;
    let mut max = 0.0f32;
    for y in 0..velocity.height() {
        for x in 0..velocity.width() {
            let d = divergence::at(velocity, x, y, cell_scale, policy).abs();
            sum += d;
            max = max.max(d);
        }
    }
    (sum, max)
}

/// Mean absolute divergence of `velocity`.
pub fn mean_abs_divergence(velocity: &Field<Vec2>, policy: BoundaryPolicy) -> f32 {
    let (sum, _) = divergence_totals(velocity, policy);
    sum / velocity.data().len().max(1) as f32
}

/// Largest speed in `velocity`.
pub fn max_speed(velocity: &Field<Vec2>) -> f32 {
    velocity.data().iter().map(|v| v.length()).fold(0.0, f32::max)
}
