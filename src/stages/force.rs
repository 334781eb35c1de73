//! External force injection.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::par_fill;
use crate::field::Field;

/// A localized injection of momentum and dye.
///
/// The pointer is one producer; anything else that wants to push the fluid
/// queues splats of the same shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Splat {
    /// Centre in grid cells.
    pub position: Vec2,
    /// Velocity added at the centre, in domain units per second.
    pub force: Vec2,
    /// Radius of influence in grid cells.
    pub radius: f32,
    /// Dye concentration added at the centre.
    #[serde(default)]
    pub dye: f32,
}

impl Splat {
    /// Weight of this splat at `pos`.
    #[inline]
    pub fn weight_at(&self, pos: Vec2) -> f32 {
        falloff(pos.distance(self.position), self.radius)
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite()
            && self.force.is_finite()
            && self.radius.is_finite()
            && self.dye.is_finite()
    }
}

/// Smooth radial falloff, 1 at the centre and 0 with zero slope at `radius`.
#[inline]
pub fn falloff(distance: f32, radius: f32) -> f32 {
    if radius <= 0.0 || distance >= radius {
        return 0.0;
    }
    let q = distance / radius;
    let s = 1.0 - q * q;
    s * s * s
}

/// Writes `source` plus every splat's impulse into `out`. With no splats this
/// is an identity pass.
pub fn apply(source: &Field<Vec2>, out: &mut Field<Vec2>, splats: &[Splat]) {
    par_fill(out, |x, y| {
        let pos = Vec2::new(x as f32, y as f32);
        splats
            .iter()
            .fold(source.get(x, y), |v, s| v + s.force * s.weight_at(pos))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::GridSize;

    #[test]
    fn falloff_is_smooth_and_bounded() {
        assert_eq!(falloff(0.0, 10.0), 1.0);
        assert_eq!(falloff(10.0, 10.0), 0.0);
        assert_eq!(falloff(25.0, 10.0), 0.0);
        // Approaches zero continuously instead of cutting off.
        let near_edge = falloff(9.9, 10.0);
        assert!(near_edge > 0.0 && near_edge < 1e-5, "{near_edge}");
        let mut prev = 1.0;
        for i in 1..=10 {
            let w = falloff(i as f32, 10.0);
            assert!(w < prev);
            prev = w;
        }
    }

    #[test]
    fn no_splats_is_identity() {
        let size = GridSize::new(8, 8);
        let source = Field::from_fn(size, |x, y| Vec2::new(x as f32, -(y as f32))).unwrap();
        let mut out = Field::zeroed(size).unwrap();
        apply(&source, &mut out, &[]);
        assert_eq!(out, source);
    }

    #[test]
    fn impulse_peaks_at_centre() {
        let size = GridSize::new(32, 32);
        let source = Field::zeroed(size).unwrap();
        let mut out = Field::zeroed(size).unwrap();
        let splat = Splat {
            position: Vec2::new(16.0, 16.0),
            force: Vec2::new(3.0, 0.0),
            radius: 6.0,
            dye: 0.0,
        };
        apply(&source, &mut out, &[splat]);

        assert_eq!(out.get(16, 16), Vec2::new(3.0, 0.0));
        assert!(out.get(19, 16).x > 0.0 && out.get(19, 16).x < 3.0);
        assert_eq!(out.get(16, 22), Vec2::ZERO);
        assert_eq!(out.get(0, 0), Vec2::ZERO);
    }
}
