//! Pointer input and the per-frame motion derived from it.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::constants::POINTER_DYE;
use crate::field::GridSize;
use crate::params::SimParams;
use crate::stages::force::Splat;

/// What the input collaborator reports before each frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PointerInput {
    /// Position in normalized device coordinates, `[-1, 1]` on both axes,
    /// y up.
    pub position: Vec2,
    /// True only while a drag or move gesture is in progress.
    #[serde(default)]
    pub active: bool,
}

impl PointerInput {
    pub fn at(x: f32, y: f32) -> Self {
        Self {
            position: Vec2::new(x, y),
            active: true,
        }
    }

    pub fn idle() -> Self {
        Self::default()
    }
}

/// Pointer movement over one frame, in NDC.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerMotion {
    pub position: Vec2,
    pub delta: Vec2,
}

impl PointerMotion {
    /// The splat this motion injects, or `None` when the pointer did not move.
    pub fn to_splat(&self, size: GridSize, params: &SimParams) -> Option<Splat> {
        if self.delta == Vec2::ZERO {
            return None;
        }
        let extent = Vec2::new(size.width as f32, size.height as f32);
        Some(Splat {
            position: (self.position * 0.5 + Vec2::splat(0.5)) * extent - Vec2::splat(0.5),
            force: self.delta * 0.5 * params.mouse_force,
            radius: params.cursor_size,
            dye: POINTER_DYE,
        })
    }
}

/// Remembers only the previous position; nothing else survives a frame.
#[derive(Debug, Default, Clone)]
pub struct PointerTracker {
    previous: Option<Vec2>,
}

impl PointerTracker {
    /// Consumes this frame's input. Inactive input yields no motion and
    /// forgets the previous position, so the next gesture starts without a
    /// jump.
    pub fn advance(&mut self, input: &PointerInput) -> Option<PointerMotion> {
        if !input.active || !input.position.is_finite() {
            self.previous = None;
            return None;
        }
        let position = input.position.clamp(Vec2::NEG_ONE, Vec2::ONE);
        let delta = self.previous.map_or(Vec2::ZERO, |prev| position - prev);
        self.previous = Some(position);
        Some(PointerMotion { position, delta })
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_of_a_gesture_has_no_delta() {
        let mut tracker = PointerTracker::default();
        let m = tracker.advance(&PointerInput::at(0.2, 0.1)).unwrap();
        assert_eq!(m.delta, Vec2::ZERO);
        let m = tracker.advance(&PointerInput::at(0.3, 0.1)).unwrap();
        assert!((m.delta - Vec2::new(0.1, 0.0)).length() < 1e-6);
    }

    #[test]
    fn inactive_pointer_resets_the_gesture() {
        let mut tracker = PointerTracker::default();
        tracker.advance(&PointerInput::at(-0.5, -0.5));
        assert!(tracker.advance(&PointerInput::idle()).is_none());
        let m = tracker.advance(&PointerInput::at(0.5, 0.5)).unwrap();
        assert_eq!(m.delta, Vec2::ZERO);
    }

    #[test]
    fn motion_maps_to_grid_splat() {
        let size = GridSize::new(101, 51);
        let params = SimParams::default();
        let motion = PointerMotion {
            position: Vec2::ZERO,
            delta: Vec2::new(0.1, 0.0),
        };
        let splat = motion.to_splat(size, &params).unwrap();
        assert_eq!(splat.position, Vec2::new(50.0, 25.0));
        assert!((splat.force.x - 0.1 * 0.5 * params.mouse_force).abs() < 1e-6);
        assert_eq!(splat.radius, params.cursor_size);

        // Texel centres are integers, so the bottom-left corner of the
        // viewport is half a texel outside texel (0, 0).
        let corner = PointerMotion {
            position: Vec2::new(-1.0, -1.0),
            delta: Vec2::new(0.1, 0.0),
        };
        let splat = corner.to_splat(size, &params).unwrap();
        assert_eq!(splat.position, Vec2::new(-0.5, -0.5));

        let still = PointerMotion {
            position: Vec2::ZERO,
            delta: Vec2::ZERO,
        };
        assert!(still.to_splat(size, &params).is_none());
    }
}
