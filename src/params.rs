//! Simulation parameters and the shared configuration record.

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::field::{GridSize, Viewport};

/// The tunable parameters read by the solver once per frame.
///
/// Field names follow the configuration surface; camelCase aliases are
/// accepted so a browser host can post its store verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimParams {
    pub resolution: f32,
    pub dt: f32,
    #[serde(alias = "isBFECC")]
    pub is_bfecc: bool,
    #[serde(alias = "mouseForce")]
    pub mouse_force: f32,
    #[serde(alias = "cursorSize")]
    pub cursor_size: f32,
    pub viscosity: f32,
    #[serde(alias = "poissonIterations")]
    pub poisson_iterations: u32,
    #[serde(alias = "viscousIterations")]
    pub viscous_iterations: u32,
    #[serde(alias = "isBounce")]
    pub is_bounce: bool,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
            dt: DEFAULT_DT,
            is_bfecc: true,
            mouse_force: DEFAULT_MOUSE_FORCE,
            cursor_size: DEFAULT_CURSOR_SIZE,
            viscosity: DEFAULT_VISCOSITY,
            poisson_iterations: DEFAULT_POISSON_ITERATIONS,
            viscous_iterations: DEFAULT_VISCOUS_ITERATIONS,
            is_bounce: false,
        }
    }
}

fn clamp_or(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}

impl SimParams {
    /// Returns a copy with every field forced into its allowed range.
    /// Non-finite floats fall back to their defaults.
    pub fn clamped(&self) -> Self {
        Self {
            resolution: clamp_or(
                self.resolution,
                RESOLUTION_MIN,
                RESOLUTION_MAX,
                DEFAULT_RESOLUTION,
            ),
            dt: clamp_or(self.dt, DT_MIN, DT_MAX, DEFAULT_DT),
            is_bfecc: self.is_bfecc,
            mouse_force: clamp_or(self.mouse_force, 0.0, MOUSE_FORCE_MAX, DEFAULT_MOUSE_FORCE),
            cursor_size: clamp_or(
                self.cursor_size,
                CURSOR_SIZE_MIN,
                CURSOR_SIZE_MAX,
                DEFAULT_CURSOR_SIZE,
            ),
            viscosity: clamp_or(self.viscosity, 0.0, VISCOSITY_MAX, DEFAULT_VISCOSITY),
            poisson_iterations: self.poisson_iterations.clamp(ITERATIONS_MIN, ITERATIONS_MAX),
            viscous_iterations: self.viscous_iterations.clamp(ITERATIONS_MIN, ITERATIONS_MAX),
            is_bounce: self.is_bounce,
        }
    }

    /// Grid dimensions for a viewport at this resolution, or `None` when the
    /// result would be degenerate.
    pub fn grid_size(&self, viewport: Viewport) -> Option<GridSize> {
        GridSize::from_viewport(viewport, self.resolution)
    }
}

/// Mutable configuration record shared between the configuration
/// collaborator and the frame thread.
///
/// Writers replace whole fields; the frame thread copies the record once per
/// frame through [`ConfigHandle::snapshot`], so a write never lands mid-frame.
#[derive(Debug, Clone, Default)]
pub struct ConfigHandle {
    inner: Arc<RwLock<SimParams>>,
}

impl ConfigHandle {
    pub fn new(params: SimParams) -> Self {
        Self {
            inner: Arc::new(RwLock::new(params)),
        }
    }

    /// Clamped copy of the current parameters.
    pub fn snapshot(&self) -> SimParams {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.clamped()
    }

    /// Applies an edit to the shared record.
    pub fn update(&self, edit: impl FnOnce(&mut SimParams)) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        edit(&mut guard);
    }
}
