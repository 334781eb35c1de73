//! Solver constants and parameter ranges.

// Configuration ranges. Values outside are clamped, never rejected.
pub const RESOLUTION_MIN: f32 = 0.01;
pub const RESOLUTION_MAX: f32 = 1.0;
pub const DT_MIN: f32 = 0.001;
pub const DT_MAX: f32 = 0.1;
pub const MOUSE_FORCE_MAX: f32 = 100.0;
pub const CURSOR_SIZE_MIN: f32 = 10.0;
pub const CURSOR_SIZE_MAX: f32 = 500.0;
pub const VISCOSITY_MAX: f32 = 100.0;
pub const ITERATIONS_MIN: u32 = 1;
pub const ITERATIONS_MAX: u32 = 100;

// Defaults for the configuration record.
pub const DEFAULT_RESOLUTION: f32 = 0.5;
pub const DEFAULT_DT: f32 = 0.014;
pub const DEFAULT_MOUSE_FORCE: f32 = 20.0;
pub const DEFAULT_CURSOR_SIZE: f32 = 100.0;
pub const DEFAULT_VISCOSITY: f32 = 30.0;
pub const DEFAULT_POISSON_ITERATIONS: u32 = 32;
pub const DEFAULT_VISCOUS_ITERATIONS: u32 = 32;

/// Dye concentration added at the centre of a pointer splat.
pub const POINTER_DYE: f32 = 1.0;

/// Fraction of dye kept per frame.
pub const DYE_DISSIPATION: f32 = 0.995;

/// Backtrace positions are limited to this many grid extents outside the
/// domain before boundary mapping.
pub const TRACE_LIMIT: f32 = 1.0;

/// Upper bound on splats applied in one GPU frame.
pub const MAX_GPU_SPLATS: usize = 16;

/// Compute workgroup edge length used by every GPU stage.
pub const WORKGROUP_SIZE: u32 = 8;

/// Dye concentration above which a texel counts towards the footprint.
pub const DYE_FOOTPRINT_THRESHOLD: f32 = 0.01;
