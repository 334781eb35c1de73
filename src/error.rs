//! Error types for the fluid core.

use std::collections::TryReserveError;
use std::fmt;

use thiserror::Error;

/// Simulation stage names, used to attribute failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Setup,
    Seed,
    Advection,
    Force,
    Viscous,
    Divergence,
    Pressure,
    Projection,
    Dye,
    Color,
    Submit,
    Readback,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Setup => "device setup",
            Stage::Seed => "seed",
            Stage::Advection => "advection",
            Stage::Force => "force",
            Stage::Viscous => "viscous diffusion",
            Stage::Divergence => "divergence",
            Stage::Pressure => "pressure",
            Stage::Projection => "projection",
            Stage::Dye => "dye",
            Stage::Color => "color",
            Stage::Submit => "frame submission",
            Stage::Readback => "readback",
        };
        f.write_str(name)
    }
}

/// Why a backing allocation could not be created.
#[derive(Debug, Error)]
pub enum AllocError {
    #[error("host allocation failed: {0}")]
    Host(#[from] TryReserveError),

    #[error("grid of {0} texels overflows addressable size")]
    Overflow(usize),

    #[error("device allocation failed: {0}")]
    Device(String),
}

/// Errors surfaced by the fluid core to the hosting shell.
#[derive(Debug, Error)]
pub enum FluidError {
    /// A field buffer could not be allocated. Fatal to the session.
    #[error("failed to allocate {resource} at {width}x{height}: {source}")]
    Allocation {
        resource: &'static str,
        width: u32,
        height: u32,
        #[source]
        source: AllocError,
    },

    /// A stage produced unusable output; the frame was discarded.
    #[error("{stage} stage failed: {reason}")]
    Stage { stage: Stage, reason: String },

    /// The compute device reported an error.
    #[error("device error during {stage}: {message}")]
    Device { stage: Stage, message: String },

    /// No compute adapter is available.
    #[error("no GPU adapter available")]
    NoAdapter,

    /// A lifecycle call arrived in a state that cannot serve it.
    #[error("cannot {op} while {state}")]
    InvalidState { op: &'static str, state: String },
}

impl FluidError {
    pub fn allocation(resource: &'static str, width: u32, height: u32, source: AllocError) -> Self {
        Self::Allocation {
            resource,
            width,
            height,
            source,
        }
    }

    pub fn stage(stage: Stage, reason: impl Into<String>) -> Self {
        Self::Stage {
            stage,
            reason: reason.into(),
        }
    }

    /// Whether the session can continue after this error.
    ///
    /// Stage failures only cost the current frame; everything else needs the
    /// hosting shell to intervene.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FluidError::Stage { .. })
    }
}

pub type Result<T, E = FluidError> = std::result::Result<T, E>;
