//! Real-time 2D incompressible fluid solver.
//!
//! A collocated-grid stable-fluids pipeline: advection (optionally BFECC
//! corrected), external force, implicit viscous diffusion, divergence,
//! warm-started Jacobi pressure solve and projection, with dye carried along
//! for visualisation. [`Orchestrator`] drives the frame lifecycle over a
//! [`FluidBackend`]; [`CpuBackend`] runs the stages with rayon and
//! [`GpuBackend`] as wgpu compute shaders.
//!
//! ```no_run
//! use stable_fluid::{CpuBackend, Orchestrator, PointerInput, SimParams, Viewport};
//!
//! let params = SimParams::default();
//! let mut fluid = Orchestrator::new(CpuBackend::new());
//! fluid.initialize(Viewport::new(320, 180), &params)?;
//! fluid.tick(&params, &PointerInput::at(0.0, 0.0))?;
//! fluid.tick(&params, &PointerInput::at(0.1, 0.05))?;
//! let frame = fluid.present()?;
//! # Ok::<(), stable_fluid::FluidError>(())
//! ```

pub mod backend;
pub mod boundary;
pub mod buffer;
pub mod constants;
pub mod cpu;
pub mod diagnostics;
pub mod error;
pub mod field;
pub mod gpu;
pub mod orchestrator;
pub mod params;
pub mod pointer;
pub mod stages;

pub use backend::{FieldsRef, FluidBackend, SwirlSeed};
pub use boundary::BoundaryPolicy;
pub use buffer::BufferPair;
pub use cpu::CpuBackend;
pub use diagnostics::FrameStats;
pub use error::{FluidError, Result, Stage};
pub use field::{Field, GridSize, Viewport};
pub use gpu::GpuBackend;
pub use orchestrator::{FrameReport, Orchestrator, SolverState};
pub use params::{ConfigHandle, SimParams};
pub use pointer::{PointerInput, PointerTracker};
pub use stages::color::{ColorMode, TransferFunction};
pub use stages::force::Splat;
