//! Frame orchestration and the lifecycle exposed to the hosting shell.
//!
//! ```text
//! Uninitialized --initialize--> Ready --tick--> Running --> Ready
//!        ^                        |
//!        |                     resize / resolution change
//!     dispose                     v
//!        +------------------- Resizing --> Ready
//! ```
//!
//! All entry points take `&mut self`, so a resize or teardown can only happen
//! between frames; a frame that fails is dropped whole and the next tick
//! starts from the last committed state.

use std::fmt;

use image::RgbaImage;
use image::imageops::{self, FilterType};
use serde::Serialize;

use crate::backend::{FieldsRef, FluidBackend, SwirlSeed};
use crate::boundary::BoundaryPolicy;
use crate::diagnostics::FrameStats;
use crate::error::{FluidError, Result};
use crate::field::{GridSize, Viewport};
use crate::params::SimParams;
use crate::pointer::{PointerInput, PointerTracker};
use crate::stages::color::{self, TransferFunction};
use crate::stages::force::Splat;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverState {
    Uninitialized,
    Ready,
    Running,
    Resizing,
}

impl fmt::Display for SolverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SolverState::Uninitialized => "uninitialized",
            SolverState::Ready => "ready",
            SolverState::Running => "running",
            SolverState::Resizing => "resizing",
        };
        f.write_str(name)
    }
}

/// Outcome of one `tick`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameReport {
    /// Committed frames so far, including this one.
    pub frame: u64,
    pub grid: Option<GridSize>,
    /// Splats applied this frame.
    pub splats: usize,
    /// True when there was nothing to simulate (no valid size yet).
    pub skipped: bool,
}

pub struct Orchestrator<B> {
    backend: B,
    state: SolverState,
    viewport: Option<Viewport>,
    resolution: f32,
    policy: BoundaryPolicy,
    pointer: PointerTracker,
    pending: Vec<Splat>,
    frame: u64,
    transfer: TransferFunction,
}

impl<B: FluidBackend> Orchestrator<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: SolverState::Uninitialized,
            viewport: None,
            resolution: SimParams::default().resolution,
            policy: BoundaryPolicy::default(),
            pointer: PointerTracker::default(),
            pending: Vec::new(),
            frame: 0,
            transfer: TransferFunction::default(),
        }
    }

    pub fn state(&self) -> SolverState {
        self.state
    }

    pub fn grid_size(&self) -> Option<GridSize> {
        self.backend.size()
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn set_transfer_function(&mut self, transfer: TransferFunction) {
        self.transfer = transfer;
    }

    /// Allocates the first set of buffers. A degenerate viewport leaves the
    /// orchestrator uninitialized until `resize` brings a usable one.
    pub fn initialize(&mut self, viewport: Viewport, params: &SimParams) -> Result<()> {
        if self.state != SolverState::Uninitialized {
            return Err(FluidError::InvalidState {
                op: "initialize",
                state: self.state.to_string(),
            });
        }
        let params = params.clamped();
        self.resolution = params.resolution;
        self.policy = BoundaryPolicy::from_bounce(params.is_bounce);
        if viewport.is_degenerate() {
            log::warn!(
                "initialize with degenerate viewport {}x{}; waiting for a resize",
                viewport.width,
                viewport.height
            );
            return Ok(());
        }
        self.reallocate(viewport)
    }

    /// Reallocates for a new viewport. State does not survive a resize.
    pub fn resize(&mut self, viewport: Viewport) -> Result<()> {
        if viewport.is_degenerate() {
            log::warn!(
                "ignoring resize to degenerate viewport {}x{}",
                viewport.width,
                viewport.height
            );
            return Ok(());
        }
        if self.viewport == Some(viewport) && self.state == SolverState::Ready {
            return Ok(());
        }
        self.reallocate(viewport)
    }

    fn reallocate(&mut self, viewport: Viewport) -> Result<()> {
        let Some(size) = GridSize::from_viewport(viewport, self.resolution) else {
            return Ok(());
        };
        self.state = SolverState::Resizing;
        self.pending.clear();
        self.backend.release();
        match self.backend.allocate(size) {
            Ok(()) => {
                log::info!(
                    "viewport {}x{} at resolution {} -> grid {}x{} on {}",
                    viewport.width,
                    viewport.height,
                    self.resolution,
                    size.width,
                    size.height,
                    self.backend.name()
                );
                self.viewport = Some(viewport);
                self.state = SolverState::Ready;
                Ok(())
            }
            Err(err) => {
                log::error!("buffer allocation failed: {err}");
                self.backend.release();
                self.viewport = None;
                self.state = SolverState::Uninitialized;
                Err(err)
            }
        }
    }

    /// Applies a parameter snapshot outside a frame. A resolution change
    /// reallocates, which resets the simulation state.
    pub fn reconfigure(&mut self, params: &SimParams) -> Result<()> {
        let params = params.clamped();
        self.policy = BoundaryPolicy::from_bounce(params.is_bounce);
        if params.resolution == self.resolution {
            return Ok(());
        }
        self.resolution = params.resolution;
        match self.viewport {
            Some(viewport) => self.reallocate(viewport),
            None => Ok(()),
        }
    }

    /// Queues a splat for the next frame. Pointer-independent producers use
    /// this to inject force and dye.
    pub fn queue_splat(&mut self, splat: Splat) {
        self.pending.push(splat);
    }

    /// Replaces the committed state with an initial condition.
    pub fn seed(&mut self, seed: &SwirlSeed) -> Result<()> {
        self.require_ready("seed")?;
        self.backend.seed(seed)
    }

    /// Runs one frame against a parameter snapshot.
    pub fn tick(&mut self, params: &SimParams, pointer: &PointerInput) -> Result<FrameReport> {
        let params = params.clamped();
        let motion = self.pointer.advance(pointer);

        if self.viewport.is_some() && self.state != SolverState::Ready {
            return Err(FluidError::InvalidState {
                op: "tick",
                state: self.state.to_string(),
            });
        }
        self.reconfigure(&params)?;
        let Some(size) = self.backend.size() else {
            self.pending.clear();
            return Ok(self.skipped());
        };

        let mut splats = std::mem::take(&mut self.pending);
        if let Some(splat) = motion.and_then(|m| m.to_splat(size, &params)) {
            splats.push(splat);
        }

        self.state = SolverState::Running;
        let result = self.backend.step(&params, &splats);
        self.state = SolverState::Ready;

        match result {
            Ok(()) => {
                self.frame += 1;
                log::debug!("frame {} committed with {} splats", self.frame, splats.len());
                Ok(FrameReport {
                    frame: self.frame,
                    grid: Some(size),
                    splats: splats.len(),
                    skipped: false,
                })
            }
            Err(err) => {
                log::warn!("frame {} discarded: {err}", self.frame + 1);
                Err(err)
            }
        }
    }

    /// Releases every buffer and returns to `Uninitialized`.
    pub fn dispose(&mut self) {
        self.backend.release();
        self.pending.clear();
        self.pointer.reset();
        self.viewport = None;
        self.frame = 0;
        self.state = SolverState::Uninitialized;
        log::info!("fluid solver disposed");
    }

    pub fn fields(&mut self) -> Result<FieldsRef<'_>> {
        self.require_ready("read fields")?;
        self.backend.fields()
    }

    pub fn stats(&mut self) -> Result<FrameStats> {
        let policy = self.policy;
        let fields = self.fields()?;
        Ok(FrameStats::collect(fields.velocity, fields.dye, policy))
    }

    /// Colour stage output at grid resolution.
    pub fn render(&mut self) -> Result<RgbaImage> {
        let transfer = self.transfer;
        let fields = self.fields()?;
        color::render(fields.velocity, Some(fields.dye), &transfer)
    }

    /// Colour stage output resampled to the viewport.
    pub fn present(&mut self) -> Result<RgbaImage> {
        let image = self.render()?;
        match self.viewport {
            Some(vp) if image.dimensions() != (vp.width, vp.height) => {
                Ok(imageops::resize(&image, vp.width, vp.height, FilterType::Triangle))
            }
            _ => Ok(image),
        }
    }

    fn skipped(&self) -> FrameReport {
        FrameReport {
            frame: self.frame,
            grid: None,
            splats: 0,
            skipped: true,
        }
    }

    fn require_ready(&self, op: &'static str) -> Result<()> {
        if self.state == SolverState::Ready {
            Ok(())
        } else {
            Err(FluidError::InvalidState {
                op,
                state: self.state.to_string(),
            })
        }
    }
}
