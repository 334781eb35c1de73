//! CPU reference backend.
//!
//! Stages run one after another on the calling thread; texels inside a stage
//! run in parallel on the rayon pool. Committed state lives apart from the
//! in-flight work buffers and is only replaced, by handle swap, once every
//! stage of the frame has succeeded.

use glam::Vec2;

use crate::backend::{FieldsRef, FluidBackend, SwirlSeed};
use crate::boundary::BoundaryPolicy;
use crate::buffer::BufferPair;
use crate::constants::DYE_DISSIPATION;
use crate::error::{FluidError, Result, Stage};
use crate::field::{Field, GridSize, Texel};
use crate::params::SimParams;
use crate::stages::advect::{self, AdvectParams};
use crate::stages::force::{self, Splat};
use crate::stages::pressure::{self, PressureParams};
use crate::stages::project::{self, ProjectParams};
use crate::stages::viscous::{self, ViscousParams};
use crate::stages::{divergence, dye, ensure_finite};

/// State that survives from one frame to the next.
#[derive(Debug)]
struct Committed {
    velocity: Field<Vec2>,
    /// Previous frame's pressure, the warm start for the next solve.
    pressure: Field<f32>,
    dye: Field<f32>,
}

/// Buffers only meaningful while a frame is in flight.
#[derive(Debug)]
struct Work {
    velocity: BufferPair<Vec2>,
    velocity_aux: BufferPair<Vec2>,
    pressure: BufferPair<f32>,
    divergence: Field<f32>,
    dye: BufferPair<f32>,
    dye_aux: BufferPair<f32>,
}

#[derive(Debug)]
struct Buffers {
    size: GridSize,
    committed: Committed,
    work: Work,
}

fn zeroed<T: Texel>(size: GridSize, resource: &'static str) -> Result<Field<T>> {
    Field::zeroed(size).map_err(|e| FluidError::allocation(resource, size.width, size.height, e))
}

impl Buffers {
    fn allocate(size: GridSize) -> Result<Self> {
        Ok(Self {
            size,
            committed: Committed {
                velocity: zeroed(size, "velocity")?,
                pressure: zeroed(size, "pressure")?,
                dye: zeroed(size, "dye")?,
            },
            work: Work {
                velocity: BufferPair::allocate(size, "velocity work pair")?,
                velocity_aux: BufferPair::allocate(size, "velocity scratch pair")?,
                pressure: BufferPair::allocate(size, "pressure pair")?,
                divergence: zeroed(size, "divergence")?,
                dye: BufferPair::allocate(size, "dye pair")?,
                dye_aux: BufferPair::allocate(size, "dye scratch pair")?,
            },
        })
    }
}

#[derive(Debug, Default)]
pub struct CpuBackend {
    buffers: Option<Buffers>,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn buffers_mut(&mut self, op: &'static str) -> Result<&mut Buffers> {
        self.buffers.as_mut().ok_or_else(|| FluidError::InvalidState {
            op,
            state: "no buffers are allocated".into(),
        })
    }
}

fn run_frame(buffers: &mut Buffers, params: &SimParams, splats: &[Splat]) -> Result<()> {
    let Buffers {
        size,
        committed,
        work,
    } = buffers;
    let cell_scale = size.cell_scale();
    let policy = BoundaryPolicy::from_bounce(params.is_bounce);
    let advect_params = AdvectParams {
        dt: params.dt,
        cell_scale,
        policy,
    };

    // velocity(t) -> advected
    {
        let scratch = work.velocity_aux.halves_mut();
        advect::advect(
            &committed.velocity,
            &committed.velocity,
            scratch,
            work.velocity.write_mut(),
            &advect_params,
            params.is_bfecc,
        );
        ensure_finite(work.velocity.write(), Stage::Advection)?;
        work.velocity.swap();
    }

    {
        let (read, write) = work.velocity.split();
        force::apply(read, write, splats);
        ensure_finite(write, Stage::Force)?;
        work.velocity.swap();
    }

    viscous::diffuse(
        work.velocity.read(),
        &mut work.velocity_aux,
        params.viscous_iterations,
        &ViscousParams {
            viscosity: params.viscosity,
            dt: params.dt,
            policy,
        },
    );
    ensure_finite(work.velocity_aux.read(), Stage::Viscous)?;
    work.velocity.adopt_read(&mut work.velocity_aux);

    divergence::compute(work.velocity.read(), &mut work.divergence, cell_scale, policy);
    ensure_finite(&work.divergence, Stage::Divergence)?;

    pressure::solve(
        &committed.pressure,
        &work.divergence,
        &mut work.pressure,
        params.poisson_iterations,
        &PressureParams {
            dt: params.dt,
            cell_scale,
            policy,
        },
    );
    pressure::remove_mean(work.pressure.read_mut());
    ensure_finite(work.pressure.read(), Stage::Pressure)?;

    {
        let (read, write) = work.velocity.split();
        project::apply(
            read,
            work.pressure.read(),
            write,
            &ProjectParams {
                dt: params.dt,
                cell_scale,
                policy,
            },
        );
        ensure_finite(write, Stage::Projection)?;
        work.velocity.swap();
    }

    // Dye rides on the projected velocity.
    dye::splat(&committed.dye, work.dye.write_mut(), splats);
    work.dye.swap();
    {
        let scratch = work.dye_aux.halves_mut();
        let (read, write) = work.dye.split();
        advect::advect(
            work.velocity.read(),
            read,
            scratch,
            write,
            &advect_params,
            params.is_bfecc,
        );
        dye::dissipate(write, DYE_DISSIPATION);
        ensure_finite(write, Stage::Dye)?;
        work.dye.swap();
    }

    // Commit by handle swap; nothing above touched the committed fields.
    std::mem::swap(&mut committed.velocity, work.velocity.read_mut());
    std::mem::swap(&mut committed.pressure, work.pressure.read_mut());
    std::mem::swap(&mut committed.dye, work.dye.read_mut());
    Ok(())
}

impl FluidBackend for CpuBackend {
    fn name(&self) -> String {
        "cpu/rayon".into()
    }

    fn size(&self) -> Option<GridSize> {
        self.buffers.as_ref().map(|b| b.size)
    }

    fn allocate(&mut self, size: GridSize) -> Result<()> {
        self.release();
        let buffers = Buffers::allocate(size)?;
        log::info!(
            "allocated {}x{} CPU field buffers ({} texels)",
            size.width,
            size.height,
            size.cells()
        );
        self.buffers = Some(buffers);
        Ok(())
    }

    fn release(&mut self) {
        if let Some(buffers) = self.buffers.take() {
            log::debug!(
                "released {}x{} CPU field buffers",
                buffers.size.width,
                buffers.size.height
            );
        }
    }

    fn seed(&mut self, seed: &SwirlSeed) -> Result<()> {
        let buffers = self.buffers_mut("seed")?;
        let size = buffers.size;
        let state = &mut buffers.committed;
        for y in 0..size.height {
            for x in 0..size.width {
                state.velocity.set(x, y, seed.velocity_at(size, x, y));
                state.dye.set(x, y, seed.dye_at(size, x, y));
            }
        }
        state.pressure.fill(0.0);
        ensure_finite(&state.velocity, Stage::Seed)
    }

    fn step(&mut self, params: &SimParams, splats: &[Splat]) -> Result<()> {
        let buffers = self.buffers_mut("step")?;
        run_frame(buffers, &params.clamped(), splats)
    }

    fn fields(&mut self) -> Result<FieldsRef<'_>> {
        let buffers = self.buffers_mut("read fields")?;
        let state = &buffers.committed;
        Ok(FieldsRef {
            velocity: &state.velocity,
            pressure: &state.pressure,
            dye: &state.dye,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(size: GridSize) -> CpuBackend {
        let mut backend = CpuBackend::new();
        backend.allocate(size).unwrap();
        backend
    }

    #[test]
    fn step_without_buffers_is_rejected() {
        let mut backend = CpuBackend::new();
        let err = backend.step(&SimParams::default(), &[]).unwrap_err();
        assert!(matches!(err, FluidError::InvalidState { op: "step", .. }));
    }

    #[test]
    fn next_solve_starts_from_committed_pressure() {
        let params = SimParams {
            poisson_iterations: 4,
            ..SimParams::default()
        };
        let splat = Splat {
            position: Vec2::new(16.0, 9.0),
            force: Vec2::new(5.0, 0.0),
            radius: 6.0,
            dye: 0.0,
        };
        let mut warm = backend(GridSize::new(32, 18));
        let mut cold = backend(GridSize::new(32, 18));
        for b in [&mut warm, &mut cold] {
            b.seed(&SwirlSeed::default()).unwrap();
            b.step(&params, &[splat]).unwrap();
        }
        assert!(!warm.fields().unwrap().pressure.is_zero());

        // Same velocity and dye, only the carried pressure is dropped.
        cold.buffers.as_mut().unwrap().committed.pressure.fill(0.0);
        warm.step(&params, &[]).unwrap();
        cold.step(&params, &[]).unwrap();

        let warm_velocity = warm.fields().unwrap().velocity.clone();
        let cold_velocity = cold.fields().unwrap().velocity.clone();
        let gap = warm_velocity
            .data()
            .iter()
            .zip(cold_velocity.data())
            .map(|(a, b)| (*a - *b).length())
            .fold(0.0f32, f32::max);
        assert!(gap > 1e-4, "warm start made no difference: {gap}");
    }

    #[test]
    fn committed_pressure_has_zero_mean() {
        let mut backend = backend(GridSize::new(32, 18));
        let params = SimParams::default();
        // Off-centre push against the clamped walls leaves unbalanced divergence.
        let splat = Splat {
            position: Vec2::new(2.0, 3.0),
            force: Vec2::new(-4.0, -2.0),
            radius: 5.0,
            dye: 0.0,
        };
        for _ in 0..20 {
            backend.step(&params, &[splat]).unwrap();
        }
        let pressure = backend.fields().unwrap().pressure;
        let mean = pressure.data().iter().map(|&v| f64::from(v)).sum::<f64>()
            / pressure.data().len() as f64;
        assert!(!pressure.is_zero());
        assert!(mean.abs() < 1e-4, "pressure mean {mean}");
    }

    #[test]
    fn failed_frame_leaves_state_untouched() {
        let mut backend = backend(GridSize::new(24, 16));
        backend.seed(&SwirlSeed::default()).unwrap();
        let params = SimParams::default();
        backend.step(&params, &[]).unwrap();
        let before = backend.fields().unwrap().velocity.clone();
        let dye_before = backend.fields().unwrap().dye.clone();

        let poisoned = Splat {
            position: Vec2::new(12.0, 8.0),
            force: Vec2::new(f32::NAN, 0.0),
            radius: 4.0,
            dye: 0.0,
        };
        let err = backend.step(&params, &[poisoned]).unwrap_err();
        assert!(matches!(err, FluidError::Stage { stage: Stage::Force, .. }), "{err}");

        let fields = backend.fields().unwrap();
        assert_eq!(fields.velocity, &before);
        assert_eq!(fields.dye, &dye_before);

        // The next frame runs from the last good state.
        backend.step(&params, &[]).unwrap();
    }
}
