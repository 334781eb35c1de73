//! wgpu compute backend.
//!
//! Every stage runs as a compute dispatch over storage buffers. A frame is
//! encoded into one command buffer against a copy of the buffer roles; the
//! copy replaces the live roles only when the device reports no error for
//! the submission, so a rejected frame leaves the committed buffers as they
//! were.

mod kernels;
mod resources;

use bytemuck::{Pod, Zeroable};

use crate::backend::{FieldsRef, FluidBackend, SwirlSeed};
use crate::constants::{DYE_DISSIPATION, MAX_GPU_SPLATS, WORKGROUP_SIZE};
use crate::error::{AllocError, FluidError, Result, Stage};
use crate::field::GridSize;
use crate::params::SimParams;
use crate::stages::force::Splat;

use kernels::{Kernel, Kernels};
use resources::{Resources, Roles, Slot, SlotPair, Uniforms};

/// Uniform block shared by every kernel. Layout matches `Params` in
/// `shaders/common.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct GpuParams {
    width: u32,
    height: u32,
    bounce: u32,
    splat_count: u32,
    dt: f32,
    cell_scale: f32,
    viscosity: f32,
    dye_dissipation: f32,
    impulse: f32,
    dye_radius: f32,
    _pad0: u32,
    _pad1: u32,
}

impl GpuParams {
    fn frame(size: GridSize, params: &SimParams, splat_count: usize) -> Self {
        Self {
            width: size.width,
            height: size.height,
            bounce: u32::from(params.is_bounce),
            splat_count: splat_count as u32,
            dt: params.dt,
            cell_scale: size.cell_scale(),
            viscosity: params.viscosity,
            dye_dissipation: DYE_DISSIPATION,
            ..Self::zeroed()
        }
    }

    fn seed(size: GridSize, seed: &SwirlSeed) -> Self {
        Self {
            width: size.width,
            height: size.height,
            impulse: seed.impulse,
            dye_radius: seed.dye_radius,
            ..Self::zeroed()
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct GpuSplat {
    position: [f32; 2],
    force: [f32; 2],
    radius: f32,
    dye: f32,
    _pad: [f32; 2],
}

impl From<&Splat> for GpuSplat {
    fn from(s: &Splat) -> Self {
        Self {
            position: s.position.to_array(),
            force: s.force.to_array(),
            radius: s.radius,
            dye: s.dye,
            _pad: [0.0; 2],
        }
    }
}

/// Runs `f` inside an error scope and returns what the scope caught.
fn scoped<T>(
    device: &wgpu::Device,
    filter: wgpu::ErrorFilter,
    f: impl FnOnce() -> T,
) -> (T, Option<wgpu::Error>) {
    device.push_error_scope(filter);
    let value = f();
    let error = pollster::block_on(device.pop_error_scope());
    (value, error)
}

fn device_error(stage: Stage, error: &wgpu::Error) -> FluidError {
    FluidError::Device {
        stage,
        message: error.to_string(),
    }
}

pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter: String,
    kernels: Kernels,
    uniforms: Uniforms,
    resources: Option<Resources>,
}

impl GpuBackend {
    /// Blocking wrapper around [`GpuBackend::create`].
    pub fn new() -> Result<Self> {
        pollster::block_on(Self::create())
    }

    pub async fn create() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
            .map_err(|err| {
                log::warn!("no GPU adapter: {err}");
                FluidError::NoAdapter
            })?;
        let info = adapter.get_info();

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default())
            .await
            .map_err(|err| FluidError::Device {
                stage: Stage::Setup,
                message: err.to_string(),
            })?;

        let ((kernels, uniforms), error) = scoped(&device, wgpu::ErrorFilter::Validation, || {
            let kernels = Kernels::new(&device);
            let uniforms = Uniforms {
                params: device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("fluid-params"),
                    size: std::mem::size_of::<GpuParams>() as u64,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                }),
                splats: device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("splats"),
                    size: (MAX_GPU_SPLATS * std::mem::size_of::<GpuSplat>()) as u64,
                    usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                }),
            };
            (kernels, uniforms)
        });
        if let Some(error) = error {
            return Err(device_error(Stage::Setup, &error));
        }

        let adapter = format!("{} ({:?})", info.name, info.backend);
        log::info!("GPU backend ready on {adapter}");
        Ok(Self {
            device,
            queue,
            adapter,
            kernels,
            uniforms,
            resources: None,
        })
    }
}

fn no_buffers(op: &'static str) -> FluidError {
    FluidError::InvalidState {
        op,
        state: "no buffers are allocated".into(),
    }
}

/// Records one frame's dispatches.
struct FrameEncoder<'a> {
    device: &'a wgpu::Device,
    kernels: &'a Kernels,
    uniforms: &'a Uniforms,
    resources: &'a mut Resources,
    encoder: wgpu::CommandEncoder,
    groups: (u32, u32),
}

impl<'a> FrameEncoder<'a> {
    fn new(
        device: &'a wgpu::Device,
        kernels: &'a Kernels,
        uniforms: &'a Uniforms,
        resources: &'a mut Resources,
        label: &'static str,
    ) -> Self {
        let size = resources.size;
        Self {
            device,
            kernels,
            uniforms,
            resources,
            encoder: device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(label),
            }),
            groups: (
                size.width.div_ceil(WORKGROUP_SIZE),
                size.height.div_ceil(WORKGROUP_SIZE),
            ),
        }
    }

    fn dispatch(&mut self, kernel: Kernel, slots: &[(u32, Slot)]) {
        self.dispatch_groups(kernel, slots, self.groups);
    }

    fn dispatch_groups(&mut self, kernel: Kernel, slots: &[(u32, Slot)], groups: (u32, u32)) {
        let bind_group = self
            .resources
            .bind_group(self.device, self.kernels, self.uniforms, kernel, slots);
        let mut pass = self.encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(kernel.label()),
            timestamp_writes: None,
        });
        pass.set_pipeline(self.kernels.get(kernel));
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(groups.0, groups.1, 1);
    }

    /// Semi-Lagrangian or BFECC advection of `source` into `out`, with
    /// `scratch` holding the forward and reverse traces.
    fn advect(
        &mut self,
        kernels: [Kernel; 3],
        velocity: Slot,
        source: Slot,
        scratch: SlotPair,
        out: Slot,
        is_bfecc: bool,
    ) {
        let [trace, reverse, correct] = kernels;
        if !is_bfecc {
            self.dispatch(trace, &[(1, velocity), (2, source), (3, out)]);
            return;
        }
        let (forward, backward) = (scratch.read(), scratch.write());
        self.dispatch(trace, &[(1, velocity), (2, source), (3, forward)]);
        self.dispatch(reverse, &[(1, velocity), (2, forward), (3, backward)]);
        self.dispatch(
            correct,
            &[(1, velocity), (2, source), (3, out), (4, forward), (5, backward)],
        );
    }

    /// Encodes the full stage sequence and returns the roles to commit.
    fn encode_frame(&mut self, params: &SimParams) -> Roles {
        const VELOCITY: [Kernel; 3] = [
            Kernel::TraceVelocity,
            Kernel::TraceVelocityReverse,
            Kernel::CorrectVelocity,
        ];
        const SCALAR: [Kernel; 3] = [
            Kernel::TraceScalar,
            Kernel::TraceScalarReverse,
            Kernel::CorrectScalar,
        ];
        let mut r = self.resources.roles;

        self.advect(
            VELOCITY,
            r.velocity,
            r.velocity,
            r.velocity_aux,
            r.velocity_work.write(),
            params.is_bfecc,
        );
        r.velocity_work.swap();

        self.dispatch(
            Kernel::Force,
            &[(1, r.velocity_work.read()), (2, r.velocity_work.write())],
        );
        r.velocity_work.swap();

        let original = r.velocity_work.read();
        for i in 0..params.viscous_iterations {
            let previous = if i == 0 { original } else { r.velocity_aux.read() };
            self.dispatch(
                Kernel::Viscous,
                &[(1, original), (2, previous), (3, r.velocity_aux.write())],
            );
            r.velocity_aux.swap();
        }
        std::mem::swap(r.velocity_work.write_mut(), r.velocity_aux.read_mut());
        r.velocity_work.swap();

        self.dispatch(
            Kernel::Divergence,
            &[(1, r.velocity_work.read()), (2, r.divergence)],
        );

        for i in 0..params.poisson_iterations {
            let previous = if i == 0 { r.pressure } else { r.pressure_work.read() };
            self.dispatch(
                Kernel::Pressure,
                &[(1, previous), (2, r.divergence), (3, r.pressure_work.write())],
            );
            r.pressure_work.swap();
        }
        let solved = r.pressure_work.read();
        let mean = [(1, solved), (2, r.pressure_mean)];
        self.dispatch_groups(Kernel::ReducePressure, &mean, (1, 1));
        self.dispatch(Kernel::CenterPressure, &mean);

        self.dispatch(
            Kernel::Project,
            &[
                (1, r.velocity_work.read()),
                (2, r.pressure_work.read()),
                (3, r.velocity_work.write()),
            ],
        );
        r.velocity_work.swap();

        self.dispatch(Kernel::DyeSplat, &[(1, r.dye), (2, r.dye_work.write())]);
        r.dye_work.swap();
        self.advect(
            SCALAR,
            r.velocity_work.read(),
            r.dye_work.read(),
            r.dye_aux,
            r.dye_work.write(),
            params.is_bfecc,
        );
        self.dispatch(Kernel::Dissipate, &[(4, r.dye_work.write())]);
        r.dye_work.swap();

        std::mem::swap(&mut r.velocity, r.velocity_work.read_mut());
        std::mem::swap(&mut r.pressure, r.pressure_work.read_mut());
        std::mem::swap(&mut r.dye, r.dye_work.read_mut());
        r
    }

    fn finish(self) -> wgpu::CommandBuffer {
        self.encoder.finish()
    }
}

impl FluidBackend for GpuBackend {
    fn name(&self) -> String {
        format!("wgpu/{}", self.adapter)
    }

    fn size(&self) -> Option<GridSize> {
        self.resources.as_ref().map(|r| r.size)
    }

    fn allocate(&mut self, size: GridSize) -> Result<()> {
        self.release();
        let (resources, oom) = scoped(&self.device, wgpu::ErrorFilter::OutOfMemory, || {
            Resources::allocate(&self.device, size)
        });
        let resources = resources?;
        if let Some(error) = oom {
            return Err(FluidError::allocation(
                "GPU field buffers",
                size.width,
                size.height,
                AllocError::Device(error.to_string()),
            ));
        }
        log::info!(
            "allocated {}x{} GPU field buffers on {}",
            size.width,
            size.height,
            self.adapter
        );
        self.resources = Some(resources);
        Ok(())
    }

    fn release(&mut self) {
        if let Some(resources) = self.resources.take() {
            log::debug!(
                "released {}x{} GPU field buffers",
                resources.size.width,
                resources.size.height
            );
        }
    }

    fn seed(&mut self, seed: &SwirlSeed) -> Result<()> {
        let resources = self.resources.as_mut().ok_or_else(|| no_buffers("seed"))?;
        let (device, queue) = (&self.device, &self.queue);
        let params = GpuParams::seed(resources.size, seed);
        queue.write_buffer(&self.uniforms.params, 0, bytemuck::bytes_of(&params));

        let roles = resources.roles;
        let ((), error) = scoped(device, wgpu::ErrorFilter::Validation, || {
            let mut frame =
                FrameEncoder::new(device, &self.kernels, &self.uniforms, &mut *resources, "seed");
            frame
                .encoder
                .clear_buffer(frame.resources.buffer(roles.pressure), 0, None);
            frame.dispatch(Kernel::Seed, &[(1, roles.velocity), (2, roles.dye)]);
            queue.submit(Some(frame.finish()));
        });
        if let Some(error) = error {
            return Err(device_error(Stage::Seed, &error));
        }
        resources.mirror.stale = true;
        Ok(())
    }

    fn step(&mut self, params: &SimParams, splats: &[Splat]) -> Result<()> {
        let params = params.clamped();
        if let Some(bad) = splats.iter().find(|s| !s.is_finite()) {
            return Err(FluidError::stage(
                Stage::Force,
                format!("non-finite splat at {}", bad.position),
            ));
        }
        let applied = if splats.len() > MAX_GPU_SPLATS {
            log::warn!(
                "{} splats queued, applying the first {MAX_GPU_SPLATS}",
                splats.len()
            );
            &splats[..MAX_GPU_SPLATS]
        } else {
            splats
        };

        let resources = self.resources.as_mut().ok_or_else(|| no_buffers("step"))?;
        let (device, queue) = (&self.device, &self.queue);

        let gpu_params = GpuParams::frame(resources.size, &params, applied.len());
        queue.write_buffer(&self.uniforms.params, 0, bytemuck::bytes_of(&gpu_params));
        if !applied.is_empty() {
            let gpu_splats: Vec<GpuSplat> = applied.iter().map(GpuSplat::from).collect();
            queue.write_buffer(&self.uniforms.splats, 0, bytemuck::cast_slice(&gpu_splats));
        }

        let (roles, error) = scoped(device, wgpu::ErrorFilter::Validation, || {
            let mut frame =
                FrameEncoder::new(device, &self.kernels, &self.uniforms, &mut *resources, "frame");
            let roles = frame.encode_frame(&params);
            queue.submit(Some(frame.finish()));
            roles
        });
        if let Some(error) = error {
            log::warn!("GPU rejected the frame: {error}");
            return Err(device_error(Stage::Submit, &error));
        }
        resources.roles = roles;
        resources.mirror.stale = true;
        Ok(())
    }

    fn fields(&mut self) -> Result<FieldsRef<'_>> {
        let resources = self.resources.as_mut().ok_or_else(|| no_buffers("read fields"))?;
        if resources.mirror.stale {
            let (device, queue) = (&self.device, &self.queue);
            let (result, error) = scoped(device, wgpu::ErrorFilter::Validation, || {
                resources.read_back(device, queue)
            });
            result?;
            if let Some(error) = error {
                return Err(device_error(Stage::Readback, &error));
            }
        }
        let mirror = &resources.mirror;
        Ok(FieldsRef {
            velocity: &mirror.velocity,
            pressure: &mirror.pressure,
            dye: &mirror.dye,
        })
    }
}
