use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use stable_fluid::{
    ConfigHandle, CpuBackend, FluidBackend, FrameStats, GpuBackend, Orchestrator, PointerInput,
    SimParams, SwirlSeed, TransferFunction, Viewport,
};
use std::io::{self, Read};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum Request {
    Init {
        #[serde(default = "default_viewport")]
        viewport: [u32; 2],
        #[serde(default)]
        params: SimParams,
        #[serde(default)]
        backend: BackendKind,
    },
    Run(RunRequest),
    Sweep {
        #[serde(default = "default_viewport")]
        viewport: [u32; 2],
        #[serde(default)]
        resolutions: Vec<f32>,
        #[serde(default = "default_frames")]
        frames: u32,
        #[serde(default)]
        params: SimParams,
        #[serde(default)]
        backend: BackendKind,
    },
}

#[derive(Debug, Default, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum BackendKind {
    #[default]
    Cpu,
    Gpu,
}

#[derive(Debug, Deserialize)]
struct RunRequest {
    #[serde(default = "default_viewport")]
    viewport: [u32; 2],
    #[serde(default = "default_frames")]
    frames: u32,
    #[serde(default)]
    params: SimParams,
    #[serde(default)]
    backend: BackendKind,
    /// Pointer positions in NDC, one per frame; the pointer idles after the
    /// path runs out.
    #[serde(default)]
    pointer_path: Vec<[f32; 2]>,
    #[serde(default = "default_seed")]
    seed: bool,
    #[serde(default)]
    transfer: TransferFunction,
    snapshot: Option<PathBuf>,
}

fn default_viewport() -> [u32; 2] { [256, 144] }
fn default_frames() -> u32 { 120 }
fn default_seed() -> bool { true }

#[derive(Debug, Serialize)]
struct InitResponse {
    ok: bool,
    backend: String,
    width: u32,
    height: u32,
    cells: usize,
    cell_scale: f32,
    elapsed_ms: f64,
}

#[derive(Debug, Serialize)]
struct RunResponse {
    ok: bool,
    backend: String,
    resolution: f32,
    width: u32,
    height: u32,
    frames: u32,
    discarded: u32,
    elapsed_ms: f64,
    fps: f64,
    #[serde(flatten)]
    stats: FrameStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshot: Option<String>,
}

#[derive(Debug, Serialize)]
struct SweepResponse {
    ok: bool,
    backend: String,
    runs: Vec<RunResponse>,
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        let out = serde_json::json!({"ok": false, "error": format!("{err:#}")});
        println!(
            "{}",
            serde_json::to_string_pretty(&out).unwrap_or_else(|_| "{\"ok\":false}".into())
        );
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut input = String::new();
    io::stdin().read_to_string(&mut input)?;
    let req: Request = if input.trim().is_empty() {
        Request::Init {
            viewport: default_viewport(),
            params: SimParams::default(),
            backend: BackendKind::Cpu,
        }
    } else {
        serde_json::from_str(&input).context("invalid JSON request")?
    };

    match req {
        Request::Init {
            viewport,
            params,
            backend,
        } => {
            let resp = match backend {
                BackendKind::Cpu => init(CpuBackend::new(), viewport, &params)?,
                BackendKind::Gpu => init(open_gpu()?, viewport, &params)?,
            };
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
        Request::Run(req) => {
            let resp = match req.backend {
                BackendKind::Cpu => run_frames(CpuBackend::new(), &req)?,
                BackendKind::Gpu => run_frames(open_gpu()?, &req)?,
            };
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
        Request::Sweep {
            viewport,
            resolutions,
            frames,
            params,
            backend,
        } => {
            let fallback = vec![0.125, 0.25, 0.5, 1.0];
            let resolutions = if resolutions.is_empty() { &fallback } else { &resolutions };
            let resp = match backend {
                BackendKind::Cpu => {
                    sweep(CpuBackend::new(), viewport, resolutions, frames, params)?
                }
                BackendKind::Gpu => sweep(open_gpu()?, viewport, resolutions, frames, params)?,
            };
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
    }

    Ok(())
}

fn open_gpu() -> Result<GpuBackend> {
    GpuBackend::new().context("GPU backend unavailable")
}

fn viewport_of([width, height]: [u32; 2]) -> Viewport {
    Viewport::new(width, height)
}

fn init<B: FluidBackend>(
    backend: B,
    viewport: [u32; 2],
    params: &SimParams,
) -> Result<InitResponse> {
    let t0 = Instant::now();
    let mut fluid = Orchestrator::new(backend);
    fluid
        .initialize(viewport_of(viewport), params)
        .context("initialize failed")?;
    let grid = fluid
        .grid_size()
        .context("viewport has no area; nothing was allocated")?;
    Ok(InitResponse {
        ok: true,
        backend: fluid.backend().name(),
        width: grid.width,
        height: grid.height,
        cells: grid.cells(),
        cell_scale: grid.cell_scale(),
        elapsed_ms: t0.elapsed().as_secs_f64() * 1000.0,
    })
}

/// Ticks `frames` times against the shared config, counting frames the
/// solver discarded. Returns the discarded count and elapsed seconds.
fn drive<B: FluidBackend>(
    fluid: &mut Orchestrator<B>,
    config: &ConfigHandle,
    frames: u32,
    pointer_path: &[[f32; 2]],
) -> Result<(u32, f64)> {
    let t0 = Instant::now();
    let mut discarded = 0;
    for frame in 0..frames {
        let pointer = pointer_path
            .get(frame as usize)
            .map_or_else(PointerInput::idle, |&[x, y]| PointerInput::at(x, y));
        match fluid.tick(&config.snapshot(), &pointer) {
            Ok(_) => {}
            Err(err) if err.is_recoverable() => discarded += 1,
            Err(err) => return Err(err).with_context(|| format!("frame {frame} failed")),
        }
    }
    Ok((discarded, t0.elapsed().as_secs_f64()))
}

fn report<B: FluidBackend>(
    fluid: &mut Orchestrator<B>,
    resolution: f32,
    frames: u32,
    (discarded, elapsed): (u32, f64),
) -> Result<RunResponse> {
    let grid = fluid.grid_size().context("solver has no grid")?;
    let stats = fluid.stats().context("reading back fields")?;
    Ok(RunResponse {
        ok: discarded == 0,
        backend: fluid.backend().name(),
        resolution,
        width: grid.width,
        height: grid.height,
        frames,
        discarded,
        elapsed_ms: elapsed * 1000.0,
        fps: f64::from(frames) / elapsed.max(1e-6),
        stats,
        snapshot: None,
    })
}

fn run_frames<B: FluidBackend>(backend: B, req: &RunRequest) -> Result<RunResponse> {
    let config = ConfigHandle::new(req.params);
    let mut fluid = Orchestrator::new(backend);
    fluid.set_transfer_function(req.transfer);
    fluid
        .initialize(viewport_of(req.viewport), &config.snapshot())
        .context("initialize failed")?;
    if req.seed {
        fluid.seed(&SwirlSeed::default()).context("seeding failed")?;
    }

    let timing = drive(&mut fluid, &config, req.frames, &req.pointer_path)?;
    let mut resp = report(&mut fluid, config.snapshot().resolution, req.frames, timing)?;

    if let Some(path) = &req.snapshot {
        let image = fluid.present().context("presenting frame")?;
        image
            .save(path)
            .with_context(|| format!("writing snapshot to {}", path.display()))?;
        resp.snapshot = Some(path.display().to_string());
    }
    Ok(resp)
}

fn sweep<B: FluidBackend>(
    backend: B,
    viewport: [u32; 2],
    resolutions: &[f32],
    frames: u32,
    params: SimParams,
) -> Result<SweepResponse> {
    let config = ConfigHandle::new(params);
    let mut fluid = Orchestrator::new(backend);
    fluid
        .initialize(viewport_of(viewport), &config.snapshot())
        .context("initialize failed")?;

    let mut runs = Vec::new();
    for &resolution in resolutions {
        config.update(|p| p.resolution = resolution);
        let snapshot = config.snapshot();
        fluid
            .reconfigure(&snapshot)
            .with_context(|| format!("reallocating at resolution {resolution}"))?;
        fluid.seed(&SwirlSeed::default()).context("seeding failed")?;
        let timing = drive(&mut fluid, &config, frames.max(1), &[])?;
        runs.push(report(&mut fluid, snapshot.resolution, frames.max(1), timing)?);
    }

    let ok = runs.iter().all(|r| r.ok);
    let backend = fluid.backend().name();
    Ok(SweepResponse { ok, backend, runs })
}
