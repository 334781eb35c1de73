//! Compute pipelines, one per stage entry point.
//!
//! WGSL sources are composed from a shared prelude (parameter block, indexing
//! and wall mapping) plus, where a stage is generic over the texel type, a
//! small texel prelude that fixes `Texel` to `vec2<f32>` or `f32`.

use std::collections::HashMap;

const COMMON_WGSL: &str = include_str!("shaders/common.wgsl");
const TEXEL_VEC2_WGSL: &str = include_str!("shaders/texel_vec2.wgsl");
const TEXEL_F32_WGSL: &str = include_str!("shaders/texel_f32.wgsl");
const SPLAT_WGSL: &str = include_str!("shaders/splat.wgsl");
const SEED_WGSL: &str = include_str!("shaders/seed.wgsl");
const ADVECT_WGSL: &str = include_str!("shaders/advect.wgsl");
const FORCE_WGSL: &str = include_str!("shaders/force.wgsl");
const DYE_WGSL: &str = include_str!("shaders/dye.wgsl");
const VISCOUS_WGSL: &str = include_str!("shaders/viscous.wgsl");
const DIVERGENCE_WGSL: &str = include_str!("shaders/divergence.wgsl");
const PRESSURE_WGSL: &str = include_str!("shaders/pressure.wgsl");
const PRESSURE_MEAN_WGSL: &str = include_str!("shaders/pressure_mean.wgsl");
const PROJECT_WGSL: &str = include_str!("shaders/project.wgsl");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Module {
    Seed,
    AdvectVelocity,
    AdvectScalar,
    Force,
    Dye,
    Viscous,
    Divergence,
    Pressure,
    PressureMean,
    Project,
}

impl Module {
    fn label(self) -> &'static str {
        match self {
            Module::Seed => "seed",
            Module::AdvectVelocity => "advect-velocity",
            Module::AdvectScalar => "advect-scalar",
            Module::Force => "force",
            Module::Dye => "dye",
            Module::Viscous => "viscous",
            Module::Divergence => "divergence",
            Module::Pressure => "pressure",
            Module::PressureMean => "pressure-mean",
            Module::Project => "project",
        }
    }

    fn source(self) -> String {
        let parts: &[&str] = match self {
            Module::Seed => &[SEED_WGSL],
            Module::AdvectVelocity => &[TEXEL_VEC2_WGSL, ADVECT_WGSL],
            Module::AdvectScalar => &[TEXEL_F32_WGSL, ADVECT_WGSL],
            Module::Force => &[SPLAT_WGSL, FORCE_WGSL],
            Module::Dye => &[SPLAT_WGSL, DYE_WGSL],
            Module::Viscous => &[TEXEL_VEC2_WGSL, VISCOUS_WGSL],
            Module::Divergence => &[TEXEL_VEC2_WGSL, DIVERGENCE_WGSL],
            Module::Pressure => &[PRESSURE_WGSL],
            Module::PressureMean => &[PRESSURE_MEAN_WGSL],
            Module::Project => &[PROJECT_WGSL],
        };
        let mut source = String::from(COMMON_WGSL);
        for part in parts {
            source.push('\n');
            source.push_str(part);
        }
        source
    }
}

/// A compute entry point. Discriminants index [`Kernels`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Kernel {
    Seed,
    TraceVelocity,
    TraceVelocityReverse,
    CorrectVelocity,
    TraceScalar,
    TraceScalarReverse,
    CorrectScalar,
    Force,
    DyeSplat,
    Dissipate,
    Viscous,
    Divergence,
    Pressure,
    ReducePressure,
    CenterPressure,
    Project,
}

impl Kernel {
    pub(crate) const ALL: [Kernel; 16] = [
        Kernel::Seed,
        Kernel::TraceVelocity,
        Kernel::TraceVelocityReverse,
        Kernel::CorrectVelocity,
        Kernel::TraceScalar,
        Kernel::TraceScalarReverse,
        Kernel::CorrectScalar,
        Kernel::Force,
        Kernel::DyeSplat,
        Kernel::Dissipate,
        Kernel::Viscous,
        Kernel::Divergence,
        Kernel::Pressure,
        Kernel::ReducePressure,
        Kernel::CenterPressure,
        Kernel::Project,
    ];

    fn module(self) -> Module {
        match self {
            Kernel::Seed => Module::Seed,
            Kernel::TraceVelocity | Kernel::TraceVelocityReverse | Kernel::CorrectVelocity => {
                Module::AdvectVelocity
            }
            Kernel::TraceScalar | Kernel::TraceScalarReverse | Kernel::CorrectScalar => {
                Module::AdvectScalar
            }
            Kernel::Force => Module::Force,
            Kernel::DyeSplat | Kernel::Dissipate => Module::Dye,
            Kernel::Viscous => Module::Viscous,
            Kernel::Divergence => Module::Divergence,
            Kernel::Pressure => Module::Pressure,
            Kernel::ReducePressure | Kernel::CenterPressure => Module::PressureMean,
            Kernel::Project => Module::Project,
        }
    }

    fn entry_point(self) -> &'static str {
        match self {
            Kernel::TraceVelocity | Kernel::TraceScalar => "trace_forward",
            Kernel::TraceVelocityReverse | Kernel::TraceScalarReverse => "trace_reverse",
            Kernel::CorrectVelocity | Kernel::CorrectScalar => "correct",
            Kernel::DyeSplat => "splat",
            Kernel::Dissipate => "dissipate",
            Kernel::ReducePressure => "reduce",
            Kernel::CenterPressure => "subtract",
            _ => "main",
        }
    }

    pub(crate) fn label(self) -> &'static str {
        match self {
            Kernel::Seed => "seed",
            Kernel::TraceVelocity => "advect-velocity",
            Kernel::TraceVelocityReverse => "advect-velocity-reverse",
            Kernel::CorrectVelocity => "bfecc-velocity",
            Kernel::TraceScalar => "advect-dye",
            Kernel::TraceScalarReverse => "advect-dye-reverse",
            Kernel::CorrectScalar => "bfecc-dye",
            Kernel::Force => "force",
            Kernel::DyeSplat => "dye-splat",
            Kernel::Dissipate => "dye-dissipate",
            Kernel::Viscous => "viscous",
            Kernel::Divergence => "divergence",
            Kernel::Pressure => "pressure",
            Kernel::ReducePressure => "pressure-mean",
            Kernel::CenterPressure => "pressure-center",
            Kernel::Project => "project",
        }
    }

    /// Whether the entry point reads the splat list at binding 3.
    pub(crate) fn uses_splats(self) -> bool {
        matches!(self, Kernel::Force | Kernel::DyeSplat)
    }
}

pub(crate) struct Kernels {
    pipelines: Vec<wgpu::ComputePipeline>,
}

impl Kernels {
    /// Compiles every stage. Shader or pipeline errors surface through the
    /// caller's error scope.
    pub(crate) fn new(device: &wgpu::Device) -> Self {
        let mut modules: HashMap<Module, wgpu::ShaderModule> = HashMap::new();
        let mut pipelines = Vec::with_capacity(Kernel::ALL.len());
        for kernel in Kernel::ALL {
            let module = kernel.module();
            let shader = modules.entry(module).or_insert_with(|| {
                device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(module.label()),
                    source: wgpu::ShaderSource::Wgsl(module.source().into()),
                })
            });
            pipelines.push(device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(kernel.label()),
                layout: None,
                module: shader,
                entry_point: Some(kernel.entry_point()),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            }));
        }
        log::debug!(
            "built {} compute pipelines from {} shader modules",
            pipelines.len(),
            modules.len()
        );
        Self { pipelines }
    }

    pub(crate) fn get(&self, kernel: Kernel) -> &wgpu::ComputePipeline {
        &self.pipelines[kernel as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discriminants_match_pipeline_order() {
        for (i, kernel) in Kernel::ALL.iter().enumerate() {
            assert_eq!(*kernel as usize, i, "{kernel:?}");
        }
    }

    #[test]
    fn sources_start_with_the_shared_prelude() {
        let source = Module::AdvectScalar.source();
        assert!(source.starts_with(COMMON_WGSL));
        assert!(source.contains("alias Texel = f32;"));
        assert!(source.contains("fn correct("));
        assert!(Module::Force.source().contains("struct Splat"));
        assert!(Module::PressureMean.source().contains("fn reduce("));
    }
}
