//! The wgpu backend must track the CPU reference frame for frame.

use stable_fluid::diagnostics::max_speed;
use stable_fluid::{
    CpuBackend, FluidBackend, GpuBackend, Orchestrator, PointerInput, SimParams, SwirlSeed,
    Viewport,
};

fn simulate<B: FluidBackend>(backend: B, params: &SimParams) -> Orchestrator<B> {
    let mut fluid = Orchestrator::new(backend);
    fluid.initialize(Viewport::new(96, 64), params).unwrap();
    fluid.seed(&SwirlSeed::default()).unwrap();
    let path = [(-0.2, 0.0), (-0.1, 0.05), (0.0, 0.1), (0.1, 0.1)];
    for (x, y) in path {
        fluid.tick(params, &PointerInput::at(x, y)).unwrap();
    }
    for _ in 0..4 {
        fluid.tick(params, &PointerInput::idle()).unwrap();
    }
    fluid
}

#[test]
#[ignore] // Requires GPU
fn gpu_frames_match_cpu_reference() {
    for is_bounce in [false, true] {
        let params = SimParams {
            is_bounce,
            ..SimParams::default()
        };
        let mut cpu = simulate(CpuBackend::new(), &params);
        let mut gpu = simulate(GpuBackend::new().unwrap(), &params);

        let expected = cpu.fields().unwrap().velocity.clone();
        let actual = gpu.fields().unwrap().velocity.clone();
        assert_eq!(expected.size(), actual.size());

        let tolerance = 1e-3 * max_speed(&expected).max(1.0);
        let worst = expected
            .data()
            .iter()
            .zip(actual.data())
            .map(|(a, b)| (*a - *b).length())
            .fold(0.0f32, f32::max);
        assert!(
            worst < tolerance,
            "bounce={is_bounce}: GPU drifted {worst} from CPU (tolerance {tolerance})"
        );
    }
}

#[test]
#[ignore] // Requires GPU
fn gpu_resize_clears_state() {
    let params = SimParams::default();
    let mut fluid = simulate(GpuBackend::new().unwrap(), &params);
    fluid.resize(Viewport::new(48, 32)).unwrap();
    let fields = fluid.fields().unwrap();
    assert!(fields.velocity.is_zero());
    assert!(fields.dye.is_zero());
}
