//! A failed frame is dropped whole: the committed state survives and the
//! next tick carries on from it. Configuration edits from another thread
//! only take effect at frame boundaries.

use std::thread;

use glam::Vec2;
use stable_fluid::{
    ConfigHandle, CpuBackend, FluidError, GridSize, Orchestrator, PointerInput, SimParams,
    SolverState, Splat, Stage, SwirlSeed, Viewport,
};

#[test]
fn non_finite_force_discards_only_the_current_frame() {
    let params = SimParams::default();
    let mut fluid = Orchestrator::new(CpuBackend::new());
    fluid.initialize(Viewport::new(96, 64), &params).unwrap();
    fluid.seed(&SwirlSeed::default()).unwrap();
    fluid.tick(&params, &PointerInput::idle()).unwrap();

    let committed = fluid.fields().unwrap().velocity.clone();
    let frame = fluid.frame();

    fluid.queue_splat(Splat {
        position: Vec2::new(10.0, 10.0),
        force: Vec2::new(f32::NAN, 0.0),
        radius: 5.0,
        dye: 0.0,
    });
    let err = fluid.tick(&params, &PointerInput::idle()).unwrap_err();
    assert!(err.is_recoverable(), "unexpected error: {err}");
    assert!(matches!(
        err,
        FluidError::Stage {
            stage: Stage::Force,
            ..
        }
    ));

    assert_eq!(fluid.state(), SolverState::Ready);
    assert_eq!(fluid.frame(), frame);
    assert_eq!(fluid.fields().unwrap().velocity, &committed);

    // The bad splat is gone; the next frame commits normally.
    let report = fluid.tick(&params, &PointerInput::idle()).unwrap();
    assert_eq!(report.frame, frame + 1);
    assert_eq!(report.splats, 0);
}

#[test]
fn config_edits_from_another_thread_apply_at_frame_boundaries() {
    let config = ConfigHandle::new(SimParams {
        resolution: 0.25,
        ..SimParams::default()
    });
    let mut fluid = Orchestrator::new(CpuBackend::new());
    fluid
        .initialize(Viewport::new(128, 64), &config.snapshot())
        .unwrap();
    assert_eq!(fluid.grid_size(), Some(GridSize::new(32, 16)));

    let writer = {
        let config = config.clone();
        thread::spawn(move || {
            config.update(|p| {
                p.resolution = 0.5;
                p.poisson_iterations = 5000;
                p.dt = -1.0;
            })
        })
    };
    writer.join().unwrap();

    let snapshot = config.snapshot();
    assert_eq!(snapshot.poisson_iterations, 100);
    assert!(snapshot.dt > 0.0);

    let report = fluid.tick(&snapshot, &PointerInput::idle()).unwrap();
    assert_eq!(report.grid, Some(GridSize::new(64, 32)));
    assert!(fluid.fields().unwrap().velocity.is_zero());
}

#[test]
fn disposed_solver_can_be_initialized_again() {
    let params = SimParams::default();
    let mut fluid = Orchestrator::new(CpuBackend::new());
    fluid.initialize(Viewport::new(40, 40), &params).unwrap();
    fluid.tick(&params, &PointerInput::idle()).unwrap();
    fluid.dispose();

    assert_eq!(fluid.state(), SolverState::Uninitialized);
    assert!(fluid.fields().is_err());

    fluid.initialize(Viewport::new(60, 20), &params).unwrap();
    assert_eq!(fluid.grid_size(), Some(GridSize::new(30, 10)));
    assert_eq!(fluid.frame(), 0);
}
