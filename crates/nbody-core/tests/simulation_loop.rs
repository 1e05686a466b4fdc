use nbody_core::{
    BufferSlot, CancelFlag, Float4, ForceIntegrator, LoopState, NBodyError, ParallelIntegrator, ParticleState,
    Position, Presenter, ReferenceIntegrator, SimulationLoop, SimulationParameters, TextureRenderer,
};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn small_params(iterations: Option<u32>) -> SimulationParameters {
    SimulationParameters { count: 32, wgsize: 8, iterations, ..Default::default() }
}

fn initial(params: &SimulationParameters) -> ParticleState {
    ParticleState::generate(params, &mut StdRng::seed_from_u64(42))
}

/// Keeps a copy of every published frame.
#[derive(Default)]
struct Recorder {
    frames: Vec<Vec<Position>>,
    stop_after: usize,
}

impl Presenter for Recorder {
    fn publish(&mut self, positions: &[Position]) -> Result<(), NBodyError> {
        self.frames.push(positions.to_vec());
        Ok(())
    }

    fn poll_cancel(&mut self) -> bool {
        self.frames.len() >= self.stop_after
    }
}

/// Fails on the n-th integrate call.
struct Flaky {
    inner: ReferenceIntegrator,
    fail_at: usize,
    calls: usize,
}

impl ForceIntegrator for Flaky {
    type Buffer = Vec<Float4>;

    fn name(&self) -> String {
        "flaky".into()
    }

    fn upload(&mut self, host: &[Float4]) -> Result<Self::Buffer, NBodyError> {
        self.inner.upload(host)
    }

    fn download(&mut self, buffer: &Self::Buffer, host: &mut [Float4]) -> Result<(), NBodyError> {
        self.inner.download(buffer, host)
    }

    fn integrate(
        &mut self,
        positions_in: &Self::Buffer,
        velocities: &mut Self::Buffer,
        positions_out: &mut Self::Buffer,
        count: usize,
        delta: f32,
        softening: f32,
    ) -> Result<(), NBodyError> {
        self.calls += 1;
        if self.calls == self.fail_at {
            return Err(NBodyError::Api(-5));
        }
        self.inner.integrate(positions_in, velocities, positions_out, count, delta, softening)
    }
}

#[test]
fn slots_alternate_every_step() {
    let params = small_params(Some(4));
    let mut sim = SimulationLoop::new(ReferenceIntegrator::default(), params.clone(), &initial(&params)).unwrap();
    assert_eq!(sim.state(), LoopState::Initializing);
    assert_eq!(sim.current_slot(), BufferSlot::A);

    sim.step().unwrap();
    assert_eq!(sim.state(), LoopState::Stepping);
    assert_eq!(sim.current_slot(), BufferSlot::B);
    sim.step().unwrap();
    // two swaps restore the starting roles
    assert_eq!(sim.current_slot(), BufferSlot::A);
    assert_eq!(sim.steps(), 2);
}

#[test]
fn zero_steps_return_the_initial_state() {
    let params = small_params(Some(0));
    let state = initial(&params);
    let mut sim = SimulationLoop::new(ReferenceIntegrator::default(), params, &state).unwrap();
    let stats = sim.run().unwrap();
    assert_eq!(stats.steps, 0);
    assert_eq!(stats.fps(), 0.0);
    assert_eq!(sim.final_positions().unwrap(), state.positions);
    assert_eq!(sim.velocities().unwrap(), state.velocities);
}

#[test]
fn stepping_one_at_a_time_matches_a_full_run() {
    let params = small_params(Some(6));
    let state = initial(&params);

    let mut whole = SimulationLoop::new(ReferenceIntegrator::default(), params.clone(), &state).unwrap();
    whole.run().unwrap();

    let mut single = SimulationLoop::new(ReferenceIntegrator::default(), params, &state).unwrap();
    for _ in 0..6 {
        single.step().unwrap();
    }
    assert_eq!(single.final_positions().unwrap(), whole.final_positions().unwrap());
    assert_eq!(single.velocities().unwrap(), whole.velocities().unwrap());
}

#[test]
fn fixed_run_counts_steps_and_terminates() {
    let params = small_params(Some(7));
    let mut sim = SimulationLoop::new(ParallelIntegrator::new(Some(2), &params).unwrap(), params.clone(), &initial(&params)).unwrap();
    let stats = sim.run().unwrap();
    assert_eq!(stats.steps, 7);
    assert_eq!(sim.steps(), 7);
    assert_eq!(sim.state(), LoopState::Terminating);
    assert!(matches!(sim.step(), Err(NBodyError::Terminated)));
}

#[test]
fn fixed_run_counts_earlier_steps() {
    let params = small_params(Some(4));
    let state = initial(&params);
    let mut sim = SimulationLoop::new(ReferenceIntegrator::default(), params.clone(), &state).unwrap();
    sim.step().unwrap();
    let stats = sim.run().unwrap();
    assert_eq!(stats.steps, 3);
    assert_eq!(sim.steps(), 4);

    let mut whole = SimulationLoop::new(ReferenceIntegrator::default(), params, &state).unwrap();
    whole.run().unwrap();
    assert_eq!(sim.final_positions().unwrap(), whole.final_positions().unwrap());
}

#[test]
fn fixed_run_after_enough_steps_does_nothing() {
    let params = small_params(Some(2));
    let mut sim = SimulationLoop::new(ReferenceIntegrator::default(), params.clone(), &initial(&params)).unwrap();
    for _ in 0..3 {
        sim.step().unwrap();
    }
    let stats = sim.run().unwrap();
    assert_eq!(stats.steps, 0);
    assert_eq!(sim.steps(), 3);
    assert_eq!(sim.state(), LoopState::Terminating);
}

#[test]
fn fixed_run_needs_an_iteration_count() {
    let params = small_params(None);
    let mut sim = SimulationLoop::new(ReferenceIntegrator::default(), params.clone(), &initial(&params)).unwrap();
    assert!(matches!(sim.run(), Err(NBodyError::Config(_))));
    assert_eq!(sim.steps(), 0);
}

#[test]
fn terminate_stops_further_steps() {
    let params = small_params(Some(1));
    let mut sim = SimulationLoop::new(ReferenceIntegrator::default(), params.clone(), &initial(&params)).unwrap();
    sim.terminate();
    assert!(matches!(sim.step(), Err(NBodyError::Terminated)));
    assert_eq!(sim.current_slot(), BufferSlot::A);
}

#[test]
fn failed_step_terminates_without_swapping() {
    let params = small_params(Some(5));
    let flaky = Flaky { inner: ReferenceIntegrator::default(), fail_at: 3, calls: 0 };
    let mut sim = SimulationLoop::new(flaky, params.clone(), &initial(&params)).unwrap();

    let err = sim.run().unwrap_err();
    assert!(matches!(err, NBodyError::Api(-5)));
    assert_eq!(sim.steps(), 2);
    assert_eq!(sim.current_slot(), BufferSlot::A);
    assert_eq!(sim.state(), LoopState::Terminating);
    assert!(matches!(sim.step(), Err(NBodyError::Terminated)));
}

#[test]
fn rejects_state_of_the_wrong_size() {
    let params = small_params(Some(1));
    let state = ParticleState::generate(&SimulationParameters { count: 16, ..params.clone() }, &mut StdRng::seed_from_u64(1));
    let err = SimulationLoop::new(ReferenceIntegrator::default(), params, &state).err().unwrap();
    assert!(matches!(err, NBodyError::LengthMismatch { expected: 32, actual: 16 }));
}

#[test]
fn rejects_invalid_parameters() {
    let params = SimulationParameters { softening: f32::INFINITY, ..small_params(Some(1)) };
    let state = initial(&small_params(Some(1)));
    let err = SimulationLoop::new(ReferenceIntegrator::default(), params, &state).err().unwrap();
    assert!(matches!(err, NBodyError::Config(_)));
}

// ==================================================================================
// Interactive hand-off
// ==================================================================================

#[test]
fn every_published_frame_is_a_completed_step() {
    let params = small_params(None);
    let state = initial(&params);
    let mut sim = SimulationLoop::new(ReferenceIntegrator::default(), params.clone(), &state).unwrap();
    let mut recorder = Recorder { stop_after: 3, ..Default::default() };
    let stats = sim.run_interactive(&mut recorder).unwrap();

    assert_eq!(stats.steps, 3);
    assert_eq!(recorder.frames.len(), 3);
    assert_eq!(sim.state(), LoopState::Terminating);

    // replay step by step and compare with what the presenter saw
    let mut replay = SimulationLoop::new(ReferenceIntegrator::default(), params, &state).unwrap();
    for frame in &recorder.frames {
        replay.step().unwrap();
        assert_eq!(&replay.final_positions().unwrap(), frame);
    }
    assert_ne!(recorder.frames[0], state.positions);
    assert_ne!(recorder.frames[0], recorder.frames[1]);
}

#[test]
fn publish_hands_over_the_current_slot() {
    let params = small_params(Some(1));
    let state = initial(&params);
    let mut sim = SimulationLoop::new(ReferenceIntegrator::default(), params, &state).unwrap();
    let mut recorder = Recorder::default();

    sim.publish(&mut recorder).unwrap();
    sim.step().unwrap();
    sim.publish(&mut recorder).unwrap();

    assert_eq!(recorder.frames[0], state.positions);
    assert_eq!(recorder.frames[1], sim.final_positions().unwrap());
}

#[test]
fn renderer_frame_limit_ends_the_loop() {
    let params = SimulationParameters { count: 64, iterations: None, ..SimulationParameters::interactive() };
    let state = initial(&params);
    let integrator = ParallelIntegrator::new(Some(2), &params).unwrap();
    let mut sim = SimulationLoop::new(integrator, params, &state).unwrap();

    let mut renderer = TextureRenderer::new(320, 240, CancelFlag::new()).with_frame_limit(5);
    let stats = sim.run_interactive(&mut renderer).unwrap();
    assert_eq!(stats.steps, 5);
    assert_eq!(renderer.frames(), 5);
    // most of a radius-128 sphere projects inside 320x240
    assert!(renderer.drawn() > 0);
}

#[test]
fn cancellation_is_honoured_between_steps() {
    let params = small_params(None);
    let state = initial(&params);
    let mut sim = SimulationLoop::new(ReferenceIntegrator::default(), params, &state).unwrap();

    let cancel = CancelFlag::new();
    cancel.cancel();
    let mut renderer = TextureRenderer::new(64, 64, cancel.clone());
    let stats = sim.run_interactive(&mut renderer).unwrap();
    // the step in progress always completes and is shown
    assert_eq!(stats.steps, 1);
    assert_eq!(renderer.frames(), 1);
    assert!(cancel.is_cancelled());
}

#[test]
fn cancel_from_another_thread() {
    let params = small_params(None);
    let state = initial(&params);
    let mut sim = SimulationLoop::new(ReferenceIntegrator::default(), params, &state).unwrap();

    let cancel = CancelFlag::new();
    let remote = cancel.clone();
    let mut renderer = TextureRenderer::new(64, 64, cancel);
    let handle = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(20));
        remote.cancel();
    });
    let stats = sim.run_interactive(&mut renderer).unwrap();
    handle.join().unwrap();
    assert!(stats.steps >= 1);
    assert_eq!(stats.steps, renderer.frames());
}

/// Publishes `ok` frames, then fails.
struct Broken {
    ok: usize,
    published: usize,
}

impl Presenter for Broken {
    fn publish(&mut self, _positions: &[Position]) -> Result<(), NBodyError> {
        if self.published == self.ok {
            return Err(NBodyError::Config("presenter gone".into()));
        }
        self.published += 1;
        Ok(())
    }

    fn poll_cancel(&mut self) -> bool {
        false
    }
}

#[test]
fn failed_hand_off_terminates_the_loop() {
    let params = small_params(None);
    let state = initial(&params);
    let mut sim = SimulationLoop::new(ReferenceIntegrator::default(), params, &state).unwrap();
    let mut broken = Broken { ok: 2, published: 0 };

    let err = sim.run_interactive(&mut broken).unwrap_err();
    assert!(matches!(err, NBodyError::Config(_)));
    assert_eq!(sim.steps(), 3);
    assert_eq!(sim.state(), LoopState::Terminating);
    assert!(matches!(sim.step(), Err(NBodyError::Terminated)));
}

#[test]
fn failed_publish_outside_the_loop_terminates_too() {
    let params = small_params(Some(5));
    let state = initial(&params);
    let mut sim = SimulationLoop::new(ReferenceIntegrator::default(), params, &state).unwrap();
    sim.step().unwrap();

    assert!(sim.publish(&mut Broken { ok: 0, published: 0 }).is_err());
    assert_eq!(sim.state(), LoopState::Terminating);
    assert!(matches!(sim.run(), Err(NBodyError::Terminated)));
    assert_eq!(sim.steps(), 1);
}
