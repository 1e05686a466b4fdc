use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;

use nbody_core::device::format_device_list;
use nbody_core::{
    device_list, run_reference, select_device, verify, CancelFlag, DeviceKind, ForceForm, ForceIntegrator,
    InitDistribution, NBodyError, ParallelIntegrator, ParticleState, SimulationLoop, SimulationParameters,
    TextureRenderer,
};

#[cfg(feature = "metrics")]
use nbody_core::summary;

#[derive(Parser, Debug)]
#[command(name = "nbody", about = "Direct-summation N-body simulation with double-buffered integration")]
struct Args {
    /// List available devices
    #[arg(long)]
    list: bool,
    /// Select device at INDEX
    #[arg(long, value_name = "INDEX", default_value_t = 0)]
    device: usize,
    /// Run simulation with N bodies
    #[arg(short = 'n', long = "numbodies", value_name = "N")]
    numbodies: Option<usize>,
    /// Time difference between iterations
    #[arg(short, long, allow_negative_numbers = true)]
    delta: Option<f32>,
    /// Force softening factor
    #[arg(short, long, value_name = "SOFT")]
    softening: Option<f32>,
    /// Run simulation for ITRS iterations
    #[arg(short, long, value_name = "ITRS")]
    iterations: Option<u32>,
    /// Set work-group size to WGSIZE
    #[arg(long)]
    wgsize: Option<usize>,
    /// Unroll factor of the kernel's inner loop
    #[arg(short = 'u', long, value_name = "UNROLL")]
    unroll: Option<u32>,
    /// Enable use of local (group-shared) memory
    #[arg(long)]
    local: bool,
    /// Initialise bodies on a 2D circle instead of a 3D sphere
    #[arg(long)]
    circle: bool,
    /// Use w * (1/dist)^3 instead of w / dist^3
    #[arg(long)]
    inverse_cube: bool,
    /// Radius of the initial sphere/circle
    #[arg(long)]
    radius: Option<f32>,
    /// Verification tolerance (euclidean distance)
    #[arg(long)]
    tolerance: Option<f32>,
    /// Seed for the initial distribution
    #[arg(long)]
    seed: Option<u64>,
    /// Host thread pool size
    #[arg(long)]
    threads: Option<usize>,
    /// Skip the reference run and verification
    #[arg(long)]
    no_verify: bool,
    /// Run the interactive render loop until cancelled
    #[arg(long)]
    render: bool,
    /// Texture width in pixels
    #[arg(long, default_value_t = 640)]
    width: u32,
    /// Texture height in pixels
    #[arg(long, default_value_t = 480)]
    height: u32,
    /// Stop the render loop after N frames
    #[arg(long, value_name = "N")]
    frames: Option<u64>,
    /// Write the last rendered frame to an image file (.png, .ppm, ...)
    #[arg(long, value_name = "PATH")]
    snapshot: Option<PathBuf>,
    /// Write the transfer/step timeline to a CSV file
    #[cfg(feature = "memtrace")]
    #[arg(long, value_name = "PATH", default_value = "memtrace.csv")]
    memtrace: PathBuf,
}

impl Args {
    fn parameters(&self) -> SimulationParameters {
        let base = if self.render { SimulationParameters::interactive() } else { SimulationParameters::default() };
        SimulationParameters {
            count: self.numbodies.unwrap_or(base.count),
            delta: self.delta.unwrap_or(base.delta),
            softening: self.softening.unwrap_or(base.softening),
            iterations: if self.render { None } else { self.iterations.or(base.iterations) },
            init: if self.circle { InitDistribution::Circle } else { InitDistribution::Sphere },
            sphere_radius: self.radius.unwrap_or(base.sphere_radius),
            tolerance: self.tolerance.unwrap_or(base.tolerance),
            wgsize: self.wgsize.unwrap_or(base.wgsize),
            use_local: self.local,
            unroll: self.unroll.unwrap_or(base.unroll),
            force_form: if self.inverse_cube { ForceForm::InverseCube } else { ForceForm::Divide },
            seed: self.seed.unwrap_or(base.seed),
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // --help / --version print to stdout and are not failures
            let _ = e.print();
            return if e.use_stderr() { ExitCode::FAILURE } else { ExitCode::SUCCESS };
        }
    };

    match run(&args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<ExitCode, NBodyError> {
    /* ---------- 1. Geräte ---------- */
    let devices = device_list(args.threads)?;
    if args.list {
        print!("{}", format_device_list(&devices));
        return Ok(ExitCode::SUCCESS);
    }

    let params = args.parameters();
    params.validate()?;

    let device = select_device(&devices, args.device)?;
    println!("\nUsing device: {}", device.name);

    /* ---------- 2. Hostdaten ---------- */
    let mut rng = StdRng::seed_from_u64(params.seed);
    let initial = ParticleState::generate(&params, &mut rng);

    /* ---------- 3. Substrat wählen ---------- */
    let code = match device.kind {
        DeviceKind::Host { threads } => {
            let integrator = ParallelIntegrator::new(Some(threads), &params)?;
            drive(integrator, &params, &initial, args)?
        }
        #[cfg(feature = "opencl")]
        DeviceKind::OpenCl(id) => {
            let integrator = nbody_core::ClIntegrator::new(id, &params)?;
            drive(integrator, &params, &initial, args)?
        }
    };

    #[cfg(feature = "metrics")]
    summary();
    #[cfg(feature = "memtrace")]
    nbody_core::flush_csv(&args.memtrace)?;

    Ok(code)
}

fn drive<I: ForceIntegrator>(
    integrator: I,
    params: &SimulationParameters,
    initial: &ParticleState,
    args: &Args,
) -> Result<ExitCode, NBodyError> {
    let mut sim = SimulationLoop::new(integrator, params.clone(), initial)?;
    println!("Initialization complete.\n");

    if args.render {
        return render(&mut sim, args);
    }

    /* ---------- 4. Simulation ---------- */
    println!("Running simulation...");
    let stats = sim.run()?;
    let computed = sim.final_positions()?;
    println!("{} took {:.3}ms\n", sim.integrator().name(), stats.millis());

    if args.no_verify {
        return Ok(ExitCode::SUCCESS);
    }

    /* ---------- 5. Referenz & Verifikation ---------- */
    println!("Running reference...");
    let start = Instant::now();
    let reference = run_reference(initial, params)?;
    println!("Reference took {:.3}ms\n", start.elapsed().as_secs_f64() * 1e3);

    let result = verify(&computed, &reference, params.tolerance)?;
    println!("{result}");
    Ok(if result.passed { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn render<I: ForceIntegrator>(sim: &mut SimulationLoop<I>, args: &Args) -> Result<ExitCode, NBodyError> {
    let cancel = CancelFlag::new();
    let mut renderer = TextureRenderer::new(args.width, args.height, cancel.clone());
    match args.frames {
        Some(n) => renderer = renderer.with_frame_limit(n),
        None => {
            let _watcher = cancel.watch_stdin()?;
            println!("Press 'q' + Enter to stop.");
        }
    }

    println!("Running simulation...");
    let stats = sim.run_interactive(&mut renderer)?;
    println!("{} took {:.3}ms\n", sim.integrator().name(), stats.millis());
    println!("Average FPS was {:.2}\n", stats.fps());

    if let Some(path) = &args.snapshot {
        renderer.save_snapshot(path)?;
    }
    Ok(ExitCode::SUCCESS)
}
