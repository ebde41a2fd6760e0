//! wellgrid CLI — batch front-end for chip analysis.
//!
//! Loads the three channel images and the run parameters, drives the
//! locate → review → extract pipeline, and writes the well table as JSON.
//! Interactive review is replayed from a recorded transcript file; without
//! one, every stage is confirmed untouched.

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use wellgrid::{
    AnalysisConfig, CancelToken, ChipAnalyzer, CornerSample, Frame, GridShape, ImageSet,
    ImageStack, LatticeSeed, Transcript,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "wellgrid")]
#[command(about = "Locate button/chamber arrays in fluorescence images and extract well statistics")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full analysis pipeline and write the well table.
    Analyze(AnalyzeArgs),

    /// Fit the corner samples and print the interpolated lattice geometry.
    LatticeInfo {
        /// Path to the run-spec JSON.
        #[arg(long)]
        run_spec: PathBuf,
    },
}

#[derive(Debug, Clone, Args)]
struct AnalyzeArgs {
    /// Path to the run-spec JSON (grid shape, corner clicks, image paths).
    #[arg(long)]
    run_spec: PathBuf,

    /// Path to write the well table (JSON).
    #[arg(long)]
    out: PathBuf,

    /// Recorded correction transcript (JSON). Defaults to confirming every
    /// stage untouched.
    #[arg(long)]
    transcript: Option<PathBuf>,

    /// Depth of the flag/removal undo history.
    #[arg(long, default_value = "1")]
    undo_depth: usize,
}

/// Run parameters collected by the (external) acquisition tooling.
#[derive(Debug, Clone, Deserialize)]
struct RunSpec {
    grid: GridShape,
    /// Saturation sentinel; defaults to the 16-bit maximum.
    saturation_level: Option<f32>,
    /// Circumference clicks for the four button-lattice corners.
    button_corners: [Vec<[f64; 2]>; 4],
    /// Circumference clicks for the four chamber-lattice corners.
    chamber_corners: [Vec<[f64; 2]>; 4],
    /// Surface (button) channel image.
    surface: PathBuf,
    /// Solubilized (chamber) channel frames, in acquisition order.
    solubilized: Vec<PathBuf>,
    /// Captured (bound-molecule) channel frames, in acquisition order.
    captured: Vec<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let result = match &cli.command {
        Commands::Analyze(args) => run_analyze(args),
        Commands::LatticeInfo { run_spec } => run_lattice_info(run_spec),
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

// ── analyze ────────────────────────────────────────────────────────────

fn run_analyze(args: &AnalyzeArgs) -> CliResult<()> {
    let spec = load_run_spec(&args.run_spec)?;
    let base = args.run_spec.parent().unwrap_or(Path::new("."));

    tracing::info!("Loading surface image: {}", spec.surface.display());
    let surface = load_frame(&base.join(&spec.surface))?;
    let solubilized = load_stack(base, &spec.solubilized)?;
    let captured = load_stack(base, &spec.captured)?;
    let images = ImageSet::new(surface, solubilized, captured)?;
    let (w, h) = images.dimensions();
    tracing::info!(
        "Image set {}x{} ({} solubilized, {} captured frames)",
        w,
        h,
        images.solubilized().n_frames(),
        images.captured().n_frames()
    );

    let transcript = match &args.transcript {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            serde_json::from_str::<Transcript>(&raw)?
        }
        None => {
            tracing::warn!("No transcript supplied; confirming all review stages untouched");
            Transcript::confirm_all()
        }
    };

    let mut config = AnalysisConfig::for_shape(spec.grid);
    if let Some(level) = spec.saturation_level {
        config.saturation_level = level;
    }
    config.undo_depth = args.undo_depth;

    let analyzer = ChipAnalyzer::new(config)?;
    let button_corners = corner_samples(&spec.button_corners);
    let chamber_corners = corner_samples(&spec.chamber_corners);

    let records = analyzer.run(
        &images,
        &button_corners,
        &chamber_corners,
        &transcript,
        &CancelToken::new(),
    )?;

    let n_auto = records.iter().filter(|r| r.button.autofind).count();
    let n_removed = records.iter().filter(|r| r.removed).count();
    let n_flagged = records.iter().filter(|r| r.flagged).count();
    tracing::info!(
        "Extracted {} wells ({} auto-detected buttons, {} flagged, {} removed)",
        records.len(),
        n_auto,
        n_flagged,
        n_removed
    );

    let json = serde_json::to_string_pretty(&records)?;
    std::fs::write(&args.out, &json)?;
    tracing::info!("Well table written to {}", args.out.display());

    Ok(())
}

// ── lattice-info ───────────────────────────────────────────────────────

fn run_lattice_info(run_spec: &Path) -> CliResult<()> {
    let spec = load_run_spec(run_spec)?;

    let button_seed = LatticeSeed::from_corner_samples(&corner_samples(&spec.button_corners))?;
    let chamber_seed = LatticeSeed::from_corner_samples(&corner_samples(&spec.chamber_corners))?;

    println!("Grid: {} rows x {} cols", spec.grid.rows, spec.grid.cols);
    for (name, seed) in [("buttons", &button_seed), ("chambers", &chamber_seed)] {
        println!("{}:", name);
        println!("  radius estimate: {:.2} px", seed.radius);
        for (i, c) in seed.centers.iter().enumerate() {
            println!("  corner {}: ({:.1}, {:.1})", i, c[0], c[1]);
        }
        let lattice = wellgrid::Lattice::from_seed(seed, spec.grid)?;
        let first = lattice.node(0);
        let last = lattice.node(lattice.n_sites() - 1);
        println!("  sites: {}", lattice.n_sites());
        println!("  node 0: ({}, {})", first[0], first[1]);
        println!("  node {}: ({}, {})", lattice.n_sites() - 1, last[0], last[1]);
    }
    Ok(())
}

// ── loading helpers ────────────────────────────────────────────────────

fn load_run_spec(path: &Path) -> CliResult<RunSpec> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| -> CliError { format!("failed to read {}: {}", path.display(), e).into() })?;
    Ok(serde_json::from_str(&raw)?)
}

fn corner_samples(clicks: &[Vec<[f64; 2]>; 4]) -> [CornerSample; 4] {
    [
        CornerSample::new(clicks[0].clone()),
        CornerSample::new(clicks[1].clone()),
        CornerSample::new(clicks[2].clone()),
        CornerSample::new(clicks[3].clone()),
    ]
}

/// Decode an image into the 16-bit-range float frame the core expects.
fn load_frame(path: &Path) -> CliResult<Frame> {
    let img = image::open(path).map_err(|e| -> CliError {
        format!("failed to open image {}: {}", path.display(), e).into()
    })?;
    let gray = img.to_luma16();
    let (w, h) = gray.dimensions();
    let pixels: Vec<f32> = gray.into_raw().into_iter().map(|v| v as f32).collect();
    Frame::from_raw(w, h, pixels)
        .ok_or_else(|| -> CliError { format!("image {} has no pixels", path.display()).into() })
}

fn load_stack(base: &Path, paths: &[PathBuf]) -> CliResult<ImageStack> {
    let mut frames = Vec::with_capacity(paths.len());
    for path in paths {
        frames.push(load_frame(&base.join(path))?);
    }
    Ok(ImageStack::new(frames)?)
}
