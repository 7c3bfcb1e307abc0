//! sansim CLI
//!
//! Previews Q coverage and resolution for a SANS instrument setting.
#![allow(clippy::uninlined_format_args, clippy::too_many_lines)]

use clap::{Parser, Subcommand, ValueEnum};
use log::{info, LevelFilter};

use sansim_algorithms::{
    simulate, simulate_many, AccumulatorConfig, CalculationContext, IncompleteGamma, ModelSpec,
    ReducedData, Scenario, SimulationOptions,
};
use sansim_core::config::{AveragingParams, DetectorSection, InstrumentConfig};
use sansim_core::error::ExternalServiceError;
use sansim_core::instrument::{GuideConfig, Instrument, SampleTable};
use sansim_core::model::ModelRequest;
use sansim_io::{load_averaging, load_config, load_scenarios, ReducedDataWriter};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    SansimIo(#[from] sansim_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] sansim_core::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Averaging selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Averaging {
    /// Full azimuthal average
    Circular,
    /// Wedge around --phi
    Sector,
    /// Ring around --q-center
    Annular,
    /// Bar along --phi
    Rectangular,
    /// Ellipse-corrected radii
    Elliptical,
}

/// Detector half for sector and bar averages.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Section {
    Both,
    Left,
    Right,
}

impl From<Section> for DetectorSection {
    fn from(section: Section) -> Self {
        match section {
            Section::Both => DetectorSection::Both,
            Section::Left => DetectorSection::Left,
            Section::Right => DetectorSection::Right,
        }
    }
}

/// Instrument settings given on the command line.
#[derive(clap::Args, Debug)]
struct InstrumentArgs {
    /// Instrument configuration file (JSON); flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Instrument name (NG7, NGB30)
    #[arg(long, conflicts_with = "config")]
    instrument: Option<Instrument>,

    /// Wavelength (A)
    #[arg(long)]
    wavelength: Option<f64>,

    /// Wavelength spread (percent FWHM)
    #[arg(long)]
    spread: Option<f64>,

    /// Number of guides, or LENS
    #[arg(long)]
    guides: Option<GuideConfig>,

    /// Sample table (CHAMBER, HUBER)
    #[arg(long)]
    table: Option<SampleTable>,

    /// Detector distance (cm)
    #[arg(long)]
    distance: Option<f64>,

    /// Lateral detector offset (cm)
    #[arg(long)]
    offset: Option<f64>,

    /// Source aperture diameter (cm)
    #[arg(long)]
    source_aperture: Option<f64>,

    /// Sample aperture diameter (cm)
    #[arg(long)]
    sample_aperture: Option<f64>,

    /// Beamstop diameter (cm)
    #[arg(long)]
    beamstop: Option<f64>,
}

impl InstrumentArgs {
    fn resolve(&self) -> Result<InstrumentConfig> {
        let mut config = match (&self.config, self.instrument) {
            (Some(path), _) => load_config(path)?,
            (None, Some(instrument)) => InstrumentConfig::from_instrument(instrument),
            (None, None) => InstrumentConfig::default(),
        };
        if let Some(v) = self.wavelength {
            config = config.with_wavelength(v);
        }
        if let Some(v) = self.spread {
            config = config.with_wavelength_spread(v);
        }
        if let Some(v) = self.guides {
            config = config.with_guides(v);
        }
        if let Some(v) = self.table {
            config = config.with_sample_table(v);
        }
        if let Some(v) = self.distance {
            config = config.with_detector_distance(v);
        }
        if let Some(v) = self.offset {
            config = config.with_detector_offset(v);
        }
        if let Some(v) = self.source_aperture {
            config = config.with_source_aperture(v);
        }
        if let Some(v) = self.sample_aperture {
            config = config.with_sample_aperture(v);
        }
        if let Some(v) = self.beamstop {
            config = config.with_beamstop(v);
        }
        config.validate()?;
        Ok(config)
    }
}

/// Averaging settings given on the command line.
#[derive(clap::Args, Debug)]
struct AveragingArgs {
    /// Averaging parameters file (JSON); overrides the flags below
    #[arg(long = "averaging-file")]
    file: Option<PathBuf>,

    /// Averaging type
    #[arg(short, long, value_enum, default_value = "circular")]
    averaging: Averaging,

    /// Orientation angle (degrees)
    #[arg(long, default_value = "0.0")]
    phi: f64,

    /// Sector half-width (degrees)
    #[arg(long, default_value = "10.0")]
    dphi: f64,

    /// Detector half for sector and bar averages
    #[arg(long, value_enum, default_value = "both")]
    section: Section,

    /// Annulus center (1/A)
    #[arg(long, default_value = "0.01")]
    q_center: f64,

    /// Annulus half-width (1/A)
    #[arg(long, default_value = "0.005")]
    q_width: f64,

    /// Bar width (pixels)
    #[arg(long, default_value = "3.0")]
    bar_width: f64,

    /// Ellipse aspect ratio
    #[arg(long, default_value = "1.0")]
    aspect: f64,
}

impl AveragingArgs {
    fn resolve(&self) -> Result<AveragingParams> {
        if let Some(path) = &self.file {
            return Ok(load_averaging(path)?);
        }
        let section = self.section.into();
        let params = match self.averaging {
            Averaging::Circular => AveragingParams::circular(),
            Averaging::Sector => AveragingParams::sector(self.phi, self.dphi, section),
            Averaging::Annular => AveragingParams::annular(self.q_center, self.q_width),
            Averaging::Rectangular => {
                AveragingParams::rectangular(self.phi, self.bar_width, section)
            }
            Averaging::Elliptical => AveragingParams::elliptical(self.phi, self.aspect),
        };
        params.validate()?;
        Ok(params)
    }
}

/// Pipeline settings shared by simulate and batch.
#[derive(clap::Args, Debug)]
struct PipelineArgs {
    /// Constant model intensity sampled over the detector
    #[arg(long, default_value = "1.0")]
    intensity: f64,

    /// Mask pixels behind the projected beamstop
    #[arg(long)]
    mask_beamstop: bool,

    /// Evaluate the incomplete-gamma term instead of the fixed epsilon
    #[arg(long)]
    closed_form_gamma: bool,

    /// Sub-pixels per side near the beam center
    #[arg(long, default_value = "3")]
    subdivisions: usize,
}

impl PipelineArgs {
    fn options(&self) -> SimulationOptions {
        let gamma = if self.closed_form_gamma {
            IncompleteGamma::ClosedForm
        } else {
            IncompleteGamma::EpsilonStub
        };
        SimulationOptions::default()
            .with_accumulator(AccumulatorConfig::default().with_subdivisions(self.subdivisions))
            .with_incomplete_gamma(gamma)
            .with_beamstop_mask(self.mask_beamstop)
    }

    fn model(&self) -> ModelSpec {
        ModelSpec::new("flat", vec![self.intensity])
    }
}

/// Built-in flat model: every point gets the first parameter.
fn flat_model(request: &ModelRequest) -> std::result::Result<Vec<f64>, ExternalServiceError> {
    let value = request.params.first().copied().unwrap_or(1.0);
    Ok(vec![value; request.expected_len()])
}

/// SANS instrument simulator.
#[derive(Parser)]
#[command(name = "sansim")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reduce a simulated detector image to Q bins with resolution
    Simulate {
        #[command(flatten)]
        instrument: InstrumentArgs,

        #[command(flatten)]
        averaging: AveragingArgs,

        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Output file (.csv or .json)
        #[arg(short, long)]
        output: PathBuf,

        /// Print the averaging overlay as JSON
        #[arg(long)]
        overlay: bool,
    },

    /// Run every scenario in a JSON file in parallel
    Batch {
        /// Scenario list (JSON array of {config, averaging})
        scenarios: PathBuf,

        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Directory receiving scenario_<n>.csv
        #[arg(short, long)]
        output_dir: PathBuf,
    },

    /// Show derived geometry and Q range for a setting
    Geometry {
        #[command(flatten)]
        instrument: InstrumentArgs,
    },

    /// List instrument tables
    Instruments,
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(default)
        .parse_default_env()
        .init();
}

fn write_result(path: &Path, data: &ReducedData) -> Result<()> {
    let mut writer = ReducedDataWriter::create(path)?;
    writer.write(data)?;
    writer.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Simulate {
            instrument,
            averaging,
            pipeline,
            output,
            overlay,
        } => {
            let scenario = Scenario::new(instrument.resolve()?, averaging.resolve()?);
            let options = pipeline.options();
            let start = Instant::now();

            if overlay {
                let ctx = CalculationContext::new(&scenario, &options)?;
                println!("{}", serde_json::to_string_pretty(&ctx.overlay())?);
            }

            let data = simulate(&scenario, &flat_model, &pipeline.model(), &options)?;
            write_result(&output, &data)?;

            info!(
                "{} bins ({} populated) in {:.1} ms",
                data.bins.len(),
                data.populated().count(),
                start.elapsed().as_secs_f64() * 1000.0
            );
            println!(
                "Q range: {:.5} - {:.5} 1/A",
                data.q_range.q_min, data.q_range.q_max
            );
            println!("Wrote {}", output.display());
        }

        Commands::Batch {
            scenarios,
            pipeline,
            output_dir,
        } => {
            let scenarios = load_scenarios(&scenarios)?;
            std::fs::create_dir_all(&output_dir)?;
            let start = Instant::now();
            let results = simulate_many(
                &scenarios,
                &flat_model,
                &pipeline.model(),
                &pipeline.options(),
            );
            for (k, result) in results.into_iter().enumerate() {
                let path = output_dir.join(format!("scenario_{}.csv", k));
                match result {
                    Ok(data) => {
                        write_result(&path, &data)?;
                        println!(
                            "scenario {}: {} bins, Q {:.5} - {:.5} 1/A -> {}",
                            k,
                            data.bins.len(),
                            data.q_range.q_min,
                            data.q_range.q_max,
                            path.display()
                        );
                    }
                    Err(e) => eprintln!("scenario {}: {}", k, e),
                }
            }
            info!(
                "{} scenarios in {:.1} ms",
                scenarios.len(),
                start.elapsed().as_secs_f64() * 1000.0
            );
        }

        Commands::Geometry { instrument } => {
            let config = instrument.resolve()?;
            let scenario = Scenario::new(config, AveragingParams::circular());
            let ctx = CalculationContext::new(&scenario, &SimulationOptions::default())?;
            let g = ctx.geometry();
            let qmap = ctx.qmap();
            println!("Instrument: {}", ctx.config().instrument);
            println!("SSD: {:.1} cm", g.ssd_cm);
            println!("SDD: {:.1} cm", g.sdd_cm);
            println!("Beam center: ({:.2}, {:.2})", g.beam_center_x, g.beam_center_y);
            println!(
                "Beamstop on detector: {:.2} cm ({:.1} pixels)",
                ctx.resolution().beamstop_radius_cm(),
                ctx.beamstop_radius_pixels()
            );
            println!(
                "Guide transmission: {:.3}",
                ctx.config()
                    .table()
                    .guide_loss(ctx.config().guides.guide_count())
            );
            println!("Q max (corner): {:.5} 1/A", qmap.q_max());
        }

        Commands::Instruments => {
            println!(
                "{:<8} {:>10} {:>10} {:>18} {:>8}",
                "Name", "Pixel(cm)", "Pixels", "Distance(cm)", "Guides"
            );
            println!("{:-<58}", "");
            for instrument in Instrument::ALL {
                let t = instrument.table();
                println!(
                    "{:<8} {:>10.3} {:>10} {:>18} {:>8}",
                    t.name,
                    t.pixel_size_cm,
                    format!("{}x{}", t.x_pixels, t.y_pixels),
                    format!(
                        "{:.0}-{:.0}",
                        t.detector_distance_range_cm.0, t.detector_distance_range_cm.1
                    ),
                    t.max_guides
                );
                for band in t.wavelength_bands {
                    println!(
                        "         spread {:>5.1}%: {:.1} - {:.1} A",
                        band.spread_percent, band.min, band.max
                    );
                }
            }
        }
    }

    Ok(())
}
