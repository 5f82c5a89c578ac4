use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Result, bail};
use seedscan::fixtures::{SyntheticSample, SyntheticSeed};
use seedscan::{AnalysisService, Backpressure, SeedProperties, SeedScanError};
use seedscan_cli::{AnalysisReport, BatchOverrides, CliError, ErrorReport, ImageOutcome, SeedScanConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Measure the seeds in one photograph
    Analyze {
        /// Photograph of seeds on millimetre grid paper
        #[arg(short, long)]
        image: PathBuf,
        /// TOML or JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Also write fitted ellipses as GeoJSON
        #[arg(long)]
        geojson: Option<PathBuf>,
        /// Write the JSON report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Measure many photographs on a bounded worker pool
    Batch {
        /// Photographs to analyze
        #[arg(required = true)]
        images: Vec<PathBuf>,
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Concurrent analyses (overrides the config file)
        #[arg(long)]
        workers: Option<usize>,
        /// Submissions allowed to wait for a worker (overrides the config file)
        #[arg(long)]
        queue_depth: Option<usize>,
        /// Queue policy when every slot is taken (overrides the config file;
        /// `wait` when neither sets it)
        #[arg(long)]
        backpressure: Option<Backpressure>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Render a synthetic grid-paper photograph with known seed sizes
    Fixture {
        /// Image path (PNG or JPEG)
        #[arg(short, long)]
        output: PathBuf,
        /// Grid spacing in pixels per millimetre
        #[arg(long, default_value = "20.0")]
        pixels_per_mm: f64,
        #[arg(long, default_value = "800")]
        width: u32,
        #[arg(long, default_value = "600")]
        height: u32,
        /// Write the seed geometry as JSON next to the image
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
    /// Print a JSON schema
    Schema {
        #[arg(value_enum, default_value = "config")]
        kind: SchemaKind,
    },
    /// Write a configuration file filled with defaults
    InitConfig {
        /// Destination, .toml or .json
        #[arg(short, long)]
        output: PathBuf,
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SchemaKind {
    Config,
    Report,
    Error,
    Seed,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze { image, config, geojson, output } => {
            let config = load_config(config.as_deref())?;
            let outcome = analyze_image(&image, &config, geojson.as_deref()).await;
            let success = outcome.is_success();
            write_json(&outcome, output.as_deref())?;
            if !success {
                std::process::exit(1);
            }
        }
        Commands::Batch {
            images,
            config,
            workers,
            queue_depth,
            backpressure,
            output,
        } => {
            let mut loaded = load_config(config.as_deref())?;
            let file_backpressure = match config.as_deref() {
                Some(path) => SeedScanConfig::backpressure_in_file(path)?,
                None => None,
            };
            BatchOverrides { workers, queue_depth, backpressure }.apply(&mut loaded, file_backpressure);
            info!("Batch backpressure: {}", loaded.service.backpressure);

            let outcomes = analyze_batch(images, &loaded).await?;
            write_json(&outcomes, output.as_deref())?;
        }
        Commands::Fixture {
            output,
            pixels_per_mm,
            width,
            height,
            manifest,
        } => {
            write_fixture(&output, pixels_per_mm, width, height, manifest.as_deref())?;
        }
        Commands::Schema { kind } => {
            let schema = match kind {
                SchemaKind::Config => schemars::schema_for!(SeedScanConfig),
                SchemaKind::Report => schemars::schema_for!(AnalysisReport),
                SchemaKind::Error => schemars::schema_for!(ErrorReport),
                SchemaKind::Seed => schemars::schema_for!(SeedProperties),
            };
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
        Commands::InitConfig { output, force } => {
            if output.exists() && !force {
                bail!("{} already exists, pass --force to replace it", output.display());
            }
            SeedScanConfig::default().to_file(&output)?;
            info!("Wrote default configuration to {}", output.display());
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<SeedScanConfig, CliError> {
    match path {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            SeedScanConfig::from_file(path)
        }
        None => Ok(SeedScanConfig::default()),
    }
}

fn write_json<T: serde::Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            info!("Report written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

async fn analyze_image(image: &Path, config: &SeedScanConfig, geojson: Option<&Path>) -> ImageOutcome {
    let service = match AnalysisService::from_config(&config.analysis, &config.service) {
        Ok(service) => service,
        Err(e) => return ImageOutcome::Failed(ErrorReport::new(Some(image), &CliError::from(e))),
    };

    let result = match load_image(image, config).await {
        Ok(decoded) => service.submit(decoded).await.map_err(CliError::from),
        Err(e) => Err(e),
    };
    let result = result.and_then(|result| {
        if let Some(path) = geojson {
            result.save_geojson(path)?;
            info!("GeoJSON written to {}", path.display());
        }
        Ok(result)
    });

    match &result {
        Ok(r) => info!(
            "{}: {} seeds at {:.2} px/mm",
            image.display(),
            r.seeds.len(),
            r.calibration.pixels_per_mm
        ),
        Err(e) => error!("{}: {}", image.display(), e),
    }
    ImageOutcome::from_result(image, result)
}

async fn load_image(path: &Path, config: &SeedScanConfig) -> Result<image::DynamicImage, CliError> {
    let limits = config.input.clone();
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || limits.load_image(path))
        .await
        .map_err(|e| CliError::from(SeedScanError::WorkerFailed(e.to_string())))?
}

async fn analyze_batch(images: Vec<PathBuf>, config: &SeedScanConfig) -> Result<Vec<ImageOutcome>> {
    let service = Arc::new(AnalysisService::from_config(&config.analysis, &config.service)?);
    info!(
        "Analyzing {} images with {} workers (capacity {})",
        images.len(),
        config.service.workers,
        service.capacity()
    );

    let mut tasks = JoinSet::new();
    for (index, path) in images.into_iter().enumerate() {
        let service = Arc::clone(&service);
        let config = config.clone();
        tasks.spawn(async move {
            let result = match load_image(&path, &config).await {
                Ok(decoded) => service.submit(decoded).await.map_err(CliError::from),
                Err(e) => Err(e),
            };
            if let Err(e) = &result {
                warn!("{}: {}", path.display(), e);
            }
            (index, ImageOutcome::from_result(&path, result))
        });
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        outcomes.push(joined?);
    }
    outcomes.sort_by_key(|(index, _)| *index);

    let failed = outcomes.iter().filter(|(_, o)| !o.is_success()).count();
    if failed > 0 {
        warn!("{} of {} images failed", failed, outcomes.len());
    } else {
        info!("All {} images analyzed", outcomes.len());
    }
    Ok(outcomes.into_iter().map(|(_, outcome)| outcome).collect())
}

/// Seed sizes in millimetres: semi-major, semi-minor, angle in degrees
const FIXTURE_SEEDS: [(f64, f64, f64); 6] = [
    (1.5, 1.5, 0.0),
    (2.0, 1.4, 30.0),
    (2.5, 1.0, -45.0),
    (1.8, 1.2, 90.0),
    (2.2, 1.6, 10.0),
    (1.2, 1.1, 0.0),
];

fn write_fixture(output: &Path, pixels_per_mm: f64, width: u32, height: u32, manifest: Option<&Path>) -> Result<()> {
    if !(pixels_per_mm >= 4.0) {
        bail!("pixels_per_mm must be at least 4 to draw a detectable grid");
    }

    let mut sample = SyntheticSample::new(width, height, pixels_per_mm);
    for (i, &(major, minor, angle)) in FIXTURE_SEEDS.iter().enumerate() {
        let (col, row) = (i % 3, i / 3);
        let cx = width as f64 * (col as f64 + 1.0) / 4.0;
        let cy = height as f64 * (row as f64 + 1.0) / 3.0;
        sample = sample.with_seed(SyntheticSeed::ellipse(
            cx,
            cy,
            major * pixels_per_mm,
            minor * pixels_per_mm,
            angle,
        ));
    }

    sample.render().save(output)?;
    info!(
        "Wrote {}x{} fixture with {} seeds to {}",
        width,
        height,
        sample.seeds.len(),
        output.display()
    );

    if let Some(path) = manifest {
        std::fs::write(path, serde_json::to_string_pretty(&sample)?)?;
        info!("Fixture geometry written to {}", path.display());
    }
    Ok(())
}
