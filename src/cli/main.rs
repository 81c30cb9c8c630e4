//! Dataset preparation CLI
//!
//! Subcommands mirror the preparation steps: `fetch`, `tile`, `augment`, `sort`.

use super::config::CliConfigBuilder;
use crate::{
    augment::{Augmenter, RotationAngle},
    config::DatasetConfig,
    download::{fetch_dataset, FetchOptions},
    sorter::{terminal::DEFAULT_PREVIEW_WIDTH, SortQueue, SortSession, TerminalView},
    tiling::TileSampler,
    tracing_config::{spans, TracingConfig, TracingFormat},
};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, Instrument};

/// OPS-SAT dataset preparation toolkit
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "opssat-tiles")]
pub struct Cli {
    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Plain, uncolored log output
    #[arg(long, global = true)]
    pub compact_logs: bool,

    /// JSON config file [default: $OPSSAT_TILES_CONFIG or the per-user config]
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Project directory that relative paths resolve against
    #[arg(long, value_name = "DIR", global = true)]
    pub root: Option<PathBuf>,

    /// Hide progress bars
    #[arg(long, global = true)]
    pub no_progress: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download and unpack the dataset archive
    Fetch(FetchArgs),
    /// Cut random fixed-size tiles out of the source images
    Tile(TileArgs),
    /// Add rotated copies of every labeled tile
    Augment(AugmentArgs),
    /// Sort unlabeled tiles into category folders by keyboard
    Sort(SortArgs),
    /// Print the resolved configuration as JSON
    ShowConfig,
}

#[derive(Args, Debug, Default)]
pub struct FetchArgs {
    /// Archive URL
    #[arg(long)]
    pub url: Option<String>,

    /// Expected SHA-256 of the archive (hex)
    #[arg(long, value_name = "HEX")]
    pub sha256: Option<String>,

    /// Download even if the archive is already present
    #[arg(long)]
    pub force: bool,

    /// Data directory
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub struct TileArgs {
    /// Directory with the large source images
    #[arg(long, value_name = "DIR")]
    pub images: Option<PathBuf>,

    /// Directory the tiles are written to
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Tiles per source image
    #[arg(short = 'n', long)]
    pub count: Option<u32>,

    /// Tile size as WIDTHxHEIGHT or a single edge length
    #[arg(long, value_name = "SIZE")]
    pub size: Option<String>,

    /// RNG seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Only tile source files whose name matches this glob (e.g. "*.png")
    #[arg(long)]
    pub pattern: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct AugmentArgs {
    /// Training directory with one subdirectory per category
    #[arg(long, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Rotations to apply (counter-clockwise degrees)
    #[arg(long, value_delimiter = ',', value_name = "DEG")]
    pub angles: Vec<RotationAngle>,

    /// Replace rotated copies that already exist
    #[arg(long)]
    pub overwrite: bool,
}

#[derive(Args, Debug, Default)]
pub struct SortArgs {
    /// Directory with the unlabeled tiles
    #[arg(long, value_name = "DIR")]
    pub source: Option<PathBuf>,

    /// Training directory that receives the category folders
    #[arg(long, value_name = "DIR")]
    pub dest: Option<PathBuf>,

    /// Width of the tile preview in terminal columns
    #[arg(long, value_name = "COLS", default_value_t = DEFAULT_PREVIEW_WIDTH)]
    pub preview_width: u32,

    /// Print only the tile path and size
    #[arg(long)]
    pub no_preview: bool,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli).context("Failed to initialize tracing")?;

    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;
    let show_progress = !cli.no_progress;

    let command_name = match &cli.command {
        Command::Fetch(_) => "fetch",
        Command::Tile(_) => "tile",
        Command::Augment(_) => "augment",
        Command::Sort(_) => "sort",
        Command::ShowConfig => "show-config",
    };
    let span = spans::command(command_name, &config.root);

    let start_time = Instant::now();
    async {
        match &cli.command {
            Command::Fetch(args) => run_fetch(&config, args, show_progress).await,
            Command::Tile(_) => run_tile(&config, show_progress),
            Command::Augment(_) => run_augment(&config, show_progress),
            Command::Sort(args) => run_sort(&config, args),
            Command::ShowConfig => show_config(&config),
        }
    }
    .instrument(span)
    .await?;

    info!(
        "Finished {} in {:.2}s",
        command_name,
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Initialize tracing based on verbosity level
fn init_tracing(cli: &Cli) -> Result<()> {
    let format = if cli.compact_logs {
        TracingFormat::Compact
    } else {
        TracingFormat::Console
    };

    TracingConfig::new()
        .with_verbosity(cli.verbose)
        .with_format(format)
        .with_env_override()
        .init()
        .context("Failed to initialize tracing subscriber")
}

async fn run_fetch(config: &DatasetConfig, args: &FetchArgs, show_progress: bool) -> Result<()> {
    println!("Assuming {} as project directory", config.root.display());

    let options = FetchOptions {
        force: args.force,
        show_progress,
    };
    let report = fetch_dataset(config, options)
        .await
        .with_context(|| format!("Failed to fetch dataset from {}", config.dataset_url))?;

    if report.reused_archive {
        println!("Reused existing archive {}", report.archive.display());
    } else {
        println!(
            "Downloaded {} to {}",
            format_size(report.bytes_downloaded),
            report.archive.display()
        );
    }
    println!(
        "Extracted {} file(s) into {}",
        report.extracted_files.len(),
        config.data_path().display()
    );
    Ok(())
}

fn run_tile(config: &DatasetConfig, show_progress: bool) -> Result<()> {
    let images = config.images_path();
    let output = config.to_classify_path();

    let mut sampler = TileSampler::new(config.tiling.clone());
    let report = sampler
        .run(&images, &output, show_progress)
        .with_context(|| format!("Failed to tile images in {}", images.display()))?;

    println!(
        "Wrote {} tile(s) from {} image(s) to {}",
        report.tiles_written,
        report.images_processed,
        output.display()
    );
    if report.images_skipped > 0 {
        println!("Skipped {} image(s); run with -v for details", report.images_skipped);
    }
    Ok(())
}

fn run_augment(config: &DatasetConfig, show_progress: bool) -> Result<()> {
    let training = config.training_path();
    let report = Augmenter::new(config.augment.clone())
        .run(&training, show_progress)
        .with_context(|| format!("Failed to augment {}", training.display()))?;

    println!(
        "Rotated {} tile(s) in {} categories: {} written, {} already present",
        report.sources, report.categories, report.written, report.existing
    );
    if report.failed > 0 {
        println!("{} tile(s) failed; run with -v for details", report.failed);
    }
    Ok(())
}

fn run_sort(config: &DatasetConfig, args: &SortArgs) -> Result<()> {
    let source = config.to_classify_path();
    let dest = config.training_path();

    let queue = SortQueue::new(&source, &dest)
        .with_context(|| format!("Failed to read tiles from {}", source.display()))?;
    if queue.is_empty() {
        println!("Nothing to classify in {}", source.display());
        return Ok(());
    }

    let preview = (!args.no_preview).then_some(args.preview_width);
    let view = TerminalView::stdio().with_preview(preview);
    let summary = SortSession::new(queue, view)
        .run()
        .context("Sorting session failed")?;
    info!(
        sorted = summary.sorted(),
        skipped = summary.skipped,
        remaining = summary.remaining,
        failed_moves = summary.failed_moves,
        "Sorting summary"
    );
    Ok(())
}

fn show_config(config: &DatasetConfig) -> Result<()> {
    let json = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
    println!("{}", json);
    if let Some(path) = DatasetConfig::user_config_path() {
        println!("\nPer-user config file: {}", path.display());
    }
    Ok(())
}

/// Human-readable byte count
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS.get(unit_index).unwrap_or(&"B"))
    } else {
        format!("{:.1} {}", size, UNITS.get(unit_index).unwrap_or(&"B"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(1024 * 1024), "1.0 MB");
    }

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::try_parse_from([
            "opssat-tiles",
            "-vv",
            "tile",
            "--count",
            "5",
            "--size",
            "64x32",
            "--seed",
            "9",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Tile(args) => {
                assert_eq!(args.count, Some(5));
                assert_eq!(args.size.as_deref(), Some("64x32"));
                assert_eq!(args.seed, Some(9));
            },
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::try_parse_from(["opssat-tiles", "augment", "--angles", "90,270"]).unwrap();
        match cli.command {
            Command::Augment(args) => {
                assert_eq!(args.angles, vec![RotationAngle::Deg90, RotationAngle::Deg270]);
            },
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::try_parse_from(["opssat-tiles", "sort"]).unwrap();
        match cli.command {
            Command::Sort(args) => {
                assert_eq!(args.preview_width, DEFAULT_PREVIEW_WIDTH);
                assert!(!args.no_preview);
            },
            other => panic!("unexpected command: {other:?}"),
        }

        assert!(Cli::try_parse_from(["opssat-tiles", "augment", "--angles", "45"]).is_err());
        assert!(Cli::try_parse_from(["opssat-tiles"]).is_err());
    }
}
