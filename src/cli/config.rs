//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{Cli, Command};
use crate::config::{DatasetConfig, DatasetConfigBuilder};
use anyhow::{Context, Result};

/// Merge the config file, environment and CLI flags into a `DatasetConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Load the base configuration and apply command-line overrides
    pub(crate) fn from_cli(cli: &Cli) -> Result<DatasetConfig> {
        let base = DatasetConfig::load(cli.config.as_deref()).context("Failed to load config file")?;
        Self::apply(cli, base)
    }

    /// Apply command-line overrides on top of `base`
    pub(crate) fn apply(cli: &Cli, base: DatasetConfig) -> Result<DatasetConfig> {
        let mut builder = DatasetConfigBuilder::from_config(base);

        if let Some(root) = &cli.root {
            builder = builder.root(root);
        }

        match &cli.command {
            Command::Fetch(args) => {
                if let Some(url) = &args.url {
                    builder = builder.dataset_url(url);
                }
                if let Some(digest) = &args.sha256 {
                    builder = builder.expected_sha256(Some(digest.clone()));
                }
                if let Some(dir) = &args.data_dir {
                    builder = builder.data_dir(dir);
                }
            },
            Command::Tile(args) => {
                if let Some(dir) = &args.images {
                    builder = builder.images_dir(dir);
                }
                if let Some(dir) = &args.output {
                    builder = builder.to_classify_dir(dir);
                }
                if let Some(count) = args.count {
                    builder = builder.tiles_per_image(count);
                }
                if let Some(size) = &args.size {
                    let (width, height) = parse_tile_size(size)?;
                    builder = builder.tile_size(width, height);
                }
                if let Some(seed) = args.seed {
                    builder = builder.seed(seed);
                }
                if args.pattern.is_some() {
                    builder = builder.pattern(args.pattern.clone());
                }
            },
            Command::Augment(args) => {
                if let Some(dir) = &args.dir {
                    builder = builder.training_dir(dir);
                }
                if !args.angles.is_empty() {
                    builder = builder.angles(args.angles.clone());
                }
                if args.overwrite {
                    builder = builder.overwrite(true);
                }
            },
            Command::Sort(args) => {
                if let Some(dir) = &args.source {
                    builder = builder.to_classify_dir(dir);
                }
                if let Some(dir) = &args.dest {
                    builder = builder.training_dir(dir);
                }
            },
            Command::ShowConfig => {},
        }

        builder.build().context("Invalid configuration")
    }
}

/// Parse `WIDTHxHEIGHT` or a single edge length
pub(crate) fn parse_tile_size(size: &str) -> Result<(u32, u32)> {
    let lower = size.trim().to_lowercase();
    let (width, height) = match lower.split_once('x') {
        Some((w, h)) => (w.trim(), h.trim()),
        None => (lower.as_str(), lower.as_str()),
    };

    let width: u32 = width
        .parse()
        .with_context(|| format!("Invalid tile width in '{}'", size))?;
    let height: u32 = height
        .parse()
        .with_context(|| format!("Invalid tile height in '{}'", size))?;
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::augment::RotationAngle;
    use crate::cli::{AugmentArgs, SortArgs, TileArgs};
    use std::path::PathBuf;

    fn create_test_cli(command: Command) -> Cli {
        Cli {
            verbose: 0,
            compact_logs: false,
            config: None,
            root: Some(PathBuf::from("/srv/opssat")),
            no_progress: true,
            command,
        }
    }

    #[test]
    fn test_parse_tile_size() {
        assert_eq!(parse_tile_size("200x100").unwrap(), (200, 100));
        assert_eq!(parse_tile_size("64X64").unwrap(), (64, 64));
        assert_eq!(parse_tile_size("128").unwrap(), (128, 128));
        assert!(parse_tile_size("axb").is_err());
        assert!(parse_tile_size("10x").is_err());
    }

    #[test]
    fn test_tile_overrides() {
        let cli = create_test_cli(Command::Tile(TileArgs {
            output: Some(PathBuf::from("tiles")),
            count: Some(3),
            size: Some("32x16".to_string()),
            seed: Some(5),
            ..TileArgs::default()
        }));

        let config = CliConfigBuilder::apply(&cli, DatasetConfig::default()).unwrap();
        assert_eq!(config.root, PathBuf::from("/srv/opssat"));
        assert_eq!(config.to_classify_path(), PathBuf::from("/srv/opssat/tiles"));
        assert_eq!(config.tiling.tiles_per_image, 3);
        assert_eq!((config.tiling.tile_width, config.tiling.tile_height), (32, 16));
        assert_eq!(config.tiling.seed, 5);
    }

    #[test]
    fn test_augment_and_sort_overrides() {
        let cli = create_test_cli(Command::Augment(AugmentArgs {
            angles: vec![RotationAngle::Deg180],
            overwrite: true,
            ..AugmentArgs::default()
        }));
        let config = CliConfigBuilder::apply(&cli, DatasetConfig::default()).unwrap();
        assert_eq!(config.augment.angles, vec![RotationAngle::Deg180]);
        assert!(config.augment.overwrite);

        let cli = create_test_cli(Command::Sort(SortArgs {
            source: Some(PathBuf::from("/tmp/queue")),
            dest: Some(PathBuf::from("labels")),
            ..SortArgs::default()
        }));
        let config = CliConfigBuilder::apply(&cli, DatasetConfig::default()).unwrap();
        assert_eq!(config.to_classify_path(), PathBuf::from("/tmp/queue"));
        assert_eq!(config.training_path(), PathBuf::from("/srv/opssat/labels"));
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let cli = create_test_cli(Command::Tile(TileArgs {
            count: Some(0),
            ..TileArgs::default()
        }));
        assert!(CliConfigBuilder::apply(&cli, DatasetConfig::default()).is_err());
    }
}
