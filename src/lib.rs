#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # OPS-SAT dataset preparation toolkit
//!
//! Tools for turning the OPS-SAT satellite image release into a labeled tile
//! dataset:
//!
//! - **Fetch**: download the dataset zip and unpack it ([`download`])
//! - **Tile**: cut reproducible random fixed-size tiles from large images ([`tiling`])
//! - **Augment**: add rotated copies of labeled tiles ([`augment`])
//! - **Sort**: hand-label tiles into category folders with one key press each ([`sorter`])
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use opssat_tiles::{DatasetConfig, TileSampler, Augmenter};
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = DatasetConfig::builder()
//!     .root("/data/opssat")
//!     .tile_size(200, 200)
//!     .tiles_per_image(100)
//!     .seed(42)
//!     .build()?;
//!
//! let mut sampler = TileSampler::new(config.tiling.clone());
//! let report = sampler.run(&config.images_path(), &config.to_classify_path(), false)?;
//! println!("{} tiles written", report.tiles_written);
//!
//! Augmenter::new(config.augment.clone()).run(&config.training_path(), false)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): command-line interface, progress bars and tracing subscriber setup

pub mod augment;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod services;
pub mod sorter;
pub mod tiling;
#[cfg(feature = "cli")]
pub mod tracing_config;

pub use augment::{augmented_name, is_augmented, AugmentReport, Augmenter, RotationAngle};
pub use config::{AugmentConfig, DatasetConfig, DatasetConfigBuilder, TilingConfig};
pub use download::{
    extract_archive, fetch_dataset, sha256_file, verify_sha256, DatasetDownloader, FetchOptions,
    FetchReport,
};
pub use error::{DatasetError, Result};
pub use services::{ImageIOService, ProgressIndicator};
pub use sorter::{
    Category, Choice, QueuePosition, SortQueue, SortSession, SortSummary, SortView, TerminalView,
};
pub use tiling::{tile_origin, TileSampler, TilingReport};

#[cfg(feature = "cli")]
pub use tracing_config::{TracingConfig, TracingFormat};
