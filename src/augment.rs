//! Rotation augmentation of labeled tiles
//!
//! The training directory holds one subdirectory per category. Every PNG tile in
//! a category gets rotated copies written next to it as `<stem>_<angle>.png`.

use crate::config::AugmentConfig;
use crate::error::{DatasetError, Result};
use crate::services::{ImageIOService, ProgressIndicator};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Counter-clockwise rotation applied to a tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum RotationAngle {
    Deg90,
    Deg180,
    Deg270,
}

impl RotationAngle {
    pub const ALL: [RotationAngle; 3] = [Self::Deg90, Self::Deg180, Self::Deg270];

    #[must_use]
    pub fn degrees(self) -> u16 {
        match self {
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    /// File name suffix, e.g. `_90`
    #[must_use]
    pub fn suffix(self) -> String {
        format!("_{}", self.degrees())
    }

    /// Rotate counter-clockwise; 90 and 270 swap width and height
    #[must_use]
    pub fn rotate(self, image: &DynamicImage) -> DynamicImage {
        // image's rotate90 turns clockwise
        match self {
            Self::Deg90 => image.rotate270(),
            Self::Deg180 => image.rotate180(),
            Self::Deg270 => image.rotate90(),
        }
    }
}

impl fmt::Display for RotationAngle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.degrees())
    }
}

impl TryFrom<u16> for RotationAngle {
    type Error = String;

    fn try_from(degrees: u16) -> std::result::Result<Self, Self::Error> {
        match degrees {
            90 => Ok(Self::Deg90),
            180 => Ok(Self::Deg180),
            270 => Ok(Self::Deg270),
            other => Err(format!(
                "unsupported rotation angle {}, expected 90, 180 or 270",
                other
            )),
        }
    }
}

impl From<RotationAngle> for u16 {
    fn from(angle: RotationAngle) -> Self {
        angle.degrees()
    }
}

impl std::str::FromStr for RotationAngle {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self> {
        let degrees: u16 = s
            .trim()
            .parse()
            .map_err(|_| DatasetError::invalid_config(format!("Invalid rotation angle: {}", s)))?;
        Self::try_from(degrees).map_err(DatasetError::invalid_config)
    }
}

/// Output name for a rotated copy of `file`
#[must_use]
pub fn augmented_name(file: &Path, angle: RotationAngle) -> PathBuf {
    let stem = file.file_stem().unwrap_or_default().to_string_lossy();
    file.with_file_name(format!("{}{}.png", stem, angle.suffix()))
}

/// True when `file` is itself a rotated copy
#[must_use]
pub fn is_augmented(file: &Path) -> bool {
    let stem = file.file_stem().unwrap_or_default().to_string_lossy();
    RotationAngle::ALL
        .iter()
        .any(|angle| stem.ends_with(&angle.suffix()))
}

/// Counters from one augmentation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AugmentReport {
    /// Category directories visited
    pub categories: usize,
    /// Original tiles rotated
    pub sources: usize,
    /// Rotated copies written
    pub written: usize,
    /// Rotated copies left untouched because they already existed
    pub existing: usize,
    /// Tiles that could not be read or written
    pub failed: usize,
}

/// Writes rotated copies of labeled tiles
#[derive(Debug, Clone)]
pub struct Augmenter {
    config: AugmentConfig,
}

impl Augmenter {
    #[must_use]
    pub fn new(config: AugmentConfig) -> Self {
        Self { config }
    }

    /// Original (non-rotated) PNG tiles, grouped by category directory
    pub fn collect_sources(training_dir: &Path) -> Result<Vec<(PathBuf, Vec<PathBuf>)>> {
        if !training_dir.is_dir() {
            return Err(DatasetError::file_io_error(
                "read training directory",
                training_dir,
                &std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            ));
        }

        let mut categories: Vec<PathBuf> = WalkDir::new(training_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_type().is_dir())
            .map(walkdir::DirEntry::into_path)
            .collect();
        categories.sort();

        let mut grouped = Vec::with_capacity(categories.len());
        for category in categories {
            let mut tiles: Vec<PathBuf> = WalkDir::new(&category)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(std::result::Result::ok)
                .filter(|e| e.file_type().is_file())
                .map(walkdir::DirEntry::into_path)
                .filter(|p| ImageIOService::is_png(p) && !is_augmented(p))
                .collect();
            tiles.sort();
            grouped.push((category, tiles));
        }

        Ok(grouped)
    }

    /// Rotate every original tile in every category of `training_dir`
    pub fn run(&self, training_dir: &Path, show_progress: bool) -> Result<AugmentReport> {
        let grouped = Self::collect_sources(training_dir)?;
        let total: usize = grouped.iter().map(|(_, tiles)| tiles.len()).sum();

        tracing::info!(
            training_dir = %training_dir.display(),
            categories = grouped.len(),
            tiles = total,
            "Augmenting labeled tiles"
        );

        let progress = ProgressIndicator::batch(show_progress, total as u64, "rotating");
        let mut report = AugmentReport {
            categories: grouped.len(),
            ..AugmentReport::default()
        };

        for (category, tiles) in &grouped {
            tracing::debug!(category = %category.display(), tiles = tiles.len(), "Category");
            for tile in tiles {
                match self.augment_tile(tile) {
                    Ok((written, existing)) => {
                        report.sources += 1;
                        report.written += written;
                        report.existing += existing;
                    },
                    Err(e) => {
                        tracing::warn!(tile = %tile.display(), error = %e, "Skipping tile");
                        report.failed += 1;
                    },
                }
                progress.inc(1);
            }
        }

        progress.finish_with_message(format!("{} rotated copies", report.written));
        tracing::info!(
            written = report.written,
            existing = report.existing,
            failed = report.failed,
            "Augmentation finished"
        );
        Ok(report)
    }

    /// Write all configured rotations of one tile; returns (written, existing)
    pub fn augment_tile(&self, tile: &Path) -> Result<(usize, usize)> {
        let pending: Vec<(RotationAngle, PathBuf)> = self
            .config
            .angles
            .iter()
            .map(|&angle| (angle, augmented_name(tile, angle)))
            .collect();

        let existing = pending.iter().filter(|(_, out)| out.exists()).count();
        if !self.config.overwrite && existing == pending.len() {
            return Ok((0, existing));
        }

        let image = ImageIOService::load_image(tile)?;
        let mut written = 0;
        let mut kept = 0;
        for (angle, out) in pending {
            if out.exists() && !self.config.overwrite {
                kept += 1;
                continue;
            }
            ImageIOService::save_png(&angle.rotate(&image), &out)?;
            written += 1;
        }

        Ok((written, kept))
    }
}
