//! Configuration types for dataset preparation
//!
//! All directories are stored relative to [`DatasetConfig::root`] unless they are
//! absolute, so one config file describes the whole project layout.

use crate::augment::RotationAngle;
use crate::error::{DatasetError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "OPSSAT_TILES_CONFIG";

/// Environment variable overriding the project root
pub const ROOT_ENV: &str = "OPSSAT_TILES_ROOT";

const DEFAULT_DATASET_URL: &str = "https://zenodo.org/record/6524750/files/ops_sat.zip?download=1";

/// Random tile sampling settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TilingConfig {
    /// Tile width in pixels
    pub tile_width: u32,
    /// Tile height in pixels
    pub tile_height: u32,
    /// Number of tiles cut from every source image
    pub tiles_per_image: u32,
    /// RNG seed for the whole run
    pub seed: u64,
    /// Optional glob applied to source file names (e.g. `"*.png"`)
    pub pattern: Option<String>,
}

impl Default for TilingConfig {
    fn default() -> Self {
        Self {
            tile_width: 200,
            tile_height: 200,
            tiles_per_image: 100,
            seed: 42,
            pattern: None,
        }
    }
}

/// Rotation augmentation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentConfig {
    /// Rotations applied to every labeled tile
    pub angles: Vec<RotationAngle>,
    /// Replace rotated copies that already exist
    pub overwrite: bool,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            angles: RotationAngle::ALL.to_vec(),
            overwrite: false,
        }
    }
}

/// Project layout and processing settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Project directory that relative paths resolve against
    pub root: PathBuf,
    /// Where the archive is downloaded and unpacked
    pub data_dir: PathBuf,
    /// Dataset archive URL
    pub dataset_url: String,
    /// File name of the archive inside `data_dir`
    pub archive_name: String,
    /// Optional hex SHA-256 of the archive
    pub expected_sha256: Option<String>,
    /// Large source images to cut tiles from
    pub images_dir: PathBuf,
    /// Unlabeled tiles waiting to be sorted
    pub to_classify_dir: PathBuf,
    /// Labeled tiles, one subdirectory per category
    pub training_dir: PathBuf,
    /// HTTP timeout in seconds
    pub timeout_secs: u64,
    pub tiling: TilingConfig,
    pub augment: AugmentConfig,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            data_dir: PathBuf::from("ops_sat_competiton_official"),
            dataset_url: DEFAULT_DATASET_URL.to_string(),
            archive_name: "downloadedZip.zip".to_string(),
            expected_sha256: None,
            images_dir: PathBuf::from("images"),
            to_classify_dir: PathBuf::from("to_classify"),
            training_dir: PathBuf::from("ops_sat_competiton_official_training"),
            timeout_secs: 300,
            tiling: TilingConfig::default(),
            augment: AugmentConfig::default(),
        }
    }
}

impl DatasetConfig {
    /// Create a builder for `DatasetConfig`
    #[must_use]
    pub fn builder() -> DatasetConfigBuilder {
        DatasetConfigBuilder::default()
    }

    /// Read a JSON config file; missing fields take their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| DatasetError::file_io_error("read config file", path, &e))?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the first available source
    ///
    /// Order: `explicit` file, the file named by `OPSSAT_TILES_CONFIG`, the
    /// per-user `opssat-tiles/config.json`, built-in defaults. `OPSSAT_TILES_ROOT`
    /// overrides the root afterwards.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = explicit {
            Self::from_file(path)?
        } else if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            Self::from_file(env_path)?
        } else {
            match Self::user_config_path() {
                Some(path) if path.is_file() => {
                    tracing::debug!(path = %path.display(), "Using per-user config file");
                    Self::from_file(path)?
                },
                _ => Self::default(),
            }
        };

        if let Ok(root) = std::env::var(ROOT_ENV) {
            config.root = PathBuf::from(root);
        }

        Ok(config)
    }

    /// Location of the per-user config file, if the platform has a config dir
    #[must_use]
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("opssat-tiles").join("config.json"))
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Zero tile dimensions or tile count
    /// - Empty rotation list
    /// - Non-HTTP dataset URL
    /// - Malformed SHA-256 digest
    /// - Zero timeout
    pub fn validate(&self) -> Result<()> {
        if self.tiling.tile_width == 0 {
            return Err(DatasetError::config_value_error(
                "tile width",
                self.tiling.tile_width,
                "1-4294967295",
                Some(200),
            ));
        }

        if self.tiling.tile_height == 0 {
            return Err(DatasetError::config_value_error(
                "tile height",
                self.tiling.tile_height,
                "1-4294967295",
                Some(200),
            ));
        }

        if self.tiling.tiles_per_image == 0 {
            return Err(DatasetError::config_value_error(
                "tiles per image",
                self.tiling.tiles_per_image,
                "1-4294967295",
                Some(100),
            ));
        }

        if let Some(pattern) = &self.tiling.pattern {
            glob::Pattern::new(pattern).map_err(|e| {
                DatasetError::invalid_config(format!("Invalid file pattern '{}': {}", pattern, e))
            })?;
        }

        if self.augment.angles.is_empty() {
            return Err(DatasetError::invalid_config(
                "At least one rotation angle is required",
            ));
        }

        if !(self.dataset_url.starts_with("http://") || self.dataset_url.starts_with("https://")) {
            return Err(DatasetError::invalid_config(format!(
                "Dataset URL must use http or https: {}",
                self.dataset_url
            )));
        }

        if let Some(digest) = &self.expected_sha256 {
            if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(DatasetError::invalid_config(format!(
                    "Expected SHA-256 must be 64 hex characters, got '{}'",
                    digest
                )));
            }
        }

        if self.timeout_secs == 0 {
            return Err(DatasetError::config_value_error(
                "timeout",
                self.timeout_secs,
                "1-18446744073709551615 seconds",
                Some(300),
            ));
        }

        Ok(())
    }

    /// Resolve a possibly relative path against the project root
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    #[must_use]
    pub fn data_path(&self) -> PathBuf {
        self.resolve(&self.data_dir)
    }

    #[must_use]
    pub fn archive_path(&self) -> PathBuf {
        self.data_path().join(&self.archive_name)
    }

    #[must_use]
    pub fn images_path(&self) -> PathBuf {
        self.resolve(&self.images_dir)
    }

    #[must_use]
    pub fn to_classify_path(&self) -> PathBuf {
        self.resolve(&self.to_classify_dir)
    }

    #[must_use]
    pub fn training_path(&self) -> PathBuf {
        self.resolve(&self.training_dir)
    }
}

/// Builder for `DatasetConfig`
#[derive(Debug, Default)]
pub struct DatasetConfigBuilder {
    config: DatasetConfig,
}

impl DatasetConfigBuilder {
    /// Start from an existing configuration instead of the defaults
    #[must_use]
    pub fn from_config(config: DatasetConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.config.root = root.into();
        self
    }

    #[must_use]
    pub fn data_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    #[must_use]
    pub fn dataset_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.dataset_url = url.into();
        self
    }

    #[must_use]
    pub fn expected_sha256(mut self, digest: Option<String>) -> Self {
        self.config.expected_sha256 = digest.map(|d| d.to_lowercase());
        self
    }

    #[must_use]
    pub fn images_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.images_dir = dir.into();
        self
    }

    #[must_use]
    pub fn to_classify_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.to_classify_dir = dir.into();
        self
    }

    #[must_use]
    pub fn training_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.training_dir = dir.into();
        self
    }

    #[must_use]
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    /// Set tile dimensions in pixels
    #[must_use]
    pub fn tile_size(mut self, width: u32, height: u32) -> Self {
        self.config.tiling.tile_width = width;
        self.config.tiling.tile_height = height;
        self
    }

    #[must_use]
    pub fn tiles_per_image(mut self, count: u32) -> Self {
        self.config.tiling.tiles_per_image = count;
        self
    }

    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.tiling.seed = seed;
        self
    }

    #[must_use]
    pub fn pattern(mut self, pattern: Option<String>) -> Self {
        self.config.tiling.pattern = pattern;
        self
    }

    #[must_use]
    pub fn angles(mut self, angles: Vec<RotationAngle>) -> Self {
        self.config.augment.angles = angles;
        self
    }

    #[must_use]
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.config.augment.overwrite = overwrite;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<DatasetConfig> {
        let config = self.config;
        config.validate()?;
        Ok(config)
    }
}
