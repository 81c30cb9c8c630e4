//! Image I/O operations service
//!
//! Keeps file access out of the tiling, augmentation and sorting logic.

use crate::error::{DatasetError, Result};
use image::{DynamicImage, ImageFormat};
use std::path::{Path, PathBuf};

/// Extensions the enabled image decoders can read
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff"];

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Load an image from a file path
    ///
    /// Falls back to content-based format detection when the extension is wrong
    /// or missing.
    ///
    /// # Examples
    /// ```rust,no_run
    /// use opssat_tiles::services::ImageIOService;
    ///
    /// let image = ImageIOService::load_image("images/pass_001.png")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(DatasetError::file_io_error(
                "read image file",
                path_ref,
                &std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
            ));
        }

        match image::open(path_ref) {
            Ok(img) => Ok(img),
            Err(e) => {
                tracing::debug!(
                    path = %path_ref.display(),
                    error = %e,
                    "Extension-based loading failed, trying content-based detection"
                );

                let data = std::fs::read(path_ref)
                    .map_err(|io_err| DatasetError::file_io_error("read image data", path_ref, &io_err))?;

                Ok(image::load_from_memory(&data)?)
            },
        }
    }

    /// Save an image as PNG, creating the parent directory if needed
    pub fn save_png<P: AsRef<Path>>(image: &DynamicImage, path: P) -> Result<()> {
        let path_ref = path.as_ref();

        if let Some(parent) = path_ref.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DatasetError::file_io_error("create output directory", parent, &e))?;
        }

        image.save_with_format(path_ref, ImageFormat::Png)?;
        Ok(())
    }

    /// Check if a file path has a supported image extension
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
    }

    /// Check if a file path has a `.png` extension (case-insensitive)
    pub fn is_png<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
    }

    /// List image files directly inside `dir`, sorted by path
    ///
    /// Subdirectories are not descended into. When `pattern` is given, only file
    /// names matching the glob are returned.
    pub fn list_images(dir: &Path, pattern: Option<&str>) -> Result<Vec<PathBuf>> {
        let matcher = pattern
            .map(|pat| {
                glob::Pattern::new(pat).map_err(|e| {
                    DatasetError::invalid_config(format!("Invalid file pattern '{}': {}", pat, e))
                })
            })
            .transpose()?;

        let entries = std::fs::read_dir(dir)
            .map_err(|e| DatasetError::file_io_error("list directory", dir, &e))?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DatasetError::file_io_error("list directory", dir, &e))?;
            let path = entry.path();
            if !path.is_file() || !Self::is_supported_format(&path) {
                continue;
            }
            let name_matches = match (&matcher, path.file_name().and_then(|n| n.to_str())) {
                (Some(m), Some(name)) => m.matches(name),
                (Some(_), None) => false,
                (None, _) => true,
            };
            if name_matches {
                files.push(path);
            }
        }

        // Sort for a deterministic processing order
        files.sort();
        Ok(files)
    }
}
