//! Random fixed-size tile sampling from large source images
//!
//! Tile origins are drawn uniformly over the image extent and then clamped so the
//! tile stays inside the image. Tiles therefore cluster slightly at the right and
//! bottom edges, which matches how the existing dataset was produced.

use crate::config::TilingConfig;
use crate::error::{DatasetError, Result};
use crate::services::{ImageIOService, ProgressIndicator};
use image::DynamicImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Origin along one axis for a tile of size `tile` in an image of size `extent`
///
/// `u` is a uniform sample from `[0, 1)`. Returns `None` when the tile does not
/// fit.
#[must_use]
pub fn tile_origin(u: f64, extent: u32, tile: u32) -> Option<u32> {
    if tile > extent {
        return None;
    }
    let max_origin = extent - tile;
    let raw = (u.clamp(0.0, 1.0) * f64::from(extent)).floor() as u32;
    Some(raw.min(max_origin))
}

/// Counters from one tiling run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TilingReport {
    /// Source images that produced tiles
    pub images_processed: usize,
    /// Source images that were unreadable or too small
    pub images_skipped: usize,
    /// Tiles written to the output directory
    pub tiles_written: usize,
}

/// Cuts random tiles out of source images
#[derive(Debug)]
pub struct TileSampler {
    config: TilingConfig,
    rng: StdRng,
}

impl TileSampler {
    /// Create a sampler; the RNG is seeded once for the whole run
    #[must_use]
    pub fn new(config: TilingConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self { config, rng }
    }

    #[must_use]
    pub fn config(&self) -> &TilingConfig {
        &self.config
    }

    /// Draw the next tile origin inside an image of the given size
    pub fn next_origin(&mut self, width: u32, height: u32) -> Option<(u32, u32)> {
        let u_x: f64 = self.rng.gen();
        let u_y: f64 = self.rng.gen();
        let x = tile_origin(u_x, width, self.config.tile_width)?;
        let y = tile_origin(u_y, height, self.config.tile_height)?;
        Some((x, y))
    }

    /// Cut `tiles_per_image` random tiles from one image
    ///
    /// # Errors
    /// - `ImageTooSmall` when the image cannot hold a single tile
    pub fn sample_image(&mut self, image: &DynamicImage, source: &Path) -> Result<Vec<DynamicImage>> {
        let (width, height) = (image.width(), image.height());
        let (tile_width, tile_height) = (self.config.tile_width, self.config.tile_height);

        if tile_width > width || tile_height > height {
            return Err(DatasetError::ImageTooSmall {
                path: source.to_path_buf(),
                width,
                height,
                tile_width,
                tile_height,
            });
        }

        let mut tiles = Vec::with_capacity(self.config.tiles_per_image as usize);
        for _ in 0..self.config.tiles_per_image {
            let (x, y) = self
                .next_origin(width, height)
                .ok_or_else(|| DatasetError::invalid_state("tile origin outside image"))?;
            tiles.push(image.crop_imm(x, y, tile_width, tile_height));
        }
        Ok(tiles)
    }

    /// Tile every image in `images_dir` into `output_dir`
    ///
    /// Each tile is written as `<uuid-v4>.png`. Unreadable or too-small images are
    /// logged and counted, not fatal.
    pub fn run(
        &mut self,
        images_dir: &Path,
        output_dir: &Path,
        show_progress: bool,
    ) -> Result<TilingReport> {
        let sources = ImageIOService::list_images(images_dir, self.config.pattern.as_deref())?;

        std::fs::create_dir_all(output_dir)
            .map_err(|e| DatasetError::file_io_error("create output directory", output_dir, &e))?;

        tracing::info!(
            images_dir = %images_dir.display(),
            output_dir = %output_dir.display(),
            images = sources.len(),
            tiles_per_image = self.config.tiles_per_image,
            seed = self.config.seed,
            "Tiling source images"
        );

        let progress = ProgressIndicator::batch(show_progress, sources.len() as u64, "tiling");
        let mut report = TilingReport::default();

        for source in &sources {
            progress.set_message(format!("{}", source.display()));
            match self.tile_one(source, output_dir) {
                Ok(written) => {
                    report.images_processed += 1;
                    report.tiles_written += written.len();
                },
                Err(e) => {
                    tracing::warn!(image = %source.display(), error = %e, "Skipping image");
                    report.images_skipped += 1;
                },
            }
            progress.inc(1);
        }

        progress.finish_with_message(format!("{} tiles written", report.tiles_written));
        tracing::info!(
            processed = report.images_processed,
            skipped = report.images_skipped,
            tiles = report.tiles_written,
            "Tiling finished"
        );
        Ok(report)
    }

    /// Tile one source image and return the written tile paths
    pub fn tile_one(&mut self, source: &Path, output_dir: &Path) -> Result<Vec<PathBuf>> {
        let image = ImageIOService::load_image(source)?;
        let tiles = self.sample_image(&image, source)?;

        let paths = tiles
            .iter()
            .map(|_| output_dir.join(format!("{}.png", Uuid::new_v4())))
            .collect();
        let written = save_tiles(&tiles, paths)?;

        tracing::debug!(image = %source.display(), tiles = written.len(), "Tiled image");
        Ok(written)
    }
}

/// Save each tile to its path; on failure the tiles already saved are removed
fn save_tiles(tiles: &[DynamicImage], paths: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
    let mut written: Vec<PathBuf> = Vec::with_capacity(paths.len());
    for (tile, path) in tiles.iter().zip(paths) {
        if let Err(e) = ImageIOService::save_png(tile, &path) {
            for done in &written {
                if let Err(cleanup_err) = std::fs::remove_file(done) {
                    tracing::warn!(
                        path = %done.display(),
                        error = %cleanup_err,
                        "Failed to remove tile of a failed image"
                    );
                }
            }
            return Err(e);
        }
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn config(tile: u32, count: u32, seed: u64) -> TilingConfig {
        TilingConfig {
            tile_width: tile,
            tile_height: tile,
            tiles_per_image: count,
            seed,
            pattern: None,
        }
    }

    #[test]
    fn test_tile_origin_bounds() {
        assert_eq!(tile_origin(0.0, 1000, 200), Some(0));
        assert_eq!(tile_origin(0.5, 1000, 200), Some(500));
        // Clamped to the last position that keeps the tile inside
        assert_eq!(tile_origin(0.95, 1000, 200), Some(800));
        assert_eq!(tile_origin(0.999, 1000, 200), Some(800));
        // Exact fit
        assert_eq!(tile_origin(0.7, 200, 200), Some(0));
        // Does not fit
        assert_eq!(tile_origin(0.1, 199, 200), None);
    }

    #[test]
    fn test_origins_are_reproducible_for_a_seed() {
        let mut a = TileSampler::new(config(10, 5, 42));
        let mut b = TileSampler::new(config(10, 5, 42));
        let mut c = TileSampler::new(config(10, 5, 7));

        let seq_a: Vec<_> = (0..20).map(|_| a.next_origin(100, 80)).collect();
        let seq_b: Vec<_> = (0..20).map(|_| b.next_origin(100, 80)).collect();
        let seq_c: Vec<_> = (0..20).map(|_| c.next_origin(100, 80)).collect();

        assert_eq!(seq_a, seq_b);
        assert_ne!(seq_a, seq_c);
        for (x, y) in seq_a.into_iter().flatten() {
            assert!(x <= 90);
            assert!(y <= 70);
        }
    }

    #[test]
    fn test_sample_image_tiles_have_tile_size() {
        let image = DynamicImage::ImageLuma8(GrayImage::from_fn(64, 48, |x, y| {
            Luma([((x + y) % 256) as u8])
        }));
        let mut sampler = TileSampler::new(config(16, 7, 1));

        let tiles = sampler.sample_image(&image, Path::new("src.png")).unwrap();
        assert_eq!(tiles.len(), 7);
        for tile in &tiles {
            assert_eq!((tile.width(), tile.height()), (16, 16));
        }
    }

    #[test]
    fn test_sample_image_too_small() {
        let image = DynamicImage::ImageLuma8(GrayImage::new(8, 40));
        let mut sampler = TileSampler::new(config(16, 3, 1));

        let err = sampler.sample_image(&image, Path::new("thin.png")).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::ImageTooSmall { width: 8, height: 40, .. }
        ));
    }

    #[test]
    fn test_failed_save_removes_tiles_of_that_image() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let tiles = vec![
            DynamicImage::ImageLuma8(GrayImage::new(4, 4)),
            DynamicImage::ImageLuma8(GrayImage::new(4, 4)),
        ];
        let first = temp_dir.path().join("first.png");
        // A directory where the second tile should go makes its save fail
        let blocked = temp_dir.path().join("blocked.png");
        std::fs::create_dir(&blocked).unwrap();

        assert!(save_tiles(&tiles, vec![first.clone(), blocked]).is_err());
        assert!(!first.exists());

        let again = temp_dir.path().join("again.png");
        let written = save_tiles(&tiles[..1], vec![again.clone()]).unwrap();
        assert_eq!(written, vec![again.clone()]);
        assert!(again.is_file());
    }
}
