//! Dataset archive download and extraction
//!
//! Streams the archive to a `.part` file next to its destination, renames it into
//! place once complete, optionally checks a SHA-256 digest and unpacks the zip
//! into the data directory.

use crate::config::DatasetConfig;
use crate::error::{DatasetError, Result};
use crate::services::ProgressIndicator;
use futures_util::stream::TryStreamExt;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;

/// Dataset archive downloader
#[derive(Debug, Clone)]
pub struct DatasetDownloader {
    client: Client,
}

/// Options for [`fetch_dataset`]
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    /// Download again even if the archive is already present
    pub force: bool,
    /// Display a progress indicator
    pub show_progress: bool,
}

/// Outcome of [`fetch_dataset`]
#[derive(Debug, Clone)]
pub struct FetchReport {
    /// Path of the archive on disk
    pub archive: PathBuf,
    /// Bytes transferred (0 when an existing archive was reused)
    pub bytes_downloaded: u64,
    /// True when an existing archive was used instead of downloading
    pub reused_archive: bool,
    /// Files written by extraction
    pub extracted_files: Vec<PathBuf>,
}

impl DatasetDownloader {
    /// Create a new downloader with the given request timeout
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DatasetError::network_error("Failed to create HTTP client", e))?;

        Ok(Self { client })
    }

    /// Download `url` to `dest`, returning the number of bytes written
    ///
    /// The body is streamed to `<dest>.part` and renamed once complete; the
    /// partial file is removed on failure.
    pub async fn download(
        &self,
        url: &str,
        dest: &Path,
        progress: &ProgressIndicator,
    ) -> Result<u64> {
        let part_path = part_path(dest);

        match self.download_to(url, &part_path, progress).await {
            Ok(bytes) => {
                fs::rename(&part_path, dest).map_err(|e| {
                    DatasetError::file_io_error("move downloaded archive into place", dest, &e)
                })?;
                Ok(bytes)
            },
            Err(e) => {
                if part_path.exists() {
                    if let Err(cleanup_err) = fs::remove_file(&part_path) {
                        tracing::warn!(
                            path = %part_path.display(),
                            error = %cleanup_err,
                            "Failed to remove partial download"
                        );
                    }
                }
                Err(e)
            },
        }
    }

    async fn download_to(
        &self,
        url: &str,
        local_path: &Path,
        progress: &ProgressIndicator,
    ) -> Result<u64> {
        tracing::debug!(url = %url, path = %local_path.display(), "Downloading");

        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| DatasetError::file_io_error("create directory", parent, &e))?;
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DatasetError::network_error(format!("Failed to download {}", url), e))?;

        if !response.status().is_success() {
            return Err(DatasetError::Network(format!(
                "HTTP error {} for {}",
                response.status(),
                url
            )));
        }

        let total_size = response.content_length();
        if let Some(total) = total_size {
            progress.set_length(total);
        }

        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| DatasetError::file_io_error("create file", local_path, &e))?;

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut downloaded = 0u64;
        let mut buffer = vec![0; 64 * 1024];

        loop {
            let bytes_read = tokio::io::AsyncReadExt::read(&mut stream, &mut buffer)
                .await
                .map_err(|e| DatasetError::network_error("Failed to read download stream", e))?;

            if bytes_read == 0 {
                break;
            }

            file.write_all(buffer.get(..bytes_read).unwrap_or(&[]))
                .await
                .map_err(|e| DatasetError::file_io_error("write to file", local_path, &e))?;

            downloaded += bytes_read as u64;
            progress.set_position(downloaded);
        }

        file.flush()
            .await
            .map_err(|e| DatasetError::file_io_error("flush file", local_path, &e))?;

        if let Some(total) = total_size {
            if downloaded != total {
                return Err(DatasetError::Network(format!(
                    "Download of {} ended after {} of {} bytes",
                    url, downloaded, total
                )));
            }
        }

        tracing::debug!(bytes = downloaded, path = %local_path.display(), "Download complete");
        Ok(downloaded)
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// Hex SHA-256 digest of a file
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)
        .map_err(|e| DatasetError::file_io_error("open file for verification", path, &e))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)
        .map_err(|e| DatasetError::file_io_error("read file for verification", path, &e))?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Check a file against an expected hex SHA-256 digest
///
/// # Errors
/// - `ChecksumMismatch` when the digests differ
pub fn verify_sha256(path: &Path, expected: &str) -> Result<()> {
    let actual = sha256_file(path)?;
    if actual.eq_ignore_ascii_case(expected) {
        tracing::debug!(path = %path.display(), "Checksum verified");
        Ok(())
    } else {
        Err(DatasetError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: expected.to_lowercase(),
            actual,
        })
    }
}

/// Unpack a zip archive into `destination`, returning the extracted file paths
///
/// Entries whose names would land outside `destination` are skipped.
pub fn extract_archive(archive_path: &Path, destination: &Path) -> Result<Vec<PathBuf>> {
    let file = fs::File::open(archive_path)
        .map_err(|e| DatasetError::file_io_error("open archive", archive_path, &e))?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut extracted = Vec::new();

    fs::create_dir_all(destination)
        .map_err(|e| DatasetError::file_io_error("create directory", destination, &e))?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            tracing::warn!(entry = %entry.name(), "Skipping archive entry with unsafe path");
            continue;
        };
        let outpath = destination.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&outpath)
                .map_err(|e| DatasetError::file_io_error("create directory", &outpath, &e))?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| DatasetError::file_io_error("create directory", parent, &e))?;
        }
        let mut outfile = fs::File::create(&outpath)
            .map_err(|e| DatasetError::file_io_error("create file", &outpath, &e))?;
        std::io::copy(&mut entry, &mut outfile)
            .map_err(|e| DatasetError::file_io_error("extract", &outpath, &e))?;
        extracted.push(outpath);
    }

    tracing::info!(
        archive = %archive_path.display(),
        files = extracted.len(),
        "Archive extracted"
    );
    Ok(extracted)
}

/// Download (unless present), verify and unpack the dataset archive
pub async fn fetch_dataset(config: &DatasetConfig, options: FetchOptions) -> Result<FetchReport> {
    let data_path = config.data_path();
    if data_path.is_dir() {
        tracing::info!(path = %data_path.display(), "Data directory already exists, reusing it");
    } else {
        fs::create_dir_all(&data_path)
            .map_err(|e| DatasetError::file_io_error("create data directory", &data_path, &e))?;
        tracing::info!(path = %data_path.display(), "Created data directory");
    }

    let archive = config.archive_path();
    let reuse = archive.is_file() && !options.force;

    let bytes_downloaded = if reuse {
        tracing::info!(archive = %archive.display(), "Archive already present, skipping download");
        0
    } else {
        tracing::info!(url = %config.dataset_url, "Downloading dataset archive");
        let downloader = DatasetDownloader::new(Duration::from_secs(config.timeout_secs))?;
        let progress = ProgressIndicator::download(options.show_progress);
        progress.set_message("Downloading zip file".to_string());
        match downloader.download(&config.dataset_url, &archive, &progress).await {
            Ok(bytes) => {
                progress.finish_with_message("Download complete".to_string());
                bytes
            },
            Err(e) => {
                progress.finish_with_message("Download failed".to_string());
                return Err(e);
            },
        }
    };

    if let Some(expected) = &config.expected_sha256 {
        verify_sha256(&archive, expected)?;
    }

    let extract_from = archive.clone();
    let extract_to = data_path.clone();
    let extracted_files =
        tokio::task::spawn_blocking(move || extract_archive(&extract_from, &extract_to))
            .await
            .map_err(|e| DatasetError::invalid_state(format!("Extraction task failed: {}", e)))??;

    Ok(FetchReport {
        archive,
        bytes_downloaded,
        reused_archive: reuse,
        extracted_files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_part_path() {
        assert_eq!(
            part_path(Path::new("/data/downloadedZip.zip")),
            PathBuf::from("/data/downloadedZip.zip.part")
        );
    }

    #[test]
    fn test_sha256_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("hello.txt");
        fs::write(&path, b"hello").unwrap();

        assert_eq!(
            sha256_file(&path).unwrap(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert!(verify_sha256(
            &path,
            "2CF24DBA5FB0A30E26E83B2AC5B9E29E1B161E5C1FA7425E73043362938B9824"
        )
        .is_ok());

        let err = verify_sha256(&path, &"0".repeat(64)).unwrap_err();
        assert!(matches!(err, DatasetError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_extract_archive_writes_nested_files() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("data.zip");
        write_zip(
            &archive,
            &[
                ("ops_sat/train/Cloud/a.png", b"cloud"),
                ("ops_sat/readme.txt", b"readme"),
            ],
        );

        let dest = temp_dir.path().join("out");
        let files = extract_archive(&archive, &dest).unwrap();

        assert_eq!(files.len(), 2);
        assert_eq!(
            fs::read(dest.join("ops_sat/train/Cloud/a.png")).unwrap(),
            b"cloud"
        );
        assert_eq!(fs::read(dest.join("ops_sat/readme.txt")).unwrap(), b"readme");
    }

    #[test]
    fn test_extract_archive_skips_escaping_entries() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("evil.zip");
        write_zip(&archive, &[("../escape.txt", b"nope"), ("ok.txt", b"ok")]);

        let dest = temp_dir.path().join("out");
        let files = extract_archive(&archive, &dest).unwrap();

        assert_eq!(files, vec![dest.join("ok.txt")]);
        assert!(!temp_dir.path().join("escape.txt").exists());
    }

    #[test]
    fn test_extract_rejects_non_zip() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("broken.zip");
        fs::write(&archive, b"definitely not a zip").unwrap();

        let err = extract_archive(&archive, &temp_dir.path().join("out")).unwrap_err();
        assert!(matches!(err, DatasetError::Archive(_)));
    }

    #[tokio::test]
    async fn test_fetch_reuses_existing_archive() {
        let temp_dir = TempDir::new().unwrap();
        let config = DatasetConfig::builder()
            .root(temp_dir.path())
            // Unroutable URL: the test fails if a download is attempted
            .dataset_url("http://127.0.0.1:9/ops_sat.zip")
            .build()
            .unwrap();

        fs::create_dir_all(config.data_path()).unwrap();
        write_zip(&config.archive_path(), &[("images/pass.txt", b"x")]);

        let report = fetch_dataset(&config, FetchOptions::default()).await.unwrap();
        assert!(report.reused_archive);
        assert_eq!(report.bytes_downloaded, 0);
        assert_eq!(report.extracted_files.len(), 1);
        assert!(config.data_path().join("images/pass.txt").is_file());
    }

    #[tokio::test]
    async fn test_fetch_checksum_mismatch_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let config = DatasetConfig::builder()
            .root(temp_dir.path())
            .expected_sha256(Some("0".repeat(64)))
            .build()
            .unwrap();

        fs::create_dir_all(config.data_path()).unwrap();
        write_zip(&config.archive_path(), &[("a.txt", b"x")]);

        let err = fetch_dataset(&config, FetchOptions::default()).await.unwrap_err();
        assert!(matches!(err, DatasetError::ChecksumMismatch { .. }));
    }

    #[tokio::test]
    async fn test_failed_download_leaves_no_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("archive.zip");
        let downloader = DatasetDownloader::new(Duration::from_secs(2)).unwrap();

        let result = downloader
            .download("http://127.0.0.1:9/missing.zip", &dest, &ProgressIndicator::none())
            .await;

        assert!(matches!(result, Err(DatasetError::Network(_))));
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
    }
}
