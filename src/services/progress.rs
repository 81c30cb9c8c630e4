//! Progress reporting service
//!
//! Wraps `indicatif` so library code can report progress whether or not the
//! `cli` feature is compiled in.

#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar abstraction that works with and without CLI features
#[derive(Debug)]
pub enum ProgressIndicator {
    #[cfg(feature = "cli")]
    Indicatif(ProgressBar),
    NoOp,
}

impl ProgressIndicator {
    /// Silent indicator
    #[must_use]
    pub fn none() -> Self {
        Self::NoOp
    }

    /// Byte-oriented indicator for downloads
    ///
    /// Starts as a spinner; [`set_length`](Self::set_length) switches it to a bar.
    #[must_use]
    pub fn download(enabled: bool) -> Self {
        #[cfg(feature = "cli")]
        {
            if enabled {
                let pb = ProgressBar::new_spinner();
                pb.set_style(
                    ProgressStyle::default_spinner()
                        .template("{spinner:.green} [{elapsed_precise}] {bytes} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                pb.enable_steady_tick(std::time::Duration::from_millis(100));
                return Self::Indicatif(pb);
            }
        }
        #[cfg(not(feature = "cli"))]
        let _ = enabled;
        Self::NoOp
    }

    /// Item-count indicator for batch work (images, tiles)
    #[must_use]
    pub fn batch(enabled: bool, len: u64, label: &str) -> Self {
        #[cfg(feature = "cli")]
        {
            if enabled {
                let pb = ProgressBar::new(len);
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template(
                            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                        )
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("#>-"),
                );
                pb.set_message(label.to_string());
                return Self::Indicatif(pb);
            }
        }
        #[cfg(not(feature = "cli"))]
        let _ = (enabled, len, label);
        Self::NoOp
    }

    /// Set message for progress indicator
    pub fn set_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_message(msg),
            Self::NoOp => {},
        }
    }

    /// Set total length; a spinner becomes a byte bar
    pub fn set_length(&self, len: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => {
                if pb.length().is_none() {
                    pb.set_style(
                        ProgressStyle::default_bar()
                            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                            .unwrap_or_else(|_| ProgressStyle::default_bar())
                            .progress_chars("#>-"),
                    );
                }
                pb.set_length(len);
            },
            Self::NoOp => {},
        }
    }

    /// Set position for progress indicator
    pub fn set_position(&self, pos: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_position(pos),
            Self::NoOp => {},
        }
    }

    /// Advance by `delta` items
    pub fn inc(&self, delta: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.inc(delta),
            Self::NoOp => {},
        }
    }

    /// Finish progress indicator with message
    pub fn finish_with_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.finish_with_message(msg),
            Self::NoOp => {},
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_indicators_are_noop() {
        assert!(matches!(ProgressIndicator::download(false), ProgressIndicator::NoOp));
        assert!(matches!(
            ProgressIndicator::batch(false, 10, "tiling"),
            ProgressIndicator::NoOp
        ));

        // All operations are silent on a no-op indicator
        let pb = ProgressIndicator::none();
        pb.set_length(10);
        pb.set_position(5);
        pb.inc(1);
        pb.set_message("msg".to_string());
        pb.finish_with_message("done".to_string());
    }

    #[cfg(feature = "cli")]
    #[test]
    fn test_download_indicator_switches_to_bar() {
        let pb = ProgressIndicator::download(true);
        match &pb {
            ProgressIndicator::Indicatif(bar) => {
                assert!(bar.length().is_none());
                pb.set_length(1024);
                assert_eq!(bar.length(), Some(1024));
            },
            ProgressIndicator::NoOp => panic!("expected indicatif progress bar"),
        }
        pb.finish_with_message("done".to_string());
    }
}
