//! Keyboard-driven terminal front-end for the sorter
//!
//! Each tile is drawn as a true-color preview using upper half blocks, two image
//! rows per text row. One line of input per decision: a category digit, `0` or
//! `-` to leave the tile in place, `q` to stop. End of input also stops the
//! session.

use super::{Category, Choice, QueuePosition, SortSummary, SortView};
use crate::error::{DatasetError, Result};
use crate::services::ImageIOService;
use image::{DynamicImage, GenericImageView};
use std::fmt::Write as _;
use std::io::{BufRead, Write};
use std::path::Path;

/// Default preview width in terminal columns
pub const DEFAULT_PREVIEW_WIDTH: u32 = 48;

/// [`SortView`] over any line-oriented input and text output
pub struct TerminalView<R, W> {
    input: R,
    output: W,
    preview_width: Option<u32>,
}

impl TerminalView<std::io::StdinLock<'static>, std::io::Stdout> {
    /// View bound to the process's stdin and stdout, with tile previews
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stdout())
            .with_preview(Some(DEFAULT_PREVIEW_WIDTH))
    }
}

impl<R: BufRead, W: Write> TerminalView<R, W> {
    /// Text-only view; enable previews with [`with_preview`](Self::with_preview)
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            preview_width: None,
        }
    }

    /// Draw tiles at most `width` columns wide, or not at all for `None`
    #[must_use]
    pub fn with_preview(mut self, width: Option<u32>) -> Self {
        self.preview_width = width.filter(|&w| w > 0);
        self
    }

    /// Give back the writer, e.g. to inspect captured output
    pub fn into_output(self) -> W {
        self.output
    }

    fn write_legend(&mut self) -> Result<()> {
        let mut legend = String::new();
        for category in Category::ALL {
            legend.push_str(&format!("[{}] {}  ", category.hotkey(), category));
        }
        legend.push_str("[0] none  [q] quit");
        writeln!(self.output, "  {}", legend)?;
        Ok(())
    }
}

/// Render `image` as ANSI true-color half blocks at most `max_width` columns wide
///
/// Each text row covers two image rows: the foreground color paints the upper
/// pixel and the background the lower one.
#[must_use]
pub fn render_preview(image: &DynamicImage, max_width: u32) -> String {
    let max_width = max_width.max(1);
    // Rows are half as tall as columns are wide, so allow twice the height
    let max_height = max_width.saturating_mul(2);
    let scaled = if image.width() <= max_width && image.height() <= max_height {
        image.to_rgb8()
    } else {
        image.thumbnail(max_width, max_height).to_rgb8()
    };
    let (width, height) = scaled.dimensions();

    let mut out = String::new();
    for y in (0..height).step_by(2) {
        for x in 0..width {
            let [r, g, b] = scaled.get_pixel(x, y).0;
            let _ = write!(out, "\x1b[38;2;{};{};{}m", r, g, b);
            if y + 1 < height {
                let [r, g, b] = scaled.get_pixel(x, y + 1).0;
                let _ = write!(out, "\x1b[48;2;{};{};{}m", r, g, b);
            } else {
                out.push_str("\x1b[49m");
            }
            out.push('\u{2580}');
        }
        out.push_str("\x1b[0m\n");
    }
    out
}

/// Parse one line of input into a choice
#[must_use]
pub fn parse_choice(line: &str) -> Option<Choice> {
    let trimmed = line.trim();
    let mut chars = trimmed.chars();
    match (chars.next(), chars.next()) {
        (Some('q' | 'Q'), None) => Some(Choice::Quit),
        (Some('0' | '-'), None) => Some(Choice::Skip),
        (Some(key), None) => Category::from_hotkey(key).map(Choice::Sort),
        _ => {
            if trimmed.eq_ignore_ascii_case("quit") {
                Some(Choice::Quit)
            } else if trimmed.eq_ignore_ascii_case("none") || trimmed.eq_ignore_ascii_case("skip") {
                Some(Choice::Skip)
            } else {
                Category::from_folder_name(trimmed).map(Choice::Sort)
            }
        },
    }
}

impl<R: BufRead, W: Write> SortView for TerminalView<R, W> {
    fn show_tile(&mut self, tile: &Path, position: QueuePosition) -> Result<()> {
        let (dimensions, preview) = match ImageIOService::load_image(tile) {
            Ok(image) => {
                let (w, h) = image.dimensions();
                let preview = self.preview_width.map(|width| render_preview(&image, width));
                (format!("{}x{}", w, h), preview)
            },
            Err(e) => {
                tracing::debug!(tile = %tile.display(), error = %e, "Could not read tile");
                ("unreadable".to_string(), None)
            },
        };

        writeln!(self.output)?;
        if let Some(preview) = preview {
            write!(self.output, "{}", preview)?;
        }
        writeln!(
            self.output,
            "[{}/{}] {} ({})",
            position.index,
            position.total,
            tile.display(),
            dimensions
        )?;
        self.write_legend()?;
        self.output.flush()?;
        Ok(())
    }

    fn show_error(&mut self, tile: &Path, error: &DatasetError) -> Result<()> {
        writeln!(self.output, "Could not sort {}: {}", tile.display(), error)?;
        writeln!(self.output, "Pick another category or 0 to leave it in place")?;
        self.write_legend()?;
        self.output.flush()?;
        Ok(())
    }

    fn show_done(&mut self, summary: &SortSummary) -> Result<()> {
        if summary.quit_early {
            writeln!(
                self.output,
                "Stopped with {} tile(s) left to classify",
                summary.remaining
            )?;
        } else {
            writeln!(self.output, "You are done classifying")?;
        }
        for (category, count) in &summary.per_category {
            writeln!(self.output, "  {:<14}{}", category.folder_name(), count)?;
        }
        writeln!(self.output, "  {:<14}{}", "skipped", summary.skipped)?;
        if summary.failed_moves > 0 {
            writeln!(self.output, "  {:<14}{}", "failed moves", summary.failed_moves)?;
        }
        self.output.flush()?;
        Ok(())
    }

    fn next_choice(&mut self) -> Result<Choice> {
        loop {
            write!(self.output, "> ")?;
            self.output.flush()?;

            let mut line = String::new();
            let read = self.input.read_line(&mut line)?;
            if read == 0 {
                return Ok(Choice::Quit);
            }

            match parse_choice(&line) {
                Some(choice) => return Ok(choice),
                None => {
                    writeln!(self.output, "Unknown choice '{}'", line.trim())?;
                    self.write_legend()?;
                },
            }
        }
    }
}
