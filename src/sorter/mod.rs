//! Manual sorting of unlabeled tiles into category folders
//!
//! [`SortQueue`] is the work queue: a snapshot of the tiles waiting in the
//! to-classify directory. [`SortSession`] connects the queue to a [`SortView`],
//! the front-end that shows tiles and collects one [`Choice`] per tile.

pub mod terminal;

use crate::error::{DatasetError, Result};
use crate::services::ImageIOService;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub use terminal::TerminalView;

/// Label a tile can be sorted into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Agricultural,
    Cloud,
    Mountain,
    Natural,
    River,
    SeaIce,
    Snow,
    Water,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Self::Agricultural,
        Self::Cloud,
        Self::Mountain,
        Self::Natural,
        Self::River,
        Self::SeaIce,
        Self::Snow,
        Self::Water,
    ];

    /// Directory name under the training directory
    #[must_use]
    pub fn folder_name(self) -> &'static str {
        match self {
            Self::Agricultural => "Agricultural",
            Self::Cloud => "Cloud",
            Self::Mountain => "Mountain",
            Self::Natural => "Natural",
            Self::River => "River",
            Self::SeaIce => "Sea_ice",
            Self::Snow => "Snow",
            Self::Water => "Water",
        }
    }

    /// Key that selects this category, `1` to `8`
    #[must_use]
    pub fn hotkey(self) -> char {
        match self {
            Self::Agricultural => '1',
            Self::Cloud => '2',
            Self::Mountain => '3',
            Self::Natural => '4',
            Self::River => '5',
            Self::SeaIce => '6',
            Self::Snow => '7',
            Self::Water => '8',
        }
    }

    #[must_use]
    pub fn from_hotkey(key: char) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.hotkey() == key)
    }

    /// Case-insensitive lookup by folder name (`sea_ice`, `Cloud`, ...)
    #[must_use]
    pub fn from_folder_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.folder_name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.folder_name())
    }
}

/// Decision for the tile currently shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    /// Move the tile into a category folder
    Sort(Category),
    /// Leave the tile where it is ("none of these")
    Skip,
    /// Stop the session
    Quit,
}

/// 1-based position of the shown tile within the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePosition {
    pub index: usize,
    pub total: usize,
}

/// Directory-listing work queue of tiles to sort
#[derive(Debug)]
pub struct SortQueue {
    dest_dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: Option<usize>,
    current_moved: bool,
}

impl SortQueue {
    /// Snapshot the image files in `source_dir`; sorted tiles go to `dest_dir/<category>/`
    pub fn new(source_dir: &Path, dest_dir: &Path) -> Result<Self> {
        let files = ImageIOService::list_images(source_dir, None)?;
        tracing::info!(
            source = %source_dir.display(),
            dest = %dest_dir.display(),
            tiles = files.len(),
            "Sort queue ready"
        );
        Ok(Self::from_files(files, dest_dir))
    }

    /// Queue over an explicit list of tiles
    #[must_use]
    pub fn from_files(files: Vec<PathBuf>, dest_dir: &Path) -> Self {
        Self {
            dest_dir: dest_dir.to_path_buf(),
            files,
            cursor: None,
            current_moved: false,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Advance to the next tile; `None` once the queue is exhausted
    pub fn advance(&mut self) -> Option<PathBuf> {
        let next = self.cursor.map_or(0, |i| i + 1);
        if next >= self.files.len() {
            self.cursor = Some(self.files.len());
            return None;
        }
        self.cursor = Some(next);
        self.current_moved = false;
        self.files.get(next).cloned()
    }

    /// Tile currently shown, if any
    #[must_use]
    pub fn current(&self) -> Option<&Path> {
        self.cursor
            .and_then(|i| self.files.get(i))
            .map(PathBuf::as_path)
    }

    /// Position of the current tile
    #[must_use]
    pub fn position(&self) -> Option<QueuePosition> {
        self.current().and(self.cursor).map(|i| QueuePosition {
            index: i + 1,
            total: self.files.len(),
        })
    }

    /// Tiles not yet shown, excluding the current one
    #[must_use]
    pub fn remaining(&self) -> usize {
        match self.cursor {
            None => self.files.len(),
            Some(i) => self.files.len().saturating_sub(i + 1),
        }
    }

    /// Move the current tile into its category folder and return the new path
    ///
    /// # Errors
    /// - `InvalidState` when no tile is current or it was already moved
    /// - `Io` when the destination exists or the move fails
    pub fn put_current_into(&mut self, category: Category) -> Result<PathBuf> {
        let source = self
            .current()
            .ok_or_else(|| DatasetError::invalid_state("no tile is currently selected"))?
            .to_path_buf();
        if self.current_moved {
            return Err(DatasetError::invalid_state(format!(
                "tile '{}' was already sorted",
                source.display()
            )));
        }

        let file_name = source
            .file_name()
            .ok_or_else(|| DatasetError::invalid_state("tile path has no file name"))?;
        let folder = self.dest_dir.join(category.folder_name());
        fs::create_dir_all(&folder)
            .map_err(|e| DatasetError::file_io_error("create category directory", &folder, &e))?;

        let target = folder.join(file_name);
        if target.exists() {
            return Err(DatasetError::file_io_error(
                "move tile",
                &target,
                &std::io::Error::new(std::io::ErrorKind::AlreadyExists, "destination exists"),
            ));
        }

        move_file(&source, &target)?;
        self.current_moved = true;
        tracing::debug!(tile = %source.display(), category = %category, "Sorted tile");
        Ok(target)
    }
}

/// Rename, falling back to copy + remove across filesystems
fn move_file(source: &Path, target: &Path) -> Result<()> {
    match fs::rename(source, target) {
        Ok(()) => Ok(()),
        Err(rename_err) if is_cross_device(&rename_err) => {
            tracing::debug!(error = %rename_err, "Rename crosses filesystems, copying instead");
            if let Err(copy_err) = fs::copy(source, target) {
                remove_partial(target);
                return Err(DatasetError::file_io_error("copy tile to", target, &copy_err));
            }
            if let Err(remove_err) = fs::remove_file(source) {
                // Keep exactly one copy of the tile
                remove_partial(target);
                return Err(DatasetError::file_io_error("remove sorted tile", source, &remove_err));
            }
            Ok(())
        },
        Err(rename_err) => Err(DatasetError::file_io_error("move tile", source, &rename_err)),
    }
}

/// EXDEV on Unix, `ERROR_NOT_SAME_DEVICE` on Windows
fn is_cross_device(error: &std::io::Error) -> bool {
    const CROSS_DEVICE: i32 = if cfg!(windows) { 17 } else { 18 };
    error.raw_os_error() == Some(CROSS_DEVICE)
}

fn remove_partial(target: &Path) {
    if target.exists() {
        if let Err(e) = fs::remove_file(target) {
            tracing::warn!(path = %target.display(), error = %e, "Failed to remove partial copy");
        }
    }
}

/// Counters from one sorting session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSummary {
    pub per_category: BTreeMap<Category, usize>,
    pub skipped: usize,
    /// Tiles never decided on (only non-zero after quitting early)
    pub remaining: usize,
    pub quit_early: bool,
    /// Sort decisions that failed and were asked again
    pub failed_moves: usize,
}

impl SortSummary {
    #[must_use]
    pub fn sorted(&self) -> usize {
        self.per_category.values().sum()
    }
}

/// Front-end that displays tiles and collects decisions
pub trait SortView {
    /// Show the tile awaiting a decision
    fn show_tile(&mut self, tile: &Path, position: QueuePosition) -> Result<()>;

    /// Report a decision that could not be applied to the shown tile
    fn show_error(&mut self, tile: &Path, error: &DatasetError) -> Result<()>;

    /// Show that the queue is exhausted or the session ended
    fn show_done(&mut self, summary: &SortSummary) -> Result<()>;

    /// Block until the user picks a choice for the shown tile
    fn next_choice(&mut self) -> Result<Choice>;
}

/// Drives a [`SortQueue`] through a [`SortView`]
pub struct SortSession<V: SortView> {
    queue: SortQueue,
    view: V,
    summary: SortSummary,
    finished: bool,
}

impl<V: SortView> SortSession<V> {
    #[must_use]
    pub fn new(queue: SortQueue, view: V) -> Self {
        Self {
            queue,
            view,
            summary: SortSummary::default(),
            finished: false,
        }
    }

    /// Show the first tile
    pub fn start(&mut self) -> Result<()> {
        self.advance()
    }

    /// Apply a decision to the current tile and show the next one
    ///
    /// A move that fails on the filesystem is reported through
    /// [`SortView::show_error`] and leaves the same tile awaiting a decision.
    pub fn handle(&mut self, choice: Choice) -> Result<()> {
        if self.finished {
            return Err(DatasetError::invalid_state("sorting session already finished"));
        }

        match choice {
            Choice::Sort(category) => match self.queue.put_current_into(category) {
                Ok(_) => *self.summary.per_category.entry(category).or_insert(0) += 1,
                // The tile stays current so the user can pick again or skip
                Err(e) => return self.report_failed_move(e),
            },
            Choice::Skip => {
                if let Some(tile) = self.queue.current() {
                    tracing::debug!(tile = %tile.display(), "Skipped tile");
                }
                self.summary.skipped += 1;
            },
            Choice::Quit => {
                self.summary.quit_early = true;
                // The current tile is undecided too
                self.summary.remaining = self.queue.remaining() + 1;
                return self.finish();
            },
        }

        self.advance()
    }

    /// Run until the queue is exhausted or the user quits
    pub fn run(mut self) -> Result<SortSummary> {
        self.start()?;
        while !self.finished {
            let choice = self.view.next_choice()?;
            self.handle(choice)?;
        }
        Ok(self.summary)
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    #[must_use]
    pub fn summary(&self) -> &SortSummary {
        &self.summary
    }

    #[must_use]
    pub fn view(&self) -> &V {
        &self.view
    }

    fn advance(&mut self) -> Result<()> {
        match self.queue.advance() {
            Some(tile) => {
                let position = self.queue.position().unwrap_or(QueuePosition {
                    index: 0,
                    total: self.queue.len(),
                });
                self.view.show_tile(&tile, position)
            },
            None => self.finish(),
        }
    }

    fn report_failed_move(&mut self, error: DatasetError) -> Result<()> {
        match error {
            DatasetError::Io(_) | DatasetError::InvalidState(_) => {
                let tile = self.queue.current().map(Path::to_path_buf).unwrap_or_default();
                tracing::warn!(tile = %tile.display(), error = %error, "Could not sort tile");
                self.summary.failed_moves += 1;
                self.view.show_error(&tile, &error)
            },
            other => Err(other),
        }
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        tracing::info!(
            sorted = self.summary.sorted(),
            skipped = self.summary.skipped,
            remaining = self.summary.remaining,
            "Sorting session finished"
        );
        self.view.show_done(&self.summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};
    use tempfile::TempDir;

    /// View that replays scripted choices and records what it was shown
    #[derive(Default)]
    struct ScriptedView {
        choices: Vec<Choice>,
        shown: Vec<(String, QueuePosition)>,
        errors: Vec<(String, String)>,
        done: Option<SortSummary>,
    }

    impl SortView for ScriptedView {
        fn show_tile(&mut self, tile: &Path, position: QueuePosition) -> Result<()> {
            let name = tile.file_name().unwrap().to_string_lossy().into_owned();
            self.shown.push((name, position));
            Ok(())
        }

        fn show_error(&mut self, tile: &Path, error: &DatasetError) -> Result<()> {
            let name = tile.file_name().unwrap().to_string_lossy().into_owned();
            self.errors.push((name, error.to_string()));
            Ok(())
        }

        fn show_done(&mut self, summary: &SortSummary) -> Result<()> {
            self.done = Some(summary.clone());
            Ok(())
        }

        fn next_choice(&mut self) -> Result<Choice> {
            if self.choices.is_empty() {
                Ok(Choice::Quit)
            } else {
                Ok(self.choices.remove(0))
            }
        }
    }

    fn setup(names: &[&str]) -> (TempDir, PathBuf, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("to_classify");
        let dest = temp_dir.path().join("training");
        let img = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        for name in names {
            ImageIOService::save_png(&img, source.join(name)).unwrap();
        }
        (temp_dir, source, dest)
    }

    #[test]
    fn test_category_tables() {
        assert_eq!(Category::SeaIce.folder_name(), "Sea_ice");
        assert_eq!(Category::from_hotkey('6'), Some(Category::SeaIce));
        assert_eq!(Category::from_hotkey('9'), None);
        assert_eq!(Category::from_folder_name("sea_ice"), Some(Category::SeaIce));
        let keys: String = Category::ALL.iter().map(|c| c.hotkey()).collect();
        assert_eq!(keys, "12345678");
    }

    #[test]
    fn test_queue_walks_and_stays_exhausted() {
        let (_tmp, source, dest) = setup(&["b.png", "a.png"]);
        let mut queue = SortQueue::new(&source, &dest).unwrap();

        assert_eq!(queue.len(), 2);
        assert!(queue.current().is_none());
        assert_eq!(queue.remaining(), 2);

        assert_eq!(queue.advance().unwrap().file_name().unwrap(), "a.png");
        assert_eq!(queue.position(), Some(QueuePosition { index: 1, total: 2 }));
        assert_eq!(queue.remaining(), 1);
        assert_eq!(queue.advance().unwrap().file_name().unwrap(), "b.png");
        assert!(queue.advance().is_none());
        assert!(queue.advance().is_none());
        assert!(queue.current().is_none());
        assert_eq!(queue.remaining(), 0);
    }

    #[test]
    fn test_put_current_into_moves_file() {
        let (_tmp, source, dest) = setup(&["tile.png"]);
        let mut queue = SortQueue::new(&source, &dest).unwrap();

        assert!(matches!(
            queue.put_current_into(Category::Cloud),
            Err(DatasetError::InvalidState(_))
        ));

        queue.advance();
        let target = queue.put_current_into(Category::SeaIce).unwrap();
        assert_eq!(target, dest.join("Sea_ice").join("tile.png"));
        assert!(target.is_file());
        assert!(!source.join("tile.png").exists());

        // A second move of the same tile is refused
        assert!(matches!(
            queue.put_current_into(Category::Water),
            Err(DatasetError::InvalidState(_))
        ));
    }

    #[test]
    fn test_put_current_into_refuses_overwrite() {
        let (_tmp, source, dest) = setup(&["tile.png"]);
        fs::create_dir_all(dest.join("Cloud")).unwrap();
        fs::write(dest.join("Cloud").join("tile.png"), b"existing").unwrap();

        let mut queue = SortQueue::new(&source, &dest).unwrap();
        queue.advance();
        assert!(queue.put_current_into(Category::Cloud).is_err());
        assert!(source.join("tile.png").exists());
        assert_eq!(fs::read(dest.join("Cloud").join("tile.png")).unwrap(), b"existing");
    }

    #[test]
    fn test_session_applies_choices() {
        let (_tmp, source, dest) = setup(&["1.png", "2.png", "3.png"]);
        let queue = SortQueue::new(&source, &dest).unwrap();
        let view = ScriptedView {
            choices: vec![
                Choice::Sort(Category::Cloud),
                Choice::Skip,
                Choice::Sort(Category::Cloud),
            ],
            ..ScriptedView::default()
        };

        let summary = SortSession::new(queue, view).run().unwrap();

        assert_eq!(summary.sorted(), 2);
        assert_eq!(summary.per_category.get(&Category::Cloud), Some(&2));
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.remaining, 0);
        assert!(!summary.quit_early);
        assert!(dest.join("Cloud/1.png").is_file());
        assert!(source.join("2.png").is_file());
        assert!(dest.join("Cloud/3.png").is_file());
    }

    #[test]
    fn test_session_quit_counts_remaining() {
        let (_tmp, source, dest) = setup(&["1.png", "2.png", "3.png"]);
        let queue = SortQueue::new(&source, &dest).unwrap();
        let mut session = SortSession::new(queue, ScriptedView::default());

        session.start().unwrap();
        session.handle(Choice::Sort(Category::River)).unwrap();
        session.handle(Choice::Quit).unwrap();

        assert!(session.is_finished());
        let summary = session.summary().clone();
        assert!(summary.quit_early);
        assert_eq!(summary.remaining, 2);
        assert_eq!(session.view().shown.len(), 2);
        assert_eq!(session.view().shown[1].1, QueuePosition { index: 2, total: 3 });
        assert_eq!(session.view().done.as_ref(), Some(&summary));

        assert!(matches!(
            session.handle(Choice::Skip),
            Err(DatasetError::InvalidState(_))
        ));
    }

    #[test]
    fn test_empty_queue_finishes_immediately() {
        let (_tmp, source, dest) = setup(&[]);
        fs::create_dir_all(&source).unwrap();
        let queue = SortQueue::new(&source, &dest).unwrap();
        let summary = SortSession::new(queue, ScriptedView::default()).run().unwrap();
        assert_eq!(summary, SortSummary::default());
    }

    #[test]
    fn test_collision_keeps_session_on_same_tile() {
        let (_tmp, source, dest) = setup(&["a.png", "b.png"]);
        fs::create_dir_all(dest.join("Cloud")).unwrap();
        fs::write(dest.join("Cloud/a.png"), b"labeled earlier").unwrap();

        let queue = SortQueue::new(&source, &dest).unwrap();
        let view = ScriptedView {
            choices: vec![
                Choice::Sort(Category::Cloud),
                Choice::Sort(Category::Snow),
                Choice::Sort(Category::Cloud),
            ],
            ..ScriptedView::default()
        };
        let mut session = SortSession::new(queue, view);
        session.start().unwrap();
        while !session.is_finished() {
            let choice = session.view.next_choice().unwrap();
            session.handle(choice).unwrap();
        }

        let summary = session.summary().clone();
        assert_eq!(summary.failed_moves, 1);
        assert_eq!(summary.per_category.get(&Category::Snow), Some(&1));
        assert_eq!(summary.per_category.get(&Category::Cloud), Some(&1));
        assert!(!summary.quit_early);

        let view = session.view();
        assert_eq!(view.errors.len(), 1);
        assert_eq!(view.errors[0].0, "a.png");
        assert!(view.errors[0].1.contains("destination exists"));
        // a.png was shown once, the retry reuses the same prompt
        assert_eq!(view.shown.len(), 2);

        assert_eq!(fs::read(dest.join("Cloud/a.png")).unwrap(), b"labeled earlier");
        assert!(dest.join("Snow/a.png").is_file());
        assert!(dest.join("Cloud/b.png").is_file());
        assert!(!source.join("b.png").exists());
    }

    #[test]
    fn test_vanished_tile_is_reported_and_skippable() {
        let (_tmp, source, dest) = setup(&["gone.png", "kept.png"]);
        let queue = SortQueue::new(&source, &dest).unwrap();
        fs::remove_file(source.join("gone.png")).unwrap();

        let view = ScriptedView {
            choices: vec![Choice::Sort(Category::Water), Choice::Skip, Choice::Sort(Category::Water)],
            ..ScriptedView::default()
        };
        let summary = SortSession::new(queue, view).run().unwrap();

        assert_eq!(summary.failed_moves, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.per_category.get(&Category::Water), Some(&1));
        assert!(dest.join("Water/kept.png").is_file());
    }

    #[test]
    fn test_move_file_reports_rename_error_without_copying() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("missing.png");
        let target = temp_dir.path().join("out.png");

        match move_file(&source, &target).unwrap_err() {
            DatasetError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!target.exists());
    }

    #[test]
    fn test_cross_device_detection() {
        let code = if cfg!(windows) { 17 } else { 18 };
        assert!(is_cross_device(&std::io::Error::from_raw_os_error(code)));
        assert!(!is_cross_device(&std::io::Error::from(std::io::ErrorKind::NotFound)));
        assert!(!is_cross_device(&std::io::Error::from(
            std::io::ErrorKind::PermissionDenied
        )));
    }
}
