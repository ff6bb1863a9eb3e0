//! Frame source resolution
//!
//! Maps a camera's snapshot root to an ordered list of frame files. Folder
//! and file names are assumed to sort chronologically (`YYYYMMDD` folders,
//! zero-padded frame names); the ordering is plain lexicographic and is not
//! validated against capture time.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;
use tracing::debug;

/// Extension of frame files inside a date folder (case-sensitive)
pub const FRAME_EXTENSION: &str = "jpg";

/// Why a frame source could not be produced.
///
/// Both variants surface as 404 at the HTTP boundary but are logged apart.
#[derive(Debug, Error)]
pub enum FrameSourceError {
    #[error("no snapshot folder under {}", .0.display())]
    NoFolder(PathBuf),

    #[error("no frames in {}", .0.display())]
    NoFrames(PathBuf),
}

/// An ordered snapshot of the frames in one folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSource {
    pub folder: PathBuf,
    pub frames: Vec<PathBuf>,
}

impl FrameSource {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Path> {
        self.frames.get(index).map(PathBuf::as_path)
    }

    /// Name of the folder the frames came from, e.g. `20240102`
    pub fn folder_name(&self) -> String {
        self.folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Knows where a session's frames live, so the source can be rebuilt from
/// storage whenever playback loops.
#[derive(Debug, Clone)]
pub enum FrameLocator {
    /// Latest dated sub-folder of a camera's snapshot root. Re-selected on
    /// every resolve, so a new day's folder is picked up too.
    LatestDateFolder(PathBuf),
    /// A fixed folder of frames
    Folder(PathBuf),
}

impl FrameLocator {
    pub async fn resolve(&self) -> Result<FrameSource, FrameSourceError> {
        let folder = match self {
            FrameLocator::LatestDateFolder(root) => resolve_latest_date_folder(root).await?,
            FrameLocator::Folder(folder) => folder.clone(),
        };
        let frames = list_frames(&folder).await?;
        Ok(FrameSource { folder, frames })
    }
}

/// Returns the lexicographically last immediate sub-directory of `root`.
pub async fn resolve_latest_date_folder(root: &Path) -> Result<PathBuf, FrameSourceError> {
    let mut folders = list_entries(root, EntryKind::Dir, None)
        .await
        .ok_or_else(|| FrameSourceError::NoFolder(root.to_path_buf()))?;
    folders.sort();
    folders
        .pop()
        .ok_or_else(|| FrameSourceError::NoFolder(root.to_path_buf()))
}

/// Lists the frame files of `folder` in ascending lexicographic order.
/// An empty folder is an error, never an empty success.
pub async fn list_frames(folder: &Path) -> Result<Vec<PathBuf>, FrameSourceError> {
    let mut frames = list_entries(folder, EntryKind::File, Some(FRAME_EXTENSION))
        .await
        .ok_or_else(|| FrameSourceError::NoFolder(folder.to_path_buf()))?;
    if frames.is_empty() {
        return Err(FrameSourceError::NoFrames(folder.to_path_buf()));
    }
    frames.sort();
    Ok(frames)
}

/// Lexicographically last file in `dir` with the given extension, if any.
pub async fn latest_file_with_extension(dir: &Path, extension: &str) -> Option<PathBuf> {
    let mut files = list_entries(dir, EntryKind::File, Some(extension)).await?;
    files.sort();
    files.pop()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Dir,
    File,
}

/// `None` when `dir` cannot be read at all.
async fn list_entries(dir: &Path, kind: EntryKind, extension: Option<&str>) -> Option<Vec<PathBuf>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) => {
            debug!(dir = %dir.display(), error = %err, "Cannot read directory");
            return None;
        }
    };

    let mut found = Vec::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(err) => {
                debug!(dir = %dir.display(), error = %err, "Directory listing interrupted");
                break;
            }
        };
        // Follows symlinks, like a stat on the joined path would
        let Ok(meta) = fs::metadata(entry.path()).await else {
            continue;
        };
        let matches_kind = match kind {
            EntryKind::Dir => meta.is_dir(),
            EntryKind::File => meta.is_file(),
        };
        if !matches_kind {
            continue;
        }
        let path = entry.path();
        if let Some(ext) = extension {
            if path.extension().and_then(|e| e.to_str()) != Some(ext) {
                continue;
            }
        }
        found.push(path);
    }
    Some(found)
}
