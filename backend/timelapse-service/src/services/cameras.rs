//! Camera discovery
//!
//! There is no registry to persist: a camera exists if it has a folder
//! under the timelapse root.

use std::path::Path;

use tokio::fs;
use tracing::{debug, warn};

use crate::error::{AppError, Result};

/// Camera ids double as folder names, so only a conservative character set
/// is accepted. This also keeps ids from escaping the storage roots.
pub fn is_valid_camera_id(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

pub fn validate_camera_id(id: &str) -> Result<&str> {
    if is_valid_camera_id(id) {
        Ok(id)
    } else {
        Err(AppError::BadRequest(format!("invalid camera id '{id}'")))
    }
}

/// Sorted names of the camera folders under `timelapse_root`.
/// A missing root means no cameras, not an error.
pub async fn list_cameras(timelapse_root: &Path) -> Result<Vec<String>> {
    let mut entries = match fs::read_dir(timelapse_root).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            warn!(root = %timelapse_root.display(), "Timelapse root does not exist");
            return Ok(Vec::new());
        }
        Err(err) => return Err(err.into()),
    };

    let mut cameras = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let is_dir = fs::metadata(entry.path())
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_valid_camera_id(&name) {
            debug!(folder = %name, "Ignoring folder with unsupported camera name");
            continue;
        }
        cameras.push(name);
    }
    cameras.sort();
    Ok(cameras)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_camera_id_validation() {
        for ok in ["porch", "cam-01", "garage_2", "back.yard"] {
            assert!(is_valid_camera_id(ok), "{ok}");
        }
        for bad in ["", ".", "..", "a/b", "a\\b", "cam 1", "<script>"] {
            assert!(!is_valid_camera_id(bad), "{bad}");
        }
        assert!(matches!(
            validate_camera_id(".."),
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_list_cameras_sorted_dirs_only() {
        let dir = TempDir::new().unwrap();
        for cam in ["porch", "garage", "driveway"] {
            std::fs::create_dir_all(dir.path().join(cam)).unwrap();
        }
        std::fs::write(dir.path().join("stray.mp4"), b"x").unwrap();
        std::fs::create_dir_all(dir.path().join("bad name")).unwrap();

        let cameras = list_cameras(dir.path()).await.unwrap();
        assert_eq!(cameras, vec!["driveway", "garage", "porch"]);
    }

    #[tokio::test]
    async fn test_missing_root_lists_nothing() {
        let dir = TempDir::new().unwrap();
        let cameras = list_cameras(&dir.path().join("absent")).await.unwrap();
        assert!(cameras.is_empty());
    }
}
