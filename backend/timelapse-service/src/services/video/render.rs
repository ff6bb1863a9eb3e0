/// Render trigger
///
/// Shells out to an external encoder (ffmpeg) to turn the current snapshot
/// folder into an MP4. The encoder writes to a unique temp file that is
/// renamed onto the per-camera output once it is complete, so a download
/// still reading the previous render keeps its own copy.
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::fs;
use tokio::process::Command;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::metrics;
use crate::services::frames;

/// Bytes of encoder stderr kept for the log line on failure
const STDERR_TAIL_BYTES: usize = 2048;

static RENDER_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Clone, Debug)]
pub struct RenderTrigger {
    ffmpeg_path: String,
    output_dir: PathBuf,
    frame_rate: u32,
    timeout: Duration,
}

/// Scratch files of one render run
struct RenderScratch {
    list: PathBuf,
    video: PathBuf,
}

impl RenderScratch {
    fn new(output_dir: &Path, camera: &str) -> Self {
        let tag = format!(
            "{camera}.{}-{}",
            std::process::id(),
            RENDER_SEQ.fetch_add(1, Ordering::Relaxed)
        );
        Self {
            list: output_dir.join(format!("{tag}.ffconcat")),
            video: output_dir.join(format!("{tag}.tmp.mp4")),
        }
    }

    /// Removes whatever is left; the video is already gone after a rename
    async fn discard(&self) {
        for path in [&self.list, &self.video] {
            if let Err(err) = fs::remove_file(path).await {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(file = %path.display(), error = %err, "Failed to remove render scratch file");
                }
            }
        }
    }
}

impl RenderTrigger {
    pub fn new(
        ffmpeg_path: impl Into<String>,
        output_dir: impl Into<PathBuf>,
        frame_rate: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            output_dir: output_dir.into(),
            frame_rate,
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.ffmpeg_path.clone(),
            config.render_folder.clone(),
            config.render_fps,
            Duration::from_secs(config.render_timeout_secs),
        )
    }

    /// Fixed output location for a camera; replaced by every render
    pub fn output_path(&self, camera: &str) -> PathBuf {
        self.output_dir.join(format!("{camera}.mp4"))
    }

    /// Concat-demuxer playlist holding every frame for `1 / frame_rate`
    /// seconds. Frames are listed explicitly so the folder name is never
    /// interpreted as a pattern and the order matches streaming.
    pub fn concat_list(&self, frames: &[PathBuf]) -> String {
        let duration = 1.0 / f64::from(self.frame_rate);
        let mut list = String::from("ffconcat version 1.0\n");
        for frame in frames {
            list.push_str(&format!("file {}\n", quote_concat_path(frame)));
            list.push_str(&format!("duration {duration:.6}\n"));
        }
        // The demuxer ignores the last duration unless the frame repeats
        if let Some(last) = frames.last() {
            list.push_str(&format!("file {}\n", quote_concat_path(last)));
        }
        list
    }

    pub fn encoder_args(&self, concat_list: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            concat_list.to_string_lossy().into_owned(),
            "-r".to_string(),
            self.frame_rate.to_string(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            output.to_string_lossy().into_owned(),
        ]
    }

    /// Encodes `frames_folder` into this camera's output file and returns
    /// its path. Any encoder failure, including a run that exits cleanly
    /// without producing video, maps to `AppError::Encoder`.
    pub async fn render(&self, camera: &str, frames_folder: &Path) -> Result<PathBuf> {
        let frames_folder = fs::canonicalize(frames_folder).await.map_err(|err| {
            debug!(camera = %camera, folder = %frames_folder.display(), error = %err, "Snapshot folder unavailable");
            AppError::no_frames_for(camera)
        })?;
        let frames = frames::list_frames(&frames_folder).await.map_err(|err| {
            info!(camera = %camera, error = %err, "Nothing to render");
            AppError::no_frames_for(camera)
        })?;
        fs::create_dir_all(&self.output_dir).await?;
        let output = self.output_path(camera);

        info!(
            camera = %camera,
            folder = %frames_folder.display(),
            frames = frames.len(),
            output = %output.display(),
            "Rendering timelapse"
        );

        let started = Instant::now();
        let scratch = RenderScratch::new(&self.output_dir, camera);
        let result = self.render_into(camera, &frames, &scratch, &output).await;
        metrics::render_finished(result.is_ok());
        scratch.discard().await;
        result?;

        info!(
            camera = %camera,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Timelapse rendered"
        );
        Ok(output)
    }

    async fn render_into(
        &self,
        camera: &str,
        frames: &[PathBuf],
        scratch: &RenderScratch,
        output: &Path,
    ) -> Result<()> {
        fs::write(&scratch.list, self.concat_list(frames)).await?;
        self.run_encoder(camera, &scratch.list, &scratch.video).await?;

        let size = match fs::metadata(&scratch.video).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };
        if size == 0 {
            error!(camera = %camera, encoder = %self.ffmpeg_path, "Encoder produced no output");
            return Err(AppError::Encoder("encoder produced no output".into()));
        }

        // Readers of the previous render keep the replaced file open
        fs::rename(&scratch.video, output).await?;
        Ok(())
    }

    async fn run_encoder(&self, camera: &str, concat_list: &Path, output: &Path) -> Result<()> {
        // kill_on_drop reaps the encoder if the timeout below fires
        let mut command = Command::new(&self.ffmpeg_path);
        command
            .args(self.encoder_args(concat_list, output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let finished = match time::timeout(self.timeout, command.output()).await {
            Ok(Ok(finished)) => finished,
            Ok(Err(err)) => {
                error!(camera = %camera, encoder = %self.ffmpeg_path, error = %err, "Failed to start encoder");
                return Err(AppError::Encoder(format!(
                    "failed to start {}: {err}",
                    self.ffmpeg_path
                )));
            }
            Err(_) => {
                error!(camera = %camera, timeout_secs = self.timeout.as_secs(), "Encoder timed out");
                return Err(AppError::Encoder(format!(
                    "encoder timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        if !finished.status.success() {
            let stderr = String::from_utf8_lossy(&finished.stderr);
            let tail_start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
            let tail = stderr.get(tail_start..).unwrap_or(&*stderr);
            error!(camera = %camera, status = %finished.status, stderr = %tail, "Encoder failed");
            return Err(AppError::Encoder(format!(
                "encoder exited with {}",
                finished.status
            )));
        }
        Ok(())
    }
}

/// Single-quoted path for an ffconcat `file` line; `'` becomes `'\''`
fn quote_concat_path(path: &Path) -> String {
    format!("'{}'", path.to_string_lossy().replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::video::send_file;
    use actix_web::body::to_bytes;
    use actix_web::test::TestRequest;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn frames_dir(dir: &TempDir, day: &str) -> PathBuf {
        let folder = dir.path().join("snapshots/porch").join(day);
        std::fs::create_dir_all(&folder).unwrap();
        for i in 1..=3 {
            std::fs::write(folder.join(format!("f{i:03}.jpg")), b"jpeg").unwrap();
        }
        folder
    }

    /// Stand-in encoder that runs `body` with `$out` set to its last argument
    fn fake_encoder(dir: &TempDir, name: &str, body: &str) -> String {
        let path = dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\nfor out; do :; done\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn trigger(encoder: &str, dir: &TempDir) -> RenderTrigger {
        RenderTrigger::new(encoder, dir.path().join("renders"), 30, Duration::from_secs(5))
    }

    #[test]
    fn test_encoder_args() {
        let trigger = RenderTrigger::new("ffmpeg", "/renders", 30, Duration::from_secs(5));
        let output = trigger.output_path("porch");
        assert_eq!(output, PathBuf::from("/renders/porch.mp4"));

        let args = trigger.encoder_args(Path::new("/renders/porch.1-0.ffconcat"), &output);
        assert_eq!(args.first().map(String::as_str), Some("-y"));
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[input - 4..input], ["-f", "concat", "-safe", "0"]);
        assert_eq!(args[input + 1], "/renders/porch.1-0.ffconcat");
        assert_eq!(args.last().map(String::as_str), Some("/renders/porch.mp4"));
        let rate = args.iter().position(|a| a == "-r").unwrap();
        assert_eq!(args[rate + 1], "30");
    }

    #[test]
    fn test_concat_list_keeps_order_and_quotes_paths() {
        let trigger = RenderTrigger::new("ffmpeg", "/renders", 10, Duration::from_secs(5));
        let frames = vec![
            PathBuf::from("/snap/it's [1]/f001.jpg"),
            PathBuf::from("/snap/it's [1]/f002.jpg"),
        ];
        let list = trigger.concat_list(&frames);
        assert_eq!(
            list,
            "ffconcat version 1.0\n\
             file '/snap/it'\\''s [1]/f001.jpg'\n\
             duration 0.100000\n\
             file '/snap/it'\\''s [1]/f002.jpg'\n\
             duration 0.100000\n\
             file '/snap/it'\\''s [1]/f002.jpg'\n"
        );
    }

    #[tokio::test]
    async fn test_successful_render_replaces_output_and_cleans_scratch() {
        let dir = TempDir::new().unwrap();
        let folder = frames_dir(&dir, "20240102");
        let encoder = fake_encoder(&dir, "encoder.sh", "printf 'rendered' > \"$out\"");

        let output = trigger(&encoder, &dir).render("porch", &folder).await.unwrap();
        assert_eq!(output, dir.path().join("renders/porch.mp4"));
        assert_eq!(std::fs::read(&output).unwrap(), b"rendered");

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("renders"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(leftovers, vec!["porch.mp4"]);
    }

    #[tokio::test]
    async fn test_folder_with_pattern_characters_renders() {
        let dir = TempDir::new().unwrap();
        let folder = frames_dir(&dir, "day[1]*?");
        // Fails unless the playlist names the real frame files
        let encoder = fake_encoder(
            &dir,
            "encoder.sh",
            "list=\"$7\"\ngrep -qF 'day[1]*?/f003.jpg' \"$list\" || exit 1\nprintf 'ok' > \"$out\"",
        );

        let output = trigger(&encoder, &dir).render("porch", &folder).await.unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"ok");
    }

    #[tokio::test]
    async fn test_rerender_does_not_disturb_file_being_sent() {
        let dir = TempDir::new().unwrap();
        let folder = frames_dir(&dir, "20240102");
        let first = fake_encoder(&dir, "first.sh", "head -c 1000 /dev/zero | tr '\\0' a > \"$out\"");
        let second = fake_encoder(&dir, "second.sh", ": > \"$out\"\nprintf 'second' > \"$out\"");

        let output = trigger(&first, &dir).render("porch", &folder).await.unwrap();
        let req = TestRequest::default().to_http_request();
        let resp = send_file(&req, &output, Some("porch_20240102.mp4")).await.unwrap();

        // A second download renders while the first body is still unread
        trigger(&second, &dir).render("porch", &folder).await.unwrap();

        let body = to_bytes(resp.into_body()).await.unwrap();
        assert_eq!(body.len(), 1000);
        assert!(body.iter().all(|b| *b == b'a'));
        assert_eq!(std::fs::read(&output).unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_encoder_without_output_is_encoder_error() {
        let dir = TempDir::new().unwrap();
        let folder = frames_dir(&dir, "20240102");

        let err = trigger("true", &dir).render("porch", &folder).await.unwrap_err();
        assert!(matches!(err, AppError::Encoder(_)));
        assert!(!dir.path().join("renders/porch.mp4").exists());
    }

    #[tokio::test]
    async fn test_failing_encoder_keeps_previous_render() {
        let dir = TempDir::new().unwrap();
        let folder = frames_dir(&dir, "20240102");
        let good = fake_encoder(&dir, "good.sh", "printf 'previous' > \"$out\"");
        let bad = fake_encoder(&dir, "bad.sh", "printf 'partial' > \"$out\"\nexit 1");

        let output = trigger(&good, &dir).render("porch", &folder).await.unwrap();
        let err = trigger(&bad, &dir).render("porch", &folder).await.unwrap_err();
        assert!(matches!(err, AppError::Encoder(_)));
        assert_eq!(std::fs::read(&output).unwrap(), b"previous");
        assert_eq!(std::fs::read_dir(dir.path().join("renders")).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_failing_encoder_is_encoder_error() {
        let dir = TempDir::new().unwrap();
        let folder = frames_dir(&dir, "20240102");

        let err = trigger("false", &dir).render("porch", &folder).await.unwrap_err();
        assert!(matches!(err, AppError::Encoder(_)));
    }

    #[tokio::test]
    async fn test_missing_encoder_binary_is_encoder_error() {
        let dir = TempDir::new().unwrap();
        let folder = frames_dir(&dir, "20240102");

        let err = trigger("/nonexistent/encoder-binary", &dir)
            .render("porch", &folder)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Encoder(_)));
    }

    #[tokio::test]
    async fn test_no_frames_is_not_found_before_encoding() {
        let dir = TempDir::new().unwrap();
        let empty = dir.path().join("snapshots/porch/20240102");
        std::fs::create_dir_all(&empty).unwrap();

        let err = trigger("false", &dir).render("porch", &empty).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
