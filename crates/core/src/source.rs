use std::path::{Path, PathBuf};

use crate::{
    error::{Result, ShortformError},
    stage::{StageRunner, StageSpec},
};

/// Download a video from URL using yt-dlp
pub async fn download_video(runner: &StageRunner, url: &str, dir: &Path) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let output_template = dir.join("video.%(ext)s");
    let spec = StageSpec::new("download", "yt-dlp")
        .arg(url)
        .args(["--print", "after_move:filepath"])
        .args(["-f", "bestvideo+bestaudio/best"])
        .args(["--merge-output-format", "mp4"])
        .arg("-o")
        .arg(&output_template);

    let output = runner
        .run(&spec)
        .await
        .and_then(|outcome| outcome.completed())
        .map_err(|e| ShortformError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let stdout_str = String::from_utf8_lossy(output.stdout.as_slice());
    let filepath = stdout_str.trim().lines().last().unwrap_or_default().trim();
    if filepath.is_empty() {
        return Err(ShortformError::DownloadFailed {
            url: url.to_string(),
            reason: "yt-dlp did not report a file path".to_string(),
        });
    }

    let path = PathBuf::from(filepath);
    if !path.exists() {
        return Err(ShortformError::OutputMissing {
            stage: spec.name.to_string(),
            path,
        });
    }
    Ok(path)
}
