use std::{
    num::NonZeroU32,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::{error::Result, stage::StageSpec};

pub const CHUNK_PREFIX: &str = "chunk_";
pub const CHUNK_EXTENSION: &str = "mp4";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoder {
    /// libx264, CRF 23
    #[default]
    Software,
    /// h264_nvenc, 5 Mbit/s
    Nvenc,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Stack as-is, then scale the stack to the target frame.
    #[default]
    Stretch,
    /// Scale both inputs to the target width keeping aspect, then stack.
    Fit,
}

/// How the media stages talk to ffmpeg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaSettings {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub encoder: Encoder,
    pub hwaccel: bool,
    pub layout: Layout,
    pub width: u32,
    pub height: u32,
    pub subtitle_style: Option<String>,
    pub title_font: Option<PathBuf>,
    pub title_font_size: u32,
    pub title_seconds: f64,
    pub stage_timeout_secs: Option<u64>,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            encoder: Encoder::default(),
            hwaccel: false,
            layout: Layout::default(),
            width: 1080,
            height: 1920,
            subtitle_style: None,
            title_font: None,
            title_font_size: 64,
            title_seconds: 4.0,
            stage_timeout_secs: None,
        }
    }
}

impl MediaSettings {
    fn timeout(&self) -> Option<Duration> {
        self.stage_timeout_secs.map(Duration::from_secs)
    }

    fn ffmpeg(&self, name: &'static str) -> StageSpec {
        let spec = StageSpec::new(name, &self.ffmpeg)
            .arg("-y")
            .timeout(self.timeout());
        if self.hwaccel {
            spec.args(["-hwaccel", "cuda"])
        } else {
            spec
        }
    }

    fn video_codec_args(&self) -> [&'static str; 6] {
        match self.encoder {
            Encoder::Software => ["-c:v", "libx264", "-crf", "23", "-preset", "fast"],
            Encoder::Nvenc => ["-c:v", "h264_nvenc", "-b:v", "5M", "-preset", "fast"],
        }
    }

    /// Render a subtitle file into the picture.
    pub fn burn_subtitles(&self, video: &Path, subtitles: &Path, output: &Path) -> StageSpec {
        let mut filter = format!("subtitles=filename={}", escape_filter_path(subtitles));
        if let Some(style) = &self.subtitle_style {
            filter.push_str(&format!(":force_style={}", escape_filter_value(style)));
        }

        self.ffmpeg("burn")
            .arg("-i")
            .input(video)
            .requires(subtitles)
            .args(["-vf", filter.as_str()])
            .args(self.video_codec_args())
            .args(["-c:a", "aac"])
            .output(output)
    }

    /// Stack `top` over `bottom` into one vertical frame.
    pub fn composite(&self, top: &Path, bottom: &Path, output: &Path) -> StageSpec {
        let (w, h) = (self.width, self.height);
        let filter = match self.layout {
            Layout::Stretch => format!("[0:v][1:v]vstack=inputs=2,scale={w}:{h}"),
            Layout::Fit => {
                format!("[0:v]scale={w}:-2[v0];[1:v]scale={w}:-2[v1];[v0][v1]vstack=inputs=2")
            }
        };

        self.ffmpeg("composite")
            .arg("-i")
            .input(top)
            .arg("-i")
            .input(bottom)
            .args(["-filter_complex", filter.as_str()])
            .args(self.video_codec_args())
            .args(["-c:a", "aac"])
            .output(output)
    }

    /// Draw `title` near the top of the frame for the first few seconds.
    /// Recoverable: a failure here falls back to the untitled video.
    pub fn overlay_title(&self, video: &Path, title: &str, output: &Path) -> StageSpec {
        let mut filter = format!("drawtext=text={}", escape_drawtext(title));
        if let Some(font) = &self.title_font {
            filter.push_str(&format!(":fontfile={}", escape_filter_path(font)));
        }
        filter.push_str(&format!(
            ":x=(w-tw)/2:y=50:fontsize={}:fontcolor=white:box=1:boxcolor=black@0.5:boxborderw=20:enable={}",
            self.title_font_size,
            escape_filter_value(&format!("between(t,0,{})", self.title_seconds)),
        ));

        self.ffmpeg("overlay")
            .arg("-i")
            .input(video)
            .args(["-vf", filter.as_str()])
            .args(self.video_codec_args())
            .args(["-c:a", "aac"])
            .output(output)
            .recoverable()
    }

    /// Cut `video` into `chunk_length`-second pieces without re-encoding.
    pub fn split_chunks(&self, video: &Path, chunk_length: NonZeroU32, dir: &Path) -> StageSpec {
        let pattern = dir.join(format!("{CHUNK_PREFIX}%03d.{CHUNK_EXTENSION}"));
        StageSpec::new("chunk", &self.ffmpeg)
            .arg("-y")
            .timeout(self.timeout())
            .arg("-i")
            .input(video)
            .args(["-c", "copy", "-map", "0", "-f", "segment"])
            .arg("-segment_time")
            .arg(chunk_length.to_string())
            .args(["-reset_timestamps", "1"])
            .arg(pattern)
            .produces(dir.join(format!("{CHUNK_PREFIX}000.{CHUNK_EXTENSION}")))
    }

    /// Ask ffprobe for the container duration; read it with [`parse_duration`].
    pub fn query_duration(&self, video: &Path) -> StageSpec {
        StageSpec::new("duration", &self.ffprobe)
            .timeout(self.timeout())
            .args(["-v", "error", "-show_entries", "format=duration"])
            .args(["-of", "default=noprint_wrappers=1:nokey=1"])
            .input(video)
    }

    /// 16 kHz mono PCM, the input whisper expects.
    pub fn extract_audio(&self, video: &Path, audio: &Path) -> StageSpec {
        StageSpec::new("extract-audio", &self.ffmpeg)
            .arg("-y")
            .timeout(self.timeout())
            .arg("-i")
            .input(video)
            .args(["-vn", "-acodec", "pcm_s16le", "-ar", "16000", "-ac", "1"])
            .output(audio)
    }
}

pub fn parse_duration(stdout: &[u8]) -> Option<f64> {
    let seconds: f64 = String::from_utf8_lossy(stdout).trim().parse().ok()?;
    (seconds.is_finite() && seconds > 0.0).then_some(seconds)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkSpan {
    pub start: f64,
    pub end: f64,
}

/// The spans a chunk set must cover: `ceil(duration / length)` back-to-back
/// pieces, all `length` long except possibly the last.
pub fn plan_chunks(duration: f64, length: NonZeroU32) -> Vec<ChunkSpan> {
    if !duration.is_finite() || duration <= 0.0 {
        return Vec::new();
    }
    let length = f64::from(length.get());
    let count = (duration / length).ceil() as usize;
    (0..count)
        .map(|i| {
            let start = i as f64 * length;
            ChunkSpan {
                start,
                end: (start + length).min(duration),
            }
        })
        .collect()
}

/// Chunk files in `dir`, in numeric order.
pub async fn collect_chunks(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut numbered = Vec::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let number = name
            .strip_prefix(CHUNK_PREFIX)
            .and_then(|rest| rest.strip_suffix(&format!(".{CHUNK_EXTENSION}")))
            .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|digits| digits.parse::<u64>().ok());
        if let Some(number) = number {
            numbered.push((number, path));
        }
    }
    numbered.sort();
    Ok(numbered.into_iter().map(|(_, path)| path).collect())
}

/// Escape a value for a filter's `key=value:key=value` option list.
fn escape_option_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 8);
    for ch in value.chars() {
        if matches!(ch, '\\' | '\'' | ':') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Escape a filter description for the filtergraph parser.
fn escape_filtergraph(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 8);
    for ch in value.chars() {
        if matches!(ch, '\\' | '\'' | '[' | ']' | ',' | ';') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Escape arbitrary text so it stays one option value inside a `-vf` or
/// `-filter_complex` argument.
pub fn escape_filter_value(value: &str) -> String {
    escape_filtergraph(&escape_option_value(value))
}

pub fn escape_filter_path(path: &Path) -> String {
    escape_filter_value(&path.to_string_lossy())
}

/// Escape text for `drawtext`, which additionally expands `\` and `%`.
/// Whitespace runs, newlines included, collapse to single spaces.
pub fn escape_drawtext(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut expanded = String::with_capacity(collapsed.len() + 4);
    for ch in collapsed.chars() {
        if matches!(ch, '\\' | '%') {
            expanded.push('\\');
        }
        expanded.push(ch);
    }
    escape_filter_value(&expanded)
}
