use std::{
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
};

use serde::{Deserialize, Serialize};

/// One time-stamped span of recognized speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// One on-screen caption unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionCue {
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptionTrack {
    pub cues: Vec<CaptionCue>,
}

impl CaptionTrack {
    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    /// All cue texts joined by single spaces, in cue order.
    pub fn joined_text(&self) -> String {
        self.cues
            .iter()
            .map(|cue| cue.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Whisper model size selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelSize {
    #[default]
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl ModelSize {
    pub fn name(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "tiny",
            ModelSize::Base => "base",
            ModelSize::Small => "small",
            ModelSize::Medium => "medium",
            ModelSize::Large => "large",
        }
    }
}

const DEFAULT_CHUNK_SECONDS: NonZeroU32 = NonZeroU32::new(60).unwrap();
const DEFAULT_WORDS_PER_CUE: NonZeroUsize = NonZeroUsize::new(4).unwrap();

/// Toggles and sizes for one assembly run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub include_subtitles: bool,
    pub title_overlay: bool,
    pub chunking: bool,
    pub chunk_length_seconds: NonZeroU32,
    pub words_per_cue: NonZeroUsize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            include_subtitles: true,
            title_overlay: true,
            chunking: true,
            chunk_length_seconds: DEFAULT_CHUNK_SECONDS,
            words_per_cue: DEFAULT_WORDS_PER_CUE,
        }
    }
}

/// Source and destination locations for one run.
///
/// Runs that execute concurrently must use disjoint `work_dir` and
/// `output_dir` values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunPaths {
    pub main_video: PathBuf,
    pub bottom_video: PathBuf,
    pub work_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl RunPaths {
    pub fn subtitles_file(&self) -> PathBuf {
        self.work_dir.join("main_subtitles.srt")
    }

    pub fn captioned_video(&self) -> PathBuf {
        self.work_dir.join("main_subtitled.mp4")
    }

    pub fn composited_video(&self) -> PathBuf {
        self.work_dir.join("vertical_merged.mp4")
    }

    pub fn titled_video(&self) -> PathBuf {
        self.output_dir.join("final_with_title.mp4")
    }

    pub fn chunks_dir(&self) -> PathBuf {
        self.output_dir.join("chunks")
    }
}

/// Orchestrator states, in the only order they can be visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RunState {
    Transcribing,
    Segmenting,
    BurningSubtitles,
    Compositing,
    OverlayingTitle,
    Chunking,
    Done,
}

impl RunState {
    pub fn label(&self) -> &'static str {
        match self {
            RunState::Transcribing => "Transcribing",
            RunState::Segmenting => "Segmenting captions",
            RunState::BurningSubtitles => "Burning subtitles",
            RunState::Compositing => "Stacking videos",
            RunState::OverlayingTitle => "Overlaying title",
            RunState::Chunking => "Splitting into chunks",
            RunState::Done => "Done",
        }
    }
}

/// What happened at the title overlay step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OverlayOutcome {
    Disabled,
    Applied,
    FellBack { exit_code: Option<i32>, used: PathBuf },
}

/// Artifacts and history of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: uuid::Uuid,
    pub states: Vec<RunState>,
    pub cue_count: usize,
    pub subtitles: Option<PathBuf>,
    pub captioned_video: Option<PathBuf>,
    pub composited_video: PathBuf,
    pub final_video: PathBuf,
    pub title: Option<String>,
    pub overlay: OverlayOutcome,
    pub chunks: Vec<PathBuf>,
}
