pub mod cache;
pub mod captions;
pub mod config;
pub mod error;
pub mod media;
pub mod orchestrator;
pub mod provider;
pub mod source;
pub mod stage;
pub mod timestamp;
pub mod title;
pub mod transcribe;
pub mod types;

pub use cache::{
    find_video_in_dir, get_config_path, get_download_dir, get_model_dir, get_root_cache_dir,
};
pub use captions::{CaptionSegmenter, CueTiming, render_srt, segment_transcript, write_srt};
pub use config::Settings;
pub use error::{Result, ShortformError};
pub use media::{Encoder, Layout, MediaSettings};
pub use orchestrator::{NoopObserver, Orchestrator, RunObserver};
pub use provider::{Provider, ProviderConfig};
pub use source::download_video;
pub use stage::{
    CommandExecutor, FailurePolicy, ProcessOutput, StageFailure, StageOutcome, StageRunner,
    StageSpec, TokioExecutor,
};
pub use title::{ChatTitleGenerator, TitleGenerator, TitleSettings};
#[cfg(feature = "native")]
pub use transcribe::WhisperNative;
pub use transcribe::{Backend, Transcriber, TranscriptionSettings, WhisperCli};
pub use types::{
    CaptionCue, CaptionTrack, ModelSize, OverlayOutcome, RunConfig, RunPaths, RunReport, RunState,
    TranscriptSegment,
};
