use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::{
    error::{Result, ShortformError},
    stage::{StageRunner, StageSpec},
    types::{ModelSize, TranscriptSegment},
};

/// Speech-to-text over an audio or video file.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, media: &Path, model: ModelSize) -> Result<Vec<TranscriptSegment>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// The `whisper` command-line program.
    #[default]
    Cli,
    /// whisper.cpp in-process (cargo feature `native`).
    Native,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionSettings {
    pub backend: Backend,
    pub whisper: PathBuf,
    pub model: ModelSize,
    pub timeout_secs: Option<u64>,
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            whisper: PathBuf::from("whisper"),
            model: ModelSize::default(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WhisperJson {
    segments: Vec<TranscriptSegment>,
}

/// Runs the `whisper` program and reads the JSON it leaves in `output_dir`.
pub struct WhisperCli {
    runner: StageRunner,
    program: PathBuf,
    output_dir: PathBuf,
    timeout: Option<std::time::Duration>,
}

impl WhisperCli {
    pub fn new(
        runner: StageRunner,
        program: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            program: program.into(),
            output_dir: output_dir.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout_secs: Option<u64>) -> Self {
        self.timeout = timeout_secs.map(std::time::Duration::from_secs);
        self
    }

    fn json_path(&self, media: &Path) -> PathBuf {
        let stem = media
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "transcript".to_string());
        self.output_dir.join(format!("{}.json", stem))
    }
}

#[async_trait]
impl Transcriber for WhisperCli {
    async fn transcribe(&self, media: &Path, model: ModelSize) -> Result<Vec<TranscriptSegment>> {
        fs::create_dir_all(&self.output_dir).await?;
        let json_path = self.json_path(media);

        let spec = StageSpec::new("transcribe", &self.program)
            .input(media)
            .args(["--model", model.name()])
            .args(["--output_format", "json"])
            .arg("--output_dir")
            .arg(&self.output_dir)
            .produces(&json_path)
            .timeout(self.timeout);
        self.runner.run(&spec).await?.completed()?;

        load_whisper_json(&json_path).await
    }
}

/// Segments from a whisper JSON transcript; other fields are ignored.
pub async fn load_whisper_json(path: &Path) -> Result<Vec<TranscriptSegment>> {
    let json_content = fs::read_to_string(path).await?;
    let transcript: WhisperJson = serde_json::from_str(&json_content)?;
    Ok(transcript.segments)
}

pub(crate) fn transcription_failed(media: &Path, reason: impl ToString) -> ShortformError {
    ShortformError::TranscriptionFailed {
        input: media.to_path_buf(),
        reason: reason.to_string(),
    }
}

#[cfg(feature = "native")]
pub use native::WhisperNative;

#[cfg(feature = "native")]
mod native {
    use std::path::{Path, PathBuf};

    use async_trait::async_trait;
    use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

    use super::{Transcriber, transcription_failed};
    use crate::{
        error::{Result, ShortformError},
        media::MediaSettings,
        stage::{StageRunner, StageSpec},
        types::{ModelSize, TranscriptSegment},
    };

    fn model_file(model: ModelSize) -> &'static str {
        match model {
            ModelSize::Tiny => "ggml-tiny.bin",
            ModelSize::Base => "ggml-base.bin",
            ModelSize::Small => "ggml-small.bin",
            ModelSize::Medium => "ggml-medium-q5_0.bin",
            ModelSize::Large => "ggml-large-v3.bin",
        }
    }

    /// whisper.cpp via `whisper-rs`, fed 16 kHz mono audio extracted by ffmpeg.
    pub struct WhisperNative {
        runner: StageRunner,
        media: MediaSettings,
        model_dir: PathBuf,
        work_dir: PathBuf,
    }

    impl WhisperNative {
        pub fn new(
            runner: StageRunner,
            media: MediaSettings,
            model_dir: impl Into<PathBuf>,
            work_dir: impl Into<PathBuf>,
        ) -> Self {
            Self {
                runner,
                media,
                model_dir: model_dir.into(),
                work_dir: work_dir.into(),
            }
        }

        /// Download the ggml model on first use.
        pub async fn ensure_model(&self, model: ModelSize) -> Result<PathBuf> {
            let name = model_file(model);
            let download_url = format!(
                "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/{}",
                name
            );
            tokio::fs::create_dir_all(&self.model_dir).await?;

            let model_path = self.model_dir.join(name);
            if !model_path.exists() {
                let spec = StageSpec::new("model-download", "curl")
                    .args(["-L", "--fail", &download_url, "-o"])
                    .output(&model_path);
                self.runner
                    .run(&spec)
                    .await
                    .and_then(|outcome| outcome.completed())
                    .map_err(|e| ShortformError::ModelDownloadFailed {
                        url: download_url.clone(),
                        reason: e.to_string(),
                    })?;
            }

            Ok(model_path)
        }
    }

    #[async_trait]
    impl Transcriber for WhisperNative {
        async fn transcribe(
            &self,
            media: &Path,
            model: ModelSize,
        ) -> Result<Vec<TranscriptSegment>> {
            let model_path = self.ensure_model(model).await?;

            tokio::fs::create_dir_all(&self.work_dir).await?;
            let audio_path = self.work_dir.join("audio.wav");
            let spec = self.media.extract_audio(media, &audio_path);
            self.runner.run(&spec).await?.completed()?;

            let media = media.to_path_buf();
            tokio::task::spawn_blocking(move || run_whisper(&model_path, &audio_path))
                .await
                .map_err(|e| transcription_failed(&media, e))?
        }
    }

    fn run_whisper(model_path: &Path, audio_path: &Path) -> Result<Vec<TranscriptSegment>> {
        let fail = |reason: String| transcription_failed(audio_path, reason);

        let mut reader = hound::WavReader::open(audio_path).map_err(|e| fail(e.to_string()))?;
        let samples: Vec<f32> = reader
            .samples::<i16>()
            .map(|s| s.map(|s| s as f32 / i16::MAX as f32))
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| fail(e.to_string()))?;

        let ctx_params = WhisperContextParameters {
            use_gpu: cfg!(feature = "cuda"),
            flash_attn: true,
            ..Default::default()
        };
        let model_path_str = model_path
            .to_str()
            .ok_or_else(|| fail(format!("model path {} is not UTF-8", model_path.display())))?;
        let ctx = WhisperContext::new_with_params(model_path_str, ctx_params)
            .map_err(|e| fail(format!("failed to load model: {}", e)))?;

        let params = FullParams::new(SamplingStrategy::Greedy { best_of: 5 });
        let mut state = ctx
            .create_state()
            .map_err(|e| fail(format!("failed to create state: {}", e)))?;
        state
            .full(params, &samples)
            .map_err(|e| fail(format!("failed to run model: {}", e)))?;

        let mut segments = Vec::new();
        for segment in state.as_iter() {
            let Ok(text) = segment.to_str() else {
                continue;
            };
            if text.trim().is_empty() {
                continue;
            }
            // whisper.cpp timestamps are in centiseconds
            segments.push(TranscriptSegment {
                start: segment.start_timestamp() as f64 / 100.0,
                end: segment.end_timestamp() as f64 / 100.0,
                text: text.to_string(),
            });
        }

        Ok(segments)
    }
}
