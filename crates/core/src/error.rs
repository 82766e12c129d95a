use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShortformError {
    #[error("Invalid timestamp: {seconds} is not a non-negative finite number of seconds")]
    InvalidTimestamp { seconds: f64 },

    #[error("Malformed caption timestamp `{value}`")]
    MalformedTimestamp { value: String },

    #[error("Invalid transcript segment #{index}: start {start} must be before end {end}")]
    InvalidSegment { index: usize, start: f64, end: f64 },

    #[error("Stage `{stage}` is missing input {}", path.display())]
    MissingInput { stage: String, path: PathBuf },

    #[error("Stage `{stage}` reported success but produced no output at {}", path.display())]
    OutputMissing { stage: String, path: PathBuf },

    #[error("Stage `{stage}` failed ({}){}", describe_exit(*exit_code), stderr_suffix(stderr))]
    StageFailed {
        stage: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Stage `{stage}` failed ({}) and needs a fallback", describe_exit(*exit_code))]
    StageRecoverable {
        stage: String,
        exit_code: Option<i32>,
    },

    #[error("Transcription failed for {}: {reason}", input.display())]
    TranscriptionFailed { input: PathBuf, reason: String },

    #[error("Title generation failed: {reason}")]
    TitleGenerationFailed { reason: String },

    #[error("Download failed for {url}: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("Model download failed for {url}: {reason}")]
    ModelDownloadFailed { url: String, reason: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Missing API key: {env_var} environment variable is not set")]
    MissingApiKey { env_var: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigError(#[from] toml::de::Error),

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),
}

impl ShortformError {
    /// Name of the pipeline stage this error belongs to, if any.
    pub fn stage(&self) -> Option<&str> {
        match self {
            ShortformError::MissingInput { stage, .. }
            | ShortformError::OutputMissing { stage, .. }
            | ShortformError::StageFailed { stage, .. }
            | ShortformError::StageRecoverable { stage, .. } => Some(stage),
            ShortformError::TranscriptionFailed { .. } => Some("transcribe"),
            _ => None,
        }
    }
}

pub fn describe_exit(exit_code: Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("exit code {}", code),
        None => "killed or timed out".to_string(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {}", trimmed)
    }
}

pub type Result<T> = std::result::Result<T, ShortformError>;
