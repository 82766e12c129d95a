#![allow(dead_code)]

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use shortform_core::{
    CommandExecutor, ModelSize, ProcessOutput, Result, RunPaths, ShortformError, StageSpec,
    TitleGenerator, Transcriber, TranscriptSegment,
};
use tempfile::TempDir;

/// One executed stage as the fake saw it.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub stage: &'static str,
    pub args: Vec<String>,
    pub inputs: Vec<PathBuf>,
    pub output: Option<PathBuf>,
}

/// Stands in for ffmpeg and ffprobe: writes whatever a stage declares as its
/// output, or fails stages it was told to fail.
#[derive(Default)]
pub struct FakeMedia {
    failures: HashMap<&'static str, i32>,
    chunk_count: usize,
    duration: Option<f64>,
    calls: Mutex<Vec<Invocation>>,
}

impl FakeMedia {
    pub fn new() -> Self {
        Self {
            chunk_count: 1,
            ..Default::default()
        }
    }

    pub fn failing(mut self, stage: &'static str, exit_code: i32) -> Self {
        self.failures.insert(stage, exit_code);
        self
    }

    pub fn with_chunks(mut self, count: usize) -> Self {
        self.chunk_count = count;
        self
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = Some(seconds);
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn stages(&self) -> Vec<&'static str> {
        self.calls().into_iter().map(|c| c.stage).collect()
    }

    pub fn invocation(&self, stage: &str) -> Option<Invocation> {
        self.calls().into_iter().find(|c| c.stage == stage)
    }
}

#[async_trait]
impl CommandExecutor for FakeMedia {
    async fn execute(&self, spec: &StageSpec) -> Result<ProcessOutput> {
        self.calls.lock().unwrap().push(Invocation {
            stage: spec.name,
            args: spec
                .args
                .iter()
                .map(|a| a.to_string_lossy().into_owned())
                .collect(),
            inputs: spec.inputs.clone(),
            output: spec.output.clone(),
        });

        if let Some(code) = self.failures.get(spec.name) {
            return Ok(ProcessOutput {
                exit_code: Some(*code),
                stderr: format!("{} exploded\n", spec.name).into_bytes(),
                ..Default::default()
            });
        }

        let mut stdout = Vec::new();
        match (spec.name, &spec.output) {
            ("chunk", Some(first)) => {
                let dir = first.parent().unwrap_or(Path::new("."));
                for i in 0..self.chunk_count {
                    tokio::fs::write(dir.join(format!("chunk_{i:03}.mp4")), b"chunk").await?;
                }
            }
            (_, Some(output)) => tokio::fs::write(output, b"artifact").await?,
            ("duration", None) => {
                if let Some(duration) = self.duration {
                    stdout = format!("{duration}\n").into_bytes();
                }
            }
            _ => {}
        }

        Ok(ProcessOutput {
            exit_code: Some(0),
            stdout,
            ..Default::default()
        })
    }
}

pub struct FakeTranscriber {
    segments: Vec<TranscriptSegment>,
    fail: bool,
}

impl FakeTranscriber {
    pub fn new(segments: Vec<TranscriptSegment>) -> Arc<Self> {
        Arc::new(Self {
            segments,
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            segments: Vec::new(),
            fail: true,
        })
    }
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, media: &Path, _model: ModelSize) -> Result<Vec<TranscriptSegment>> {
        if self.fail {
            return Err(ShortformError::StageFailed {
                stage: "transcribe".to_string(),
                exit_code: Some(1),
                stderr: "whisper crashed".to_string(),
            });
        }
        assert!(media.exists(), "transcriber got a missing file");
        Ok(self.segments.clone())
    }
}

/// Returns a canned title or an error, and remembers the prompts it saw.
pub struct FakeTitles {
    title: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl FakeTitles {
    pub fn returning(title: &str) -> Arc<Self> {
        Arc::new(Self {
            title: Some(title.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            title: None,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TitleGenerator for FakeTitles {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.title
            .clone()
            .ok_or_else(|| ShortformError::TitleGenerationFailed {
                reason: "rate limited".to_string(),
            })
    }
}

pub fn segment(start: f64, end: f64, text: &str) -> TranscriptSegment {
    TranscriptSegment {
        start,
        end,
        text: text.to_string(),
    }
}

/// Temp workspace with both source videos present.
pub struct Workspace {
    pub dir: TempDir,
    pub paths: RunPaths,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let main_video = dir.path().join("main.mp4");
        let bottom_video = dir.path().join("bottom.mp4");
        std::fs::write(&main_video, b"main").unwrap();
        std::fs::write(&bottom_video, b"bottom").unwrap();

        let paths = RunPaths {
            main_video,
            bottom_video,
            work_dir: dir.path().join("temp"),
            output_dir: dir.path().join("output"),
        };
        Self { dir, paths }
    }
}
