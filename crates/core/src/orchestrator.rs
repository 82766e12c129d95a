use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::fs;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    captions::{CaptionSegmenter, CueTiming, write_srt},
    error::{Result, ShortformError},
    media::{MediaSettings, collect_chunks, parse_duration, plan_chunks},
    stage::{StageFailure, StageOutcome, StageRunner},
    title::{DEFAULT_FALLBACK_TITLE, TitleGenerator},
    transcribe::{Transcriber, transcription_failed},
    types::{CaptionTrack, ModelSize, OverlayOutcome, RunConfig, RunPaths, RunReport, RunState},
};

/// Progress callbacks for front ends. Every method defaults to a no-op.
pub trait RunObserver: Send + Sync {
    fn state_entered(&self, _state: RunState) {}

    fn state_finished(&self, _state: RunState, _elapsed: Duration) {}

    fn overlay_fell_back(&self, _failure: &StageFailure, _used: &Path) {}

    /// The run aborted while in `state`. No further callbacks follow.
    fn run_failed(&self, _state: RunState, _error: &ShortformError) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

/// Tracks the visited states of one run and enforces forward-only movement.
struct Progress<'a> {
    observer: &'a dyn RunObserver,
    states: Vec<RunState>,
    current: Option<(RunState, Instant)>,
}

impl<'a> Progress<'a> {
    fn new(observer: &'a dyn RunObserver) -> Self {
        Self {
            observer,
            states: Vec::new(),
            current: None,
        }
    }

    fn enter(&mut self, state: RunState) {
        self.finish();
        debug_assert!(
            self.states.last().is_none_or(|last| *last < state),
            "run moved backwards into {state:?}"
        );
        tracing::info!(state = state.label(), "Entering state");
        self.observer.state_entered(state);
        self.states.push(state);
        self.current = Some((state, Instant::now()));
    }

    fn finish(&mut self) {
        if let Some((state, started)) = self.current.take() {
            self.observer.state_finished(state, started.elapsed());
        }
    }

    fn fail(&mut self, error: &ShortformError) {
        if let Some((state, _)) = self.current.take() {
            tracing::info!(state = state.label(), error = %error, "Run failed");
            self.observer.run_failed(state, error);
        }
    }
}

/// Drives one assembly run from the main and bottom videos to the final
/// artifact and its chunks.
///
/// Stages run strictly one after another. A fatal failure aborts the run and
/// leaves every artifact produced so far on disk.
pub struct Orchestrator {
    runner: StageRunner,
    transcriber: Arc<dyn Transcriber>,
    titles: Option<Arc<dyn TitleGenerator>>,
    media: MediaSettings,
    model: ModelSize,
    cue_timing: CueTiming,
    fallback_title: String,
    observer: Arc<dyn RunObserver>,
}

impl Orchestrator {
    pub fn new(runner: StageRunner, transcriber: Arc<dyn Transcriber>) -> Self {
        Self {
            runner,
            transcriber,
            titles: None,
            media: MediaSettings::default(),
            model: ModelSize::default(),
            cue_timing: CueTiming::default(),
            fallback_title: DEFAULT_FALLBACK_TITLE.to_string(),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Without a generator every overlay uses the fallback title.
    pub fn with_title_generator(mut self, titles: Arc<dyn TitleGenerator>) -> Self {
        self.titles = Some(titles);
        self
    }

    pub fn with_media(mut self, media: MediaSettings) -> Self {
        self.media = media;
        self
    }

    pub fn with_model(mut self, model: ModelSize) -> Self {
        self.model = model;
        self
    }

    pub fn with_cue_timing(mut self, timing: CueTiming) -> Self {
        self.cue_timing = timing;
        self
    }

    pub fn with_fallback_title(mut self, title: impl Into<String>) -> Self {
        self.fallback_title = title.into();
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub async fn run(&self, config: &RunConfig, paths: &RunPaths) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run", %run_id);
        let mut progress = Progress::new(self.observer.as_ref());
        let result = self
            .run_inner(run_id, config, paths, &mut progress)
            .instrument(span)
            .await;
        if let Err(e) = &result {
            progress.fail(e);
        }
        result
    }

    async fn run_inner(
        &self,
        run_id: Uuid,
        config: &RunConfig,
        paths: &RunPaths,
        progress: &mut Progress<'_>,
    ) -> Result<RunReport> {
        fs::create_dir_all(&paths.work_dir).await?;
        fs::create_dir_all(&paths.output_dir).await?;

        progress.enter(RunState::Transcribing);
        let segments = self
            .transcriber
            .transcribe(&paths.main_video, self.model)
            .await
            .map_err(|e| match e {
                ShortformError::TranscriptionFailed { .. } => e,
                other => transcription_failed(&paths.main_video, other),
            })?;
        tracing::debug!(segments = segments.len(), "Transcription finished");

        progress.enter(RunState::Segmenting);
        let track = CaptionSegmenter::new(config.words_per_cue)
            .with_timing(self.cue_timing)
            .segment(&segments)?;
        let subtitles = if config.include_subtitles {
            let path = paths.subtitles_file();
            write_srt(&track, &path).await?;
            Some(path)
        } else {
            None
        };

        let mut current = paths.main_video.clone();
        let mut captioned_video = None;
        if let Some(subtitles) = &subtitles {
            progress.enter(RunState::BurningSubtitles);
            let output = paths.captioned_video();
            let spec = self.media.burn_subtitles(&current, subtitles, &output);
            self.runner.run(&spec).await?.completed()?;
            captioned_video = Some(output.clone());
            current = output;
        }

        progress.enter(RunState::Compositing);
        let composited_video = paths.composited_video();
        let spec = self
            .media
            .composite(&current, &paths.bottom_video, &composited_video);
        self.runner.run(&spec).await?.completed()?;

        let mut final_video = composited_video.clone();
        let mut title = None;
        let mut overlay = OverlayOutcome::Disabled;
        if config.title_overlay {
            progress.enter(RunState::OverlayingTitle);
            let text = self.title_text(&track).await;
            let output = paths.titled_video();
            let spec = self.media.overlay_title(&composited_video, &text, &output);
            overlay = match self.runner.run(&spec).await? {
                StageOutcome::Completed(_) => {
                    final_video = output;
                    OverlayOutcome::Applied
                }
                StageOutcome::Fallback(failure) => {
                    tracing::warn!(
                        used = %composited_video.display(),
                        "Title overlay skipped, keeping the composited video"
                    );
                    self.observer.overlay_fell_back(&failure, &composited_video);
                    OverlayOutcome::FellBack {
                        exit_code: failure.exit_code,
                        used: composited_video.clone(),
                    }
                }
            };
            title = Some(text);
        }

        let mut chunks = Vec::new();
        if config.chunking {
            progress.enter(RunState::Chunking);
            chunks = self.split(&final_video, config, paths).await?;
        }

        progress.enter(RunState::Done);
        progress.finish();
        tracing::info!(final_video = %final_video.display(), chunks = chunks.len(), "Run finished");

        Ok(RunReport {
            run_id,
            states: std::mem::take(&mut progress.states),
            cue_count: track.len(),
            subtitles,
            captioned_video,
            composited_video,
            final_video,
            title,
            overlay,
            chunks,
        })
    }

    /// Title from the generator, or the fallback when there is no generator,
    /// no caption text, or the generator fails.
    async fn title_text(&self, track: &CaptionTrack) -> String {
        let prompt = track.joined_text();
        let Some(titles) = &self.titles else {
            return self.fallback_title.clone();
        };
        if prompt.trim().is_empty() {
            tracing::info!("No caption text to title, using fallback");
            return self.fallback_title.clone();
        }

        match titles.generate(&prompt).await {
            Ok(title) => title,
            Err(e) => {
                tracing::warn!(error = %e, "Title generation failed, using fallback");
                self.fallback_title.clone()
            }
        }
    }

    async fn split(
        &self,
        video: &Path,
        config: &RunConfig,
        paths: &RunPaths,
    ) -> Result<Vec<PathBuf>> {
        let dir = paths.chunks_dir();
        fs::create_dir_all(&dir).await?;
        // Leftovers from an earlier, longer run would be collected as ours.
        for stale in collect_chunks(&dir).await? {
            fs::remove_file(&stale).await?;
        }

        let spec = self
            .media
            .split_chunks(video, config.chunk_length_seconds, &dir);
        self.runner.run(&spec).await?.completed()?;
        let chunks = collect_chunks(&dir).await?;

        match self.runner.run(&self.media.query_duration(video)).await {
            Ok(StageOutcome::Completed(output)) => match parse_duration(&output.stdout) {
                Some(duration) => {
                    let planned = plan_chunks(duration, config.chunk_length_seconds);
                    if planned.len() != chunks.len() {
                        tracing::warn!(
                            duration,
                            expected = planned.len(),
                            produced = chunks.len(),
                            "Chunk count does not match the video duration"
                        );
                    }
                }
                None => tracing::debug!("ffprobe printed no duration"),
            },
            Ok(StageOutcome::Fallback(_)) => {}
            Err(e) => tracing::debug!(error = %e, "Duration query failed"),
        }

        Ok(chunks)
    }
}
