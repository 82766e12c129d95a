use std::{
    num::{NonZeroU32, NonZeroUsize},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use console::style;
use shortform_core::{
    Backend, CaptionSegmenter, ChatTitleGenerator, ModelSize, Orchestrator, OverlayOutcome,
    Provider, RunPaths, RunReport, Settings, ShortformError, StageRunner, TokioExecutor,
    Transcriber, WhisperCli, download_video, error::describe_exit, find_video_in_dir,
    get_download_dir, write_srt,
};

use crate::progress::{SpinnerObserver, create_spinner};

mod logging;
mod progress;

/// CLI wrapper for Provider enum (needed for clap ValueEnum)
#[derive(Clone, Copy, ValueEnum)]
enum CliProvider {
    Openai,
    Grok,
    Gemini,
}

impl From<CliProvider> for Provider {
    fn from(cli: CliProvider) -> Self {
        match cli {
            CliProvider::Openai => Provider::Openai,
            CliProvider::Grok => Provider::Grok,
            CliProvider::Gemini => Provider::Gemini,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum CliModel {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl From<CliModel> for ModelSize {
    fn from(cli: CliModel) -> Self {
        match cli {
            CliModel::Tiny => ModelSize::Tiny,
            CliModel::Base => ModelSize::Base,
            CliModel::Small => ModelSize::Small,
            CliModel::Medium => ModelSize::Medium,
            CliModel::Large => ModelSize::Large,
        }
    }
}

#[derive(Parser)]
#[command(name = "shortform", version)]
#[command(
    about = "Transcribe, caption and stack videos into short-form clips with ffmpeg and Whisper"
)]
struct Cli {
    /// Settings file (defaults to ~/.config/shortform/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a captioned, stacked, titled short from two videos
    Run(RunArgs),

    /// Only transcribe a video and write its captions as SRT
    Captions {
        video: PathBuf,

        /// Output file (defaults to the video path with an .srt extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long)]
        words_per_cue: Option<NonZeroUsize>,

        #[arg(long)]
        model: Option<CliModel>,
    },

    /// Download a source video with yt-dlp
    Fetch {
        url: String,

        #[arg(long, default_value = "videos")]
        dir: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Speaker video, shown on top and transcribed
    #[arg(long = "main")]
    main_video: PathBuf,

    /// Filler video, shown underneath
    #[arg(long = "bottom")]
    bottom_video: PathBuf,

    #[arg(long, default_value = "temp")]
    work_dir: PathBuf,

    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    #[arg(long)]
    no_subtitles: bool,

    #[arg(long)]
    no_title: bool,

    #[arg(long)]
    no_chunks: bool,

    /// Seconds per output chunk
    #[arg(long)]
    chunk_length: Option<NonZeroU32>,

    #[arg(long)]
    words_per_cue: Option<NonZeroUsize>,

    #[arg(long)]
    model: Option<CliModel>,

    /// AI provider for title generation
    #[arg(short, long)]
    provider: Option<CliProvider>,
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let (path, settings) = match path {
        Some(path) => (path.to_path_buf(), Settings::load(path)),
        None => {
            let path = Settings::default_path();
            let settings = Settings::load_or_default(&path);
            (path, settings)
        }
    };
    let settings =
        settings.with_context(|| format!("Failed to load config from {}", path.display()))?;
    tracing::info!(path = %path.display(), "Loaded settings");
    Ok(settings.with_env_overrides())
}

fn build_transcriber(
    settings: &Settings,
    runner: &StageRunner,
    work_dir: &Path,
) -> Result<Arc<dyn Transcriber>> {
    tracing::info!(
        backend = ?settings.transcription.backend,
        model = settings.transcription.model.name(),
        "Using transcription backend"
    );
    match settings.transcription.backend {
        Backend::Cli => Ok(Arc::new(
            WhisperCli::new(runner.clone(), &settings.transcription.whisper, work_dir)
                .with_timeout(settings.transcription.timeout_secs),
        )),
        #[cfg(feature = "native")]
        Backend::Native => {
            let model_dir =
                shortform_core::get_model_dir(&shortform_core::get_root_cache_dir());
            Ok(Arc::new(shortform_core::WhisperNative::new(
                runner.clone(),
                settings.media.clone(),
                model_dir,
                work_dir,
            )))
        }
        #[cfg(not(feature = "native"))]
        Backend::Native => anyhow::bail!(
            "the native whisper backend is not compiled in; rebuild with `--features native`"
        ),
    }
}

async fn run(args: RunArgs, mut settings: Settings) -> Result<()> {
    let config = &mut settings.run;
    config.include_subtitles &= !args.no_subtitles;
    config.title_overlay &= !args.no_title;
    config.chunking &= !args.no_chunks;
    if let Some(length) = args.chunk_length {
        config.chunk_length_seconds = length;
    }
    if let Some(words) = args.words_per_cue {
        config.words_per_cue = words;
    }
    if let Some(model) = args.model {
        settings.transcription.model = model.into();
    }
    if let Some(provider) = args.provider {
        settings.title.provider = provider.into();
    }

    let paths = RunPaths {
        main_video: args.main_video,
        bottom_video: args.bottom_video,
        work_dir: args.work_dir,
        output_dir: args.output_dir,
    };

    println!(
        "\n{}  {}\n",
        style("shortform").cyan().bold(),
        style("Short-form Assembler").dim()
    );

    let runner = StageRunner::new(Arc::new(TokioExecutor));
    let transcriber = build_transcriber(&settings, &runner, &paths.work_dir)?;
    let mut orchestrator = Orchestrator::new(runner, transcriber)
        .with_media(settings.media.clone())
        .with_model(settings.transcription.model)
        .with_cue_timing(settings.captions.timing)
        .with_fallback_title(settings.title.fallback.clone())
        .with_observer(Arc::new(SpinnerObserver::default()));

    if settings.run.title_overlay {
        let provider = settings.title.provider;
        let api_key = match settings.title.api_key.clone() {
            Some(key) => Ok(key),
            None => provider.api_key_from_env(),
        };
        match api_key {
            Ok(key) => {
                orchestrator = orchestrator.with_title_generator(Arc::new(
                    ChatTitleGenerator::from_settings(&settings.title, key),
                ));
            }
            Err(e) => println!(
                "{} {}; using the fallback title",
                style("!").yellow().bold(),
                e
            ),
        }
    }

    let report = orchestrator.run(&settings.run, &paths).await?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &RunReport) {
    if let OverlayOutcome::FellBack { exit_code, used } = &report.overlay {
        println!(
            "\n{} Title overlay failed ({}); final video is {}",
            style("!").yellow().bold(),
            describe_exit(*exit_code),
            style(used.display()).cyan()
        );
    }
    if let Some(title) = &report.title {
        println!("\n{} {}", style("Title:").dim(), style(title).yellow());
    }
    println!(
        "\n{} {}",
        style("Saved:").dim(),
        style(report.final_video.display()).cyan()
    );
    if !report.chunks.is_empty() {
        println!(
            "{} {} chunks in {}",
            style("Split:").dim(),
            report.chunks.len(),
            style(
                report
                    .chunks
                    .first()
                    .and_then(|c| c.parent())
                    .unwrap_or(Path::new("."))
                    .display()
            )
            .cyan()
        );
    }
    println!("{} {}\n", style("Run:").dim(), style(report.run_id).dim());
}

async fn captions(
    video: PathBuf,
    output: Option<PathBuf>,
    words_per_cue: Option<NonZeroUsize>,
    model: Option<CliModel>,
    settings: Settings,
) -> Result<()> {
    let output = output.unwrap_or_else(|| video.with_extension("srt"));
    let words_per_cue = words_per_cue.unwrap_or(settings.run.words_per_cue);
    let model = model.map(ModelSize::from).unwrap_or(settings.transcription.model);

    let work_dir = std::env::temp_dir().join("shortform");
    let runner = StageRunner::new(Arc::new(TokioExecutor));
    let transcriber = build_transcriber(&settings, &runner, &work_dir)?;

    let spinner = create_spinner(&format!("Transcribing with Whisper ({})...", model.name()));
    let segments = match transcriber.transcribe(&video, model).await {
        Ok(segments) => segments,
        Err(e) => {
            spinner.finish_and_clear();
            return Err(e.into());
        }
    };
    spinner.finish_with_message(format!(
        "{} Transcribed: {} segments",
        style("✓").green().bold(),
        segments.len()
    ));

    let track = CaptionSegmenter::new(words_per_cue)
        .with_timing(settings.captions.timing)
        .segment(&segments)?;
    write_srt(&track, &output).await?;

    println!(
        "{} {} cues written to {}",
        style("✓").green().bold(),
        track.len(),
        style(output.display()).cyan()
    );
    Ok(())
}

async fn fetch(url: String, dir: PathBuf) -> Result<()> {
    let target = get_download_dir(&dir, &url);
    if let Some(cached) = find_video_in_dir(&target) {
        println!(
            "{} Downloaded {} {}",
            style("✓").green().bold(),
            style(cached.display()).cyan(),
            style("(cached)").dim()
        );
        return Ok(());
    }

    let runner = StageRunner::new(Arc::new(TokioExecutor));
    let spinner = create_spinner("Downloading video...");
    match download_video(&runner, &url, &target).await {
        Ok(video) => {
            spinner.finish_with_message(format!(
                "{} Downloaded: {}",
                style("✓").green().bold(),
                style(video.display()).cyan()
            ));
            Ok(())
        }
        Err(e) => {
            spinner.finish_and_clear();
            Err(e.into())
        }
    }
}

fn report_error(err: &anyhow::Error) {
    let label = style("Error:").red().bold();
    let Some(e) = err.downcast_ref::<ShortformError>() else {
        eprintln!("{} {:#}", label, err);
        return;
    };

    match e {
        ShortformError::StageFailed {
            stage,
            exit_code,
            stderr,
        } => {
            eprintln!("{} stage `{}` failed ({})", label, stage, describe_exit(*exit_code));
            if !stderr.is_empty() {
                eprintln!("{}", style(stderr).dim());
            }
        }
        ShortformError::StageRecoverable { stage, exit_code } => {
            eprintln!("{} stage `{}` failed ({})", label, stage, describe_exit(*exit_code));
        }
        other => match other.stage() {
            Some(stage) => eprintln!("{} stage `{}`: {}", label, stage, other),
            None => eprintln!("{} {:#}", label, err),
        },
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let result = match load_settings(cli.config.as_deref()) {
        Ok(settings) => match cli.command {
            Command::Run(args) => run(args, settings).await,
            Command::Captions {
                video,
                output,
                words_per_cue,
                model,
            } => captions(video, output, words_per_cue, model, settings).await,
            Command::Fetch { url, dir } => fetch(url, dir).await,
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        report_error(&e);
        std::process::exit(1);
    }
}
