use std::{
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{Result, ShortformError, describe_exit};

/// Whether a failing stage aborts the run or asks for a fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    Fatal,
    Recoverable,
}

/// One external-tool invocation: program, ordered arguments, the artifacts it
/// reads and the artifact it promises to write.
#[derive(Debug, Clone)]
pub struct StageSpec {
    pub name: &'static str,
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub inputs: Vec<PathBuf>,
    pub output: Option<PathBuf>,
    pub policy: FailurePolicy,
    pub timeout: Option<Duration>,
}

impl StageSpec {
    pub fn new(name: &'static str, program: impl Into<PathBuf>) -> Self {
        Self {
            name,
            program: program.into(),
            args: Vec::new(),
            inputs: Vec::new(),
            output: None,
            policy: FailurePolicy::Fatal,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Append a path argument and declare it as a required input.
    pub fn input(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.args.push(path.clone().into_os_string());
        self.inputs.push(path);
        self
    }

    /// Declare a required input that is referenced indirectly, e.g. from
    /// inside a filter expression.
    pub fn requires(mut self, path: impl Into<PathBuf>) -> Self {
        self.inputs.push(path.into());
        self
    }

    /// Append a path argument and declare it as the stage's output.
    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.args.push(path.clone().into_os_string());
        self.output = Some(path);
        self
    }

    /// Declare the output without adding an argument.
    pub fn produces(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    pub fn recoverable(mut self) -> Self {
        self.policy = FailurePolicy::Recoverable;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Shell-like rendering for logs.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(|part| part.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of one finished (or abandoned) process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was killed by a signal or timed out.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }
}

/// Spawns the process behind a stage.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, spec: &StageSpec) -> Result<ProcessOutput>;
}

/// Runs stages as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioExecutor;

#[async_trait]
impl CommandExecutor for TokioExecutor {
    async fn execute(&self, spec: &StageSpec) -> Result<ProcessOutput> {
        let child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match spec.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(output) => output?,
                // The child is dropped with the future and killed.
                Err(_) => {
                    return Ok(ProcessOutput {
                        exit_code: None,
                        timed_out: true,
                        ..Default::default()
                    });
                }
            },
            None => child.wait_with_output().await?,
        };

        Ok(ProcessOutput {
            exit_code: output.status.code(),
            timed_out: false,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// A recoverable stage that failed; the caller substitutes a fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub stage: &'static str,
    pub exit_code: Option<i32>,
    pub stderr: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Completed(ProcessOutput),
    Fallback(StageFailure),
}

impl StageOutcome {
    /// Treat a fallback as an error, for callers without a fallback path.
    pub fn completed(self) -> Result<ProcessOutput> {
        match self {
            StageOutcome::Completed(output) => Ok(output),
            StageOutcome::Fallback(failure) => Err(ShortformError::StageRecoverable {
                stage: failure.stage.to_string(),
                exit_code: failure.exit_code,
            }),
        }
    }
}

/// Checks inputs, clears the declared output, spawns exactly one process,
/// classifies the result and checks that the output was written. No retries.
#[derive(Clone)]
pub struct StageRunner {
    executor: Arc<dyn CommandExecutor>,
}

impl StageRunner {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    pub async fn run(&self, spec: &StageSpec) -> Result<StageOutcome> {
        for input in &spec.inputs {
            if !path_exists(input).await {
                return Err(ShortformError::MissingInput {
                    stage: spec.name.to_string(),
                    path: input.clone(),
                });
            }
        }

        // A file left by an earlier run must not pass the output check.
        if let Some(path) = &spec.output {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {
                    tracing::debug!(stage = spec.name, path = %path.display(), "Removed stale output")
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        tracing::debug!(stage = spec.name, command = %spec.command_line(), "Running stage");
        let output = match self.executor.execute(spec).await {
            Ok(output) => output,
            Err(e) if spec.policy == FailurePolicy::Recoverable => {
                tracing::warn!(stage = spec.name, error = %e, "Stage could not run, falling back");
                return Ok(StageOutcome::Fallback(StageFailure {
                    stage: spec.name,
                    exit_code: None,
                    stderr: e.to_string(),
                }));
            }
            Err(e) => return Err(e),
        };

        if !output.success() {
            let stderr = tail(&String::from_utf8_lossy(&output.stderr), 20);
            return match spec.policy {
                FailurePolicy::Fatal => Err(ShortformError::StageFailed {
                    stage: spec.name.to_string(),
                    exit_code: output.exit_code,
                    stderr,
                }),
                FailurePolicy::Recoverable => {
                    tracing::warn!(
                        stage = spec.name,
                        "Stage failed ({}), falling back",
                        describe_exit(output.exit_code)
                    );
                    Ok(StageOutcome::Fallback(StageFailure {
                        stage: spec.name,
                        exit_code: output.exit_code,
                        stderr,
                    }))
                }
            };
        }

        if let Some(path) = &spec.output
            && !path_exists(path).await
        {
            return Err(ShortformError::OutputMissing {
                stage: spec.name.to_string(),
                path: path.clone(),
            });
        }

        Ok(StageOutcome::Completed(output))
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Last `lines` lines of a process's stderr.
fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.trim_end().lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Answers every stage with a fixed exit code, optionally writing the
    /// declared output first.
    struct Scripted {
        exit_code: Option<i32>,
        write_output: bool,
        calls: Mutex<usize>,
    }

    impl Scripted {
        fn new(exit_code: Option<i32>, write_output: bool) -> Arc<Self> {
            Arc::new(Self {
                exit_code,
                write_output,
                calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl CommandExecutor for Scripted {
        async fn execute(&self, spec: &StageSpec) -> Result<ProcessOutput> {
            *self.calls.lock().unwrap() += 1;
            if self.write_output
                && let Some(out) = &spec.output
            {
                tokio::fs::write(out, b"artifact").await?;
            }
            Ok(ProcessOutput {
                exit_code: self.exit_code,
                stderr: b"line one\nboom\n".to_vec(),
                ..Default::default()
            })
        }
    }

    fn spec_in(dir: &Path) -> StageSpec {
        let input = dir.join("in.mp4");
        std::fs::write(&input, b"video").unwrap();
        StageSpec::new("burn", "ffmpeg")
            .arg("-i")
            .input(&input)
            .output(dir.join("out.mp4"))
    }

    #[test]
    fn builder_keeps_argument_order_and_declarations() {
        let spec = StageSpec::new("composite", "ffmpeg")
            .arg("-y")
            .arg("-i")
            .input("top.mp4")
            .arg("-i")
            .input("bottom.mp4")
            .args(["-c:a", "aac"])
            .output("out.mp4");

        assert_eq!(
            spec.command_line(),
            "ffmpeg -y -i top.mp4 -i bottom.mp4 -c:a aac out.mp4"
        );
        assert_eq!(
            spec.inputs,
            vec![PathBuf::from("top.mp4"), PathBuf::from("bottom.mp4")]
        );
        assert_eq!(spec.output, Some(PathBuf::from("out.mp4")));
        assert_eq!(spec.policy, FailurePolicy::Fatal);
    }

    #[tokio::test]
    async fn missing_input_is_reported_before_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Scripted::new(Some(0), true);
        let runner = StageRunner::new(executor.clone());
        let spec = StageSpec::new("burn", "ffmpeg")
            .input(dir.path().join("absent.mp4"))
            .output(dir.path().join("out.mp4"));

        let err = runner.run(&spec).await.unwrap_err();
        assert!(
            matches!(err, ShortformError::MissingInput { ref path, .. } if path.ends_with("absent.mp4"))
        );
        assert_eq!(*executor.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn fatal_failure_carries_stage_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let runner = StageRunner::new(Scripted::new(Some(1), false));

        let err = runner.run(&spec_in(dir.path())).await.unwrap_err();
        match err {
            ShortformError::StageFailed {
                stage,
                exit_code,
                stderr,
            } => {
                assert_eq!(stage, "burn");
                assert_eq!(exit_code, Some(1));
                assert_eq!(stderr, "line one\nboom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn recoverable_failure_returns_fallback_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Scripted::new(Some(234), false);
        let runner = StageRunner::new(executor.clone());

        let outcome = runner
            .run(&spec_in(dir.path()).recoverable())
            .await
            .unwrap();
        let StageOutcome::Fallback(failure) = outcome.clone() else {
            panic!("expected fallback, got {outcome:?}");
        };
        assert_eq!(failure.stage, "burn");
        assert_eq!(failure.exit_code, Some(234));
        assert_eq!(*executor.calls.lock().unwrap(), 1);

        assert!(matches!(
            outcome.completed(),
            Err(ShortformError::StageRecoverable { exit_code: Some(234), .. })
        ));
    }

    #[tokio::test]
    async fn success_without_output_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = StageRunner::new(Scripted::new(Some(0), false));

        let err = runner.run(&spec_in(dir.path())).await.unwrap_err();
        assert!(matches!(err, ShortformError::OutputMissing { .. }));
    }

    #[tokio::test]
    async fn success_with_output_completes() {
        let dir = tempfile::tempdir().unwrap();
        let runner = StageRunner::new(Scripted::new(Some(0), true));

        let outcome = runner.run(&spec_in(dir.path())).await.unwrap();
        assert!(matches!(outcome, StageOutcome::Completed(_)));
        assert!(dir.path().join("out.mp4").exists());
    }

    #[tokio::test]
    async fn output_from_an_earlier_run_does_not_count() {
        let dir = tempfile::tempdir().unwrap();
        let spec = spec_in(dir.path());
        std::fs::write(dir.path().join("out.mp4"), b"stale").unwrap();
        let runner = StageRunner::new(Scripted::new(Some(0), false));

        let err = runner.run(&spec).await.unwrap_err();
        assert!(
            matches!(err, ShortformError::OutputMissing { ref path, .. } if path.ends_with("out.mp4"))
        );
        assert!(!dir.path().join("out.mp4").exists());
    }

    /// Fails before any process starts, like a missing binary.
    struct Unspawnable;

    #[async_trait]
    impl CommandExecutor for Unspawnable {
        async fn execute(&self, _spec: &StageSpec) -> Result<ProcessOutput> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no such program").into())
        }
    }

    #[tokio::test]
    async fn spawn_error_on_recoverable_stage_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let runner = StageRunner::new(Arc::new(Unspawnable));

        let outcome = runner
            .run(&spec_in(dir.path()).recoverable())
            .await
            .unwrap();
        let StageOutcome::Fallback(failure) = outcome else {
            panic!("expected fallback, got {outcome:?}");
        };
        assert_eq!(failure.stage, "burn");
        assert_eq!(failure.exit_code, None);
        assert!(failure.stderr.contains("no such program"));
    }

    #[tokio::test]
    async fn spawn_error_on_fatal_stage_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let runner = StageRunner::new(Arc::new(Unspawnable));

        let err = runner.run(&spec_in(dir.path())).await.unwrap_err();
        assert!(matches!(err, ShortformError::IoError(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn tokio_executor_reports_exit_codes() {
        let ok = TokioExecutor
            .execute(&StageSpec::new("true", "true"))
            .await
            .unwrap();
        assert!(ok.success());

        let failed = TokioExecutor
            .execute(&StageSpec::new("shell", "sh").args(["-c", "echo nope >&2; exit 3"]))
            .await
            .unwrap();
        assert_eq!(failed.exit_code, Some(3));
        assert_eq!(String::from_utf8_lossy(&failed.stderr).trim(), "nope");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn tokio_executor_times_out_slow_processes() {
        let spec = StageSpec::new("overlay", "sleep")
            .arg("5")
            .timeout(Some(Duration::from_millis(100)));
        let output = TokioExecutor.execute(&spec).await.unwrap();
        assert!(output.timed_out);
        assert_eq!(output.exit_code, None);

        let runner = StageRunner::new(Arc::new(TokioExecutor));
        let err = runner.run(&spec).await.unwrap_err();
        assert!(matches!(err, ShortformError::StageFailed { exit_code: None, .. }));
    }

    #[test]
    fn tail_keeps_last_lines() {
        assert_eq!(tail("a\nb\nc\n", 2), "b\nc");
        assert_eq!(tail("", 2), "");
    }
}
