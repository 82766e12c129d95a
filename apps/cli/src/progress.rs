use std::{path::Path, sync::Mutex, time::Duration};

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use shortform_core::{RunObserver, RunState, ShortformError, StageFailure, error::describe_exit};

pub fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(spinner_style) = ProgressStyle::default_spinner()
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        .template("{spinner:.cyan} {msg}")
    {
        pb.set_style(spinner_style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        let whole = d.as_secs();
        format!("{}m {}s", whole / 60, whole % 60)
    }
}

/// One spinner per orchestrator state.
#[derive(Default)]
pub struct SpinnerObserver {
    current: Mutex<Option<ProgressBar>>,
}

impl SpinnerObserver {
    fn replace(&self, next: Option<ProgressBar>) -> Option<ProgressBar> {
        match self.current.lock() {
            Ok(mut current) => std::mem::replace(&mut *current, next),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), next),
        }
    }
}

impl RunObserver for SpinnerObserver {
    fn state_entered(&self, state: RunState) {
        if state == RunState::Done {
            return;
        }
        let previous = self.replace(Some(create_spinner(&format!("{}...", state.label()))));
        if let Some(pb) = previous {
            pb.finish_and_clear();
        }
    }

    fn state_finished(&self, state: RunState, elapsed: Duration) {
        if let Some(pb) = self.replace(None) {
            pb.finish_with_message(format!(
                "{} {} {}",
                style("✓").green().bold(),
                state.label(),
                style(format!("({})", format_duration(elapsed))).dim()
            ));
        }
    }

    fn overlay_fell_back(&self, failure: &StageFailure, used: &Path) {
        if let Some(pb) = self.replace(None) {
            pb.finish_with_message(format!(
                "{} Title overlay skipped ({}), using {}",
                style("!").yellow().bold(),
                describe_exit(failure.exit_code),
                style(used.display()).cyan()
            ));
        }
    }

    fn run_failed(&self, state: RunState, _error: &ShortformError) {
        if let Some(pb) = self.replace(None) {
            pb.abandon_with_message(format!("{} {}", style("✗").red().bold(), state.label()));
        }
    }
}
