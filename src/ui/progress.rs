use std::time::Duration;

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::executor::ExecutorEvent;
use crate::step::StepStatus;
use crate::ui::icons::{BOX, CHECK, CLOCK, CROSS, GLOBE, RUNNING};

/// Terminal UI for `scaffold run`, rendered via `indicatif`.
///
/// A spinner tracks the session (boot, mount, dev server) and a bar counts
/// queued commands. Command output is printed above both bars.
pub struct RunUI {
    multi: MultiProgress,
    session_bar: ProgressBar,
    queue_bar: ProgressBar,
    verbose: bool,
}

impl RunUI {
    pub fn new(total_commands: u64, verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let session_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        let session_bar = multi.add(ProgressBar::new_spinner());
        session_bar.set_style(session_style);
        session_bar.set_prefix("Sandbox");
        session_bar.enable_steady_tick(Duration::from_millis(120));

        let queue_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░");
        let queue_bar = multi.add(ProgressBar::new(total_commands));
        queue_bar.set_style(queue_style);
        queue_bar.set_prefix("Commands");

        Self {
            multi,
            session_bar,
            queue_bar,
            verbose,
        }
    }

    /// Print a line via `MultiProgress`, falling back to `eprintln!`.
    pub fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    pub fn session_status(&self, msg: impl Into<String>) {
        self.session_bar
            .set_message(format!("{}{}", BOX, msg.into()));
    }

    pub fn handle_event(&self, event: &ExecutorEvent) {
        match event {
            ExecutorEvent::Started { step_id, command } => {
                self.queue_bar
                    .set_message(format!("#{} {}", step_id, style(command).yellow()));
                self.print_line(format!("{}{}", RUNNING, style(command).bold()));
            }
            ExecutorEvent::Output { line, .. } => {
                if self.verbose {
                    self.print_line(format!("    {} {}", style("│").dim(), line));
                }
            }
            ExecutorEvent::Finished {
                step_id,
                status,
                exit_code,
                error,
            } => {
                self.queue_bar.inc(1);
                let detail = match (error, exit_code) {
                    (Some(e), _) => e.clone(),
                    (None, Some(code)) => format!("exit {}", code),
                    (None, None) => String::new(),
                };
                let icon = if *status == StepStatus::Completed {
                    CHECK
                } else {
                    CROSS
                };
                self.print_line(format!(
                    "{}step {} {}",
                    icon,
                    step_id,
                    style(format!("({})", detail)).dim()
                ));
            }
        }
    }

    pub fn dev_server_ready(&self, url: &str) {
        self.session_bar.finish_with_message(format!(
            "{}dev server ready at {}",
            GLOBE,
            style(url).green().bold()
        ));
    }

    pub fn dev_server_timed_out(&self, timeout: Duration) {
        self.session_bar.finish_with_message(format!(
            "{}dev server did not report a URL within {}s",
            CLOCK,
            timeout.as_secs()
        ));
    }

    pub fn dev_server_failed(&self, reason: &str) {
        self.session_bar
            .finish_with_message(format!("{}{}", CROSS, style(reason).red()));
    }

    pub fn finish_commands(&self, completed: usize, failed: usize) {
        let msg = if failed == 0 {
            format!("{} completed", style(completed).green())
        } else {
            format!(
                "{} completed, {} failed",
                style(completed).green(),
                style(failed).red()
            )
        };
        self.queue_bar.finish_with_message(msg);
    }

    pub fn finish_session(&self, msg: impl Into<String>) {
        self.session_bar.finish_with_message(msg.into());
    }
}
