//! Terminal output: live progress lines, the result dump, and the digest.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

use site_tester::progress::{ProgressEventKind, ProgressReceiver};
use site_tester::{Channel, ChannelResult, CheckResult, RunReport, Verdict};

use crate::config::OutputOptions;

const RESET: &str = "\x1b[0m";
const BG_GREEN: &str = "\x1b[42m";
const BG_RED: &str = "\x1b[41m";
const BG_MAGENTA: &str = "\x1b[45m";
const BG_CYAN: &str = "\x1b[46m";
const GREY: &str = "\x1b[90m";

/// ANSI styling, or plain text when color is off.
#[derive(Debug, Clone, Copy)]
pub struct Painter {
    color: bool,
}

impl Painter {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.color {
            format!("{code}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    /// ` OK ` / ` NOT OK! ` for tested channels.
    pub fn badge(&self, verdict: Verdict) -> Option<String> {
        match verdict {
            Verdict::Passed => Some(self.paint(BG_GREEN, " OK ")),
            Verdict::Failed => Some(self.paint(BG_RED, " NOT OK! ")),
            Verdict::Untested => None,
        }
    }

    fn marker(&self, channel: Channel) -> String {
        let code = match channel {
            Channel::Api => BG_MAGENTA,
            Channel::Site => BG_CYAN,
        };
        if self.color {
            self.paint(code, " ")
        } else {
            String::new()
        }
    }
}

/// `1.`, `12.` right-aligned in a three-column field.
fn ordinal(index: usize) -> String {
    format!("{:>3}", format!("{}.", index + 1))
}

/// `2`, `1.5`, `0.25`: seconds the way a person writes them.
fn seconds(ms: u64) -> String {
    if ms % 1000 == 0 {
        (ms / 1000).to_string()
    } else {
        (ms as f64 / 1000.0).to_string()
    }
}

/// The description of a channel shown while it runs and after its badge.
pub fn channel_text(channel: Channel, url: &str, wait_ms: u64) -> String {
    match channel {
        Channel::Api => format!("[api]  \"{url}\""),
        Channel::Site if wait_ms > 0 => format!("[site] \"{url}\" (wait {}s)", seconds(wait_ms)),
        Channel::Site => format!("[site] \"{url}\""),
    }
}

/// Turns progress events into terminal lines.
pub struct ProgressPrinter {
    painter: Painter,
    current: Option<String>,
    spinner: Option<ProgressBar>,
    animate: bool,
}

impl ProgressPrinter {
    pub fn new(painter: Painter) -> Self {
        use std::io::IsTerminal;
        Self {
            painter,
            current: None,
            spinner: None,
            animate: std::io::stdout().is_terminal(),
        }
    }

    /// Lines to print for `event`, in order. `ChannelStarted` prints nothing;
    /// its text comes back with the badge when the channel finishes.
    pub fn lines(&mut self, event: &ProgressEventKind) -> Vec<String> {
        match event {
            ProgressEventKind::TargetStarted { index, name } => {
                vec![format!("{}   testing {name}", ordinal(*index))]
            }
            ProgressEventKind::TargetSkipped { index, name } => {
                vec![format!("{}   skipping {name}", ordinal(*index)), String::new()]
            }
            ProgressEventKind::ChannelStarted {
                channel,
                url,
                wait_ms,
                ..
            } => {
                self.current = Some(channel_text(*channel, url, *wait_ms));
                Vec::new()
            }
            ProgressEventKind::ChannelFinished {
                channel,
                verdict,
                error,
                ..
            } => {
                let text = self.current.take().unwrap_or_default();
                let badge = self.painter.badge(*verdict).unwrap_or_default();
                let mut out = vec![format!(" {badge}{} {text}", self.painter.marker(*channel))];
                if let Some(error) = error {
                    out.push(format!("      {}", self.painter.paint(GREY, error)));
                }
                out
            }
            ProgressEventKind::TargetFinished { .. } => vec![String::new()],
            _ => Vec::new(),
        }
    }

    /// Print `event`, with a spinner on the line of a channel in flight.
    pub fn handle(&mut self, event: &ProgressEventKind) {
        if matches!(event, ProgressEventKind::ChannelFinished { .. }) {
            if let Some(pb) = self.spinner.take() {
                pb.finish_and_clear();
            }
        }

        for line in self.lines(event) {
            println!("{line}");
        }

        if let (ProgressEventKind::ChannelStarted { .. }, Some(text), true) =
            (event, &self.current, self.animate)
        {
            let pb = ProgressBar::new_spinner();
            pb.set_draw_target(ProgressDrawTarget::stdout());
            if let Ok(style) = ProgressStyle::with_template(" {spinner} {msg}") {
                pb.set_style(style);
            }
            pb.set_message(text.clone());
            pb.enable_steady_tick(Duration::from_millis(120));
            self.spinner = Some(pb);
        }
    }
}

/// Consume progress events until the run's sender is dropped.
pub async fn print_progress(mut rx: ProgressReceiver, painter: Painter) {
    let mut printer = ProgressPrinter::new(painter);
    loop {
        match rx.recv().await {
            Ok(event) => printer.handle(&event.event),
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "progress printer fell behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// One line of the `Result:` dump: tested channels as booleans.
#[derive(Debug, Serialize)]
pub struct ResultSummary<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    api: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    site: Option<bool>,
}

impl<'a> From<&'a CheckResult> for ResultSummary<'a> {
    fn from(result: &'a CheckResult) -> Self {
        let tested = |r: &Option<ChannelResult>| r.as_ref().and_then(|r| r.verdict.as_bool());
        Self {
            name: &result.name,
            skipped: result.skipped,
            api: tested(&result.api),
            site: tested(&result.site),
        }
    }
}

/// Print the result dump (stdout) and the failure digest (stderr).
/// `--json` prints the full report instead of the boolean view.
pub fn print_report(report: &RunReport, output: &OutputOptions) -> anyhow::Result<()> {
    if output.json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else if !output.quiet {
        let summary: Vec<ResultSummary<'_>> = report.results.iter().map(Into::into).collect();
        println!("Result:");
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    let digest = report.digest();
    if !digest.is_empty() {
        eprintln!("{digest}");
    }
    Ok(())
}
