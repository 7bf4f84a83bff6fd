//! Run orchestrator: evaluates targets strictly one at a time, in order.
//!
//! For each enabled target the API channel runs before the site channel,
//! and both finish before the next target starts. Results keep descriptor
//! order, skipped targets included.

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;

use crate::api::run_api_check;
use crate::context::{CheckContext, RunOptions};
use crate::http::HttpClient;
use crate::progress::{ProgressEmitter, ProgressEventKind, ProgressSender};
use crate::renderer::Renderer;
use crate::report::RunReport;
use crate::site::run_site_check;
use crate::types::{Channel, ChannelResult, CheckResult, TargetDescriptor};

/// Whether any enabled target has a site channel and therefore needs a
/// browser.
pub fn needs_renderer(targets: &[TargetDescriptor]) -> bool {
    targets.iter().any(|t| !t.disabled && t.site.is_some())
}

/// Sequential runner over an ordered list of targets.
pub struct Orchestrator {
    http: HttpClient,
    renderer: Arc<dyn Renderer>,
    options: RunOptions,
    progress: Option<ProgressSender>,
}

impl Orchestrator {
    pub fn new(renderer: Arc<dyn Renderer>, options: RunOptions) -> Self {
        Self {
            http: HttpClient::new(options.request_timeout),
            renderer,
            options,
            progress: None,
        }
    }

    /// Publish progress events on `tx` during [`Orchestrator::run`].
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Check every target in order and collect the results.
    pub async fn run(&self, targets: &[TargetDescriptor]) -> RunReport {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let start = Instant::now();
        let progress = ProgressEmitter::new(self.progress.clone(), run_id.clone());

        tracing::info!(run_id = %run_id, targets = targets.len(), "run started");
        progress.emit(ProgressEventKind::RunStarted {
            total: targets.len(),
        });

        let mut results = Vec::with_capacity(targets.len());
        for (index, target) in targets.iter().enumerate() {
            let ctx = CheckContext {
                http: &self.http,
                renderer: self.renderer.as_ref(),
                options: &self.options,
                progress: &progress,
                index,
            };
            results.push(self.check_target(&ctx, target).await);
        }

        let report = RunReport {
            run_id,
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            results,
        };

        tracing::info!(
            failed = report.failed_count(),
            duration_ms = report.duration_ms,
            "run complete"
        );
        progress.emit(ProgressEventKind::RunComplete {
            total: report.results.len(),
            failed: report.failed_count(),
            duration_ms: report.duration_ms,
        });
        report
    }

    async fn check_target(&self, ctx: &CheckContext<'_>, target: &TargetDescriptor) -> CheckResult {
        let index = ctx.index;
        if target.disabled {
            tracing::info!(target_name = %target.name, "skipping disabled target");
            ctx.emit(ProgressEventKind::TargetSkipped {
                index,
                name: target.name.clone(),
            });
            return CheckResult::skipped(&target.name);
        }

        tracing::info!(target_name = %target.name, "testing target");
        ctx.emit(ProgressEventKind::TargetStarted {
            index,
            name: target.name.clone(),
        });

        let mut result = CheckResult::new(&target.name);

        if let Some(api) = &target.api {
            started(ctx, Channel::Api, &api.url, 0);
            let outcome = run_api_check(ctx, api).await;
            finished(ctx, Channel::Api, &outcome, &target.name);
            result.api = Some(outcome);
        }

        if let Some(site) = &target.site {
            started(ctx, Channel::Site, &site.url, site.wait.as_millis() as u64);
            let outcome = run_site_check(ctx, site).await;
            finished(ctx, Channel::Site, &outcome, &target.name);
            result.site = Some(outcome);
        }

        ctx.emit(ProgressEventKind::TargetFinished { index });
        result
    }
}

fn started(ctx: &CheckContext<'_>, channel: Channel, url: &str, wait_ms: u64) {
    ctx.emit(ProgressEventKind::ChannelStarted {
        index: ctx.index,
        channel,
        url: url.to_string(),
        wait_ms,
    });
}

fn finished(ctx: &CheckContext<'_>, channel: Channel, outcome: &ChannelResult, name: &str) {
    match &outcome.error {
        Some(error) => tracing::warn!(target_name = %name, %channel, "check failed: {error}"),
        None => tracing::info!(target_name = %name, %channel, verdict = %outcome.verdict, "check finished"),
    }
    ctx.emit(ProgressEventKind::ChannelFinished {
        index: ctx.index,
        channel,
        verdict: outcome.verdict,
        error: outcome.error.clone(),
    });
}
