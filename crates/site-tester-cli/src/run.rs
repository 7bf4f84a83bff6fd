//! The `run` and `list` commands.

use std::sync::Arc;

use site_tester::progress;
use site_tester::{
    needs_renderer, ChromiumOptions, ChromiumRenderer, NoopRenderer, Orchestrator, Renderer,
    RunReport, TargetDescriptor,
};

use crate::config::{self, Settings};
use crate::exit::ExitCode;
use crate::output::{self, Painter};

/// Browser for this run: Chromium when some enabled target renders a page,
/// otherwise (or when Chromium cannot start) the no-op renderer.
pub async fn select_renderer(targets: &[TargetDescriptor], settings: &Settings) -> Arc<dyn Renderer> {
    if !needs_renderer(targets) {
        tracing::debug!("no site checks; browser not launched");
        return Arc::new(NoopRenderer);
    }

    let options = ChromiumOptions {
        executable: settings.chromium.clone(),
        ..ChromiumOptions::default()
    };
    let renderer: Arc<dyn Renderer> = match ChromiumRenderer::launch(&options).await {
        Ok(renderer) => Arc::new(renderer),
        Err(e) => {
            tracing::warn!("browser unavailable, site checks will fail: {e:#}");
            Arc::new(NoopRenderer)
        }
    };
    renderer
}

/// Check `targets` with `renderer`, printing progress as configured.
pub async fn execute(
    targets: &[TargetDescriptor],
    renderer: Arc<dyn Renderer>,
    settings: &Settings,
) -> RunReport {
    let mut orchestrator = Orchestrator::new(renderer, settings.run.clone());

    let printer = if settings.output.shows_progress() {
        let (tx, rx) = progress::channel();
        orchestrator = orchestrator.with_progress(tx);
        let painter = Painter::new(settings.output.color);
        Some(tokio::spawn(output::print_progress(rx, painter)))
    } else {
        None
    };

    let report = orchestrator.run(targets).await;
    // Dropping the orchestrator closes the channel and lets the printer drain.
    drop(orchestrator);
    if let Some(printer) = printer {
        if let Err(e) = printer.await {
            tracing::debug!("progress printer stopped early: {e}");
        }
    }
    report
}

/// Load, check, report. Errors are configuration or startup failures.
pub async fn run(settings: &Settings) -> anyhow::Result<ExitCode> {
    let targets = config::load_targets(&settings.sites_dir)?;
    tracing::info!(
        sites = %settings.sites_dir.display(),
        targets = targets.len(),
        "descriptors loaded"
    );

    let renderer = select_renderer(&targets, settings).await;
    let report = execute(&targets, Arc::clone(&renderer), settings).await;

    if let Err(e) = renderer.shutdown().await {
        tracing::warn!("browser shutdown failed: {e:#}");
    }

    output::print_report(&report, &settings.output)?;
    Ok(ExitCode::from_report(&report))
}

/// Print discovered targets and their channels without checking anything.
pub fn list(settings: &Settings) -> anyhow::Result<ExitCode> {
    let targets = config::load_targets(&settings.sites_dir)?;

    if settings.output.json {
        let entries: Vec<_> = targets
            .iter()
            .map(|t| {
                serde_json::json!({
                    "name": t.name,
                    "disabled": t.disabled,
                    "api": t.api.as_ref().map(|a| &a.url),
                    "site": t.site.as_ref().map(|s| &s.url),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(ExitCode::Success);
    }

    for (i, target) in targets.iter().enumerate() {
        let state = if target.disabled { " (disabled)" } else { "" };
        println!("{:>3}   {}{state}", format!("{}.", i + 1), target.name);
        if let Some(api) = &target.api {
            println!("      {}", output::channel_text(site_tester::Channel::Api, &api.url, 0));
        }
        if let Some(site) = &target.site {
            let wait = site.wait.as_millis() as u64;
            println!("      {}", output::channel_text(site_tester::Channel::Site, &site.url, wait));
        }
    }
    Ok(ExitCode::Success)
}
