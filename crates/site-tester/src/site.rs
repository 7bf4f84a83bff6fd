//! Site check runner.
//!
//! Drives one site check through
//! `Fetching → Transforming → Rendering → [Waiting] → Evaluating → Done`.
//! A failure in any stage ends the check with a `Failed` verdict naming the
//! stage; nothing escapes to the orchestrator. The render context is
//! private to the check and closed on every path.

use std::fmt;
use std::time::Instant;

use crate::context::CheckContext;
use crate::document::Document;
use crate::polyfill;
use crate::predicate::{coerce_js, evaluate, wrap_script, Evaluation, SiteTest};
use crate::progress::{ProgressEventKind, SiteStage};
use crate::renderer::RenderContext;
use crate::types::{Channel, ChannelResult, CheckError, SiteCheck};

/// A failure pinned to the stage it happened in.
#[derive(Debug)]
struct StageError {
    stage: SiteStage,
    message: String,
}

impl StageError {
    fn new(stage: SiteStage, message: impl fmt::Display) -> Self {
        Self {
            stage,
            message: message.to_string(),
        }
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.stage, self.message)
    }
}

/// Fetch `check.url`, render it, and evaluate `check.test`.
pub async fn run_site_check(ctx: &CheckContext<'_>, check: &SiteCheck) -> ChannelResult {
    let start = Instant::now();

    enter(ctx, SiteStage::Fetching, &check.url);
    let markup = match ctx.http.get(&check.url).await {
        Ok(response) => {
            if response.final_url != check.url {
                tracing::debug!(url = %check.url, final_url = %response.final_url, "redirected");
            }
            response.body
        }
        Err(e) => {
            let err = StageError::new(SiteStage::Fetching, e);
            return finish(ctx, check, Err(err), start);
        }
    };

    let outcome = render(ctx, check, markup).await;
    finish(ctx, check, outcome, start)
}

/// Run the check from the transform stage on, with markup already fetched.
pub async fn render_site(ctx: &CheckContext<'_>, check: &SiteCheck, markup: String) -> ChannelResult {
    let start = Instant::now();
    let outcome = render(ctx, check, markup).await;
    finish(ctx, check, outcome, start)
}

async fn render(
    ctx: &CheckContext<'_>,
    check: &SiteCheck,
    markup: String,
) -> Result<Evaluation, StageError> {
    let markup = match &check.treat {
        Some(treat) => {
            enter(ctx, SiteStage::Transforming, &check.url);
            treat.apply(&markup)
        }
        None => markup,
    };

    enter(ctx, SiteStage::Rendering, &check.url);
    let mut page = ctx
        .renderer
        .new_context()
        .await
        .map_err(|e| StageError::new(SiteStage::Rendering, format!("{e:#}")))?;

    let outcome = drive(ctx, check, page.as_mut(), &markup).await;

    if let Err(e) = page.close().await {
        tracing::debug!(url = %check.url, "failed to close render context: {e:#}");
    }
    outcome
}

async fn drive(
    ctx: &CheckContext<'_>,
    check: &SiteCheck,
    page: &mut dyn RenderContext,
    markup: &str,
) -> Result<Evaluation, StageError> {
    let rendering = |e: anyhow::Error| StageError::new(SiteStage::Rendering, format!("{e:#}"));

    for script in polyfill::init_scripts() {
        page.add_init_script(script).await.map_err(rendering)?;
    }

    let limit = ctx.options.load_timeout;
    match tokio::time::timeout(limit, page.load(&check.url, markup)).await {
        Ok(Ok(load)) => {
            tracing::debug!(url = %check.url, load_time_ms = load.load_time_ms, "document loaded");
        }
        Ok(Err(e)) => return Err(rendering(e)),
        Err(_) => {
            return Err(StageError::new(
                SiteStage::Rendering,
                format!("load event not fired: {}", CheckError::Timeout(limit)),
            ))
        }
    }

    if !check.wait.is_zero() {
        enter(ctx, SiteStage::Waiting, &check.url);
        tokio::time::sleep(check.wait).await;
    }

    enter(ctx, SiteStage::Evaluating, &check.url);
    let evaluation = match &check.test {
        None => Evaluation::Errored("site block has no test".into()),
        Some(SiteTest::Script(expression)) => {
            match tokio::time::timeout(limit, page.execute_js(&wrap_script(expression))).await {
                Ok(Ok(value)) => coerce_js(&value),
                Ok(Err(e)) => Evaluation::Errored(format!("{e:#}")),
                Err(_) => Evaluation::Errored(format!("script predicate: {}", CheckError::Timeout(limit))),
            }
        }
        Some(test) => {
            let html = match tokio::time::timeout(limit, page.get_html()).await {
                Ok(Ok(html)) => html,
                Ok(Err(e)) => return Err(StageError::new(SiteStage::Evaluating, format!("{e:#}"))),
                Err(_) => return Err(StageError::new(SiteStage::Evaluating, CheckError::Timeout(limit))),
            };
            check_snapshot(test, &check.url, &html)
        }
    };
    Ok(evaluation)
}

fn check_snapshot(test: &SiteTest, url: &str, html: &str) -> Evaluation {
    let doc = Document::parse(url, html);
    evaluate(&doc, |d| test.check(d))
}

fn enter(ctx: &CheckContext<'_>, stage: SiteStage, url: &str) {
    tracing::debug!(url, %stage, "site check stage");
    ctx.emit(ProgressEventKind::StageEntered {
        index: ctx.index,
        channel: Channel::Site,
        stage,
    });
}

fn finish(
    ctx: &CheckContext<'_>,
    check: &SiteCheck,
    outcome: Result<Evaluation, StageError>,
    start: Instant,
) -> ChannelResult {
    let elapsed = start.elapsed().as_millis() as u64;
    enter(ctx, SiteStage::Done, &check.url);
    match outcome {
        Ok(Evaluation::Passed) => ChannelResult::passed(elapsed),
        Ok(Evaluation::Rejected) => {
            ChannelResult::failed(format!("{}: predicate returned false", SiteStage::Evaluating), elapsed)
        }
        Ok(Evaluation::Errored(e)) => {
            ChannelResult::failed(format!("{}: {e}", SiteStage::Evaluating), elapsed)
        }
        Err(e) => {
            tracing::info!(url = %check.url, "site check failed: {e}");
            ChannelResult::failed(e.to_string(), elapsed)
        }
    }
}
