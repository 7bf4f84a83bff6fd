//! API check runner: one POST, one JSON body, one predicate.

use std::time::Instant;

use crate::context::CheckContext;
use crate::predicate::{evaluate, Evaluation};
use crate::types::{ApiCheck, ChannelResult};

/// POST `check.data` to `check.url`, parse the body as JSON, and evaluate
/// `check.test` against it.
///
/// Without a test the channel is `Untested` whatever the endpoint does.
pub async fn run_api_check(ctx: &CheckContext<'_>, check: &ApiCheck) -> ChannelResult {
    let start = Instant::now();
    let elapsed = || start.elapsed().as_millis() as u64;

    let response = match ctx.http.post_json(&check.url, &check.data).await {
        Ok(response) => response,
        Err(e) if check.test.is_some() => return ChannelResult::failed(format!("request: {e}"), elapsed()),
        Err(e) => {
            tracing::debug!(url = %check.url, "untested api check could not be reached: {e}");
            return ChannelResult::untested(elapsed());
        }
    };

    let Some(test) = &check.test else {
        tracing::debug!(url = %check.url, status = response.status, "api check has no test");
        return ChannelResult::untested(elapsed());
    };

    let json: serde_json::Value = match serde_json::from_str(&response.body) {
        Ok(json) => json,
        Err(e) => {
            return ChannelResult::failed(
                format!("parse: invalid JSON body (HTTP {}): {e}", response.status),
                elapsed(),
            )
        }
    };

    match evaluate(&json, |j| test.check(j)) {
        Evaluation::Passed => ChannelResult::passed(elapsed()),
        Evaluation::Rejected => ChannelResult::failed("predicate returned false", elapsed()),
        Evaluation::Errored(e) => ChannelResult::failed(format!("predicate: {e}"), elapsed()),
    }
}
