//! Run options and the per-target context handed to the check runners.

use std::time::Duration;

use crate::http::HttpClient;
use crate::progress::{ProgressEmitter, ProgressEventKind};
use crate::renderer::Renderer;

/// Default upper bound on a page's load event.
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for a single HTTP request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Knobs that apply to every check in a run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Watchdog around the load event and around script predicates.
    pub load_timeout: Duration,
    /// Timeout for each HTTP request (connect through full body).
    pub request_timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            load_timeout: DEFAULT_LOAD_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Everything a runner needs to check one target.
pub struct CheckContext<'a> {
    pub http: &'a HttpClient,
    pub renderer: &'a dyn Renderer,
    pub options: &'a RunOptions,
    pub progress: &'a ProgressEmitter,
    /// Position of the target in the run.
    pub index: usize,
}

impl CheckContext<'_> {
    pub(crate) fn emit(&self, event: ProgressEventKind) {
        self.progress.emit(event);
    }
}
