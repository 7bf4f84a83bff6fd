//! Core data types for targets, verdicts, and per-target results.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::time::Duration;

use crate::predicate::{ApiTest, SiteTest};
use crate::treat::Treat;

/// Width of the name column in progress output and the failure digest.
pub const NAME_COLUMN: usize = 15;

/// One named site and/or API endpoint under test.
///
/// Deserializes from the descriptor file format. The legacy `disable` key is
/// accepted as an alias of `disabled`; when both are present `disabled` wins.
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "RawTarget")]
pub struct TargetDescriptor {
    pub name: String,
    pub disabled: bool,
    pub api: Option<ApiCheck>,
    pub site: Option<SiteCheck>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTarget {
    name: String,
    #[serde(default)]
    disabled: Option<bool>,
    #[serde(default)]
    disable: Option<bool>,
    #[serde(default)]
    api: Option<ApiCheck>,
    #[serde(default)]
    site: Option<SiteCheck>,
}

impl From<RawTarget> for TargetDescriptor {
    fn from(raw: RawTarget) -> Self {
        Self {
            name: raw.name,
            disabled: raw.disabled.or(raw.disable).unwrap_or(false),
            api: raw.api,
            site: raw.site,
        }
    }
}

impl TargetDescriptor {
    /// Create an enabled descriptor with no channels.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            disabled: false,
            api: None,
            site: None,
        }
    }

    pub fn with_api(mut self, api: ApiCheck) -> Self {
        self.api = Some(api);
        self
    }

    pub fn with_site(mut self, site: SiteCheck) -> Self {
        self.site = Some(site);
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Check the fields a run depends on: a non-empty name, parseable URLs,
    /// and a test on every site block.
    pub fn validate(&self) -> SiteTesterResult<()> {
        if self.name.trim().is_empty() {
            return Err(CheckError::InvalidTarget("target name is empty".into()));
        }
        if let Some(api) = &self.api {
            validate_url(&self.name, "api", &api.url)?;
        }
        if let Some(site) = &self.site {
            validate_url(&self.name, "site", &site.url)?;
            if site.test.is_none() {
                return Err(CheckError::InvalidTarget(format!(
                    "{}: site block has no test",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

fn validate_url(name: &str, channel: &str, raw: &str) -> SiteTesterResult<()> {
    url::Url::parse(raw).map(|_| ()).map_err(|e| {
        CheckError::InvalidTarget(format!("{name}: {channel} url {raw:?} is invalid: {e}"))
    })
}

/// A POST request whose JSON response is handed to a predicate.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiCheck {
    pub url: String,
    /// Request body, serialized as JSON.
    #[serde(default = "empty_object")]
    pub data: serde_json::Value,
    #[serde(default)]
    pub test: Option<ApiTest>,
}

impl ApiCheck {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            data: empty_object(),
            test: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_test(mut self, test: ApiTest) -> Self {
        self.test = Some(test);
        self
    }
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// A GET request whose markup is rendered in a browser and tested.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteCheck {
    /// Fetched URL and base location of the rendered document.
    pub url: String,
    /// Markup transform applied once, before the document is built.
    #[serde(default)]
    pub treat: Option<Treat>,
    /// Grace period after the load event, in milliseconds in descriptor files.
    #[serde(default, deserialize_with = "duration_from_millis")]
    pub wait: Duration,
    #[serde(default)]
    pub test: Option<SiteTest>,
}

impl SiteCheck {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            treat: None,
            wait: Duration::ZERO,
            test: None,
        }
    }

    pub fn with_treat(mut self, treat: Treat) -> Self {
        self.treat = Some(treat);
        self
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_test(mut self, test: SiteTest) -> Self {
        self.test = Some(test);
        self
    }
}

fn duration_from_millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

/// Which half of a target a result belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Api,
    Site,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Api => write!(f, "api"),
            Self::Site => write!(f, "site"),
        }
    }
}

/// Outcome of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    Failed,
    /// The channel ran without a predicate. Never counts as a failure.
    Untested,
}

impl Verdict {
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Boolean view: `Some(true|false)` for tested channels.
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Self::Passed => Some(true),
            Self::Failed => Some(false),
            Self::Untested => None,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
            Self::Untested => write!(f, "untested"),
        }
    }
}

/// Verdict plus diagnostics for one channel of one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelResult {
    pub verdict: Verdict,
    /// Failing stage and cause, when the verdict is `Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ChannelResult {
    pub fn passed(duration_ms: u64) -> Self {
        Self {
            verdict: Verdict::Passed,
            error: None,
            duration_ms,
        }
    }

    pub fn failed(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            verdict: Verdict::Failed,
            error: Some(error.into()),
            duration_ms,
        }
    }

    pub fn untested(duration_ms: u64) -> Self {
        Self {
            verdict: Verdict::Untested,
            error: None,
            duration_ms,
        }
    }
}

/// Result record for one descriptor, in descriptor order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<ChannelResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<ChannelResult>,
}

impl CheckResult {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            skipped: false,
            api: None,
            site: None,
        }
    }

    pub fn skipped(name: impl Into<String>) -> Self {
        Self {
            skipped: true,
            ..Self::new(name)
        }
    }

    pub fn api_down(&self) -> bool {
        self.api.as_ref().is_some_and(|r| r.verdict.is_failure())
    }

    pub fn site_down(&self) -> bool {
        self.site.as_ref().is_some_and(|r| r.verdict.is_failure())
    }

    pub fn has_failure(&self) -> bool {
        self.api_down() || self.site_down()
    }
}

/// Errors raised inside the check pipeline before they degrade to a verdict.
#[derive(thiserror::Error, Debug)]
pub enum CheckError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("render error: {0}")]
    Render(String),

    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("invalid selector: {0}")]
    Selector(String),

    #[error("invalid target: {0}")]
    InvalidTarget(String),
}

/// Convenience result type.
pub type SiteTesterResult<T> = Result<T, CheckError>;
