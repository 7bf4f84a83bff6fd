//! Run report and failure digest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{CheckResult, NAME_COLUMN};

const SITE_DOWN: &str = "site DOWN!";
const API_DOWN: &str = "api DOWN!";

/// Everything one run produced, results in descriptor order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub results: Vec<CheckResult>,
}

impl RunReport {
    /// Targets with at least one failed channel.
    pub fn digest(&self) -> FailureDigest {
        FailureDigest {
            entries: self
                .results
                .iter()
                .filter(|r| r.has_failure())
                .map(|r| DigestEntry {
                    name: r.name.clone(),
                    site_down: r.site_down(),
                    api_down: r.api_down(),
                })
                .collect(),
        }
    }

    pub fn has_failures(&self) -> bool {
        self.results.iter().any(CheckResult::has_failure)
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| r.has_failure()).count()
    }
}

/// One line of the failure digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestEntry {
    pub name: String,
    pub site_down: bool,
    pub api_down: bool,
}

/// Summary of every target with a failing channel; empty when all passed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDigest {
    pub entries: Vec<DigestEntry>,
}

impl FailureDigest {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }
}

/// One line per entry: the padded name, then a site column and an api column.
impl fmt::Display for FailureDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            let site = if entry.site_down { SITE_DOWN } else { "" };
            let api = if entry.api_down { API_DOWN } else { "" };
            let line = format!(
                "{:<width$}{:<width$}{:<width$}",
                entry.name,
                site,
                api,
                width = NAME_COLUMN
            );
            write!(f, "{}", line.trim_end())?;
        }
        Ok(())
    }
}
