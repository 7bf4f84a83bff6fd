//! Markup transforms applied to fetched HTML before the document is built.
//!
//! Used to keep third-party scripts from running during a check. Every
//! transform is a pure `&str -> String` function.

use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Caller-supplied markup transform.
pub type MarkupTransform = Arc<dyn Fn(&str) -> String + Send + Sync>;

static SCRIPT_ELEMENT: OnceLock<Regex> = OnceLock::new();

fn script_element() -> &'static Regex {
    // Non-greedy, across newlines: each match ends at the nearest </script>.
    SCRIPT_ELEMENT.get_or_init(|| Regex::new(r"(?s)<script.*?</script>").unwrap())
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Treat {
    /// Drop every `<script>` element except those whose literal source is
    /// listed in `allow`.
    StripScripts {
        #[serde(default)]
        allow: Vec<String>,
    },
    /// Regex replace-all.
    Replace {
        #[serde(deserialize_with = "regex_from_str")]
        pattern: Regex,
        #[serde(default)]
        with: String,
    },
    /// Apply each transform in order.
    Chain(Vec<Treat>),
    #[serde(skip)]
    Native(MarkupTransform),
}

impl Treat {
    pub fn strip_scripts<I, S>(allow: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::StripScripts {
            allow: allow.into_iter().map(Into::into).collect(),
        }
    }

    pub fn native<F>(f: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self::Native(Arc::new(f))
    }

    pub fn apply(&self, markup: &str) -> String {
        match self {
            Self::StripScripts { allow } => script_element()
                .replace_all(markup, |caps: &regex::Captures<'_>| {
                    let element = &caps[0];
                    if allow.iter().any(|a| a == element) {
                        element.to_string()
                    } else {
                        String::new()
                    }
                })
                .into_owned(),
            Self::Replace { pattern, with } => pattern.replace_all(markup, with.as_str()).into_owned(),
            Self::Chain(steps) => steps
                .iter()
                .fold(markup.to_string(), |acc, step| step.apply(&acc)),
            Self::Native(f) => f(markup),
        }
    }
}

impl fmt::Debug for Treat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StripScripts { allow } => {
                f.debug_struct("StripScripts").field("allow", allow).finish()
            }
            Self::Replace { pattern, with } => f
                .debug_struct("Replace")
                .field("pattern", &pattern.as_str())
                .field("with", with)
                .finish(),
            Self::Chain(steps) => f.debug_tuple("Chain").field(steps).finish(),
            Self::Native(_) => write!(f, "Native(..)"),
        }
    }
}

fn regex_from_str<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Regex, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Regex::new(&raw).map_err(serde::de::Error::custom)
}
