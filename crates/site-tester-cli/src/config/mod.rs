//! Descriptor discovery and settings resolution.
//!
//! A sites directory holds one file per target (or a list of targets per
//! file). Files are read in lexicographic filename order, which is the run
//! order.

use anyhow::Context;
use std::path::{Path, PathBuf};
use std::time::Duration;

use site_tester::context::{DEFAULT_LOAD_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
use site_tester::{RunOptions, TargetDescriptor, NAME_COLUMN};

/// Environment variable naming the sites directory.
pub const SITES_ENV: &str = "SITE_TESTER_SITES";

const DEFAULT_SITES_DIR: &str = "sites";

/// Errors in the descriptor files themselves.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("sites directory {} does not exist", .0.display())]
    MissingDir(PathBuf),

    #[error("{}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("{}: {source}", path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: site_tester::CheckError,
    },
}

/// Resolve the sites directory: explicit flag, then `SITE_TESTER_SITES`,
/// then `./sites`.
pub fn resolve_sites_dir(explicit: Option<&str>) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }

    if let Ok(env_path) = std::env::var(SITES_ENV) {
        if !env_path.is_empty() {
            return PathBuf::from(env_path);
        }
    }

    PathBuf::from(DEFAULT_SITES_DIR)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> Option<Format> {
    match path.extension()?.to_str()? {
        "json" => Some(Format::Json),
        "toml" => Some(Format::Toml),
        _ => None,
    }
}

/// Descriptor files in `dir`, sorted by file name. Other files are ignored.
pub fn discover(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(ConfigError::MissingDir(dir.to_path_buf()).into());
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && format_of(&path).is_some() {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Parse one descriptor file. JSON holds an object or an array of objects;
/// TOML holds one target at the top level or a `[[target]]` array.
pub fn parse_file(path: &Path, contents: &str) -> Result<Vec<TargetDescriptor>, ConfigError> {
    let parse_err = |message: String| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    };

    match format_of(path) {
        Some(Format::Json) => {
            let value: serde_json::Value =
                serde_json::from_str(contents).map_err(|e| parse_err(e.to_string()))?;
            let targets = match value {
                serde_json::Value::Array(items) => items
                    .into_iter()
                    .map(serde_json::from_value)
                    .collect::<Result<Vec<TargetDescriptor>, _>>(),
                other => serde_json::from_value(other).map(|t| vec![t]),
            };
            targets.map_err(|e| parse_err(e.to_string()))
        }
        Some(Format::Toml) => {
            let mut table: toml::Table = contents.parse().map_err(|e: toml::de::Error| parse_err(e.to_string()))?;
            let targets = match table.remove("target") {
                Some(list) if !table.contains_key("name") => {
                    if let Some(key) = table.keys().next() {
                        return Err(parse_err(format!("unexpected key {key:?} next to [[target]]")));
                    }
                    list.try_into::<Vec<TargetDescriptor>>()
                }
                Some(list) => {
                    table.insert("target".into(), list);
                    toml::Value::Table(table).try_into().map(|t| vec![t])
                }
                None => toml::Value::Table(table).try_into().map(|t| vec![t]),
            };
            targets.map_err(|e| parse_err(e.to_string()))
        }
        None => Err(parse_err("not a .json or .toml file".into())),
    }
}

/// Load every target under `dir` in run order.
pub fn load_targets(dir: &Path) -> anyhow::Result<Vec<TargetDescriptor>> {
    let mut targets = Vec::new();
    for path in discover(dir)? {
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        for target in parse_file(&path, &contents)? {
            target.validate().map_err(|source| ConfigError::Invalid {
                path: path.clone(),
                source,
            })?;
            if target.name.chars().count() > NAME_COLUMN {
                tracing::warn!(
                    file = %path.display(),
                    "target name {:?} is longer than {NAME_COLUMN} characters; columns will not line up",
                    target.name
                );
            }
            targets.push(target);
        }
    }
    tracing::debug!(dir = %dir.display(), count = targets.len(), "descriptors loaded");
    Ok(targets)
}

/// How results reach the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputOptions {
    /// Print only the run report as JSON.
    pub json: bool,
    /// No progress lines and no result dump; the digest is still printed.
    pub quiet: bool,
    pub color: bool,
}

impl OutputOptions {
    pub fn shows_progress(&self) -> bool {
        !self.json && !self.quiet
    }
}

/// Fully resolved settings for one invocation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub sites_dir: PathBuf,
    pub run: RunOptions,
    pub chromium: Option<PathBuf>,
    pub output: OutputOptions,
}

impl Settings {
    /// Flag values, falling back to the environment and then the defaults.
    pub fn resolve(
        sites: Option<&str>,
        load_timeout_ms: Option<u64>,
        request_timeout_ms: Option<u64>,
        chromium: Option<&str>,
        output: OutputOptions,
    ) -> Self {
        Self {
            sites_dir: resolve_sites_dir(sites),
            run: RunOptions {
                load_timeout: load_timeout_ms.map_or(DEFAULT_LOAD_TIMEOUT, Duration::from_millis),
                request_timeout: request_timeout_ms
                    .map_or(DEFAULT_REQUEST_TIMEOUT, Duration::from_millis),
            },
            chromium: chromium.map(PathBuf::from),
            output,
        }
    }
}
