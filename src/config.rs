//! Engine configuration.
//!
//! [`EngineConfig`] gathers the knobs an application usually wants to set
//! once: batch size, execution mode, parallelism, inference sample size and
//! guards. It loads from JSON, can be overridden by `IRONFRAME_*` environment
//! variables, and converts into [`ExecOptions`] and reader options.
//!
//! ```
//! use ironframe::config::{EngineConfig, Mode};
//!
//! let cfg: EngineConfig =
//!     serde_json::from_str(r#"{ "mode": "sequential", "batch_size": 1024 }"#)?;
//! assert_eq!(cfg.mode, Mode::Sequential);
//! assert_eq!(cfg.exec_options().batch_size, 1024);
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::runner::{DEFAULT_BATCH_SIZE, ExecMode, ExecOptions};
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "IRONFRAME_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Sequential,
    #[default]
    Parallel,
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" | "seq" => Ok(Self::Sequential),
            "parallel" | "par" => Ok(Self::Parallel),
            other => Err(anyhow!("unknown execution mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub batch_size: usize,
    pub mode: Mode,
    /// Batches processed concurrently in parallel mode; `None` lets the planner decide.
    pub partitions: Option<usize>,
    /// Rows sampled by CSV and JSON Lines inference; `None` reads whole files.
    pub infer_schema_length: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub max_rows: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            mode: Mode::default(),
            partitions: None,
            infer_schema_length: Some(crate::io::DEFAULT_INFER_SCHEMA_LENGTH),
            timeout_ms: None,
            max_rows: None,
        }
    }
}

fn parse_var<T: FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| anyhow!("{e}"))
        .with_context(|| format!("invalid value {raw:?} for {ENV_PREFIX}{key}"))
}

/// `none` (any case) clears an optional setting.
fn parse_opt<T: FromStr>(key: &str, raw: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    if raw.trim().eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    parse_var(key, raw).map(Some)
}

impl EngineConfig {
    /// Load from a JSON file; missing fields keep their defaults.
    ///
    /// # Errors
    /// I/O or JSON errors, with the path attached.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parse config {}", path.display()))
    }

    /// Defaults overridden by the process environment.
    ///
    /// # Errors
    /// If a variable is set to an unparseable value.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    /// Apply overrides from `lookup`, which maps an unprefixed key
    /// (`BATCH_SIZE`, `MODE`, `PARTITIONS`, `INFER_SCHEMA_LENGTH`,
    /// `TIMEOUT_MS`, `MAX_ROWS`) to its value.
    ///
    /// # Errors
    /// If a value does not parse.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(v) = lookup("BATCH_SIZE") {
            self.batch_size = parse_var("BATCH_SIZE", &v)?;
        }
        if let Some(v) = lookup("MODE") {
            self.mode = parse_var("MODE", &v)?;
        }
        if let Some(v) = lookup("PARTITIONS") {
            self.partitions = parse_opt("PARTITIONS", &v)?;
        }
        if let Some(v) = lookup("INFER_SCHEMA_LENGTH") {
            self.infer_schema_length = parse_opt("INFER_SCHEMA_LENGTH", &v)?;
        }
        if let Some(v) = lookup("TIMEOUT_MS") {
            self.timeout_ms = parse_opt("TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("MAX_ROWS") {
            self.max_rows = parse_opt("MAX_ROWS", &v)?;
        }
        Ok(self)
    }

    /// Runner options for this configuration (no cancel token).
    #[must_use]
    pub fn exec_options(&self) -> ExecOptions {
        let mode = match self.mode {
            Mode::Sequential => ExecMode::Sequential,
            Mode::Parallel => ExecMode::Parallel {
                partitions: self.partitions,
            },
        };
        ExecOptions {
            mode,
            batch_size: self.batch_size.max(1),
            cancel: None,
            timeout: self.timeout_ms.map(Duration::from_millis),
            max_rows: self.max_rows,
        }
    }

    #[cfg(feature = "io-csv")]
    #[must_use]
    pub fn csv_options(&self) -> crate::io::CsvOptions {
        crate::io::CsvOptions::default().with_infer_schema_length(self.infer_schema_length)
    }

    #[cfg(feature = "io-jsonl")]
    #[must_use]
    pub fn jsonl_options(&self) -> crate::io::JsonlOptions {
        crate::io::JsonlOptions::default().with_infer_schema_length(self.infer_schema_length)
    }
}
