//! Error kinds raised by readers, stages, and the runner.
//!
//! Public functions return [`anyhow::Result`]; the typed kind is always the
//! root of the chain, so callers can branch on it regardless of how much
//! context (file path, record number, stage index) was attached on the way up:
//!
//! ```
//! use ironframe::error::FrameError;
//! use ironframe::prelude::*;
//!
//! let t = Table::new(vec![Column::from_i64("a", vec![Some(1)])]).unwrap();
//! let err = t.filter(&col("missing").gt(lit(0))).unwrap_err();
//! assert!(matches!(
//!     err.downcast_ref::<FrameError>(),
//!     Some(FrameError::UnknownColumn { .. })
//! ));
//! ```

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Why a materialization stopped before completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// A [`CancelToken`](crate::runner::CancelToken) was triggered.
    Requested,
    /// The caller-supplied timeout elapsed.
    Deadline,
    /// The source produced more rows than the caller-supplied cap.
    RowLimit(usize),
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => write!(f, "cancellation requested"),
            Self::Deadline => write!(f, "deadline exceeded"),
            Self::RowLimit(n) => write!(f, "source exceeded row cap of {n}"),
        }
    }
}

/// The typed error kinds of the engine.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("source not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    #[error("parse error at {location}: {message}")]
    Parse { location: String, message: String },

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("unknown column '{name}' (available: {})", available.join(", "))]
    UnknownColumn { name: String, available: Vec<String> },

    #[error("type error: {0}")]
    Type(String),

    #[error("null encountered in non-nullable {0}")]
    NullHandling(String),

    #[error("execution cancelled: {0}")]
    Cancelled(CancelReason),
}

impl FrameError {
    pub(crate) fn unknown_column<S: AsRef<str>>(name: &str, available: &[S]) -> Self {
        Self::UnknownColumn {
            name: name.to_string(),
            available: available.iter().map(|s| s.as_ref().to_string()).collect(),
        }
    }

    pub(crate) fn parse(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            location: location.into(),
            message: message.into(),
        }
    }
}

/// Return the typed kind at the root of an `anyhow` chain, if any.
#[must_use]
pub fn kind_of(err: &anyhow::Error) -> Option<&FrameError> {
    err.downcast_ref::<FrameError>()
}
