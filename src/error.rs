//! Error types for the wayland-scan crate.

use std::path::PathBuf;
use std::sync::Arc;

/// Failures while locating the base protocol description and the
/// supplementary protocol directory.
///
/// Raised before a [`Scanner`](crate::scanner::Scanner) exists; no partially
/// resolved instance is ever handed out.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    /// The query tool could not be launched at all.
    #[error("failed to launch {program}: {source}")]
    ToolUnavailable {
        program: PathBuf,
        source: std::io::Error,
    },

    /// The query tool ran but did not produce a usable answer.
    #[error("{program} --variable={variable} {package} failed: {reason}")]
    QueryFailed {
        program: PathBuf,
        variable: String,
        package: String,
        reason: String,
    },
}

/// Failures while materializing a generated artifact.
///
/// Cloneable so a memoized failure can be reported to every caller that asks
/// for the same artifact without re-running the process.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerationError {
    /// The generator process could not be spawned.
    #[error("failed to launch {program}: {source}")]
    ProcessLaunchFailed {
        program: PathBuf,
        source: Arc<std::io::Error>,
    },

    /// The generator ran and exited unsuccessfully.
    #[error("{program} exited with {}", exit_code_display(.code))]
    NonZeroExit { program: PathBuf, code: Option<i32> },

    /// The directory the generator writes into could not be created.
    #[error("failed to create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        source: Arc<std::io::Error>,
    },
}

/// Caller mistakes in the configuration surface.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    /// A directive string is not `<interface> <version>` with a positive version.
    #[error("malformed version directive '{directive}': {reason}")]
    MalformedVersionDirective { directive: String, reason: String },
}

/// Any error the crate can produce.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Failed to read a file from disk.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// JSON parse error with context.
    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

fn exit_code_display(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}
