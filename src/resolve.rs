//! Locating the protocol descriptions the generators read.
//!
//! Two locations are needed: the base `wayland.xml` shipped with
//! `wayland-scanner`, and the directory of extra protocols installed by
//! `wayland-protocols`. Both come from `pkg-config --variable=pkgdatadir`
//! unless the caller supplies an explicit path, in which case no query runs
//! for that location.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::ResolutionError;

/// `pkg-config` variable holding each package's data directory.
pub const DATA_DIR_VARIABLE: &str = "pkgdatadir";

/// Package whose data directory holds the base protocol description.
pub const SCANNER_PACKAGE: &str = "wayland-scanner";

/// Package whose data directory holds the supplementary protocols.
pub const PROTOCOLS_PACKAGE: &str = "wayland-protocols";

/// File name of the base protocol description inside [`SCANNER_PACKAGE`]'s data directory.
pub const BASE_DESCRIPTION_FILE: &str = "wayland.xml";

/// Something that can answer "what is variable X of package Y".
pub trait ConfigQuery {
    /// Return the trimmed value of `variable` for `package`.
    fn query_variable(&self, variable: &str, package: &str) -> Result<String, ResolutionError>;
}

/// [`ConfigQuery`] backed by a `pkg-config` compatible executable.
#[derive(Debug, Clone)]
pub struct PkgConfig {
    program: PathBuf,
}

impl PkgConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Default for PkgConfig {
    fn default() -> Self {
        Self::new("pkg-config")
    }
}

impl ConfigQuery for PkgConfig {
    fn query_variable(&self, variable: &str, package: &str) -> Result<String, ResolutionError> {
        let query_failed = |reason: String| ResolutionError::QueryFailed {
            program: self.program.clone(),
            variable: variable.to_string(),
            package: package.to_string(),
            reason,
        };

        tracing::debug!(program = %self.program.display(), variable, package, "querying");
        let output = Command::new(&self.program)
            .arg(format!("--variable={variable}"))
            .arg(package)
            .output()
            .map_err(|e| ResolutionError::ToolUnavailable {
                program: self.program.clone(),
                source: e,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(query_failed(format!(
                "exit status {:?}: {}",
                output.status.code(),
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|e| query_failed(format!("output is not UTF-8: {e}")))?;
        Ok(stdout.trim().to_string())
    }
}

/// Where the base description and the supplementary protocols live.
///
/// Computed once when a scanner is constructed and never re-queried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    base_description: PathBuf,
    supplementary_dir: PathBuf,
}

impl ResolvedPaths {
    /// Resolve both locations, using each override verbatim when present.
    ///
    /// The base description is resolved first; if it fails the supplementary
    /// directory is never queried.
    pub fn resolve(
        query: &dyn ConfigQuery,
        base_override: Option<&Path>,
        supplementary_override: Option<&Path>,
    ) -> Result<Self, ResolutionError> {
        let base_description = match base_override {
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(query.query_variable(DATA_DIR_VARIABLE, SCANNER_PACKAGE)?)
                .join(BASE_DESCRIPTION_FILE),
        };
        let supplementary_dir = match supplementary_override {
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(query.query_variable(DATA_DIR_VARIABLE, PROTOCOLS_PACKAGE)?),
        };

        tracing::info!(
            base = %base_description.display(),
            protocols = %supplementary_dir.display(),
            "resolved protocol locations"
        );
        Ok(Self {
            base_description,
            supplementary_dir,
        })
    }

    /// Path of the base protocol description (`wayland.xml`).
    pub fn base_description(&self) -> &Path {
        &self.base_description
    }

    /// Directory that system-relative protocol paths are joined onto.
    pub fn supplementary_dir(&self) -> &Path {
        &self.supplementary_dir
    }
}
