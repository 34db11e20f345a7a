//! The primary generation request.
//!
//! A [`GenerationRequest`] collects every protocol input and every
//! "generate interface X at version N" directive. It is append-only and
//! turned into one argument list for the binding generator:
//!
//! ```text
//! -o <output> -i <base description> [-i <input>]* [-g <interface> <version>]*
//! ```

use std::ffi::OsString;
use std::fmt;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ConfigurationError;

/// Interfaces the binding generator always emits, whether requested or not.
pub const IMPLICIT_INTERFACES: [&str; 4] =
    ["wl_display", "wl_registry", "wl_callback", "wl_buffer"];

/// A protocol input as registered by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputRef {
    /// A path used as given.
    Custom(PathBuf),
    /// A path relative to the supplementary protocol directory.
    System(PathBuf),
}

impl InputRef {
    /// The concrete file path, joining system paths onto `supplementary_dir`.
    pub fn resolve(&self, supplementary_dir: &Path) -> PathBuf {
        match self {
            InputRef::Custom(path) => path.clone(),
            InputRef::System(relative) => supplementary_dir.join(relative),
        }
    }
}

/// Generate `interface` at no lower than `version`.
///
/// Whether the protocol actually declares that version is checked by the
/// generator, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub interface: String,
    pub version: NonZeroU32,
}

impl Directive {
    pub fn new(interface: impl Into<String>, version: NonZeroU32) -> Self {
        Self {
            interface: interface.into(),
            version,
        }
    }

    /// Like [`Directive::new`], rejecting version 0.
    pub fn try_new(
        interface: impl Into<String>,
        version: u32,
    ) -> Result<Self, ConfigurationError> {
        let interface = interface.into();
        match NonZeroU32::new(version) {
            Some(version) => Ok(Self::new(interface, version)),
            None => Err(ConfigurationError::MalformedVersionDirective {
                directive: format!("{interface} {version}"),
                reason: "version must be at least 1".to_string(),
            }),
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.interface, self.version)
    }
}

/// Parses `"<interface> <version>"`, e.g. `"wl_seat 5"`.
///
/// The version is any positive decimal that fits in a `u32`.
impl FromStr for Directive {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: &str| ConfigurationError::MalformedVersionDirective {
            directive: s.to_string(),
            reason: reason.to_string(),
        };

        let mut parts = s.split_whitespace();
        let interface = parts.next().ok_or_else(|| malformed("empty directive"))?;
        let version = parts.next().ok_or_else(|| malformed("missing version"))?;
        if parts.next().is_some() {
            return Err(malformed("expected exactly '<interface> <version>'"));
        }
        if !version.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed("version is not a decimal number"));
        }
        let version: u32 = version
            .parse()
            .map_err(|_| malformed("version is out of range"))?;
        let version =
            NonZeroU32::new(version).ok_or_else(|| malformed("version must be at least 1"))?;

        Ok(Directive::new(interface, version))
    }
}

/// Inputs and directives for the single binding-generator run.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    inputs: Vec<PathBuf>,
    directives: Vec<Directive>,
}

impl GenerationRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an input. Duplicates are kept and forwarded as-is.
    pub fn add_input(&mut self, path: impl Into<PathBuf>) {
        self.inputs.push(path.into());
    }

    /// Append a directive. The version is forwarded without local checks.
    pub fn add_directive(&mut self, directive: Directive) {
        if IMPLICIT_INTERFACES.contains(&directive.interface.as_str()) {
            tracing::debug!(
                interface = %directive.interface,
                "interface is always generated; forwarding directive anyway"
            );
        }
        self.directives.push(directive);
    }

    pub fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    /// Build the generator argument list for the current contents.
    pub fn arguments(&self, base_description: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::with_capacity(4 + 2 * self.inputs.len());
        args.push("-o".into());
        args.push(output.into());
        args.push("-i".into());
        args.push(base_description.into());
        for input in &self.inputs {
            args.push("-i".into());
            args.push(input.into());
        }
        for directive in &self.directives {
            args.push("-g".into());
            args.push(directive.interface.clone().into());
            args.push(directive.version.to_string().into());
        }
        args
    }
}
