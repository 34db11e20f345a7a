//! The scanner: protocol registration, side artifacts, and consumer wiring.
//!
//! Every protocol registered on a [`Scanner`] does two things: it becomes an
//! input of the single binding-generator run, and it schedules its own
//! `wayland-scanner private-code` step producing `<stem>-protocol.c`. Those
//! per-protocol sources must end up in every consumer target, no matter
//! whether the consumer was registered before or after the protocol:
//!
//! - registering a consumer attaches every side artifact created so far;
//! - creating a side artifact attaches it to every consumer registered so far.
//!
//! Together these give each (artifact, consumer) pair exactly one attachment.

use std::cell::{Ref, RefCell};
use std::ffi::OsString;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::Deserialize;

use crate::error::{ConfigurationError, ResolutionError};
use crate::graph::{ArgumentSource, ArtifactHandle, BuildGraph, FixedArgs, TargetId};
use crate::request::{Directive, GenerationRequest, InputRef};
use crate::resolve::{ConfigQuery, PkgConfig, ResolvedPaths};

/// Knobs for a [`Scanner`]. Every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScannerOptions {
    /// Use this base description instead of querying `wayland-scanner`.
    pub wayland_xml: Option<PathBuf>,
    /// Use this protocol directory instead of querying `wayland-protocols`.
    pub wayland_protocols: Option<PathBuf>,
    /// `pkg-config` compatible query tool.
    pub pkg_config: PathBuf,
    /// Program producing the aggregate bindings.
    pub generator: PathBuf,
    /// Program producing per-protocol implementation code.
    pub side_generator: PathBuf,
    pub side_verb: String,
    pub side_extension: String,
    /// File name of the aggregate bindings.
    pub output_name: String,
    /// Name modules import the bindings under.
    pub import_name: String,
}

impl Default for ScannerOptions {
    fn default() -> Self {
        Self {
            wayland_xml: None,
            wayland_protocols: None,
            pkg_config: PathBuf::from("pkg-config"),
            generator: PathBuf::from("wayland-scanner-rs"),
            side_generator: PathBuf::from("wayland-scanner"),
            side_verb: "private-code".to_string(),
            side_extension: "c".to_string(),
            output_name: "wayland.rs".to_string(),
            import_name: "wayland".to_string(),
        }
    }
}

/// Where a scanner is in its lifetime. Never moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Paths resolved, nothing registered.
    Ready,
    /// Inputs, directives, or consumers are being registered.
    Accumulating,
    /// The aggregate bindings have been generated.
    Finalized,
}

/// Feeds the shared request to the binding generator at launch time.
struct PrimaryArgs {
    request: Rc<RefCell<GenerationRequest>>,
    base_description: PathBuf,
}

impl ArgumentSource for PrimaryArgs {
    fn arguments(&self, output: &Path) -> Vec<OsString> {
        self.request
            .borrow()
            .arguments(&self.base_description, output)
    }
}

/// Orchestrates code generation for a set of Wayland protocols.
///
/// Registration is single-threaded and happens while the build graph is
/// being constructed; generation happens later when the graph materializes
/// the returned handles.
///
/// A scanner belongs to the first [`BuildGraph`] it registers anything on.
/// Every later call must pass that same graph; handles from another graph
/// make it panic.
pub struct Scanner {
    paths: ResolvedPaths,
    options: ScannerOptions,
    request: Rc<RefCell<GenerationRequest>>,
    primary: Option<ArtifactHandle>,
    side_artifacts: Vec<ArtifactHandle>,
    consumers: Vec<TargetId>,
}

impl Scanner {
    /// Resolve paths with `pkg-config` (or the configured replacement).
    pub fn new(options: ScannerOptions) -> Result<Self, ResolutionError> {
        let query = PkgConfig::new(options.pkg_config.clone());
        Self::with_query(options, &query)
    }

    /// Resolve paths through `query`. Fails without creating a scanner if
    /// either location cannot be resolved.
    pub fn with_query(
        options: ScannerOptions,
        query: &dyn ConfigQuery,
    ) -> Result<Self, ResolutionError> {
        let paths = ResolvedPaths::resolve(
            query,
            options.wayland_xml.as_deref(),
            options.wayland_protocols.as_deref(),
        )?;
        Ok(Self {
            paths,
            options,
            request: Rc::new(RefCell::new(GenerationRequest::new())),
            primary: None,
            side_artifacts: Vec::new(),
            consumers: Vec::new(),
        })
    }

    pub fn paths(&self) -> &ResolvedPaths {
        &self.paths
    }

    pub fn options(&self) -> &ScannerOptions {
        &self.options
    }

    pub fn request(&self) -> Ref<'_, GenerationRequest> {
        self.request.borrow()
    }

    pub fn side_artifacts(&self) -> &[ArtifactHandle] {
        &self.side_artifacts
    }

    pub fn consumers(&self) -> &[TargetId] {
        &self.consumers
    }

    /// Register a protocol file by its own path.
    pub fn add_custom_protocol(
        &mut self,
        graph: &mut BuildGraph,
        path: impl Into<PathBuf>,
    ) -> ArtifactHandle {
        self.add_input(graph, InputRef::Custom(path.into()))
    }

    /// Register a protocol relative to the `wayland-protocols` directory,
    /// e.g. `stable/xdg-shell/xdg-shell.xml`.
    pub fn add_system_protocol(
        &mut self,
        graph: &mut BuildGraph,
        relative: impl Into<PathBuf>,
    ) -> ArtifactHandle {
        self.add_input(graph, InputRef::System(relative.into()))
    }

    fn add_input(&mut self, graph: &mut BuildGraph, input: InputRef) -> ArtifactHandle {
        let path = input.resolve(self.paths.supplementary_dir());
        if self.primary.is_some_and(|h| graph.is_materialized(h)) {
            tracing::warn!(
                protocol = %path.display(),
                "protocol registered after bindings were generated; they will not include it"
            );
        }
        self.request.borrow_mut().add_input(path.clone());
        self.generate_side_artifact(graph, &path)
    }

    /// Schedule the per-protocol implementation source and push it to every
    /// consumer registered so far.
    fn generate_side_artifact(
        &mut self,
        graph: &mut BuildGraph,
        protocol: &Path,
    ) -> ArtifactHandle {
        let output_name = side_artifact_name(protocol, &self.options.side_extension);
        let args = FixedArgs(vec![
            Some(OsString::from(&self.options.side_verb)),
            Some(protocol.as_os_str().to_os_string()),
            None,
        ]);
        let artifact = graph.add_step(
            self.options.side_generator.clone(),
            Box::new(args),
            &output_name,
        );

        self.side_artifacts.push(artifact);
        for &consumer in &self.consumers {
            graph.add_source(consumer, artifact);
        }
        artifact
    }

    /// Request generation of `interface` at `version` or newer.
    pub fn generate(&mut self, interface: impl Into<String>, version: NonZeroU32) {
        self.request
            .borrow_mut()
            .add_directive(Directive::new(interface, version));
    }

    /// Like [`Scanner::generate`], from the `"<interface> <version>"` encoding.
    pub fn generate_str(&mut self, directive: &str) -> Result<(), ConfigurationError> {
        let directive: Directive = directive.parse()?;
        self.request.borrow_mut().add_directive(directive);
        Ok(())
    }

    /// Handle to the aggregate bindings. The step is registered on first
    /// call; later calls return the same handle.
    ///
    /// The generator sees the inputs and directives present when it runs,
    /// so finish registering before materializing.
    pub fn get_output(&mut self, graph: &mut BuildGraph) -> ArtifactHandle {
        if let Some(handle) = self.primary {
            return handle;
        }
        let args = PrimaryArgs {
            request: Rc::clone(&self.request),
            base_description: self.paths.base_description().to_path_buf(),
        };
        let handle = graph.add_step(
            self.options.generator.clone(),
            Box::new(args),
            &self.options.output_name,
        );
        self.primary = Some(handle);
        handle
    }

    /// Make the bindings importable from `module` under the import name.
    pub fn attach_generated_binding(&mut self, graph: &mut BuildGraph, module: TargetId) {
        let handle = self.get_output(graph);
        graph.add_import(module, self.options.import_name.clone(), handle);
    }

    /// Register `target` as a consumer of every side artifact, past and future.
    ///
    /// Registering the same target twice attaches everything twice; callers
    /// must not do that.
    pub fn attach_side_artifacts(&mut self, graph: &mut BuildGraph, target: TargetId) {
        for &artifact in &self.side_artifacts {
            graph.add_source(target, artifact);
        }
        self.consumers.push(target);
    }

    pub fn phase(&self, graph: &BuildGraph) -> Phase {
        if self.primary.is_some_and(|h| graph.is_materialized(h)) {
            return Phase::Finalized;
        }
        let request = self.request.borrow();
        let untouched = request.inputs().is_empty()
            && request.directives().is_empty()
            && self.consumers.is_empty()
            && self.primary.is_none();
        if untouched {
            Phase::Ready
        } else {
            Phase::Accumulating
        }
    }
}

/// `<stem>-protocol.<extension>`, e.g. `xdg-shell.xml` -> `xdg-shell-protocol.c`.
pub fn side_artifact_name(protocol: &Path, extension: &str) -> String {
    let stem = protocol
        .file_stem()
        .or_else(|| protocol.file_name())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "protocol".to_string());
    format!("{stem}-protocol.{extension}")
}
