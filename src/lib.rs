//! Orchestrate Wayland protocol code generation inside a build graph.
//!
//! `wayland-scan` does not read protocol XML itself. It works out where the
//! system protocol descriptions live, collects which protocols and interface
//! versions a build wants, and schedules the external generators:
//!
//! - one binding-generator run over all protocols, producing the aggregate
//!   bindings (`wayland.rs`) that a module imports;
//! - one `wayland-scanner private-code` run per protocol, producing a
//!   `<stem>-protocol.c` source that every registered compile target receives.
//!
//! Protocols and consumer targets may be registered in any order. Every
//! consumer ends up with every per-protocol source exactly once, and the
//! aggregate bindings are generated at most once.
//!
//! # Usage
//!
//! ```no_run
//! use wayland_scan::graph::{BuildGraph, SystemRunner};
//! use wayland_scan::scanner::{Scanner, ScannerOptions};
//!
//! let mut graph = BuildGraph::new("target/wayland-scan");
//! let mut scanner = Scanner::new(ScannerOptions::default())?;
//!
//! let client = graph.add_module("client");
//! let objects = graph.add_compile_target("client-protocols");
//! scanner.attach_side_artifacts(&mut graph, objects);
//!
//! scanner.add_system_protocol(&mut graph, "stable/xdg-shell/xdg-shell.xml");
//! scanner.generate_str("wl_compositor 4")?;
//! scanner.generate_str("xdg_wm_base 2")?;
//! scanner.attach_generated_binding(&mut graph, client);
//!
//! let outputs = graph.make(&SystemRunner, 4)?;
//! eprintln!("generated {} files", outputs.len());
//! # Ok::<(), wayland_scan::error::Error>(())
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod request;
pub mod resolve;
pub mod scanner;
