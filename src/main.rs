use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use wayland_scan::config::ScanConfig;
use wayland_scan::graph::{BuildGraph, SystemRunner};
use wayland_scan::resolve::{PkgConfig, ResolvedPaths};
use wayland_scan::scanner::Scanner;

/// Generate Wayland protocol bindings and per-protocol sources.
///
/// Locates the system protocol descriptions via pkg-config, runs the
/// binding generator once over every configured protocol, and runs
/// wayland-scanner once per protocol to produce its implementation code.
#[derive(Parser)]
#[command(name = "wayland-scan", version, about)]
struct Cli {
    /// Only log errors.
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print where the base description and the protocol directory live.
    Resolve {
        /// Use this wayland.xml instead of asking pkg-config.
        #[arg(long, env = "WAYLAND_XML")]
        wayland_xml: Option<PathBuf>,

        /// Use this protocol directory instead of asking pkg-config.
        #[arg(long, env = "WAYLAND_PROTOCOLS")]
        wayland_protocols: Option<PathBuf>,

        /// pkg-config compatible query tool.
        #[arg(long, default_value = "pkg-config")]
        pkg_config: PathBuf,
    },

    /// Run every generator described by a JSON config file.
    Generate {
        /// Scan configuration (protocols, directives, tool overrides).
        #[arg(long)]
        config: PathBuf,

        /// Directory generated files are written under.
        #[arg(long, env = "WAYLAND_SCAN_OUT_DIR", default_value = "wayland-scan-out")]
        out_dir: PathBuf,

        /// Maximum number of generator processes running at once.
        #[arg(long, short)]
        jobs: Option<usize>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.quiet { "error" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("error: {e}");

        // Print cause chain.
        let mut source = std::error::Error::source(&e);
        while let Some(cause) = source {
            eprintln!("  caused by: {cause}");
            source = std::error::Error::source(cause);
        }

        process::exit(1);
    }
}

fn run(cli: Cli) -> wayland_scan::error::Result<()> {
    match cli.command {
        Commands::Resolve {
            wayland_xml,
            wayland_protocols,
            pkg_config,
        } => {
            let paths = ResolvedPaths::resolve(
                &PkgConfig::new(pkg_config),
                wayland_xml.as_deref(),
                wayland_protocols.as_deref(),
            )?;
            println!("wayland_xml={}", paths.base_description().display());
            println!("wayland_protocols={}", paths.supplementary_dir().display());
        }

        Commands::Generate {
            config,
            out_dir,
            jobs,
        } => {
            let config = ScanConfig::load(&config)?;
            let mut scanner = Scanner::new(config.options.clone())?;
            let mut graph = BuildGraph::new(&out_dir);

            let bindings = graph.add_module("bindings");
            let protocols = graph.add_compile_target("protocols");
            scanner.attach_side_artifacts(&mut graph, protocols);
            config.apply(&mut scanner, &mut graph)?;
            scanner.attach_generated_binding(&mut graph, bindings);

            let jobs = jobs.unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            });
            if !cli.quiet {
                eprintln!(
                    "Generating {} protocols into {} ({} jobs)",
                    scanner.side_artifacts().len(),
                    out_dir.display(),
                    jobs
                );
            }

            let outputs = graph.make(&SystemRunner, jobs)?;
            for path in &outputs {
                println!("{}", path.display());
            }
            if !cli.quiet {
                eprintln!("Done.");
            }
        }
    }

    Ok(())
}
