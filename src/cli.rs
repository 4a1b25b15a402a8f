//! The Tether command-line interface.
//!
//! Every subcommand loads its sources into a fresh registry using the
//! built-in catalog, prints load failures as diagnostics and carries on with
//! whatever loaded.

use std::{
    io::Write,
    net::{IpAddr, Ipv4Addr},
    path::PathBuf,
    process,
};

use clap::{Parser, Subcommand};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::{
    catalog::default_catalog,
    diagnostics::{print_error, TetherError},
    engine::{Reporter, TestReport},
    handle::ExecutionContext,
    loader::Loader,
    registry::{identifier_for, Registry, SharedRegistry, TestListing},
    service::{Service, ServiceConfig, DEFAULT_PORT},
};

// ============================================================================
// CLI ARGUMENTS - Command-line argument definitions
// ============================================================================

/// The main CLI argument structure.
#[derive(Debug, Parser)]
#[command(
    name = "tether",
    version,
    about = "Serve a tree of unit tests as a remotely invocable registry."
)]
pub struct TetherArgs {
    #[command(subcommand)]
    pub command: ArgsCommand,
}

/// An enumeration of all available CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum ArgsCommand {
    /// Load sources and list every test with its identifier.
    List {
        /// Module files or directories of module files.
        #[arg(required = true)]
        sources: Vec<PathBuf>,
        /// Print the listing as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Load sources and run a single test.
    Run {
        /// Module files or directories of module files.
        #[arg(required = true)]
        sources: Vec<PathBuf>,
        /// Identifier of the test to run.
        #[arg(long, conflicts_with = "name", required_unless_present = "name")]
        id: Option<String>,
        /// Full dotted name of the test to run.
        #[arg(long)]
        name: Option<String>,
        /// JSON value attached to the invocation.
        #[arg(long, default_value = "null")]
        context: String,
    },
    /// Load sources and serve them over TCP.
    Serve {
        /// Module files or directories of module files.
        #[arg(required = true)]
        sources: Vec<PathBuf>,
        /// Address to bind.
        #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
        bind: IpAddr,
        /// Port to listen on.
        #[arg(long, env = "TETHER_PORT", default_value_t = DEFAULT_PORT)]
        port: u16,
    },
}

// ============================================================================
// MAIN ENTRY POINT
// ============================================================================

/// The main entry point for the CLI.
pub fn run() {
    let args = TetherArgs::parse();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|source| {
            print_error(TetherError::transport("runtime startup", source));
            process::exit(1);
        });

    match args.command {
        ArgsCommand::List { sources, json } => {
            let registry = load_registry(sources);
            print_listing(&registry.enumerate(), json);
        }

        ArgsCommand::Run {
            sources,
            id,
            name,
            context,
        } => {
            let registry = load_registry(sources);
            let context: ExecutionContext = serde_json::from_str(&context).unwrap_or_else(|e| {
                eprintln!("Error: --context is not valid JSON: {e}");
                process::exit(2);
            });
            let Some(identifier) = id.or_else(|| name.as_deref().map(identifier_for)) else {
                eprintln!("Error: one of --id or --name is required");
                process::exit(2);
            };

            match runtime.block_on(registry.invoke(&identifier, context, &Reporter)) {
                Ok(report) => {
                    print_report(&report);
                    if !report.passed {
                        process::exit(1);
                    }
                }
                Err(e) => {
                    print_error(e);
                    process::exit(1);
                }
            }
        }

        ArgsCommand::Serve {
            sources,
            bind,
            port,
        } => {
            let registry = SharedRegistry::new(load_registry(sources));
            let config = ServiceConfig { bind, port };
            if let Err(e) = runtime.block_on(Service::new(registry).listen(config)) {
                print_error(e);
                process::exit(1);
            }
        }
    }
}

// ============================================================================
// PRIVATE HELPERS
// ============================================================================

fn load_registry(sources: Vec<PathBuf>) -> Registry {
    let loader = Loader::new(default_catalog());
    let mut registry = Registry::new();
    let report = registry.load(sources, &loader);
    for error in report.into_errors() {
        print_error(error);
    }
    registry
}

fn print_listing(listing: &[TestListing], json: bool) {
    if json {
        match serde_json::to_string_pretty(listing) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("Error: {e}"),
        }
        return;
    }

    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    for test in listing {
        let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)));
        let _ = write!(stdout, "{}", test.identifier);
        let _ = stdout.reset();
        let _ = writeln!(stdout, "  {}", test.name);
    }
    let count = listing.len();
    let _ = writeln!(stdout, "{count} test{}", pluralize(count));
}

// Helper for pluralizing count summaries.
fn pluralize(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

fn print_report(report: &TestReport) {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    let (label, color) = if report.passed {
        ("PASS", Color::Green)
    } else {
        ("FAIL", Color::Red)
    };
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true));
    let _ = write!(stdout, "{label}");
    let _ = stdout.reset();
    let _ = writeln!(stdout, " {} ({} ms)", report.name, report.duration_ms);

    for assertion in report.assertions.iter().filter(|a| !a.passed) {
        let _ = writeln!(stdout, "  assertion: {}", assertion.message);
        if let Some(detail) = &assertion.detail {
            let _ = writeln!(stdout, "    {detail}");
        }
    }
    for failure in &report.failures {
        let scope = failure
            .scope
            .as_deref()
            .map(|scope| format!(" in '{scope}'"))
            .unwrap_or_default();
        let _ = writeln!(stdout, "  {}{scope}: {}", failure.phase, failure.message);
    }
}
