//! libertycfg CLI
//!
//! Command-line interface for inspecting and resolving Liberty-style
//! server configuration trees.

mod commands;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use libertycfg_core::init_tracing;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "libertycfg")]
#[command(about = "Resolve, merge, and inspect server configuration trees")]
#[command(version = libertycfg_core::VERSION)]
#[command(
    long_about = "libertycfg reads a server configuration tree (server.xml plus its\n\
includes, dropins, bootstrap.properties, and server.env) and answers\n\
questions about the effective configuration.\n\
\n\
Examples:\n  \
libertycfg flatten server.xml             # One merged document with provenance\n  \
libertycfg vars server.xml --format json  # Effective variables\n  \
libertycfg resolve server.xml '${port}'   # Expand a reference\n  \
libertycfg validate server.xml            # Report unresolved includes and weak passwords"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (can be used multiple times for increased verbosity)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Produce one flattened document covering the whole configuration graph
    Flatten {
        /// Path to the server.xml configuration root
        config: PathBuf,

        /// Write the result to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the effective variables of a server
    Vars {
        /// Path to the server.xml configuration root
        config: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,

        /// Only variables usable where this type is expected
        #[arg(short = 't', long)]
        var_type: Option<String>,
    },

    /// Resolve `${...}` references in a value against a server's variables
    Resolve {
        /// Path to the server.xml configuration root
        config: PathBuf,

        /// The value to resolve, e.g. '${httpPort}+1'
        value: String,
    },

    /// List every file contributing to the configuration graph
    Files {
        /// Path to the server.xml configuration root
        config: PathBuf,
    },

    /// Check a configuration tree for unresolved includes and weak passwords
    Validate {
        /// Path to the server.xml configuration root
        config: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,

        /// Runtime version password encodings are checked against
        #[arg(long, default_value = "24.0.0.1")]
        runtime_version: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// Machine-readable JSON
    Json,
}

fn main() {
    let cli = Cli::parse();

    if cli.no_color || std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    // Initialize tracing based on verbosity
    let log_level = match cli.verbose {
        0 => "libertycfg_core=error",
        1 => "libertycfg_core=warn",
        2 => "libertycfg_core=info",
        3 => "libertycfg_core=debug",
        _ => "libertycfg_core=trace",
    };
    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", log_level);
        }
    }
    init_tracing();

    if let Err(e) = run_command(cli) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Flatten { config, output } => commands::flatten_command(&config, output),
        Commands::Vars {
            config,
            format,
            var_type,
        } => commands::vars_command(&config, format, var_type.as_deref()),
        Commands::Resolve { config, value } => commands::resolve_command(&config, &value),
        Commands::Files { config } => commands::files_command(&config),
        Commands::Validate {
            config,
            format,
            runtime_version,
        } => commands::validate_command(&config, format, &runtime_version),
    }
}
