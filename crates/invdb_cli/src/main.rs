//! invdb CLI
//!
//! Maintenance tools for invdb database files.
//!
//! # Commands
//!
//! - `inspect` - List tables with row and label counts
//! - `verify` - Run integrity and foreign key checks
//! - `labels` - Dump label rows of one kind
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// invdb command-line database tools.
#[derive(Parser)]
#[command(name = "invdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the database file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List tables with row and label counts
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Run integrity and foreign key checks
    Verify,

    /// Dump label rows of one kind
    Labels {
        /// Kind whose labels are listed
        #[arg(short, long)]
        kind: String,

        /// Only the labels of this primary key
        #[arg(long)]
        parent: Option<String>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Database path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Database path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Labels { kind, parent } => {
            let path = cli.path.ok_or("Database path required for labels")?;
            commands::labels::run(&path, &kind, parent.as_deref())?;
        }
        Commands::Version => {
            println!("invdb CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("invdb core v{}", invdb_core::VERSION);
        }
    }

    Ok(())
}
