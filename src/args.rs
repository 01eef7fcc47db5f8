//! prach-ctl CLI arguments.
//!
//! This module contains the definition of the CLI arguments for the
//! prach-ctl application.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// prach-ctl CLI arguments.
#[derive(Parser, Debug, Clone, Eq, PartialEq, Hash)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Name of the UIO device of the PRACH IP core
    #[clap(long, default_value = "prach")]
    pub uio: String,
    /// Pack sequence slots contiguously instead of evenly spaced
    #[clap(long)]
    pub contiguous: bool,
    /// Subcommand to run
    #[clap(subcommand)]
    pub command: Command,
}

/// prach-ctl subcommands.
#[derive(Subcommand, Debug, Clone, Eq, PartialEq, Hash)]
pub enum Command {
    /// Print the core status as JSON
    Status,
    /// Apply a JSON configuration file and commit it
    Apply {
        /// Path of the configuration file
        config: PathBuf,
    },
    /// Print interrupt events as they arrive
    Monitor {
        /// Configuration file applied before monitoring
        #[clap(long)]
        config: Option<PathBuf>,
    },
}
