//! Command-line argument parsing for EstateWise
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// EstateWise - real-estate chat over retrieved listings and weighted experts
#[derive(Parser, Debug)]
#[command(name = "estatewise")]
#[command(version)]
#[command(about = "Ask real-estate questions answered by a panel of weighted experts", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level: -v (debug), -vv (trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only print warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Interactive chat session
    Chat {
        /// Conversation id (a fresh one is generated when omitted)
        #[arg(long)]
        conversation: Option<String>,
    },

    /// Ask a single question and print the reply
    Ask {
        /// The question
        #[arg(value_name = "QUERY")]
        query: String,

        /// Conversation id (a fresh one is generated when omitted)
        #[arg(long)]
        conversation: Option<String>,

        /// Print the full reply as JSON
        #[arg(long)]
        json: bool,
    },

    /// Summarize a JSON file of listings
    Insights {
        /// File holding an array of listings or `{ "results": [...] }`
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Display the effective configuration
    Config,
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }
}

impl Verbosity {
    /// Default `tracing` directive when `RUST_LOG` is unset
    pub fn log_directive(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "warn",
            Verbosity::Normal => "estatewise=info",
            Verbosity::Verbose => "estatewise=debug",
            Verbosity::VeryVerbose => "estatewise=trace",
        }
    }

    /// Show auxiliary panes and expert status after each reply
    pub fn show_details(&self) -> bool {
        matches!(self, Verbosity::Verbose | Verbosity::VeryVerbose)
    }
}
