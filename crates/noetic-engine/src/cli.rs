//! ABOUTME: Command-line interface for the noeticd host process

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TraceLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<TraceLevel> for tracing::Level {
    fn from(level: TraceLevel) -> Self {
        match level {
            TraceLevel::Off => tracing::Level::ERROR,
            TraceLevel::Error => tracing::Level::ERROR,
            TraceLevel::Warn => tracing::Level::WARN,
            TraceLevel::Info => tracing::Level::INFO,
            TraceLevel::Debug => tracing::Level::DEBUG,
            TraceLevel::Trace => tracing::Level::TRACE,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "noeticd")]
#[command(version)]
#[command(about = "Hierarchical cognitive kernel host")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (falls back to the built-in search path if unset)
    #[arg(short = 'c', long, global = true, env = "NOETIC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Trace verbosity; overridden by RUST_LOG when set
    #[arg(long, global = true, default_value = "info")]
    pub trace: TraceLevel,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Classify a question and, unless the classifier bypasses the kernel,
    /// run it through a root kernel cell to completion.
    Ask {
        question: String,
        /// Optional domain hint forwarded to the root cell's planner.
        #[arg(long)]
        domain: Option<String>,
    },
    /// Lease and run pending micro-tasks from the dispatch queue once, then exit.
    DispatchOnce {
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
    /// Print the current resource governor reading and exit.
    Health,
}
