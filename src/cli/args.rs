//! CLI argument definitions using clap
//!
//! Commands:
//! - chronoscan write   --segment <name> --input <facts.jsonl>
//! - chronoscan scan    --segment <name>... [--id <key>...] [--valid-at <t>] [--as-of <t>] [--where <f>...]
//! - chronoscan plan    --segment <name>... [--id <key>...]
//! - chronoscan compact --segment <name>... --output <name>

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// chronoscan - bitemporal segment writer and scanner
#[derive(Parser, Debug)]
#[command(name = "chronoscan")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = "./chronoscan.json")]
    pub config: PathBuf,

    /// Minimum log severity written to stderr (trace, info, warn, error, fatal)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write facts from a JSON-lines file as a new segment
    Write {
        /// Name of the new segment
        #[arg(long)]
        segment: String,

        /// Facts, one JSON object per line; `-` reads stdin
        #[arg(long)]
        input: PathBuf,
    },

    /// Scan segments and print visible rows as JSON lines
    Scan {
        #[command(flatten)]
        source: SegmentArgs,

        #[command(flatten)]
        query: QueryArgs,

        /// Print scan counters to stderr when done
        #[arg(long)]
        metrics: bool,
    },

    /// Print the merge tasks of a scan as JSON lines
    Plan {
        #[command(flatten)]
        source: SegmentArgs,

        /// Restrict to these entity keys
        #[arg(long = "id")]
        ids: Vec<String>,
    },

    /// Merge segments into one new segment
    Compact {
        #[command(flatten)]
        source: SegmentArgs,

        /// Name of the compacted segment
        #[arg(long)]
        output: String,
    },
}

#[derive(Args, Debug)]
pub struct SegmentArgs {
    /// Segments to read, newest first; repeat for several
    #[arg(long = "segment", required = true)]
    pub segments: Vec<String>,
}

#[derive(Args, Debug, Default)]
pub struct QueryArgs {
    /// Restrict to these entity keys
    #[arg(long = "id")]
    pub ids: Vec<String>,

    /// Valid-time instant (micros or RFC 3339)
    #[arg(long)]
    pub valid_at: Option<String>,

    /// System-time as-of instant (micros or RFC 3339)
    #[arg(long)]
    pub as_of: Option<String>,

    /// Column filter such as `age>=18` or `name=alice`; repeat to AND
    #[arg(long = "where")]
    pub filters: Vec<String>,

    /// Content columns to output; all when omitted
    #[arg(long = "column")]
    pub columns: Vec<String>,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
