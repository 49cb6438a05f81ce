//! CLI module for chronoscan
//!
//! Provides command-line interface for:
//! - write: Write a JSON-lines fact file as a persisted segment
//! - scan: Stream the rows visible under temporal bounds
//! - plan: Print the merge tasks over a set of segments
//! - compact: Merge segments into one

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command, QueryArgs, SegmentArgs};
pub use commands::{compact, load_config, parse_fact_line, plan, run, run_cli, run_command, scan, scan_spec, write};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{open_input, read_lines, write_json_line, write_response};
