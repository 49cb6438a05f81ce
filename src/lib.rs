//! chronoscan - bitemporal read/merge core
//!
//! Fact-versions are written into immutable segments, each a hash trie over
//! entity ids whose leaves are pages. A scan plans merge tasks across the
//! tries of several segments, merges each task's pages in
//! `(iid asc, system_from desc)` order and resolves every version into the
//! bitemporal rectangles it still owns.
//!
//! # Modules
//!
//! - `temporal`: instants and query bounds
//! - `bitemporal`: interval ledger (`Ceiling`) and polygon resolution
//! - `trie`: entity ids, bucketing, trie nodes and the trie writer
//! - `segment`: pages, in-memory and persisted segments, merge planning
//! - `scan`: the scan merge engine
//! - `compactor`: merging segments into one
//! - `observability`: structured logging, metrics and scopes
//! - `cli`: the `chronoscan` command line

pub mod bitemporal;
pub mod cli;
pub mod compactor;
pub mod config;
pub mod errors;
pub mod observability;
pub mod scan;
pub mod segment;
pub mod temporal;
pub mod trie;
