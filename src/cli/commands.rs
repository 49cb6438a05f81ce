//! CLI command implementations
//!
//! Every command loads the configuration first, opens the segments it names
//! from `data_dir`, and runs inside an observation scope so its begin and end
//! are visible in the log.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::compactor::Compactor;
use crate::config::EngineConfig;
use crate::observability::{Logger, MetricsRegistry, ObservationScope, Severity};
use crate::scan::{plan_scan, ColumnPredicate, IidSelector, JsonLinesSink, RowSink, ScanCursor, ScanSpec};
use crate::segment::{sort_for_write, Document, FactVersion, OpKind, PersistedSegment, Segment};
use crate::temporal::{parse_instant, InstantMicros, TemporalBounds, MAX_INSTANT};
use crate::trie::Iid;

use super::args::{Cli, Command, QueryArgs};
use super::errors::{CliError, CliResult};
use super::io::{open_input, read_lines, write_json_line, write_response};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    run_cli(Cli::parse_args())
}

/// Applies the global flags, then runs the command
pub fn run_cli(cli: Cli) -> CliResult<()> {
    let severity = Severity::parse(&cli.log_level).ok_or_else(|| {
        CliError::invalid_input(format!("unknown log level '{}'", cli.log_level))
    })?;
    Logger::set_min_severity(severity);

    run_command(&cli.config, cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(config_path: &Path, cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Write { segment, input } => write(config_path, &segment, &input),
        Command::Scan {
            source,
            query,
            metrics,
        } => scan(config_path, &source.segments, &query, metrics),
        Command::Plan { source, ids } => plan(config_path, &source.segments, &ids),
        Command::Compact { source, output } => compact(config_path, &source.segments, &output),
    }
}

/// Loads the configuration file; `data_dir` must be set explicitly
pub fn load_config(config_path: &Path) -> CliResult<EngineConfig> {
    let content = fs::read_to_string(config_path).map_err(|e| {
        CliError::config_error(format!(
            "cannot read config {}: {}",
            config_path.display(),
            e
        ))
    })?;

    let raw: Value = serde_json::from_str(&content)
        .map_err(|e| CliError::config_error(format!("invalid config JSON: {}", e)))?;
    if raw.get("data_dir").is_none() {
        return Err(CliError::config_error("data_dir is required"));
    }

    let config: EngineConfig = serde_json::from_value(raw)
        .map_err(|e| CliError::config_error(format!("invalid config: {}", e)))?;
    config.validate()?;

    Ok(config)
}

/// Write a JSON-lines fact file as a new persisted segment
pub fn write(config_path: &Path, segment: &str, input: &Path) -> CliResult<()> {
    let config = load_config(config_path)?;
    let scope = ObservationScope::with_fields("CLI_WRITE", &[("segment", segment)]);

    let mut rows = read_lines(open_input(input)?)?
        .into_iter()
        .map(|(line_no, line)| parse_fact_line(&line, line_no))
        .collect::<CliResult<Vec<_>>>()?;
    sort_for_write(&mut rows);

    let written = PersistedSegment::write(&config, segment, &rows)?;

    let rows_str = rows.len().to_string();
    let pages_str = written.page_count().to_string();
    scope.complete_with_fields(&[("rows", &rows_str), ("pages", &pages_str)]);

    write_response(json!({
        "segment": written.name(),
        "rows": rows.len(),
        "pages": written.page_count(),
        "depth": written.trie().depth(),
    }))
}

/// Scan segments, streaming visible rows to stdout
pub fn scan(config_path: &Path, segments: &[String], query: &QueryArgs, metrics: bool) -> CliResult<()> {
    let config = load_config(config_path)?;
    let names = segments.join(",");
    let scope = ObservationScope::with_fields("CLI_SCAN", &[("segments", &names)]);

    let opened = open_segments(&config, segments)?;
    let spec = scan_spec(query)?;
    let registry = Arc::new(MetricsRegistry::new());

    let mut cursor = ScanCursor::with_metrics(&opened, spec, Arc::clone(&registry))?;
    let mut sink = JsonLinesSink::new(io::stdout().lock());
    let rows = cursor.drain_into(&mut sink)?;
    sink.flush()?;

    if metrics {
        eprintln!("{}", registry.snapshot().to_json());
    }

    let rows_str = rows.to_string();
    scope.complete_with_fields(&[("rows", &rows_str)]);
    Ok(())
}

/// Print the merge tasks a scan of `segments` would run
pub fn plan(config_path: &Path, segments: &[String], ids: &[String]) -> CliResult<()> {
    let config = load_config(config_path)?;
    let names = segments.join(",");
    let scope = ObservationScope::with_fields("CLI_PLAN", &[("segments", &names)]);

    let opened = open_segments(&config, segments)?;
    let mut spec = ScanSpec::new();
    if let Some(selector) = id_selector(ids) {
        spec = spec.with_selector(selector);
    }

    let tasks = plan_scan(&opened, &spec, None)?;
    for task in &tasks {
        let pages: Vec<Value> = task
            .pages
            .iter()
            .map(|page| {
                json!({
                    "segment": opened[page.segment].name(),
                    "page": page.page_idx,
                })
            })
            .collect();
        write_json_line(&json!({ "path": task.path, "pages": pages }))?;
    }

    let tasks_str = tasks.len().to_string();
    scope.complete_with_fields(&[("tasks", &tasks_str)]);
    Ok(())
}

/// Merge segments into a new persisted segment
pub fn compact(config_path: &Path, segments: &[String], output: &str) -> CliResult<()> {
    let config = load_config(config_path)?;
    let names = segments.join(",");
    let scope = ObservationScope::with_fields("CLI_COMPACT", &[("segments", &names), ("output", output)]);

    let opened = open_segments(&config, segments)?;
    let compacted = Compactor::new(&config)?.compact_to_disk(&opened, output)?;

    let pages_str = compacted.page_count().to_string();
    scope.complete_with_fields(&[("pages", &pages_str)]);

    write_response(json!({
        "segment": compacted.name(),
        "inputs": segments,
        "pages": compacted.page_count(),
        "depth": compacted.trie().depth(),
    }))
}

fn open_segments(config: &EngineConfig, names: &[String]) -> CliResult<Vec<Segment>> {
    names
        .iter()
        .map(|name| {
            PersistedSegment::open(config, name)
                .map(Segment::from)
                .map_err(CliError::from)
        })
        .collect()
}

/// Translates the query flags into a `ScanSpec`
pub fn scan_spec(query: &QueryArgs) -> CliResult<ScanSpec> {
    let mut bounds = match &query.as_of {
        Some(t) => TemporalBounds::as_of(parse_instant(t)?),
        None => TemporalBounds::unbounded(),
    };
    if let Some(t) = &query.valid_at {
        bounds = bounds.with_valid_at(parse_instant(t)?);
    }

    let mut spec = ScanSpec::new().with_bounds(bounds);
    if let Some(selector) = id_selector(&query.ids) {
        spec = spec.with_selector(selector);
    }
    for filter in &query.filters {
        spec = spec.with_predicate(ColumnPredicate::parse(filter)?);
    }
    if !query.columns.is_empty() {
        spec = spec.with_projection(query.columns.clone());
    }

    Ok(spec)
}

fn id_selector(ids: &[String]) -> Option<IidSelector> {
    if ids.is_empty() {
        return None;
    }
    Some(IidSelector::set(ids.iter().map(|id| Iid::for_key(id)).collect()))
}

/// One line of a fact input file
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FactLine {
    id: Value,
    system_from: Value,
    #[serde(default)]
    valid_from: Option<Value>,
    #[serde(default)]
    valid_to: Option<Value>,
    #[serde(default)]
    op: Option<OpKind>,
    #[serde(default)]
    doc: Option<Document>,
}

/// Parses one fact line. `valid_from` defaults to `system_from`, `valid_to`
/// to the end of time and `op` to `put`.
pub fn parse_fact_line(line: &str, line_no: usize) -> CliResult<FactVersion> {
    let invalid = |msg: String| CliError::invalid_input(format!("line {}: {}", line_no, msg));

    let fact: FactLine = serde_json::from_str(line).map_err(|e| invalid(e.to_string()))?;

    let iid = Iid::for_value(&fact.id);
    let instant = |value: &Value, field: &str| -> CliResult<InstantMicros> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .ok_or_else(|| invalid(format!("{} must be an integer of microseconds", field))),
            Value::String(s) => parse_instant(s).map_err(|e| invalid(format!("{}: {}", field, e))),
            _ => Err(invalid(format!("{} must be a number or a string", field))),
        }
    };

    let system_from = instant(&fact.system_from, "system_from")?;
    let valid_from = match &fact.valid_from {
        Some(v) => instant(v, "valid_from")?,
        None => system_from,
    };
    let valid_to = match &fact.valid_to {
        Some(v) => instant(v, "valid_to")?,
        None => MAX_INSTANT,
    };

    let op = fact.op.unwrap_or(OpKind::Put);
    if op != OpKind::Erase && valid_from >= valid_to {
        return Err(invalid(format!(
            "valid_from {} must be before valid_to {}",
            valid_from, valid_to
        )));
    }
    if op != OpKind::Put && fact.doc.is_some() {
        return Err(invalid("only a put carries a doc".to_string()));
    }

    Ok(match op {
        OpKind::Put => FactVersion::put(iid, system_from, valid_from, fact.doc.unwrap_or_default())
            .with_valid_to(valid_to),
        OpKind::Delete => FactVersion::delete(iid, system_from, valid_from).with_valid_to(valid_to),
        OpKind::Erase => FactVersion::erase(iid, system_from),
    })
}
