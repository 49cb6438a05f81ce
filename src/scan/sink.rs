//! Scan output
//!
//! One `OutputRow` per visible rectangle of a put: the version's content
//! plus its four temporal bounds, clipped to the query. Open ends carry
//! `MAX_INSTANT`.

use std::io::Write;

use serde::Serialize;

use crate::errors::{ChronoError, ChronoResult};
use crate::segment::Document;
use crate::temporal::InstantMicros;
use crate::trie::{Iid, Path};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRow {
    pub iid: Iid,
    pub valid_from: InstantMicros,
    pub valid_to: InstantMicros,
    pub system_from: InstantMicros,
    pub system_to: InstantMicros,
    pub doc: Document,
}

/// Rows emitted by one merge task, in merge order
#[derive(Debug, Clone, PartialEq)]
pub struct RowBatch {
    pub path: Path,
    pub rows: Vec<OutputRow>,
}

impl RowBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Appendable destination for emitted rows
pub trait RowSink {
    fn write_row(&mut self, row: OutputRow) -> ChronoResult<()>;

    fn flush(&mut self) -> ChronoResult<()> {
        Ok(())
    }
}

impl RowSink for Vec<OutputRow> {
    fn write_row(&mut self, row: OutputRow) -> ChronoResult<()> {
        self.push(row);
        Ok(())
    }
}

/// Writes each row as one JSON object per line
pub struct JsonLinesSink<W: Write> {
    out: W,
    rows: usize,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out, rows: 0 }
    }

    pub fn rows_written(&self) -> usize {
        self.rows
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> RowSink for JsonLinesSink<W> {
    fn write_row(&mut self, row: OutputRow) -> ChronoResult<()> {
        serde_json::to_writer(&mut self.out, &row)
            .map_err(|e| ChronoError::io("writing output row", e.into()))?;
        self.out
            .write_all(b"\n")
            .map_err(|e| ChronoError::io("writing output row", e))?;
        self.rows += 1;
        Ok(())
    }

    fn flush(&mut self) -> ChronoResult<()> {
        self.out
            .flush()
            .map_err(|e| ChronoError::io("flushing output", e))
    }
}
