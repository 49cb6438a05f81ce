//! Page record codec
//!
//! Each leaf page is stored as one self-checking record in `data.pages`:
//!
//! ```text
//! +--------------------+
//! | Record Length      | (u32 LE, whole record)
//! +--------------------+
//! | Page Index         | (u32 LE)
//! +--------------------+
//! | Row Count          | (u32 LE, n)
//! +--------------------+
//! | iid column         | (n x 16 bytes)
//! | valid_from column  | (n x i64 LE)
//! | valid_to column    | (n x i64 LE)
//! | system_from column | (n x i64 LE)
//! | op column          | (n x u8)
//! +--------------------+
//! | Column Count       | (u32 LE)
//! | per column:        |
//! |   name             | (length-prefixed UTF-8)
//! |   n x value        | (u8 presence, then length-prefixed JSON)
//! +--------------------+
//! | Checksum           | (u32 LE)
//! +--------------------+
//! ```
//!
//! The checksum covers every byte before it.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};

use serde_json::Value;

use crate::errors::{ChronoError, ChronoResult};
use crate::trie::{Iid, IID_LEN};

use super::checksum::compute_checksum;
use super::fact::OpKind;
use super::page::{Column, Page};

/// Length + page index + row count + column count + checksum
const MIN_RECORD_SIZE: usize = 4 + 4 + 4 + 4 + 4;

/// Encodes `page` as record number `page_idx`.
pub fn encode_page(page_idx: usize, page: &Page) -> ChronoResult<Vec<u8>> {
    let n = page.row_count();
    let mut body = Vec::with_capacity(n * (IID_LEN + 25) + 16);

    body.extend_from_slice(&(page_idx as u32).to_le_bytes());
    body.extend_from_slice(&(n as u32).to_le_bytes());

    for iid in page.iids() {
        body.extend_from_slice(iid.as_bytes());
    }
    for col in [page.valid_froms(), page.valid_tos(), page.system_froms()] {
        for v in col {
            body.extend_from_slice(&v.to_le_bytes());
        }
    }
    body.extend(page.ops().iter().map(|op| op.as_u8()));

    body.extend_from_slice(&(page.columns().len() as u32).to_le_bytes());
    for (name, column) in page.columns() {
        write_bytes(&mut body, name.as_bytes());
        for value in column {
            match value {
                None => body.push(0),
                Some(value) => {
                    body.push(1);
                    let json = serde_json::to_vec(value).map_err(|e| {
                        ChronoError::malformed(format!("column '{}' not encodable: {}", name, e))
                    })?;
                    write_bytes(&mut body, &json);
                }
            }
        }
    }

    // length + body + checksum
    let record_length = (4 + body.len() + 4) as u32;

    let mut record = Vec::with_capacity(record_length as usize);
    record.extend_from_slice(&record_length.to_le_bytes());
    record.extend_from_slice(&body);
    let checksum = compute_checksum(&record);
    record.extend_from_slice(&checksum.to_le_bytes());

    Ok(record)
}

fn write_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

/// Decodes one record, verifying its checksum and that it is page
/// `expected_idx`.
pub fn decode_page(data: &[u8], expected_idx: usize) -> ChronoResult<Page> {
    if data.len() < MIN_RECORD_SIZE {
        return Err(ChronoError::corruption(format!(
            "page record too short: {} bytes",
            data.len()
        )));
    }

    let record_length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if record_length != data.len() {
        return Err(ChronoError::corruption(format!(
            "page record length {} does not match the {} bytes read",
            record_length,
            data.len()
        )));
    }

    let checksum_offset = record_length - 4;
    let stored = u32::from_le_bytes([
        data[checksum_offset],
        data[checksum_offset + 1],
        data[checksum_offset + 2],
        data[checksum_offset + 3],
    ]);
    let computed = compute_checksum(&data[..checksum_offset]);
    if computed != stored {
        return Err(ChronoError::corruption(format!(
            "checksum mismatch: computed {:08x}, stored {:08x}",
            computed, stored
        )));
    }

    let mut cursor = Cursor::new(&data[4..checksum_offset]);

    let page_idx = read_u32(&mut cursor)? as usize;
    if page_idx != expected_idx {
        return Err(ChronoError::corruption(format!(
            "expected page {}, found page {}",
            expected_idx, page_idx
        )));
    }

    let n = read_u32(&mut cursor)? as usize;
    // every row takes at least 41 fixed bytes; reject counts the record can't hold
    if n > checksum_offset / (IID_LEN + 25) {
        return Err(ChronoError::corruption(format!("row count {} exceeds record", n)));
    }

    let mut iids = Vec::with_capacity(n);
    for _ in 0..n {
        let mut buf = [0u8; IID_LEN];
        read_exact(&mut cursor, &mut buf)?;
        iids.push(Iid::from_bytes(buf));
    }

    let valid_froms = read_i64_column(&mut cursor, n)?;
    let valid_tos = read_i64_column(&mut cursor, n)?;
    let system_froms = read_i64_column(&mut cursor, n)?;

    let mut op_tags = vec![0u8; n];
    read_exact(&mut cursor, &mut op_tags)?;
    let ops = op_tags
        .into_iter()
        .map(OpKind::from_u8)
        .collect::<ChronoResult<Vec<_>>>()?;

    let column_count = read_u32(&mut cursor)? as usize;
    let mut columns = BTreeMap::new();
    for _ in 0..column_count {
        let name = String::from_utf8(read_bytes(&mut cursor)?)
            .map_err(|e| ChronoError::corruption(format!("invalid column name: {}", e)))?;

        let mut column: Column = Vec::with_capacity(n);
        for _ in 0..n {
            let mut presence = [0u8; 1];
            read_exact(&mut cursor, &mut presence)?;
            match presence[0] {
                0 => column.push(None),
                1 => {
                    let bytes = read_bytes(&mut cursor)?;
                    let value: Value = serde_json::from_slice(&bytes).map_err(|e| {
                        ChronoError::corruption(format!("invalid value in '{}': {}", name, e))
                    })?;
                    column.push(Some(value));
                }
                other => {
                    return Err(ChronoError::corruption(format!(
                        "invalid presence flag {} in '{}'",
                        other, name
                    )))
                }
            }
        }
        columns.insert(name, column);
    }

    if (cursor.position() as usize) != cursor.get_ref().len() {
        return Err(ChronoError::corruption("trailing bytes in page record"));
    }

    Ok(Page::from_columns(
        iids,
        valid_froms,
        valid_tos,
        system_froms,
        ops,
        columns,
    ))
}

fn read_exact(cursor: &mut Cursor<&[u8]>, buf: &mut [u8]) -> ChronoResult<()> {
    cursor
        .read_exact(buf)
        .map_err(|e| ChronoError::corruption(format!("truncated page record: {}", e)))
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> ChronoResult<u32> {
    let mut buf = [0u8; 4];
    read_exact(cursor, &mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_bytes(cursor: &mut Cursor<&[u8]>) -> ChronoResult<Vec<u8>> {
    let len = read_u32(cursor)? as usize;
    let remaining = cursor.get_ref().len() - cursor.position() as usize;
    if len > remaining {
        return Err(ChronoError::corruption(format!(
            "field of {} bytes overruns record ({} left)",
            len, remaining
        )));
    }
    let mut buf = vec![0u8; len];
    read_exact(cursor, &mut buf)?;
    Ok(buf)
}

fn read_i64_column(cursor: &mut Cursor<&[u8]>, n: usize) -> ChronoResult<Vec<i64>> {
    let mut out = Vec::with_capacity(n);
    let mut buf = [0u8; 8];
    for _ in 0..n {
        read_exact(cursor, &mut buf)?;
        out.push(i64::from_le_bytes(buf));
    }
    Ok(out)
}
