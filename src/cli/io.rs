//! JSON I/O handling for CLI
//!
//! - Input: JSON lines from a file or stdin
//! - Output: JSON objects on stdout, one per line
//! - UTF-8 only

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use super::errors::{CliError, CliResult};

/// Opens `path` for line reading; `-` means stdin
pub fn open_input(path: &Path) -> CliResult<Box<dyn BufRead>> {
    if path == Path::new("-") {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }

    let file = File::open(path)
        .map_err(|e| CliError::io_error(format!("opening {}: {}", path.display(), e)))?;
    Ok(Box::new(BufReader::new(file)))
}

/// Reads the non-blank lines of `input`, paired with their 1-based line numbers
pub fn read_lines(input: impl BufRead) -> CliResult<Vec<(usize, String)>> {
    let mut lines = Vec::new();
    for (idx, line) in input.lines().enumerate() {
        let line = line?;
        if !line.trim().is_empty() {
            lines.push((idx + 1, line));
        }
    }
    Ok(lines)
}

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "ok",
        "data": data
    });
    write_json_line(&response)
}

/// Write any serializable value as one line on stdout
pub fn write_json_line<T: Serialize>(value: &T) -> CliResult<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, value)?;
    writeln!(stdout)?;
    stdout.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_lines_skips_blanks() {
        let input = "{\"a\":1}\n\n  \n{\"b\":2}\n";
        let lines = read_lines(input.as_bytes()).unwrap();
        assert_eq!(
            lines,
            vec![(1, "{\"a\":1}".to_string()), (4, "{\"b\":2}".to_string())]
        );
    }

    #[test]
    fn test_open_missing_input() {
        let err = open_input(Path::new("/nonexistent/facts.jsonl")).err().unwrap();
        assert_eq!(err.code_str(), "CHRONO_CLI_IO_ERROR");
    }
}
