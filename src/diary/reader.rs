// Tab-delimited diary source reader.
//
// Each line is `person_id \t date \t nutrition_json \t goals_json`. The JSON
// payloads never contain raw tabs, so a plain split is enough. A line with
// the wrong number of fields, or bytes that are not UTF-8, is a per-record
// parse failure, not an I/O error.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::schema::DiaryEntry;
use crate::error::PipelineError;

/// Split one raw line into a `DiaryEntry`.
pub fn parse_line(line_no: usize, line: &str) -> Result<DiaryEntry, PipelineError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != 4 {
        return Err(PipelineError::parse(
            line_no,
            format!("expected 4 tab-separated fields, found {}", fields.len()),
        ));
    }

    Ok(DiaryEntry {
        line: line_no,
        person_id: fields[0].to_string(),
        date: fields[1].to_string(),
        nutrition: fields[2].to_string(),
        goals: fields[3].to_string(),
    })
}

/// Read every non-blank line from a reader, keeping per-line parse results
/// in source order.
pub fn read_entries<R: Read>(reader: R) -> Result<Vec<Result<DiaryEntry, PipelineError>>> {
    let mut reader = BufReader::new(reader);
    let mut entries = Vec::new();
    let mut buf = Vec::new();
    let mut line_no = 0;
    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .with_context(|| format!("Failed to read diary line {}", line_no + 1))?;
        if read == 0 {
            break;
        }
        line_no += 1;
        if buf.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        let entry = match std::str::from_utf8(&buf) {
            Ok(line) => parse_line(line_no, line),
            Err(e) => Err(PipelineError::parse(
                line_no,
                format!("line is not valid UTF-8 (byte {})", e.valid_up_to()),
            )),
        };
        entries.push(entry);
    }
    Ok(entries)
}

/// Read a diary file from disk.
pub fn read_diary_file(path: &Path) -> Result<Vec<Result<DiaryEntry, PipelineError>>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open diary file {}", path.display()))?;
    let entries = read_entries(file)?;
    info!(path = %path.display(), lines = entries.len(), "Read diary file");
    Ok(entries)
}
