use std::path::Path;

use chrono::{NaiveDateTime, Timelike};
use regex::Regex;

use crate::error::TraceError;
use crate::types::{EventRecord, EventTag};

const LINE_PATTERN: &str =
    r"^(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})[,.](\d{1,9}) - (\S+)(?:\s+(.*))?$";

/// Turns event log lines into records. Lines that do not match the layout
/// or carry an unknown tag are skipped.
pub struct LineParser {
    pattern: Regex,
}

impl LineParser {
    pub fn new() -> Result<Self, TraceError> {
        Ok(Self {
            pattern: Regex::new(LINE_PATTERN)?,
        })
    }

    pub fn parse_line(&self, line: &str) -> Option<EventRecord> {
        let captures = self.pattern.captures(line.trim_end())?;
        let base = NaiveDateTime::parse_from_str(&captures[1], "%Y-%m-%d %H:%M:%S").ok()?;
        let timestamp = base.with_nanosecond(fraction_to_nanos(&captures[2])?)?;
        let tag: EventTag = captures[3].parse().ok()?;
        let extras = captures
            .get(4)
            .map(|m| m.as_str().split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        Some(EventRecord {
            timestamp,
            tag,
            extras,
        })
    }

    pub fn parse(&self, text: &str) -> Vec<EventRecord> {
        let mut skipped = 0usize;
        let records: Vec<EventRecord> = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| {
                let record = self.parse_line(line);
                if record.is_none() {
                    skipped += 1;
                }
                record
            })
            .collect();
        if skipped > 0 {
            log::debug!("Skipped {} unparseable event lines", skipped);
        }
        records
    }

    pub fn read(&self, path: &Path) -> Result<Vec<EventRecord>, TraceError> {
        let text = std::fs::read_to_string(path).map_err(|source| TraceError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(self.parse(&text))
    }
}

/// `"5"` is 500ms, `"123456"` is 123.456ms.
fn fraction_to_nanos(digits: &str) -> Option<u32> {
    let value: u32 = digits.parse().ok()?;
    let scale = 10u32.checked_pow(9u32.checked_sub(digits.len() as u32)?)?;
    value.checked_mul(scale)
}
