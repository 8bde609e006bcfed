//! Operation log records.

use crate::error::{ProtocolError, ProtocolResult};
use crate::time::{format_timestamp, parse_timestamp, Timestamp};
use std::fmt;
use std::str::FromStr;

/// Change classification of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// File appeared.
    Created,
    /// File size or modification time changed.
    Modified,
    /// File disappeared.
    Deleted,
}

impl Operation {
    /// Two-letter code used in log lines.
    pub fn code(self) -> &'static str {
        match self {
            Self::Created => "CR",
            Self::Modified => "MO",
            Self::Deleted => "DE",
        }
    }

    /// Whether the file exists after this operation.
    pub fn is_live(self) -> bool {
        !matches!(self, Self::Deleted)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Operation {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CR" => Ok(Self::Created),
            "MO" => Ok(Self::Modified),
            "DE" => Ok(Self::Deleted),
            other => Err(ProtocolError::invalid_line(format!(
                "unknown operation {other:?}"
            ))),
        }
    }
}

/// One line of a root's operation log.
///
/// Line form: `runStart\topTime\tfileModTime\tsize\top\trelativePath`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Start of the analyze pass that produced this entry.
    pub run_start: Timestamp,
    /// When the change was observed.
    pub op_time: Timestamp,
    /// Modification time of the file (observation time for deletions).
    pub file_time: Timestamp,
    /// File size in bytes (0 for deletions).
    pub size: u64,
    /// What happened.
    pub operation: Operation,
    /// Path relative to the root.
    pub relative_path: String,
}

impl LogEntry {
    /// Formats the entry as one tab-separated line, without newline.
    pub fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            format_timestamp(&self.run_start),
            format_timestamp(&self.op_time),
            format_timestamp(&self.file_time),
            self.size,
            self.operation,
            self.relative_path
        )
    }

    /// Parses one log line. Wrong field counts and bad timestamps fail.
    pub fn from_line(line: &str) -> ProtocolResult<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let fields: Vec<&str> = line.splitn(6, '\t').collect();
        let [run_start, op_time, file_time, size, operation, relative_path] = fields[..] else {
            return Err(ProtocolError::invalid_line(format!(
                "expected 6 fields in log line {line:?}"
            )));
        };
        if relative_path.is_empty() {
            return Err(ProtocolError::invalid_line("empty path in log line"));
        }

        Ok(Self {
            run_start: parse_timestamp(run_start)?,
            op_time: parse_timestamp(op_time)?,
            file_time: parse_timestamp(file_time)?,
            size: size
                .parse()
                .map_err(|_| ProtocolError::invalid_line(format!("bad size {size:?}")))?,
            operation: operation.parse()?,
            relative_path: relative_path.to_string(),
        })
    }

    /// Joins entries into newline-separated text.
    pub fn join_lines(entries: &[LogEntry]) -> String {
        entries
            .iter()
            .map(LogEntry::to_line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Parses newline-separated entries. Blank lines are skipped.
    pub fn parse_lines(text: &str) -> ProtocolResult<Vec<LogEntry>> {
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(LogEntry::from_line)
            .collect()
    }

    /// Whether this entry supersedes `other` for the same path.
    ///
    /// Ordered by run start, then operation time. Ties go to `self`, so a
    /// later line in the log wins over an earlier one with equal stamps.
    pub fn supersedes(&self, other: &LogEntry) -> bool {
        (self.run_start, self.op_time) >= (other.run_start, other.op_time)
    }
}
