//! Transcript export
//!
//! Renders a transcript as CSV (`Timestamp,Bot,Message`) or plain text, and
//! reads the CSV form back. CSV timestamps are RFC 3339 with full sub-second
//! precision so an import keeps the original instants; the text form uses the
//! shorter display format.

use crate::session::Message;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use std::fmt::Write as _;
use thiserror::Error;

const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const CSV_HEADER: [&str; 3] = ["Timestamp", "Bot", "Message"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Txt,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Some(ExportFormat::Csv),
            "txt" | "text" => Some(ExportFormat::Txt),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Txt => "txt",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Txt => "text/plain; charset=utf-8",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImportError {
    #[error("missing header row")]
    MissingHeader,
    #[error("unexpected header: {0}")]
    BadHeader(String),
    #[error("row {row}: expected 3 fields, found {found}")]
    FieldCount { row: usize, found: usize },
    #[error("row {row}: invalid timestamp {value:?}")]
    BadTimestamp { row: usize, value: String },
    #[error("unterminated quoted field")]
    UnterminatedQuote,
}

/// One row read back from a CSV export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedMessage {
    pub timestamp: DateTime<Utc>,
    pub speaker: String,
    pub text: String,
}

pub fn render(format: ExportFormat, transcript: &[Message]) -> String {
    match format {
        ExportFormat::Csv => to_csv(transcript),
        ExportFormat::Txt => to_text(transcript),
    }
}

/// Download name: `conversation_<id>_<YYYYmmdd_HHMMSS>.<ext>`
pub fn filename(session_id: &str, format: ExportFormat, now: DateTime<Utc>) -> String {
    format!(
        "conversation_{session_id}_{}.{}",
        now.format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

pub fn to_csv(transcript: &[Message]) -> String {
    let mut out = String::new();
    write_csv_row(&mut out, &CSV_HEADER);
    for message in transcript {
        let timestamp = message.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true);
        write_csv_row(&mut out, &[timestamp.as_str(), message.speaker.as_str(), message.text.as_str()]);
    }
    out
}

pub fn to_text(transcript: &[Message]) -> String {
    let mut out = String::new();
    for message in transcript {
        let _ = write!(
            out,
            "[{}] {}: {}\n\n",
            message.timestamp.format(DISPLAY_FORMAT),
            message.speaker,
            message.text
        );
    }
    out
}

fn write_csv_row(out: &mut String, fields: &[&str]) {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        if field.contains([',', '"', '\n', '\r']) {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(field);
        }
    }
    out.push_str("\r\n");
}

/// Parse a CSV export back into messages
pub fn parse_csv(input: &str) -> Result<Vec<ImportedMessage>, ImportError> {
    let mut rows = parse_csv_rows(input)?.into_iter();
    let header = rows.next().ok_or(ImportError::MissingHeader)?;
    if header != CSV_HEADER {
        return Err(ImportError::BadHeader(header.join(",")));
    }

    rows.enumerate()
        .map(|(i, fields)| {
            let row = i + 2;
            let [timestamp, speaker, text]: [String; 3] =
                fields.try_into().map_err(|f: Vec<String>| ImportError::FieldCount {
                    row,
                    found: f.len(),
                })?;
            let timestamp = parse_timestamp(&timestamp).ok_or(ImportError::BadTimestamp {
                row,
                value: timestamp.clone(),
            })?;
            Ok(ImportedMessage {
                timestamp,
                speaker,
                text,
            })
        })
        .collect()
}

/// RFC 3339 first; second-precision display stamps are still accepted
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(value, DISPLAY_FORMAT).map(|ts| ts.and_utc()))
        .ok()
}

/// RFC 4180 field splitter; quoted fields may span lines
fn parse_csv_rows(input: &str) -> Result<Vec<Vec<String>>, ImportError> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => row.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(ImportError::UnterminatedQuote);
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    Ok(rows)
}
