//! CSV encoding of readings.
//!
//! A record is one line: the sample timestamp followed by one field per
//! logged channel. Every field is wrapped in double quotes and the line ends
//! with `\n`. There is no header row.

use chrono::NaiveDateTime;

use crate::error::{LoggerError, Result};
use crate::models::{ChannelLayout, LogRecord, Reading};

/// `chrono` format of the per-record timestamp (`yyyy-MM-dd:HH:mm:ss`).
pub const RECORD_TIMESTAMP_FORMAT: &str = "%Y-%m-%d:%H:%M:%S";

const QUOTE: char = '"';
const SEPARATOR: char = ',';

#[derive(Debug, Clone, Copy, Default)]
pub struct RecordEncoder {
    layout: ChannelLayout,
}

impl RecordEncoder {
    pub fn new(layout: ChannelLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    pub fn encode(&self, timestamp: NaiveDateTime, reading: &Reading) -> LogRecord {
        let values = reading
            .values()
            .get(self.layout.first_channel()..)
            .unwrap_or_default();

        let mut line = String::with_capacity(24 + values.len() * 8);
        push_field(&mut line, &timestamp.format(RECORD_TIMESTAMP_FORMAT).to_string());
        for value in values {
            line.push(SEPARATOR);
            push_field(&mut line, &render_value(*value));
        }
        line.push('\n');

        LogRecord::new(line, values.len() + 1)
    }
}

/// Shortest decimal that parses back to the same `f64`, always with a
/// fractional part (`1.0`, not `1`).
fn render_value(value: f64) -> String {
    format!("{value:?}")
}

fn push_field(line: &mut String, field: &str) {
    line.push(QUOTE);
    for c in field.chars() {
        if c == QUOTE {
            line.push(QUOTE);
        }
        line.push(c);
    }
    line.push(QUOTE);
}

/// A record read back from a log file.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    pub timestamp: NaiveDateTime,
    pub values: Vec<f64>,
}

/// Parse one logged line, with or without its trailing newline.
pub fn decode_record(line: &str) -> Result<DecodedRecord> {
    let malformed = |reason: &str| LoggerError::MalformedRecord {
        line: line.to_string(),
        reason: reason.to_string(),
    };

    let body = line.strip_suffix('\n').unwrap_or(line);
    let fields = split_quoted(body).map_err(|reason| malformed(reason))?;
    let (first, rest) = fields
        .split_first()
        .ok_or_else(|| malformed("empty record"))?;

    let timestamp = NaiveDateTime::parse_from_str(first, RECORD_TIMESTAMP_FORMAT)
        .map_err(|e| malformed(&format!("bad timestamp: {e}")))?;
    let values = rest
        .iter()
        .map(|field| {
            field
                .parse::<f64>()
                .map_err(|e| malformed(&format!("bad value {field:?}: {e}")))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(DecodedRecord { timestamp, values })
}

fn split_quoted(body: &str) -> std::result::Result<Vec<String>, &'static str> {
    let mut fields = Vec::new();
    let mut chars = body.chars().peekable();

    loop {
        if chars.next() != Some(QUOTE) {
            return Err("field is not quoted");
        }
        let mut field = String::new();
        loop {
            match chars.next() {
                Some(QUOTE) if chars.peek() == Some(&QUOTE) => {
                    chars.next();
                    field.push(QUOTE);
                }
                Some(QUOTE) => break,
                Some(c) => field.push(c),
                None => return Err("unterminated field"),
            }
        }
        fields.push(field);

        match chars.next() {
            Some(SEPARATOR) => continue,
            None => return Ok(fields),
            Some(_) => return Err("unexpected character after field"),
        }
    }
}
