//! Line-oriented output of log events.
//!
//! [`OutputSink`] is the only writer of the output stream while polling.
//! Each event becomes one delimiter-joined line, flushed before `emit`
//! returns, so an abrupt exit never loses an event that was reported as
//! emitted.

use std::io::{self, Write};

use chrono::{DateTime, SecondsFormat};
use serde_json::Value;

use crate::error::{EaaError, Result};
use crate::event::LogEvent;

/// Default field delimiter.
pub const DEFAULT_DELIMITER: &str = ",";

/// Formats one event as a single line (without trailing newline).
///
/// Fields: RFC 3339 UTC timestamp, category, identifier, then each payload
/// value in key order. String values are written as-is, other values as
/// compact JSON. Backslashes, line breaks and the delimiter itself are
/// backslash-escaped inside fields, so one event stays one line and its
/// column count does not depend on field content.
pub fn format_event(event: &LogEvent, delimiter: &str) -> String {
    let timestamp = DateTime::from_timestamp_millis(event.timestamp)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| event.timestamp.to_string());

    let mut fields = vec![timestamp, event.category.clone(), event.id.clone()];
    fields.extend(event.payload.values().map(|value| match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }));

    fields
        .iter()
        .map(|field| escape_field(field, delimiter))
        .collect::<Vec<_>>()
        .join(delimiter)
}

fn escape_field(field: &str, delimiter: &str) -> String {
    let escaped = field
        .replace('\\', "\\\\")
        .replace('\r', "\\r")
        .replace('\n', "\\n");
    if delimiter.is_empty() {
        escaped
    } else {
        escaped.replace(delimiter, &format!("\\{delimiter}"))
    }
}

/// Writes formatted events to a destination, one flushed line each.
#[derive(Debug)]
pub struct OutputSink<W: Write> {
    writer: W,
    delimiter: String,
    lines: u64,
    bytes: u64,
    closed: bool,
}

impl<W: Write> OutputSink<W> {
    /// Wraps `writer`, joining fields with `delimiter`.
    pub fn new(writer: W, delimiter: impl Into<String>) -> Self {
        OutputSink {
            writer,
            delimiter: delimiter.into(),
            lines: 0,
            bytes: 0,
            closed: false,
        }
    }

    /// Writes one event as a line and flushes it.
    ///
    /// # Errors
    ///
    /// `EaaError::Output` if the sink is closed or the write fails.
    pub fn emit(&mut self, event: &LogEvent) -> Result<()> {
        if self.closed {
            return Err(EaaError::Output(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "output sink already closed",
            )));
        }
        let mut line = format_event(event, &self.delimiter);
        line.push('\n');
        self.writer.write_all(line.as_bytes())?;
        self.writer.flush()?;
        self.lines += 1;
        self.bytes += line.len() as u64;
        Ok(())
    }

    /// Flushes and closes the sink. Later calls do nothing.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.writer.flush()?;
        Ok(())
    }

    /// Whether [`OutputSink::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of lines written.
    pub fn lines(&self) -> u64 {
        self.lines
    }

    /// Number of bytes written.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Borrows the underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Unwraps the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}
