//! Structured JSONL lifecycle logging for driver runs.
//!
//! Provides:
//! - [`LogEntry`]: one JSONL record with required + optional fields.
//! - [`LogEmitter`]: writes JSONL lines to any `Write` sink.
//! - [`validate_log_line`]: checks a single line against the schema.

use serde::{Deserialize, Serialize};
use std::io::Write;

/// Severity level for log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Where a stored value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Storage {
    OwnedHeap,
    BorrowedStack,
}

/// Canonical structured log entry.
///
/// Required fields: `timestamp`, `trace_id`, `level`, `event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    // Required
    pub timestamp: String,
    pub trace_id: String,
    pub level: LogLevel,
    pub event: String,

    // Optional
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<Storage>,
    /// Address as `0x…` hex.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LogEntry {
    /// Create a new log entry with required fields only.
    #[must_use]
    pub fn new(trace_id: impl Into<String>, level: LogLevel, event: impl Into<String>) -> Self {
        Self {
            timestamp: now_utc(),
            trace_id: trace_id.into(),
            level,
            event: event.into(),
            mode: None,
            slot: None,
            storage: None,
            addr: None,
            value: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    /// Set the slot index and its storage class.
    #[must_use]
    pub fn with_slot(mut self, slot: usize, storage: Storage) -> Self {
        self.slot = Some(slot);
        self.storage = Some(storage);
        self
    }

    #[must_use]
    pub fn with_addr<T>(mut self, ptr: *const T) -> Self {
        self.addr = Some(format!("{:#x}", ptr as usize));
        self
    }

    #[must_use]
    pub fn with_value(mut self, value: i64) -> Self {
        self.value = Some(value);
        self
    }

    /// Set free-form details.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Serialize to a single JSONL line (no trailing newline).
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Writes structured JSONL log entries.
pub struct LogEmitter<W: Write> {
    writer: W,
    seq: u64,
    run_id: String,
}

impl<W: Write> LogEmitter<W> {
    #[must_use]
    pub fn new(writer: W, run_id: &str) -> Self {
        Self {
            writer,
            seq: 0,
            run_id: run_id.to_string(),
        }
    }

    /// Generate the next trace ID.
    fn next_trace_id(&mut self) -> String {
        self.seq += 1;
        format!("{}::{:04}", self.run_id, self.seq)
    }

    /// Start an entry with an auto-generated trace_id.
    pub fn entry(&mut self, level: LogLevel, event: &str) -> LogEntry {
        let trace_id = self.next_trace_id();
        LogEntry::new(trace_id, level, event)
    }

    /// Emit a fully-populated log entry.
    pub fn emit_entry(&mut self, mut entry: LogEntry) -> std::io::Result<()> {
        if entry.trace_id.is_empty() {
            entry.trace_id = self.next_trace_id();
        }
        let line = entry.to_jsonl().map_err(std::io::Error::other)?;
        writeln!(self.writer, "{line}")
    }

    /// Number of entries started so far.
    #[must_use]
    pub fn emitted(&self) -> u64 {
        self.seq
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }

    /// Recover the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Validation error for a log line.
#[derive(Debug)]
pub struct LogValidationError {
    pub line_number: usize,
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for LogValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "line {}: field '{}': {}",
            self.line_number, self.field, self.message
        )
    }
}

/// Validate a single JSONL line against the schema.
pub fn validate_log_line(
    line: &str,
    line_number: usize,
) -> Result<LogEntry, Vec<LogValidationError>> {
    let error = |field: &str, message: String| LogValidationError {
        line_number,
        field: field.to_string(),
        message,
    };

    let value: serde_json::Value = serde_json::from_str(line)
        .map_err(|e| vec![error("<json>", format!("invalid JSON: {e}"))])?;
    let Some(obj) = value.as_object() else {
        return Err(vec![error("<root>", "expected JSON object".to_string())]);
    };

    let missing: Vec<LogValidationError> = ["timestamp", "trace_id", "level", "event"]
        .into_iter()
        .filter(|field| !obj.contains_key(*field))
        .map(|field| error(field, "required field missing".to_string()))
        .collect();
    if !missing.is_empty() {
        return Err(missing);
    }

    serde_json::from_value(value).map_err(|e| vec![error("<entry>", e.to_string())])
}

/// RFC 3339 UTC timestamp with millisecond precision.
fn now_utc() -> String {
    let duration = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = duration.as_secs();
    let (year, month, day) = civil_from_days(secs / 86_400);
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{:03}Z",
        (secs % 86_400) / 3_600,
        (secs % 3_600) / 60,
        secs % 60,
        duration.subsec_millis(),
    )
}

/// Days since 1970-01-01 to (year, month, day), proleptic Gregorian.
fn civil_from_days(days: u64) -> (u64, u64, u64) {
    let z = days + 719_468;
    let era = z / 146_097;
    let doe = z % 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + u64::from(month <= 2);
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn civil_dates() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(59), (1970, 3, 1));
        assert_eq!(civil_from_days(11_016), (2000, 2, 29));
        assert_eq!(civil_from_days(20_742), (2026, 10, 16));
    }

    #[test]
    fn optional_fields_are_omitted() {
        let line = LogEntry::new("run::0001", LogLevel::Info, "slot_store")
            .to_jsonl()
            .expect("serialize");
        assert!(!line.contains("\"slot\""));
        assert!(!line.contains("\"addr\""));
    }

    #[test]
    fn emitter_numbers_trace_ids() {
        let mut emitter = LogEmitter::new(Vec::new(), "run");
        let a = emitter.entry(LogLevel::Info, "a");
        let b = emitter.entry(LogLevel::Info, "b");
        assert_eq!(a.trace_id, "run::0001");
        assert_eq!(b.trace_id, "run::0002");
        emitter.emit_entry(a).expect("emit");
        emitter.emit_entry(b).expect("emit");
        assert_eq!(emitter.emitted(), 2);
        let out = String::from_utf8(emitter.into_inner()).expect("utf8");
        assert_eq!(out.lines().count(), 2);
    }

    #[test]
    fn validation_reports_missing_fields() {
        let errs = validate_log_line(r#"{"timestamp":"t","level":"info"}"#, 3)
            .expect_err("missing fields");
        let fields: Vec<&str> = errs.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["trace_id", "event"]);
        assert!(errs[0].to_string().starts_with("line 3:"));

        assert!(validate_log_line("not json", 1).is_err());
        assert!(validate_log_line("[1,2]", 1).is_err());
    }
}
