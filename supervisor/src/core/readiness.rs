//! Readiness detection over raw server output
//!
//! The server has no structured "ready" event, so readiness is inferred from
//! a marker substring in its console output. Lines that happen to be JSON log
//! records are classified and re-emitted through tracing; anything else is an
//! opaque console line. Nothing in here can fail on bad input.

use serde::Deserialize;
use serde_json::{Map, Value};

use shared::{component_debug, component_error, component_info, component_trace, component_warn, ComponentId};

/// Level field as the server writes it: a number, a name, or nothing
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(untagged)]
pub enum RawLevel {
    Number(i64),
    Text(String),
    #[default]
    Missing,
}

/// Severity used when re-emitting server records
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Severity {
    /// Total mapping from the server's level to a severity; unknown levels are `Info`
    pub fn from_raw_level(level: &RawLevel) -> Severity {
        match level {
            RawLevel::Number(0) => Severity::Trace,
            RawLevel::Number(1) => Severity::Debug,
            RawLevel::Number(2) => Severity::Info,
            RawLevel::Number(3) => Severity::Warn,
            RawLevel::Number(4) | RawLevel::Number(5) => Severity::Error,
            RawLevel::Number(_) => Severity::Info,
            RawLevel::Text(name) => match name.trim().to_ascii_lowercase().as_str() {
                "trace" | "verbose" => Severity::Trace,
                "debug" => Severity::Debug,
                "warn" | "warning" => Severity::Warn,
                "error" | "err" | "critical" | "fatal" => Severity::Error,
                _ => Severity::Info,
            },
            RawLevel::Missing => Severity::Info,
        }
    }
}

/// A JSON log record emitted by the server
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredLogRecord {
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub level: RawLevel,
    pub message: String,
    #[serde(default)]
    pub value_map: Map<String, Value>,
}

impl StructuredLogRecord {
    pub fn severity(&self) -> Severity {
        Severity::from_raw_level(&self.level)
    }
}

/// What the detector made of one line
#[derive(Debug, Clone, PartialEq)]
pub struct LineObservation {
    pub record: Option<StructuredLogRecord>,
    pub ready_signal: bool,
}

/// Classifies output lines and spots the readiness marker
#[derive(Debug, Clone)]
pub struct ReadinessDetector {
    marker: String,
}

impl ReadinessDetector {
    pub fn new(marker: impl Into<String>) -> Self {
        Self { marker: marker.into() }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Parse a line as a structured record; `None` means "unclassified"
    pub fn classify_line(&self, raw_line: &str) -> Option<StructuredLogRecord> {
        let trimmed = raw_line.trim();
        if !trimmed.starts_with('{') {
            return None;
        }
        serde_json::from_str(trimmed).ok()
    }

    /// True iff the line carries the readiness marker. An empty marker never matches.
    pub fn is_ready_signal(&self, raw_line: &str) -> bool {
        !self.marker.is_empty() && raw_line.contains(&self.marker)
    }

    pub fn observe(&self, raw_line: &str) -> LineObservation {
        LineObservation {
            record: self.classify_line(raw_line),
            ready_signal: self.is_ready_signal(raw_line),
        }
    }
}

/// Re-emit a server record through tracing at its mapped severity
pub fn forward_record(record: &StructuredLogRecord) {
    let component = ComponentId::Server;
    let function = record.function.as_deref().unwrap_or("-");
    let values = Value::Object(record.value_map.clone());

    match record.severity() {
        Severity::Trace => component_trace!(component, function, values = %values, "{}", record.message),
        Severity::Debug => component_debug!(component, function, values = %values, "{}", record.message),
        Severity::Info => component_info!(component, function, values = %values, "{}", record.message),
        Severity::Warn => component_warn!(component, function, values = %values, "{}", record.message),
        Severity::Error => component_error!(component, function, values = %values, "{}", record.message),
    }
}
