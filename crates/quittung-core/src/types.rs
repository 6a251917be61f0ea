// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Quittung print server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a print job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A queued print job.
///
/// The payload is the raw request body as received by the print server and
/// is forwarded untouched to the printer.  Only `retry_count` is mutated
/// while the job lives in the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintJob {
    /// Assigned on enqueue; regenerated for records written without one.
    #[serde(default)]
    pub id: JobId,
    /// When the job was accepted.
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
    /// Delivery attempts made so far.
    #[serde(default)]
    pub retry_count: u32,
    pub payload: serde_json::Value,
}

impl PrintJob {
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            id: JobId::new(),
            received_at: Some(Utc::now()),
            retry_count: 0,
            payload,
        }
    }
}

/// Printer command set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrinterType {
    /// Epson ESC/POS (also most generic 80mm thermal printers).
    Epson,
    /// Star Micronics line mode.
    Star,
}

impl PrinterType {
    /// Parse the `PRINTER_TYPE` keyword.  Unknown values yield `None`.
    pub fn from_keyword(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "EPSON" => Some(Self::Epson),
            "STAR" => Some(Self::Star),
            _ => None,
        }
    }
}

/// Connection status of the configured printer, as reported by the health
/// endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrinterStatus {
    /// Jobs are handed to the OS spooler; no direct connectivity check.
    Spooler,
    Connected,
    Disconnected,
    /// The status probe itself failed.
    Error,
    /// Not polled yet.
    Unknown,
}

impl std::fmt::Display for PrinterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Spooler => "spooler",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_job_starts_with_zero_retries() {
        let job = PrintJob::new(json!({"type": "basic", "totalAmount": 10}));
        assert_eq!(job.retry_count, 0);
        assert!(job.received_at.is_some());
    }

    #[test]
    fn job_record_without_metadata_still_parses() {
        let job: PrintJob =
            serde_json::from_str(r#"{"payload": {"type": "basic"}, "retryCount": 2}"#)
                .expect("parse");
        assert_eq!(job.retry_count, 2);
        assert!(job.received_at.is_none());
        assert_eq!(job.payload["type"], "basic");
    }

    #[test]
    fn printer_type_keywords() {
        assert_eq!(PrinterType::from_keyword("epson"), Some(PrinterType::Epson));
        assert_eq!(PrinterType::from_keyword(" STAR "), Some(PrinterType::Star));
        assert_eq!(PrinterType::from_keyword("zebra"), None);
    }

    #[test]
    fn printer_status_serializes_lowercase() {
        let s = serde_json::to_string(&PrinterStatus::Disconnected).expect("serialize");
        assert_eq!(s, "\"disconnected\"");
        assert_eq!(PrinterStatus::Spooler.to_string(), "spooler");
    }
}
