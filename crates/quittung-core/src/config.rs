// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration, read from the process environment (and an
// optional `.env` file) once at startup.

use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{QuittungError, Result};
use crate::types::PrinterType;

/// File name of the persisted pending queue inside the data directory.
pub const QUEUE_FILE: &str = "queue.json";

/// File name of the dead-letter store inside the data directory.
pub const DEAD_LETTER_FILE: &str = "dead-letter.json";

/// Log directory name inside the data directory.
pub const LOG_DIR: &str = "logs";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogFormat {
    /// Human-readable, one event per line.
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Runtime settings for the print server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Address the HTTP server binds to (loopback by default).
    pub server_host: IpAddr,
    /// Port for the HTTP server (default 3001).
    pub server_port: u16,
    /// Printer transport: `tcp://host:port`, `printer:NAME` or a device path.
    pub printer_interface: String,
    /// Command set understood by the printer.
    pub printer_type: PrinterType,
    /// Characters per printed line.
    pub printer_width: usize,
    /// Store name printed in every receipt header.
    pub store_name: String,
    /// Contact lines printed on installment and detailed receipts.
    pub store_contacts: Vec<String>,
    /// Directory holding the queue and dead-letter files.
    pub data_dir: PathBuf,
    /// Delivery attempts per job before it is dead-lettered.
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubled for each later one.
    pub base_delay_ms: u64,
    /// Printer status poll period.
    pub poll_interval_secs: u64,
    /// Upper bound on a single delivery attempt.
    pub printer_timeout_secs: u64,
    /// Reject malformed print requests with 400 instead of queueing them.
    pub validate_print_data: bool,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
    pub log_format: LogFormat,
    /// Directory for the daily-rotated log files.
    pub log_dir: PathBuf,
    /// Rotated log files kept before the oldest is deleted.
    pub log_max_files: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_host: IpAddr::from([127, 0, 0, 1]),
            server_port: 3001,
            printer_interface: "printer:Black Copper 80".into(),
            printer_type: PrinterType::Epson,
            printer_width: 48,
            store_name: "Store Name".into(),
            store_contacts: Vec::new(),
            data_dir: default_data_dir(|name| std::env::var(name).ok()),
            log_dir: default_data_dir(|name| std::env::var(name).ok()).join(LOG_DIR),
            max_attempts: 3,
            base_delay_ms: 1000,
            poll_interval_secs: 30,
            printer_timeout_secs: 10,
            validate_print_data: false,
            log_level: "info".into(),
            log_format: LogFormat::Pretty,
            log_max_files: 14,
        }
    }
}

impl AppConfig {
    /// Load configuration from the process environment.
    ///
    /// A `.env` file in the working directory is applied first; a missing
    /// file is not an error.
    pub fn from_env() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "loaded .env file"),
            Err(e) if e.not_found() => {}
            Err(e) => {
                return Err(QuittungError::Config {
                    var: ".env".into(),
                    reason: e.to_string(),
                });
            }
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    ///
    /// Unset or blank variables fall back to the defaults; unparseable ones
    /// are reported with the variable name.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self {
            data_dir: default_data_dir(&lookup),
            ..Self::default()
        };

        let printer_type = match var("PRINTER_TYPE") {
            Some(raw) => PrinterType::from_keyword(&raw)
                .ok_or_else(|| invalid("PRINTER_TYPE", "expected EPSON or STAR"))?,
            None => defaults.printer_type,
        };

        let log_format = match var("LOG_FORMAT").map(|v| v.to_ascii_lowercase()).as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(_) => return Err(invalid("LOG_FORMAT", "expected pretty or json")),
        };

        let validate_print_data = match var("VALIDATE_PRINT_DATA") {
            Some(raw) => parse_bool(&raw)
                .ok_or_else(|| invalid("VALIDATE_PRINT_DATA", "expected a boolean"))?,
            None => defaults.validate_print_data,
        };

        let store_contacts = var("STORE_CONTACTS")
            .map(|raw| {
                raw.split(';')
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let max_attempts: u32 = parse_or("QUEUE_MAX_ATTEMPTS", var("QUEUE_MAX_ATTEMPTS"), defaults.max_attempts)?;
        if max_attempts == 0 {
            return Err(invalid("QUEUE_MAX_ATTEMPTS", "must be at least 1"));
        }

        let printer_width: usize = parse_or("PRINTER_WIDTH", var("PRINTER_WIDTH"), defaults.printer_width)?;
        if printer_width < 16 {
            return Err(invalid("PRINTER_WIDTH", "must be at least 16 characters"));
        }

        let poll_interval_secs: u64 = parse_or(
            "PRINTER_POLL_INTERVAL_SECS",
            var("PRINTER_POLL_INTERVAL_SECS"),
            defaults.poll_interval_secs,
        )?;
        if poll_interval_secs == 0 {
            return Err(invalid("PRINTER_POLL_INTERVAL_SECS", "must be at least 1"));
        }

        let printer_timeout_secs: u64 = parse_or(
            "PRINTER_TIMEOUT_SECS",
            var("PRINTER_TIMEOUT_SECS"),
            defaults.printer_timeout_secs,
        )?;
        if printer_timeout_secs == 0 {
            return Err(invalid("PRINTER_TIMEOUT_SECS", "must be at least 1"));
        }

        let data_dir = var("QUITTUNG_DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir);
        let log_max_files: usize = parse_or("LOG_MAX_FILES", var("LOG_MAX_FILES"), defaults.log_max_files)?;
        if log_max_files == 0 {
            return Err(invalid("LOG_MAX_FILES", "must be at least 1"));
        }

        Ok(Self {
            server_host: parse_or("PRINT_SERVER_HOST", var("PRINT_SERVER_HOST"), defaults.server_host)?,
            server_port: parse_or("PRINT_SERVER_PORT", var("PRINT_SERVER_PORT"), defaults.server_port)?,
            printer_interface: var("PRINTER_INTERFACE").unwrap_or(defaults.printer_interface),
            printer_type,
            printer_width,
            store_name: var("STORE_NAME").unwrap_or(defaults.store_name),
            store_contacts,
            log_dir: var("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join(LOG_DIR)),
            data_dir,
            max_attempts,
            base_delay_ms: parse_or("QUEUE_BASE_DELAY_MS", var("QUEUE_BASE_DELAY_MS"), defaults.base_delay_ms)?,
            poll_interval_secs,
            printer_timeout_secs,
            validate_print_data,
            log_level: var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format,
            log_max_files,
        })
    }

    /// Path of the persisted pending queue.
    pub fn queue_path(&self) -> PathBuf {
        self.data_dir.join(QUEUE_FILE)
    }

    /// Path of the dead-letter store.
    pub fn dead_letter_path(&self) -> PathBuf {
        self.data_dir.join(DEAD_LETTER_FILE)
    }
}

fn invalid(var: &str, reason: &str) -> QuittungError {
    QuittungError::Config {
        var: var.into(),
        reason: reason.into(),
    }
}

fn parse_or<T>(name: &str, raw: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw.parse().map_err(|e: T::Err| QuittungError::Config {
            var: name.into(),
            reason: format!("{raw:?}: {e}"),
        }),
        None => Ok(default),
    }
}

/// Accepts `1/true/yes/on` and `0/false/no/off`, case-insensitively.
fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// `$XDG_DATA_HOME/quittung`, then `$HOME/.local/share/quittung`, then a
/// temp directory as a last resort.
fn default_data_dir<F>(lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    let base = if let Some(xdg) = lookup("XDG_DATA_HOME") {
        PathBuf::from(xdg)
    } else if let Some(home) = lookup("HOME") {
        PathBuf::from(home).join(".local").join("share")
    } else {
        std::env::temp_dir()
    };
    base.join("quittung")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = config_from(&[]).expect("config");
        assert_eq!(config.server_port, 3001);
        assert_eq!(config.server_host.to_string(), "127.0.0.1");
        assert_eq!(config.printer_interface, "printer:Black Copper 80");
        assert_eq!(config.printer_type, PrinterType::Epson);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay_ms, 1000);
        assert!(!config.validate_print_data);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn reads_overrides() {
        let config = config_from(&[
            ("PRINT_SERVER_PORT", "4100"),
            ("PRINTER_INTERFACE", "tcp://192.168.1.50:9100"),
            ("PRINTER_TYPE", "star"),
            ("STORE_CONTACTS", "Front desk: 555-0100; ;Owner: 555-0199"),
            ("QUITTUNG_DATA_DIR", "/var/lib/quittung"),
            ("VALIDATE_PRINT_DATA", "yes"),
            ("LOG_FORMAT", "JSON"),
        ])
        .expect("config");
        assert_eq!(config.server_port, 4100);
        assert_eq!(config.printer_interface, "tcp://192.168.1.50:9100");
        assert_eq!(config.printer_type, PrinterType::Star);
        assert_eq!(config.store_contacts, vec!["Front desk: 555-0100", "Owner: 555-0199"]);
        assert_eq!(config.queue_path(), PathBuf::from("/var/lib/quittung/queue.json"));
        assert_eq!(
            config.dead_letter_path(),
            PathBuf::from("/var/lib/quittung/dead-letter.json")
        );
        assert!(config.validate_print_data);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.log_dir, PathBuf::from("/var/lib/quittung/logs"));
    }

    #[test]
    fn log_dir_and_retention_can_be_overridden() {
        let config = config_from(&[("LOG_DIR", "/var/log/quittung"), ("LOG_MAX_FILES", "7")])
            .expect("config");
        assert_eq!(config.log_dir, PathBuf::from("/var/log/quittung"));
        assert_eq!(config.log_max_files, 7);
        assert!(config_from(&[("LOG_MAX_FILES", "0")]).is_err());
    }

    #[test]
    fn data_dir_follows_xdg() {
        let config = config_from(&[("XDG_DATA_HOME", "/data")]).expect("config");
        assert_eq!(config.data_dir, PathBuf::from("/data/quittung"));
    }

    #[test]
    fn bad_port_names_the_variable() {
        let err = config_from(&[("PRINT_SERVER_PORT", "seventy")]).unwrap_err();
        match err {
            QuittungError::Config { var, .. } => assert_eq!(var, "PRINT_SERVER_PORT"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn zero_attempts_rejected() {
        assert!(config_from(&[("QUEUE_MAX_ATTEMPTS", "0")]).is_err());
    }

    #[test]
    fn zero_poll_interval_and_timeout_rejected() {
        assert!(config_from(&[("PRINTER_POLL_INTERVAL_SECS", "0")]).is_err());
        assert!(config_from(&[("PRINTER_TIMEOUT_SECS", "0")]).is_err());
    }

    #[test]
    fn unknown_printer_type_rejected() {
        assert!(config_from(&[("PRINTER_TYPE", "zebra")]).is_err());
    }
}
