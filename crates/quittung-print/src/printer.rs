// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The production delivery port: render a receipt, push it to the printer.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use quittung_core::config::AppConfig;
use quittung_core::error::Result;
use quittung_core::types::PrintJob;

use crate::delivery::DeliveryPort;
use crate::receipt::ReceiptFormatter;
use crate::transport::PrinterInterface;

/// Renders each job with a [`ReceiptFormatter`] and sends it over a
/// [`PrinterInterface`].  One call is one attempt; retries belong to the queue.
#[derive(Debug, Clone)]
pub struct ReceiptPrinter {
    formatter: ReceiptFormatter,
    interface: PrinterInterface,
    timeout: Duration,
}

impl ReceiptPrinter {
    pub fn new(formatter: ReceiptFormatter, interface: PrinterInterface, timeout: Duration) -> Self {
        Self {
            formatter,
            interface,
            timeout,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self::new(
            ReceiptFormatter::from(config),
            PrinterInterface::parse(&config.printer_interface)?,
            Duration::from_secs(config.printer_timeout_secs),
        ))
    }

    pub fn interface(&self) -> &PrinterInterface {
        &self.interface
    }
}

#[async_trait]
impl DeliveryPort for ReceiptPrinter {
    async fn attempt_delivery(&self, job: &PrintJob) -> Result<()> {
        // A payload that cannot be rendered fails every attempt and ends up
        // dead-lettered with its original content intact.
        let bytes = self.formatter.render(&job.payload)?;
        debug!(job_id = %job.id, bytes = bytes.len(), interface = %self.interface, "sending receipt");
        self.interface.send(&bytes, self.timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quittung_core::error::QuittungError;
    use quittung_core::types::PrinterType;
    use serde_json::json;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn formatter() -> ReceiptFormatter {
        ReceiptFormatter {
            printer_type: PrinterType::Epson,
            width: 32,
            store_name: "Corner Shop".into(),
            contacts: vec![],
        }
    }

    #[tokio::test]
    async fn prints_rendered_receipt_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            socket.read_to_end(&mut received).await.unwrap();
            received
        });

        let printer = ReceiptPrinter::new(
            formatter(),
            PrinterInterface::Tcp { host: "127.0.0.1".into(), port },
            Duration::from_secs(5),
        );
        let job = PrintJob::new(json!({ "customerName": "Ayesha", "totalAmount": 12.5 }));
        printer.attempt_delivery(&job).await.expect("delivered");

        let received = server.await.unwrap();
        assert_eq!(received, formatter().render(&job.payload).unwrap());
        assert!(String::from_utf8_lossy(&received).contains("Ayesha"));
    }

    #[tokio::test]
    async fn unrenderable_payload_is_a_failed_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lp0");
        std::fs::write(&path, b"").unwrap();
        let printer = ReceiptPrinter::new(
            formatter(),
            PrinterInterface::Device { path: path.clone() },
            Duration::from_secs(1),
        );

        let job = PrintJob::new(json!({ "totalAmount": "not a number" }));
        let err = printer.attempt_delivery(&job).await.unwrap_err();
        assert!(matches!(err, QuittungError::Format(_)));
        assert!(std::fs::read(&path).unwrap().is_empty());
    }

    #[test]
    fn from_config_rejects_bad_interface() {
        let config = AppConfig {
            printer_interface: "tcp://printer:abc".into(),
            ..AppConfig::default()
        };
        assert!(ReceiptPrinter::from_config(&config).is_err());
    }
}
