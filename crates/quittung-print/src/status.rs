// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer status monitoring.
//
// The monitor probes the configured interface on a fixed period and keeps
// the last observed status for the health endpoint.  Status changes are
// logged once; a steady state is silent.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use quittung_core::types::PrinterStatus;

use crate::transport::PrinterInterface;

#[derive(Debug)]
pub struct PrinterMonitor {
    interface: PrinterInterface,
    timeout: Duration,
    last: Mutex<PrinterStatus>,
}

impl PrinterMonitor {
    pub fn new(interface: PrinterInterface, timeout: Duration) -> Self {
        Self {
            interface,
            timeout,
            last: Mutex::new(PrinterStatus::Unknown),
        }
    }

    /// Last observed status, without probing.
    pub fn current(&self) -> PrinterStatus {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Probe now, record the result and log if it changed.
    pub async fn check(&self) -> PrinterStatus {
        let status = self.interface.probe(self.timeout).await;
        let previous = {
            let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *last, status)
        };
        if previous != status {
            match status {
                PrinterStatus::Connected | PrinterStatus::Spooler => {
                    info!(interface = %self.interface, %previous, %status, "printer status changed");
                }
                _ => {
                    warn!(interface = %self.interface, %previous, %status, "printer status changed");
                }
            }
        }
        status
    }

    /// Poll every `period` until the returned task is aborted.
    pub fn spawn(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.check().await;
            }
        })
    }
}
