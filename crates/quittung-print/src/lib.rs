// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Quittung Print — the durable retrying print queue, receipt rendering for
// ESC/POS and Star printers, and the transports that carry the bytes.

pub mod delivery;
pub mod escpos;
pub mod printer;
pub mod queue;
pub mod receipt;
pub mod retry;
pub mod status;
pub mod store;
pub mod transport;

pub use delivery::DeliveryPort;
pub use printer::ReceiptPrinter;
pub use queue::{DrainOutcome, DrainReport, QueueEngine};
pub use receipt::ReceiptFormatter;
pub use retry::RetryConfig;
pub use status::PrinterMonitor;
pub use store::{JobStore, JsonFileStore};
pub use transport::PrinterInterface;
