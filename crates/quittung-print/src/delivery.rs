// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The seam between the queue engine and whatever physically prints.

use async_trait::async_trait;

use quittung_core::error::Result;
use quittung_core::types::PrintJob;

/// One physical delivery attempt.
///
/// Implementations must not retry internally; the queue engine owns the
/// retry budget.  Any `Err` counts as a failed attempt regardless of cause.
/// Implementations should bound how long a single attempt may take, since
/// the engine waits on it without a timeout of its own.
#[async_trait]
pub trait DeliveryPort: Send + Sync {
    async fn attempt_delivery(&self, job: &PrintJob) -> Result<()>;
}
