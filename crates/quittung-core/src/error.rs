// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Quittung.

use thiserror::Error;

/// Top-level error type for all Quittung operations.
#[derive(Debug, Error)]
pub enum QuittungError {
    // -- Delivery errors --
    #[error("printer transport failed: {0}")]
    Transport(String),

    #[error("printer rejected the job: {0}")]
    Delivery(String),

    #[error("receipt formatting failed: {0}")]
    Format(String),

    // -- Ingress errors --
    #[error("invalid print request: {0}")]
    Validation(String),

    #[error("print server error: {0}")]
    Server(String),

    // -- Storage / persistence --
    #[error("queue store error: {0}")]
    Store(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // -- Configuration --
    #[error("invalid configuration value for {var}: {reason}")]
    Config { var: String, reason: String },
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, QuittungError>;
