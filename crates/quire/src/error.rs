// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Error types for the quire kernel.
//!
//! Handlers and hooks report failures as [`anyhow::Error`]; the kernel turns
//! those into responses through the `on_error` hook. [`QuireError`] covers the
//! failures of the kernel itself, which all happen at route registration.

use thiserror::Error;

/// The main error type for kernel operations.
#[derive(Error, Debug)]
pub enum QuireError {
    /// A route pattern could not be compiled.
    #[error("Invalid route pattern {pattern:?}: {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Why the pattern was rejected.
        reason: String,
    },

    /// An HTTP method string is not a valid token.
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),
}

impl QuireError {
    pub(crate) fn invalid_pattern(pattern: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }
}

/// Convenience type alias for Results with [`QuireError`].
pub type Result<T> = std::result::Result<T, QuireError>;
