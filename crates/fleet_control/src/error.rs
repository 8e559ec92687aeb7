//! Error types for fleet orchestration.
//!
//! Every fallible operation in the crate returns [`FleetError`]. Only
//! configuration errors ever reach a caller of the dispatcher; probe, I/O and
//! protocol failures are recovered locally and turned into registry evictions,
//! [`FleetStatus`](crate::types::FleetStatus) values, or dropped messages.

use thiserror::Error;

/// Errors that can occur while orchestrating the fleet.
#[derive(Debug, Error)]
pub enum FleetError {
    /// A configuration lookup failed (unknown instance type, missing port).
    ///
    /// There is no safe default for these values, so they are surfaced
    /// instead of being papered over.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem or process I/O failed during provisioning.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame could not be encoded or decoded.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A health probe against an instance failed.
    #[error("Probe failed for {instance}: {reason}")]
    Probe {
        /// Name of the probed instance
        instance: String,
        /// Human readable failure cause
        reason: String,
    },

    /// Sending a message through the host transport failed.
    #[error("Transport error: {0}")]
    Transport(String),
}

impl FleetError {
    /// Shorthand for building a [`FleetError::Probe`].
    pub fn probe(instance: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Probe {
            instance: instance.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error is a configuration precondition violation.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
