//! # Error Module
//!
//! Typed errors surfaced by the tuner engine. Every failure is local to a
//! single `start()` call or a single configuration update; nothing here is
//! fatal to the process.

use thiserror::Error;

/// Errors returned by [`TunerSession`](crate::session::TunerSession) and the
/// configuration surface.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TunerError {
    /// The audio source could not be acquired (no device, permission denied,
    /// device busy, unsupported format). The session stays `Idle`.
    #[error("audio capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// A configuration value lies outside its documented domain. The previous
    /// configuration remains in effect.
    #[error("invalid config field `{field}`: {reason}")]
    InvalidConfig {
        /// Name of the offending field.
        field: &'static str,
        /// Human readable description of the violated constraint.
        reason: String,
    },
}

impl TunerError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        TunerError::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TunerError>;
