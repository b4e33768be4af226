//! Typed error hierarchy for the eaactl crate.
//!
//! `EaaError` maps each variant to a real system boundary:
//! - `Network` wraps `reqwest::Error` for transport failures (DNS, TCP,
//!   TLS, request timeout) that never produced an HTTP status.
//! - `Api` preserves the status and the raw response body of a non-2xx
//!   answer from the management API.
//! - `Parse` wraps `serde_json::Error` when a response has an unexpected
//!   shape.
//! - `Config` covers unusable configuration or credentials.
//! - `Output` covers failures writing to the output destination.
//!
//! The event log poller only cares about one question per error: can
//! retrying fix it? [`EaaError::class`] answers it.

use reqwest::StatusCode;

/// Unified error type for all eaactl library operations.
#[derive(Debug, thiserror::Error)]
pub enum EaaError {
    /// The management API returned a non-success HTTP status code.
    #[error("API error {status}: {body}")]
    Api {
        /// The HTTP status code returned by the API.
        status: StatusCode,
        /// The raw response body text, or an empty string if it could not
        /// be read.
        body: String,
    },

    /// JSON deserialization failed when parsing an API response body.
    #[error("failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),

    /// A network-level failure occurred before a status code was received.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The configuration or the credentials cannot be used as given.
    #[error("configuration error: {message}")]
    Config {
        /// What is wrong with the configuration.
        message: String,
    },

    /// Writing to the output destination failed.
    #[error("output error: {0}")]
    Output(#[from] std::io::Error),
}

/// Whether retrying an operation that failed with a given error can succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Expected to resolve on its own: timeouts, resets, 5xx, 429,
    /// malformed bodies.
    Transient,
    /// Retrying cannot help: rejected credentials, bad configuration,
    /// a broken output stream.
    Fatal,
}

impl EaaError {
    /// Builds a `Config` error from anything printable.
    pub fn config(message: impl Into<String>) -> Self {
        EaaError::Config {
            message: message.into(),
        }
    }

    /// Classifies the error for the retry policy.
    ///
    /// Only authentication/authorization rejections, configuration and
    /// output failures are fatal. Every other API status is absorbed by
    /// the retry loop.
    pub fn class(&self) -> ErrorClass {
        match self {
            EaaError::Api { status, .. } if is_auth_status(*status) => ErrorClass::Fatal,
            EaaError::Config { .. } | EaaError::Output(_) => ErrorClass::Fatal,
            EaaError::Api { .. } | EaaError::Parse(_) | EaaError::Network(_) => {
                ErrorClass::Transient
            }
        }
    }

    /// Returns `true` for a 401 or 403 answer from the API.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, EaaError::Api { status, .. } if is_auth_status(*status))
    }
}

fn is_auth_status(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, EaaError>;
