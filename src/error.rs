//! Error types for the raccoon KV client

use std::io;
use thiserror::Error;

/// Errors that can occur when talking to the key-value store
#[derive(Error, Debug)]
pub enum Error {
    /// The response carried no `etag` header
    #[error("Protocol error: missing version")]
    MissingVersion,

    /// The server answered with a status the operation does not expect
    #[error("Unexpected status code {0}")]
    UnexpectedStatus(u16),

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// The request did not complete within its per-request timeout
    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    /// I/O error, usually while reading a response body
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS/SSL error
    #[error("TLS error: {0}")]
    Tls(String),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The request could not be built (empty key, bad header value, ...)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration could not be loaded
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A value fetched through a string helper was not valid UTF-8
    #[error("Invalid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

impl Error {
    /// True when the per-request timeout elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }

    /// True for failures raised by the underlying transport.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Connection(_) | Error::Timeout(_) | Error::Io(_) | Error::Tls(_)
        )
    }

    /// True when the server violated the wire protocol.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Error::MissingVersion)
    }

    /// The offending HTTP status, if this is an unexpected-status error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::UnexpectedStatus(code) => Some(*code),
            _ => None,
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Error>;
