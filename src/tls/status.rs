//! Tri-state outcome of non-blocking TLS operations
//!
//! Every operation that touches the transport either completes, asks the
//! caller to wait for readiness and call again, or fails for good. A retry
//! is an expected outcome of non-blocking I/O, so it is a variant of its own
//! rather than an error.

use super::config::TlsError;
use openssl::ssl::{Error as SslError, ErrorCode};

/// Readiness the caller has to wait for before repeating an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// OpenSSL needs more input from the peer (WANT_READ)
    Read,
    /// OpenSSL needs the transport to accept more output (WANT_WRITE)
    Write,
}

/// Outcome of a single non-blocking TLS step
#[derive(Debug)]
#[must_use]
pub enum Status<T> {
    /// The operation completed
    Ok(T),
    /// No progress was made; repeat the identical call once the transport
    /// is ready in the given direction
    Retry(Readiness),
    /// The connection is unusable and must be closed
    Error(TlsError),
}

impl<T> Status<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok(_))
    }

    pub fn is_retry(&self) -> bool {
        matches!(self, Status::Retry(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Status::Error(_))
    }

    /// Readiness to wait for, if this is a retry
    pub fn readiness(&self) -> Option<Readiness> {
        match self {
            Status::Retry(readiness) => Some(*readiness),
            _ => None,
        }
    }

    /// Get the completed value, if any
    pub fn ok(self) -> Option<T> {
        match self {
            Status::Ok(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Status<U> {
        match self {
            Status::Ok(value) => Status::Ok(f(value)),
            Status::Retry(readiness) => Status::Retry(readiness),
            Status::Error(err) => Status::Error(err),
        }
    }
}

/// Classify an OpenSSL error into retry or failure
///
/// `wrap` builds the fatal error for the operation that failed.
pub(crate) fn classify<T>(err: SslError, wrap: fn(SslError) -> TlsError) -> Status<T> {
    let code = err.code();
    if code == ErrorCode::WANT_READ {
        Status::Retry(Readiness::Read)
    } else if code == ErrorCode::WANT_WRITE {
        Status::Retry(Readiness::Write)
    } else {
        Status::Error(wrap(err))
    }
}
