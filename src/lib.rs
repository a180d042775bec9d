//! nbtls - non-blocking TLS client connections
//!
//! This crate provides an event-loop friendly TLS connection layer on top of
//! OpenSSL: a shared client context, retry-safe handshake/read/write
//! primitives, and a single-slot session cache for resumption across
//! reconnects.

pub mod tls;

pub use tls::{
    ConnectionState, Readiness, SessionCache, Status, TlsConnection, TlsContext, TlsError,
    TlsOptions,
};
