//! Non-blocking TLS client connections
//!
//! This module layers OpenSSL client sessions over non-blocking transports
//! for use inside an event loop. Nothing here blocks or waits: every
//! operation performs one step and reports whether it finished, needs the
//! transport to become readable/writable first, or failed.
//!
//! # Architecture
//!
//! 1. `TlsContext` holds the shared OpenSSL configuration (version bounds,
//!    cipher list, session reuse). Build it once and share it read-only.
//! 2. `TlsConnection` drives one connection's handshake/read/write/close.
//! 3. `SessionCache` keeps the latest resumable session of a worker so the
//!    next connection on that worker can skip the full handshake.
//! 4. `ProtocolInfo` reports the negotiated protocol and cipher once per
//!    process.
//!
//! Peer certificates are not verified.
//!
//! # Examples
//!
//! ```no_run
//! use nbtls::tls::{SessionCache, Status, TlsContext, TlsOptions, TlsVersion, ProtocolVersion};
//! use std::net::TcpStream;
//!
//! let ctx = TlsContext::init(TlsOptions {
//!     protocol: ProtocolVersion::Fixed(TlsVersion::Tls12),
//!     cipher_list: Some("HIGH".to_string()),
//!     session_reuse: true,
//!     ..Default::default()
//! });
//! let cache = SessionCache::new();
//!
//! let stream = TcpStream::connect("example.com:443").unwrap();
//! stream.set_nonblocking(true).unwrap();
//! let mut conn = ctx.connection(stream, Some(&cache)).unwrap();
//!
//! loop {
//!     match conn.connect("example.com") {
//!         Status::Ok(()) => break,
//!         Status::Retry(_readiness) => { /* wait in the event loop */ }
//!         Status::Error(err) => panic!("handshake failed: {}", err),
//!     }
//! }
//! conn.close();
//! ```

pub mod cache;
pub mod config;
pub mod connection;
pub mod context;
pub mod status;
pub mod vars;

pub use cache::{CacheStats, SessionCache};
pub use config::{ProtocolVersion, TlsError, TlsOptions, TlsVersion};
pub use connection::{ConnectionState, TlsConnection, RECV_BUF_SIZE};
pub use context::{TlsContext, TlsContextBuilder};
pub use status::{Readiness, Status};
pub use vars::{protocol_info, ConnectionInfo, Negotiated, ProtocolInfo};

/// Result type for TLS operations
pub type Result<T> = std::result::Result<T, TlsError>;
