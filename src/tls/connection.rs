//! Non-blocking TLS connection
//!
//! A `TlsConnection` drives the client handshake, reads and writes over a
//! non-blocking transport, one step per call. Whenever OpenSSL cannot make
//! progress the call returns [`Status::Retry`] and the caller repeats the
//! very same call once the transport is ready; OpenSSL keeps all partial
//! state in between.

use super::cache::SessionCache;
use super::config::TlsError;
use super::status::{classify, Status};
use super::vars::{ConnectionInfo, ProtocolInfo};
use openssl::ssl::{ErrorCode, Ssl, SslStream};
use std::io::{Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use tracing::{debug, trace};

/// Size of the internal read buffer
pub const RECV_BUF_SIZE: usize = 8192;

/// Connection state
///
/// A closed connection no longer exists: [`TlsConnection::close`] consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, handshake not started
    Disconnected,
    /// Handshake started, not finished
    Handshaking,
    /// Handshake complete, application data may flow
    Established,
}

enum Handle<S> {
    /// TLS handle not yet attached to the transport
    Unbound { ssl: Ssl, transport: S },
    /// TLS handle reading from and writing to the transport
    Bound(SslStream<S>),
    /// Attaching the transport failed
    Detached,
}

/// Client TLS connection over a non-blocking transport
pub struct TlsConnection<S> {
    handle: Handle<S>,
    /// Descriptor of the transport the TLS handle is attached to; `None`
    /// until the first `connect`
    bound_fd: Option<RawFd>,
    cache: Option<SessionCache>,
    context_id: u64,
    info: &'static ProtocolInfo,
    state: ConnectionState,
    buf: Box<[u8; RECV_BUF_SIZE]>,
    filled: usize,
}

impl<S: Read + Write + AsRawFd> TlsConnection<S> {
    pub(crate) fn new(
        ssl: Ssl,
        transport: S,
        cache: Option<SessionCache>,
        context_id: u64,
        info: &'static ProtocolInfo,
    ) -> Self {
        TlsConnection {
            handle: Handle::Unbound { ssl, transport },
            bound_fd: None,
            cache,
            context_id,
            info,
            state: ConnectionState::Disconnected,
            buf: Box::new([0u8; RECV_BUF_SIZE]),
            filled: 0,
        }
    }

    /// Drive the handshake one step.
    ///
    /// The first call offers the cached session (if any) and sends `hostname`
    /// as SNI. On [`Status::Retry`] call again with the same hostname once
    /// the transport is ready in the indicated direction. Calling this on an
    /// established connection returns `Ok` again.
    pub fn connect(&mut self, hostname: &str) -> Status<()> {
        if self.state == ConnectionState::Established {
            return Status::Ok(());
        }

        if let Handle::Unbound { ssl, transport } = &mut self.handle {
            let fd = transport.as_raw_fd();

            // The handle is not attached to any transport yet, so this runs
            // once per connection; retries never replace the session
            // mid-handshake.
            if let Some(session) = self
                .cache
                .as_ref()
                .and_then(|cache| cache.session_for(self.context_id))
            {
                // SAFETY: the cache only hands out sessions created by this
                // connection's context.
                match unsafe { ssl.set_session(&session) } {
                    Ok(()) => debug!(fd, "offering cached TLS session"),
                    Err(err) => debug!(fd, error = %err, "cached TLS session not usable"),
                }
            }

            if let Err(err) = ssl.set_hostname(hostname) {
                return Status::Error(err.into());
            }

            if let Err(err) = self.bind() {
                return Status::Error(err);
            }
        }

        let stream = match &mut self.handle {
            Handle::Bound(stream) => stream,
            _ => return Status::Error(TlsError::InvalidState("TLS handle detached")),
        };

        self.state = ConnectionState::Handshaking;
        match stream.connect() {
            Ok(()) => {
                self.state = ConnectionState::Established;
                let ssl = stream.ssl();
                if self.info.record_ssl(ssl) {
                    debug!(
                        version = ssl.version_str(),
                        cipher = ssl.current_cipher().map(|c| c.name()).unwrap_or("<undef>"),
                        "recorded negotiated protocol"
                    );
                }
                debug!(
                    fd = self.bound_fd,
                    hostname,
                    resumed = ssl.session_reused(),
                    "TLS handshake complete"
                );
                Status::Ok(())
            }
            Err(err) => {
                let status = classify(err, TlsError::Handshake);
                if let Status::Retry(readiness) = &status {
                    trace!(fd = self.bound_fd, ?readiness, "TLS handshake in progress");
                }
                status
            }
        }
    }

    /// Attach the TLS handle to the transport
    fn bind(&mut self) -> Result<(), TlsError> {
        let (ssl, transport) = match std::mem::replace(&mut self.handle, Handle::Detached) {
            Handle::Unbound { ssl, transport } => (ssl, transport),
            other => {
                self.handle = other;
                return Ok(());
            }
        };

        let fd = transport.as_raw_fd();
        self.handle = Handle::Bound(SslStream::new(ssl, transport)?);
        self.bound_fd = Some(fd);
        Ok(())
    }

    /// Read and decrypt once into the internal buffer.
    ///
    /// Returns the number of bytes now in [`buffer`](Self::buffer). `Ok(0)`
    /// means the peer closed the TLS session cleanly.
    pub fn read(&mut self) -> Status<usize> {
        self.filled = 0;
        let stream = match established(&mut self.handle, self.state) {
            Ok(stream) => stream,
            Err(err) => return Status::Error(err),
        };

        match stream.ssl_read(&mut self.buf[..]) {
            Ok(n) => {
                self.filled = n;
                Status::Ok(n)
            }
            Err(err) if err.code() == ErrorCode::ZERO_RETURN => Status::Ok(0),
            Err(err) => classify(err, TlsError::Read),
        }
    }

    /// Encrypt and write up to `buf.len()` bytes once.
    ///
    /// On [`Status::Retry`] nothing was consumed; repeat with the same data.
    pub fn write(&mut self, buf: &[u8]) -> Status<usize> {
        if buf.is_empty() {
            return Status::Ok(0);
        }
        let stream = match established(&mut self.handle, self.state) {
            Ok(stream) => stream,
            Err(err) => return Status::Error(err),
        };

        match stream.ssl_write(buf) {
            Ok(n) => Status::Ok(n),
            Err(err) => classify(err, TlsError::Write),
        }
    }

    /// Decrypted bytes buffered by OpenSSL, readable without further I/O
    pub fn pending(&self) -> usize {
        match &self.handle {
            Handle::Bound(stream) => stream.ssl().pending(),
            _ => 0,
        }
    }

    /// Data produced by the last successful [`read`](Self::read)
    pub fn buffer(&self) -> &[u8] {
        &self.buf[..self.filled]
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Negotiated parameters, once established
    pub fn info(&self) -> Option<ConnectionInfo> {
        match (&self.handle, self.state) {
            (Handle::Bound(stream), ConnectionState::Established) => {
                Some(ConnectionInfo::from_ssl(stream.ssl()))
            }
            _ => None,
        }
    }

    /// Descriptor of the transport, if the connection still owns one
    pub fn fd(&self) -> Option<RawFd> {
        self.transport().map(|t| t.as_raw_fd())
    }

    /// Get reference to the underlying transport
    pub fn transport(&self) -> Option<&S> {
        match &self.handle {
            Handle::Unbound { transport, .. } => Some(transport),
            Handle::Bound(stream) => Some(stream.get_ref()),
            Handle::Detached => None,
        }
    }

    /// Send close_notify and release all TLS resources.
    ///
    /// The shutdown is a single non-blocking attempt whose outcome is
    /// ignored. The transport is dropped with the connection; pass a
    /// borrowed transport (e.g. `&TcpStream`) to keep the socket.
    pub fn close(mut self) {
        if let Handle::Bound(stream) = &mut self.handle {
            if let Err(err) = stream.shutdown() {
                debug!(fd = self.bound_fd, error = %err, "TLS shutdown incomplete");
            }
        }
        trace!(fd = self.bound_fd, "TLS connection closed");
    }
}

fn established<S>(
    handle: &mut Handle<S>,
    state: ConnectionState,
) -> Result<&mut SslStream<S>, TlsError> {
    match (handle, state) {
        (Handle::Bound(stream), ConnectionState::Established) => Ok(stream),
        _ => Err(TlsError::InvalidState("handshake not complete")),
    }
}

impl<S> std::fmt::Debug for TlsConnection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConnection")
            .field("state", &self.state)
            .field("bound_fd", &self.bound_fd)
            .field("cache", &self.cache.is_some())
            .finish()
    }
}
