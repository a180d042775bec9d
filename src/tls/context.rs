//! Shared client TLS context
//!
//! A `TlsContext` is built once per process (or per worker group) and every
//! connection is created from it. It is immutable after construction and may
//! be shared read-only between threads.

use super::cache::SessionCache;
use super::config::{ProtocolVersion, TlsError, TlsOptions, TlsVersion};
use super::connection::TlsConnection;
use super::vars::{protocol_info, ProtocolInfo};
use openssl::ex_data::Index;
use openssl::ssl::{
    Ssl, SslContext, SslContextBuilder, SslMethod, SslMode, SslSessionCacheMode, SslVerifyMode,
};
use std::error::Error as _;
use std::fmt;
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{debug, error, trace};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Ex-data slot linking an `Ssl` to the session cache of its connection
fn cache_index() -> Result<Index<Ssl, SessionCache>, TlsError> {
    static INDEX: Mutex<Option<Index<Ssl, SessionCache>>> = Mutex::new(None);

    let mut slot = INDEX.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    match *slot {
        Some(index) => Ok(index),
        None => {
            let index = Ssl::new_ex_index()?;
            *slot = Some(index);
            Ok(index)
        }
    }
}

/// Client TLS context (immutable after building)
pub struct TlsContext {
    ctx: SslContext,
    options: TlsOptions,
    cache_index: Index<Ssl, SessionCache>,
    id: u64,
    info: &'static ProtocolInfo,
}

impl TlsContext {
    /// Build a context, terminating the process on invalid configuration.
    ///
    /// A cipher list OpenSSL does not accept would break every connection
    /// made from this context, so it is not returned to the caller: the
    /// diagnostic and the OpenSSL error stack go to stderr and the process
    /// exits with status 1. Use [`TlsContext::builder`] to handle the error
    /// instead.
    pub fn init(options: TlsOptions) -> TlsContext {
        match TlsContext::builder().options(options).build() {
            Ok(ctx) => ctx,
            Err(err) => fatal(err),
        }
    }

    /// Create a new context builder
    pub fn builder() -> TlsContextBuilder {
        TlsContextBuilder::new()
    }

    /// Create a connection over `transport`.
    ///
    /// The transport must already be connected and in non-blocking mode.
    /// With a `cache`, the handshake offers its session for resumption and
    /// sessions produced by this connection are stored in it.
    pub fn connection<S>(
        &self,
        transport: S,
        cache: Option<&SessionCache>,
    ) -> Result<TlsConnection<S>, TlsError>
    where
        S: Read + Write + AsRawFd,
    {
        let mut ssl = Ssl::new(&self.ctx)?;
        if let Some(cache) = cache {
            ssl.set_ex_data(self.cache_index, cache.clone());
        }
        Ok(TlsConnection::new(
            ssl,
            transport,
            cache.cloned(),
            self.id,
            self.info,
        ))
    }

    pub fn options(&self) -> &TlsOptions {
        &self.options
    }

    pub fn session_reuse(&self) -> bool {
        self.options.session_reuse
    }

    /// Where handshakes from this context report the negotiated parameters
    pub fn protocol_info(&self) -> &'static ProtocolInfo {
        self.info
    }
}

impl fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsContext")
            .field("id", &self.id)
            .field("options", &self.options)
            .finish()
    }
}

fn fatal(err: TlsError) -> ! {
    error!(error = %err, "invalid TLS configuration");
    eprintln!("{}", err);
    if let Some(source) = err.source() {
        eprintln!("{}", source);
    }
    std::process::exit(1);
}

/// Context builder
pub struct TlsContextBuilder {
    options: TlsOptions,
    info: &'static ProtocolInfo,
}

impl TlsContextBuilder {
    fn new() -> Self {
        TlsContextBuilder {
            options: TlsOptions::default(),
            info: protocol_info(),
        }
    }

    /// Replace all options at once
    pub fn options(mut self, options: TlsOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the protocol version policy
    pub fn protocol_version(mut self, protocol: ProtocolVersion) -> Self {
        self.options.protocol = protocol;
        self
    }

    /// Pin TLS version (both min and max)
    pub fn version(self, version: TlsVersion) -> Self {
        self.protocol_version(ProtocolVersion::Fixed(version))
    }

    /// Set cipher list (for TLS <= 1.2)
    pub fn cipher_list(mut self, ciphers: impl Into<String>) -> Self {
        self.options.cipher_list = Some(ciphers.into());
        self
    }

    /// Set cipher suites (for TLS 1.3)
    pub fn ciphersuites(mut self, ciphers: impl Into<String>) -> Self {
        self.options.ciphersuites = Some(ciphers.into());
        self
    }

    /// Enable/disable client-side session resumption
    pub fn session_reuse(mut self, enabled: bool) -> Self {
        self.options.session_reuse = enabled;
        self
    }

    /// Report negotiated parameters to `info` instead of the process-wide
    /// instance
    pub fn report_to(mut self, info: &'static ProtocolInfo) -> Self {
        self.info = info;
        self
    }

    /// Build the TLS context
    pub fn build(self) -> Result<TlsContext, TlsError> {
        openssl::init();
        let cache_index = cache_index()?;

        let mut builder = SslContextBuilder::new(SslMethod::tls_client())?;

        // Peer certificates are never checked.
        builder.set_verify(SslVerifyMode::NONE);
        builder.set_verify_depth(0);
        builder.set_mode(SslMode::AUTO_RETRY | SslMode::ACCEPT_MOVING_WRITE_BUFFER);

        let (min, max) = self.options.protocol.bounds();
        builder.set_min_proto_version(min)?;
        builder.set_max_proto_version(max)?;

        if let Some(ref list) = self.options.cipher_list {
            builder
                .set_cipher_list(list)
                .map_err(|source| TlsError::CipherList {
                    list: list.clone(),
                    source,
                })?;
        }

        if let Some(ref list) = self.options.ciphersuites {
            builder
                .set_ciphersuites(list)
                .map_err(|source| TlsError::Ciphersuites {
                    list: list.clone(),
                    source,
                })?;
        }

        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);

        if self.options.session_reuse {
            builder.set_session_cache_mode(
                SslSessionCacheMode::CLIENT | SslSessionCacheMode::NO_INTERNAL,
            );
            builder.set_new_session_callback(move |ssl, session| {
                match ssl.ex_data(cache_index) {
                    Some(cache) => cache.store(session, id),
                    None => trace!(context = id, "no session cache attached, dropping session"),
                }
            });
        }

        debug!(
            context = id,
            protocol = %self.options.protocol,
            cipher_list = self.options.cipher_list.as_deref().unwrap_or("<default>"),
            session_reuse = self.options.session_reuse,
            "built TLS context"
        );

        Ok(TlsContext {
            ctx: builder.build(),
            options: self.options,
            cache_index,
            id,
            info: self.info,
        })
    }
}
