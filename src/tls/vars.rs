//! Negotiated connection parameters
//!
//! `ConnectionInfo` describes one established connection. `ProtocolInfo` is
//! the process-wide report of the protocol version and cipher, captured from
//! the first handshake that completes.

use openssl::ssl::{NameType, SslRef};
use std::sync::OnceLock;

/// Protocol version and cipher name negotiated by a handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    /// Negotiated TLS version (e.g., "TLSv1.3")
    pub version: String,
    /// Negotiated cipher suite
    pub cipher: String,
}

/// Write-once record of the negotiated protocol and cipher
///
/// All connections of a process are assumed to negotiate the same
/// parameters, so only the first completed handshake is recorded and later
/// ones are ignored. When several workers finish their first handshake at
/// the same time exactly one of them wins; the others are not reported even
/// if they negotiated something different.
#[derive(Debug)]
pub struct ProtocolInfo {
    negotiated: OnceLock<Negotiated>,
}

static PROTOCOL_INFO: ProtocolInfo = ProtocolInfo::new();

/// Process-wide protocol report, used by contexts unless told otherwise
pub fn protocol_info() -> &'static ProtocolInfo {
    &PROTOCOL_INFO
}

impl ProtocolInfo {
    pub const fn new() -> Self {
        ProtocolInfo {
            negotiated: OnceLock::new(),
        }
    }

    /// Store the pair unless one was stored before.
    ///
    /// Returns true if this call stored it.
    pub fn record(&self, version: &str, cipher: &str) -> bool {
        if self.negotiated.get().is_some() {
            return false;
        }
        self.negotiated
            .set(Negotiated {
                version: version.to_string(),
                cipher: cipher.to_string(),
            })
            .is_ok()
    }

    /// Record from a freshly established connection
    pub(crate) fn record_ssl(&self, ssl: &SslRef) -> bool {
        if self.is_set() {
            return false;
        }
        let cipher = ssl.current_cipher().map(|c| c.name()).unwrap_or("<undef>");
        self.record(ssl.version_str(), cipher)
    }

    pub fn is_set(&self) -> bool {
        self.negotiated.get().is_some()
    }

    pub fn get(&self) -> Option<&Negotiated> {
        self.negotiated.get()
    }

    pub fn version(&self) -> Option<&str> {
        self.get().map(|n| n.version.as_str())
    }

    pub fn cipher(&self) -> Option<&str> {
        self.get().map(|n| n.cipher.as_str())
    }
}

impl Default for ProtocolInfo {
    fn default() -> Self {
        Self::new()
    }
}

/// Parameters of an established connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Negotiated TLS version (e.g., "TLSv1.3")
    pub version: String,

    /// Negotiated cipher suite
    pub cipher: String,

    /// SNI servername sent by this client
    pub servername: Option<String>,

    /// Whether the handshake resumed a cached session
    pub session_reused: bool,
}

impl ConnectionInfo {
    /// Create connection info from an SSL connection
    pub fn from_ssl(ssl: &SslRef) -> Self {
        ConnectionInfo {
            version: ssl.version_str().to_string(),
            cipher: ssl
                .current_cipher()
                .map(|c| c.name().to_string())
                .unwrap_or_else(|| "<undef>".to_string()),
            servername: ssl.servername(NameType::HOST_NAME).map(|s| s.to_string()),
            session_reused: ssl.session_reused(),
        }
    }
}
