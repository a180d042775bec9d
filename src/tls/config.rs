//! TLS configuration
//!
//! Protocol versions, context options and the error type shared by the
//! whole TLS layer.

use openssl::ssl::SslVersion;
use std::fmt;
use std::str::FromStr;

/// TLS version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    /// SSL 3.0 (deprecated, rarely used)
    Ssl3,
    /// TLS 1.0
    Tls10,
    /// TLS 1.1
    Tls11,
    /// TLS 1.2
    Tls12,
    /// TLS 1.3
    Tls13,
}

impl TlsVersion {
    /// Map a protocol version number as it appears on the wire
    /// (`0x0303` is TLS 1.2)
    pub fn from_raw(raw: u16) -> Result<Self, TlsError> {
        match raw {
            0x0300 => Ok(TlsVersion::Ssl3),
            0x0301 => Ok(TlsVersion::Tls10),
            0x0302 => Ok(TlsVersion::Tls11),
            0x0303 => Ok(TlsVersion::Tls12),
            0x0304 => Ok(TlsVersion::Tls13),
            _ => Err(TlsError::InvalidVersion(format!("{:#06x}", raw))),
        }
    }

    /// Protocol version number
    pub fn raw(&self) -> u16 {
        match self {
            TlsVersion::Ssl3 => 0x0300,
            TlsVersion::Tls10 => 0x0301,
            TlsVersion::Tls11 => 0x0302,
            TlsVersion::Tls12 => 0x0303,
            TlsVersion::Tls13 => 0x0304,
        }
    }

    /// Get OpenSSL protocol version constant
    pub fn to_openssl_version(&self) -> SslVersion {
        match self {
            TlsVersion::Ssl3 => SslVersion::SSL3,
            TlsVersion::Tls10 => SslVersion::TLS1,
            TlsVersion::Tls11 => SslVersion::TLS1_1,
            TlsVersion::Tls12 => SslVersion::TLS1_2,
            TlsVersion::Tls13 => SslVersion::TLS1_3,
        }
    }

    /// Get version as string, spelled the way OpenSSL reports it
    pub fn as_str(&self) -> &'static str {
        match self {
            TlsVersion::Ssl3 => "SSLv3",
            TlsVersion::Tls10 => "TLSv1",
            TlsVersion::Tls11 => "TLSv1.1",
            TlsVersion::Tls12 => "TLSv1.2",
            TlsVersion::Tls13 => "TLSv1.3",
        }
    }
}

impl FromStr for TlsVersion {
    type Err = TlsError;

    /// Parse TLS version from string (case-insensitive)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SSLV3" | "SSL3" => Ok(TlsVersion::Ssl3),
            "TLSV1.0" | "TLS1.0" | "TLSV1" | "TLS1" => Ok(TlsVersion::Tls10),
            "TLSV1.1" | "TLS1.1" => Ok(TlsVersion::Tls11),
            "TLSV1.2" | "TLS1.2" => Ok(TlsVersion::Tls12),
            "TLSV1.3" | "TLS1.3" => Ok(TlsVersion::Tls13),
            _ => Err(TlsError::InvalidVersion(s.to_string())),
        }
    }
}

impl fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol version policy of a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolVersion {
    /// No minimum, maximum is the newest version the linked OpenSSL knows
    #[default]
    Auto,
    /// Minimum and maximum pinned to exactly this version
    Fixed(TlsVersion),
}

impl ProtocolVersion {
    /// `0` means auto-negotiate, anything else pins that protocol number
    pub fn from_raw(raw: u16) -> Result<Self, TlsError> {
        match raw {
            0 => Ok(ProtocolVersion::Auto),
            n => TlsVersion::from_raw(n).map(ProtocolVersion::Fixed),
        }
    }

    /// `(min, max)` bounds for OpenSSL; `None` leaves a bound open
    pub fn bounds(&self) -> (Option<SslVersion>, Option<SslVersion>) {
        match self {
            ProtocolVersion::Auto => (None, None),
            ProtocolVersion::Fixed(v) => {
                (Some(v.to_openssl_version()), Some(v.to_openssl_version()))
            }
        }
    }
}

impl FromStr for ProtocolVersion {
    type Err = TlsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "0" => Ok(ProtocolVersion::Auto),
            t if t.eq_ignore_ascii_case("auto") => Ok(ProtocolVersion::Auto),
            t => t.parse().map(ProtocolVersion::Fixed),
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::Auto => f.write_str("auto"),
            ProtocolVersion::Fixed(v) => v.fmt(f),
        }
    }
}

/// Options a context is built from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsOptions {
    /// Protocol version policy
    pub protocol: ProtocolVersion,
    /// OpenSSL cipher list for TLS <= 1.2, applied verbatim
    pub cipher_list: Option<String>,
    /// OpenSSL cipher suites for TLS 1.3, applied verbatim
    pub ciphersuites: Option<String>,
    /// Keep the latest resumable session in a `SessionCache`
    pub session_reuse: bool,
}

/// TLS errors
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TLS version: {0}")]
    InvalidVersion(String),

    #[error("error setting cipher list [{list}]")]
    CipherList {
        list: String,
        #[source]
        source: openssl::error::ErrorStack,
    },

    #[error("error setting TLS 1.3 cipher suites [{list}]")]
    Ciphersuites {
        list: String,
        #[source]
        source: openssl::error::ErrorStack,
    },

    #[error("Handshake failed: {0}")]
    Handshake(#[source] openssl::ssl::Error),

    #[error("TLS read failed: {0}")]
    Read(#[source] openssl::ssl::Error),

    #[error("TLS write failed: {0}")]
    Write(#[source] openssl::ssl::Error),

    #[error("Invalid connection state: {0}")]
    InvalidState(&'static str),
}
