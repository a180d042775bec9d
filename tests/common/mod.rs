//! Shared test harness
//!
//! An in-memory non-blocking transport plus an OpenSSL server endpoint, so
//! handshakes can be stepped deterministically on a single thread.

#![allow(dead_code)]

use nbtls::tls::{Status, TlsConnection, TlsError};
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::ssl::{
    ErrorCode, NameType, Ssl, SslContext, SslContextBuilder, SslMethod, SslStream, SslVersion,
};
use openssl::x509::{X509NameBuilder, X509};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::rc::Rc;

pub const HOST: &str = "example.test";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
struct Pipe {
    data: VecDeque<u8>,
    closed: bool,
}

/// One end of an in-memory byte stream that never blocks
///
/// Reads return `WouldBlock` while no data is queued and the peer is open.
pub struct MemStream {
    id: RawFd,
    incoming: Rc<RefCell<Pipe>>,
    outgoing: Rc<RefCell<Pipe>>,
}

/// Create a connected pair; `id` is the descriptor the client end reports
pub fn mem_pair(id: RawFd) -> (MemStream, MemStream) {
    let up = Rc::new(RefCell::new(Pipe::default()));
    let down = Rc::new(RefCell::new(Pipe::default()));
    let client = MemStream {
        id,
        incoming: down.clone(),
        outgoing: up.clone(),
    };
    let server = MemStream {
        id: id + 10_000,
        incoming: up,
        outgoing: down,
    };
    (client, server)
}

impl MemStream {
    /// Queue raw bytes for the peer, bypassing TLS
    pub fn inject(&self, bytes: &[u8]) {
        self.outgoing.borrow_mut().data.extend(bytes);
    }
}

impl Read for MemStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut pipe = self.incoming.borrow_mut();
        if pipe.data.is_empty() {
            if pipe.closed {
                return Ok(0);
            }
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = buf.len().min(pipe.data.len());
        for (dst, src) in buf.iter_mut().zip(pipe.data.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }
}

impl Write for MemStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut pipe = self.outgoing.borrow_mut();
        if pipe.closed {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        pipe.data.extend(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl AsRawFd for MemStream {
    fn as_raw_fd(&self) -> RawFd {
        self.id
    }
}

impl Drop for MemStream {
    fn drop(&mut self) {
        self.outgoing.borrow_mut().closed = true;
    }
}

/// Self-signed ECDSA certificate for `HOST`
pub fn self_signed() -> (X509, PKey<Private>) {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, HOST).unwrap();
    let name = name.build();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(30).unwrap())
        .unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();

    (builder.build(), key)
}

/// Server context accepting versions up to `max` (newest if `None`)
pub fn server_context(max: Option<SslVersion>) -> SslContext {
    let (cert, key) = self_signed();
    let mut builder = SslContextBuilder::new(SslMethod::tls_server()).unwrap();
    builder.set_certificate(&cert).unwrap();
    builder.set_private_key(&key).unwrap();
    builder.set_max_proto_version(max).unwrap();
    builder.build()
}

/// Server side of an in-memory connection
pub struct MemServer {
    stream: SslStream<MemStream>,
    done: bool,
    failed: bool,
    peer_closed: bool,
}

impl MemServer {
    pub fn new(ctx: &SslContext, transport: MemStream) -> Self {
        let ssl = Ssl::new(ctx).unwrap();
        MemServer {
            stream: SslStream::new(ssl, transport).unwrap(),
            done: false,
            failed: false,
            peer_closed: false,
        }
    }

    /// Advance the server handshake; true once complete
    pub fn step(&mut self) -> bool {
        if !self.done && !self.failed {
            match self.stream.accept() {
                Ok(()) => self.done = true,
                Err(e) if e.code() == ErrorCode::WANT_READ || e.code() == ErrorCode::WANT_WRITE => {}
                // The alert is already queued for the client.
                Err(_) => self.failed = true,
            }
        }
        self.done
    }

    pub fn failed(&self) -> bool {
        self.failed
    }

    pub fn session_reused(&self) -> bool {
        self.stream.ssl().session_reused()
    }

    pub fn servername(&self) -> Option<String> {
        self.stream
            .ssl()
            .servername(NameType::HOST_NAME)
            .map(|s| s.to_string())
    }

    pub fn write_all(&mut self, data: &[u8]) {
        let mut off = 0;
        while off < data.len() {
            off += self.stream.ssl_write(&data[off..]).unwrap();
        }
    }

    /// Everything the client sent so far
    pub fn read_available(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            match self.stream.ssl_read(&mut buf) {
                Ok(n) => out.extend_from_slice(&buf[..n]),
                Err(e) if e.code() == ErrorCode::WANT_READ => break,
                Err(e) if e.code() == ErrorCode::ZERO_RETURN => {
                    self.peer_closed = true;
                    break;
                }
                Err(e) => panic!("server read failed: {}", e),
            }
        }
        out
    }

    /// True once the client's close_notify was seen
    pub fn peer_closed(&self) -> bool {
        self.peer_closed
    }

    pub fn shutdown(&mut self) {
        self.stream.shutdown().unwrap();
    }
}

/// Step client and server until the client handshake resolves.
///
/// Returns the number of `Retry` results the client saw.
pub fn handshake(
    client: &mut TlsConnection<MemStream>,
    server: &mut MemServer,
) -> Result<usize, TlsError> {
    let mut retries = 0;
    for _ in 0..64 {
        match client.connect(HOST) {
            Status::Ok(()) => {
                // A resumed or TLS 1.3 server still waits for our Finished.
                for _ in 0..8 {
                    if server.step() {
                        break;
                    }
                }
                return Ok(retries);
            }
            Status::Retry(_) => retries += 1,
            Status::Error(err) => return Err(err),
        }
        server.step();
    }
    panic!("handshake did not finish");
}

/// Let the client process whatever the server sent after the handshake,
/// such as TLS 1.3 session tickets
pub fn drain_post_handshake(client: &mut TlsConnection<MemStream>) {
    match client.read() {
        Status::Ok(n) => panic!("unexpected {} bytes of application data", n),
        Status::Retry(_) => {}
        Status::Error(err) => panic!("post-handshake read failed: {}", err),
    }
}
