//! Single-slot session cache
//!
//! Holds at most one resumable session. OpenSSL pushes new sessions into it
//! through the new-session callback registered by the context, and a
//! connection reads it back once, right before its handshake starts.

use openssl::ssl::SslSession;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Counters describing what a cache has seen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Sessions stored so far
    pub stored: u64,
    /// Stored sessions that released a previous one
    pub replaced: u64,
}

struct CachedSession {
    session: SslSession,
    /// Identity of the context whose callback produced the session
    context_id: u64,
}

#[derive(Default)]
struct Slot {
    cached: Option<CachedSession>,
    stats: CacheStats,
}

/// Cache of the most recent resumable session
///
/// Cloning yields another handle to the same slot. One cache is meant to be
/// owned by one worker and attached to the connections it creates.
#[derive(Clone, Default)]
pub struct SessionCache {
    slot: Arc<Mutex<Slot>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        // The slot stays consistent even if a holder panicked.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// True if no session is cached
    pub fn is_empty(&self) -> bool {
        self.lock().cached.is_none()
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    /// Release the cached session, if any
    pub fn clear(&self) {
        let released = self.lock().cached.take();
        if released.is_some() {
            debug!("released cached TLS session");
        }
    }

    /// Store `session`, releasing the previous one
    pub(crate) fn store(&self, session: SslSession, context_id: u64) {
        let previous = {
            let mut slot = self.lock();
            let previous = slot.cached.replace(CachedSession { session, context_id });
            slot.stats.stored += 1;
            if previous.is_some() {
                slot.stats.replaced += 1;
            }
            previous
        };
        debug!(
            context = context_id,
            replaced = previous.is_some(),
            "cached TLS session"
        );
    }

    /// Cached session produced by the context `context_id`
    pub(crate) fn session_for(&self, context_id: u64) -> Option<SslSession> {
        self.lock()
            .cached
            .as_ref()
            .filter(|cached| cached.context_id == context_id)
            .map(|cached| cached.session.clone())
    }
}

impl std::fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.lock();
        f.debug_struct("SessionCache")
            .field("cached", &slot.cached.is_some())
            .field("stats", &slot.stats)
            .finish()
    }
}
