//! CPU-wake lease around the agent's critical sections.
//!
//! The platform wake lock is behind [`WakeLock`]. [`PowerLease`] adds the
//! idempotent acquire, the held-only release and the expiry bookkeeping;
//! [`LeaseGuard`] releases on drop so early returns still release.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Platform backend keeping the processor awake.
pub trait WakeLock: Send + Sync {
    /// Keep the processor awake for at most `timeout`.
    fn acquire(&self, timeout: Duration);

    fn release(&self);
}

/// Host backend: there is nothing to keep awake, so it only logs.
#[derive(Debug, Default)]
pub struct LogWakeLock;

impl WakeLock for LogWakeLock {
    fn acquire(&self, timeout: Duration) {
        tracing::debug!(timeout_secs = timeout.as_secs(), "Wake lock acquired");
    }

    fn release(&self) {
        tracing::debug!("Wake lock released");
    }
}

/// The process-wide wake lease.
pub struct PowerLease {
    backend: Arc<dyn WakeLock>,
    /// Expiry of the current hold, `None` when not held
    expires_at: Mutex<Option<Instant>>,
}

impl PowerLease {
    pub fn new(backend: Arc<dyn WakeLock>) -> Self {
        Self {
            backend,
            expires_at: Mutex::new(None),
        }
    }

    /// Acquire for at most `max`. A no-op while already held.
    ///
    /// Returns whether this call took the lease.
    pub fn acquire(&self, max: Duration) -> bool {
        let mut expires_at = self.expires_at.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        if matches!(*expires_at, Some(deadline) if deadline > now) {
            return false;
        }
        self.backend.acquire(max);
        *expires_at = Some(now + max);
        true
    }

    /// Release if held. Returns whether anything was released.
    pub fn release(&self) -> bool {
        let mut expires_at = self.expires_at.lock().unwrap_or_else(PoisonError::into_inner);
        match expires_at.take() {
            Some(deadline) if deadline > Instant::now() => {
                self.backend.release();
                true
            }
            // expired on its own
            _ => false,
        }
    }

    pub fn is_held(&self) -> bool {
        let expires_at = self.expires_at.lock().unwrap_or_else(PoisonError::into_inner);
        matches!(*expires_at, Some(deadline) if deadline > Instant::now())
    }

    /// Acquire and return a guard that releases when dropped.
    pub fn hold(&self, max: Duration) -> LeaseGuard<'_> {
        self.acquire(max);
        LeaseGuard { lease: self }
    }
}

/// Releases the lease when dropped.
#[must_use = "the lease is released as soon as the guard is dropped"]
pub struct LeaseGuard<'a> {
    lease: &'a PowerLease,
}

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        self.lease.release();
    }
}
