//! Lock token and lease typestate.
//!
//! A lease can only be released while it is in the Acquired state, and
//! releasing consumes it, so a token cannot be released twice.
//!
//! # State Transition Diagram
//!
//! ```text
//! (free) ─── acquire() ──→ Acquired ─── release() ──→ Released
//!                              │
//!                  ttl elapses: lock expires in the cache service
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;
use uuid::Uuid;

/// Opaque value proving ownership of a named lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockToken(String);

impl LockToken {
    /// Mint a fresh, globally unique token.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// TYPESTATE MARKERS
// ============================================================================

/// Marker trait for lease states.
pub trait LeaseState: private::Sealed + Send + Sync {}

/// Lease is currently held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acquired;
impl LeaseState for Acquired {}

/// Lease has been given back; only its name and token remain useful, for the unlock call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Released;
impl LeaseState for Released {}

mod private {
    pub trait Sealed {}
    impl Sealed for super::Acquired {}
    impl Sealed for super::Released {}
}

// ============================================================================
// LEASE
// ============================================================================

/// A named lock held through a token, with compile-time state tracking.
#[derive(Debug)]
pub struct LockLease<S: LeaseState> {
    name: String,
    token: LockToken,
    acquired_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    _state: PhantomData<S>,
}

impl<S: LeaseState> LockLease<S> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn token(&self) -> &LockToken {
        &self.token
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    /// When the cache service will drop the lock on its own.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

impl LockLease<Acquired> {
    /// Wrap a token returned by a successful acquire.
    pub fn new(name: impl Into<String>, token: LockToken, ttl: Duration) -> Self {
        let acquired_at = Utc::now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| acquired_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            name: name.into(),
            token,
            acquired_at,
            expires_at,
            _state: PhantomData,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Give the lease back. The released lease carries the name and token to unlock with.
    pub fn release(self) -> LockLease<Released> {
        LockLease {
            name: self.name,
            token: self.token,
            acquired_at: self.acquired_at,
            expires_at: self.expires_at,
            _state: PhantomData,
        }
    }
}
