//! Single-writer lock typestate for running machine instances.
//!
//! At most one executor may act on a given machine instance at a time. The
//! lock key is `mre:<root_event_id>` and is held for a bounded duration
//! (default 60s) so a crashed executor cannot wedge the instance forever.
//!
//! Uses the typestate pattern to make invalid lock lifecycle transitions
//! uncompilable.
//!
//! ```text
//! (unlocked) ─── acquire() ──→ Acquired ─── release() ──→ (unlocked)
//!                                  │
//!                             extend() ↺
//! ```

use crate::{EntityIdType, LockId, RootEventId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;

/// Default hold duration for a machine-instance lock.
pub const DEFAULT_LOCK_DURATION: Duration = Duration::from_secs(60);

/// Build the lock key for a machine instance, e.g. `mre:0191...`.
pub fn lock_key(root_event_id: RootEventId) -> String {
    format!("mre:{root_event_id}")
}

// ============================================================================
// LOCK DATA (internal storage, state-independent)
// ============================================================================

/// Internal data for a machine-instance lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockData {
    pub lock_id: LockId,
    pub root_event_id: RootEventId,
    /// Opaque identifier of the executor/process holding the lock.
    pub holder: String,
    pub acquired_at: Timestamp,
    pub expires_at: Timestamp,
}

impl LockData {
    pub fn key(&self) -> String {
        lock_key(self.root_event_id)
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    pub fn remaining_duration(&self, now: Timestamp) -> Option<Duration> {
        if now >= self.expires_at {
            None
        } else {
            (self.expires_at - now).to_std().ok()
        }
    }
}

// ============================================================================
// TYPESTATE MARKERS
// ============================================================================

pub trait LockState: private::Sealed + Send + Sync {}

/// Lock is currently held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acquired;
impl LockState for Acquired {}

/// Lock has been released (documentation-only; not constructed at runtime).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Released;
impl LockState for Released {}

mod private {
    pub trait Sealed {}
    impl Sealed for super::Acquired {}
    impl Sealed for super::Released {}
}

// ============================================================================
// LOCK TYPESTATE WRAPPER
// ============================================================================

/// A lock with compile-time state tracking.
///
/// `Lock<Acquired>` can be extended or released; `release`/`extend` consume
/// the value so a released lock cannot be reused by accident.
#[derive(Debug, Clone)]
pub struct Lock<S: LockState> {
    data: LockData,
    _state: PhantomData<S>,
}

impl<S: LockState> Lock<S> {
    pub fn data(&self) -> &LockData {
        &self.data
    }

    pub fn lock_id(&self) -> LockId {
        self.data.lock_id
    }

    pub fn root_event_id(&self) -> RootEventId {
        self.data.root_event_id
    }

    pub fn holder(&self) -> &str {
        &self.data.holder
    }

    pub fn acquired_at(&self) -> Timestamp {
        self.data.acquired_at
    }

    pub fn expires_at(&self) -> Timestamp {
        self.data.expires_at
    }
}

impl Lock<Acquired> {
    /// Create a new acquired lock, held for `DEFAULT_LOCK_DURATION`.
    pub fn acquire(root_event_id: RootEventId, holder: impl Into<String>, now: Timestamp) -> Self {
        Self::acquire_for(root_event_id, holder, now, DEFAULT_LOCK_DURATION)
    }

    /// Create a new acquired lock held for an explicit duration.
    pub fn acquire_for(
        root_event_id: RootEventId,
        holder: impl Into<String>,
        now: Timestamp,
        hold_for: Duration,
    ) -> Self {
        let hold_for = chrono::Duration::from_std(hold_for)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));
        Lock {
            data: LockData {
                lock_id: LockId::now_v7(),
                root_event_id,
                holder: holder.into(),
                acquired_at: now,
                expires_at: now + hold_for,
            },
            _state: PhantomData,
        }
    }

    /// Wrap pre-existing lock data as acquired (used when rehydrating).
    pub fn from_data(data: LockData) -> Self {
        Lock {
            data,
            _state: PhantomData,
        }
    }

    /// Extend the lock by `additional`. Consumes and returns a new lock.
    pub fn extend(mut self, additional: Duration) -> Self {
        let additional = chrono::Duration::from_std(additional)
            .unwrap_or_else(|_| chrono::Duration::milliseconds(additional.as_millis() as i64));
        self.data.expires_at += additional;
        self
    }

    /// Release the lock, returning the underlying data for bookkeeping.
    pub fn release(self) -> LockData {
        self.data
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.data.is_expired(now)
    }

    pub fn remaining_duration(&self, now: Timestamp) -> Option<Duration> {
        self.data.remaining_duration(now)
    }

    pub fn into_data(self) -> LockData {
        self.data
    }
}

// ============================================================================
// STORAGE BOUNDARY: STORED LOCK
// ============================================================================

/// A lock as stored by an `EventLog`/storage backend, state-agnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredLock {
    pub data: LockData,
    pub is_active: bool,
}

impl StoredLock {
    /// Convert to an acquired lock if active and not expired.
    pub fn into_acquired(self, now: Timestamp) -> Result<Lock<Acquired>, LockStateError> {
        if !self.is_active {
            return Err(LockStateError::NotActive {
                lock_id: self.data.lock_id,
            });
        }
        if self.data.is_expired(now) {
            return Err(LockStateError::Expired {
                lock_id: self.data.lock_id,
                expired_at: self.data.expires_at,
            });
        }
        Ok(Lock::from_data(self.data))
    }

    pub fn data(&self) -> &LockData {
        &self.data
    }
}

/// Errors when transitioning lock states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockStateError {
    NotActive { lock_id: LockId },
    Expired {
        lock_id: LockId,
        expired_at: Timestamp,
    },
}

impl fmt::Display for LockStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockStateError::NotActive { lock_id } => write!(f, "lock {lock_id} is not active"),
            LockStateError::Expired {
                lock_id,
                expired_at,
            } => write!(f, "lock {lock_id} expired at {expired_at}"),
        }
    }
}

impl std::error::Error for LockStateError {}
