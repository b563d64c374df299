//! Per-submission grading leases.
//!
//! A lease is acquired atomically and released when its guard is dropped, so
//! completion, failure and cancellation of a grading future all free it.
//! Leases also expire after a fixed time-to-live; an expired lease may be
//! taken over, and the stale guard will not release its successor.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::error::GradingError;

/// Default time-to-live for a lease.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug)]
struct LeaseEntry {
    token: Uuid,
    acquired_at: Instant,
}

/// Registry of active grading leases keyed by submission id.
#[derive(Debug, Clone)]
pub struct LeaseRegistry {
    entries: Arc<Mutex<HashMap<String, LeaseEntry>>>,
    ttl: Duration,
}

impl LeaseRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, LeaseEntry>> {
        // The map stays consistent across panics; recover the guard.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Acquire the lease for `submission_id`, failing fast with `Busy` if a
    /// live lease is held.
    pub fn try_acquire(&self, submission_id: &str) -> Result<LeaseGuard, GradingError> {
        let mut entries = self.lock();
        let now = Instant::now();

        if let Some(existing) = entries.get(submission_id) {
            if now.duration_since(existing.acquired_at) < self.ttl {
                return Err(GradingError::Busy {
                    submission_id: submission_id.to_string(),
                });
            }
            tracing::warn!(
                submission_id,
                held_for_ms = now.duration_since(existing.acquired_at).as_millis() as u64,
                "taking over expired grading lease"
            );
        }

        let token = Uuid::new_v4();
        entries.insert(
            submission_id.to_string(),
            LeaseEntry {
                token,
                acquired_at: now,
            },
        );

        Ok(LeaseGuard {
            registry: self.clone(),
            submission_id: submission_id.to_string(),
            token,
        })
    }

    /// Whether a live lease is currently held for `submission_id`.
    pub fn is_held(&self, submission_id: &str) -> bool {
        self.lock()
            .get(submission_id)
            .is_some_and(|e| e.acquired_at.elapsed() < self.ttl)
    }

    fn release(&self, submission_id: &str, token: Uuid) {
        let mut entries = self.lock();
        if entries.get(submission_id).is_some_and(|e| e.token == token) {
            entries.remove(submission_id);
        }
    }
}

impl Default for LeaseRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_LEASE_TTL)
    }
}

/// Exclusive hold on one submission's grading. Released on drop.
#[derive(Debug)]
pub struct LeaseGuard {
    registry: LeaseRegistry,
    submission_id: String,
    token: Uuid,
}

impl LeaseGuard {
    pub fn submission_id(&self) -> &str {
        &self.submission_id
    }

    pub fn token(&self) -> Uuid {
        self.token
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        self.registry.release(&self.submission_id, self.token);
    }
}
