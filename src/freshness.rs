//! Single authority for "which update is current".

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::{event::Event, payload::FilterDocument};

/// The freshest authenticated update of this session.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedUpdate {
    pub event: Event,
    pub document: FilterDocument,
    /// Relay that delivered the winning copy. Not used for trust.
    pub relay: String,
}

impl AcceptedUpdate {
    pub fn created_at(&self) -> u64 {
        self.event.created_at
    }
}

/// Outcome of [`FreshnessTracker::consider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Superseded,
    NotSuperseded,
}

/// Holds at most one [`AcceptedUpdate`] and replaces it only with a
/// strictly newer one. Ties keep the first accepted event.
#[derive(Debug, Default)]
pub struct FreshnessTracker {
    state: Mutex<Option<AcceptedUpdate>>,
}

impl FreshnessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<AcceptedUpdate>> {
        // Only ever replaced whole; a poisoned guard still holds a valid value.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `created_at` of the accepted update, if any.
    pub fn accepted_at(&self) -> Option<u64> {
        self.lock().as_ref().map(AcceptedUpdate::created_at)
    }

    pub fn current(&self) -> Option<AcceptedUpdate> {
        self.lock().clone()
    }

    pub fn consider(&self, candidate: AcceptedUpdate) -> Freshness {
        self.consider_with(candidate, |_| {})
    }

    /// Compare and conditionally replace atomically. `on_superseded` runs
    /// with the new state while the lock is still held, so notifications for
    /// successive winners are serialized in `created_at` order.
    pub fn consider_with<F>(&self, candidate: AcceptedUpdate, on_superseded: F) -> Freshness
    where
        F: FnOnce(&AcceptedUpdate),
    {
        let mut state = self.lock();
        let newer = state
            .as_ref()
            .map_or(true, |cur| candidate.created_at() > cur.created_at());
        if !newer {
            return Freshness::NotSuperseded;
        }
        let accepted = state.insert(candidate);
        on_superseded(accepted);
        Freshness::Superseded
    }
}
