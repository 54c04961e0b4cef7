//! Session leases and the expiry table
//!
//! Every prepared session holds a lease. The owner renews it by preparing
//! the session again; a session whose lease runs out is torn down exactly
//! like an explicit `remove`.
//!
//! `LeaseTable` keeps deadlines in a `BTreeMap` so finding the expired
//! sessions is O(expired) instead of O(sessions).

use chrono::{DateTime, Utc};
use plexus_core::SessionId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::config::MAX_DURATION_MS;

/// A granted lease, as returned to the preparing party
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// Leased session
    pub session: SessionId,
    /// Length of the lease in milliseconds
    pub duration_ms: u64,
    /// Wall-clock time the lease runs out unless renewed
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    /// Lease of `duration` starting now
    pub fn starting_now(session: SessionId, duration: Duration) -> Self {
        let expires_at = chrono::Duration::from_std(duration)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            session,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            expires_at,
        }
    }

    /// Length of the lease
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// Whether the lease has run out at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// `now + duration`, saturating at the longest configurable duration
pub(crate) fn deadline_after(now: Instant, duration: Duration) -> Instant {
    now.checked_add(duration)
        .or_else(|| now.checked_add(Duration::from_millis(MAX_DURATION_MS)))
        .unwrap_or(now)
}

/// Deadlines of every leased session on one system
#[derive(Debug, Default)]
pub struct LeaseTable {
    deadlines: HashMap<SessionId, Instant>,
    index: BTreeMap<Instant, HashSet<SessionId>>,
}

impl LeaseTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or move) the deadline of a session
    pub fn renew(&mut self, session: SessionId, deadline: Instant) {
        if let Some(previous) = self.deadlines.insert(session, deadline) {
            self.unindex(previous, &session);
        }
        self.index.entry(deadline).or_default().insert(session);
    }

    /// Forget a session; returns whether it was leased
    pub fn remove(&mut self, session: &SessionId) -> bool {
        match self.deadlines.remove(session) {
            Some(deadline) => {
                self.unindex(deadline, session);
                true
            }
            None => false,
        }
    }

    fn unindex(&mut self, deadline: Instant, session: &SessionId) {
        if let Some(sessions) = self.index.get_mut(&deadline) {
            sessions.remove(session);
            if sessions.is_empty() {
                self.index.remove(&deadline);
            }
        }
    }

    /// Deadline of a session
    pub fn deadline(&self, session: &SessionId) -> Option<Instant> {
        self.deadlines.get(session).copied()
    }

    /// Whether the session's lease has run out at `now`
    pub fn is_expired(&self, session: &SessionId, now: Instant) -> bool {
        self.deadline(session).map(|d| d <= now).unwrap_or(false)
    }

    /// Sessions whose deadline is at or before `now`
    pub fn find_expired(&self, now: Instant) -> Vec<SessionId> {
        self.index
            .range(..=now)
            .flat_map(|(_, sessions)| sessions.iter().copied())
            .collect()
    }

    /// Earliest deadline in the table
    pub fn next_deadline(&self) -> Option<Instant> {
        self.index.keys().next().copied()
    }

    /// Number of leased sessions
    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    /// Whether no session is leased
    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}
