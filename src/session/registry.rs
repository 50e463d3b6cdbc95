//! Session registry keyed by IMSI.
//!
//! All reads and writes go through one mutex per instance, so operations
//! on a single IMSI are linearized. CDRs are submitted while the lock is
//! held (submission never blocks), so per-IMSI billing order matches the
//! order of the transitions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::cdr::{Cdr, CdrHandle};
use crate::telemetry::counters;

/// Registry of live subscriber sessions.
#[derive(Debug)]
pub struct SessionRegistry {
    /// IMSI -> creation/refresh time
    sessions: Mutex<HashMap<String, Instant>>,
    /// Billing sink
    cdr: CdrHandle,
}

impl SessionRegistry {
    pub fn new(cdr: CdrHandle) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(HashMap::new()),
            cdr,
        })
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, Instant>> {
        // Every critical section leaves the map consistent
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a session, or refresh the timestamp of an existing one.
    ///
    /// Returns true (and emits a `created` CDR) only for a new session.
    pub fn create(&self, imsi: &str) -> bool {
        self.create_at(imsi, Instant::now())
    }

    /// [`create`](Self::create) with an explicit timestamp.
    pub fn create_at(&self, imsi: &str, now: Instant) -> bool {
        let count = {
            let mut sessions = self.sessions();
            if let Some(started) = sessions.get_mut(imsi) {
                *started = now;
                debug!(imsi, "session refreshed");
                return false;
            }
            sessions.insert(imsi.to_string(), now);
            self.cdr.submit(Cdr::created(imsi));
            sessions.len()
        };

        counters::session_created();
        counters::sessions_active_set(count);
        info!(imsi, "session created");
        true
    }

    /// Whether a live session exists for `imsi`.
    pub fn exists(&self, imsi: &str) -> bool {
        self.sessions().contains_key(imsi)
    }

    /// Remove a session, tagging the CDR with `reason`.
    pub fn remove(&self, imsi: &str, reason: &str) -> bool {
        let count = {
            let mut sessions = self.sessions();
            if sessions.remove(imsi).is_none() {
                return false;
            }
            self.cdr.submit(Cdr::removed(imsi, reason));
            sessions.len()
        };

        counters::session_removed(reason);
        counters::sessions_active_set(count);
        info!(imsi, reason, "session removed");
        true
    }

    /// Remove every session whose age at `now` is at least `ttl`.
    ///
    /// Returns the number of sessions removed.
    pub fn sweep_expired(&self, now: Instant, ttl: Duration) -> usize {
        let (expired, count) = {
            let mut sessions = self.sessions();
            let expired: Vec<String> = sessions
                .iter()
                .filter(|(_, started)| now.saturating_duration_since(**started) >= ttl)
                .map(|(imsi, _)| imsi.clone())
                .collect();
            for imsi in &expired {
                sessions.remove(imsi);
                self.cdr.submit(Cdr::timeout(imsi.as_str()));
            }
            (expired, sessions.len())
        };

        if expired.is_empty() {
            return 0;
        }

        for imsi in &expired {
            counters::session_removed("timeout");
            info!(imsi = %imsi, "session timed out");
        }
        counters::sessions_active_set(count);

        debug!(expired = expired.len(), remaining = count, "TTL sweep finished");
        expired.len()
    }

    /// Remove and return one arbitrary session, emitting `offload`.
    pub fn pop_one(&self) -> Option<String> {
        let (imsi, count) = {
            let mut sessions = self.sessions();
            let imsi = sessions.keys().next().cloned()?;
            sessions.remove(&imsi);
            self.cdr.submit(Cdr::offload(imsi.as_str()));
            (imsi, sessions.len())
        };

        counters::session_removed("offload");
        counters::sessions_active_set(count);
        info!(imsi = %imsi, "session offloaded");
        Some(imsi)
    }

    /// Live session count.
    pub fn count(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions().is_empty()
    }
}

/// Shared session registry type
pub type SharedSessionRegistry = Arc<SessionRegistry>;
