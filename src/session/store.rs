//! Concurrent session storage with per-call serialization.
//!
//! The store is the only shared mutable resource in the core. Sessions live
//! in a sharded concurrent map, so unrelated call ids never contend on a
//! global lock, while `lock()` hands out a per-call-id mutex whose FIFO
//! queueing preserves arrival order for requests on the same call.

use crate::types::{CallId, MachineId, Options, StateName};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// The continuity record for one call: its active machine, current state,
/// and accumulated options. Owned exclusively by the store; callers only
/// ever see clones.
#[derive(Debug, Clone)]
pub struct Session {
    pub call_id: CallId,
    pub machine: MachineId,
    pub state_name: StateName,
    pub options: Options,
    touched_at: Instant,
}

impl Session {
    pub fn new(
        call_id: CallId,
        machine: MachineId,
        state_name: StateName,
        options: Options,
    ) -> Self {
        Self {
            call_id,
            machine,
            state_name,
            options,
            touched_at: Instant::now(),
        }
    }

    /// Time since this session was last stored.
    pub fn idle_for(&self) -> Duration {
        self.touched_at.elapsed()
    }
}

/// Session storage keyed by call id.
pub struct SessionStore {
    sessions: DashMap<CallId, Session>,
    /// Per-call serialization locks. An entry outlives its session so a
    /// request queued behind a completing call still serializes correctly.
    locks: DashMap<CallId, Arc<Mutex<()>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    /// Get a clone of the session for a call, if one exists.
    pub fn get(&self, call_id: &CallId) -> Option<Session> {
        self.sessions.get(call_id).map(|s| s.value().clone())
    }

    /// Atomically create or replace the session for its call id,
    /// refreshing the idle timestamp.
    pub fn upsert(&self, mut session: Session) {
        session.touched_at = Instant::now();
        debug!(
            "Stored session {} at machine '{}' state '{}'",
            session.call_id, session.machine, session.state_name
        );
        self.sessions.insert(session.call_id.clone(), session);
    }

    /// Remove the session for a call. Deleting a missing id is a no-op.
    pub fn delete(&self, call_id: &CallId) {
        if self.sessions.remove(call_id).is_some() {
            info!("Removed session {}", call_id);
        }
    }

    /// Acquire the exclusive per-call scope. Requests for the same call id
    /// queue in arrival order; different ids proceed in parallel.
    pub async fn lock(&self, call_id: &CallId) -> OwnedMutexGuard<()> {
        let cell = self
            .locks
            .entry(call_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        cell.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Session counts, bucketed by machine.
    pub fn stats(&self) -> SessionStats {
        let mut stats = SessionStats::default();
        for entry in self.sessions.iter() {
            stats.total += 1;
            *stats
                .by_machine
                .entry(entry.value().machine.clone())
                .or_insert(0) += 1;
        }
        stats
    }

    /// Evict sessions idle for at least `max_idle`, skipping any call
    /// currently being processed. Returns the number removed.
    ///
    /// Abandoned calls never reach a terminal status, so without this the
    /// store grows unboundedly.
    pub fn sweep(&self, max_idle: Duration) -> usize {
        let stale: Vec<CallId> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().idle_for() >= max_idle && !self.is_locked(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for call_id in stale {
            // Recheck under the shard lock: the call may have been locked
            // or refreshed since the candidate list was built.
            let evicted = self.sessions.remove_if(&call_id, |id, session| {
                session.idle_for() >= max_idle && !self.is_locked(id)
            });
            if evicted.is_some() {
                warn!("Evicted idle session {}", call_id);
                removed += 1;
            }
        }

        // A lock entry with no outstanding clones has no holder and no
        // waiters; drop it once its session is gone.
        self.locks.retain(|call_id, cell| {
            Arc::strong_count(cell) > 1 || self.sessions.contains_key(call_id)
        });

        removed
    }

    /// Run `sweep` on a fixed period until the store is dropped or the
    /// returned task is aborted.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        period: Duration,
        max_idle: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let removed = store.sweep(max_idle);
                if removed > 0 {
                    debug!("Session sweep removed {} idle sessions", removed);
                }
            }
        })
    }

    fn is_locked(&self, call_id: &CallId) -> bool {
        self.locks
            .get(call_id)
            .map(|cell| Arc::strong_count(cell.value()) > 1)
            .unwrap_or(false)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Session statistics.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    pub total: usize,
    pub by_machine: HashMap<MachineId, usize>,
}
