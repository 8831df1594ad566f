//! Connection pool bookkeeping.
//!
//! `PoolState` is the synchronous part of a device's pool: idle handles per role,
//! the set of checked-out connection ids and the per-role round-robin counters.
//! It never awaits, so the device keeps it behind a plain mutex and performs
//! liveness probes and connects outside of the lock.

use crate::error::{DbError, DbResult};
use crate::models::Role;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Snapshot of a device's pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    /// Device identifier
    pub device: String,
    /// Released connections waiting for reuse
    pub idle: usize,
    /// Connections currently checked out
    pub busy: usize,
    /// Connection limit, idle connections included
    pub max_connections: u32,
    /// Whether the device has been closed
    pub closed: bool,
}

#[derive(Debug)]
struct IdleEntry<C> {
    id: u64,
    handle: C,
}

#[derive(Debug)]
pub(crate) struct PoolState<C> {
    next_id: u64,
    idle: HashMap<Role, Vec<IdleEntry<C>>>,
    busy: HashSet<u64>,
    round_robin: HashMap<Role, usize>,
    closed: bool,
}

impl<C> PoolState<C> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 0,
            idle: HashMap::new(),
            busy: HashSet::new(),
            round_robin: HashMap::new(),
            closed: false,
        }
    }

    /// Allocate a connection id and mark it checked out.
    pub(crate) fn register(&mut self) -> u64 {
        self.next_id += 1;
        self.busy.insert(self.next_id);
        self.next_id
    }

    /// Take the most recently idled handle of `role`.
    ///
    /// The handle is neither idle nor busy until `check_out` is called for it.
    pub(crate) fn take_idle(&mut self, role: Role) -> Option<(u64, C)> {
        self.idle
            .get_mut(&role)
            .and_then(Vec::pop)
            .map(|entry| (entry.id, entry.handle))
    }

    /// Mark a handle taken with `take_idle` as checked out.
    ///
    /// Refused once the pool is closed; the caller then closes the handle.
    pub(crate) fn check_out(&mut self, id: u64) -> bool {
        if self.closed {
            return false;
        }
        self.busy.insert(id);
        true
    }

    /// Return a checked-out handle.
    ///
    /// Yields the handle back when the pool is closed so the caller can close it.
    pub(crate) fn check_in(&mut self, role: Role, id: u64, handle: C) -> DbResult<Option<C>> {
        if !self.busy.remove(&id) {
            return Err(DbError::DoubleRelease { connection_id: id });
        }
        if self.closed {
            return Ok(Some(handle));
        }
        self.idle
            .entry(role)
            .or_default()
            .push(IdleEntry { id, handle });
        Ok(None)
    }

    /// Drop the bookkeeping of a connection that will not come back.
    pub(crate) fn forget(&mut self, id: u64) -> bool {
        self.busy.remove(&id)
    }

    /// Index of the next host of `role` in round-robin order.
    pub(crate) fn pick_host(&mut self, role: Role, host_count: usize) -> usize {
        let counter = self.round_robin.entry(role).or_insert(0);
        let index = *counter % host_count.max(1);
        *counter = counter.wrapping_add(1);
        index
    }

    /// Remove the oldest idle handle of any role other than `role`.
    pub(crate) fn evict_idle_except(&mut self, role: Role) -> Option<C> {
        self.idle
            .iter_mut()
            .filter(|(r, entries)| **r != role && !entries.is_empty())
            .map(|(_, entries)| entries.remove(0).handle)
            .next()
    }

    /// Remove every idle handle.
    pub(crate) fn drain_idle(&mut self) -> Vec<C> {
        self.idle
            .drain()
            .flat_map(|(_, entries)| entries.into_iter().map(|e| e.handle))
            .collect()
    }

    pub(crate) fn close(&mut self) {
        self.closed = true;
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn idle_count(&self) -> usize {
        self.idle.values().map(Vec::len).sum()
    }

    pub(crate) fn busy_count(&self) -> usize {
        self.busy.len()
    }
}
