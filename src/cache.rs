//! Time-bounded, explicitly owned caches for snapshots and page views

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use crate::models::Snapshot;

/// Source of the current time, injectable so tests can move it by hand
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn is_fresh(stamped: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    now - stamped <= ttl
}

/// Holds the single current snapshot; an expired one reads as absent.
pub struct SnapshotCache {
    current: Option<Snapshot>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl SnapshotCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            current: None,
            ttl,
            clock,
        }
    }

    /// Replaces whatever snapshot was held before.
    pub fn install(&mut self, snapshot: Snapshot) {
        self.current = Some(snapshot);
    }

    /// The current snapshot, or `None` once it is older than the TTL.
    pub fn get(&self) -> Option<&Snapshot> {
        let now = self.clock.now();
        self.current
            .as_ref()
            .filter(|snapshot| is_fresh(snapshot.taken_at, now, self.ttl))
    }

    /// Drops the snapshot if it has expired. Returns whether anything was dropped.
    pub fn sweep(&mut self) -> bool {
        let now = self.clock.now();
        let expired = self
            .current
            .as_ref()
            .is_some_and(|snapshot| !is_fresh(snapshot.taken_at, now, self.ttl));
        if expired {
            self.current = None;
        }
        expired
    }
}

/// Keyed store whose entries expire `ttl` after they were last written
pub struct TtlCache<K, V> {
    entries: HashMap<K, (DateTime<Utc>, V)>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<K: Eq + Hash, V> TtlCache<K, V> {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            clock,
        }
    }

    /// Inserts or replaces an entry, restarting its lifetime.
    pub fn insert(&mut self, key: K, value: V) {
        let now = self.clock.now();
        self.entries.insert(key, (now, value));
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        let now = self.clock.now();
        self.entries
            .get(key)
            .filter(|(stamped, _)| is_fresh(*stamped, now, self.ttl))
            .map(|(_, value)| value)
    }

    /// Mutable access to a live entry. Touching it restarts its lifetime.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let now = self.clock.now();
        let ttl = self.ttl;
        match self.entries.get_mut(key) {
            Some((stamped, value)) if is_fresh(*stamped, now, ttl) => {
                *stamped = now;
                Some(value)
            }
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every expired entry and returns how many were removed.
    pub fn sweep(&mut self) -> usize {
        let now = self.clock.now();
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries
            .retain(|_, (stamped, _)| is_fresh(*stamped, now, ttl));
        before - self.entries.len()
    }
}
