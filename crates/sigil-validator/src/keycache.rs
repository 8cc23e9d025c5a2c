//! The key cache: memoized trust verdicts per zone.

use parking_lot::{Mutex, RwLock};
use sigil_proto::{Name, RecordClass, RecordType, Rrset};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

/// The cached trust verdict for one zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyEntryKind {
    /// A validated DNSKEY RRset: queries into the zone can be verified.
    Trusted(Rrset),
    /// An authenticated insecure delegation: the zone and everything below
    /// it is unsigned.
    Null,
    /// Validation failed: queries into the zone are bogus until the entry
    /// expires.
    Bad,
}

/// A cached per-zone verdict with a bounded lifetime.
#[derive(Debug, Clone)]
pub struct KeyEntry {
    zone: Name,
    class: RecordClass,
    kind: KeyEntryKind,
    expires_at: Instant,
}

impl KeyEntry {
    /// Creates a trusted entry holding a validated DNSKEY RRset.
    pub fn trusted(keys: Rrset, ttl: Duration) -> Self {
        Self {
            zone: keys.owner().clone(),
            class: keys.class(),
            kind: KeyEntryKind::Trusted(keys),
            expires_at: Instant::now() + ttl,
        }
    }

    /// Creates a null entry: a proven insecure delegation.
    pub fn null(zone: Name, class: RecordClass, ttl: Duration) -> Self {
        Self {
            zone,
            class,
            kind: KeyEntryKind::Null,
            expires_at: Instant::now() + ttl,
        }
    }

    /// Creates a bad entry after failed validation.
    pub fn bad(zone: Name, class: RecordClass, ttl: Duration) -> Self {
        Self {
            zone,
            class,
            kind: KeyEntryKind::Bad,
            expires_at: Instant::now() + ttl,
        }
    }

    /// Returns the zone this entry speaks for.
    pub fn zone(&self) -> &Name {
        &self.zone
    }

    /// Returns the record class.
    pub fn class(&self) -> RecordClass {
        self.class
    }

    /// Returns the verdict.
    pub fn kind(&self) -> &KeyEntryKind {
        &self.kind
    }

    /// Returns the validated keyset for trusted entries.
    pub fn keys(&self) -> Option<&Rrset> {
        match &self.kind {
            KeyEntryKind::Trusted(keys) => Some(keys),
            _ => None,
        }
    }

    /// Returns true for trusted entries.
    pub fn is_trusted(&self) -> bool {
        matches!(self.kind, KeyEntryKind::Trusted(_))
    }

    /// Returns true for null entries.
    pub fn is_null(&self) -> bool {
        matches!(self.kind, KeyEntryKind::Null)
    }

    /// Returns true for bad entries.
    pub fn is_bad(&self) -> bool {
        matches!(self.kind, KeyEntryKind::Bad)
    }

    /// Returns true once the entry's lifetime has passed.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

struct Slot {
    entry: KeyEntry,
    last_access: Instant,
}

/// A bounded, TTL-expiring, LRU-evicting cache of [`KeyEntry`] values,
/// shared by all concurrently validating events.
///
/// Lookups and inserts are linearizable behind one lock. The companion
/// fetch locks serialize upstream fetches so only a single query per
/// (zone, qtype) is ever in flight.
pub struct KeyCache {
    slots: RwLock<HashMap<Name, Slot>>,
    capacity: usize,
    fetch_locks: Mutex<HashMap<(Name, RecordType), Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyCache {
    /// Creates a cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            fetch_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the non-expired entry for exactly `zone`.
    pub fn get(&self, zone: &Name) -> Option<KeyEntry> {
        let now = Instant::now();
        let mut slots = self.slots.write();
        match slots.get_mut(zone) {
            Some(slot) if !slot.entry.is_expired(now) => {
                slot.last_access = now;
                Some(slot.entry.clone())
            }
            Some(_) => {
                slots.remove(zone);
                None
            }
            None => None,
        }
    }

    /// Returns the deepest non-expired entry at or above `name`.
    pub fn find_closest(&self, name: &Name) -> Option<KeyEntry> {
        let mut current = name.clone();
        loop {
            if let Some(entry) = self.get(&current) {
                return Some(entry);
            }
            current = current.parent()?;
        }
    }

    /// Inserts a fully decided entry.
    ///
    /// Only complete verdicts ever reach the cache; in-progress fetches
    /// hold a fetch lock instead of writing partial state.
    pub fn insert(&self, entry: KeyEntry) {
        let now = Instant::now();
        let mut slots = self.slots.write();

        if slots.len() >= self.capacity && !slots.contains_key(entry.zone()) {
            slots.retain(|_, slot| !slot.entry.is_expired(now));
            if slots.len() >= self.capacity {
                // Still full: evict the least recently used slot.
                if let Some(stalest) = slots
                    .iter()
                    .min_by_key(|(_, slot)| slot.last_access)
                    .map(|(zone, _)| zone.clone())
                {
                    slots.remove(&stalest);
                }
            }
        }

        trace!(zone = %entry.zone(), kind = ?entry.kind(), "caching key entry");
        slots.insert(
            entry.zone().clone(),
            Slot {
                entry,
                last_access: now,
            },
        );
    }

    /// Returns the fetch lock for `(zone, qtype)`.
    ///
    /// Holding the lock across an upstream fetch makes concurrent events
    /// queue instead of issuing duplicate queries; the winner populates
    /// the cache and the waiters find its result on re-check.
    pub fn fetch_lock(&self, zone: &Name, qtype: RecordType) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.fetch_locks.lock();
        locks
            .entry((zone.clone(), qtype))
            .or_default()
            .clone()
    }

    /// Drops fetch locks nobody is waiting on.
    pub fn prune_fetch_locks(&self) {
        self.fetch_locks
            .lock()
            .retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    /// Returns the number of cached entries.
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }
}
