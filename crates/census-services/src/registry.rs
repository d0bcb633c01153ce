//! Node registry — the live membership view.
//!
//! Two structures kept in lockstep:
//!   - `history`: beacons in recency order, most recent at the front,
//!     stalest at the back. Stored as an arena of slots linked by index,
//!     so moving an entry to the front is O(1) and handles stay stable.
//!   - `index`: NodeId → slot handle, for O(1) lookup.
//!
//! Writers (refresh, evict) take the write guard. Readers (interval,
//! count, snapshot) take the read guard. The exported `NodeCount` is
//! published once per mutation, while the write guard is still held.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use census_core::wire::{NodeId, BASE_INTERVAL_SECS, STALENESS_GRACE_SECS};

// ── Beacon ────────────────────────────────────────────────────────────────────

/// Last sighting of a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Beacon {
    pub timestamp: Instant,
    pub sender: NodeId,
}

/// Whether a refresh inserted a new node or updated a known one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sighting {
    New,
    Refreshed,
}

/// A live peer as reported to status consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerView {
    pub node_id: NodeId,
    pub last_seen: Duration,
}

// ── History arena ─────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Slot {
    beacon: Beacon,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Doubly linked list over a Vec. Freed slots are reused.
#[derive(Debug, Default)]
struct History {
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl History {
    fn len(&self) -> usize {
        self.len
    }

    fn slot(&self, handle: usize) -> &Slot {
        self.slots[handle].as_ref().expect("live handle")
    }

    fn slot_mut(&mut self, handle: usize) -> &mut Slot {
        self.slots[handle].as_mut().expect("live handle")
    }

    fn push_front(&mut self, beacon: Beacon) -> usize {
        let slot = Slot {
            beacon,
            prev: None,
            next: self.head,
        };
        let handle = match self.free.pop() {
            Some(h) => {
                self.slots[h] = Some(slot);
                h
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        };
        self.link_front(handle);
        self.len += 1;
        handle
    }

    /// Attach an already-populated slot at the head.
    fn link_front(&mut self, handle: usize) {
        let old_head = self.head;
        {
            let slot = self.slot_mut(handle);
            slot.prev = None;
            slot.next = old_head;
        }
        match old_head {
            Some(h) => self.slot_mut(h).prev = Some(handle),
            None => self.tail = Some(handle),
        }
        self.head = Some(handle);
    }

    /// Detach a slot from the list without freeing it.
    fn unlink(&mut self, handle: usize) {
        let (prev, next) = {
            let slot = self.slot(handle);
            (slot.prev, slot.next)
        };
        match prev {
            Some(p) => self.slot_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slot_mut(n).prev = prev,
            None => self.tail = prev,
        }
    }

    /// Move an entry to the front with a new timestamp. Handle is unchanged.
    fn touch(&mut self, handle: usize, now: Instant) {
        self.unlink(handle);
        self.slot_mut(handle).beacon.timestamp = now;
        self.link_front(handle);
    }

    fn back(&self) -> Option<&Beacon> {
        self.tail.map(|h| &self.slot(h).beacon)
    }

    fn pop_back(&mut self) -> Option<Beacon> {
        let handle = self.tail?;
        self.unlink(handle);
        let slot = self.slots[handle].take()?;
        self.free.push(handle);
        self.len -= 1;
        Some(slot.beacon)
    }

    fn iter(&self) -> HistoryIter<'_> {
        HistoryIter {
            history: self,
            cursor: self.head,
        }
    }
}

struct HistoryIter<'a> {
    history: &'a History,
    cursor: Option<usize>,
}

impl<'a> Iterator for HistoryIter<'a> {
    type Item = &'a Beacon;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.history.slot(self.cursor?);
        self.cursor = slot.next;
        Some(&slot.beacon)
    }
}

// ── Membership ────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Membership {
    index: HashMap<NodeId, usize>,
    history: History,
}

impl Membership {
    fn refresh(&mut self, sender: NodeId, now: Instant) -> Sighting {
        if let Some(&handle) = self.index.get(&sender) {
            self.history.touch(handle, now);
            return Sighting::Refreshed;
        }
        let handle = self.history.push_front(Beacon {
            timestamp: now,
            sender,
        });
        self.index.insert(sender, handle);
        Sighting::New
    }

    /// Evict from the back while entries are older than
    /// now - (history length + grace) seconds.
    fn evict_stale(&mut self, now: Instant) -> Vec<NodeId> {
        let window = Duration::from_secs(self.history.len() as u64 + STALENESS_GRACE_SECS);
        let Some(threshold) = now.checked_sub(window) else {
            return Vec::new();
        };

        let mut evicted = Vec::new();
        while let Some(back) = self.history.back() {
            if back.timestamp >= threshold {
                break;
            }
            if let Some(beacon) = self.history.pop_back() {
                self.index.remove(&beacon.sender);
                evicted.push(beacon.sender);
            }
        }
        evicted
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}

/// Beacon interval for a given swarm size: BASE_INTERVAL * (count + 1).
pub fn interval_for(count: usize) -> Duration {
    Duration::from_secs(BASE_INTERVAL_SECS * (count as u64 + 1))
}

// ── Exported statistic ────────────────────────────────────────────────────────

/// Read handle for the live node count. Cheap to clone, never blocks.
///
/// Updated once per registry mutation, so a reader sees the count either
/// before or after a refresh/eviction, never part-way through one.
#[derive(Debug, Clone, Default)]
pub struct NodeCount(Arc<AtomicUsize>);

impl NodeCount {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    fn publish(&self, count: usize) {
        self.0.store(count, Ordering::Release);
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// The node registry — shared between the updater, transmitter, sweeper,
/// and status tasks. Clones share the same membership.
#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    inner: Arc<RwLock<Membership>>,
    count: NodeCount,
}

impl NodeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sighting of `sender` now.
    ///
    /// The clock is read under the write guard, so timestamps enter the
    /// history in lock order and recency order holds across writers.
    pub async fn refresh(&self, sender: NodeId) -> Sighting {
        let mut m = self.inner.write().await;
        self.refresh_locked(&mut m, sender, Instant::now())
    }

    /// `refresh` with an explicit timestamp. `now` must not be earlier
    /// than any timestamp already recorded.
    pub async fn refresh_at(&self, sender: NodeId, now: Instant) -> Sighting {
        let mut m = self.inner.write().await;
        self.refresh_locked(&mut m, sender, now)
    }

    fn refresh_locked(&self, m: &mut Membership, sender: NodeId, now: Instant) -> Sighting {
        let sighting = m.refresh(sender, now);
        if sighting == Sighting::New {
            self.count.publish(m.len());
        }
        sighting
    }

    /// Drop peers not seen within the staleness threshold.
    /// Returns the evicted ids, stalest first.
    pub async fn evict_stale(&self) -> Vec<NodeId> {
        let mut m = self.inner.write().await;
        self.evict_locked(&mut m, Instant::now())
    }

    pub async fn evict_stale_at(&self, now: Instant) -> Vec<NodeId> {
        let mut m = self.inner.write().await;
        self.evict_locked(&mut m, now)
    }

    fn evict_locked(&self, m: &mut Membership, now: Instant) -> Vec<NodeId> {
        let evicted = m.evict_stale(now);
        if !evicted.is_empty() {
            self.count.publish(m.len());
        }
        evicted
    }

    /// How long the transmitter should wait before the next beacon.
    pub async fn interval(&self) -> Duration {
        interval_for(self.inner.read().await.len())
    }

    pub async fn count(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Lock-free handle on the node count for monitoring consumers.
    pub fn node_count(&self) -> NodeCount {
        self.count.clone()
    }

    /// Live peers, most recently seen first.
    pub async fn snapshot(&self) -> Vec<PeerView> {
        let m = self.inner.read().await;
        let now = Instant::now();
        m.history
            .iter()
            .map(|b| PeerView {
                node_id: b.sender,
                last_seen: now.saturating_duration_since(b.timestamp),
            })
            .collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
