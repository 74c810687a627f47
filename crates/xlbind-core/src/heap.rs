//! Handle-indexed object heap.
//!
//! Objects handed to the host are interned here and referred to by an
//! [`ObjectHandle`]. The heap cannot trace references held by the host, so
//! reclamation is driven from outside: a collection driver periodically
//! reports every handle it can still see in live cells and the heap evicts
//! what has been missing for long enough.
//!
//! Concurrency: both lookup directions are sharded [`DashMap`]s. `intern`
//! uses the identity map's entry as its insert-if-absent primitive, so
//! concurrent interning of one instance yields one handle without a global
//! lock. Eviction happens while holding that same entry, which keeps the
//! two directions consistent for readers. Only one collection cycle runs at
//! a time.

use crate::config::{HandleSeed, HeapConfig};
use crate::error::{BridgeError, BridgeResult};
use crate::managed::{Object, ObjectId};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use xlbind_common::ObjectHandle;

/// Outcome of one [`Heap::end_cycle`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Handles old enough to be considered this cycle.
    pub examined: usize,
    /// Handles confirmed reachable.
    pub live: usize,
    /// Handles evicted.
    pub collected: usize,
    /// Distinct reachable handles the heap does not know. Non-zero means the
    /// host holds stale handles and should force a full recompute.
    pub unrecognised: usize,
}

#[derive(Default)]
struct CollectorState {
    /// Allocation ordinal at `begin_cycle`; younger handles are exempt.
    boundary: Option<u64>,
    misses: FxHashMap<ObjectHandle, u32>,
    cycles: u64,
}

pub struct Heap {
    handle_to_obj: DashMap<ObjectHandle, Object>,
    obj_to_handle: DashMap<ObjectId, ObjectHandle>,
    base: u64,
    issued: AtomicU64,
    hysteresis: u32,
    collector: Mutex<CollectorState>,
}

impl Heap {
    pub fn new(config: &HeapConfig) -> Self {
        let base = match config.seed {
            HandleSeed::Fixed(seed) => seed,
            HandleSeed::HostAndClock => host_and_clock_seed(),
        };
        tracing::debug!(base, hysteresis = config.hysteresis, "heap created");
        Self {
            handle_to_obj: DashMap::new(),
            obj_to_handle: DashMap::new(),
            base,
            issued: AtomicU64::new(0),
            hysteresis: config.hysteresis,
            collector: Mutex::new(CollectorState::default()),
        }
    }

    /// Handle for `object`, allocating one on first sight.
    ///
    /// Lookup is by identity: two distinct objects that compare equal get
    /// distinct handles.
    pub fn intern(&self, object: &Object) -> ObjectHandle {
        let id = object.identity();
        if let Some(existing) = self.obj_to_handle.get(&id) {
            return *existing;
        }
        match self.obj_to_handle.entry(id) {
            // someone interned the same instance between our get and entry
            Entry::Occupied(e) => *e.get(),
            Entry::Vacant(slot) => {
                let ordinal = self.issued.fetch_add(1, Ordering::AcqRel);
                let handle = ObjectHandle(self.base.wrapping_add(ordinal));
                tracing::trace!(%handle, ty = %object.managed_type(), "new object handle");
                self.handle_to_obj.insert(handle, object.clone());
                slot.insert(handle);
                handle
            }
        }
    }

    /// The object behind `handle`.
    pub fn resolve(&self, handle: ObjectHandle) -> BridgeResult<Object> {
        match self.handle_to_obj.get(&handle) {
            Some(obj) => Ok(obj.value().clone()),
            None => {
                tracing::warn!(%handle, "cannot find object with handle");
                Err(BridgeError::NotFound(handle))
            }
        }
    }

    /// Existing handle for `object`, without interning it.
    pub fn handle_of(&self, object: &Object) -> Option<ObjectHandle> {
        self.obj_to_handle.get(&object.identity()).map(|h| *h)
    }

    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.handle_to_obj.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.handle_to_obj.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handle_to_obj.is_empty()
    }

    /// Number of completed `end_cycle` calls.
    pub fn cycles_completed(&self) -> u64 {
        self.collector.lock().cycles
    }

    /// Start a collection cycle: handles issued from now on are exempt
    /// until the next cycle begins.
    pub fn begin_cycle(&self) {
        let mut state = self.collector.lock();
        let boundary = self.issued.load(Ordering::Acquire);
        state.boundary = Some(boundary);
        tracing::trace!(
            snap = %ObjectHandle(self.base.wrapping_add(boundary)),
            "collection cycle starting"
        );
    }

    /// Finish a cycle given every handle currently reachable from the host.
    ///
    /// Handles issued before the boundary and absent from `reachable` gain a
    /// miss; once the misses exceed the hysteresis threshold the handle is
    /// evicted from both directions. Reachable handles have their misses
    /// cleared. Without a preceding `begin_cycle` nothing is eligible.
    pub fn end_cycle(&self, reachable: &[ObjectHandle]) -> CycleReport {
        let _span = tracing::info_span!("heap_cycle", reachable = reachable.len()).entered();
        let mut guard = self.collector.lock();
        let state = &mut *guard;
        let boundary = state.boundary.unwrap_or(0);

        let reachable: FxHashSet<ObjectHandle> = reachable.iter().copied().collect();
        let mut report = CycleReport {
            unrecognised: reachable.iter().filter(|h| !self.contains(**h)).count(),
            ..CycleReport::default()
        };

        let mut doomed = Vec::new();
        for entry in self.handle_to_obj.iter() {
            let handle = *entry.key();
            if self.ordinal(handle) >= boundary {
                // may have been created after the host computed `reachable`
                continue;
            }
            report.examined += 1;
            if reachable.contains(&handle) {
                state.misses.remove(&handle);
                report.live += 1;
                continue;
            }
            let misses = state.misses.entry(handle).or_insert(0);
            *misses += 1;
            if *misses > self.hysteresis {
                doomed.push((handle, entry.value().identity()));
            } else {
                tracing::trace!(%handle, misses = *misses, "handle not reachable");
            }
        }

        for (handle, id) in doomed {
            state.misses.remove(&handle);
            if self.evict(handle, id) {
                tracing::trace!(%handle, "handle collected");
                report.collected += 1;
            }
        }
        state.cycles += 1;

        tracing::debug!(
            examined = report.examined,
            live = report.live,
            collected = report.collected,
            unrecognised = report.unrecognised,
            "collection cycle finished"
        );
        if report.unrecognised > 0 {
            tracing::error!(
                unrecognised = report.unrecognised,
                "host references unrecognised handles, recalculation required"
            );
        }
        report
    }

    /// `end_cycle` immediately followed by `begin_cycle`: the usual call
    /// after each host recalculation.
    pub fn cycle(&self, reachable: &[ObjectHandle]) -> CycleReport {
        let report = self.end_cycle(reachable);
        self.begin_cycle();
        report
    }

    fn ordinal(&self, handle: ObjectHandle) -> u64 {
        handle.0.wrapping_sub(self.base)
    }

    /// Remove `handle` from both directions as one step for readers.
    fn evict(&self, handle: ObjectHandle, id: ObjectId) -> bool {
        match self.obj_to_handle.entry(id) {
            Entry::Occupied(e) if *e.get() == handle => {
                self.handle_to_obj.remove(&handle);
                e.remove();
                true
            }
            _ => self.handle_to_obj.remove(&handle).is_some(),
        }
    }
}

impl fmt::Display for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<(ObjectHandle, String)> = self
            .handle_to_obj
            .iter()
            .map(|e| (*e.key(), e.value().describe()))
            .collect();
        entries.sort_by_key(|(h, _)| *h);
        writeln!(f, "Heap[")?;
        for (handle, desc) in entries {
            writeln!(f, "  {handle} => {desc}")?;
        }
        write!(f, "]")
    }
}

impl fmt::Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("len", &self.len())
            .field("base", &self.base)
            .field("issued", &self.issued.load(Ordering::Relaxed))
            .field("hysteresis", &self.hysteresis)
            .finish()
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    let mut hash = FNV_OFFSET;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn host_identifier() -> Option<String> {
    for var in ["HOSTNAME", "COMPUTERNAME"] {
        if let Ok(name) = std::env::var(var)
            && !name.trim().is_empty()
        {
            return Some(name.trim().to_string());
        }
    }
    std::fs::read_to_string("/etc/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn host_and_clock_seed() -> u64 {
    // seconds are plenty; finer resolution buys nothing against restarts
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    match host_identifier() {
        Some(host) => fnv1a(host.as_bytes()) ^ secs,
        None => rand::random::<u64>() ^ secs,
    }
}
