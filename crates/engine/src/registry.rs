//! Process-wide map of live matches.
//!
//! Sharded by `DashMap`; each entry is an `Arc<Mutex<MatchEngine>>` so
//! callers clone the handle out and release the shard before locking the
//! engine. Nothing in this module holds a shard guard while taking an
//! engine lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::MatchError;
use crate::game::{MatchEngine, MatchStatus, Side};
use crate::ids::{MatchId, UserId};

pub type MatchHandle = Arc<Mutex<MatchEngine>>;

/// Lock a match engine. Poisoning means a panic mid-mutation; the state is
/// unusable at that point.
pub fn lock(handle: &MatchHandle) -> MutexGuard<'_, MatchEngine> {
    handle.lock().expect("match engine poisoned")
}

struct Slot {
    /// Insertion order, for "oldest waiting match" lookups.
    seq: u64,
    engine: MatchHandle,
}

pub struct MatchRegistry {
    matches: DashMap<MatchId, Slot>,
    next_seq: AtomicU64,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self {
            matches: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Register a freshly created engine. Fails if the id is taken.
    pub fn create(&self, engine: MatchEngine) -> Result<MatchHandle, MatchError> {
        let id = engine.id();
        match self.matches.entry(id) {
            Entry::Occupied(_) => Err(MatchError::DuplicateMatch(id)),
            Entry::Vacant(vacant) => {
                let handle = Arc::new(Mutex::new(engine));
                vacant.insert(Slot {
                    seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
                    engine: Arc::clone(&handle),
                });
                Ok(handle)
            }
        }
    }

    pub fn get(&self, id: MatchId) -> Option<MatchHandle> {
        self.matches.get(&id).map(|slot| Arc::clone(&slot.engine))
    }

    pub fn remove(&self, id: MatchId) -> Option<MatchHandle> {
        self.matches.remove(&id).map(|(_, slot)| slot.engine)
    }

    pub fn exists(&self, id: MatchId) -> bool {
        self.matches.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Every handle, oldest first. Shard guards are released on return.
    pub fn handles(&self) -> Vec<(MatchId, MatchHandle)> {
        let mut all: Vec<(u64, MatchId, MatchHandle)> = self
            .matches
            .iter()
            .map(|e| (e.value().seq, *e.key(), Arc::clone(&e.value().engine)))
            .collect();
        all.sort_by_key(|(seq, _, _)| *seq);
        all.into_iter().map(|(_, id, h)| (id, h)).collect()
    }

    /// Oldest match still waiting for an opponent whose creator is not
    /// `excluding`. Tournament matches are never offered.
    pub fn find_joinable(&self, excluding: UserId) -> Option<MatchId> {
        self.handles().into_iter().find_map(|(id, handle)| {
            let engine = lock(&handle);
            let open = engine.status() == MatchStatus::Waiting
                && engine.tournament().is_none()
                && engine.state().players.id(Side::Player1) != Some(excluding);
            open.then_some(id)
        })
    }

    /// Unfinished matches `user` is seated in.
    pub fn matches_for(&self, user: UserId) -> Vec<MatchId> {
        self.handles()
            .into_iter()
            .filter_map(|(id, handle)| {
                let engine = lock(&handle);
                (engine.has_player(user) && !engine.is_finished()).then_some(id)
            })
            .collect()
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}
