//! Version vectors for tracking what each replica has observed.
//!
//! A version vector maps each actor to the highest lamport value seen
//! from that actor. It drives two decisions:
//!
//! - which concurrent text/tree content an edit is allowed to delete
//! - when a tombstone can be reclaimed (every replica has seen the removal)
//!
//! Complexity:
//! - get/set: O(log n) where n is number of actors
//! - max/min: O(n)

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use super::id::ActorId;
use super::id::TimeTicket;

/// Per-actor high-water marks of lamport time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionVector {
    entries: BTreeMap<ActorId, u64>,
}

impl VersionVector {
    /// Create an empty vector.
    pub fn new() -> VersionVector {
        return VersionVector {
            entries: BTreeMap::new(),
        };
    }

    /// Build a vector from `(actor, lamport)` pairs.
    pub fn from_entries(entries: impl IntoIterator<Item = (ActorId, u64)>) -> VersionVector {
        return VersionVector {
            entries: entries.into_iter().collect(),
        };
    }

    /// The lamport recorded for `actor`, if any.
    pub fn get(&self, actor: &ActorId) -> Option<u64> {
        return self.entries.get(actor).copied();
    }

    /// Record `lamport` for `actor`, replacing the previous value.
    pub fn set(&mut self, actor: ActorId, lamport: u64) {
        self.entries.insert(actor, lamport);
    }

    /// Raise the entry for `actor` to at least `lamport`.
    pub fn update(&mut self, actor: ActorId, lamport: u64) {
        let entry = self.entries.entry(actor).or_insert(0);
        *entry = (*entry).max(lamport);
    }

    pub fn unset(&mut self, actor: &ActorId) {
        self.entries.remove(actor);
    }

    pub fn len(&self) -> usize {
        return self.entries.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.entries.is_empty();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ActorId, &u64)> {
        return self.entries.iter();
    }

    /// The largest lamport in the vector, 0 when empty.
    pub fn max_lamport(&self) -> u64 {
        return self.entries.values().copied().max().unwrap_or(0);
    }

    /// Pointwise maximum of two vectors.
    pub fn max(&self, other: &VersionVector) -> VersionVector {
        let mut merged = self.clone();
        merged.merge(other);
        return merged;
    }

    /// Merge another vector into this one, keeping the pointwise maximum.
    pub fn merge(&mut self, other: &VersionVector) {
        for (actor, lamport) in &other.entries {
            self.update(*actor, *lamport);
        }
    }

    /// Pointwise minimum of two vectors.
    ///
    /// An actor missing from either side counts as 0 there.
    pub fn min(&self, other: &VersionVector) -> VersionVector {
        let mut result = VersionVector::new();
        for (actor, lamport) in &self.entries {
            let theirs = other.get(actor).unwrap_or(0);
            result.set(*actor, (*lamport).min(theirs));
        }
        for actor in other.entries.keys() {
            if !self.entries.contains_key(actor) {
                result.set(*actor, 0);
            }
        }
        return result;
    }

    /// True when this vector has seen the event named by `ticket`.
    pub fn after_or_equal(&self, ticket: &TimeTicket) -> bool {
        return match self.get(&ticket.actor()) {
            Some(lamport) => lamport >= ticket.lamport(),
            None => false,
        };
    }

    /// Keep only the given actors.
    pub fn filter(&self, actors: &[ActorId]) -> VersionVector {
        return VersionVector {
            entries: self
                .entries
                .iter()
                .filter(|(actor, _)| actors.contains(actor))
                .map(|(actor, lamport)| (*actor, *lamport))
                .collect(),
        };
    }
}

/// Decides which tombstones every replica has already observed.
pub trait GcBoundary {
    /// True when a tombstone stamped `removed_at` can be purged.
    fn dominates(&self, removed_at: &TimeTicket) -> bool;
}

impl GcBoundary for VersionVector {
    fn dominates(&self, removed_at: &TimeTicket) -> bool {
        return self.after_or_equal(removed_at);
    }
}

/// The older min-synced ticket form: purges everything at or before it.
impl GcBoundary for TimeTicket {
    fn dominates(&self, removed_at: &TimeTicket) -> bool {
        return !removed_at.after(self);
    }
}
