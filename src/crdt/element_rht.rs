//! Member index of an object.
//!
//! Objects keep their children in the root arena. This table only records
//! which child currently owns each key, and which key every child (winning,
//! losing or removed) was written under. Priority between writes to the
//! same key is decided by the caller, which can see the children's tickets.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde::Serialize;

use super::primitives::TimeTicket;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRht {
    /// Current owner of each key. Sorted so projections are deterministic.
    by_key: BTreeMap<String, TimeTicket>,
    /// Every member ever written, keyed by creation ticket.
    by_created_at: FxHashMap<TimeTicket, String>,
}

impl ElementRht {
    pub fn new() -> ElementRht {
        return ElementRht::default();
    }

    /// The member currently owning `key`, which may be removed.
    pub fn owner(&self, key: &str) -> Option<TimeTicket> {
        return self.by_key.get(key).copied();
    }

    /// Record `created_at` as a member written under `key`.
    pub fn insert(&mut self, key: &str, created_at: TimeTicket) {
        self.by_created_at.insert(created_at, key.to_string());
    }

    /// Make `created_at` the owner of `key`.
    pub fn set_owner(&mut self, key: &str, created_at: TimeTicket) {
        self.by_key.insert(key.to_string(), created_at);
    }

    pub fn key_of(&self, created_at: &TimeTicket) -> Option<&str> {
        return self.by_created_at.get(created_at).map(String::as_str);
    }

    pub fn contains(&self, created_at: &TimeTicket) -> bool {
        return self.by_created_at.contains_key(created_at);
    }

    /// Forget a member entirely. Used when it is garbage collected.
    pub fn purge(&mut self, created_at: &TimeTicket) {
        if let Some(key) = self.by_created_at.remove(created_at) {
            if self.by_key.get(&key) == Some(created_at) {
                self.by_key.remove(&key);
            }
        }
    }

    /// Key owners in key order.
    pub fn owners(&self) -> impl Iterator<Item = (&str, TimeTicket)> {
        return self.by_key.iter().map(|(key, ticket)| (key.as_str(), *ticket));
    }

    /// Every member in ticket order.
    pub fn members(&self) -> Vec<TimeTicket> {
        let mut members: Vec<TimeTicket> = self.by_created_at.keys().copied().collect();
        members.sort();
        return members;
    }

    pub fn len(&self) -> usize {
        return self.by_created_at.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.by_created_at.is_empty();
    }
}
