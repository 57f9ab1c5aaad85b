//! JSON objects.
//!
//! Members live in the root arena; the object only maps keys to member
//! tickets. Which write owns a key is decided by `CrdtRoot`, which can see
//! when each member was positioned.

use serde::Deserialize;
use serde::Serialize;

use super::element_rht::ElementRht;
use super::primitives::TimeTicket;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrdtObject {
    members: ElementRht,
}

impl CrdtObject {
    pub fn new() -> CrdtObject {
        return CrdtObject::default();
    }

    /// Ticket of the member that currently owns `key`.
    pub fn owner(&self, key: &str) -> Option<TimeTicket> {
        return self.members.owner(key);
    }

    /// Record a write of `created_at` under `key`, optionally taking the key.
    pub fn add_member(&mut self, key: &str, created_at: TimeTicket, owns: bool) {
        self.members.insert(key, created_at);
        if owns {
            self.members.set_owner(key, created_at);
        }
    }

    pub fn key_of(&self, created_at: &TimeTicket) -> Option<&str> {
        return self.members.key_of(created_at);
    }

    pub fn contains(&self, created_at: &TimeTicket) -> bool {
        return self.members.contains(created_at);
    }

    /// Key owners in key order. Owners may be tombstoned.
    pub fn owners(&self) -> impl Iterator<Item = (&str, TimeTicket)> {
        return self.members.owners();
    }

    /// Every member, including overwritten ones.
    pub fn members(&self) -> Vec<TimeTicket> {
        return self.members.members();
    }

    pub fn purge(&mut self, created_at: &TimeTicket) {
        self.members.purge(created_at);
    }

    pub fn len(&self) -> usize {
        return self.members.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.members.is_empty();
    }
}
