//! CRDT data structures that make up a document.
//!
//! Leaves first:
//!
//! - `primitives`: actor ids, time tickets, version vectors
//! - `splay_tree`, `index_tree`: weighted sequences, flat and nested
//! - `rht`, `element_rht`: register maps for attributes and object keys
//! - `rga_tree_list`, `rga_tree_split`: array order and text runs
//! - `primitive`, `counter`, `object`, `array`, `text`, `tree`: element kinds
//! - `element`: the tagged union over those kinds
//! - `root`: the arena owning every element, with garbage collection
//! - `op`: operations replayed against a root

use std::collections::BTreeMap;

pub mod array;
pub mod counter;
pub mod element;
pub mod element_rht;
pub mod index_tree;
pub mod object;
pub mod op;
pub mod primitive;
pub mod primitives;
pub mod rga_tree_list;
pub mod rga_tree_split;
pub mod rht;
pub mod root;
pub mod size;
pub mod splay_tree;
pub mod text;
pub mod tree;

use primitives::ActorId;
use primitives::TimeTicket;
use primitives::VersionVector;

/// Per actor, the newest creation ticket an edit was able to see.
pub type MaxCreatedAtMap = BTreeMap<ActorId, TimeTicket>;

/// Keep the newest ticket per actor.
pub fn record_created_at(map: &mut MaxCreatedAtMap, created_at: TimeTicket) {
    let entry = map.entry(created_at.actor()).or_insert(created_at);
    if created_at.after(entry) {
        *entry = created_at;
    }
}

/// Which existing content a range deletion may touch.
///
/// An editor can only mean to delete what it had seen. Content another
/// actor inserted concurrently lies inside the range on this replica but
/// must survive.
#[derive(Clone, Copy, Debug)]
pub enum DeleteGuard<'a> {
    /// A local edit sees the whole document.
    Local,
    /// The editor's view, recorded when the edit ran locally.
    ByMap(&'a MaxCreatedAtMap),
    /// The version vector of the change carrying the edit.
    ByVersionVector(&'a VersionVector),
}

impl DeleteGuard<'_> {
    /// True when the editor had seen content created at `created_at`.
    pub fn knows(&self, created_at: &TimeTicket) -> bool {
        return match self {
            DeleteGuard::Local => true,
            DeleteGuard::ByMap(map) => match map.get(&created_at.actor()) {
                Some(max) => !created_at.after(max),
                None => false,
            },
            DeleteGuard::ByVersionVector(vv) => vv.after_or_equal(created_at),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket(lamport: u64, who: u8) -> TimeTicket {
        let mut bytes = [0u8; 12];
        bytes[11] = who;
        return TimeTicket::new(lamport, 0, ActorId::new(bytes));
    }

    #[test]
    fn max_map_keeps_newest() {
        let mut map = MaxCreatedAtMap::new();
        record_created_at(&mut map, ticket(3, 1));
        record_created_at(&mut map, ticket(2, 1));
        record_created_at(&mut map, ticket(5, 2));
        assert_eq!(map.get(&ticket(0, 1).actor()), Some(&ticket(3, 1)));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn guards() {
        let mut map = MaxCreatedAtMap::new();
        record_created_at(&mut map, ticket(3, 1));
        let guard = DeleteGuard::ByMap(&map);
        assert!(guard.knows(&ticket(3, 1)));
        assert!(!guard.knows(&ticket(4, 1)));
        assert!(!guard.knows(&ticket(1, 2)));

        let vv = VersionVector::from_entries([(ticket(0, 2).actor(), 4)]);
        let guard = DeleteGuard::ByVersionVector(&vv);
        assert!(guard.knows(&ticket(4, 2)));
        assert!(!guard.knows(&ticket(5, 2)));
        assert!(DeleteGuard::Local.knows(&ticket(99, 9)));
    }
}
