//! Replicated hash table for string attributes.
//!
//! Backs text run attributes and tree node attributes. Each key holds one
//! node stamped with the ticket of its last write; a write only lands when
//! its ticket is newer. Removal leaves a tombstone so that an older
//! concurrent write cannot resurrect the key.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use super::primitives::GcBoundary;
use super::primitives::TimeTicket;
use super::size::DataSize;
use super::size::DocSize;
use super::size::string_size;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RhtNode {
    pub value: String,
    pub updated_at: TimeTicket,
    pub removed: bool,
}

impl RhtNode {
    fn data_size(&self, key: &str) -> DataSize {
        return DataSize::new(string_size(key) + string_size(&self.value), DataSize::tickets(1).meta);
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rht {
    nodes: BTreeMap<String, RhtNode>,
}

impl Rht {
    pub fn new() -> Rht {
        return Rht::default();
    }

    /// Write `value` under `key` if `executed_at` is newer than the current
    /// node. Returns true when the write landed.
    pub fn set(&mut self, key: &str, value: &str, executed_at: TimeTicket) -> bool {
        if let Some(prev) = self.nodes.get(key) {
            if !executed_at.after(&prev.updated_at) {
                return false;
            }
        }
        self.nodes.insert(
            key.to_string(),
            RhtNode {
                value: value.to_string(),
                updated_at: executed_at,
                removed: false,
            },
        );
        return true;
    }

    /// Tombstone `key`. Returns true when a live value was removed.
    pub fn remove(&mut self, key: &str, executed_at: TimeTicket) -> bool {
        let (value, was_live) = match self.nodes.get(key) {
            Some(prev) if !executed_at.after(&prev.updated_at) => return false,
            Some(prev) => (prev.value.clone(), !prev.removed),
            None => (String::new(), false),
        };
        self.nodes.insert(
            key.to_string(),
            RhtNode {
                value,
                updated_at: executed_at,
                removed: true,
            },
        );
        return was_live;
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        return match self.nodes.get(key) {
            Some(node) if !node.removed => Some(node.value.as_str()),
            _ => None,
        };
    }

    pub fn has(&self, key: &str) -> bool {
        return self.get(key).is_some();
    }

    /// Live entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        return self
            .nodes
            .iter()
            .filter(|(_, node)| !node.removed)
            .map(|(key, node)| (key.as_str(), node.value.as_str()));
    }

    pub fn is_empty(&self) -> bool {
        return self.iter().next().is_none();
    }

    /// Live entries as an owned map.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        return self.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    }

    pub fn removed_count(&self) -> usize {
        return self.nodes.values().filter(|node| node.removed).count();
    }

    /// Size of all nodes, tombstones counted as garbage.
    pub fn doc_size(&self) -> DocSize {
        let mut size = DocSize::default();
        for (key, node) in &self.nodes {
            size.add(node.data_size(key), node.removed);
        }
        return size;
    }

    /// Drop tombstones the boundary dominates. Returns how many were dropped.
    pub fn purge(&mut self, boundary: &dyn GcBoundary) -> usize {
        let before = self.nodes.len();
        self.nodes
            .retain(|_, node| !(node.removed && boundary.dominates(&node.updated_at)));
        return before - self.nodes.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::primitives::ActorId;

    fn ticket(lamport: u64) -> TimeTicket {
        return TimeTicket::new(lamport, 0, ActorId::INITIAL);
    }

    #[test]
    fn newer_write_wins_in_any_order() {
        let mut a = Rht::new();
        a.set("b", "1", ticket(1));
        a.set("b", "2", ticket(2));

        let mut b = Rht::new();
        b.set("b", "2", ticket(2));
        assert!(!b.set("b", "1", ticket(1)));

        assert_eq!(a, b);
        assert_eq!(a.get("b"), Some("2"));
    }

    #[test]
    fn remove_blocks_older_writes() {
        let mut rht = Rht::new();
        rht.set("color", "red", ticket(1));
        assert!(rht.remove("color", ticket(3)));
        assert!(!rht.set("color", "blue", ticket(2)));
        assert!(!rht.has("color"));
        assert_eq!(rht.removed_count(), 1);

        assert!(rht.set("color", "green", ticket(4)));
        assert_eq!(rht.get("color"), Some("green"));
        assert_eq!(rht.removed_count(), 0);
    }

    #[test]
    fn sizes_and_purge() {
        let mut rht = Rht::new();
        rht.set("b", "1", ticket(1));
        rht.set("i", "true", ticket(2));
        rht.remove("i", ticket(3));

        let size = rht.doc_size();
        assert_eq!(size.live, DataSize::new(4, 24));
        assert_eq!(size.gc, DataSize::new(10, 24));

        assert_eq!(rht.purge(&ticket(2)), 0);
        assert_eq!(rht.purge(&ticket(3)), 1);
        assert_eq!(rht.doc_size().gc, DataSize::default());
        assert_eq!(rht.to_map().len(), 1);
    }
}
