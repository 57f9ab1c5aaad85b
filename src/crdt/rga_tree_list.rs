//! Replicated growable array of element tickets.
//!
//! The sequence behind `CrdtArray`. The list is made of position slots: an
//! insert or a move adds a slot named by its own ticket, linked after the
//! slot it was aimed at. Slots are never relinked, so their order depends
//! on tickets alone. An element shows up at its newest slot; older slots
//! stay behind as anchors with no weight.
//!
//! Slots live in a splay tree weighted 1 for the current slot of a live
//! element and 0 otherwise, so index lookups only see the live view.
//! Concurrent slots after the same anchor are ordered newest first: a new
//! slot skips every following slot positioned after its own ticket.

use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde::Serialize;

use super::primitives::TimeTicket;
use super::splay_tree::NodeIdx;
use super::splay_tree::SplayTree;
use crate::Error;
use crate::Result;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ListNode {
    created_at: TimeTicket,
    positioned_at: TimeTicket,
    removed: bool,
    /// A newer slot holds the element.
    superseded: bool,
}

impl ListNode {
    fn weight(&self) -> usize {
        return if self.removed || self.superseded { 0 } else { 1 };
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RgaTreeList {
    tree: SplayTree<ListNode>,
    /// Current slot of every element.
    by_created_at: FxHashMap<TimeTicket, NodeIdx>,
    by_positioned_at: FxHashMap<TimeTicket, NodeIdx>,
    /// Superseded slots per element, dropped with the element.
    stale: FxHashMap<TimeTicket, Vec<TimeTicket>>,
}

impl Default for RgaTreeList {
    fn default() -> Self {
        return RgaTreeList::new();
    }
}

impl RgaTreeList {
    pub fn new() -> RgaTreeList {
        let mut tree = SplayTree::new();
        // Dummy head, so every insert has something to follow.
        let head = tree.push_back(
            ListNode {
                created_at: TimeTicket::INITIAL,
                positioned_at: TimeTicket::INITIAL,
                removed: false,
                superseded: false,
            },
            0,
        );
        let mut by_created_at = FxHashMap::default();
        by_created_at.insert(TimeTicket::INITIAL, head);
        let mut by_positioned_at = FxHashMap::default();
        by_positioned_at.insert(TimeTicket::INITIAL, head);
        return RgaTreeList {
            tree,
            by_created_at,
            by_positioned_at,
            stale: FxHashMap::default(),
        };
    }

    /// Number of live elements.
    pub fn len(&self) -> usize {
        return self.tree.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.len() == 0;
    }

    pub fn contains(&self, created_at: &TimeTicket) -> bool {
        return *created_at != TimeTicket::INITIAL && self.by_created_at.contains_key(created_at);
    }

    /// True when a slot named `positioned_at` exists. The head is `INITIAL`.
    pub fn contains_position(&self, positioned_at: &TimeTicket) -> bool {
        return self.by_positioned_at.contains_key(positioned_at);
    }

    /// The slot currently holding `created_at`. `INITIAL` names the head.
    pub fn position_of(&self, created_at: &TimeTicket) -> Option<TimeTicket> {
        let idx = self.by_created_at.get(created_at)?;
        return Some(self.tree.get(*idx).positioned_at);
    }

    /// Ticket of the last slot, current or not. `INITIAL` when empty.
    pub fn last_position(&self) -> TimeTicket {
        return match self.tree.last() {
            Some(idx) => self.tree.get(idx).positioned_at,
            None => TimeTicket::INITIAL,
        };
    }

    /// Link `created_at` in a new slot after the slot `prev_positioned_at`.
    /// An inserted element is positioned at its creation, so its slot is
    /// named `executed_at`.
    pub fn insert_after(
        &mut self,
        prev_positioned_at: TimeTicket,
        created_at: TimeTicket,
        executed_at: TimeTicket,
    ) -> Result<()> {
        if self.by_created_at.contains_key(&created_at) {
            return Ok(());
        }
        let node = ListNode {
            created_at,
            positioned_at: executed_at,
            removed: false,
            superseded: false,
        };
        let idx = self.link(prev_positioned_at, node)?;
        self.by_created_at.insert(created_at, idx);
        return Ok(());
    }

    /// Add a slot for `created_at` after `prev_positioned_at`. The element
    /// takes it when `executed_at` is newer than its current slot. Returns
    /// true when the element moved.
    pub fn move_after(
        &mut self,
        prev_positioned_at: TimeTicket,
        created_at: TimeTicket,
        executed_at: TimeTicket,
    ) -> Result<bool> {
        let current = self.lookup(&created_at)?;
        if !self.contains_position(&prev_positioned_at) {
            return Err(Error::ElementNotFound(prev_positioned_at));
        }
        if self.contains_position(&executed_at) {
            return Ok(false);
        }

        let (current_at, removed) = {
            let node = self.tree.get(current);
            (node.positioned_at, node.removed)
        };
        let wins = executed_at.after(&current_at);
        let node = ListNode {
            created_at,
            positioned_at: executed_at,
            removed,
            superseded: !wins,
        };
        let idx = self.link(prev_positioned_at, node)?;

        if !wins {
            self.stale.entry(created_at).or_default().push(executed_at);
            return Ok(false);
        }
        self.tree.get_mut(current).superseded = true;
        self.tree.set_length(current, 0);
        self.stale.entry(created_at).or_default().push(current_at);
        self.by_created_at.insert(created_at, idx);
        return Ok(true);
    }

    /// Set the removed flag of an element, updating its weight.
    pub fn set_removed(&mut self, created_at: &TimeTicket, removed: bool) -> Result<()> {
        let idx = self.lookup(created_at)?;
        let node = self.tree.get_mut(idx);
        node.removed = removed;
        let weight = node.weight();
        self.tree.set_length(idx, weight);
        return Ok(());
    }

    /// Ticket of the live element at `index`.
    pub fn get_by_index(&mut self, index: usize) -> Option<TimeTicket> {
        if index >= self.len() {
            return None;
        }
        let (idx, _) = self.tree.find(index + 1)?;
        return Some(self.tree.get(idx).created_at);
    }

    /// Live index of `created_at`. For a removed element this is the index
    /// it would have if it were still live.
    pub fn index_of(&self, created_at: &TimeTicket) -> Option<usize> {
        let idx = self.by_created_at.get(created_at)?;
        return Some(self.tree.index_of(*idx));
    }

    /// Slot just before the live element at `index`, or the head for
    /// index 0. Inserting after it places a value at `index`.
    pub fn prev_position_for_index(&mut self, index: usize) -> Result<TimeTicket> {
        if index == 0 {
            return Ok(TimeTicket::INITIAL);
        }
        let len = self.len();
        return self
            .get_by_index(index - 1)
            .and_then(|created_at| self.position_of(&created_at))
            .ok_or(Error::IndexOutOfRange { index, len });
    }

    /// Tickets of all elements in sequence order, with their removed flag.
    pub fn iter(&self) -> impl Iterator<Item = (TimeTicket, bool)> + '_ {
        return self
            .tree
            .iter()
            .skip(1)
            .filter(|(_, node)| !node.superseded)
            .map(|(_, node)| (node.created_at, node.removed));
    }

    /// Tickets of live elements in sequence order.
    pub fn live(&self) -> impl Iterator<Item = TimeTicket> + '_ {
        return self.iter().filter(|(_, removed)| !removed).map(|(ticket, _)| ticket);
    }

    /// Physically drop an element with all of its slots. Used by garbage
    /// collection.
    pub fn purge(&mut self, created_at: &TimeTicket) -> Result<()> {
        let idx = self.lookup(created_at)?;
        let node = self.tree.remove(idx);
        self.by_positioned_at.remove(&node.positioned_at);
        self.by_created_at.remove(created_at);
        for positioned_at in self.stale.remove(created_at).unwrap_or_default() {
            if let Some(idx) = self.by_positioned_at.remove(&positioned_at) {
                self.tree.remove(idx);
            }
        }
        return Ok(());
    }

    fn lookup(&self, created_at: &TimeTicket) -> Result<NodeIdx> {
        return self
            .by_created_at
            .get(created_at)
            .copied()
            .ok_or(Error::ElementNotFound(*created_at));
    }

    fn link(&mut self, prev_positioned_at: TimeTicket, node: ListNode) -> Result<NodeIdx> {
        let mut prev = self
            .by_positioned_at
            .get(&prev_positioned_at)
            .copied()
            .ok_or(Error::ElementNotFound(prev_positioned_at))?;
        while let Some(next) = self.tree.next(prev) {
            if !self.tree.get(next).positioned_at.after(&node.positioned_at) {
                break;
            }
            prev = next;
        }

        let positioned_at = node.positioned_at;
        let weight = node.weight();
        let idx = self.tree.insert_after(prev, node, weight);
        self.by_positioned_at.insert(positioned_at, idx);
        return Ok(idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::primitives::ActorId;

    fn actor(last: u8) -> ActorId {
        let mut bytes = [0u8; 12];
        bytes[11] = last;
        return ActorId::new(bytes);
    }

    fn ticket(lamport: u64, who: u8) -> TimeTicket {
        return TimeTicket::new(lamport, 0, actor(who));
    }

    fn order(list: &RgaTreeList) -> Vec<u64> {
        return list.live().map(|t| t.lamport()).collect();
    }

    #[test]
    fn append_and_index() {
        let mut list = RgaTreeList::new();
        let mut prev = TimeTicket::INITIAL;
        for lamport in 1..=3 {
            let t = ticket(lamport, 1);
            list.insert_after(prev, t, t).unwrap();
            prev = t;
        }
        assert_eq!(order(&list), vec![1, 2, 3]);
        assert_eq!(list.get_by_index(1), Some(ticket(2, 1)));
        assert_eq!(list.get_by_index(3), None);
        assert_eq!(list.index_of(&ticket(3, 1)), Some(2));
        assert_eq!(list.last_position(), ticket(3, 1));
    }

    #[test]
    fn concurrent_inserts_converge() {
        let base = ticket(1, 1);
        let x = ticket(2, 1);
        let y = ticket(2, 2);

        let mut a = RgaTreeList::new();
        a.insert_after(TimeTicket::INITIAL, base, base).unwrap();
        a.insert_after(base, x, x).unwrap();
        a.insert_after(base, y, y).unwrap();

        let mut b = RgaTreeList::new();
        b.insert_after(TimeTicket::INITIAL, base, base).unwrap();
        b.insert_after(base, y, y).unwrap();
        b.insert_after(base, x, x).unwrap();

        let a_order: Vec<TimeTicket> = a.live().collect();
        let b_order: Vec<TimeTicket> = b.live().collect();
        assert_eq!(a_order, b_order);
        // Newer insert comes first.
        assert_eq!(a_order, vec![base, y, x]);
    }

    #[test]
    fn removed_nodes_are_skipped_by_index() {
        let mut list = RgaTreeList::new();
        let (t1, t2, t3) = (ticket(1, 1), ticket(2, 1), ticket(3, 1));
        list.insert_after(TimeTicket::INITIAL, t1, t1).unwrap();
        list.insert_after(t1, t2, t2).unwrap();
        list.insert_after(t2, t3, t3).unwrap();

        list.set_removed(&t2, true).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.get_by_index(1), Some(t3));
        assert_eq!(list.iter().count(), 3);

        list.purge(&t2).unwrap();
        assert_eq!(list.iter().count(), 2);
        assert!(list.set_removed(&t2, true).is_err());
    }

    #[test]
    fn move_is_last_writer_wins() {
        let mut list = RgaTreeList::new();
        let (t1, t2, t3) = (ticket(1, 1), ticket(2, 1), ticket(3, 1));
        list.insert_after(TimeTicket::INITIAL, t1, t1).unwrap();
        list.insert_after(t1, t2, t2).unwrap();
        list.insert_after(t2, t3, t3).unwrap();

        assert!(list.move_after(TimeTicket::INITIAL, t3, ticket(5, 1)).unwrap());
        assert_eq!(order(&list), vec![3, 1, 2]);

        // An older move of the same element loses.
        assert!(!list.move_after(t1, t3, ticket(4, 2)).unwrap());
        assert_eq!(order(&list), vec![3, 1, 2]);
    }

    #[test]
    fn prev_for_index() {
        let mut list = RgaTreeList::new();
        let t1 = ticket(1, 1);
        list.insert_after(TimeTicket::INITIAL, t1, t1).unwrap();
        assert_eq!(list.prev_position_for_index(0).unwrap(), TimeTicket::INITIAL);
        assert_eq!(list.prev_position_for_index(1).unwrap(), t1);
        assert!(list.prev_position_for_index(2).is_err());

        // A moved element is addressed by its latest slot.
        let moved_at = ticket(2, 1);
        list.move_after(TimeTicket::INITIAL, t1, moved_at).unwrap();
        assert_eq!(list.prev_position_for_index(1).unwrap(), moved_at);
        assert_eq!(list.position_of(&t1), Some(moved_at));
    }

    #[derive(Clone, Copy, Debug)]
    enum Step {
        Insert(TimeTicket, TimeTicket),
        Move(TimeTicket, TimeTicket, TimeTicket),
    }

    fn apply(list: &mut RgaTreeList, step: Step) {
        match step {
            Step::Insert(prev, created_at) => list.insert_after(prev, created_at, created_at).unwrap(),
            Step::Move(prev, created_at, executed_at) => {
                list.move_after(prev, created_at, executed_at).unwrap();
            }
        }
    }

    fn permutations(items: &[Step]) -> Vec<Vec<Step>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut all = Vec::new();
        for i in 0..items.len() {
            let mut rest = items.to_vec();
            let first = rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, first);
                all.push(tail);
            }
        }
        return all;
    }

    #[test]
    fn concurrent_moves_converge_in_any_order() {
        let (t1, t2, t3) = (ticket(1, 1), ticket(2, 1), ticket(3, 1));
        let x = ticket(5, 2);
        let concurrent = [
            Step::Move(t3, t1, ticket(5, 1)),
            Step::Insert(t1, x),
            Step::Move(TimeTicket::INITIAL, t3, ticket(5, 3)),
            Step::Move(t2, t1, ticket(6, 4)),
        ];

        let mut orders = Vec::new();
        for steps in permutations(&concurrent) {
            let mut list = RgaTreeList::new();
            list.insert_after(TimeTicket::INITIAL, t1, t1).unwrap();
            list.insert_after(t1, t2, t2).unwrap();
            list.insert_after(t2, t3, t3).unwrap();
            for step in steps {
                apply(&mut list, step);
            }
            assert_eq!(list.len(), 4);
            orders.push(order(&list));
        }
        assert_eq!(orders.len(), 24);
        for found in &orders {
            assert_eq!(found, &vec![3, 5, 2, 1]);
        }
    }

    #[test]
    fn purge_drops_every_slot() {
        let mut list = RgaTreeList::new();
        let (t1, t2) = (ticket(1, 1), ticket(2, 1));
        list.insert_after(TimeTicket::INITIAL, t1, t1).unwrap();
        list.insert_after(t1, t2, t2).unwrap();
        list.move_after(t2, t1, ticket(3, 1)).unwrap();
        list.move_after(TimeTicket::INITIAL, t1, ticket(4, 1)).unwrap();
        assert_eq!(order(&list), vec![1, 2]);

        list.set_removed(&t1, true).unwrap();
        list.purge(&t1).unwrap();
        assert_eq!(list.tree.node_count(), 2);
        assert!(!list.contains_position(&ticket(3, 1)));
        assert_eq!(order(&list), vec![2]);
    }
}
