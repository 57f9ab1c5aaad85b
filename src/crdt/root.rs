//! The document root: an arena owning every element.
//!
//! Elements are stored by creation ticket. Containers refer to their
//! children by ticket and every slot remembers its parent, so paths can be
//! rebuilt and whole subtrees dropped without reference cycles.
//!
//! The root keeps three pieces of bookkeeping up to date as operations run:
//!
//! 1. `removed_elements`: tombstoned elements, each standing for its whole
//!    subtree until collected.
//! 2. `having_removed_nodes`: texts and trees holding tombstoned runs,
//!    nodes or attributes.
//! 3. `size`: live and garbage bytes. Each slot caches its own
//!    contribution, and every mutation refreshes the slots it touched, so
//!    the totals never need a full traversal.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as JsonValue;

use super::array::CrdtArray;
use super::element::Element;
use super::element::ElementKind;
use super::object::CrdtObject;
use super::primitives::GcBoundary;
use super::primitives::TimeTicket;
use super::size::DataSize;
use super::size::DocSize;
use super::text::CrdtText;
use super::tree::CrdtTree;
use crate::Error;
use crate::Result;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Slot {
    element: Element,
    parent: Option<TimeTicket>,
    /// This element's own share of the document size, children excluded.
    size: DocSize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CrdtRoot {
    elements: FxHashMap<TimeTicket, Slot>,
    removed_elements: BTreeSet<TimeTicket>,
    having_removed_nodes: BTreeSet<TimeTicket>,
    size: DocSize,
}

impl Default for CrdtRoot {
    fn default() -> Self {
        return CrdtRoot::new();
    }
}

/// Size an element adds by itself. Garbage elements count fully as gc.
fn own_size(element: &Element, garbage: bool, from_scratch: bool) -> DocSize {
    let mut flat = element.header_size();
    let mut nested = DocSize::default();
    match &element.kind {
        ElementKind::Primitive(value) => flat += DataSize::new(value.data_size(), 0),
        ElementKind::Counter(value) => flat += DataSize::new(value.data_size(), 0),
        ElementKind::Object(_) | ElementKind::Array(_) => {}
        ElementKind::Text(text) => {
            nested = if from_scratch { text.compute_size() } else { text.doc_size() };
        }
        ElementKind::Tree(tree) => {
            nested = if from_scratch { tree.compute_size() } else { tree.doc_size() };
        }
    }

    let mut size = DocSize::default();
    if garbage {
        size.gc += flat;
        size.gc += nested.combined();
    } else {
        size.live += flat;
        size += nested;
    }
    return size;
}

impl CrdtRoot {
    /// An empty document: one object created at `TimeTicket::INITIAL`.
    pub fn new() -> CrdtRoot {
        let mut root = CrdtRoot {
            elements: FxHashMap::default(),
            removed_elements: BTreeSet::new(),
            having_removed_nodes: BTreeSet::new(),
            size: DocSize::default(),
        };
        root.register(
            Element::new(TimeTicket::INITIAL, ElementKind::Object(CrdtObject::new())),
            None,
        );
        return root;
    }

    /// Ticket of the top-level object.
    pub fn root_created_at(&self) -> TimeTicket {
        return TimeTicket::INITIAL;
    }

    /// Number of elements held, tombstones included.
    pub fn element_count(&self) -> usize {
        return self.elements.len();
    }

    pub fn find(&self, created_at: &TimeTicket) -> Option<&Element> {
        return self.elements.get(created_at).map(|slot| &slot.element);
    }

    pub fn get(&self, created_at: &TimeTicket) -> Result<&Element> {
        return self.find(created_at).ok_or(Error::ElementNotFound(*created_at));
    }

    /// Mutable access. Callers refresh the size of what they change.
    pub(crate) fn get_mut(&mut self, created_at: &TimeTicket) -> Result<&mut Element> {
        return self
            .elements
            .get_mut(created_at)
            .map(|slot| &mut slot.element)
            .ok_or(Error::ElementNotFound(*created_at));
    }

    pub fn parent_of(&self, created_at: &TimeTicket) -> Option<TimeTicket> {
        return self.elements.get(created_at)?.parent;
    }

    pub fn object(&self, created_at: &TimeTicket) -> Result<&CrdtObject> {
        let element = self.get(created_at)?;
        return match &element.kind {
            ElementKind::Object(object) => Ok(object),
            other => Err(mismatch("object", other)),
        };
    }

    pub fn array(&self, created_at: &TimeTicket) -> Result<&CrdtArray> {
        let element = self.get(created_at)?;
        return match &element.kind {
            ElementKind::Array(array) => Ok(array),
            other => Err(mismatch("array", other)),
        };
    }

    pub fn text(&self, created_at: &TimeTicket) -> Result<&CrdtText> {
        let element = self.get(created_at)?;
        return match &element.kind {
            ElementKind::Text(text) => Ok(text),
            other => Err(mismatch("text", other)),
        };
    }

    pub fn tree(&self, created_at: &TimeTicket) -> Result<&CrdtTree> {
        let element = self.get(created_at)?;
        return match &element.kind {
            ElementKind::Tree(tree) => Ok(tree),
            other => Err(mismatch("tree", other)),
        };
    }

    pub(crate) fn object_mut(&mut self, created_at: &TimeTicket) -> Result<&mut CrdtObject> {
        let element = self.get_mut(created_at)?;
        return match &mut element.kind {
            ElementKind::Object(object) => Ok(object),
            other => Err(mismatch("object", other)),
        };
    }

    pub(crate) fn array_mut(&mut self, created_at: &TimeTicket) -> Result<&mut CrdtArray> {
        let element = self.get_mut(created_at)?;
        return match &mut element.kind {
            ElementKind::Array(array) => Ok(array),
            other => Err(mismatch("array", other)),
        };
    }

    pub(crate) fn text_mut(&mut self, created_at: &TimeTicket) -> Result<&mut CrdtText> {
        let element = self.get_mut(created_at)?;
        return match &mut element.kind {
            ElementKind::Text(text) => Ok(text),
            other => Err(mismatch("text", other)),
        };
    }

    pub(crate) fn tree_mut(&mut self, created_at: &TimeTicket) -> Result<&mut CrdtTree> {
        let element = self.get_mut(created_at)?;
        return match &mut element.kind {
            ElementKind::Tree(tree) => Ok(tree),
            other => Err(mismatch("tree", other)),
        };
    }

    // ---- Container mutations ----

    /// Write `element` under `key`. The newest write owns the key; the
    /// other side of the conflict is tombstoned.
    pub(crate) fn object_set(
        &mut self,
        parent: TimeTicket,
        key: &str,
        element: Element,
        executed_at: TimeTicket,
    ) -> Result<()> {
        let owner = self.object(&parent)?.owner(key);
        let created_at = element.created_at();
        let winner_positioned_at = match owner {
            Some(owner) => Some(self.get(&owner)?.positioned_at()),
            None => None,
        };
        let wins = match winner_positioned_at {
            Some(positioned_at) => executed_at.after(&positioned_at),
            None => true,
        };

        self.register(element, Some(parent));
        self.object_mut(&parent)?.add_member(key, created_at, wins);

        match (owner, winner_positioned_at) {
            (Some(owner), _) if wins => self.tombstone(owner, executed_at)?,
            (Some(_), Some(positioned_at)) => self.tombstone(created_at, positioned_at)?,
            _ => {}
        }
        return Ok(());
    }

    pub(crate) fn array_insert_after(
        &mut self,
        parent: TimeTicket,
        prev_positioned_at: TimeTicket,
        element: Element,
        executed_at: TimeTicket,
    ) -> Result<()> {
        let created_at = element.created_at();
        // Check the anchor before the element enters the arena.
        if !self.array(&parent)?.contains_position(&prev_positioned_at) {
            return Err(Error::ElementNotFound(prev_positioned_at));
        }
        self.register(element, Some(parent));
        self.array_mut(&parent)?
            .insert_after(prev_positioned_at, created_at, executed_at)?;
        return Ok(());
    }

    /// Returns true when the element moved.
    pub(crate) fn array_move_after(
        &mut self,
        parent: TimeTicket,
        prev_positioned_at: TimeTicket,
        created_at: TimeTicket,
        executed_at: TimeTicket,
    ) -> Result<bool> {
        let moved = self
            .array_mut(&parent)?
            .move_after(prev_positioned_at, created_at, executed_at)?;
        if moved {
            self.get_mut(&created_at)?.set_moved_at(executed_at);
            self.refresh_size(&created_at);
        }
        return Ok(moved);
    }

    /// Put `element` where `target` was when the edit was made: the
    /// replacement is linked right after `target_positioned_at`, and the
    /// target is tombstoned.
    pub(crate) fn array_set(
        &mut self,
        parent: TimeTicket,
        target: TimeTicket,
        target_positioned_at: TimeTicket,
        element: Element,
        executed_at: TimeTicket,
    ) -> Result<()> {
        if !self.array(&parent)?.contains(&target) {
            return Err(Error::ElementNotFound(target));
        }
        self.array_insert_after(parent, target_positioned_at, element, executed_at)?;
        self.remove_element(parent, target, executed_at)?;
        return Ok(());
    }

    /// Tombstone a child of `parent`. Returns true when the tombstone
    /// changed; repeating a removal is a no-op.
    pub(crate) fn remove_element(
        &mut self,
        parent: TimeTicket,
        created_at: TimeTicket,
        executed_at: TimeTicket,
    ) -> Result<bool> {
        let is_child = match &self.get(&parent)?.kind {
            ElementKind::Object(object) => object.contains(&created_at),
            ElementKind::Array(array) => array.contains(&created_at),
            other => return Err(mismatch("object or array", other)),
        };
        if !is_child {
            return Err(Error::ElementNotFound(created_at));
        }

        let was_removed = self.get(&created_at)?.is_removed();
        let changed = self.get_mut(&created_at)?.remove(executed_at);
        if changed && !was_removed {
            if let Ok(array) = self.array_mut(&parent) {
                array.set_removed(&created_at)?;
            }
        }
        if changed {
            self.register_removed(created_at);
        }
        return Ok(changed);
    }

    fn tombstone(&mut self, created_at: TimeTicket, removed_at: TimeTicket) -> Result<()> {
        if self.get_mut(&created_at)?.remove(removed_at) {
            self.register_removed(created_at);
        }
        return Ok(());
    }

    // ---- Bookkeeping ----

    /// Add an element to the arena under `parent`.
    pub(crate) fn register(&mut self, element: Element, parent: Option<TimeTicket>) {
        let created_at = element.created_at();
        let garbage = element.is_removed() || parent.is_some_and(|p| self.is_garbage(&p));
        let size = own_size(&element, garbage, false);
        self.size += size;
        if let ElementKind::Text(text) = &element.kind {
            if text.removed_count() > 0 {
                self.having_removed_nodes.insert(created_at);
            }
        }
        if let ElementKind::Tree(tree) = &element.kind {
            if tree.garbage_count() > 0 {
                self.having_removed_nodes.insert(created_at);
            }
        }
        self.elements.insert(
            created_at,
            Slot {
                element,
                parent,
                size,
            },
        );
    }

    /// Track a tombstoned element and move its subtree to garbage.
    pub(crate) fn register_removed(&mut self, created_at: TimeTicket) {
        self.removed_elements.insert(created_at);
        for ticket in self.descendants(&created_at) {
            self.refresh_size(&ticket);
        }
    }

    /// Track a text or tree that now holds tombstones.
    pub(crate) fn register_having_removed_nodes(&mut self, created_at: TimeTicket) {
        self.having_removed_nodes.insert(created_at);
    }

    /// Recompute the size an element contributes after it changed.
    pub(crate) fn refresh_size(&mut self, created_at: &TimeTicket) {
        let garbage = self.is_garbage(created_at);
        let Some(slot) = self.elements.get_mut(created_at) else {
            return;
        };
        let size = own_size(&slot.element, garbage, false);
        self.size -= slot.size;
        self.size += size;
        slot.size = size;
    }

    /// True when the element or one of its ancestors is tombstoned.
    pub fn is_garbage(&self, created_at: &TimeTicket) -> bool {
        let mut current = Some(*created_at);
        while let Some(ticket) = current {
            let Some(slot) = self.elements.get(&ticket) else {
                return false;
            };
            if slot.element.is_removed() {
                return true;
            }
            current = slot.parent;
        }
        return false;
    }

    /// Direct children of a container, tombstones included.
    pub fn children(&self, created_at: &TimeTicket) -> Vec<TimeTicket> {
        return match self.find(created_at).map(|element| &element.kind) {
            Some(ElementKind::Object(object)) => object.members(),
            Some(ElementKind::Array(array)) => array.members(),
            _ => Vec::new(),
        };
    }

    /// The element and everything below it, parents first.
    pub fn descendants(&self, created_at: &TimeTicket) -> Vec<TimeTicket> {
        let mut out = Vec::new();
        let mut stack = vec![*created_at];
        while let Some(ticket) = stack.pop() {
            if !self.elements.contains_key(&ticket) {
                continue;
            }
            out.push(ticket);
            stack.extend(self.children(&ticket));
        }
        return out;
    }

    pub fn doc_size(&self) -> DocSize {
        return self.size;
    }

    /// Size from a full traversal, ignoring every cached figure.
    pub fn compute_doc_size(&self) -> DocSize {
        let mut size = DocSize::default();
        let mut stack = vec![(self.root_created_at(), false)];
        while let Some((ticket, parent_garbage)) = stack.pop() {
            let Some(slot) = self.elements.get(&ticket) else {
                continue;
            };
            let garbage = parent_garbage || slot.element.is_removed();
            size += own_size(&slot.element, garbage, true);
            for child in self.children(&ticket) {
                stack.push((child, garbage));
            }
        }
        return size;
    }

    pub fn deep_copy(&self) -> CrdtRoot {
        return self.clone();
    }

    // ---- Garbage collection ----

    /// Elements waiting for collection: tombstoned subtrees, plus the
    /// tombstoned nodes of live texts and trees.
    pub fn garbage_length(&self) -> usize {
        let mut seen = FxHashSet::default();
        for ticket in &self.removed_elements {
            seen.extend(self.descendants(ticket));
        }
        let mut count = seen.len();
        for ticket in &self.having_removed_nodes {
            if seen.contains(ticket) || self.is_garbage(ticket) {
                continue;
            }
            count += match self.find(ticket).map(|element| &element.kind) {
                Some(ElementKind::Text(text)) => text.removed_count(),
                Some(ElementKind::Tree(tree)) => tree.garbage_count(),
                _ => 0,
            };
        }
        return count;
    }

    /// Physically drop every tombstone the boundary dominates. Returns how
    /// many elements, runs, nodes and attributes were dropped.
    pub fn garbage_collect(&mut self, boundary: &dyn GcBoundary) -> usize {
        let mut count = 0;

        let candidates: Vec<TimeTicket> = self.removed_elements.iter().copied().collect();
        for ticket in candidates {
            let dominated = match self.find(&ticket).and_then(Element::removed_at) {
                Some(removed_at) => boundary.dominates(&removed_at),
                None => false,
            };
            if dominated {
                count += self.purge_subtree(ticket);
            }
        }

        let candidates: Vec<TimeTicket> = self.having_removed_nodes.iter().copied().collect();
        for ticket in candidates {
            if self.is_garbage(&ticket) {
                continue;
            }
            let (purged, remaining) = match self.get_mut(&ticket).map(|element| &mut element.kind) {
                Ok(ElementKind::Text(text)) => {
                    let purged = text.purge(boundary);
                    (purged, text.removed_count())
                }
                Ok(ElementKind::Tree(tree)) => {
                    let purged = tree.purge(boundary);
                    (purged, tree.garbage_count())
                }
                _ => (0, 0),
            };
            count += purged;
            self.refresh_size(&ticket);
            if remaining == 0 {
                self.having_removed_nodes.remove(&ticket);
            }
        }
        return count;
    }

    /// Detach an element from its parent and drop its subtree.
    fn purge_subtree(&mut self, created_at: TimeTicket) -> usize {
        let subtree = self.descendants(&created_at);
        if let Some(parent) = self.parent_of(&created_at) {
            match self.get_mut(&parent).map(|element| &mut element.kind) {
                Ok(ElementKind::Object(object)) => object.purge(&created_at),
                Ok(ElementKind::Array(array)) => {
                    if let Err(err) = array.purge(&created_at) {
                        debug_assert!(false, "array lost track of a member: {err}");
                    }
                }
                _ => {}
            }
        }
        for ticket in &subtree {
            if let Some(slot) = self.elements.remove(ticket) {
                self.size -= slot.size;
            }
            self.removed_elements.remove(ticket);
            self.having_removed_nodes.remove(ticket);
        }
        return subtree.len();
    }

    // ---- Paths and projections ----

    /// JSON path of an element, such as `$.todos.0.title`.
    pub fn create_path(&self, created_at: &TimeTicket) -> Result<String> {
        let mut segments = Vec::new();
        let mut current = *created_at;
        while let Some(parent) = self.parent_of(&current) {
            let segment = match &self.get(&parent)?.kind {
                ElementKind::Object(object) => object
                    .key_of(&current)
                    .ok_or(Error::ElementNotFound(current))?
                    .to_string(),
                ElementKind::Array(array) => array
                    .index_of(&current)
                    .ok_or(Error::ElementNotFound(current))?
                    .to_string(),
                other => return Err(mismatch("object or array", other)),
            };
            segments.push(segment);
            current = parent;
        }
        if !self.elements.contains_key(created_at) {
            return Err(Error::ElementNotFound(*created_at));
        }

        let mut path = String::from("$");
        for segment in segments.iter().rev() {
            path.push('.');
            path.push_str(segment);
        }
        return Ok(path);
    }

    /// The live element at a path like `$.a.0.b`.
    pub fn find_by_path(&self, path: &str) -> Result<TimeTicket> {
        let rest = path
            .strip_prefix('$')
            .ok_or_else(|| Error::InvalidPath(path.to_string()))?;
        let mut current = self.root_created_at();
        if rest.is_empty() {
            return Ok(current);
        }
        let rest = rest
            .strip_prefix('.')
            .ok_or_else(|| Error::InvalidPath(path.to_string()))?;

        for segment in rest.split('.') {
            let not_found = || Error::InvalidPath(path.to_string());
            let next = match &self.get(&current)?.kind {
                ElementKind::Object(object) => object.owner(segment).ok_or_else(not_found)?,
                ElementKind::Array(array) => {
                    let index: usize = segment.parse().map_err(|_| not_found())?;
                    *array.live().get(index).ok_or_else(not_found)?
                }
                _ => return Err(not_found()),
            };
            if self.get(&next)?.is_removed() {
                return Err(not_found());
            }
            current = next;
        }
        return Ok(current);
    }

    pub fn to_json_value(&self) -> JsonValue {
        return self.element_json(&self.root_created_at());
    }

    /// JSON text of the whole document, object keys sorted.
    pub fn to_json(&self) -> String {
        return self.to_json_value().to_string();
    }

    /// JSON projection of one element. Tombstones are left out.
    pub fn element_json(&self, created_at: &TimeTicket) -> JsonValue {
        let Some(element) = self.find(created_at) else {
            return JsonValue::Null;
        };
        return match &element.kind {
            ElementKind::Primitive(value) => value.to_json_value(),
            ElementKind::Counter(value) => value.to_json_value(),
            ElementKind::Object(object) => {
                let mut map = serde_json::Map::new();
                for (key, owner) in object.owners() {
                    if self.find(&owner).is_some_and(|child| !child.is_removed()) {
                        map.insert(key.to_string(), self.element_json(&owner));
                    }
                }
                JsonValue::Object(map)
            }
            ElementKind::Array(array) => {
                JsonValue::Array(array.live().iter().map(|child| self.element_json(child)).collect())
            }
            ElementKind::Text(text) => text.to_json_value(),
            ElementKind::Tree(tree) => tree.to_json_value(),
        };
    }
}

fn mismatch(expected: &'static str, actual: &ElementKind) -> Error {
    return Error::TypeMismatch {
        expected,
        actual: actual.type_name(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::primitive::Primitive;
    use crate::crdt::primitives::ActorId;
    use crate::crdt::primitives::VersionVector;

    fn actor(who: u8) -> ActorId {
        let mut bytes = [0u8; 12];
        bytes[11] = who;
        return ActorId::new(bytes);
    }

    fn ticket(lamport: u64, who: u8) -> TimeTicket {
        return TimeTicket::new(lamport, 0, actor(who));
    }

    fn int(at: TimeTicket, value: i32) -> Element {
        return Element::new(at, ElementKind::Primitive(Primitive::Int(value)));
    }

    fn array(at: TimeTicket) -> Element {
        return Element::new(at, ElementKind::Array(CrdtArray::new()));
    }

    /// `{"1":1,"2":[1,2,3],"3":3}` written by actor 1.
    fn sample() -> (CrdtRoot, TimeTicket) {
        let mut root = CrdtRoot::new();
        let top = root.root_created_at();
        root.object_set(top, "1", int(ticket(1, 1), 1), ticket(1, 1)).unwrap();
        let list = ticket(2, 1);
        root.object_set(top, "2", array(list), list).unwrap();
        let mut prev = TimeTicket::INITIAL;
        for (i, value) in [1, 2, 3].into_iter().enumerate() {
            let at = ticket(3 + i as u64, 1);
            root.array_insert_after(list, prev, int(at, value), at).unwrap();
            prev = at;
        }
        root.object_set(top, "3", int(ticket(6, 1), 3), ticket(6, 1)).unwrap();
        return (root, list);
    }

    #[test]
    fn removing_a_subtree_then_collecting_it() {
        let (mut root, list) = sample();
        assert_eq!(root.to_json(), r#"{"1":1,"2":[1,2,3],"3":3}"#);

        root.remove_element(root.root_created_at(), list, ticket(7, 1)).unwrap();
        assert_eq!(root.to_json(), r#"{"1":1,"3":3}"#);
        assert_eq!(root.garbage_length(), 4);
        assert_eq!(root.doc_size(), root.compute_doc_size());

        // Nobody has seen the removal yet.
        let behind = VersionVector::from_entries([(actor(1), 6)]);
        assert_eq!(root.garbage_collect(&behind), 0);

        let live_before = root.doc_size().live;
        let caught_up = VersionVector::from_entries([(actor(1), 7)]);
        assert_eq!(root.garbage_collect(&caught_up), 4);
        assert_eq!(root.garbage_length(), 0);
        assert_eq!(root.doc_size().live, live_before);
        assert!(root.doc_size().gc.is_zero());
        assert_eq!(root.doc_size(), root.compute_doc_size());
        assert_eq!(root.element_count(), 3);
    }

    #[test]
    fn repeated_removal_is_a_no_op() {
        let (mut root, list) = sample();
        let first = root.array(&list).unwrap().live()[0];
        assert!(root.remove_element(list, first, ticket(7, 1)).unwrap());
        assert!(!root.remove_element(list, first, ticket(7, 1)).unwrap());
        assert_eq!(root.garbage_length(), 1);
        assert_eq!(root.to_json(), r#"{"1":1,"2":[2,3],"3":3}"#);

        let missing = ticket(99, 1);
        assert!(root.remove_element(list, missing, ticket(8, 1)).unwrap_err().is_not_found());
    }

    #[test]
    fn concurrent_sets_converge() {
        let top = TimeTicket::INITIAL;
        let (a, b) = (ticket(1, 1), ticket(1, 2));

        let mut left = CrdtRoot::new();
        left.object_set(top, "k", int(a, 1), a).unwrap();
        left.object_set(top, "k", int(b, 2), b).unwrap();

        let mut right = CrdtRoot::new();
        right.object_set(top, "k", int(b, 2), b).unwrap();
        right.object_set(top, "k", int(a, 1), a).unwrap();

        assert_eq!(left.to_json(), r#"{"k":2}"#);
        assert_eq!(left.to_json(), right.to_json());
        assert_eq!(left.garbage_length(), 1);
        assert_eq!(right.garbage_length(), 1);
        assert_eq!(left.doc_size(), right.doc_size());
    }

    #[test]
    fn paths() {
        let (root, list) = sample();
        let second = root.array(&list).unwrap().live()[1];
        assert_eq!(root.create_path(&second).unwrap(), "$.2.1");
        assert_eq!(root.create_path(&root.root_created_at()).unwrap(), "$");
        assert_eq!(root.find_by_path("$.2.1").unwrap(), second);
        assert!(root.find_by_path("$.2.9").is_err());
        assert!(root.find_by_path("2").is_err());
    }

    #[test]
    fn sizes_follow_the_arena() {
        let (root, _) = sample();
        // Root object, "1", array, three items, "3": seven tickets, five ints.
        assert_eq!(root.doc_size().live, DataSize::new(20, 7 * 24));
        assert_eq!(root.doc_size(), root.compute_doc_size());

        let copy = root.deep_copy();
        assert_eq!(copy.to_json(), root.to_json());
        let json = serde_json::to_string(&root).unwrap();
        let restored: CrdtRoot = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.to_json(), root.to_json());
        assert_eq!(restored.doc_size(), root.doc_size());
    }
}
