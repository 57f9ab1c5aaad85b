//! Split-run sequence for collaborative text.
//!
//! Text is a chain of runs. A run is the content of one insertion, or a
//! piece of it: runs are split (never merged) when an edit lands inside
//! them, and every piece keeps the insertion ticket plus its offset into
//! the original insertion as its `NodeId`. Positions are `(NodeId,
//! relative offset)` pairs, so they stay valid no matter how the runs are
//! split later.
//!
//! Runs live in a splay tree weighted by live character count for offset
//! lookups, and in a `BTreeMap` by id for floor lookups of positions.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

use super::DeleteGuard;
use super::MaxCreatedAtMap;
use super::primitives::GcBoundary;
use super::primitives::TimeTicket;
use super::rht::Rht;
use super::size::DataSize;
use super::size::DocSize;
use super::size::string_size;
use super::splay_tree::NodeIdx;
use super::splay_tree::SplayTree;
use crate::Error;
use crate::Result;

/// Identity of a run or tree node: insertion ticket plus offset into it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub created_at: TimeTicket,
    pub offset: u32,
}

impl NodeId {
    pub const fn new(created_at: TimeTicket, offset: u32) -> NodeId {
        return NodeId { created_at, offset };
    }

    pub fn to_id_string(&self) -> String {
        return format!("{}/{}", self.created_at.to_id_string(), self.offset);
    }

    pub fn parse(text: &str) -> Result<NodeId> {
        let invalid = || Error::InvalidTicket(text.to_string());
        let (ticket, offset) = text.rsplit_once('/').ok_or_else(invalid)?;
        let offset = offset.parse().map_err(|_| invalid())?;
        return Ok(NodeId::new(TimeTicket::parse(ticket)?, offset));
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return write!(f, "{:?}/{}", self.created_at, self.offset);
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        return serializer.serialize_str(&self.to_id_string());
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<NodeId, D::Error> {
        let text = String::deserialize(deserializer)?;
        return NodeId::parse(&text).map_err(serde::de::Error::custom);
    }
}

/// A point in the text: `relative_offset` characters into run `id`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPos {
    pub id: NodeId,
    pub relative_offset: u32,
}

impl TextPos {
    fn absolute(&self) -> NodeId {
        return NodeId::new(self.id.created_at, self.id.offset + self.relative_offset);
    }
}

/// A user-visible effect of an edit or style, in character indices.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChange {
    pub from: usize,
    pub to: usize,
    pub content: String,
    pub attributes: BTreeMap<String, String>,
}

/// What an edit did.
#[derive(Clone, Debug)]
pub struct EditOutcome {
    pub changes: Vec<TextChange>,
    /// Position right after the inserted content.
    pub caret: TextPos,
    /// Runs this edit newly tombstoned.
    pub removed: usize,
    /// Newest creation ticket per actor among the runs in range.
    pub max_created_at: MaxCreatedAtMap,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct TextRun {
    id: NodeId,
    content: String,
    char_len: u32,
    attrs: Rht,
    removed_at: Option<TimeTicket>,
}

impl TextRun {
    fn is_removed(&self) -> bool {
        return self.removed_at.is_some();
    }

    fn weight(&self) -> usize {
        return if self.is_removed() { 0 } else { self.char_len as usize };
    }

    fn data_size(&self) -> DataSize {
        let attrs = self.attrs.doc_size().combined();
        let tickets = if self.is_removed() { 2 } else { 1 };
        return DataSize::new(
            string_size(&self.content) + attrs.data,
            DataSize::tickets(tickets).meta + attrs.meta,
        );
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RgaTreeSplit {
    tree: SplayTree<TextRun>,
    by_id: BTreeMap<NodeId, NodeIdx>,
    head: NodeIdx,
    size: DocSize,
    removed_count: usize,
}

impl Default for RgaTreeSplit {
    fn default() -> Self {
        return RgaTreeSplit::new();
    }
}

impl RgaTreeSplit {
    pub fn new() -> RgaTreeSplit {
        let head_id = NodeId::new(TimeTicket::INITIAL, 0);
        let mut tree = SplayTree::new();
        let head = tree.push_back(
            TextRun {
                id: head_id,
                content: String::new(),
                char_len: 0,
                attrs: Rht::new(),
                removed_at: None,
            },
            0,
        );
        let mut by_id = BTreeMap::new();
        by_id.insert(head_id, head);
        return RgaTreeSplit {
            tree,
            by_id,
            head,
            size: DocSize::default(),
            removed_count: 0,
        };
    }

    /// Live length in characters.
    pub fn len(&self) -> usize {
        return self.tree.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.len() == 0;
    }

    /// Running size of all runs. The head contributes nothing.
    pub fn doc_size(&self) -> DocSize {
        return self.size;
    }

    /// Number of tombstoned runs awaiting collection.
    pub fn removed_count(&self) -> usize {
        return self.removed_count;
    }

    /// Convert a live character index to a position.
    pub fn index_to_pos(&mut self, index: usize) -> Result<TextPos> {
        let len = self.len();
        let (idx, offset) = self
            .tree
            .find(index)
            .ok_or(Error::IndexOutOfRange { index, len })?;
        return Ok(TextPos {
            id: self.tree.get(idx).id,
            relative_offset: offset as u32,
        });
    }

    /// Convert a position back to a live character index.
    pub fn pos_to_index(&self, pos: &TextPos) -> Result<usize> {
        let absolute = pos.absolute();
        let idx = self.find_floor_prefer_left(&absolute)?;
        let run = self.tree.get(idx);
        let offset = (absolute.offset - run.id.offset) as usize;
        return Ok(self.tree.index_of(idx) + offset.min(run.weight()));
    }

    /// Delete the runs between `from` and `to` and insert `content` there.
    pub fn edit(
        &mut self,
        from: &TextPos,
        to: &TextPos,
        content: &str,
        attributes: &BTreeMap<String, String>,
        executed_at: TimeTicket,
        guard: DeleteGuard<'_>,
    ) -> Result<EditOutcome> {
        let (to_left, to_right) = self.find_node_with_split(to, executed_at)?;
        let (from_left, from_right) = self.find_node_with_split(from, executed_at)?;

        let candidates = self.between(from_right, to_right);
        let max_created_at = self.max_created_at(&candidates);
        let (mut changes, removed) = self.delete_runs(&candidates, executed_at, guard);

        let mut caret = match to_right {
            Some(right) => TextPos {
                id: self.tree.get(right).id,
                relative_offset: 0,
            },
            None => {
                let left = self.tree.get(to_left);
                TextPos {
                    id: left.id,
                    relative_offset: left.char_len,
                }
            }
        };

        if !content.is_empty() {
            let mut attrs = Rht::new();
            for (key, value) in attributes {
                attrs.set(key, value, executed_at);
            }
            let run = TextRun {
                id: NodeId::new(executed_at, 0),
                content: content.to_string(),
                char_len: content.chars().count() as u32,
                attrs,
                removed_at: None,
            };
            caret = TextPos {
                id: run.id,
                relative_offset: run.char_len,
            };
            let inserted = self.insert_after(from_left, run);
            let index = self.tree.index_of(inserted);

            match changes.last_mut() {
                Some(last) if last.from == index => {
                    last.content = content.to_string();
                    last.attributes = attributes.clone();
                }
                _ => changes.push(TextChange {
                    from: index,
                    to: index,
                    content: content.to_string(),
                    attributes: attributes.clone(),
                }),
            }
        }

        return Ok(EditOutcome {
            changes,
            caret,
            removed,
            max_created_at,
        });
    }

    /// Apply `attributes` to the live runs between `from` and `to`.
    pub fn style(
        &mut self,
        from: &TextPos,
        to: &TextPos,
        attributes: &BTreeMap<String, String>,
        executed_at: TimeTicket,
        guard: DeleteGuard<'_>,
    ) -> Result<(Vec<TextChange>, MaxCreatedAtMap)> {
        let (_, to_right) = self.find_node_with_split(to, executed_at)?;
        let (_, from_right) = self.find_node_with_split(from, executed_at)?;

        let candidates = self.between(from_right, to_right);
        let max_created_at = self.max_created_at(&candidates);
        let mut changes = Vec::new();
        for idx in candidates {
            let run = self.tree.get(idx);
            if run.is_removed() || !guard.knows(&run.id.created_at) {
                continue;
            }
            let before = run.data_size();
            let run = self.tree.get_mut(idx);
            for (key, value) in attributes {
                run.attrs.set(key, value, executed_at);
            }
            let after = run.data_size();
            let len = run.char_len as usize;
            self.size.sub(before, false);
            self.size.add(after, false);

            let from = self.tree.index_of(idx);
            changes.push(TextChange {
                from,
                to: from + len,
                content: String::new(),
                attributes: attributes.clone(),
            });
        }
        return Ok((changes, max_created_at));
    }

    /// Live runs in order, as `(content, attributes)`.
    pub fn runs(&self) -> impl Iterator<Item = (&str, &Rht)> {
        return self
            .tree
            .iter()
            .map(|(_, run)| run)
            .filter(|run| !run.is_removed() && run.char_len > 0)
            .map(|run| (run.content.as_str(), &run.attrs));
    }

    /// Drop tombstoned runs the boundary dominates.
    pub fn purge(&mut self, boundary: &dyn GcBoundary) -> usize {
        let doomed: Vec<NodeIdx> = self
            .tree
            .iter()
            .filter(|(_, run)| match run.removed_at {
                Some(removed_at) => boundary.dominates(&removed_at),
                None => false,
            })
            .map(|(idx, _)| idx)
            .collect();

        for idx in &doomed {
            let run = self.tree.remove(*idx);
            self.by_id.remove(&run.id);
            self.size.sub(run.data_size(), true);
            self.removed_count -= 1;
        }
        return doomed.len();
    }

    /// Size recomputed run by run, for cross-checking the running total.
    pub fn compute_size(&self) -> DocSize {
        let mut size = DocSize::default();
        for (idx, run) in self.tree.iter() {
            if idx != self.head {
                size.add(run.data_size(), run.is_removed());
            }
        }
        return size;
    }

    fn insert_after(&mut self, prev: NodeIdx, run: TextRun) -> NodeIdx {
        let id = run.id;
        self.size.add(run.data_size(), run.is_removed());
        let weight = run.weight();
        let idx = self.tree.insert_after(prev, run, weight);
        self.by_id.insert(id, idx);
        return idx;
    }

    /// Split at `pos` and step over runs inserted concurrently after
    /// `executed_at`, returning the runs on either side of the boundary.
    fn find_node_with_split(
        &mut self,
        pos: &TextPos,
        executed_at: TimeTicket,
    ) -> Result<(NodeIdx, Option<NodeIdx>)> {
        let absolute = pos.absolute();
        let mut node = self.find_floor_prefer_left(&absolute)?;
        let offset = absolute.offset - self.tree.get(node).id.offset;
        self.split(node, offset)?;

        while let Some(next) = self.tree.next(node) {
            if !self.tree.get(next).id.created_at.after(&executed_at) {
                break;
            }
            node = next;
        }
        return Ok((node, self.tree.next(node)));
    }

    /// The run containing `id`. When `id` falls exactly on a split
    /// boundary, the run ending there wins over the run starting there.
    fn find_floor_prefer_left(&self, id: &NodeId) -> Result<NodeIdx> {
        let not_found = || Error::NodeNotFound(id.to_id_string());
        let (floor_id, floor) = self.by_id.range(..=*id).next_back().ok_or_else(not_found)?;
        if floor_id.created_at != id.created_at {
            return Err(not_found());
        }
        if id.offset > 0 && floor_id.offset == id.offset {
            if let Some((prev_id, prev)) = self.by_id.range(..*floor_id).next_back() {
                if prev_id.created_at == id.created_at {
                    return Ok(*prev);
                }
            }
        }
        return Ok(*floor);
    }

    fn split(&mut self, idx: NodeIdx, offset: u32) -> Result<Option<NodeIdx>> {
        let run = self.tree.get(idx);
        if offset > run.char_len {
            return Err(Error::NodeNotFound(
                NodeId::new(run.id.created_at, run.id.offset + offset).to_id_string(),
            ));
        }
        if offset == 0 || offset == run.char_len {
            return Ok(None);
        }

        let removed = run.is_removed();
        let before = run.data_size();
        let run = self.tree.get_mut(idx);
        let byte = run
            .content
            .char_indices()
            .nth(offset as usize)
            .map(|(byte, _)| byte)
            .unwrap_or(run.content.len());
        let tail = TextRun {
            id: NodeId::new(run.id.created_at, run.id.offset + offset),
            content: run.content.split_off(byte),
            char_len: run.char_len - offset,
            attrs: run.attrs.clone(),
            removed_at: run.removed_at,
        };
        run.char_len = offset;
        let after = run.data_size();
        let weight = run.weight();

        self.size.sub(before, removed);
        self.size.add(after, removed);
        self.tree.set_length(idx, weight);
        if removed {
            self.removed_count += 1;
        }
        return Ok(Some(self.insert_after(idx, tail)));
    }

    fn between(&self, from: Option<NodeIdx>, to: Option<NodeIdx>) -> Vec<NodeIdx> {
        let mut nodes = Vec::new();
        let mut current = from;
        while let Some(idx) = current {
            if Some(idx) == to {
                break;
            }
            nodes.push(idx);
            current = self.tree.next(idx);
        }
        return nodes;
    }

    fn max_created_at(&self, nodes: &[NodeIdx]) -> MaxCreatedAtMap {
        let mut map = MaxCreatedAtMap::new();
        for idx in nodes {
            super::record_created_at(&mut map, self.tree.get(*idx).id.created_at);
        }
        return map;
    }

    /// Tombstone the runs the guard allows. Returns the deleted ranges and
    /// how many runs were newly removed.
    fn delete_runs(
        &mut self,
        nodes: &[NodeIdx],
        executed_at: TimeTicket,
        guard: DeleteGuard<'_>,
    ) -> (Vec<TextChange>, usize) {
        let mut ranges: Vec<(usize, usize)> = Vec::new();
        let mut doomed = Vec::new();
        for idx in nodes {
            let run = self.tree.get(*idx);
            let removable = match run.removed_at {
                Some(removed_at) => executed_at.after(&removed_at),
                None => true,
            };
            if !removable || !guard.knows(&run.id.created_at) {
                continue;
            }
            if !run.is_removed() {
                let from = self.tree.index_of(*idx);
                let to = from + run.weight();
                match ranges.last_mut() {
                    Some(last) if last.1 == from => last.1 = to,
                    _ => ranges.push((from, to)),
                }
            }
            doomed.push(*idx);
        }

        let mut removed = 0;
        for idx in doomed {
            let run = self.tree.get_mut(idx);
            if run.is_removed() {
                run.removed_at = Some(executed_at);
                continue;
            }
            let before = run.data_size();
            run.removed_at = Some(executed_at);
            let after = run.data_size();
            self.size.sub(before, false);
            self.size.add(after, true);
            self.tree.set_length(idx, 0);
            self.removed_count += 1;
            removed += 1;
        }

        // Report ranges as if applied one after another.
        let mut shift = 0;
        let changes = ranges
            .into_iter()
            .map(|(from, to)| {
                let change = TextChange {
                    from: from - shift,
                    to: to - shift,
                    ..TextChange::default()
                };
                shift += to - from;
                change
            })
            .collect();
        return (changes, removed);
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

    fn text(rga: &RgaTreeSplit) -> String {
        return rga.runs().map(|(content, _)| content).collect();
    }

    fn edit(rga: &mut RgaTreeSplit, from: usize, to: usize, content: &str, at: TimeTicket) -> EditOutcome {
        let from = rga.index_to_pos(from).unwrap();
        let to = rga.index_to_pos(to).unwrap();
        return rga
            .edit(&from, &to, content, &BTreeMap::new(), at, DeleteGuard::Local)
            .unwrap();
    }

    #[test]
    fn insert_and_delete() {
        let mut rga = RgaTreeSplit::new();
        edit(&mut rga, 0, 0, "Hello World", ticket(1, 1));
        assert_eq!(text(&rga), "Hello World");

        let outcome = edit(&mut rga, 6, 11, "Yorkie", ticket(2, 1));
        assert_eq!(text(&rga), "Hello Yorkie");
        assert_eq!(outcome.removed, 1);
        assert_eq!(
            outcome.changes,
            vec![TextChange {
                from: 6,
                to: 11,
                content: "Yorkie".to_string(),
                attributes: BTreeMap::new(),
            }]
        );
        assert_eq!(rga.removed_count(), 1);
    }

    #[test]
    fn positions_survive_splits() {
        let mut rga = RgaTreeSplit::new();
        edit(&mut rga, 0, 0, "abcdef", ticket(1, 1));
        let pos = rga.index_to_pos(4).unwrap();

        edit(&mut rga, 2, 2, "XY", ticket(2, 1));
        assert_eq!(text(&rga), "abXYcdef");
        assert_eq!(rga.pos_to_index(&pos).unwrap(), 6);
    }

    #[test]
    fn unseen_insert_survives_concurrent_delete() {
        let base = ticket(1, 1);
        let mut a = RgaTreeSplit::new();
        edit(&mut a, 0, 0, "hello", base);

        // The deleting replica saw only "hello".
        let from = a.index_to_pos(0).unwrap();
        let to = a.index_to_pos(5).unwrap();
        let mut seen = MaxCreatedAtMap::new();
        seen.insert(actor(1), base);

        // Meanwhile actor 1 inserts "X" at 2.
        edit(&mut a, 2, 2, "X", ticket(2, 1));

        a.edit(&from, &to, "", &BTreeMap::new(), ticket(2, 2), DeleteGuard::ByMap(&seen))
            .unwrap();
        assert_eq!(text(&a), "X");
    }

    #[test]
    fn concurrent_inserts_at_same_point_converge() {
        let base = ticket(1, 1);
        let mut a = RgaTreeSplit::new();
        edit(&mut a, 0, 0, "ab", base);
        let mut b = a.clone();

        let pos = a.index_to_pos(1).unwrap();
        let empty = BTreeMap::new();
        a.edit(&pos, &pos, "X", &empty, ticket(2, 1), DeleteGuard::Local).unwrap();
        a.edit(&pos, &pos, "Y", &empty, ticket(2, 2), DeleteGuard::Local).unwrap();
        b.edit(&pos, &pos, "Y", &empty, ticket(2, 2), DeleteGuard::Local).unwrap();
        b.edit(&pos, &pos, "X", &empty, ticket(2, 1), DeleteGuard::Local).unwrap();

        assert_eq!(text(&a), text(&b));
        assert_eq!(text(&a), "aYXb");
    }

    #[test]
    fn style_sets_attributes_on_range() {
        let mut rga = RgaTreeSplit::new();
        edit(&mut rga, 0, 0, "Hello", ticket(1, 1));
        let from = rga.index_to_pos(1).unwrap();
        let to = rga.index_to_pos(3).unwrap();
        let mut attrs = BTreeMap::new();
        attrs.insert("b".to_string(), "1".to_string());

        let (changes, _) = rga.style(&from, &to, &attrs, ticket(2, 1), DeleteGuard::Local).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!((changes[0].from, changes[0].to), (1, 3));

        let styled: Vec<(String, bool)> = rga
            .runs()
            .map(|(content, attrs)| (content.to_string(), attrs.has("b")))
            .collect();
        assert_eq!(
            styled,
            vec![
                ("H".to_string(), false),
                ("el".to_string(), true),
                ("lo".to_string(), false)
            ]
        );
    }

    #[test]
    fn size_tracks_splits_and_purge() {
        let mut rga = RgaTreeSplit::new();
        edit(&mut rga, 0, 0, "helloworld", ticket(1, 1));
        assert_eq!(rga.doc_size().live, DataSize::new(20, 24));

        edit(&mut rga, 2, 4, "", ticket(2, 1));
        assert_eq!(rga.doc_size(), rga.compute_size());
        assert_eq!(rga.doc_size().gc, DataSize::new(4, 48));

        assert_eq!(rga.purge(&ticket(1, 9)), 0);
        assert_eq!(rga.purge(&ticket(2, 1)), 1);
        assert_eq!(rga.doc_size().gc, DataSize::default());
        assert_eq!(rga.doc_size(), rga.compute_size());
        assert_eq!(text(&rga), "heoworld");
    }

    #[test]
    fn multibyte_content_splits_on_chars() {
        let mut rga = RgaTreeSplit::new();
        edit(&mut rga, 0, 0, "héllo", ticket(1, 1));
        edit(&mut rga, 2, 2, "—", ticket(2, 1));
        assert_eq!(text(&rga), "hé—llo");
        assert_eq!(rga.len(), 6);
    }
}
