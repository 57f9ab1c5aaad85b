//! Collaborative tree of element and text nodes.
//!
//! Nodes are addressed by `CrdtTreePos`: the parent plus the left sibling
//! after which the position lies (the parent itself for the first slot).
//! Text nodes split like text runs, so a left sibling id may point into
//! the middle of a text insertion. Elements never split or merge: a range
//! that only partly covers an element removes the covered content but
//! keeps the element.

use std::collections::BTreeMap;

use rustc_hash::FxHashSet;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as JsonValue;

use super::DeleteGuard;
use super::MaxCreatedAtMap;
use super::index_tree::IndexNode;
use super::index_tree::IndexTree;
use super::index_tree::Token;
use super::index_tree::TreeIdx;
use super::primitives::GcBoundary;
use super::primitives::TimeTicket;
use super::rga_tree_split::NodeId;
use super::rht::Rht;
use super::size::DataSize;
use super::size::DocSize;
use super::size::string_size;
use crate::Error;
use crate::Result;

/// Node type of text nodes.
pub const TEXT_TYPE: &str = "text";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TreeNode {
    id: NodeId,
    node_type: String,
    value: String,
    char_len: u32,
    attrs: Rht,
    removed_at: Option<TimeTicket>,
}

impl TreeNode {
    fn from_spec(spec: &TreeNodeSpec) -> TreeNode {
        let mut attrs = Rht::new();
        for (key, value) in &spec.attributes {
            attrs.set(key, value, spec.id.created_at);
        }
        return TreeNode {
            id: spec.id,
            node_type: spec.node_type.clone(),
            value: spec.value.clone(),
            char_len: spec.value.chars().count() as u32,
            attrs,
            removed_at: None,
        };
    }

    pub fn id(&self) -> NodeId {
        return self.id;
    }

    pub fn node_type(&self) -> &str {
        return &self.node_type;
    }

    pub fn value(&self) -> &str {
        return &self.value;
    }

    pub fn attributes(&self) -> &Rht {
        return &self.attrs;
    }

    /// Id naming the point right after this node.
    fn end_anchor(&self) -> NodeId {
        if self.is_text() {
            return NodeId::new(self.id.created_at, self.id.offset + self.char_len);
        }
        return self.id;
    }

    fn data_size(&self) -> DocSize {
        let mut size = DocSize::default();
        let tickets = if self.is_removed() { 2 } else { 1 };
        let own = DataSize::new(string_size(&self.value), DataSize::tickets(tickets).meta);
        let attrs = self.attrs.doc_size();
        if self.is_removed() {
            size.gc += own;
            size.gc += attrs.combined();
        } else {
            size.live += own;
            size.live += attrs.live;
            size.gc += attrs.gc;
        }
        return size;
    }
}

impl IndexNode for TreeNode {
    fn is_text(&self) -> bool {
        return self.node_type == TEXT_TYPE;
    }

    fn is_removed(&self) -> bool {
        return self.removed_at.is_some();
    }

    fn text_len(&self) -> usize {
        return self.char_len as usize;
    }
}

/// A position between nodes of the tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrdtTreePos {
    pub parent_id: NodeId,
    pub left_sibling_id: NodeId,
}

/// A node to insert, with ids already issued.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNodeSpec {
    pub id: NodeId,
    pub node_type: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub children: Vec<TreeNodeSpec>,
}

/// A node to insert, before ids are issued. Built by callers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeValue {
    Element {
        node_type: String,
        attributes: BTreeMap<String, String>,
        children: Vec<TreeValue>,
    },
    Text(String),
}

impl TreeValue {
    pub fn element(node_type: &str) -> TreeValue {
        return TreeValue::Element {
            node_type: node_type.to_string(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
        };
    }

    pub fn text(value: &str) -> TreeValue {
        return TreeValue::Text(value.to_string());
    }

    pub fn with_attribute(mut self, key: &str, value: &str) -> TreeValue {
        if let TreeValue::Element { attributes, .. } = &mut self {
            attributes.insert(key.to_string(), value.to_string());
        }
        return self;
    }

    pub fn with_child(mut self, child: TreeValue) -> TreeValue {
        if let TreeValue::Element { children, .. } = &mut self {
            children.push(child);
        }
        return self;
    }

    /// Issue ids depth first and produce the insertable form.
    pub fn to_spec(&self, issue: &mut dyn FnMut() -> TimeTicket) -> TreeNodeSpec {
        return match self {
            TreeValue::Text(value) => TreeNodeSpec {
                id: NodeId::new(issue(), 0),
                node_type: TEXT_TYPE.to_string(),
                value: value.clone(),
                attributes: BTreeMap::new(),
                children: Vec::new(),
            },
            TreeValue::Element {
                node_type,
                attributes,
                children,
            } => {
                let id = NodeId::new(issue(), 0);
                TreeNodeSpec {
                    id,
                    node_type: node_type.clone(),
                    value: String::new(),
                    attributes: attributes.clone(),
                    children: children.iter().map(|child| child.to_spec(issue)).collect(),
                }
            }
        };
    }
}

/// What a tree edit or style did, in indices and paths before the change.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeChange {
    pub from: usize,
    pub to: usize,
    pub from_path: Vec<usize>,
    pub to_path: Vec<usize>,
    /// Nodes newly tombstoned.
    pub removed: usize,
    pub max_created_at: MaxCreatedAtMap,
}

/// A node's share of the running totals.
#[derive(Clone, Copy, Debug, Default)]
struct Footprint {
    size: DocSize,
    removed: usize,
    removed_attrs: usize,
}

impl TreeNode {
    fn footprint(&self) -> Footprint {
        return Footprint {
            size: self.data_size(),
            removed: usize::from(self.is_removed()),
            removed_attrs: self.attrs.removed_count(),
        };
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CrdtTree {
    index: IndexTree<TreeNode>,
    by_id: BTreeMap<NodeId, TreeIdx>,
    removed_count: usize,
    removed_attrs: usize,
    size: DocSize,
}

impl CrdtTree {
    /// Build a tree whose root is `root`.
    pub fn new(root: &TreeNodeSpec) -> CrdtTree {
        let node = TreeNode::from_spec(root);
        let mut tree = CrdtTree {
            size: DocSize::default(),
            removed_count: 0,
            removed_attrs: 0,
            index: IndexTree::new(node),
            by_id: BTreeMap::new(),
        };
        let root_idx = tree.index.root();
        tree.by_id.insert(root.id, root_idx);
        tree.add_footprint(tree.footprint(root_idx));
        for child in &root.children {
            tree.append_spec(root_idx, child);
        }
        return tree;
    }

    /// Content size in index tokens.
    pub fn size(&self) -> usize {
        return self.index.len();
    }

    pub fn root_type(&self) -> &str {
        return self.index.value(self.index.root()).map_or("", |root| root.node_type());
    }

    /// CRDT position of a flat index.
    pub fn find_pos(&self, index: usize) -> Result<CrdtTreePos> {
        let pos = self.index.find_tree_pos(index, true)?;
        let node = self.index.get(pos.node)?;
        if node.is_text() {
            let parent = self
                .index
                .parent(pos.node)
                .ok_or_else(|| Error::NodeNotFound(node.id.to_id_string()))?;
            let left = if pos.offset > 0 {
                NodeId::new(node.id.created_at, node.id.offset + pos.offset as u32)
            } else {
                self.live_left_anchor(parent, pos.node)?
            };
            return Ok(CrdtTreePos {
                parent_id: self.index.get(parent)?.id,
                left_sibling_id: left,
            });
        }

        let left = if pos.offset == 0 {
            node.id
        } else {
            let sibling = self
                .index
                .live_children(pos.node)
                .nth(pos.offset - 1)
                .ok_or(Error::IndexOutOfRange { index, len: self.size() })?;
            self.index.get(sibling)?.end_anchor()
        };
        return Ok(CrdtTreePos {
            parent_id: node.id,
            left_sibling_id: left,
        });
    }

    pub fn index_to_path(&self, index: usize) -> Result<Vec<usize>> {
        let pos = self.index.find_tree_pos(index, true)?;
        return self.index.tree_pos_to_path(&pos);
    }

    pub fn path_to_index(&self, path: &[usize]) -> Result<usize> {
        let pos = self.index.path_to_tree_pos(path)?;
        return Ok(self.index.index_of_pos(&pos));
    }

    /// Flat index of a CRDT position, without modifying the tree.
    pub fn pos_to_index(&self, pos: &CrdtTreePos) -> Result<usize> {
        let parent = self.lookup(&pos.parent_id)?;
        if pos.left_sibling_id == pos.parent_id {
            return Ok(self.index.content_start(parent));
        }
        let left = self.find_floor_prefer_left(&pos.left_sibling_id)?;
        let node = self.index.get(left)?;
        if node.is_text() && !node.is_removed() {
            let offset = (pos.left_sibling_id.offset - node.id.offset) as usize;
            return Ok(self.index.index_of(left) + offset.min(node.text_len()));
        }
        return Ok(self.index.index_of(left) + self.index.padded_size(left));
    }

    /// Remove what lies between `from` and `to`, then insert `contents`
    /// at `from`.
    ///
    /// The range is walked over every node, tombstones included, so that
    /// replicas which removed different things still cover the same nodes.
    /// Text in the range is removed, elements only when both tags are.
    ///
    /// The first node of `contents` must carry `executed_at` as its
    /// ticket; concurrent inserts at one position are ordered by it.
    pub fn edit(
        &mut self,
        range: (&CrdtTreePos, &CrdtTreePos),
        contents: &[TreeNodeSpec],
        executed_at: TimeTicket,
        guard: DeleteGuard<'_>,
    ) -> Result<TreeChange> {
        let (from_parent, from_left) = self.resolve(range.0, executed_at)?;
        let (to_parent, to_left) = self.resolve(range.1, executed_at)?;
        let mut change = self.describe_range((from_parent, from_left), (to_parent, to_left));

        let mut opened = FxHashSet::default();
        let mut doomed = Vec::new();
        for token in self.tokens_between((from_parent, from_left), (to_parent, to_left)) {
            let idx = token.node();
            let node = self.index.get(idx)?;
            super::record_created_at(&mut change.max_created_at, node.id.created_at);
            let contained = match token {
                Token::Open(_) => {
                    opened.insert(idx);
                    false
                }
                Token::Close(_) => opened.contains(&idx),
                Token::Text(_) => true,
            };
            if contained && guard.knows(&node.id.created_at) {
                doomed.push(idx);
            }
        }
        for idx in doomed {
            if self.tombstone(idx, executed_at)? {
                change.removed += 1;
            }
        }

        let parent_removed = self.index.get(from_parent)?.is_removed();
        let mut left = from_left;
        for spec in contents {
            let anchor = if left == from_parent { None } else { Some(left) };
            let idx = self.index.insert_after(from_parent, anchor, TreeNode::from_spec(spec))?;
            self.by_id.insert(spec.id, idx);
            self.add_footprint(self.footprint(idx));
            for child in &spec.children {
                self.append_spec(idx, child);
            }
            if parent_removed {
                for node in self.index.descendants(idx) {
                    self.tombstone(node, executed_at)?;
                }
            }
            left = idx;
        }
        return Ok(change);
    }

    /// Set attributes on the elements whose open tag lies in the range.
    pub fn style(
        &mut self,
        range: (&CrdtTreePos, &CrdtTreePos),
        attributes: &BTreeMap<String, String>,
        executed_at: TimeTicket,
        guard: DeleteGuard<'_>,
    ) -> Result<TreeChange> {
        let (change, targets) = self.style_targets(range, executed_at, guard)?;
        for idx in targets {
            self.update(idx, |node| {
                for (key, value) in attributes {
                    node.attrs.set(key, value, executed_at);
                }
            })?;
        }
        return Ok(change);
    }

    /// Tombstone attributes on the elements whose open tag lies in the range.
    pub fn remove_style(
        &mut self,
        range: (&CrdtTreePos, &CrdtTreePos),
        keys: &[String],
        executed_at: TimeTicket,
        guard: DeleteGuard<'_>,
    ) -> Result<TreeChange> {
        let (change, targets) = self.style_targets(range, executed_at, guard)?;
        for idx in targets {
            self.update(idx, |node| {
                for key in keys {
                    node.attrs.remove(key, executed_at);
                }
            })?;
        }
        return Ok(change);
    }

    /// Tombstoned nodes plus tombstoned attributes.
    pub fn garbage_count(&self) -> usize {
        return self.removed_count + self.removed_attrs;
    }

    pub fn doc_size(&self) -> DocSize {
        return self.size;
    }

    /// The size summed over every node, ignoring the running total.
    pub fn compute_size(&self) -> DocSize {
        let mut size = DocSize::default();
        for idx in self.index.descendants(self.index.root()) {
            if let Some(node) = self.index.value(idx) {
                size += node.data_size();
            }
        }
        return size;
    }

    /// Drop tombstones the boundary dominates.
    pub fn purge(&mut self, boundary: &dyn GcBoundary) -> usize {
        let mut purged = 0;
        let mut doomed = Vec::new();
        let mut stack = vec![self.index.root()];
        while let Some(idx) = stack.pop() {
            let visited = self.update(idx, |node| {
                let dropped = node.attrs.purge(boundary);
                let dominated = node.removed_at.is_some_and(|removed_at| boundary.dominates(&removed_at));
                (dropped, dominated)
            });
            let Ok((dropped, dominated)) = visited else {
                continue;
            };
            purged += dropped;
            if dominated {
                doomed.push(idx);
            } else {
                stack.extend(self.index.children(idx).iter().copied());
            }
        }

        for idx in doomed {
            for node in self.index.remove_subtree(idx) {
                self.by_id.remove(&node.id);
                self.sub_footprint(node.footprint());
                if node.is_removed() {
                    purged += 1;
                }
            }
        }
        return purged;
    }

    /// `<type attr="v">children</type>` with attributes sorted by key.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_xml(self.index.root(), &mut out);
        return out;
    }

    /// Nested `{"type", "attributes", "children"}` objects. Adjacent text
    /// nodes are merged.
    pub fn to_json_value(&self) -> JsonValue {
        return self.node_json(self.index.root());
    }

    /// Live content as insertable values, ids dropped.
    pub fn to_value(&self) -> TreeValue {
        return self.node_value(self.index.root());
    }

    fn node_value(&self, idx: TreeIdx) -> TreeValue {
        let Some(node) = self.index.value(idx) else {
            return TreeValue::Text(String::new());
        };
        if node.is_text() {
            return TreeValue::Text(node.value.clone());
        }
        return TreeValue::Element {
            node_type: node.node_type.clone(),
            attributes: node.attrs.to_map(),
            children: self
                .index
                .live_children(idx)
                .map(|child| self.node_value(child))
                .collect(),
        };
    }

    fn node_json(&self, idx: TreeIdx) -> JsonValue {
        let Some(node) = self.index.value(idx) else {
            return JsonValue::Null;
        };
        let mut object = serde_json::Map::new();
        object.insert("type".to_string(), JsonValue::from(node.node_type.clone()));
        if node.is_text() {
            object.insert("value".to_string(), JsonValue::from(node.value.clone()));
            return JsonValue::Object(object);
        }

        let mut children: Vec<JsonValue> = Vec::new();
        let mut pending_text: Option<String> = None;
        for child in self.index.live_children(idx) {
            let Some(child_node) = self.index.value(child) else {
                continue;
            };
            if child_node.is_text() {
                pending_text.get_or_insert_with(String::new).push_str(&child_node.value);
                continue;
            }
            if let Some(text) = pending_text.take() {
                children.push(serde_json::json!({ "type": TEXT_TYPE, "value": text }));
            }
            children.push(self.node_json(child));
        }
        if let Some(text) = pending_text.take() {
            children.push(serde_json::json!({ "type": TEXT_TYPE, "value": text }));
        }
        object.insert("children".to_string(), JsonValue::Array(children));
        if !node.attrs.is_empty() {
            let attributes = node
                .attrs
                .iter()
                .map(|(key, value)| (key.to_string(), JsonValue::from(value)))
                .collect();
            object.insert("attributes".to_string(), JsonValue::Object(attributes));
        }
        return JsonValue::Object(object);
    }

    fn write_xml(&self, idx: TreeIdx, out: &mut String) {
        let Some(node) = self.index.value(idx) else {
            return;
        };
        if node.is_text() {
            out.push_str(&node.value);
            return;
        }
        out.push('<');
        out.push_str(&node.node_type);
        for (key, value) in node.attrs.iter() {
            out.push_str(&format!(" {}=\"{}\"", key, value));
        }
        out.push('>');
        for child in self.index.live_children(idx) {
            self.write_xml(child, out);
        }
        out.push_str("</");
        out.push_str(&node.node_type);
        out.push('>');
    }

    /// `parent` is always a node created in the same call, so the append
    /// only misses if the tree is already inconsistent.
    fn append_spec(&mut self, parent: TreeIdx, spec: &TreeNodeSpec) {
        let Ok(idx) = self.index.append(parent, TreeNode::from_spec(spec)) else {
            return;
        };
        self.by_id.insert(spec.id, idx);
        self.add_footprint(self.footprint(idx));
        for child in &spec.children {
            self.append_spec(idx, child);
        }
    }

    /// Mark a node removed. A node removed twice keeps the earlier ticket.
    /// Returns whether the node was live.
    fn tombstone(&mut self, idx: TreeIdx, executed_at: TimeTicket) -> Result<bool> {
        let newly = self.update(idx, |node| match node.removed_at {
            None => {
                node.removed_at = Some(executed_at);
                true
            }
            Some(removed_at) => {
                if removed_at.after(&executed_at) {
                    node.removed_at = Some(executed_at);
                }
                false
            }
        })?;
        if newly {
            self.index.refresh(idx);
        }
        return Ok(newly);
    }

    /// Run `apply` on a node, keeping the running totals in step.
    fn update<R>(&mut self, idx: TreeIdx, apply: impl FnOnce(&mut TreeNode) -> R) -> Result<R> {
        let before = self.footprint(idx);
        let result = apply(self.index.get_mut(idx)?);
        self.sub_footprint(before);
        self.add_footprint(self.footprint(idx));
        return Ok(result);
    }

    fn footprint(&self, idx: TreeIdx) -> Footprint {
        return self.index.value(idx).map(TreeNode::footprint).unwrap_or_default();
    }

    fn add_footprint(&mut self, footprint: Footprint) {
        self.size += footprint.size;
        self.removed_count += footprint.removed;
        self.removed_attrs += footprint.removed_attrs;
    }

    fn sub_footprint(&mut self, footprint: Footprint) {
        self.size -= footprint.size;
        self.removed_count -= footprint.removed;
        self.removed_attrs -= footprint.removed_attrs;
    }

    fn lookup(&self, id: &NodeId) -> Result<TreeIdx> {
        return self
            .by_id
            .get(id)
            .copied()
            .ok_or_else(|| Error::NodeNotFound(id.to_id_string()));
    }

    /// Anchor for the slot just before `node` among live siblings.
    fn live_left_anchor(&self, parent: TreeIdx, node: TreeIdx) -> Result<NodeId> {
        let mut anchor = self.index.get(parent)?.id;
        for sibling in self.index.live_children(parent) {
            if sibling == node {
                break;
            }
            anchor = self.index.get(sibling)?.end_anchor();
        }
        return Ok(anchor);
    }

    fn find_floor_prefer_left(&self, id: &NodeId) -> Result<TreeIdx> {
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

    /// Find the parent and left sibling for `pos`, splitting a text node
    /// when the position falls inside it, then step over siblings inserted
    /// concurrently after `executed_at`.
    fn resolve(&mut self, pos: &CrdtTreePos, executed_at: TimeTicket) -> Result<(TreeIdx, TreeIdx)> {
        let parent = self.lookup(&pos.parent_id)?;
        let mut left = parent;
        if pos.left_sibling_id != pos.parent_id {
            left = self.find_floor_prefer_left(&pos.left_sibling_id)?;
            if self.index.parent(left) != Some(parent) {
                return Err(Error::NodeNotFound(pos.left_sibling_id.to_id_string()));
            }
            let node = self.index.get(left)?;
            if node.is_text() {
                let offset = pos.left_sibling_id.offset - node.id.offset;
                self.split_text(parent, left, offset)?;
            }
        }

        let children = self.index.children(parent);
        let start = if left == parent {
            0
        } else {
            children.iter().position(|c| *c == left).map_or(children.len(), |p| p + 1)
        };
        for next in &children[start..] {
            if !self.index.get(*next)?.id.created_at.after(&executed_at) {
                break;
            }
            left = *next;
        }
        return Ok((parent, left));
    }

    fn split_text(&mut self, parent: TreeIdx, idx: TreeIdx, offset: u32) -> Result<()> {
        let node = self.index.get(idx)?;
        if offset > node.char_len {
            return Err(Error::NodeNotFound(
                NodeId::new(node.id.created_at, node.id.offset + offset).to_id_string(),
            ));
        }
        if offset == 0 || offset == node.char_len {
            return Ok(());
        }

        let tail = self.update(idx, |node| {
            let byte = node
                .value
                .char_indices()
                .nth(offset as usize)
                .map_or(node.value.len(), |(byte, _)| byte);
            let tail = TreeNode {
                id: NodeId::new(node.id.created_at, node.id.offset + offset),
                node_type: TEXT_TYPE.to_string(),
                value: node.value.split_off(byte),
                char_len: node.char_len - offset,
                attrs: Rht::new(),
                removed_at: node.removed_at,
            };
            node.char_len = offset;
            tail
        })?;
        self.index.refresh(idx);
        let tail_id = tail.id;
        let tail_idx = self.index.insert_after(parent, Some(idx), tail)?;
        self.by_id.insert(tail_id, tail_idx);
        self.add_footprint(self.footprint(tail_idx));
        return Ok(());
    }

    /// The token a resolved position follows.
    fn point(&self, (parent, left): (TreeIdx, TreeIdx)) -> Token {
        if parent == left {
            return Token::Open(parent);
        }
        if self.index.is_text(left) {
            return Token::Text(left);
        }
        return Token::Close(left);
    }

    fn tokens_between(&self, from: (TreeIdx, TreeIdx), to: (TreeIdx, TreeIdx)) -> Vec<Token> {
        return self.index.tokens_between(self.point(from), self.point(to));
    }

    fn index_after(&self, parent: TreeIdx, left: TreeIdx) -> usize {
        if parent == left {
            return self.index.content_start(parent);
        }
        return self.index.index_of(left) + self.index.padded_size(left);
    }

    fn describe_range(&self, from: (TreeIdx, TreeIdx), to: (TreeIdx, TreeIdx)) -> TreeChange {
        let from_index = self.index_after(from.0, from.1);
        let to_index = self.index_after(to.0, to.1).max(from_index);
        return TreeChange {
            from: from_index,
            to: to_index,
            from_path: self.index_to_path(from_index).unwrap_or_default(),
            to_path: self.index_to_path(to_index).unwrap_or_default(),
            ..TreeChange::default()
        };
    }

    /// Elements whose open tag lies in the range, removed ones included so
    /// every replica styles the same set.
    fn style_targets(
        &mut self,
        range: (&CrdtTreePos, &CrdtTreePos),
        executed_at: TimeTicket,
        guard: DeleteGuard<'_>,
    ) -> Result<(TreeChange, Vec<TreeIdx>)> {
        let from = self.resolve(range.0, executed_at)?;
        let to = self.resolve(range.1, executed_at)?;
        let mut change = self.describe_range(from, to);

        let mut targets = Vec::new();
        for token in self.tokens_between(from, to) {
            let node = self.index.get(token.node())?;
            super::record_created_at(&mut change.max_created_at, node.id.created_at);
            if let Token::Open(idx) = token {
                if guard.knows(&node.id.created_at) {
                    targets.push(idx);
                }
            }
        }
        return Ok((change, targets));
    }
}
