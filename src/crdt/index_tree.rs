//! N-ary tree addressed by flat token indices.
//!
//! Flattening a tree the way XML is written gives every position an index:
//! an element contributes an open and a close token around its content, a
//! text node contributes one token per character. The root's own tags are
//! not counted. For `<doc><p>ab</p></doc>`:
//!
//! ```text
//!   0   1 2 3    4
//!    <p> a b </p>
//! ```
//!
//! Removed nodes keep their place among their siblings but contribute
//! nothing to indices. Each node caches the size of its content so index
//! conversions cost O(depth * fanout).
//!
//! `tokens_between` walks the same flattening with removed nodes included,
//! which is what replicas agree on regardless of what they have removed.

use serde::Deserialize;
use serde::Serialize;
use smallvec::SmallVec;

use crate::Error;
use crate::Result;

/// What the index tree needs to know about a node.
pub trait IndexNode {
    fn is_text(&self) -> bool;
    fn is_removed(&self) -> bool;
    /// Character count of a text node.
    fn text_len(&self) -> usize;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TreeIdx(u32);

impl TreeIdx {
    #[inline(always)]
    fn slot(self) -> usize {
        return self.0 as usize;
    }
}

/// A position inside a node: a child offset for elements, a character
/// offset for text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TreePos {
    pub node: TreeIdx,
    pub offset: usize,
}

/// One token of the flattened tree. A whole text node is one token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token {
    Open(TreeIdx),
    Close(TreeIdx),
    Text(TreeIdx),
}

impl Token {
    pub fn node(&self) -> TreeIdx {
        return match self {
            Token::Open(idx) | Token::Close(idx) | Token::Text(idx) => *idx,
        };
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Slot<T> {
    value: T,
    parent: Option<TreeIdx>,
    /// Most nodes have a handful of children; keep them inline.
    children: SmallVec<[TreeIdx; 4]>,
    /// Size of the content, ignoring this node's own tags.
    size: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexTree<T> {
    slots: Vec<Option<Slot<T>>>,
    free: Vec<TreeIdx>,
    root: TreeIdx,
}

impl<T: IndexNode> IndexTree<T> {
    pub fn new(root: T) -> IndexTree<T> {
        let size = if root.is_text() { root.text_len() } else { 0 };
        return IndexTree {
            slots: vec![Some(Slot {
                value: root,
                parent: None,
                children: SmallVec::new(),
                size,
            })],
            free: Vec::new(),
            root: TreeIdx(0),
        };
    }

    pub fn root(&self) -> TreeIdx {
        return self.root;
    }

    /// False once the node's slot was freed.
    pub fn contains(&self, idx: TreeIdx) -> bool {
        return self.slot(idx).is_some();
    }

    pub fn value(&self, idx: TreeIdx) -> Option<&T> {
        return self.slot(idx).map(|slot| &slot.value);
    }

    pub fn get(&self, idx: TreeIdx) -> Result<&T> {
        return self.value(idx).ok_or_else(|| freed(idx));
    }

    /// Mutable access. Call `refresh` afterwards if the change affects
    /// the node's length or removed state.
    pub fn get_mut(&mut self, idx: TreeIdx) -> Result<&mut T> {
        return match self.slot_mut(idx) {
            Some(slot) => Ok(&mut slot.value),
            None => Err(freed(idx)),
        };
    }

    pub fn parent(&self, idx: TreeIdx) -> Option<TreeIdx> {
        return self.slot(idx).and_then(|slot| slot.parent);
    }

    /// All children, removed ones included.
    pub fn children(&self, idx: TreeIdx) -> &[TreeIdx] {
        return match self.slot(idx) {
            Some(slot) => &slot.children,
            None => &[],
        };
    }

    pub fn live_children(&self, idx: TreeIdx) -> impl Iterator<Item = TreeIdx> + '_ {
        return self
            .children(idx)
            .iter()
            .copied()
            .filter(|child| !self.is_removed(*child));
    }

    pub fn is_text(&self, idx: TreeIdx) -> bool {
        return self.value(idx).is_some_and(|node| node.is_text());
    }

    /// Freed nodes count as removed.
    pub fn is_removed(&self, idx: TreeIdx) -> bool {
        return self.value(idx).is_none_or(|node| node.is_removed());
    }

    /// Content size of the whole tree.
    pub fn len(&self) -> usize {
        return self.size(self.root);
    }

    pub fn is_empty(&self) -> bool {
        return self.len() == 0;
    }

    /// Content size of a node.
    pub fn size(&self, idx: TreeIdx) -> usize {
        return self.slot(idx).map_or(0, |slot| slot.size);
    }

    /// Tokens a node contributes to its parent.
    pub fn padded_size(&self, idx: TreeIdx) -> usize {
        if self.is_removed(idx) {
            return 0;
        }
        if self.is_text(idx) {
            return self.size(idx);
        }
        return self.size(idx) + 2;
    }

    pub fn node_count(&self) -> usize {
        return self.slots.len() - self.free.len();
    }

    /// Insert `value` as a child of `parent`, right after `left`, or first
    /// when `left` is `None`.
    pub fn insert_after(&mut self, parent: TreeIdx, left: Option<TreeIdx>, value: T) -> Result<TreeIdx> {
        let position = match left {
            None => 0,
            Some(left) => {
                let found = self.children(parent).iter().position(|c| *c == left);
                match found {
                    Some(position) => position + 1,
                    None => return Err(Error::NodeNotFound(format!("{:?} is not a child", left))),
                }
            }
        };
        if !self.contains(parent) {
            return Err(freed(parent));
        }
        let size = if value.is_text() { value.text_len() } else { 0 };
        let idx = self.alloc(Slot {
            value,
            parent: Some(parent),
            children: SmallVec::new(),
            size,
        });
        if let Some(slot) = self.slot_mut(parent) {
            slot.children.insert(position, idx);
        }
        self.refresh(parent);
        return Ok(idx);
    }

    /// Append `value` as the last child of `parent`.
    pub fn append(&mut self, parent: TreeIdx, value: T) -> Result<TreeIdx> {
        let last = self.children(parent).last().copied();
        return self.insert_after(parent, last, value);
    }

    /// Recompute the cached size of `idx` and its ancestors.
    pub fn refresh(&mut self, idx: TreeIdx) {
        let mut current = Some(idx);
        while let Some(idx) = current {
            let size = match self.value(idx) {
                Some(node) if node.is_text() => node.text_len(),
                Some(_) => self.children(idx).iter().map(|c| self.padded_size(*c)).sum(),
                None => return,
            };
            if let Some(slot) = self.slot_mut(idx) {
                slot.size = size;
            }
            current = self.parent(idx);
        }
    }

    /// Physically remove a subtree. Returns the removed values, parent first.
    pub fn remove_subtree(&mut self, idx: TreeIdx) -> Vec<T> {
        if let Some(parent) = self.parent(idx) {
            if let Some(slot) = self.slot_mut(parent) {
                slot.children.retain(|c| *c != idx);
            }
            self.refresh(parent);
        }
        let mut removed = Vec::new();
        let mut stack = vec![idx];
        while let Some(current) = stack.pop() {
            let taken = self.slots.get_mut(current.slot()).and_then(Option::take);
            if let Some(slot) = taken {
                stack.extend(slot.children.iter().rev());
                self.free.push(current);
                removed.push(slot.value);
            }
        }
        return removed;
    }

    /// All nodes below and including `idx` in document order.
    pub fn descendants(&self, idx: TreeIdx) -> Vec<TreeIdx> {
        let mut nodes = Vec::new();
        let mut stack = vec![idx];
        while let Some(current) = stack.pop() {
            nodes.push(current);
            stack.extend(self.children(current).iter().rev());
        }
        return nodes;
    }

    /// Resolve a flat index to a node position.
    ///
    /// With `prefer_text`, an index at the edge of a text node resolves
    /// inside that text node rather than to the enclosing element.
    pub fn find_tree_pos(&self, index: usize, prefer_text: bool) -> Result<TreePos> {
        if index > self.len() {
            return Err(Error::IndexOutOfRange { index, len: self.len() });
        }
        let mut node = self.root;
        let mut index = index;
        'descend: loop {
            if self.is_text(node) {
                return Ok(TreePos { node, offset: index });
            }
            let mut offset = 0;
            let mut pos = 0;
            for child in self.live_children(node) {
                let padded = self.padded_size(child);
                if prefer_text && self.is_text(child) && padded >= index - pos {
                    node = child;
                    index -= pos;
                    continue 'descend;
                }
                if index == pos {
                    return Ok(TreePos { node, offset });
                }
                if !prefer_text && padded == index - pos {
                    return Ok(TreePos { node, offset: offset + 1 });
                }
                if padded > index - pos {
                    // Step over the open tag into the child's content.
                    index -= pos + 1;
                    node = child;
                    continue 'descend;
                }
                pos += padded;
                offset += 1;
            }
            return Ok(TreePos { node, offset });
        }
    }

    /// Index of the token just before `idx` (its open tag, or its first
    /// character for text).
    pub fn index_of(&self, idx: TreeIdx) -> usize {
        let mut index = 0;
        let mut current = idx;
        while let Some(parent) = self.parent(current) {
            for sibling in self.children(parent) {
                if *sibling == current {
                    break;
                }
                index += self.padded_size(*sibling);
            }
            if parent != self.root {
                index += 1;
            }
            current = parent;
        }
        return index;
    }

    /// Index of the first content position of an element.
    pub fn content_start(&self, idx: TreeIdx) -> usize {
        if idx == self.root {
            return 0;
        }
        return self.index_of(idx) + 1;
    }

    pub fn index_of_pos(&self, pos: &TreePos) -> usize {
        if self.is_text(pos.node) {
            return self.index_of(pos.node) + pos.offset;
        }
        let before: usize = self
            .live_children(pos.node)
            .take(pos.offset)
            .map(|child| self.padded_size(child))
            .sum();
        return self.content_start(pos.node) + before;
    }

    /// Tokens after `from` up to and including `to`, removed nodes
    /// included. Empty when `to` does not come after `from`.
    pub fn tokens_between(&self, from: Token, to: Token) -> Vec<Token> {
        let mut tokens = Vec::new();
        if from == to {
            return tokens;
        }
        let mut frames = self.frames_after(from);
        while let Some(token) = self.advance(&mut frames) {
            tokens.push(token);
            if token == to {
                return tokens;
            }
        }
        return Vec::new();
    }

    /// Walk state right after `token`: for every open element from the
    /// root down, the offset of the next child to visit.
    fn frames_after(&self, token: Token) -> Vec<(TreeIdx, usize)> {
        let mut frames = Vec::new();
        let mut node = token.node();
        if let Token::Open(idx) = token {
            frames.push((idx, 0));
        }
        while let Some(parent) = self.parent(node) {
            let offset = self.children(parent).iter().position(|c| *c == node).unwrap_or(0);
            frames.push((parent, offset + 1));
            node = parent;
        }
        frames.reverse();
        return frames;
    }

    fn advance(&self, frames: &mut Vec<(TreeIdx, usize)>) -> Option<Token> {
        let (node, next) = frames.last_mut()?;
        let parent = *node;
        match self.children(parent).get(*next).copied() {
            Some(child) => {
                *next += 1;
                if self.is_text(child) {
                    return Some(Token::Text(child));
                }
                frames.push((child, 0));
                return Some(Token::Open(child));
            }
            None => {
                frames.pop();
                return Some(Token::Close(parent));
            }
        }
    }

    /// Path of child offsets from the root to `pos`. The last entry is a
    /// character offset within the parent's content for text positions.
    pub fn tree_pos_to_path(&self, pos: &TreePos) -> Result<Vec<usize>> {
        let mut path = Vec::new();
        let mut node = pos.node;
        if self.is_text(node) {
            let parent = self
                .parent(node)
                .ok_or_else(|| Error::InvalidPath("text node without parent".to_string()))?;
            let before: usize = self
                .live_children(parent)
                .take_while(|child| *child != node)
                .map(|child| self.padded_size(child))
                .sum();
            path.push(before + pos.offset);
            node = parent;
        } else {
            path.push(pos.offset);
        }

        while let Some(parent) = self.parent(node) {
            let offset = self
                .live_children(parent)
                .position(|child| child == node)
                .ok_or_else(|| Error::InvalidPath("removed ancestor".to_string()))?;
            path.push(offset);
            node = parent;
        }
        path.reverse();
        return Ok(path);
    }

    pub fn path_to_tree_pos(&self, path: &[usize]) -> Result<TreePos> {
        let invalid = || Error::InvalidPath(format!("{:?}", path));
        let (last, parents) = path.split_last().ok_or_else(invalid)?;

        let mut node = self.root;
        for offset in parents {
            node = self.live_children(node).nth(*offset).ok_or_else(invalid)?;
        }

        let has_text = self.live_children(node).any(|child| self.is_text(child));
        if has_text {
            let mut remaining = *last;
            for child in self.live_children(node) {
                let padded = self.padded_size(child);
                if self.is_text(child) && remaining <= padded {
                    return Ok(TreePos { node: child, offset: remaining });
                }
                if remaining < padded {
                    return Err(invalid());
                }
                remaining -= padded;
            }
            if remaining == 0 {
                let offset = self.live_children(node).count();
                return Ok(TreePos { node, offset });
            }
            return Err(invalid());
        }

        if *last > self.live_children(node).count() {
            return Err(invalid());
        }
        return Ok(TreePos { node, offset: *last });
    }

    fn alloc(&mut self, slot: Slot<T>) -> TreeIdx {
        if let Some(idx) = self.free.pop() {
            self.slots[idx.slot()] = Some(slot);
            return idx;
        }
        let idx = TreeIdx(self.slots.len() as u32);
        self.slots.push(Some(slot));
        return idx;
    }

    #[inline]
    fn slot(&self, idx: TreeIdx) -> Option<&Slot<T>> {
        return self.slots.get(idx.slot()).and_then(Option::as_ref);
    }

    #[inline]
    fn slot_mut(&mut self, idx: TreeIdx) -> Option<&mut Slot<T>> {
        return self.slots.get_mut(idx.slot()).and_then(Option::as_mut);
    }
}

fn freed(idx: TreeIdx) -> Error {
    return Error::NodeNotFound(format!("tree node {:?} was freed", idx));
}
