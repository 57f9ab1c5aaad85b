//! Weighted splay tree.
//!
//! An ordered sequence where every item carries a length ("weight"), and
//! items can be found by cumulative offset. Accessed items are splayed to
//! the root so runs of nearby edits stay cheap.
//!
//! Structure:
//! - Nodes live in a `Vec` arena and link to each other by `NodeIdx`
//! - Each node stores its own length and the weight of its subtree
//! - Freed slots are recycled through a free list
//!
//! Operations:
//! - find: O(log n) amortized, splays the found node
//! - insert_after: O(log n) amortized
//! - remove: O(log n) amortized
//! - set_length: O(log n) amortized
//! - index_of: O(depth), does not restructure

use serde::Deserialize;
use serde::Serialize;

/// Index of a node in a splay tree arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeIdx(u32);

impl NodeIdx {
    #[inline(always)]
    fn slot(self) -> usize {
        return self.0 as usize;
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct SplayNode<V> {
    value: V,
    /// Length of this node alone.
    length: usize,
    /// Length of this node plus both subtrees.
    weight: usize,
    left: Option<NodeIdx>,
    right: Option<NodeIdx>,
    parent: Option<NodeIdx>,
}

/// A self-adjusting binary tree ordered by position and weighted by length.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SplayTree<V> {
    nodes: Vec<Option<SplayNode<V>>>,
    free: Vec<NodeIdx>,
    root: Option<NodeIdx>,
}

impl<V> Default for SplayTree<V> {
    fn default() -> Self {
        return SplayTree::new();
    }
}

impl<V> SplayTree<V> {
    pub fn new() -> SplayTree<V> {
        return SplayTree {
            nodes: Vec::new(),
            free: Vec::new(),
            root: None,
        };
    }

    /// Total length of all nodes.
    pub fn len(&self) -> usize {
        return match self.root {
            Some(root) => self.node(root).weight,
            None => 0,
        };
    }

    pub fn is_empty(&self) -> bool {
        return self.root.is_none();
    }

    /// Number of live nodes in the arena.
    pub fn node_count(&self) -> usize {
        return self.nodes.len() - self.free.len();
    }

    pub fn get(&self, idx: NodeIdx) -> &V {
        return &self.node(idx).value;
    }

    pub fn get_mut(&mut self, idx: NodeIdx) -> &mut V {
        return &mut self.node_mut(idx).value;
    }

    pub fn length_of(&self, idx: NodeIdx) -> usize {
        return self.node(idx).length;
    }

    /// Insert `value` as the only node of an empty tree, or after the
    /// last node otherwise.
    pub fn push_back(&mut self, value: V, length: usize) -> NodeIdx {
        return match self.root {
            None => {
                let idx = self.alloc(value, length);
                self.root = Some(idx);
                idx
            }
            Some(root) => {
                let last = self.rightmost(root);
                self.insert_after(last, value, length)
            }
        };
    }

    /// Insert `value` immediately after `target` in sequence order.
    pub fn insert_after(&mut self, target: NodeIdx, value: V, length: usize) -> NodeIdx {
        let idx = self.alloc(value, length);
        self.splay(target);

        let right = self.node(target).right;
        self.node_mut(idx).right = right;
        if let Some(right) = right {
            self.node_mut(right).parent = Some(idx);
        }
        self.node_mut(idx).left = Some(target);
        self.node_mut(target).parent = Some(idx);
        self.node_mut(target).right = None;
        self.root = Some(idx);

        self.update_weight(target);
        self.update_weight(idx);
        return idx;
    }

    /// Find the node covering `pos` and the offset of `pos` inside it.
    ///
    /// Positions on a boundary resolve to the left node, so the returned
    /// offset may equal the node's length. Returns `None` for an empty
    /// tree or a position past the end.
    pub fn find(&mut self, pos: usize) -> Option<(NodeIdx, usize)> {
        let mut current = self.root?;
        if pos > self.len() {
            return None;
        }

        let mut pos = pos;
        loop {
            let node = self.node(current);
            let left_weight = self.weight_of(node.left);
            if node.left.is_some() && pos <= left_weight {
                current = node.left?;
            } else if node.right.is_some() && left_weight + node.length < pos {
                pos -= left_weight + node.length;
                current = node.right?;
            } else {
                pos -= left_weight;
                break;
            }
        }

        self.splay(current);
        return Some((current, pos));
    }

    /// Offset of the first position covered by `idx`.
    pub fn index_of(&self, idx: NodeIdx) -> usize {
        let mut index = self.weight_of(self.node(idx).left);
        let mut current = idx;
        while let Some(parent) = self.node(current).parent {
            let parent_node = self.node(parent);
            if parent_node.right == Some(current) {
                index += self.weight_of(parent_node.left) + parent_node.length;
            }
            current = parent;
        }
        return index;
    }

    /// Change the length of a node, keeping subtree weights consistent.
    pub fn set_length(&mut self, idx: NodeIdx, length: usize) {
        self.splay(idx);
        self.node_mut(idx).length = length;
        self.update_weight(idx);
    }

    /// Unlink `idx` from the tree and free its slot.
    pub fn remove(&mut self, idx: NodeIdx) -> V {
        self.splay(idx);
        let left = self.node(idx).left;
        let right = self.node(idx).right;

        if let Some(left) = left {
            self.node_mut(left).parent = None;
        }
        if let Some(right) = right {
            self.node_mut(right).parent = None;
        }

        match left {
            Some(left) => {
                self.root = Some(left);
                let last = self.rightmost(left);
                self.splay(last);
                self.node_mut(last).right = right;
                if let Some(right) = right {
                    self.node_mut(right).parent = Some(last);
                }
                self.update_weight(last);
            }
            None => {
                self.root = right;
            }
        }

        self.free.push(idx);
        let node = self.nodes[idx.slot()].take();
        return match node {
            Some(node) => node.value,
            None => panic!("splay node {:?} removed twice", idx),
        };
    }

    /// The first node in sequence order.
    pub fn first(&self) -> Option<NodeIdx> {
        return self.root.map(|root| self.leftmost(root));
    }

    /// The last node in sequence order.
    pub fn last(&self) -> Option<NodeIdx> {
        return self.root.map(|root| self.rightmost(root));
    }

    /// The node after `idx` in sequence order.
    pub fn next(&self, idx: NodeIdx) -> Option<NodeIdx> {
        if let Some(right) = self.node(idx).right {
            return Some(self.leftmost(right));
        }
        let mut current = idx;
        while let Some(parent) = self.node(current).parent {
            if self.node(parent).left == Some(current) {
                return Some(parent);
            }
            current = parent;
        }
        return None;
    }

    /// The node before `idx` in sequence order.
    pub fn prev(&self, idx: NodeIdx) -> Option<NodeIdx> {
        if let Some(left) = self.node(idx).left {
            return Some(self.rightmost(left));
        }
        let mut current = idx;
        while let Some(parent) = self.node(current).parent {
            if self.node(parent).right == Some(current) {
                return Some(parent);
            }
            current = parent;
        }
        return None;
    }

    /// Nodes in sequence order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeIdx, &V)> + '_ {
        let mut stack = Vec::new();
        let mut current = self.root;
        return std::iter::from_fn(move || {
            while let Some(idx) = current {
                stack.push(idx);
                current = self.node(idx).left;
            }
            let idx = stack.pop()?;
            current = self.node(idx).right;
            return Some((idx, &self.node(idx).value));
        });
    }

    fn alloc(&mut self, value: V, length: usize) -> NodeIdx {
        let node = SplayNode {
            value,
            length,
            weight: length,
            left: None,
            right: None,
            parent: None,
        };
        if let Some(idx) = self.free.pop() {
            self.nodes[idx.slot()] = Some(node);
            return idx;
        }
        let idx = NodeIdx(self.nodes.len() as u32);
        self.nodes.push(Some(node));
        return idx;
    }

    #[inline]
    fn node(&self, idx: NodeIdx) -> &SplayNode<V> {
        return match &self.nodes[idx.slot()] {
            Some(node) => node,
            None => panic!("splay node {:?} was freed", idx),
        };
    }

    #[inline]
    fn node_mut(&mut self, idx: NodeIdx) -> &mut SplayNode<V> {
        return match &mut self.nodes[idx.slot()] {
            Some(node) => node,
            None => panic!("splay node {:?} was freed", idx),
        };
    }

    #[inline]
    fn weight_of(&self, idx: Option<NodeIdx>) -> usize {
        return match idx {
            Some(idx) => self.node(idx).weight,
            None => 0,
        };
    }

    fn update_weight(&mut self, idx: NodeIdx) {
        let node = self.node(idx);
        let weight = node.length + self.weight_of(node.left) + self.weight_of(node.right);
        self.node_mut(idx).weight = weight;
    }

    fn leftmost(&self, idx: NodeIdx) -> NodeIdx {
        let mut current = idx;
        while let Some(left) = self.node(current).left {
            current = left;
        }
        return current;
    }

    fn rightmost(&self, idx: NodeIdx) -> NodeIdx {
        let mut current = idx;
        while let Some(right) = self.node(current).right {
            current = right;
        }
        return current;
    }

    /// Rotate `x` above its parent.
    fn rotate(&mut self, x: NodeIdx) {
        let Some(p) = self.node(x).parent else {
            return;
        };
        let g = self.node(p).parent;

        if self.node(p).left == Some(x) {
            let inner = self.node(x).right;
            self.node_mut(p).left = inner;
            if let Some(inner) = inner {
                self.node_mut(inner).parent = Some(p);
            }
            self.node_mut(x).right = Some(p);
        } else {
            let inner = self.node(x).left;
            self.node_mut(p).right = inner;
            if let Some(inner) = inner {
                self.node_mut(inner).parent = Some(p);
            }
            self.node_mut(x).left = Some(p);
        }

        self.node_mut(p).parent = Some(x);
        self.node_mut(x).parent = g;
        match g {
            Some(g) => {
                if self.node(g).left == Some(p) {
                    self.node_mut(g).left = Some(x);
                } else {
                    self.node_mut(g).right = Some(x);
                }
            }
            None => self.root = Some(x),
        }

        self.update_weight(p);
        self.update_weight(x);
    }

    /// Move `x` to the root.
    fn splay(&mut self, x: NodeIdx) {
        while let Some(p) = self.node(x).parent {
            match self.node(p).parent {
                None => self.rotate(x),
                Some(g) => {
                    let x_is_left = self.node(p).left == Some(x);
                    let p_is_left = self.node(g).left == Some(p);
                    if x_is_left == p_is_left {
                        self.rotate(p);
                        self.rotate(x);
                    } else {
                        self.rotate(x);
                        self.rotate(x);
                    }
                }
            }
        }
    }
}
