//! Operations: the replayable record of every mutation.
//!
//! A local update produces operations as it mutates its working root. Each
//! operation carries everything a remote replica needs to reproduce the
//! effect: the container it targets, the ticket it was stamped with, and
//! stable identities (tickets and node ids) instead of indices. Executing
//! the same set of operations in any causal order yields the same root.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use tracing::trace;

use super::DeleteGuard;
use super::MaxCreatedAtMap;
use super::array::CrdtArray;
use super::counter::CounterValue;
use super::element::Element;
use super::element::ElementKind;
use super::object::CrdtObject;
use super::primitive::Primitive;
use super::primitives::ActorId;
use super::primitives::TimeTicket;
use super::primitives::VersionVector;
use super::rga_tree_split::NodeId;
use super::rga_tree_split::TextChange;
use super::rga_tree_split::TextPos;
use super::root::CrdtRoot;
use super::text::CrdtText;
use super::tree::CrdtTree;
use super::tree::CrdtTreePos;
use super::tree::TreeChange;
use super::tree::TreeNodeSpec;
use crate::Error;
use crate::Result;

/// The value an operation creates. Containers start empty; their content
/// arrives as further operations. Trees carry their initial nodes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ElementValue {
    Primitive(Primitive),
    Counter(CounterValue),
    Object,
    Array,
    Text,
    Tree(TreeNodeSpec),
}

impl ElementValue {
    pub fn to_element(&self, created_at: TimeTicket) -> Element {
        let kind = match self {
            ElementValue::Primitive(value) => ElementKind::Primitive(value.clone()),
            ElementValue::Counter(value) => ElementKind::Counter(*value),
            ElementValue::Object => ElementKind::Object(CrdtObject::new()),
            ElementValue::Array => ElementKind::Array(CrdtArray::new()),
            ElementValue::Text => ElementKind::Text(CrdtText::new()),
            ElementValue::Tree(root) => ElementKind::Tree(CrdtTree::new(root)),
        };
        return Element::new(created_at, kind);
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum OperationKind {
    /// Write a value under an object key.
    Set {
        key: String,
        value: ElementValue,
        created_at: TimeTicket,
    },
    /// Insert a value into an array after the position `prev_positioned_at`:
    /// the ticket of the insert or latest move that placed the element
    /// before it, `INITIAL` for the front.
    Add {
        prev_positioned_at: TimeTicket,
        created_at: TimeTicket,
        value: ElementValue,
    },
    /// Give an array element a new position after `prev_positioned_at`.
    Move {
        prev_positioned_at: TimeTicket,
        created_at: TimeTicket,
    },
    /// Tombstone a child of an object or array.
    Remove { created_at: TimeTicket },
    /// Replace an array element with a new one.
    ArraySet {
        created_at: TimeTicket,
        /// Position of the target when the edit was made.
        positioned_at: TimeTicket,
        new_created_at: TimeTicket,
        value: ElementValue,
    },
    /// Add to a counter. The counter is the operation's parent.
    Increase { value: Primitive },
    /// Replace a text range with `content`.
    Edit {
        from: TextPos,
        to: TextPos,
        content: String,
        attributes: BTreeMap<String, String>,
        /// What the editor had seen, filled in when the edit first runs.
        max_created_at_map_by_actor: Option<MaxCreatedAtMap>,
    },
    /// Move the editor's selection.
    Select { from: TextPos, to: TextPos },
    /// Set attributes on a text range.
    Style {
        from: TextPos,
        to: TextPos,
        attributes: BTreeMap<String, String>,
        max_created_at_map_by_actor: Option<MaxCreatedAtMap>,
    },
    /// Replace a tree range with `contents`.
    TreeEdit {
        from: CrdtTreePos,
        to: CrdtTreePos,
        contents: Vec<TreeNodeSpec>,
        max_created_at_map_by_actor: Option<MaxCreatedAtMap>,
    },
    /// Set or remove attributes of the tree elements in a range.
    TreeStyle {
        from: CrdtTreePos,
        to: CrdtTreePos,
        attributes: BTreeMap<String, String>,
        attributes_to_remove: Vec<String>,
        max_created_at_map_by_actor: Option<MaxCreatedAtMap>,
    },
}

impl OperationKind {
    pub fn name(&self) -> &'static str {
        return match self {
            OperationKind::Set { .. } => "set",
            OperationKind::Add { .. } => "add",
            OperationKind::Move { .. } => "move",
            OperationKind::Remove { .. } => "remove",
            OperationKind::ArraySet { .. } => "array-set",
            OperationKind::Increase { .. } => "increase",
            OperationKind::Edit { .. } => "edit",
            OperationKind::Select { .. } => "select",
            OperationKind::Style { .. } => "style",
            OperationKind::TreeEdit { .. } => "tree-edit",
            OperationKind::TreeStyle { .. } => "tree-style",
        };
    }
}

/// What an executed operation did, addressed by JSON path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum OperationInfo {
    Set {
        path: String,
        key: String,
    },
    Add {
        path: String,
        index: usize,
    },
    Move {
        path: String,
        previous_index: usize,
        index: usize,
    },
    Remove {
        path: String,
        key: Option<String>,
        index: Option<usize>,
    },
    ArraySet {
        path: String,
        index: usize,
    },
    Increase {
        path: String,
        value: Primitive,
    },
    Edit {
        path: String,
        from: usize,
        to: usize,
        content: String,
        attributes: BTreeMap<String, String>,
    },
    Select {
        path: String,
        from: usize,
        to: usize,
    },
    Style {
        path: String,
        from: usize,
        to: usize,
        attributes: BTreeMap<String, String>,
    },
    TreeEdit {
        path: String,
        from: usize,
        to: usize,
        from_path: Vec<usize>,
        to_path: Vec<usize>,
    },
    TreeStyle {
        path: String,
        from: usize,
        to: usize,
        attributes: BTreeMap<String, String>,
        removed_attributes: Vec<String>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// The container (or counter, text, tree) being mutated.
    pub parent_created_at: TimeTicket,
    pub executed_at: TimeTicket,
    pub kind: OperationKind,
}

/// Pick the guard for a range deletion. An operation that has never run
/// carries no map and sees everything.
fn delete_guard<'a>(
    map: Option<&'a MaxCreatedAtMap>,
    version_vector: Option<&'a VersionVector>,
) -> DeleteGuard<'a> {
    if let Some(map) = map {
        return DeleteGuard::ByMap(map);
    }
    if let Some(vv) = version_vector {
        return DeleteGuard::ByVersionVector(vv);
    }
    return DeleteGuard::Local;
}

fn text_infos(path: &str, changes: Vec<TextChange>) -> Vec<OperationInfo> {
    return changes
        .into_iter()
        .map(|change| OperationInfo::Edit {
            path: path.to_string(),
            from: change.from,
            to: change.to,
            content: change.content,
            attributes: change.attributes,
        })
        .collect();
}

impl Operation {
    pub fn new(parent_created_at: TimeTicket, executed_at: TimeTicket, kind: OperationKind) -> Operation {
        return Operation {
            parent_created_at,
            executed_at,
            kind,
        };
    }

    /// The element this operation creates or targets, if any.
    pub fn effected_created_at(&self) -> TimeTicket {
        return match &self.kind {
            OperationKind::Set { created_at, .. }
            | OperationKind::Add { created_at, .. }
            | OperationKind::Move { created_at, .. }
            | OperationKind::Remove { created_at } => *created_at,
            OperationKind::ArraySet { new_created_at, .. } => *new_created_at,
            _ => self.parent_created_at,
        };
    }

    /// Apply this operation to `root`.
    ///
    /// `version_vector` is the vector of the change carrying a remote
    /// operation. A local first run passes `None`; text and tree edits then
    /// record what the editor saw, so replicas can tell which content the
    /// deletion was meant for.
    pub fn execute(
        &mut self,
        root: &mut CrdtRoot,
        version_vector: Option<&VersionVector>,
    ) -> Result<Vec<OperationInfo>> {
        let parent = self.parent_created_at;
        let executed_at = self.executed_at;
        trace!(op = self.kind.name(), %executed_at, %parent, "execute");
        if root.find(&parent).is_none() {
            return Err(Error::ParentNotFound(parent));
        }

        match &mut self.kind {
            OperationKind::Set {
                key,
                value,
                created_at,
            } => {
                root.object_set(parent, key, value.to_element(*created_at), executed_at)?;
                return Ok(vec![OperationInfo::Set {
                    path: root.create_path(&parent)?,
                    key: key.clone(),
                }]);
            }
            OperationKind::Add {
                prev_positioned_at,
                created_at,
                value,
            } => {
                root.array_insert_after(parent, *prev_positioned_at, value.to_element(*created_at), executed_at)?;
                let index = root.array(&parent)?.index_of(created_at).unwrap_or(0);
                return Ok(vec![OperationInfo::Add {
                    path: root.create_path(&parent)?,
                    index,
                }]);
            }
            OperationKind::Move {
                prev_positioned_at,
                created_at,
            } => {
                let previous_index = root.array(&parent)?.index_of(created_at).unwrap_or(0);
                if !root.array_move_after(parent, *prev_positioned_at, *created_at, executed_at)? {
                    return Ok(Vec::new());
                }
                let index = root.array(&parent)?.index_of(created_at).unwrap_or(0);
                return Ok(vec![OperationInfo::Move {
                    path: root.create_path(&parent)?,
                    previous_index,
                    index,
                }]);
            }
            OperationKind::Remove { created_at } => {
                let (key, index) = match &root.get(&parent)?.kind {
                    ElementKind::Object(object) => (object.key_of(created_at).map(str::to_string), None),
                    ElementKind::Array(array) => (None, array.index_of(created_at)),
                    _ => (None, None),
                };
                if !root.remove_element(parent, *created_at, executed_at)? {
                    return Ok(Vec::new());
                }
                return Ok(vec![OperationInfo::Remove {
                    path: root.create_path(&parent)?,
                    key,
                    index,
                }]);
            }
            OperationKind::ArraySet {
                created_at,
                positioned_at,
                new_created_at,
                value,
            } => {
                let index = root.array(&parent)?.index_of(created_at).unwrap_or(0);
                let element = value.to_element(*new_created_at);
                root.array_set(parent, *created_at, *positioned_at, element, executed_at)?;
                return Ok(vec![OperationInfo::ArraySet {
                    path: root.create_path(&parent)?,
                    index,
                }]);
            }
            OperationKind::Increase { value } => {
                match &mut root.get_mut(&parent)?.kind {
                    ElementKind::Counter(counter) => counter.increase(value)?,
                    other => {
                        return Err(Error::TypeMismatch {
                            expected: "counter",
                            actual: other.type_name(),
                        });
                    }
                }
                root.refresh_size(&parent);
                return Ok(vec![OperationInfo::Increase {
                    path: root.create_path(&parent)?,
                    value: value.clone(),
                }]);
            }
            OperationKind::Edit {
                from,
                to,
                content,
                attributes,
                max_created_at_map_by_actor,
            } => {
                let first_run = max_created_at_map_by_actor.is_none() && version_vector.is_none();
                let guard = delete_guard(max_created_at_map_by_actor.as_ref(), version_vector);
                let text = root.text_mut(&parent)?;
                let outcome = text.edit((&*from, &*to), content, attributes, executed_at, guard)?;
                let has_garbage = text.removed_count() > 0;
                if first_run {
                    *max_created_at_map_by_actor = Some(outcome.max_created_at);
                }
                root.refresh_size(&parent);
                if has_garbage {
                    root.register_having_removed_nodes(parent);
                }
                return Ok(text_infos(&root.create_path(&parent)?, outcome.changes));
            }
            OperationKind::Select { from, to } => {
                let Some((from, to)) = root.text_mut(&parent)?.select((&*from, &*to), executed_at)? else {
                    return Ok(Vec::new());
                };
                return Ok(vec![OperationInfo::Select {
                    path: root.create_path(&parent)?,
                    from,
                    to,
                }]);
            }
            OperationKind::Style {
                from,
                to,
                attributes,
                max_created_at_map_by_actor,
            } => {
                let first_run = max_created_at_map_by_actor.is_none() && version_vector.is_none();
                let guard = delete_guard(max_created_at_map_by_actor.as_ref(), version_vector);
                let (changes, max_created_at) =
                    root.text_mut(&parent)?.style((&*from, &*to), attributes, executed_at, guard)?;
                if first_run {
                    *max_created_at_map_by_actor = Some(max_created_at);
                }
                root.refresh_size(&parent);
                let path = root.create_path(&parent)?;
                return Ok(changes
                    .into_iter()
                    .map(|change| OperationInfo::Style {
                        path: path.clone(),
                        from: change.from,
                        to: change.to,
                        attributes: change.attributes,
                    })
                    .collect());
            }
            OperationKind::TreeEdit {
                from,
                to,
                contents,
                max_created_at_map_by_actor,
            } => {
                let first_run = max_created_at_map_by_actor.is_none() && version_vector.is_none();
                let guard = delete_guard(max_created_at_map_by_actor.as_ref(), version_vector);
                let tree = root.tree_mut(&parent)?;
                let change = tree.edit((&*from, &*to), contents.as_slice(), executed_at, guard)?;
                let has_garbage = tree.garbage_count() > 0;
                if first_run {
                    *max_created_at_map_by_actor = Some(change.max_created_at.clone());
                }
                root.refresh_size(&parent);
                if has_garbage {
                    root.register_having_removed_nodes(parent);
                }
                return Ok(vec![OperationInfo::TreeEdit {
                    path: root.create_path(&parent)?,
                    from: change.from,
                    to: change.to,
                    from_path: change.from_path,
                    to_path: change.to_path,
                }]);
            }
            OperationKind::TreeStyle {
                from,
                to,
                attributes,
                attributes_to_remove,
                max_created_at_map_by_actor,
            } => {
                let first_run = max_created_at_map_by_actor.is_none() && version_vector.is_none();
                let guard = delete_guard(max_created_at_map_by_actor.as_ref(), version_vector);
                let tree = root.tree_mut(&parent)?;
                let mut change = TreeChange::default();
                if !attributes.is_empty() {
                    change = tree.style((&*from, &*to), attributes, executed_at, guard)?;
                }
                if !attributes_to_remove.is_empty() {
                    let removed = tree.remove_style((&*from, &*to), attributes_to_remove, executed_at, guard)?;
                    for created_at in removed.max_created_at.values() {
                        super::record_created_at(&mut change.max_created_at, *created_at);
                    }
                    change.from = removed.from;
                    change.to = removed.to;
                }
                let has_garbage = tree.garbage_count() > 0;
                if first_run {
                    *max_created_at_map_by_actor = Some(change.max_created_at);
                }
                root.refresh_size(&parent);
                if has_garbage {
                    root.register_having_removed_nodes(parent);
                }
                return Ok(vec![OperationInfo::TreeStyle {
                    path: root.create_path(&parent)?,
                    from: change.from,
                    to: change.to,
                    attributes: attributes.clone(),
                    removed_attributes: attributes_to_remove.clone(),
                }]);
            }
        }
    }

    /// Stamp tickets issued before the actor was known with `actor`.
    pub fn set_actor(&mut self, actor: ActorId) {
        let rebind = |ticket: &mut TimeTicket| {
            if ticket.actor() == ActorId::INITIAL && ticket.lamport() > 0 {
                *ticket = ticket.with_actor(actor);
            }
        };
        let rebind_id = |id: &mut NodeId| rebind(&mut id.created_at);
        let rebind_map = |map: &mut Option<MaxCreatedAtMap>| {
            if let Some(map) = map {
                if let Some(mut created_at) = map.remove(&ActorId::INITIAL) {
                    rebind(&mut created_at);
                    super::record_created_at(map, created_at);
                }
            }
        };

        rebind(&mut self.parent_created_at);
        rebind(&mut self.executed_at);
        match &mut self.kind {
            OperationKind::Set { value, created_at, .. } => {
                rebind(created_at);
                rebind_value(value, &rebind_id);
            }
            OperationKind::Add {
                prev_positioned_at,
                created_at,
                value,
            } => {
                rebind(prev_positioned_at);
                rebind(created_at);
                rebind_value(value, &rebind_id);
            }
            OperationKind::Move {
                prev_positioned_at,
                created_at,
            } => {
                rebind(prev_positioned_at);
                rebind(created_at);
            }
            OperationKind::Remove { created_at } => rebind(created_at),
            OperationKind::ArraySet {
                created_at,
                positioned_at,
                new_created_at,
                value,
            } => {
                rebind(created_at);
                rebind(positioned_at);
                rebind(new_created_at);
                rebind_value(value, &rebind_id);
            }
            OperationKind::Increase { .. } => {}
            OperationKind::Edit {
                from,
                to,
                max_created_at_map_by_actor,
                ..
            }
            | OperationKind::Style {
                from,
                to,
                max_created_at_map_by_actor,
                ..
            } => {
                rebind_id(&mut from.id);
                rebind_id(&mut to.id);
                rebind_map(max_created_at_map_by_actor);
            }
            OperationKind::Select { from, to } => {
                rebind_id(&mut from.id);
                rebind_id(&mut to.id);
            }
            OperationKind::TreeEdit {
                from,
                to,
                contents,
                max_created_at_map_by_actor,
            } => {
                rebind_tree_pos(from, &rebind_id);
                rebind_tree_pos(to, &rebind_id);
                for spec in contents {
                    rebind_spec(spec, &rebind_id);
                }
                rebind_map(max_created_at_map_by_actor);
            }
            OperationKind::TreeStyle {
                from,
                to,
                max_created_at_map_by_actor,
                ..
            } => {
                rebind_tree_pos(from, &rebind_id);
                rebind_tree_pos(to, &rebind_id);
                rebind_map(max_created_at_map_by_actor);
            }
        }
    }
}

fn rebind_tree_pos(pos: &mut CrdtTreePos, rebind: &dyn Fn(&mut NodeId)) {
    rebind(&mut pos.parent_id);
    rebind(&mut pos.left_sibling_id);
}

fn rebind_spec(spec: &mut TreeNodeSpec, rebind: &dyn Fn(&mut NodeId)) {
    rebind(&mut spec.id);
    for child in &mut spec.children {
        rebind_spec(child, rebind);
    }
}

fn rebind_value(value: &mut ElementValue, rebind: &dyn Fn(&mut NodeId)) {
    if let ElementValue::Tree(spec) = value {
        rebind_spec(spec, rebind);
    }
}
