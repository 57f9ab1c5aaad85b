//! The working state of one local update.
//!
//! A context owns a copy of the root. Every mutation issues a ticket,
//! builds the operation, executes it against the copy so later reads in the
//! same update see it, and buffers it for the change. Dropping the context
//! discards everything.

use std::collections::BTreeMap;

use rustc_hash::FxHashSet;

use crate::Error;
use crate::Result;
use crate::change::ChangeId;
use crate::crdt::counter::CounterValue;
use crate::crdt::element::ElementKind;
use crate::crdt::op::ElementValue;
use crate::crdt::op::Operation;
use crate::crdt::op::OperationInfo;
use crate::crdt::op::OperationKind;
use crate::crdt::primitive::Primitive;
use crate::crdt::primitives::TimeTicket;
use crate::crdt::root::CrdtRoot;
use crate::crdt::tree::TreeNodeSpec;
use crate::crdt::tree::TreeValue;
use crate::document::history::Reverse;
use crate::document::value::Value;

pub struct ChangeContext {
    id: ChangeId,
    root: CrdtRoot,
    operations: Vec<Operation>,
    reverses: Vec<Reverse>,
    /// Elements created by this update. Edits inside them need no reversal
    /// of their own: reversing the creation covers them.
    created: FxHashSet<TimeTicket>,
    delimiter: u32,
}

impl ChangeContext {
    pub(crate) fn new(id: ChangeId, root: CrdtRoot) -> ChangeContext {
        return ChangeContext {
            id,
            root,
            operations: Vec::new(),
            reverses: Vec::new(),
            created: FxHashSet::default(),
            delimiter: 0,
        };
    }

    pub fn id(&self) -> &ChangeId {
        return &self.id;
    }

    /// The working root, with this update's mutations applied.
    pub fn root(&self) -> &CrdtRoot {
        return &self.root;
    }

    pub(crate) fn root_mut(&mut self) -> &mut CrdtRoot {
        return &mut self.root;
    }

    /// A ticket no other ticket of this document equals.
    pub fn issue_time_ticket(&mut self) -> TimeTicket {
        self.delimiter += 1;
        return self.id.create_time_ticket(self.delimiter);
    }

    pub fn has_operations(&self) -> bool {
        return !self.operations.is_empty();
    }

    pub(crate) fn into_parts(self) -> (ChangeId, CrdtRoot, Vec<Operation>, Vec<Reverse>) {
        return (self.id, self.root, self.operations, self.reverses);
    }

    fn push(&mut self, mut op: Operation) -> Result<Vec<OperationInfo>> {
        let infos = op.execute(&mut self.root, None)?;
        self.operations.push(op);
        return Ok(infos);
    }

    fn record(&mut self, target: &TimeTicket, reverse: Reverse) {
        if !self.created.contains(target) {
            self.reverses.push(reverse);
        }
    }

    fn is_alive(&self, created_at: &TimeTicket) -> bool {
        return self.root.find(created_at).is_some() && !self.root.is_garbage(created_at);
    }

    /// The live element owning `key`, if any.
    pub(crate) fn live_owner(&self, parent: TimeTicket, key: &str) -> Result<Option<TimeTicket>> {
        let owner = self.root.object(&parent)?.owner(key);
        return Ok(owner.filter(|owner| self.root.find(owner).is_some_and(|e| !e.is_removed())));
    }

    fn element_value(&mut self, value: &Value) -> ElementValue {
        return match value {
            Value::Primitive(primitive) => ElementValue::Primitive(primitive.clone()),
            Value::Counter(counter) => ElementValue::Counter(*counter),
            Value::Object(_) => ElementValue::Object,
            Value::Array(_) => ElementValue::Array,
            Value::Text(_) => ElementValue::Text,
            Value::Tree(tree) => ElementValue::Tree(tree.to_spec(&mut || self.issue_time_ticket())),
        };
    }

    /// Write the content of a freshly created container.
    fn fill(&mut self, created_at: TimeTicket, value: &Value) -> Result<()> {
        self.created.insert(created_at);
        match value {
            Value::Object(members) => {
                for (key, member) in members {
                    self.set_key(created_at, key, member)?;
                }
            }
            Value::Array(items) => {
                let mut prev = TimeTicket::INITIAL;
                for item in items {
                    prev = self.insert_after(created_at, prev, item)?;
                }
            }
            Value::Text(runs) => {
                let mut index = 0;
                for (content, attributes) in runs {
                    self.edit_text(created_at, index, index, content, attributes)?;
                    index += content.chars().count();
                }
            }
            Value::Primitive(_) | Value::Counter(_) | Value::Tree(_) => {}
        }
        return Ok(());
    }

    // ---- Objects ----

    pub(crate) fn set_key(&mut self, parent: TimeTicket, key: &str, value: &Value) -> Result<TimeTicket> {
        let previous = self.live_owner(parent, key)?;
        let reverse = match previous.and_then(|owner| Value::snapshot(&self.root, &owner)) {
            Some(old) => Reverse::SetKey {
                parent,
                key: key.to_string(),
                value: old,
            },
            None => Reverse::RemoveKey {
                parent,
                key: key.to_string(),
            },
        };

        let created_at = self.issue_time_ticket();
        let element = self.element_value(value);
        self.push(Operation::new(
            parent,
            created_at,
            OperationKind::Set {
                key: key.to_string(),
                value: element,
                created_at,
            },
        ))?;
        self.record(&parent, reverse);
        self.fill(created_at, value)?;
        return Ok(created_at);
    }

    /// Tombstone a child of an object or array. Removing something already
    /// removed does nothing.
    pub(crate) fn remove_child(&mut self, parent: TimeTicket, created_at: TimeTicket) -> Result<()> {
        if self.root.get(&created_at)?.is_removed() {
            return Ok(());
        }
        let reverse = match Value::snapshot(&self.root, &created_at) {
            Some(value) => match &self.root.get(&parent)?.kind {
                ElementKind::Object(object) => object.key_of(&created_at).map(|key| Reverse::SetKey {
                    parent,
                    key: key.to_string(),
                    value,
                }),
                ElementKind::Array(array) => {
                    let members = array.members();
                    let prev_created_at = members
                        .iter()
                        .position(|member| *member == created_at)
                        .and_then(|i| i.checked_sub(1))
                        .map(|i| members[i])
                        .unwrap_or(TimeTicket::INITIAL);
                    Some(Reverse::InsertElement {
                        parent,
                        prev_created_at,
                        value,
                    })
                }
                _ => None,
            },
            None => None,
        };

        let executed_at = self.issue_time_ticket();
        self.push(Operation::new(parent, executed_at, OperationKind::Remove { created_at }))?;
        if let Some(reverse) = reverse {
            self.record(&parent, reverse);
        }
        return Ok(());
    }

    // ---- Arrays ----

    /// Insert after the position `prev_positioned_at`. The new element is
    /// positioned at its creation ticket, which is returned.
    pub(crate) fn insert_after(
        &mut self,
        parent: TimeTicket,
        prev_positioned_at: TimeTicket,
        value: &Value,
    ) -> Result<TimeTicket> {
        let created_at = self.issue_time_ticket();
        let element = self.element_value(value);
        self.push(Operation::new(
            parent,
            created_at,
            OperationKind::Add {
                prev_positioned_at,
                created_at,
                value: element,
            },
        ))?;
        self.record(&parent, Reverse::RemoveElement { parent, created_at });
        self.fill(created_at, value)?;
        return Ok(created_at);
    }

    pub(crate) fn move_after(
        &mut self,
        parent: TimeTicket,
        prev_positioned_at: TimeTicket,
        created_at: TimeTicket,
    ) -> Result<()> {
        let executed_at = self.issue_time_ticket();
        self.push(Operation::new(
            parent,
            executed_at,
            OperationKind::Move {
                prev_positioned_at,
                created_at,
            },
        ))?;
        return Ok(());
    }

    /// Replace an array element. Not recorded for undo.
    pub(crate) fn replace(&mut self, parent: TimeTicket, target: TimeTicket, value: &Value) -> Result<TimeTicket> {
        let positioned_at = self
            .root
            .array(&parent)?
            .position_of(&target)
            .ok_or(Error::ElementNotFound(target))?;
        let new_created_at = self.issue_time_ticket();
        let element = self.element_value(value);
        self.push(Operation::new(
            parent,
            new_created_at,
            OperationKind::ArraySet {
                created_at: target,
                positioned_at,
                new_created_at,
                value: element,
            },
        ))?;
        self.fill(new_created_at, value)?;
        return Ok(new_created_at);
    }

    // ---- Counters ----

    pub(crate) fn increase(&mut self, counter: TimeTicket, delta: &Primitive) -> Result<()> {
        let executed_at = self.issue_time_ticket();
        self.push(Operation::new(
            counter,
            executed_at,
            OperationKind::Increase { value: delta.clone() },
        ))?;
        self.record(
            &counter,
            Reverse::Increase {
                counter,
                delta: CounterValue::negate(delta),
            },
        );
        return Ok(());
    }

    // ---- Text ----

    pub(crate) fn edit_text(
        &mut self,
        text: TimeTicket,
        from: usize,
        to: usize,
        content: &str,
        attributes: &BTreeMap<String, String>,
    ) -> Result<Vec<OperationInfo>> {
        let (from, to) = self.root.text_mut(&text)?.create_range(from, to)?;
        let executed_at = self.issue_time_ticket();
        return self.push(Operation::new(
            text,
            executed_at,
            OperationKind::Edit {
                from,
                to,
                content: content.to_string(),
                attributes: attributes.clone(),
                max_created_at_map_by_actor: None,
            },
        ));
    }

    pub(crate) fn style_text(
        &mut self,
        text: TimeTicket,
        from: usize,
        to: usize,
        attributes: &BTreeMap<String, String>,
    ) -> Result<Vec<OperationInfo>> {
        let (from, to) = self.root.text_mut(&text)?.create_range(from, to)?;
        let executed_at = self.issue_time_ticket();
        return self.push(Operation::new(
            text,
            executed_at,
            OperationKind::Style {
                from,
                to,
                attributes: attributes.clone(),
                max_created_at_map_by_actor: None,
            },
        ));
    }

    pub(crate) fn select_text(&mut self, text: TimeTicket, from: usize, to: usize) -> Result<Vec<OperationInfo>> {
        let (from, to) = self.root.text_mut(&text)?.create_range(from, to)?;
        let executed_at = self.issue_time_ticket();
        return self.push(Operation::new(text, executed_at, OperationKind::Select { from, to }));
    }

    // ---- Trees ----

    pub(crate) fn edit_tree(
        &mut self,
        tree: TimeTicket,
        from: usize,
        to: usize,
        contents: &[TreeValue],
    ) -> Result<Vec<OperationInfo>> {
        if from > to {
            return Err(Error::InvalidRange { from, to });
        }
        let crdt_tree = self.root.tree(&tree)?;
        let from_pos = crdt_tree.find_pos(from)?;
        let to_pos = crdt_tree.find_pos(to)?;

        // Concurrent inserts at one spot are ordered by the first node's
        // ticket, which must be the edit's own.
        let executed_at = self.issue_time_ticket();
        let mut first = Some(executed_at);
        let specs: Vec<TreeNodeSpec> = contents
            .iter()
            .map(|content| content.to_spec(&mut || first.take().unwrap_or_else(|| self.issue_time_ticket())))
            .collect();
        return self.push(Operation::new(
            tree,
            executed_at,
            OperationKind::TreeEdit {
                from: from_pos,
                to: to_pos,
                contents: specs,
                max_created_at_map_by_actor: None,
            },
        ));
    }

    pub(crate) fn style_tree(
        &mut self,
        tree: TimeTicket,
        from: usize,
        to: usize,
        attributes: &BTreeMap<String, String>,
        attributes_to_remove: &[String],
    ) -> Result<Vec<OperationInfo>> {
        if from > to {
            return Err(Error::InvalidRange { from, to });
        }
        let crdt_tree = self.root.tree(&tree)?;
        let from_pos = crdt_tree.find_pos(from)?;
        let to_pos = crdt_tree.find_pos(to)?;
        let executed_at = self.issue_time_ticket();
        return self.push(Operation::new(
            tree,
            executed_at,
            OperationKind::TreeStyle {
                from: from_pos,
                to: to_pos,
                attributes: attributes.clone(),
                attributes_to_remove: attributes_to_remove.to_vec(),
                max_created_at_map_by_actor: None,
            },
        ));
    }

    // ---- History ----

    /// Replay one reversal step. Steps whose target is gone are skipped.
    pub(crate) fn apply_reverse(&mut self, reverse: &Reverse) -> Result<()> {
        match reverse {
            Reverse::SetKey { parent, key, value } => {
                if self.is_alive(parent) {
                    self.set_key(*parent, key, value)?;
                }
            }
            Reverse::RemoveKey { parent, key } => {
                if self.is_alive(parent) {
                    if let Some(owner) = self.live_owner(*parent, key)? {
                        self.remove_child(*parent, owner)?;
                    }
                }
            }
            Reverse::RemoveElement { parent, created_at } => {
                if self.is_alive(parent) && self.is_alive(created_at) {
                    self.remove_child(*parent, *created_at)?;
                }
            }
            Reverse::InsertElement {
                parent,
                prev_created_at,
                value,
            } => {
                if self.is_alive(parent) {
                    let array = self.root.array(parent)?;
                    let anchor = match array.position_of(prev_created_at) {
                        Some(positioned_at) if array.contains(prev_created_at) => positioned_at,
                        _ => TimeTicket::INITIAL,
                    };
                    self.insert_after(*parent, anchor, value)?;
                }
            }
            Reverse::Increase { counter, delta } => {
                if self.is_alive(counter) {
                    self.increase(*counter, delta)?;
                }
            }
        }
        return Ok(());
    }

    /// Apply a whole history entry, newest step first.
    pub(crate) fn apply_reverses(&mut self, entry: &[Reverse]) -> Result<()> {
        for step in entry.iter().rev() {
            self.apply_reverse(step)?;
        }
        return Ok(());
    }
}
