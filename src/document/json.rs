//! Typed handles for editing a document inside `Document::update`.
//!
//! Each handle borrows the update's context and names one container by the
//! ticket it was created at. Writes become operations; reads see the
//! update's own writes.

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use crate::Error;
use crate::Result;
use crate::crdt::counter::CounterValue;
use crate::crdt::element::ElementKind;
use crate::crdt::primitive::Primitive;
use crate::crdt::primitives::TimeTicket;
use crate::crdt::tree::TreeValue;
use crate::document::context::ChangeContext;
use crate::document::value::Value;

fn expect_kind(ctx: &ChangeContext, created_at: &TimeTicket, expected: &'static str) -> Result<()> {
    let actual = ctx.root().get(created_at)?.kind.type_name();
    if actual != expected {
        return Err(Error::TypeMismatch { expected, actual });
    }
    return Ok(());
}

pub struct JsonObject<'a> {
    ctx: &'a mut ChangeContext,
    id: TimeTicket,
}

impl<'a> JsonObject<'a> {
    pub(crate) fn new(ctx: &'a mut ChangeContext, id: TimeTicket) -> JsonObject<'a> {
        return JsonObject { ctx, id };
    }

    pub fn id(&self) -> TimeTicket {
        return self.id;
    }

    pub fn set(&mut self, key: &str, value: impl Into<Primitive>) -> Result<()> {
        self.ctx.set_key(self.id, key, &Value::Primitive(value.into()))?;
        return Ok(());
    }

    pub fn set_value(&mut self, key: &str, value: &Value) -> Result<()> {
        self.ctx.set_key(self.id, key, value)?;
        return Ok(());
    }

    /// Write plain JSON. Objects and arrays become containers.
    pub fn set_json(&mut self, key: &str, value: &JsonValue) -> Result<()> {
        return self.set_value(key, &Value::from_json(value));
    }

    pub fn set_new_object(&mut self, key: &str) -> Result<JsonObject<'_>> {
        let id = self.ctx.set_key(self.id, key, &Value::Object(BTreeMap::new()))?;
        return Ok(JsonObject::new(self.ctx, id));
    }

    pub fn set_new_array(&mut self, key: &str) -> Result<JsonArray<'_>> {
        let id = self.ctx.set_key(self.id, key, &Value::Array(Vec::new()))?;
        return Ok(JsonArray::new(self.ctx, id));
    }

    pub fn set_new_text(&mut self, key: &str) -> Result<JsonText<'_>> {
        let id = self.ctx.set_key(self.id, key, &Value::Text(Vec::new()))?;
        return Ok(JsonText::new(self.ctx, id));
    }

    pub fn set_new_counter(&mut self, key: &str, initial: impl Into<Primitive>) -> Result<JsonCounter<'_>> {
        let counter = CounterValue::from_primitive(&initial.into())?;
        let id = self.ctx.set_key(self.id, key, &Value::Counter(counter))?;
        return Ok(JsonCounter::new(self.ctx, id));
    }

    pub fn set_new_tree(&mut self, key: &str, root: TreeValue) -> Result<JsonTree<'_>> {
        let id = self.ctx.set_key(self.id, key, &Value::Tree(root))?;
        return Ok(JsonTree::new(self.ctx, id));
    }

    /// Removing a missing key does nothing.
    pub fn remove(&mut self, key: &str) -> Result<()> {
        if let Some(owner) = self.ctx.live_owner(self.id, key)? {
            self.ctx.remove_child(self.id, owner)?;
        }
        return Ok(());
    }

    pub fn has(&self, key: &str) -> bool {
        return self.ctx.live_owner(self.id, key).ok().flatten().is_some();
    }

    /// Live keys in key order.
    pub fn keys(&self) -> Vec<String> {
        let root = self.ctx.root();
        let Ok(object) = root.object(&self.id) else {
            return Vec::new();
        };
        return object
            .owners()
            .filter(|(_, owner)| root.find(owner).is_some_and(|e| !e.is_removed()))
            .map(|(key, _)| key.to_string())
            .collect();
    }

    pub fn get(&self, key: &str) -> Option<JsonValue> {
        let owner = self.ctx.live_owner(self.id, key).ok()??;
        return Some(self.ctx.root().element_json(&owner));
    }

    fn child(&self, key: &str, expected: &'static str) -> Result<TimeTicket> {
        let owner = self
            .ctx
            .live_owner(self.id, key)?
            .ok_or_else(|| Error::InvalidPath(key.to_string()))?;
        expect_kind(&*self.ctx, &owner, expected)?;
        return Ok(owner);
    }

    pub fn get_object(&mut self, key: &str) -> Result<JsonObject<'_>> {
        let id = self.child(key, "object")?;
        return Ok(JsonObject::new(self.ctx, id));
    }

    pub fn get_array(&mut self, key: &str) -> Result<JsonArray<'_>> {
        let id = self.child(key, "array")?;
        return Ok(JsonArray::new(self.ctx, id));
    }

    pub fn get_text(&mut self, key: &str) -> Result<JsonText<'_>> {
        let id = self.child(key, "text")?;
        return Ok(JsonText::new(self.ctx, id));
    }

    pub fn get_counter(&mut self, key: &str) -> Result<JsonCounter<'_>> {
        let id = self.child(key, "counter")?;
        return Ok(JsonCounter::new(self.ctx, id));
    }

    pub fn get_tree(&mut self, key: &str) -> Result<JsonTree<'_>> {
        let id = self.child(key, "tree")?;
        return Ok(JsonTree::new(self.ctx, id));
    }

    pub fn to_json_value(&self) -> JsonValue {
        return self.ctx.root().element_json(&self.id);
    }
}

pub struct JsonArray<'a> {
    ctx: &'a mut ChangeContext,
    id: TimeTicket,
}

impl<'a> JsonArray<'a> {
    pub(crate) fn new(ctx: &'a mut ChangeContext, id: TimeTicket) -> JsonArray<'a> {
        return JsonArray { ctx, id };
    }

    pub fn id(&self) -> TimeTicket {
        return self.id;
    }

    /// Number of live elements.
    pub fn len(&self) -> usize {
        return self.ctx.root().array(&self.id).map(|array| array.len()).unwrap_or(0);
    }

    pub fn is_empty(&self) -> bool {
        return self.len() == 0;
    }

    fn element_at(&self, index: usize) -> Result<TimeTicket> {
        let live = self.ctx.root().array(&self.id)?.live();
        return live
            .get(index)
            .copied()
            .ok_or(Error::IndexOutOfRange { index, len: live.len() });
    }

    pub fn get(&self, index: usize) -> Option<JsonValue> {
        let created_at = self.element_at(index).ok()?;
        return Some(self.ctx.root().element_json(&created_at));
    }

    pub fn push(&mut self, value: impl Into<Primitive>) -> Result<TimeTicket> {
        return self.push_value(&Value::Primitive(value.into()));
    }

    pub fn push_value(&mut self, value: &Value) -> Result<TimeTicket> {
        let last = self.ctx.root().array(&self.id)?.last_position();
        return self.ctx.insert_after(self.id, last, value);
    }

    pub fn push_new_object(&mut self) -> Result<JsonObject<'_>> {
        let id = self.push_value(&Value::Object(BTreeMap::new()))?;
        return Ok(JsonObject::new(self.ctx, id));
    }

    pub fn push_new_array(&mut self) -> Result<JsonArray<'_>> {
        let id = self.push_value(&Value::Array(Vec::new()))?;
        return Ok(JsonArray::new(self.ctx, id));
    }

    pub fn push_new_text(&mut self) -> Result<JsonText<'_>> {
        let id = self.push_value(&Value::Text(Vec::new()))?;
        return Ok(JsonText::new(self.ctx, id));
    }

    /// Insert so the new element ends up at `index`.
    pub fn insert(&mut self, index: usize, value: impl Into<Primitive>) -> Result<TimeTicket> {
        return self.insert_value(index, &Value::Primitive(value.into()));
    }

    pub fn insert_value(&mut self, index: usize, value: &Value) -> Result<TimeTicket> {
        let len = self.len();
        if index > len {
            return Err(Error::IndexOutOfRange { index, len });
        }
        let prev = self.ctx.root_mut().array_mut(&self.id)?.prev_for_index(index)?;
        return self.ctx.insert_after(self.id, prev, value);
    }

    /// Insert right after the element created at `prev_created_at`.
    pub fn insert_after(&mut self, prev_created_at: TimeTicket, value: impl Into<Primitive>) -> Result<TimeTicket> {
        let prev = self.position_of(prev_created_at)?;
        return self.ctx.insert_after(self.id, prev, &Value::Primitive(value.into()));
    }

    pub fn remove(&mut self, index: usize) -> Result<()> {
        let created_at = self.element_at(index)?;
        return self.ctx.remove_child(self.id, created_at);
    }

    /// Replace the element at `index`.
    pub fn set(&mut self, index: usize, value: impl Into<Primitive>) -> Result<TimeTicket> {
        return self.set_value(index, &Value::Primitive(value.into()));
    }

    pub fn set_value(&mut self, index: usize, value: &Value) -> Result<TimeTicket> {
        let target = self.element_at(index)?;
        return self.ctx.replace(self.id, target, value);
    }

    /// Move the element at `index` to sit right after the one at `after`.
    pub fn move_after(&mut self, index: usize, after: usize) -> Result<()> {
        let created_at = self.element_at(index)?;
        let prev = self.element_at(after)?;
        if prev == created_at {
            return Ok(());
        }
        let prev = self.position_of(prev)?;
        return self.ctx.move_after(self.id, prev, created_at);
    }

    pub fn move_front(&mut self, index: usize) -> Result<()> {
        let created_at = self.element_at(index)?;
        return self.ctx.move_after(self.id, TimeTicket::INITIAL, created_at);
    }

    pub fn move_last(&mut self, index: usize) -> Result<()> {
        let created_at = self.element_at(index)?;
        let last = self.ctx.root().array(&self.id)?.last_position();
        if last == self.position_of(created_at)? {
            return Ok(());
        }
        return self.ctx.move_after(self.id, last, created_at);
    }

    /// Where the element created at `created_at` currently sits.
    fn position_of(&self, created_at: TimeTicket) -> Result<TimeTicket> {
        return self
            .ctx
            .root()
            .array(&self.id)?
            .position_of(&created_at)
            .ok_or(Error::ElementNotFound(created_at));
    }

    fn child(&self, index: usize, expected: &'static str) -> Result<TimeTicket> {
        let created_at = self.element_at(index)?;
        expect_kind(&*self.ctx, &created_at, expected)?;
        return Ok(created_at);
    }

    pub fn get_object(&mut self, index: usize) -> Result<JsonObject<'_>> {
        let id = self.child(index, "object")?;
        return Ok(JsonObject::new(self.ctx, id));
    }

    pub fn get_array(&mut self, index: usize) -> Result<JsonArray<'_>> {
        let id = self.child(index, "array")?;
        return Ok(JsonArray::new(self.ctx, id));
    }

    pub fn get_text(&mut self, index: usize) -> Result<JsonText<'_>> {
        let id = self.child(index, "text")?;
        return Ok(JsonText::new(self.ctx, id));
    }

    pub fn to_json_value(&self) -> JsonValue {
        return self.ctx.root().element_json(&self.id);
    }
}

pub struct JsonText<'a> {
    ctx: &'a mut ChangeContext,
    id: TimeTicket,
}

impl<'a> JsonText<'a> {
    pub(crate) fn new(ctx: &'a mut ChangeContext, id: TimeTicket) -> JsonText<'a> {
        return JsonText { ctx, id };
    }

    pub fn id(&self) -> TimeTicket {
        return self.id;
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        return self.ctx.root().text(&self.id).map(|text| text.len()).unwrap_or(0);
    }

    pub fn is_empty(&self) -> bool {
        return self.len() == 0;
    }

    /// Replace `[from, to)` with `content`.
    pub fn edit(&mut self, from: usize, to: usize, content: &str) -> Result<()> {
        return self.edit_with_attributes(from, to, content, &BTreeMap::new());
    }

    pub fn edit_with_attributes(
        &mut self,
        from: usize,
        to: usize,
        content: &str,
        attributes: &BTreeMap<String, String>,
    ) -> Result<()> {
        if from > to {
            return Err(Error::InvalidRange { from, to });
        }
        self.ctx.edit_text(self.id, from, to, content, attributes)?;
        return Ok(());
    }

    pub fn style(&mut self, from: usize, to: usize, attributes: &BTreeMap<String, String>) -> Result<()> {
        if from > to {
            return Err(Error::InvalidRange { from, to });
        }
        self.ctx.style_text(self.id, from, to, attributes)?;
        return Ok(());
    }

    /// Record this actor's selection.
    pub fn select(&mut self, from: usize, to: usize) -> Result<()> {
        self.ctx.select_text(self.id, from, to)?;
        return Ok(());
    }

    pub fn selection(&self) -> Option<(usize, usize)> {
        let actor = self.ctx.id().actor();
        return self.ctx.root().text(&self.id).ok()?.selection(&actor);
    }

    /// The visible characters.
    pub fn value(&self) -> String {
        let Ok(text) = self.ctx.root().text(&self.id) else {
            return String::new();
        };
        return text.runs().into_iter().map(|(content, _)| content).collect();
    }

    pub fn to_json_value(&self) -> JsonValue {
        return self.ctx.root().element_json(&self.id);
    }
}

pub struct JsonCounter<'a> {
    ctx: &'a mut ChangeContext,
    id: TimeTicket,
}

impl<'a> JsonCounter<'a> {
    pub(crate) fn new(ctx: &'a mut ChangeContext, id: TimeTicket) -> JsonCounter<'a> {
        return JsonCounter { ctx, id };
    }

    pub fn id(&self) -> TimeTicket {
        return self.id;
    }

    pub fn increase(&mut self, delta: impl Into<Primitive>) -> Result<()> {
        let delta = delta.into();
        if !delta.is_numeric() {
            return Err(Error::TypeMismatch {
                expected: "number",
                actual: delta.type_name(),
            });
        }
        return self.ctx.increase(self.id, &delta);
    }

    pub fn value(&self) -> Option<Primitive> {
        return match &self.ctx.root().find(&self.id)?.kind {
            ElementKind::Counter(counter) => Some(counter.to_primitive()),
            _ => None,
        };
    }
}

pub struct JsonTree<'a> {
    ctx: &'a mut ChangeContext,
    id: TimeTicket,
}

impl<'a> JsonTree<'a> {
    pub(crate) fn new(ctx: &'a mut ChangeContext, id: TimeTicket) -> JsonTree<'a> {
        return JsonTree { ctx, id };
    }

    pub fn id(&self) -> TimeTicket {
        return self.id;
    }

    /// Content size in index tokens.
    pub fn size(&self) -> usize {
        return self.ctx.root().tree(&self.id).map(|tree| tree.size()).unwrap_or(0);
    }

    /// Replace the flat range `[from, to)` with `contents`.
    pub fn edit(&mut self, from: usize, to: usize, contents: &[TreeValue]) -> Result<()> {
        self.ctx.edit_tree(self.id, from, to, contents)?;
        return Ok(());
    }

    pub fn edit_by_path(&mut self, from: &[usize], to: &[usize], contents: &[TreeValue]) -> Result<()> {
        let from = self.path_to_index(from)?;
        let to = self.path_to_index(to)?;
        return self.edit(from, to, contents);
    }

    pub fn style(&mut self, from: usize, to: usize, attributes: &BTreeMap<String, String>) -> Result<()> {
        self.ctx.style_tree(self.id, from, to, attributes, &[])?;
        return Ok(());
    }

    pub fn remove_style(&mut self, from: usize, to: usize, keys: &[&str]) -> Result<()> {
        let keys: Vec<String> = keys.iter().map(|key| key.to_string()).collect();
        self.ctx.style_tree(self.id, from, to, &BTreeMap::new(), &keys)?;
        return Ok(());
    }

    pub fn index_to_path(&self, index: usize) -> Result<Vec<usize>> {
        return self.ctx.root().tree(&self.id)?.index_to_path(index);
    }

    pub fn path_to_index(&self, path: &[usize]) -> Result<usize> {
        return self.ctx.root().tree(&self.id)?.path_to_index(path);
    }

    pub fn to_xml(&self) -> String {
        return self.ctx.root().tree(&self.id).map(|tree| tree.to_xml()).unwrap_or_default();
    }

    pub fn to_json_value(&self) -> JsonValue {
        return self.ctx.root().element_json(&self.id);
    }
}
