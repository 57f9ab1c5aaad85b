//! Plain values: what callers write into a document, and what undo
//! snapshots of removed or overwritten elements look like.

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use crate::crdt::counter::CounterValue;
use crate::crdt::element::ElementKind;
use crate::crdt::primitive::Primitive;
use crate::crdt::primitives::TimeTicket;
use crate::crdt::root::CrdtRoot;
use crate::crdt::tree::TreeValue;

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Primitive(Primitive),
    Counter(CounterValue),
    Object(BTreeMap<String, Value>),
    Array(Vec<Value>),
    /// Text runs as `(content, attributes)`.
    Text(Vec<(String, BTreeMap<String, String>)>),
    Tree(TreeValue),
}

impl Value {
    /// Snapshot the live content of an element.
    pub fn snapshot(root: &CrdtRoot, created_at: &TimeTicket) -> Option<Value> {
        let element = root.find(created_at)?;
        return Some(match &element.kind {
            ElementKind::Primitive(value) => Value::Primitive(value.clone()),
            ElementKind::Counter(value) => Value::Counter(*value),
            ElementKind::Object(object) => {
                let mut members = BTreeMap::new();
                for (key, owner) in object.owners() {
                    if root.find(&owner).is_some_and(|child| !child.is_removed()) {
                        if let Some(value) = Value::snapshot(root, &owner) {
                            members.insert(key.to_string(), value);
                        }
                    }
                }
                Value::Object(members)
            }
            ElementKind::Array(array) => Value::Array(
                array
                    .live()
                    .iter()
                    .filter_map(|child| Value::snapshot(root, child))
                    .collect(),
            ),
            ElementKind::Text(text) => Value::Text(text.runs()),
            ElementKind::Tree(tree) => Value::Tree(tree.to_value()),
        });
    }

    /// Scalars become primitives, arrays and objects become containers.
    pub fn from_json(value: &JsonValue) -> Value {
        return match value {
            JsonValue::Array(items) => Value::Array(items.iter().map(Value::from_json).collect()),
            JsonValue::Object(members) => Value::Object(
                members
                    .iter()
                    .map(|(key, value)| (key.clone(), Value::from_json(value)))
                    .collect(),
            ),
            scalar => Value::Primitive(Primitive::from_json_value(scalar).unwrap_or(Primitive::Null)),
        };
    }
}

impl From<Primitive> for Value {
    fn from(value: Primitive) -> Self {
        return Value::Primitive(value);
    }
}
