//! The element family: every value a document can hold.

use serde::Deserialize;
use serde::Serialize;

use super::array::CrdtArray;
use super::counter::CounterValue;
use super::object::CrdtObject;
use super::primitive::Primitive;
use super::primitives::TimeTicket;
use super::size::DataSize;
use super::text::CrdtText;
use super::tree::CrdtTree;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ElementKind {
    Primitive(Primitive),
    Counter(CounterValue),
    Object(CrdtObject),
    Array(CrdtArray),
    Text(CrdtText),
    Tree(CrdtTree),
}

impl ElementKind {
    pub fn type_name(&self) -> &'static str {
        return match self {
            ElementKind::Primitive(_) => "primitive",
            ElementKind::Counter(_) => "counter",
            ElementKind::Object(_) => "object",
            ElementKind::Array(_) => "array",
            ElementKind::Text(_) => "text",
            ElementKind::Tree(_) => "tree",
        };
    }

    /// Objects and arrays hold other elements.
    pub fn is_container(&self) -> bool {
        return matches!(self, ElementKind::Object(_) | ElementKind::Array(_));
    }
}

/// An element with its identity and tombstone.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Element {
    created_at: TimeTicket,
    moved_at: Option<TimeTicket>,
    removed_at: Option<TimeTicket>,
    pub kind: ElementKind,
}

impl Element {
    pub fn new(created_at: TimeTicket, kind: ElementKind) -> Element {
        return Element {
            created_at,
            moved_at: None,
            removed_at: None,
            kind,
        };
    }

    pub fn created_at(&self) -> TimeTicket {
        return self.created_at;
    }

    pub fn moved_at(&self) -> Option<TimeTicket> {
        return self.moved_at;
    }

    pub fn removed_at(&self) -> Option<TimeTicket> {
        return self.removed_at;
    }

    pub fn is_removed(&self) -> bool {
        return self.removed_at.is_some();
    }

    /// When the element last took its place: creation or latest move.
    pub fn positioned_at(&self) -> TimeTicket {
        return self.moved_at.unwrap_or(self.created_at);
    }

    pub fn set_moved_at(&mut self, moved_at: TimeTicket) {
        self.moved_at = Some(moved_at);
    }

    /// Tombstone at `removed_at`. The newest removal wins, so replaying
    /// the same or an older removal changes nothing. Returns true when
    /// the tombstone changed.
    pub fn remove(&mut self, removed_at: TimeTicket) -> bool {
        let newer = match self.removed_at {
            Some(current) => removed_at.after(&current),
            None => true,
        };
        if newer {
            self.removed_at = Some(removed_at);
        }
        return newer;
    }

    /// Meta size of the tickets this element carries.
    pub fn header_size(&self) -> DataSize {
        let tickets = 1 + self.moved_at.is_some() as usize + self.removed_at.is_some() as usize;
        return DataSize::tickets(tickets);
    }
}
