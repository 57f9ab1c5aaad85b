//! Collaborative rich text.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as JsonValue;
use serde_json::json;

use super::DeleteGuard;
use super::MaxCreatedAtMap;
use super::primitives::ActorId;
use super::primitives::GcBoundary;
use super::primitives::TimeTicket;
use super::rga_tree_split::EditOutcome;
use super::rga_tree_split::RgaTreeSplit;
use super::rga_tree_split::TextChange;
use super::rga_tree_split::TextPos;
use super::size::DocSize;
use crate::Error;
use crate::Result;

/// A selection made by one actor. Not part of the content.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub from: TextPos,
    pub to: TextPos,
    pub updated_at: TimeTicket,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CrdtText {
    rga: RgaTreeSplit,
    selections: BTreeMap<ActorId, Selection>,
}

impl CrdtText {
    pub fn new() -> CrdtText {
        return CrdtText::default();
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        return self.rga.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.rga.is_empty();
    }

    /// Positions for the index range `from..to`.
    pub fn create_range(&mut self, from: usize, to: usize) -> Result<(TextPos, TextPos)> {
        if from > to {
            return Err(Error::InvalidRange { from, to });
        }
        if to > self.len() {
            return Err(Error::IndexOutOfRange { index: to, len: self.len() });
        }
        return Ok((self.rga.index_to_pos(from)?, self.rga.index_to_pos(to)?));
    }

    pub fn edit(
        &mut self,
        range: (&TextPos, &TextPos),
        content: &str,
        attributes: &BTreeMap<String, String>,
        executed_at: TimeTicket,
        guard: DeleteGuard<'_>,
    ) -> Result<EditOutcome> {
        let outcome = self.rga.edit(range.0, range.1, content, attributes, executed_at, guard)?;
        // Editing moves the editor's caret to the end of the new content.
        self.selections.insert(
            executed_at.actor(),
            Selection {
                from: outcome.caret,
                to: outcome.caret,
                updated_at: executed_at,
            },
        );
        return Ok(outcome);
    }

    pub fn style(
        &mut self,
        range: (&TextPos, &TextPos),
        attributes: &BTreeMap<String, String>,
        executed_at: TimeTicket,
        guard: DeleteGuard<'_>,
    ) -> Result<(Vec<TextChange>, MaxCreatedAtMap)> {
        return self.rga.style(range.0, range.1, attributes, executed_at, guard);
    }

    /// Record the selection of `executed_at`'s actor, unless a newer one
    /// is already recorded. Returns the selected index range when it took.
    pub fn select(
        &mut self,
        range: (&TextPos, &TextPos),
        executed_at: TimeTicket,
    ) -> Result<Option<(usize, usize)>> {
        let actor = executed_at.actor();
        if let Some(prev) = self.selections.get(&actor) {
            if !executed_at.after(&prev.updated_at) {
                return Ok(None);
            }
        }
        let from = self.rga.pos_to_index(range.0)?;
        let to = self.rga.pos_to_index(range.1)?;
        self.selections.insert(
            actor,
            Selection {
                from: *range.0,
                to: *range.1,
                updated_at: executed_at,
            },
        );
        return Ok(Some((from, to)));
    }

    /// Current selection of `actor` as an index range.
    pub fn selection(&self, actor: &ActorId) -> Option<(usize, usize)> {
        let selection = self.selections.get(actor)?;
        let from = self.rga.pos_to_index(&selection.from).ok()?;
        let to = self.rga.pos_to_index(&selection.to).ok()?;
        return Some((from, to));
    }

    pub fn index_of(&self, pos: &TextPos) -> Result<usize> {
        return self.rga.pos_to_index(pos);
    }

    /// Live runs as `(content, attributes)`.
    pub fn runs(&self) -> Vec<(String, BTreeMap<String, String>)> {
        return self
            .rga
            .runs()
            .map(|(content, attrs)| (content.to_string(), attrs.to_map()))
            .collect();
    }

    /// Runs as `[{"attrs": {...}, "val": "..."}]`, `attrs` omitted when empty.
    pub fn to_json_value(&self) -> JsonValue {
        let runs = self
            .rga
            .runs()
            .map(|(content, attrs)| {
                if attrs.is_empty() {
                    json!({ "val": content })
                } else {
                    json!({ "attrs": attrs.to_map(), "val": content })
                }
            })
            .collect();
        return JsonValue::Array(runs);
    }

    pub fn doc_size(&self) -> DocSize {
        return self.rga.doc_size();
    }

    pub fn compute_size(&self) -> DocSize {
        return self.rga.compute_size();
    }

    pub fn removed_count(&self) -> usize {
        return self.rga.removed_count();
    }

    pub fn purge(&mut self, boundary: &dyn GcBoundary) -> usize {
        return self.rga.purge(boundary);
    }
}

impl std::fmt::Display for CrdtText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (content, _) in self.rga.runs() {
            f.write_str(content)?;
        }
        return Ok(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket(lamport: u64, who: u8) -> TimeTicket {
        let mut bytes = [0u8; 12];
        bytes[11] = who;
        return TimeTicket::new(lamport, 0, ActorId::new(bytes));
    }

    fn edit(text: &mut CrdtText, from: usize, to: usize, content: &str, attrs: &[(&str, &str)], at: TimeTicket) {
        let (from, to) = text.create_range(from, to).unwrap();
        let attrs = attrs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        text.edit((&from, &to), content, &attrs, at, DeleteGuard::Local).unwrap();
    }

    #[test]
    fn styled_replacement_produces_runs() {
        let mut text = CrdtText::new();
        edit(&mut text, 0, 0, "Hello World", &[], ticket(1, 1));
        edit(&mut text, 6, 11, "Yorkie", &[("b", "1")], ticket(2, 1));

        assert_eq!(text.to_string(), "Hello Yorkie");
        assert_eq!(
            text.to_json_value(),
            json!([{ "val": "Hello " }, { "attrs": { "b": "1" }, "val": "Yorkie" }])
        );
    }

    #[test]
    fn range_validation() {
        let mut text = CrdtText::new();
        assert!(matches!(text.create_range(1, 0), Err(Error::InvalidRange { .. })));
        assert!(matches!(text.create_range(0, 1), Err(Error::IndexOutOfRange { .. })));
    }

    #[test]
    fn newer_selection_wins() {
        let mut text = CrdtText::new();
        edit(&mut text, 0, 0, "abcdef", &[], ticket(1, 1));

        let (from, to) = text.create_range(1, 3).unwrap();
        assert_eq!(text.select((&from, &to), ticket(3, 2)).unwrap(), Some((1, 3)));

        let (from, to) = text.create_range(0, 0).unwrap();
        assert_eq!(text.select((&from, &to), ticket(2, 2)).unwrap(), None);
        assert_eq!(text.selection(&ticket(0, 2).actor()), Some((1, 3)));

        // Selections follow the content.
        edit(&mut text, 0, 0, "zz", &[], ticket(4, 1));
        assert_eq!(text.selection(&ticket(0, 2).actor()), Some((3, 5)));
        assert_eq!(text.to_string(), "zzabcdef");
    }
}
