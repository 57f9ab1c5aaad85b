//! JSON arrays.

use serde::Deserialize;
use serde::Serialize;

use super::primitives::TimeTicket;
use super::rga_tree_list::RgaTreeList;
use crate::Result;

/// Ordered element tickets. The elements themselves live in the root arena.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CrdtArray {
    list: RgaTreeList,
}

impl CrdtArray {
    pub fn new() -> CrdtArray {
        return CrdtArray::default();
    }

    /// Number of live elements.
    pub fn len(&self) -> usize {
        return self.list.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.list.is_empty();
    }

    pub fn contains(&self, created_at: &TimeTicket) -> bool {
        return self.list.contains(created_at);
    }

    /// True when a position named `positioned_at` exists in the sequence.
    pub fn contains_position(&self, positioned_at: &TimeTicket) -> bool {
        return self.list.contains_position(positioned_at);
    }

    /// Where the element sits now: the ticket of its insert or latest move.
    pub fn position_of(&self, created_at: &TimeTicket) -> Option<TimeTicket> {
        return self.list.position_of(created_at);
    }

    pub fn insert_after(
        &mut self,
        prev_positioned_at: TimeTicket,
        created_at: TimeTicket,
        executed_at: TimeTicket,
    ) -> Result<()> {
        return self.list.insert_after(prev_positioned_at, created_at, executed_at);
    }

    pub fn move_after(
        &mut self,
        prev_positioned_at: TimeTicket,
        created_at: TimeTicket,
        executed_at: TimeTicket,
    ) -> Result<bool> {
        return self.list.move_after(prev_positioned_at, created_at, executed_at);
    }

    pub fn set_removed(&mut self, created_at: &TimeTicket) -> Result<()> {
        return self.list.set_removed(created_at, true);
    }

    pub fn get(&mut self, index: usize) -> Option<TimeTicket> {
        return self.list.get_by_index(index);
    }

    pub fn index_of(&self, created_at: &TimeTicket) -> Option<usize> {
        return self.list.index_of(created_at);
    }

    /// The position to insert after so a new element lands at `index`.
    pub fn prev_for_index(&mut self, index: usize) -> Result<TimeTicket> {
        return self.list.prev_position_for_index(index);
    }

    /// Last position in the sequence, live or not; `INITIAL` when empty.
    pub fn last_position(&self) -> TimeTicket {
        return self.list.last_position();
    }

    /// All element tickets in order, tombstones included.
    pub fn members(&self) -> Vec<TimeTicket> {
        return self.list.iter().map(|(ticket, _)| ticket).collect();
    }

    pub fn live(&self) -> Vec<TimeTicket> {
        return self.list.live().collect();
    }

    pub fn purge(&mut self, created_at: &TimeTicket) -> Result<()> {
        return self.list.purge(created_at);
    }
}
