//! Byte accounting for document size limits.
//!
//! Every element, text run, tree node and attribute contributes a data part
//! (the user payload) and a meta part (the tickets that identify it). Live
//! content counts toward `live`, tombstones toward `gc`.

use std::ops::AddAssign;
use std::ops::SubAssign;

use serde::Deserialize;
use serde::Serialize;

use super::primitives::TIME_TICKET_SIZE;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSize {
    pub data: usize,
    pub meta: usize,
}

impl DataSize {
    pub const fn new(data: usize, meta: usize) -> DataSize {
        return DataSize { data, meta };
    }

    /// Meta size of `count` tickets.
    pub const fn tickets(count: usize) -> DataSize {
        return DataSize { data: 0, meta: count * TIME_TICKET_SIZE };
    }

    pub fn total(&self) -> usize {
        return self.data + self.meta;
    }

    pub fn is_zero(&self) -> bool {
        return self.data == 0 && self.meta == 0;
    }
}

impl AddAssign for DataSize {
    fn add_assign(&mut self, other: DataSize) {
        self.data += other.data;
        self.meta += other.meta;
    }
}

impl SubAssign for DataSize {
    fn sub_assign(&mut self, other: DataSize) {
        debug_assert!(self.data >= other.data && self.meta >= other.meta, "size underflow");
        self.data = self.data.saturating_sub(other.data);
        self.meta = self.meta.saturating_sub(other.meta);
    }
}

/// Size of a document or of one part of it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocSize {
    pub live: DataSize,
    pub gc: DataSize,
}

impl DocSize {
    /// Count `size` as live when `removed` is false, as garbage otherwise.
    pub fn add(&mut self, size: DataSize, removed: bool) {
        if removed {
            self.gc += size;
        } else {
            self.live += size;
        }
    }

    pub fn sub(&mut self, size: DataSize, removed: bool) {
        if removed {
            self.gc -= size;
        } else {
            self.live -= size;
        }
    }

    /// Everything, regardless of liveness.
    pub fn combined(&self) -> DataSize {
        let mut size = self.live;
        size += self.gc;
        return size;
    }
}

impl AddAssign for DocSize {
    fn add_assign(&mut self, other: DocSize) {
        self.live += other.live;
        self.gc += other.gc;
    }
}

impl SubAssign for DocSize {
    fn sub_assign(&mut self, other: DocSize) {
        self.live -= other.live;
        self.gc -= other.gc;
    }
}

/// Data size of a string: two bytes per UTF-16 code unit.
pub fn string_size(text: &str) -> usize {
    return text.encode_utf16().count() * 2;
}
