//! Room events published to the connections of a room.
//!
//! The wire encoding of these events lives in the infrastructure layer.

use super::{ItemId, QueueItem};

/// Mutation that produced a queue update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueUpdateKind {
    Add,
    Remove,
    Update,
    Reorder,
}

/// Event fanned out to every connection of a room
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    /// The full ordered queue after a mutation
    QueueUpdated {
        kind: QueueUpdateKind,
        items: Vec<QueueItem>,
    },
    /// A failure the room should see, optionally tied to one item
    Error {
        message: String,
        item_id: Option<ItemId>,
    },
}
