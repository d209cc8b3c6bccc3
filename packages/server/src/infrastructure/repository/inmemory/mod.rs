mod queue_item;
mod room;

pub use queue_item::InMemoryQueueItemRepository;
pub use room::InMemoryRoomRepository;
