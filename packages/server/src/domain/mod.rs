//! Domain layer: entities, value objects and the interfaces the outer layers implement.
//!
//! The domain owns the traits for every collaborator (persistence, shared store,
//! room broadcast, metadata lookup); infrastructure provides the concrete
//! implementations (dependency inversion).

pub mod broadcaster;
pub mod entity;
pub mod error;
pub mod event;
pub mod metadata;
pub mod repository;
pub mod store;
pub mod value_object;

pub use broadcaster::{PusherChannel, RoomBroadcaster};
pub use entity::{
    Job, Participant, PlaybackState, PlaybackStatus, PlayerAction, PlayerCommand, QueueItem,
    QueueItemStatus, Role, Room, RoomSettings, WorkerMetricsSnapshot, WorkerRecord, WorkerStatus,
};
pub use error::{
    MessagePushError, MetadataError, RepositoryError, StoreError, TransitionError,
    ValueObjectError,
};
pub use event::{QueueUpdateKind, RoomEvent};
pub use metadata::{MetadataLookup, VideoMetadata};
pub use repository::{QueueItemRepository, RoomRepository};
pub use store::{ControlStore, JobQueue, RateLimitStore, WorkerRegistry};
pub use value_object::{
    ConnectionId, ItemId, RoomId, RoomIdFactory, Timestamp, UserId, VideoId, WorkerId,
};
