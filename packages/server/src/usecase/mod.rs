//! UseCase 層
//!
//! HTTP と WebSocket の両方から同じユースケースを呼び出す。
//! 同じルームへの変更はルームごとのロックで直列化される。

pub mod add_queue_item;
pub mod advance_queue;
pub mod close_room;
pub mod create_room;
pub mod error;
pub mod get_health;
pub mod get_room_detail;
pub mod get_rooms;
pub mod join_room;
pub mod leave_room;
mod membership;
pub mod relay_player_command;
pub mod remove_queue_item;
pub mod reorder_queue;
pub mod room_lock;
pub mod room_sync;
#[cfg(test)]
pub(crate) mod testing;

pub use add_queue_item::AddQueueItemUseCase;
pub use advance_queue::{AdvanceQueueUseCase, AdvanceReason};
pub use close_room::CloseRoomUseCase;
pub use create_room::CreateRoomUseCase;
pub use error::{
    CloseRoomError, CreateRoomError, GetRoomDetailError, JoinRoomError, PlayerCommandError,
    QueueMutationError,
};
pub use get_health::{GetHealthUseCase, HealthReport};
pub use get_room_detail::{GetRoomDetailUseCase, RoomDetail};
pub use get_rooms::GetRoomsUseCase;
pub use join_room::JoinRoomUseCase;
pub use leave_room::{LeaveOutcome, LeaveRoomUseCase};
pub use relay_player_command::RelayPlayerCommandUseCase;
pub use remove_queue_item::RemoveQueueItemUseCase;
pub use reorder_queue::ReorderQueueUseCase;
pub use room_lock::RoomLockRegistry;
pub use room_sync::RoomSync;
