//! Shared application state.

use std::{net::IpAddr, sync::Arc};

use utage_shared::time::Clock;

use crate::{
    config::ServerConfig,
    domain::{QueueItemRepository, RoomBroadcaster, RoomRepository},
    usecase::{
        AddQueueItemUseCase, AdvanceQueueUseCase, CloseRoomUseCase, CreateRoomUseCase,
        GetHealthUseCase, GetRoomDetailUseCase, GetRoomsUseCase, JoinRoomUseCase,
        LeaveRoomUseCase, RelayPlayerCommandUseCase, RemoveQueueItemUseCase,
        ReorderQueueUseCase, RoomLockRegistry, RoomSync,
    },
    worker::{MetricsRegistry, WorkerStores},
};

/// Shared application state
pub struct AppState {
    pub create_room_usecase: Arc<CreateRoomUseCase>,
    pub get_rooms_usecase: Arc<GetRoomsUseCase>,
    pub get_room_detail_usecase: Arc<GetRoomDetailUseCase>,
    pub join_room_usecase: Arc<JoinRoomUseCase>,
    pub leave_room_usecase: Arc<LeaveRoomUseCase>,
    pub close_room_usecase: Arc<CloseRoomUseCase>,
    pub add_queue_item_usecase: Arc<AddQueueItemUseCase>,
    pub remove_queue_item_usecase: Arc<RemoveQueueItemUseCase>,
    pub reorder_queue_usecase: Arc<ReorderQueueUseCase>,
    pub advance_queue_usecase: Arc<AdvanceQueueUseCase>,
    pub relay_player_command_usecase: Arc<RelayPlayerCommandUseCase>,
    pub get_health_usecase: Arc<GetHealthUseCase>,
    /// 接続の登録・解除に使う
    pub broadcaster: Arc<dyn RoomBroadcaster>,
    /// `/metrics` で出力するワーカーのメトリクス
    pub metrics: Arc<MetricsRegistry>,
    /// `/health` と `/metrics` を呼び出せる IP
    pub health_allowed_ips: Vec<IpAddr>,
}

impl AppState {
    /// 全ユースケースを組み立てる
    pub fn new(
        rooms: Arc<dyn RoomRepository>,
        items: Arc<dyn QueueItemRepository>,
        stores: &WorkerStores,
        room_locks: Arc<RoomLockRegistry>,
        room_sync: Arc<RoomSync>,
        clock: Arc<dyn Clock>,
        metrics: Arc<MetricsRegistry>,
        config: &ServerConfig,
    ) -> Self {
        Self {
            create_room_usecase: Arc::new(CreateRoomUseCase::new(rooms.clone(), clock.clone())),
            get_rooms_usecase: Arc::new(GetRoomsUseCase::new(rooms.clone())),
            get_room_detail_usecase: Arc::new(GetRoomDetailUseCase::new(
                rooms.clone(),
                items.clone(),
            )),
            join_room_usecase: Arc::new(JoinRoomUseCase::new(
                rooms.clone(),
                items.clone(),
                room_locks.clone(),
                room_sync.clone(),
            )),
            leave_room_usecase: Arc::new(LeaveRoomUseCase::new(
                rooms.clone(),
                room_locks.clone(),
                room_sync.clone(),
            )),
            close_room_usecase: Arc::new(CloseRoomUseCase::new(
                rooms.clone(),
                items.clone(),
                room_locks.clone(),
                room_sync.clone(),
            )),
            add_queue_item_usecase: Arc::new(AddQueueItemUseCase::new(
                rooms.clone(),
                items.clone(),
                stores.queue.clone(),
                room_locks.clone(),
                room_sync.clone(),
            )),
            remove_queue_item_usecase: Arc::new(RemoveQueueItemUseCase::new(
                rooms.clone(),
                items.clone(),
                room_locks.clone(),
                room_sync.clone(),
            )),
            reorder_queue_usecase: Arc::new(ReorderQueueUseCase::new(
                rooms.clone(),
                items.clone(),
                room_locks.clone(),
                room_sync.clone(),
            )),
            advance_queue_usecase: Arc::new(AdvanceQueueUseCase::new(
                rooms.clone(),
                items,
                room_locks,
                room_sync.clone(),
            )),
            relay_player_command_usecase: Arc::new(RelayPlayerCommandUseCase::new(
                rooms,
                room_sync.clone(),
            )),
            get_health_usecase: Arc::new(GetHealthUseCase::new(
                stores.queue.clone(),
                stores.registry.clone(),
                stores.control.clone(),
                clock,
                config.coordinator.heartbeat_timeout,
                config.health.backlog_threshold,
            )),
            broadcaster: room_sync.broadcaster().clone(),
            metrics,
            health_allowed_ips: config.health.allowed_ips.clone(),
        }
    }
}
