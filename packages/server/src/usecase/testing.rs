//! Fixtures shared by the use case tests.

use std::sync::Arc;

use tokio::sync::mpsc;
use utage_shared::time::ManualClock;

use crate::{
    domain::{
        ConnectionId, Participant, PlaybackStatus, QueueItem, QueueItemRepository,
        QueueItemStatus, Role, Room, RoomBroadcaster, RoomId, RoomRepository, RoomSettings,
        Timestamp, UserId, VideoId,
    },
    infrastructure::{
        broadcaster::WebSocketRoomBroadcaster,
        repository::{InMemoryQueueItemRepository, InMemoryRoomRepository},
        store::InMemoryStore,
    },
};

use super::{room_lock::RoomLockRegistry, room_sync::RoomSync};

pub(crate) struct RoomFixture {
    pub rooms: Arc<InMemoryRoomRepository>,
    pub items: Arc<InMemoryQueueItemRepository>,
    pub store: Arc<InMemoryStore>,
    pub broadcaster: Arc<WebSocketRoomBroadcaster>,
    pub clock: Arc<ManualClock>,
    pub locks: Arc<RoomLockRegistry>,
    pub sync: Arc<RoomSync>,
    pub room_id: RoomId,
    pub host: UserId,
    pub viewer: UserId,
}

/// A room with a HOST (`host`) and a VIEWER (`viewer`).
pub(crate) async fn room_fixture(settings: RoomSettings) -> RoomFixture {
    let clock = Arc::new(ManualClock::new(1_000));
    let rooms = Arc::new(InMemoryRoomRepository::new());
    let items = Arc::new(InMemoryQueueItemRepository::new());
    let store = Arc::new(InMemoryStore::new(clock.clone()));
    let broadcaster = Arc::new(WebSocketRoomBroadcaster::new(clock.clone()));
    let room_id = RoomId::new("room-1".to_string()).unwrap();
    let host = UserId::new("host".to_string()).unwrap();
    let viewer = UserId::new("viewer".to_string()).unwrap();
    let now = Timestamp::new(0);

    rooms
        .create_room(
            Room::new(room_id.clone(), "Room".to_string(), host.clone(), settings, now),
            Participant::new(room_id.clone(), host.clone(), Role::Host, now),
        )
        .await
        .unwrap();
    rooms
        .add_participant(Participant::new(room_id.clone(), viewer.clone(), Role::Viewer, now))
        .await
        .unwrap();

    let sync = Arc::new(RoomSync::new(items.clone(), broadcaster.clone(), clock.clone()));
    RoomFixture {
        rooms,
        items,
        store,
        broadcaster,
        clock,
        locks: Arc::new(RoomLockRegistry::new()),
        sync,
        room_id,
        host,
        viewer,
    }
}

impl RoomFixture {
    /// Append an item directly in the given state.
    pub async fn add_item(
        &self,
        video: &str,
        status: QueueItemStatus,
        playback: PlaybackStatus,
    ) -> QueueItem {
        let mut item = QueueItem::new(
            self.room_id.clone(),
            VideoId::new(video.to_string()).unwrap(),
            Some(video.to_string()),
            self.host.clone(),
            Timestamp::new(0),
        );
        item.status = status;
        item.playback = playback;
        self.items.append(item).await.unwrap()
    }

    /// Register a connection in the room and consume its snapshot.
    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<String> {
        let connection_id = ConnectionId::generate();
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.broadcaster
            .register_connection(connection_id.clone(), tx)
            .await;
        self.broadcaster
            .join(&self.room_id, &connection_id, self.queue().await)
            .await
            .unwrap();
        assert_eq!(next_frame(&mut rx).await["event"], "room-snapshot");
        rx
    }

    pub async fn queue(&self) -> Vec<QueueItem> {
        self.items.list_by_room(&self.room_id).await.unwrap()
    }

    pub async fn video_order(&self) -> Vec<String> {
        self.queue()
            .await
            .into_iter()
            .map(|item| item.video_id.as_str().to_string())
            .collect()
    }
}

/// Parse the next frame pushed to a subscriber.
pub(crate) async fn next_frame(rx: &mut mpsc::UnboundedReceiver<String>) -> serde_json::Value {
    serde_json::from_str(&rx.recv().await.unwrap()).unwrap()
}
