//! UseCase: ルーム作成

use std::sync::Arc;

use utage_shared::time::Clock;
use uuid::Uuid;

use crate::domain::{
    Participant, Role, Room, RoomIdFactory, RoomRepository, RoomSettings, Timestamp, UserId,
};

use super::error::CreateRoomError;

/// ルーム作成のユースケース
pub struct CreateRoomUseCase {
    repository: Arc<dyn RoomRepository>,
    clock: Arc<dyn Clock>,
}

impl CreateRoomUseCase {
    pub fn new(repository: Arc<dyn RoomRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// ルームを作成し、作成者を HOST として参加させる
    ///
    /// 名前を省略した場合は `Room xxxxxx` を割り当てる。
    pub async fn execute(
        &self,
        host_id: UserId,
        name: Option<String>,
        settings: Option<RoomSettings>,
    ) -> Result<Room, CreateRoomError> {
        let name = match name {
            Some(name) if name.trim().is_empty() => return Err(CreateRoomError::EmptyName),
            Some(name) => name.trim().to_string(),
            None => default_room_name(),
        };

        let now = Timestamp::new(self.clock.now_millis());
        let room = Room::new(
            RoomIdFactory::generate()?,
            name,
            host_id.clone(),
            settings.unwrap_or_default(),
            now,
        );
        let host = Participant::new(room.id.clone(), host_id, Role::Host, now);
        self.repository.create_room(room.clone(), host).await?;

        tracing::info!(room_id = room.id.as_str(), "Room '{}' created", room.name);
        Ok(room)
    }
}

fn default_room_name() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("Room {}", &suffix[..6])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repository::InMemoryRoomRepository;
    use utage_shared::time::FixedClock;

    fn create_usecase() -> (CreateRoomUseCase, Arc<InMemoryRoomRepository>) {
        let repository = Arc::new(InMemoryRoomRepository::new());
        let usecase = CreateRoomUseCase::new(repository.clone(), Arc::new(FixedClock::new(1_000)));
        (usecase, repository)
    }

    #[tokio::test]
    async fn test_create_room_registers_host() {
        // テスト項目: 作成者が HOST として参加者に登録される
        // given (前提条件):
        let (usecase, repository) = create_usecase();
        let alice = UserId::new("alice".to_string()).unwrap();

        // when (操作):
        let room = usecase
            .execute(alice.clone(), Some("  Friday  ".to_string()), None)
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(room.name, "Friday");
        assert_eq!(room.host_id, alice);
        assert!(room.is_active);
        assert_eq!(room.created_at.value(), 1_000);
        let host = repository
            .get_participant(&room.id, &alice)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(host.role, Role::Host);
    }

    #[tokio::test]
    async fn test_create_room_assigns_default_name() {
        // テスト項目: 名前を省略すると `Room xxxxxx` が割り当てられる
        // given (前提条件):
        let (usecase, _) = create_usecase();

        // when (操作):
        let room = usecase
            .execute(UserId::new("alice".to_string()).unwrap(), None, None)
            .await
            .unwrap();

        // then (期待する結果):
        assert!(room.name.starts_with("Room "));
        assert_eq!(room.name.len(), "Room ".len() + 6);
    }

    #[tokio::test]
    async fn test_create_room_rejects_blank_name() {
        // テスト項目: 空白だけの名前は拒否される
        // given (前提条件):
        let (usecase, _) = create_usecase();

        // when (操作):
        let result = usecase
            .execute(UserId::new("alice".to_string()).unwrap(), Some("   ".to_string()), None)
            .await;

        // then (期待する結果):
        assert_eq!(result, Err(CreateRoomError::EmptyName));
    }
}
