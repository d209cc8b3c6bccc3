//! UseCase: ルーム一覧取得

use std::sync::Arc;

use crate::domain::{RepositoryError, Room, RoomRepository, UserId};

/// ルーム一覧取得のユースケース
pub struct GetRoomsUseCase {
    repository: Arc<dyn RoomRepository>,
}

impl GetRoomsUseCase {
    pub fn new(repository: Arc<dyn RoomRepository>) -> Self {
        Self { repository }
    }

    /// 呼び出し元が参加しているアクティブなルーム（last_active の降順）
    pub async fn execute(&self, user_id: &UserId) -> Result<Vec<Room>, RepositoryError> {
        self.repository.list_active_rooms_for(user_id).await
    }
}
