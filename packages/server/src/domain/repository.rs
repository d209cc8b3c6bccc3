//! Repository trait 定義
//!
//! ドメイン層が必要とするデータアクセスのインターフェースを定義します。
//! 具体的な実装は Infrastructure 層が提供します（依存性の逆転）。

use async_trait::async_trait;

use super::{
    ItemId, Participant, QueueItem, RepositoryError, Room, RoomId, Timestamp, UserId,
};

/// Room Repository trait
///
/// Room と参加者 (Participant) の永続化インターフェース。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoomRepository: Send + Sync {
    /// Room を作成（ホストは HOST として参加者に登録される）
    async fn create_room(&self, room: Room, host: Participant) -> Result<(), RepositoryError>;

    /// Room を取得
    async fn get_room(&self, room_id: &RoomId) -> Result<Room, RepositoryError>;

    /// 指定ユーザーが参加しているアクティブな Room 一覧（last_active の降順）
    async fn list_active_rooms_for(&self, user_id: &UserId) -> Result<Vec<Room>, RepositoryError>;

    /// Room のアクティブ状態を更新
    async fn set_active(&self, room_id: &RoomId, is_active: bool) -> Result<(), RepositoryError>;

    /// last_active を更新
    async fn touch(&self, room_id: &RoomId, at: Timestamp) -> Result<(), RepositoryError>;

    /// 参加者を追加（既に参加済みなら既存の参加者を返す）
    async fn add_participant(&self, participant: Participant) -> Result<Participant, RepositoryError>;

    /// 参加者を削除
    async fn remove_participant(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
    ) -> Result<(), RepositoryError>;

    /// 参加者を取得
    async fn get_participant(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
    ) -> Result<Option<Participant>, RepositoryError>;

    /// Room の参加者一覧
    async fn get_participants(&self, room_id: &RoomId) -> Result<Vec<Participant>, RepositoryError>;

    /// Room の参加者数
    async fn count_participants(&self, room_id: &RoomId) -> Result<usize, RepositoryError>;
}

/// QueueItem Repository trait
///
/// 位置 (position) の書き換えは全てアトミックに行われ、成功した変更の後は
/// 常に 0..n-1 の連続した並びになる。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueueItemRepository: Send + Sync {
    /// position 順に Room のキューを取得
    async fn list_by_room(&self, room_id: &RoomId) -> Result<Vec<QueueItem>, RepositoryError>;

    /// 項目を取得
    async fn get(&self, item_id: &ItemId) -> Result<Option<QueueItem>, RepositoryError>;

    /// 末尾に追加（position はリポジトリが割り当てる）
    async fn append(&self, item: QueueItem) -> Result<QueueItem, RepositoryError>;

    /// 項目の状態・メタデータを上書き（position は変更しない）
    async fn update(&self, item: &QueueItem) -> Result<(), RepositoryError>;

    /// 項目を削除し、残りの position を詰める
    async fn remove(&self, item_id: &ItemId) -> Result<QueueItem, RepositoryError>;

    /// 並び順を書き換える（`ordered_ids` は Room の全項目の並べ替えでなければならない）
    async fn rewrite_positions(
        &self,
        room_id: &RoomId,
        ordered_ids: &[ItemId],
    ) -> Result<Vec<QueueItem>, RepositoryError>;

    /// Room の全項目を削除
    async fn remove_by_room(&self, room_id: &RoomId) -> Result<usize, RepositoryError>;
}
