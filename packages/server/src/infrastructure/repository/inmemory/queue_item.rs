//! InMemory QueueItem Repository 実装
//!
//! Room ごとの並び順 (`order`) と項目本体 (`items`) を一つのロックで保持するため、
//! position の書き換えは常にアトミックに行われます。

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{ItemId, QueueItem, QueueItemRepository, RepositoryError, RoomId};

#[derive(Default)]
struct QueueTable {
    items: HashMap<ItemId, QueueItem>,
    order: HashMap<RoomId, Vec<ItemId>>,
}

impl QueueTable {
    /// position を order のインデックスに合わせ直す
    fn renumber(&mut self, room_id: &RoomId) {
        let Some(order) = self.order.get(room_id) else {
            return;
        };
        for (position, id) in order.iter().enumerate() {
            if let Some(item) = self.items.get_mut(id) {
                item.position = position;
            }
        }
    }

    fn snapshot(&self, room_id: &RoomId) -> Vec<QueueItem> {
        self.order
            .get(room_id)
            .map(|order| {
                order
                    .iter()
                    .filter_map(|id| self.items.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// インメモリ QueueItem Repository 実装
#[derive(Default)]
pub struct InMemoryQueueItemRepository {
    table: Mutex<QueueTable>,
}

impl InMemoryQueueItemRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueItemRepository for InMemoryQueueItemRepository {
    async fn list_by_room(&self, room_id: &RoomId) -> Result<Vec<QueueItem>, RepositoryError> {
        let table = self.table.lock().await;
        Ok(table.snapshot(room_id))
    }

    async fn get(&self, item_id: &ItemId) -> Result<Option<QueueItem>, RepositoryError> {
        let table = self.table.lock().await;
        Ok(table.items.get(item_id).cloned())
    }

    async fn append(&self, mut item: QueueItem) -> Result<QueueItem, RepositoryError> {
        let mut table = self.table.lock().await;
        let order = table.order.entry(item.room_id.clone()).or_default();
        item.position = order.len();
        order.push(item.id.clone());
        table.items.insert(item.id.clone(), item.clone());
        Ok(item)
    }

    async fn update(&self, item: &QueueItem) -> Result<(), RepositoryError> {
        let mut table = self.table.lock().await;
        let stored = table
            .items
            .get_mut(&item.id)
            .ok_or_else(|| RepositoryError::ItemNotFound(item.id.as_str().to_string()))?;
        let position = stored.position;
        *stored = item.clone();
        stored.position = position;
        Ok(())
    }

    async fn remove(&self, item_id: &ItemId) -> Result<QueueItem, RepositoryError> {
        let mut table = self.table.lock().await;
        let removed = table
            .items
            .remove(item_id)
            .ok_or_else(|| RepositoryError::ItemNotFound(item_id.as_str().to_string()))?;
        if let Some(order) = table.order.get_mut(&removed.room_id) {
            order.retain(|id| id != item_id);
        }
        table.renumber(&removed.room_id);
        Ok(removed)
    }

    async fn rewrite_positions(
        &self,
        room_id: &RoomId,
        ordered_ids: &[ItemId],
    ) -> Result<Vec<QueueItem>, RepositoryError> {
        let mut table = self.table.lock().await;
        let current: HashSet<&ItemId> = table
            .order
            .get(room_id)
            .map(|order| order.iter().collect())
            .unwrap_or_default();
        let requested: HashSet<&ItemId> = ordered_ids.iter().collect();
        if requested.len() != ordered_ids.len() || requested != current {
            return Err(RepositoryError::PositionMismatch(
                room_id.as_str().to_string(),
            ));
        }
        table.order.insert(room_id.clone(), ordered_ids.to_vec());
        table.renumber(room_id);
        Ok(table.snapshot(room_id))
    }

    async fn remove_by_room(&self, room_id: &RoomId) -> Result<usize, RepositoryError> {
        let mut table = self.table.lock().await;
        let order = table.order.remove(room_id).unwrap_or_default();
        for id in &order {
            table.items.remove(id);
        }
        Ok(order.len())
    }
}
