//! Per-room mutation lock.
//!
//! Queue mutations, joins and the worker's persist + broadcast steps on the
//! same room run one at a time; different rooms never contend.
//!
//! An entry lives only while someone holds or waits for the room's lock.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex, MutexGuard},
};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::RoomId;

type LockTable = HashMap<RoomId, Arc<Mutex<()>>>;

#[derive(Default)]
pub struct RoomLockRegistry {
    locks: Arc<StdMutex<LockTable>>,
}

/// Exclusive access to one room; released on drop.
pub struct RoomGuard {
    room_id: RoomId,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<StdMutex<LockTable>>,
}

impl RoomLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `room_id`.
    pub async fn lock(&self, room_id: &RoomId) -> RoomGuard {
        let lock = table(&self.locks).entry(room_id.clone()).or_default().clone();
        RoomGuard {
            room_id: room_id.clone(),
            guard: Some(lock.lock_owned().await),
            locks: self.locks.clone(),
        }
    }

    /// Number of rooms with a held or awaited lock.
    pub fn len(&self) -> usize {
        table(&self.locks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for RoomGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // 待機中の呼び出し元は Arc を持っているので、誰も持っていないときだけ消す
        let mut locks = table(&self.locks);
        if locks
            .get(&self.room_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.room_id);
        }
    }
}

fn table(locks: &StdMutex<LockTable>) -> MutexGuard<'_, LockTable> {
    locks.lock().unwrap_or_else(|e| e.into_inner())
}
