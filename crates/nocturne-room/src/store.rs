//! The store seam: CRUD + query over room documents.
//!
//! The engine never talks to a database directly; it goes through
//! [`RoomStore`]. The trait's futures are `Send` because the engine
//! awaits them inside spawned tasks (the expiry driver).
//!
//! Lost-update protection: every [`Room`] carries a `revision`. `save`
//! compares the caller's revision against the stored one and rejects the
//! write with [`StoreError::Conflict`] when another writer got there
//! first. The engine holds a per-room lock, so conflicts only appear when
//! an *external* writer (the abandonment sweep) raced it.

use std::collections::HashMap;
use std::future::Future;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use nocturne_protocol::{PlayerId, RoomCode};

use crate::{Room, StoreError};

/// CRUD + query over room documents.
pub trait RoomStore: Send + Sync + 'static {
    /// Looks a room up by code. `Ok(None)` when it doesn't exist.
    fn find_by_code(
        &self,
        code: &RoomCode,
    ) -> impl Future<Output = Result<Option<Room>, StoreError>> + Send;

    /// Every room the player is currently a member of.
    fn find_by_member(
        &self,
        player: PlayerId,
    ) -> impl Future<Output = Result<Vec<Room>, StoreError>> + Send;

    /// Rooms still in the lobby, for listings.
    fn find_waiting(
        &self,
    ) -> impl Future<Output = Result<Vec<Room>, StoreError>> + Send;

    /// Lobby rooms created before `cutoff`: the external abandonment
    /// sweep's query.
    fn find_abandoned(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<RoomCode>, StoreError>> + Send;

    /// Stores a new room. Fails with [`StoreError::AlreadyExists`] on a
    /// code collision.
    fn insert(
        &self,
        room: &Room,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Persists a mutated room. Fails with [`StoreError::Conflict`] when
    /// the stored revision no longer matches the caller's, and with
    /// [`StoreError::NotFound`] when the room vanished.
    fn save(
        &self,
        room: &Room,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Deletes a room. Returns whether anything was removed; deleting an
    /// absent room is not an error.
    fn delete(
        &self,
        code: &RoomCode,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-process reference store. Used by the demo and every test; also a
/// reasonable single-node deployment for small fleets.
#[derive(Default)]
pub struct MemoryStore {
    rooms: Mutex<HashMap<RoomCode, Room>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rooms (test convenience).
    pub async fn len(&self) -> usize {
        self.rooms.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rooms.lock().await.is_empty()
    }
}

impl RoomStore for MemoryStore {
    async fn find_by_code(
        &self,
        code: &RoomCode,
    ) -> Result<Option<Room>, StoreError> {
        Ok(self.rooms.lock().await.get(code).cloned())
    }

    async fn find_by_member(
        &self,
        player: PlayerId,
    ) -> Result<Vec<Room>, StoreError> {
        Ok(self
            .rooms
            .lock()
            .await
            .values()
            .filter(|r| r.is_member(player))
            .cloned()
            .collect())
    }

    async fn find_waiting(&self) -> Result<Vec<Room>, StoreError> {
        Ok(self
            .rooms
            .lock()
            .await
            .values()
            .filter(|r| r.phase.is_joinable())
            .cloned()
            .collect())
    }

    async fn find_abandoned(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<RoomCode>, StoreError> {
        Ok(self
            .rooms
            .lock()
            .await
            .values()
            .filter(|r| r.phase.is_joinable() && r.created_at < cutoff)
            .map(|r| r.code.clone())
            .collect())
    }

    async fn insert(&self, room: &Room) -> Result<(), StoreError> {
        let mut rooms = self.rooms.lock().await;
        if rooms.contains_key(&room.code) {
            return Err(StoreError::AlreadyExists(room.code.clone()));
        }
        rooms.insert(room.code.clone(), room.clone());
        Ok(())
    }

    async fn save(&self, room: &Room) -> Result<(), StoreError> {
        let mut rooms = self.rooms.lock().await;
        let stored = rooms
            .get_mut(&room.code)
            .ok_or_else(|| StoreError::NotFound(room.code.clone()))?;
        if stored.revision != room.revision {
            return Err(StoreError::Conflict(room.code.clone()));
        }
        let mut next = room.clone();
        next.revision = room.revision + 1;
        *stored = next;
        Ok(())
    }

    async fn delete(&self, code: &RoomCode) -> Result<bool, StoreError> {
        Ok(self.rooms.lock().await.remove(code).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use nocturne_protocol::Phase;

    fn room(code: &str, host: u64) -> Room {
        Room::new(
            RoomCode(code.into()),
            "den",
            PlayerId(host),
            format!("p{host}"),
        )
    }

    #[tokio::test]
    async fn test_insert_and_find_by_code() {
        let store = MemoryStore::new();
        store.insert(&room("AAAAAA", 1)).await.unwrap();

        let found = store
            .find_by_code(&RoomCode("AAAAAA".into()))
            .await
            .unwrap();
        assert!(found.is_some());
        assert!(
            store
                .find_by_code(&RoomCode("ZZZZZZ".into()))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_insert_duplicate_code_rejected() {
        let store = MemoryStore::new();
        store.insert(&room("AAAAAA", 1)).await.unwrap();
        let result = store.insert(&room("AAAAAA", 2)).await;
        assert!(matches!(result, Err(StoreError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_save_bumps_revision() {
        let store = MemoryStore::new();
        store.insert(&room("AAAAAA", 1)).await.unwrap();

        let mut r = store
            .find_by_code(&RoomCode("AAAAAA".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(r.revision, 0);
        r.name = "renamed".into();
        store.save(&r).await.unwrap();

        let r = store
            .find_by_code(&RoomCode("AAAAAA".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(r.revision, 1);
        assert_eq!(r.name, "renamed");
    }

    #[tokio::test]
    async fn test_save_detects_lost_update() {
        let store = MemoryStore::new();
        store.insert(&room("AAAAAA", 1)).await.unwrap();

        // Two readers load the same revision.
        let a = store
            .find_by_code(&RoomCode("AAAAAA".into()))
            .await
            .unwrap()
            .unwrap();
        let b = a.clone();

        store.save(&a).await.unwrap();
        let result = store.save(&b).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_save_vanished_room_is_not_found() {
        let store = MemoryStore::new();
        let r = room("AAAAAA", 1);
        store.insert(&r).await.unwrap();
        store.delete(&r.code).await.unwrap();

        let result = store.save(&r).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_find_by_member() {
        let store = MemoryStore::new();
        store.insert(&room("AAAAAA", 1)).await.unwrap();
        store.insert(&room("BBBBBB", 2)).await.unwrap();

        let rooms = store.find_by_member(PlayerId(1)).await.unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].code, RoomCode("AAAAAA".into()));

        assert!(store.find_by_member(PlayerId(9)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_find_waiting_excludes_running_rooms() {
        let store = MemoryStore::new();
        store.insert(&room("AAAAAA", 1)).await.unwrap();
        let mut running = room("BBBBBB", 2);
        running.enter_phase(Phase::Night);
        store.insert(&running).await.unwrap();

        let waiting = store.find_waiting().await.unwrap();
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0].code, RoomCode("AAAAAA".into()));
    }

    #[tokio::test]
    async fn test_find_abandoned_uses_cutoff_and_phase() {
        let store = MemoryStore::new();
        let mut old = room("AAAAAA", 1);
        old.created_at = Utc::now() - ChronoDuration::hours(2);
        store.insert(&old).await.unwrap();
        store.insert(&room("BBBBBB", 2)).await.unwrap();
        let mut old_running = room("CCCCCC", 3);
        old_running.created_at = Utc::now() - ChronoDuration::hours(2);
        old_running.enter_phase(Phase::Day);
        store.insert(&old_running).await.unwrap();

        let cutoff = Utc::now() - ChronoDuration::hours(1);
        let abandoned = store.find_abandoned(cutoff).await.unwrap();
        assert_eq!(abandoned, vec![RoomCode("AAAAAA".into())]);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryStore::new();
        let r = room("AAAAAA", 1);
        store.insert(&r).await.unwrap();

        assert!(store.delete(&r.code).await.unwrap());
        assert!(!store.delete(&r.code).await.unwrap());
    }
}
