//! Per-room mutual exclusion, keyed by room code.
//!
//! Every mutation of a given room; player event or timer expiry; runs
//! under this lock, so two read-modify-writes on the same room never
//! interleave. Rooms lock independently; mutations on different rooms
//! proceed fully in parallel. The store's revision check remains as the
//! second line of defense against writers outside this process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use nocturne_protocol::RoomCode;

#[derive(Default)]
pub(crate) struct RoomLocks {
    inner: Mutex<HashMap<RoomCode, Arc<AsyncMutex<()>>>>,
}

impl RoomLocks {
    /// Acquires the room's lock, creating it on first use.
    pub(crate) async fn acquire(&self, code: &RoomCode) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().expect("room lock map poisoned");
            Arc::clone(map.entry(code.clone()).or_default())
        };
        lock.lock_owned().await
    }

    /// Drops the map entry for a deleted room. A straggler still holding
    /// the old `Arc` finishes normally; the entry just stops accumulating.
    pub(crate) fn forget(&self, code: &RoomCode) {
        self.inner
            .lock()
            .expect("room lock map poisoned")
            .remove(code);
    }
}
