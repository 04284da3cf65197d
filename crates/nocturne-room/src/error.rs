//! Error types for the store seam.

use nocturne_protocol::RoomCode;

/// Errors a [`RoomStore`](crate::RoomStore) can return.
///
/// `NotFound` and `Conflict` are expected, non-fatal outcomes; rooms
/// vanish between a read and a write, and concurrent writers lose races.
/// Callers handle both without treating them as failures of the store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No room with this code exists (any more).
    #[error("room {0} not found")]
    NotFound(RoomCode),

    /// The saved document was modified since this caller read it.
    #[error("room {0} was modified concurrently")]
    Conflict(RoomCode),

    /// An insert collided with an existing code.
    #[error("room {0} already exists")]
    AlreadyExists(RoomCode),

    /// The backing store itself failed (I/O, connection, corruption).
    #[error("store backend: {0}")]
    Backend(String),
}
