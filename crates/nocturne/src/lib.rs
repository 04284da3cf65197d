//! # Nocturne
//!
//! A session engine for concurrent rooms of a Mafia-style
//! social-deduction game: players join a room, ready up, receive secret
//! roles, and the room cycles through timed night/day phases until a
//! faction wins.
//!
//! The engine owns the hard parts (the per-room phase state machine,
//! wall-clock deadlines with stale-expiry guards, role-gated secret
//! actions, vote tallying, win evaluation, and exclusive per-room
//! mutation) and talks to the outside world through two narrow seams:
//! a [`RoomStore`](nocturne_room::RoomStore) for documents and a
//! [`Broadcaster`](nocturne_room::Broadcaster) for push delivery.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use nocturne::SessionEngine;
//! use nocturne_room::{GameConfig, LocalBroadcaster, MemoryStore};
//!
//! # async fn run() -> Result<(), nocturne::EngineError> {
//! let engine = SessionEngine::spawn(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(LocalBroadcaster::new()),
//!     GameConfig::default(),
//! );
//! let code = engine
//!     .create_room(nocturne_protocol::PlayerId(1), "ana", "late night")
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod engine;
mod error;
mod lock;
mod timer;

pub use engine::SessionEngine;
pub use error::EngineError;
pub use timer::{Expiry, TimerManager};
