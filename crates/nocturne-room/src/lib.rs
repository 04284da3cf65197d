//! Room documents and the contracts around them.
//!
//! This crate owns what a room *is*: the persisted [`Room`] document and
//! its [`Membership`] records, and the two seams the engine talks
//! through:
//!
//! - [`RoomStore`]: CRUD + query over room documents, with optimistic
//!   revision checking so lost updates surface as [`StoreError::Conflict`]
//!   instead of silent overwrites. [`MemoryStore`] is the in-process
//!   reference implementation.
//! - [`Broadcaster`]: fire-and-forget push to a room's subscribers, a
//!   single connection, or everyone. [`NullBroadcaster`] drops everything;
//!   [`LocalBroadcaster`] fans out over in-process channels.
//!
//! No game rules live here: the engine decides *when* to mutate and
//! broadcast, the rules crate decides *what* a night or a vote means.

mod broadcast;
mod config;
mod error;
mod model;
mod store;

pub use broadcast::{Broadcaster, LocalBroadcaster, NullBroadcaster};
pub use config::{EndedPolicy, GameConfig};
pub use error::StoreError;
pub use model::{CODE_LEN, Membership, NightBook, Room, generate_code};
pub use store::{MemoryStore, RoomStore};
