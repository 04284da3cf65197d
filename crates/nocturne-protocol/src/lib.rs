//! Wire payloads for Nocturne.
//!
//! This crate defines everything that crosses the process boundary:
//!
//! - **Identity** ([`PlayerId`], [`RoomCode`]): who and where.
//! - **Game vocabulary** ([`Phase`], [`Role`], [`Faction`],
//!   [`NightActionKind`]): shared by the engine and every client.
//! - **Events** ([`ServerEvent`], [`ClientCommand`]): the payloads the
//!   push channel carries; the transport itself lives outside this
//!   repository.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how payloads become
//!   bytes.
//!
//! The protocol layer knows nothing about connections, rooms, or
//! timers; it only defines shapes and their serialized form.

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    ClientCommand, ErrorCode, Faction, NightActionKind, NightSummary,
    Phase, PlayerId, PlayerSummary, Role, RoomCode, RoomListEntry,
    RoomStateView, ServerEvent,
};
