//! Pure game rules for Nocturne.
//!
//! Everything here is a plain function over a [`Room`](nocturne_room::Room):
//! no I/O, no clocks, no channels. The engine decides *when* these run
//! (phase boundaries, validated submissions); this crate decides *what*
//! they mean.
//!
//! - [`role_roster`] / [`deal_roles`]: compose the role multiset for a
//!   player count and assign seats by uniform shuffle.
//! - [`record_kill`] / [`record_heal`] / [`record_check`] /
//!   [`record_vote`]: accumulate one action per eligible role and one
//!   vote per living player.
//! - [`resolve_night`] / [`resolve_day`]: apply the accumulated actions
//!   at the phase boundary and clear the round's ephemeral state.
//! - [`evaluate_winner`]: declare a winning faction or `None` to
//!   continue.

mod assign;
mod resolve;
mod victory;

pub use assign::{RosterMode, deal_roles, role_roster};
pub use resolve::{
    DayOutcome, NightOutcome, record_check, record_heal, record_kill,
    record_vote, resolve_day, resolve_night,
};
pub use victory::evaluate_winner;
