//! Night-action and vote accumulation, and phase-boundary resolution.
//!
//! The engine validates every submission (phase, role, liveness,
//! duplicates, self-targets) before calling in here; these functions
//! only record and resolve.

use nocturne_protocol::{Faction, PlayerId};
use nocturne_room::{NightBook, Room};

/// What the night produced, for the public summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NightOutcome {
    pub eliminated: Option<PlayerId>,
    /// A kill attempt was negated by protection.
    pub saved: bool,
}

/// What the day's vote produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayOutcome {
    pub eliminated: Option<PlayerId>,
    /// More than one player tied for the strict maximum.
    pub tied: bool,
}

/// Records the mafia's kill target for tonight.
pub fn record_kill(room: &mut Room, target: PlayerId) {
    room.night.kill_target = Some(target);
    room.night.mafia_acted = true;
}

/// Records the doctor's heal target and raises their shield.
pub fn record_heal(room: &mut Room, target: PlayerId) {
    room.night.heal_target = Some(target);
    room.night.doctor_acted = true;
    if let Some(seat) = room.member_mut(target) {
        seat.protected = true;
    }
}

/// Resolves a detective check immediately: is the target mafia-faction?
///
/// Returns `None` when the target has no role (not dealt yet; the
/// engine's validation makes that unreachable in practice). Marks the
/// check as spent; it is one-shot per night.
pub fn record_check(room: &mut Room, target: PlayerId) -> Option<bool> {
    let verdict = room
        .member(target)
        .and_then(|m| m.role)
        .map(|role| role.faction() == Faction::Mafia);
    if verdict.is_some() {
        room.night.detective_acted = true;
    }
    verdict
}

/// Records one vote and returns the target's running count.
pub fn record_vote(room: &mut Room, voter: PlayerId, target: PlayerId) -> u32 {
    if let Some(seat) = room.member_mut(voter) {
        seat.has_voted = true;
    }
    match room.member_mut(target) {
        Some(seat) => {
            seat.votes += 1;
            seat.votes
        }
        None => 0,
    }
}

/// Resolves the night at its deadline.
///
/// A kill lands unless the target is also the heal target, in which case
/// it is negated. The night book and every protection flag are cleared
/// regardless of outcome.
pub fn resolve_night(room: &mut Room) -> NightOutcome {
    let kill = room.night.kill_target;
    let heal = room.night.heal_target;

    let mut outcome = NightOutcome {
        eliminated: None,
        saved: false,
    };

    if let Some(target) = kill {
        if let Some(seat) = room.member_mut(target) {
            if seat.alive {
                if heal == Some(target) {
                    outcome.saved = true;
                } else {
                    seat.alive = false;
                    outcome.eliminated = Some(target);
                }
            }
        }
    }

    room.night = NightBook::default();
    for seat in &mut room.members {
        seat.protected = false;
    }
    outcome
}

/// Resolves the day's vote at its deadline.
///
/// The player with the strict maximum vote count is eliminated; a tie
/// at the maximum (or no votes at all) eliminates nobody. All vote state
/// resets afterwards regardless of outcome.
pub fn resolve_day(room: &mut Room) -> DayOutcome {
    let top = room
        .members
        .iter()
        .filter(|m| m.alive)
        .map(|m| m.votes)
        .max()
        .unwrap_or(0);

    let mut outcome = DayOutcome {
        eliminated: None,
        tied: false,
    };

    if top > 0 {
        let leaders: Vec<PlayerId> = room
            .members
            .iter()
            .filter(|m| m.alive && m.votes == top)
            .map(|m| m.player)
            .collect();
        match leaders.as_slice() {
            [lone] => {
                let lone = *lone;
                if let Some(seat) = room.member_mut(lone) {
                    seat.alive = false;
                }
                outcome.eliminated = Some(lone);
            }
            _ => outcome.tied = true,
        }
    }

    for seat in &mut room.members {
        seat.has_voted = false;
        seat.votes = 0;
    }
    outcome
}
