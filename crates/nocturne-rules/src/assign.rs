//! Role roster composition and seat assignment.

use rand::Rng;
use rand::seq::SliceRandom;

use nocturne_protocol::Role;
use nocturne_room::Room;

/// Threshold profile for special roles.
///
/// `SmallRoom` exists so 2–3 player rooms are playable in testing:
/// 2 players deal as mafia + villager, 3 players add the doctor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterMode {
    Standard,
    SmallRoom,
}

impl RosterMode {
    /// `(doctor_min, detective_min)`: minimum player counts at which
    /// the role enters the roster.
    fn thresholds(self) -> (usize, usize) {
        match self {
            Self::Standard => (4, 6),
            Self::SmallRoom => (3, 4),
        }
    }
}

/// The role multiset for `n` players.
///
/// Mafia seats are `max(1, n / 4)`; doctor and detective appear once each
/// past their thresholds; every remaining seat is a villager. The result
/// always has exactly `n` entries for `n >= 2`.
pub fn role_roster(n: usize, mode: RosterMode) -> Vec<Role> {
    let (doctor_min, detective_min) = mode.thresholds();
    let mafia = (n / 4).max(1);

    let mut roster = Vec::with_capacity(n);
    roster.extend(std::iter::repeat_n(Role::Mafia, mafia));
    if n >= doctor_min {
        roster.push(Role::Doctor);
    }
    if n >= detective_min {
        roster.push(Role::Detective);
    }
    debug_assert!(roster.len() <= n, "special roles exceed seats");
    roster.resize(n, Role::Villager);
    roster
}

/// Deals roles to every seat in the room.
///
/// The multiset is placed by `SliceRandom::shuffle`: a Fisher–Yates
/// pass, so every permutation is equally likely. Never a sort with a
/// random comparator.
pub fn deal_roles(room: &mut Room, mode: RosterMode, rng: &mut impl Rng) {
    let mut roster = role_roster(room.members.len(), mode);
    roster.shuffle(rng);
    for (seat, role) in room.members.iter_mut().zip(roster) {
        seat.role = Some(role);
    }
}
