//! Win-condition evaluation.

use nocturne_protocol::Faction;
use nocturne_room::Room;

/// Declares a winning faction, or `None` to continue.
///
/// Living members partition into mafia-faction and everyone else. Town
/// wins when no mafia remain (and at least one other does); mafia wins
/// when at most one other remains alongside the mafia; except at
/// exactly one mafia versus one other, where neither clause fires and
/// the match continues. The thresholds are deliberately asymmetric;
/// the 1-vs-1 standoff is long-observed behavior, kept as-is.
pub fn evaluate_winner(room: &Room) -> Option<Faction> {
    let mafia = room
        .living()
        .filter(|m| {
            m.role
                .is_some_and(|role| role.faction() == Faction::Mafia)
        })
        .count();
    let others = room.living_count() - mafia;

    match (mafia, others) {
        (0, others) if others >= 1 => Some(Faction::Town),
        (1, 1) => None,
        (mafia, others) if mafia >= 1 && others <= 1 => {
            Some(Faction::Mafia)
        }
        _ => None,
    }
}
