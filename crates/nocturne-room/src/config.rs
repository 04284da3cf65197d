//! Per-deployment game configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use nocturne_protocol::Phase;

/// What happens to a room when the `Ended` phase runs out.
///
/// Deterministic per room: the policy is fixed in the config the room's
/// engine was built with.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum EndedPolicy {
    /// Reset to a playable lobby: roles cleared, everyone alive and
    /// un-ready, same members, same host.
    #[default]
    ResetToLobby,
    /// Delete the room and tell its subscribers it closed.
    Teardown,
}

/// Tunables for every room an engine runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Minimum members before the lobby can start a match.
    pub min_players: usize,
    /// Maximum members a room accepts.
    pub max_players: usize,
    pub night_duration: Duration,
    pub day_duration: Duration,
    /// How long the post-match `Ended` phase lingers before the
    /// [`EndedPolicy`] applies.
    pub ended_duration: Duration,
    /// Emit `timer_tick` countdown events to the room at 1 s granularity.
    pub countdown_ticks: bool,
    /// Lower the role thresholds so 2–3 player rooms are playable
    /// (testing and tiny parties).
    pub small_room_mode: bool,
    pub ended_policy: EndedPolicy,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            min_players: 3,
            max_players: 10,
            night_duration: Duration::from_secs(30),
            day_duration: Duration::from_secs(90),
            ended_duration: Duration::from_secs(15),
            countdown_ticks: false,
            small_room_mode: false,
            ended_policy: EndedPolicy::default(),
        }
    }
}

impl GameConfig {
    /// A small-room preset: two players can start, relaxed thresholds.
    pub fn small_room() -> Self {
        Self {
            min_players: 2,
            small_room_mode: true,
            ..Self::default()
        }
    }

    /// Clamp out-of-range values so the config is safe to use.
    /// `min_players` never drops below 2, `max_players` never below
    /// `min_players`.
    pub fn validated(mut self) -> Self {
        if self.min_players < 2 {
            tracing::warn!(
                min = self.min_players,
                "min_players below 2, clamping"
            );
            self.min_players = 2;
        }
        if self.max_players < self.min_players {
            self.max_players = self.min_players;
        }
        self
    }

    /// How long a room sits in `phase` before its deadline, or `None`
    /// for `Waiting` (no deadline in the lobby).
    pub fn phase_duration(&self, phase: Phase) -> Option<Duration> {
        match phase {
            Phase::Waiting => None,
            Phase::Night => Some(self.night_duration),
            Phase::Day => Some(self.day_duration),
            Phase::Ended => Some(self.ended_duration),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = GameConfig::default();
        assert_eq!(cfg.min_players, 3);
        assert_eq!(cfg.max_players, 10);
        assert!(!cfg.small_room_mode);
        assert_eq!(cfg.ended_policy, EndedPolicy::ResetToLobby);
    }

    #[test]
    fn test_validated_clamps_degenerate_values() {
        let cfg = GameConfig {
            min_players: 0,
            max_players: 1,
            ..GameConfig::default()
        }
        .validated();
        assert_eq!(cfg.min_players, 2);
        assert_eq!(cfg.max_players, 2);
    }

    #[test]
    fn test_phase_duration_waiting_has_none() {
        let cfg = GameConfig::default();
        assert_eq!(cfg.phase_duration(Phase::Waiting), None);
        assert_eq!(
            cfg.phase_duration(Phase::Night),
            Some(cfg.night_duration)
        );
        assert_eq!(cfg.phase_duration(Phase::Day), Some(cfg.day_duration));
        assert_eq!(
            cfg.phase_duration(Phase::Ended),
            Some(cfg.ended_duration)
        );
    }

    #[test]
    fn test_small_room_preset() {
        let cfg = GameConfig::small_room();
        assert_eq!(cfg.min_players, 2);
        assert!(cfg.small_room_mode);
    }
}
