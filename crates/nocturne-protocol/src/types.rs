//! Core types for Nocturne's wire format.
//!
//! Every type here travels on the push channel in serialized form, so the
//! serde attributes are part of the contract: internally tagged enums with
//! snake_case tags, transparent newtypes for identity.

use serde::{Deserialize, Serialize};

use std::fmt;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A player's external identity.
///
/// Accounts and authentication live outside this system; the engine only
/// ever sees the opaque numeric id the session layer hands it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// A room's identity: a short uppercase alphanumeric code (e.g. `K7QF2X`).
///
/// Codes are what players type to join a friend's room, so they stay short
/// and case-normalized. Generation lives with the room model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(pub String);

impl RoomCode {
    /// Builds a code from raw input, normalizing to uppercase.
    pub fn parse(raw: &str) -> Self {
        Self(raw.trim().to_ascii_uppercase())
    }

    /// The code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Game vocabulary
// ---------------------------------------------------------------------------

/// One segment of a room's state machine.
///
/// ```text
/// Waiting → Night → Day → Night → … → Ended → (Waiting | deleted)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Waiting,
    Night,
    Day,
    Ended,
}

impl Phase {
    /// Whether new players may join in this phase.
    pub fn is_joinable(self) -> bool {
        matches!(self, Self::Waiting)
    }

    /// Whether a match is currently being played.
    pub fn in_match(self) -> bool {
        matches!(self, Self::Night | Self::Day)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "WAITING"),
            Self::Night => write!(f, "NIGHT"),
            Self::Day => write!(f, "DAY"),
            Self::Ended => write!(f, "ENDED"),
        }
    }
}

/// A secret role dealt at match start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Mafia,
    Doctor,
    Detective,
    Villager,
}

impl Role {
    /// The win-condition side this role belongs to.
    pub fn faction(self) -> Faction {
        match self {
            Self::Mafia => Faction::Mafia,
            Self::Doctor | Self::Detective | Self::Villager => Faction::Town,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mafia => write!(f, "mafia"),
            Self::Doctor => write!(f, "doctor"),
            Self::Detective => write!(f, "detective"),
            Self::Villager => write!(f, "villager"),
        }
    }
}

/// The two win-condition sides: the mafia versus everyone else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Faction {
    Mafia,
    Town,
}

impl fmt::Display for Faction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mafia => write!(f, "mafia"),
            Self::Town => write!(f, "town"),
        }
    }
}

/// The kinds of secret action a role may take during the night.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NightActionKind {
    /// Mafia: eliminate the target (unless protected).
    Kill,
    /// Doctor: shield the target against one kill tonight.
    Heal,
    /// Detective: learn whether the target is mafia. Resolves immediately.
    Check,
}

// ---------------------------------------------------------------------------
// Public projections
// ---------------------------------------------------------------------------

/// What everyone in the room may know about a player. No role here:
/// roles only ever travel in per-connection events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSummary {
    pub id: PlayerId,
    pub name: String,
    pub alive: bool,
    pub ready: bool,
}

/// A role-redacted snapshot of a room, safe to hand to any member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomStateView {
    pub code: RoomCode,
    pub name: String,
    pub host: PlayerId,
    pub phase: Phase,
    pub turn: u32,
    pub winner: Option<Faction>,
    pub players: Vec<PlayerSummary>,
}

/// A lobby-listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomListEntry {
    pub code: RoomCode,
    pub name: String,
    pub player_count: usize,
    pub max_players: usize,
}

/// The public outcome of one night. Says who fell and whether a kill was
/// negated, never who did what.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NightSummary {
    /// The player eliminated tonight, if any.
    pub eliminated: Option<PlayerId>,
    /// Whether a kill attempt was negated by protection.
    pub saved: bool,
}

// ---------------------------------------------------------------------------
// Error codes
// ---------------------------------------------------------------------------

/// Machine-readable rejection categories carried by [`ServerEvent::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Missing or malformed fields in the request.
    Validation,
    /// The room (or player) no longer exists.
    NotFound,
    /// Wrong phase, wrong role, duplicate action, self-target, dead actor.
    IllegalState,
    /// A concurrent writer won; the caller may retry.
    Conflict,
    /// The deadline machinery failed; the room stays in its last phase.
    Scheduling,
}

// ---------------------------------------------------------------------------
// Inbound commands
// ---------------------------------------------------------------------------

/// What clients ask the engine to do.
///
/// The transport decodes these off the wire and calls the matching engine
/// operation. `leave_room` carries no code: on disconnect the engine
/// locates the player's rooms itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    CreateRoom { room_name: String, player_name: String },
    JoinRoom { code: RoomCode, player_name: String },
    LeaveRoom,
    ToggleReady { code: RoomCode },
    NightAction { code: RoomCode, kind: NightActionKind, target: PlayerId },
    CastVote { code: RoomCode, target: PlayerId },
    SkipPhase { code: RoomCode },
    RoomState { code: RoomCode },
    ListRooms,
}

// ---------------------------------------------------------------------------
// Outbound events
// ---------------------------------------------------------------------------

/// What the engine pushes to subscribers.
///
/// Delivery scope is decided by the engine, not encoded here: most events
/// go to a room's subscribers, `YourRole` and `CheckResult` only ever go
/// to a single connection, `Error` only to the actor who was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    RoomCreated {
        code: RoomCode,
        name: String,
    },
    PlayerListUpdated {
        players: Vec<PlayerSummary>,
        host: PlayerId,
    },
    PhaseChanged {
        from: Phase,
        to: Phase,
        turn: u32,
    },
    /// Private: the recipient's dealt role.
    YourRole {
        role: Role,
    },
    /// Private: a detective's immediate check verdict.
    CheckResult {
        target: PlayerId,
        is_mafia: bool,
    },
    NightResult {
        summary: NightSummary,
    },
    VoteRecorded {
        target: PlayerId,
        count: u32,
    },
    DayResult {
        eliminated: Option<PlayerId>,
        tied: bool,
    },
    GameEnded {
        winner: Faction,
    },
    /// Countdown toward the current phase deadline, 1 s granularity.
    TimerTick {
        remaining_secs: u64,
    },
    RoomClosed,
    Error {
        code: ErrorCode,
        message: String,
    },
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The wire format is a contract with client SDKs: these tests pin
    //! the exact JSON shapes the serde attributes produce.

    use super::*;

    // =====================================================================
    // Identity types
    // =====================================================================

    #[test]
    fn test_player_id_serializes_as_plain_number() {
        let json = serde_json::to_string(&PlayerId(42)).unwrap();
        assert_eq!(json, "42");
    }

    #[test]
    fn test_player_id_display() {
        assert_eq!(PlayerId(7).to_string(), "P-7");
    }

    #[test]
    fn test_room_code_serializes_as_plain_string() {
        let json = serde_json::to_string(&RoomCode("K7QF2X".into())).unwrap();
        assert_eq!(json, "\"K7QF2X\"");
    }

    #[test]
    fn test_room_code_parse_normalizes_case() {
        assert_eq!(RoomCode::parse(" k7qf2x "), RoomCode("K7QF2X".into()));
    }

    // =====================================================================
    // Game vocabulary
    // =====================================================================

    #[test]
    fn test_phase_serializes_screaming_snake() {
        let json = serde_json::to_string(&Phase::Waiting).unwrap();
        assert_eq!(json, "\"WAITING\"");
        let json = serde_json::to_string(&Phase::Night).unwrap();
        assert_eq!(json, "\"NIGHT\"");
    }

    #[test]
    fn test_phase_predicates() {
        assert!(Phase::Waiting.is_joinable());
        assert!(!Phase::Night.is_joinable());
        assert!(Phase::Night.in_match());
        assert!(Phase::Day.in_match());
        assert!(!Phase::Ended.in_match());
    }

    #[test]
    fn test_role_factions() {
        assert_eq!(Role::Mafia.faction(), Faction::Mafia);
        assert_eq!(Role::Doctor.faction(), Faction::Town);
        assert_eq!(Role::Detective.faction(), Faction::Town);
        assert_eq!(Role::Villager.faction(), Faction::Town);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Mafia).unwrap(), "\"mafia\"");
        assert_eq!(
            serde_json::to_string(&Role::Detective).unwrap(),
            "\"detective\""
        );
    }

    // =====================================================================
    // Events; one shape check per tagged enum
    // =====================================================================

    #[test]
    fn test_server_event_phase_changed_json_format() {
        let ev = ServerEvent::PhaseChanged {
            from: Phase::Waiting,
            to: Phase::Night,
            turn: 1,
        };
        let json: serde_json::Value = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "phase_changed");
        assert_eq!(json["from"], "WAITING");
        assert_eq!(json["to"], "NIGHT");
        assert_eq!(json["turn"], 1);
    }

    #[test]
    fn test_server_event_your_role_json_format() {
        let ev = ServerEvent::YourRole { role: Role::Doctor };
        let json: serde_json::Value = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "your_role");
        assert_eq!(json["role"], "doctor");
    }

    #[test]
    fn test_server_event_night_result_json_format() {
        let ev = ServerEvent::NightResult {
            summary: NightSummary {
                eliminated: Some(PlayerId(3)),
                saved: false,
            },
        };
        let json: serde_json::Value = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "night_result");
        assert_eq!(json["summary"]["eliminated"], 3);
        assert_eq!(json["summary"]["saved"], false);
    }

    #[test]
    fn test_server_event_game_ended_round_trip() {
        let ev = ServerEvent::GameEnded {
            winner: Faction::Town,
        };
        let bytes = serde_json::to_vec(&ev).unwrap();
        let decoded: ServerEvent = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(ev, decoded);
    }

    #[test]
    fn test_server_event_error_json_format() {
        let ev = ServerEvent::Error {
            code: ErrorCode::IllegalState,
            message: "not your phase".into(),
        };
        let json: serde_json::Value = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "ILLEGAL_STATE");
        assert_eq!(json["message"], "not your phase");
    }

    #[test]
    fn test_client_command_night_action_json_format() {
        let cmd = ClientCommand::NightAction {
            code: RoomCode("AB12CD".into()),
            kind: NightActionKind::Heal,
            target: PlayerId(5),
        };
        let json: serde_json::Value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["type"], "night_action");
        assert_eq!(json["code"], "AB12CD");
        assert_eq!(json["kind"], "heal");
        assert_eq!(json["target"], 5);
    }

    #[test]
    fn test_client_command_round_trip() {
        let cmd = ClientCommand::CastVote {
            code: RoomCode("AB12CD".into()),
            target: PlayerId(9),
        };
        let bytes = serde_json::to_vec(&cmd).unwrap();
        let decoded: ClientCommand = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(cmd, decoded);
    }

    #[test]
    fn test_decode_unknown_command_type_returns_error() {
        let unknown = r#"{"type": "fly_to_moon", "speed": 9000}"#;
        let result: Result<ClientCommand, _> = serde_json::from_str(unknown);
        assert!(result.is_err());
    }

    #[test]
    fn test_room_state_view_round_trip() {
        let view = RoomStateView {
            code: RoomCode("AB12CD".into()),
            name: "late night".into(),
            host: PlayerId(1),
            phase: Phase::Day,
            turn: 3,
            winner: None,
            players: vec![PlayerSummary {
                id: PlayerId(1),
                name: "ana".into(),
                alive: true,
                ready: false,
            }],
        };
        let bytes = serde_json::to_vec(&view).unwrap();
        let decoded: RoomStateView = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(view, decoded);
    }
}
