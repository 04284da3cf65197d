//! The session engine: one phase state machine per room.
//!
//! Every inbound event lands here, is validated against the room's
//! current phase and the actor's seat, mutates an in-memory copy of the
//! room document, persists it in a single write, and only then
//! broadcasts. Timer expiries re-enter through the exact same per-room
//! lock discipline as player events; the scheduler is just another
//! event source.
//!
//! The engine is generic over its two external seams: a [`RoomStore`]
//! for documents and a [`Broadcaster`] for push delivery.

use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc::UnboundedReceiver;

use nocturne_protocol::{
    Faction, NightActionKind, NightSummary, Phase, PlayerId, Role,
    RoomCode, RoomListEntry, RoomStateView, ServerEvent,
};
use nocturne_room::{
    Broadcaster, EndedPolicy, GameConfig, Membership, Room, RoomStore,
    StoreError, generate_code,
};
use nocturne_rules::{
    RosterMode, deal_roles, evaluate_winner, record_check, record_heal,
    record_kill, record_vote, resolve_day, resolve_night,
};

use crate::lock::RoomLocks;
use crate::timer::{Expiry, TimerManager};
use crate::EngineError;

/// Attempts to draw an unused room code before giving up.
const CODE_DRAWS: usize = 8;

/// What a resolved deadline did, for the post-save broadcasts.
enum Resolution {
    Night {
        summary: NightSummary,
        winner: Option<Faction>,
    },
    Day {
        eliminated: Option<PlayerId>,
        tied: bool,
        winner: Option<Faction>,
    },
    Lobby,
}

/// Whether a ready-toggle left the room waiting or started the match.
enum ReadyOutcome {
    Toggled,
    Started,
}

/// The per-room phase state machine over a store and a broadcaster.
pub struct SessionEngine<S: RoomStore, B: Broadcaster> {
    store: Arc<S>,
    broadcaster: Arc<B>,
    config: GameConfig,
    timers: TimerManager<B>,
    locks: RoomLocks,
}

impl<S: RoomStore, B: Broadcaster> SessionEngine<S, B> {
    /// Builds the engine and spawns its expiry driver.
    ///
    /// The driver holds only a weak reference; dropping the last `Arc`
    /// tears the engine down, which drops the timer manager, which ends
    /// the driver.
    pub fn spawn(
        store: Arc<S>,
        broadcaster: Arc<B>,
        config: GameConfig,
    ) -> Arc<Self> {
        let config = config.validated();
        let (timers, expiry_rx) = TimerManager::new(
            Arc::clone(&broadcaster),
            config.countdown_ticks,
        );
        let engine = Arc::new(Self {
            store,
            broadcaster,
            config,
            timers,
            locks: RoomLocks::default(),
        });
        tokio::spawn(drive_expiries(Arc::downgrade(&engine), expiry_rx));
        engine
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Time left on a room's phase deadline, `None` when no deadline is
    /// armed.
    pub fn deadline_remaining(&self, code: &RoomCode) -> Option<Duration> {
        self.timers.remaining(code)
    }

    /// Pushes a rejection to the actor it belongs to, and nobody else.
    pub fn report_rejection(&self, player: PlayerId, err: &EngineError) {
        self.broadcaster.emit_to_connection(
            player,
            &ServerEvent::Error {
                code: err.code(),
                message: err.to_string(),
            },
        );
    }

    // -----------------------------------------------------------------
    // Lobby operations
    // -----------------------------------------------------------------

    /// Creates a room with the host seated, returning its code.
    pub async fn create_room(
        &self,
        host: PlayerId,
        host_name: &str,
        room_name: &str,
    ) -> Result<RoomCode, EngineError> {
        let host_name = valid_name(host_name, "player name")?;
        let room_name = valid_name(room_name, "room name")?;

        let mut last_code = None;
        for _ in 0..CODE_DRAWS {
            let code = generate_code(&mut rand::rng());
            let room = Room::new(
                code.clone(),
                room_name.clone(),
                host,
                host_name.clone(),
            );
            match self.store.insert(&room).await {
                Ok(()) => {
                    tracing::info!(
                        room = %code, %host, "room created"
                    );
                    self.broadcaster.emit_to_connection(
                        host,
                        &ServerEvent::RoomCreated {
                            code: code.clone(),
                            name: room.name.clone(),
                        },
                    );
                    return Ok(code);
                }
                Err(StoreError::AlreadyExists(_)) => {
                    last_code = Some(code);
                }
                Err(e) => return Err(e.into()),
            }
        }
        // The code space is effectively saturated; transient for the
        // caller, alarming for the operator.
        let code = last_code.unwrap_or_else(|| RoomCode(String::new()));
        tracing::warn!(
            draws = CODE_DRAWS,
            "room code collisions exhausted draws"
        );
        Err(EngineError::Conflict(code))
    }

    /// Seats a player in a waiting room.
    pub async fn join_room(
        &self,
        code: &RoomCode,
        player: PlayerId,
        player_name: &str,
    ) -> Result<(), EngineError> {
        let player_name = valid_name(player_name, "player name")?;
        let max_players = self.config.max_players;

        let _guard = self.locks.acquire(code).await;
        let (room, ()) = self
            .update(code, |room| {
                if !room.phase.is_joinable() {
                    return Err(EngineError::IllegalState(
                        "room is not accepting players",
                    ));
                }
                if room.is_member(player) {
                    return Err(EngineError::IllegalState(
                        "already a member of this room",
                    ));
                }
                if room.members.len() >= max_players {
                    return Err(EngineError::IllegalState("room is full"));
                }
                room.members
                    .push(Membership::new(player, player_name.clone()));
                Ok(())
            })
            .await?;

        tracing::info!(room = %code, %player, "player joined");
        self.emit_player_list(&room);
        Ok(())
    }

    /// Removes a player from every room they are in. A player in no room
    /// is a no-op; this doubles as the disconnect path.
    pub async fn leave_room(
        &self,
        player: PlayerId,
    ) -> Result<(), EngineError> {
        let rooms = self.store.find_by_member(player).await?;
        for room in rooms {
            self.remove_from_room(&room.code, player).await?;
        }
        Ok(())
    }

    /// Flips a member's ready flag; when the lobby fills and everyone is
    /// ready, deals roles and opens the first night.
    pub async fn toggle_ready(
        &self,
        code: &RoomCode,
        player: PlayerId,
    ) -> Result<(), EngineError> {
        let min_players = self.config.min_players;
        let mode = self.roster_mode();

        let _guard = self.locks.acquire(code).await;
        let (room, outcome) = self
            .update(code, |room| {
                if room.phase != Phase::Waiting {
                    return Err(EngineError::IllegalState(
                        "match already running",
                    ));
                }
                let seat = room.member_mut(player).ok_or(
                    EngineError::IllegalState("not a member of this room"),
                )?;
                seat.ready = !seat.ready;

                if room.members.len() >= min_players && room.all_ready() {
                    room.reset_round_state();
                    deal_roles(room, mode, &mut rand::rng());
                    room.turn = 1;
                    room.winner = None;
                    room.enter_phase(Phase::Night);
                    Ok(ReadyOutcome::Started)
                } else {
                    Ok(ReadyOutcome::Toggled)
                }
            })
            .await?;

        self.emit_player_list(&room);
        if let ReadyOutcome::Started = outcome {
            tracing::info!(
                room = %code,
                players = room.members.len(),
                "match started"
            );
            self.broadcaster.emit_to_room(
                code,
                &ServerEvent::PhaseChanged {
                    from: Phase::Waiting,
                    to: Phase::Night,
                    turn: room.turn,
                },
            );
            for seat in &room.members {
                if let Some(role) = seat.role {
                    self.broadcaster.emit_to_connection(
                        seat.player,
                        &ServerEvent::YourRole { role },
                    );
                }
            }
            self.arm_deadline(&room);
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // In-match operations
    // -----------------------------------------------------------------

    /// Records a role's night action. Checks resolve immediately and are
    /// disclosed to the checking connection only.
    pub async fn submit_night_action(
        &self,
        code: &RoomCode,
        player: PlayerId,
        kind: NightActionKind,
        target: PlayerId,
    ) -> Result<(), EngineError> {
        if player == target {
            return Err(EngineError::IllegalState(
                "cannot target yourself",
            ));
        }

        let _guard = self.locks.acquire(code).await;
        let (_, verdict) = self
            .update(code, |room| {
                if room.phase != Phase::Night {
                    return Err(EngineError::IllegalState(
                        "night actions are only valid at night",
                    ));
                }
                let actor = room.member(player).ok_or(
                    EngineError::IllegalState("not a member of this room"),
                )?;
                if !actor.alive {
                    return Err(EngineError::IllegalState(
                        "dead players cannot act",
                    ));
                }
                if actor.role != Some(required_role(kind)) {
                    return Err(EngineError::IllegalState(
                        "your role cannot take this action",
                    ));
                }
                let target_seat = room.member(target).ok_or(
                    EngineError::IllegalState("target is not in this room"),
                )?;
                if !target_seat.alive {
                    return Err(EngineError::IllegalState(
                        "target is not alive",
                    ));
                }

                match kind {
                    NightActionKind::Kill => {
                        if room.night.mafia_acted {
                            return Err(EngineError::IllegalState(
                                "action already taken this night",
                            ));
                        }
                        record_kill(room, target);
                        Ok(None)
                    }
                    NightActionKind::Heal => {
                        if room.night.doctor_acted {
                            return Err(EngineError::IllegalState(
                                "action already taken this night",
                            ));
                        }
                        record_heal(room, target);
                        Ok(None)
                    }
                    NightActionKind::Check => {
                        if room.night.detective_acted {
                            return Err(EngineError::IllegalState(
                                "action already taken this night",
                            ));
                        }
                        let is_mafia = record_check(room, target).ok_or(
                            EngineError::IllegalState(
                                "roles have not been dealt",
                            ),
                        )?;
                        Ok(Some(is_mafia))
                    }
                }
            })
            .await?;

        tracing::debug!(room = %code, %player, ?kind, "night action recorded");
        if let Some(is_mafia) = verdict {
            self.broadcaster.emit_to_connection(
                player,
                &ServerEvent::CheckResult { target, is_mafia },
            );
        }
        Ok(())
    }

    /// Records one vote from a living player against another.
    pub async fn cast_vote(
        &self,
        code: &RoomCode,
        player: PlayerId,
        target: PlayerId,
    ) -> Result<(), EngineError> {
        if player == target {
            return Err(EngineError::IllegalState(
                "cannot target yourself",
            ));
        }

        let _guard = self.locks.acquire(code).await;
        let (_, count) = self
            .update(code, |room| {
                if room.phase != Phase::Day {
                    return Err(EngineError::IllegalState(
                        "votes are only valid during the day",
                    ));
                }
                let voter = room.member(player).ok_or(
                    EngineError::IllegalState("not a member of this room"),
                )?;
                if !voter.alive {
                    return Err(EngineError::IllegalState(
                        "dead players cannot vote",
                    ));
                }
                if voter.has_voted {
                    return Err(EngineError::IllegalState(
                        "vote already cast today",
                    ));
                }
                let target_seat = room.member(target).ok_or(
                    EngineError::IllegalState("target is not in this room"),
                )?;
                if !target_seat.alive {
                    return Err(EngineError::IllegalState(
                        "target is not alive",
                    ));
                }
                Ok(record_vote(room, player, target))
            })
            .await?;

        self.broadcaster.emit_to_room(
            code,
            &ServerEvent::VoteRecorded { target, count },
        );
        Ok(())
    }

    /// Host-only: cancels the phase deadline and runs the same
    /// resolution the scheduler would have, synchronously.
    pub async fn skip_phase(
        &self,
        code: &RoomCode,
        requester: PlayerId,
    ) -> Result<(), EngineError> {
        let room = self.load(code).await?;
        if !room.is_member(requester) {
            return Err(EngineError::IllegalState(
                "not a member of this room",
            ));
        }
        if room.host != requester {
            return Err(EngineError::IllegalState(
                "only the host may skip the phase",
            ));
        }

        let expiry = self.timers.force_expire(code).ok_or(
            EngineError::IllegalState("no deadline to skip"),
        )?;
        tracing::info!(room = %code, %requester, "host skipped the phase");
        self.process_expiry(expiry).await
    }

    // -----------------------------------------------------------------
    // Read-only operations
    // -----------------------------------------------------------------

    /// A member's role-redacted view of their room.
    pub async fn room_state(
        &self,
        code: &RoomCode,
        requester: PlayerId,
    ) -> Result<RoomStateView, EngineError> {
        let room = self.load(code).await?;
        if !room.is_member(requester) {
            return Err(EngineError::IllegalState(
                "not a member of this room",
            ));
        }
        Ok(room.view())
    }

    /// Waiting rooms, oldest first.
    pub async fn list_rooms(
        &self,
    ) -> Result<Vec<RoomListEntry>, EngineError> {
        let mut rooms = self.store.find_waiting().await?;
        rooms.sort_by_key(|r| r.created_at);
        Ok(rooms
            .into_iter()
            .map(|r| RoomListEntry {
                code: r.code.clone(),
                name: r.name.clone(),
                player_count: r.members.len(),
                max_players: self.config.max_players,
            })
            .collect())
    }

    /// Re-arms a loaded room's deadline from its persisted phase entry
    /// timestamp: the restart path. Elapsed time is subtracted; a
    /// deadline already in the past fires immediately.
    pub async fn resume(&self, code: &RoomCode) -> Result<(), EngineError> {
        let _guard = self.locks.acquire(code).await;
        let room = self.load(code).await?;
        self.arm_deadline(&room);
        Ok(())
    }

    // -----------------------------------------------------------------
    // Expiry handling
    // -----------------------------------------------------------------

    /// Driver entry point: resolve a deadline, logging instead of
    /// propagating; there is no caller to report to.
    async fn handle_expiry(&self, expiry: Expiry) {
        let room = expiry.room.clone();
        if let Err(err) = self.process_expiry(expiry).await {
            match err {
                EngineError::NotFound(_) => {
                    tracing::debug!(room = %room, "expiry raced a deletion");
                }
                err => {
                    tracing::warn!(
                        room = %room,
                        error = %err,
                        "deadline resolution failed; room stays in its \
                         last durable phase"
                    );
                }
            }
        }
    }

    /// Resolves one deadline under the room lock.
    ///
    /// Re-reads the room and silently drops the expiry if the room
    /// vanished or is no longer in the `(phase, turn)` the deadline was
    /// armed for; a stale timer or a forced-skip race must not
    /// double-advance the machine.
    async fn process_expiry(
        &self,
        expiry: Expiry,
    ) -> Result<(), EngineError> {
        let _guard = self.locks.acquire(&expiry.room).await;

        for attempt in 0..2 {
            let Some(mut room) =
                self.store.find_by_code(&expiry.room).await?
            else {
                tracing::debug!(
                    room = %expiry.room,
                    "deadline for a vanished room, dropping"
                );
                return Ok(());
            };
            if room.phase != expiry.phase || room.turn != expiry.turn {
                tracing::debug!(
                    room = %expiry.room,
                    armed = %expiry.phase,
                    current = %room.phase,
                    "stale deadline, dropping"
                );
                return Ok(());
            }

            if room.phase == Phase::Ended
                && self.config.ended_policy == EndedPolicy::Teardown
            {
                self.timers.clear(&room.code);
                self.store.delete(&room.code).await?;
                self.locks.forget(&room.code);
                self.broadcaster
                    .emit_to_room(&room.code, &ServerEvent::RoomClosed);
                tracing::info!(room = %room.code, "room torn down after match");
                return Ok(());
            }

            let resolution = match room.phase {
                Phase::Night => self.advance_from_night(&mut room),
                Phase::Day => self.advance_from_day(&mut room),
                Phase::Ended => {
                    room.reset_to_lobby();
                    Resolution::Lobby
                }
                // The lobby has no deadline; nothing to resolve.
                Phase::Waiting => return Ok(()),
            };

            match self.store.save(&room).await {
                Ok(()) => {
                    self.emit_resolution(&room, expiry.phase, resolution);
                    self.arm_deadline(&room);
                    return Ok(());
                }
                Err(StoreError::Conflict(_)) if attempt == 0 => {
                    tracing::debug!(
                        room = %expiry.room,
                        "expiry save conflict, retrying once"
                    );
                }
                Err(StoreError::NotFound(_)) => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
        Err(EngineError::Conflict(expiry.room))
    }

    /// Night deadline: resolve the kill, evaluate, advance.
    fn advance_from_night(&self, room: &mut Room) -> Resolution {
        let outcome = resolve_night(room);
        let summary = NightSummary {
            eliminated: outcome.eliminated,
            saved: outcome.saved,
        };
        let winner = evaluate_winner(room);
        match winner {
            Some(faction) => self.finish_match(room, faction),
            None => {
                room.turn += 1;
                room.enter_phase(Phase::Day);
            }
        }
        Resolution::Night { summary, winner }
    }

    /// Day deadline: tally the vote, evaluate, advance.
    fn advance_from_day(&self, room: &mut Room) -> Resolution {
        let outcome = resolve_day(room);
        let winner = evaluate_winner(room);
        match winner {
            Some(faction) => self.finish_match(room, faction),
            None => {
                room.turn += 1;
                room.enter_phase(Phase::Night);
            }
        }
        Resolution::Day {
            eliminated: outcome.eliminated,
            tied: outcome.tied,
            winner,
        }
    }

    fn finish_match(&self, room: &mut Room, winner: Faction) {
        room.winner = Some(winner);
        room.ended_at = Some(Utc::now());
        room.enter_phase(Phase::Ended);
        tracing::info!(
            room = %room.code,
            %winner,
            turns = room.turn,
            "match ended"
        );
    }

    /// Broadcasts for a resolved deadline, after the save.
    fn emit_resolution(
        &self,
        room: &Room,
        from: Phase,
        resolution: Resolution,
    ) {
        let code = &room.code;
        let phase_changed = ServerEvent::PhaseChanged {
            from,
            to: room.phase,
            turn: room.turn,
        };
        match resolution {
            Resolution::Night { summary, winner } => {
                self.broadcaster.emit_to_room(
                    code,
                    &ServerEvent::NightResult { summary },
                );
                self.broadcaster.emit_to_room(code, &phase_changed);
                if let Some(winner) = winner {
                    self.broadcaster.emit_to_room(
                        code,
                        &ServerEvent::GameEnded { winner },
                    );
                }
            }
            Resolution::Day {
                eliminated,
                tied,
                winner,
            } => {
                self.broadcaster.emit_to_room(
                    code,
                    &ServerEvent::DayResult { eliminated, tied },
                );
                self.broadcaster.emit_to_room(code, &phase_changed);
                if let Some(winner) = winner {
                    self.broadcaster.emit_to_room(
                        code,
                        &ServerEvent::GameEnded { winner },
                    );
                }
            }
            Resolution::Lobby => {
                self.broadcaster.emit_to_room(code, &phase_changed);
                self.emit_player_list(room);
            }
        }
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    /// Removes one player from one room: succession, deletion-on-empty,
    /// and the re-broadcast. Caller does not hold the room lock.
    async fn remove_from_room(
        &self,
        code: &RoomCode,
        player: PlayerId,
    ) -> Result<(), EngineError> {
        let _guard = self.locks.acquire(code).await;

        for attempt in 0..2 {
            let Some(mut room) = self.store.find_by_code(code).await?
            else {
                return Ok(());
            };
            if !room.remove_member(player) {
                return Ok(());
            }

            if room.members.is_empty() {
                self.timers.clear(code);
                self.store.delete(code).await?;
                self.locks.forget(code);
                self.broadcaster
                    .emit_to_room(code, &ServerEvent::RoomClosed);
                tracing::info!(room = %code, "room emptied, deleted");
                return Ok(());
            }

            let host_left = room.host == player;
            if host_left {
                room.promote_next_host();
            }

            match self.store.save(&room).await {
                Ok(()) => {
                    if host_left {
                        tracing::info!(
                            room = %code,
                            host = %room.host,
                            "host reassigned"
                        );
                    }
                    tracing::info!(room = %code, %player, "player left");
                    self.emit_player_list(&room);
                    return Ok(());
                }
                Err(StoreError::Conflict(_)) if attempt == 0 => continue,
                Err(StoreError::NotFound(_)) => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
        Err(EngineError::Conflict(code.clone()))
    }

    /// The read-modify-write shared by the player-event operations:
    /// load, apply, save; one retry when a concurrent writer got in
    /// between. Returns the saved room for post-save broadcasts.
    ///
    /// Caller holds the room lock.
    async fn update<T>(
        &self,
        code: &RoomCode,
        mut apply: impl FnMut(&mut Room) -> Result<T, EngineError>,
    ) -> Result<(Room, T), EngineError> {
        for attempt in 0..2 {
            let mut room = self.load(code).await?;
            let value = apply(&mut room)?;
            match self.store.save(&room).await {
                Ok(()) => return Ok((room, value)),
                Err(StoreError::Conflict(_)) if attempt == 0 => {
                    tracing::debug!(
                        room = %code,
                        "save conflict, retrying once"
                    );
                }
                Err(StoreError::NotFound(_)) => {
                    return Err(EngineError::NotFound(code.clone()));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(EngineError::Conflict(code.clone()))
    }

    async fn load(&self, code: &RoomCode) -> Result<Room, EngineError> {
        self.store
            .find_by_code(code)
            .await?
            .ok_or_else(|| EngineError::NotFound(code.clone()))
    }

    /// Arms (or re-arms) the deadline for the room's current phase from
    /// its persisted entry timestamp. The lobby has no deadline.
    fn arm_deadline(&self, room: &Room) {
        let Some(duration) = self.config.phase_duration(room.phase)
        else {
            return;
        };
        let elapsed = (Utc::now() - room.phase_entered_at)
            .to_std()
            .unwrap_or_default();
        let remaining = duration.saturating_sub(elapsed);
        self.timers
            .start(&room.code, room.phase, room.turn, remaining);
    }

    fn emit_player_list(&self, room: &Room) {
        self.broadcaster.emit_to_room(
            &room.code,
            &ServerEvent::PlayerListUpdated {
                players: room.summaries(),
                host: room.host,
            },
        );
    }

    fn roster_mode(&self) -> RosterMode {
        if self.config.small_room_mode {
            RosterMode::SmallRoom
        } else {
            RosterMode::Standard
        }
    }
}

/// The role a night action requires.
fn required_role(kind: NightActionKind) -> Role {
    match kind {
        NightActionKind::Kill => Role::Mafia,
        NightActionKind::Heal => Role::Doctor,
        NightActionKind::Check => Role::Detective,
    }
}

fn valid_name(
    raw: &str,
    what: &'static str,
) -> Result<String, EngineError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EngineError::Validation(format!("{what} is required")));
    }
    Ok(trimmed.to_string())
}

/// Receives fired deadlines and re-enters the engine. Ends when the
/// engine is dropped (the timer manager's sender goes with it).
async fn drive_expiries<S: RoomStore, B: Broadcaster>(
    engine: Weak<SessionEngine<S, B>>,
    mut expiry_rx: UnboundedReceiver<Expiry>,
) {
    while let Some(expiry) = expiry_rx.recv().await {
        let Some(engine) = engine.upgrade() else {
            break;
        };
        engine.handle_expiry(expiry).await;
    }
}
