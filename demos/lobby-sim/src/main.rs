//! A scripted four-player match, end to end, against an in-process
//! store and broadcaster.
//!
//! Run with `cargo run -p lobby-sim`. Every event a real transport
//! would push is printed in its wire form, so the whole night/day cycle
//! is visible: role deal, a kill, a check, the vote, the win, and the
//! lobby reset.

use std::sync::Arc;
use std::time::Duration;

use nocturne::SessionEngine;
use nocturne_protocol::{
    Codec, JsonCodec, NightActionKind, Phase, PlayerId, Role, RoomCode,
    ServerEvent,
};
use nocturne_room::{
    GameConfig, LocalBroadcaster, MemoryStore, RoomStore,
};
use tokio::sync::mpsc::UnboundedReceiver;

const HOST: PlayerId = PlayerId(1);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = GameConfig {
        night_duration: Duration::from_secs(2),
        day_duration: Duration::from_secs(3),
        ended_duration: Duration::from_secs(2),
        countdown_ticks: true,
        ..GameConfig::small_room()
    };

    let store = Arc::new(MemoryStore::new());
    let broadcaster = Arc::new(LocalBroadcaster::new());
    let engine = SessionEngine::spawn(
        Arc::clone(&store),
        Arc::clone(&broadcaster),
        config,
    );

    // Seat the table.
    let code = engine.create_room(HOST, "ana", "night shift").await?;
    for (id, name) in [(2, "bo"), (3, "cy"), (4, "di")] {
        engine.join_room(&code, PlayerId(id), name).await?;
    }

    // Print everything a transport would deliver.
    print_events("room", broadcaster.subscribe_room(&code));
    for id in 1..=4 {
        print_events(
            "private",
            broadcaster.subscribe_connection(PlayerId(id)),
        );
    }

    for id in 1..=4 {
        engine.toggle_ready(&code, PlayerId(id)).await?;
    }

    // The sim owns the store, so it may peek at the deal to script the
    // actors; a real client only ever sees its own `your_role`.
    let room = store.find_by_code(&code).await?.expect("room exists");
    let seat = |role: Role| {
        room.members
            .iter()
            .find(|m| m.role == Some(role))
            .map(|m| m.player)
    };
    let mafia = seat(Role::Mafia).expect("mafia dealt");
    let doctor = seat(Role::Doctor).expect("doctor dealt");
    let detective = seat(Role::Detective).expect("detective dealt");
    let villager = seat(Role::Villager).expect("villager dealt");

    // Night 1: the mafia goes for the doctor, the doctor guesses wrong,
    // the detective learns the truth.
    engine
        .submit_night_action(&code, mafia, NightActionKind::Kill, doctor)
        .await?;
    engine
        .submit_night_action(&code, detective, NightActionKind::Check, mafia)
        .await?;
    if let Err(err) = engine
        .submit_night_action(&code, doctor, NightActionKind::Heal, doctor)
        .await
    {
        // Self-heal is rejected; show the single-recipient error path.
        engine.report_rejection(doctor, &err);
    }
    engine
        .submit_night_action(&code, doctor, NightActionKind::Heal, villager)
        .await?;

    wait_for_phase(&store, &code, Phase::Day).await?;

    // Day 2: the detective talks, the town listens.
    for member in store
        .find_by_code(&code)
        .await?
        .expect("room exists")
        .living()
    {
        if member.player != mafia {
            engine.cast_vote(&code, member.player, mafia).await?;
        }
    }
    engine.skip_phase(&code, HOST).await?;

    wait_for_phase(&store, &code, Phase::Waiting).await?;
    tracing::info!(room = %code, "back in the lobby, simulation done");
    Ok(())
}

/// Polls the store until the room reaches `phase`.
async fn wait_for_phase(
    store: &MemoryStore,
    code: &RoomCode,
    phase: Phase,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        let room = store.find_by_code(code).await?.expect("room exists");
        if room.phase == phase {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Prints each event in the wire form a transport would push.
fn print_events(scope: &'static str, mut rx: UnboundedReceiver<ServerEvent>) {
    tokio::spawn(async move {
        let codec = JsonCodec;
        while let Some(event) = rx.recv().await {
            match codec.encode(&event) {
                Ok(bytes) => tracing::info!(
                    scope,
                    payload = %String::from_utf8_lossy(&bytes),
                    "event"
                ),
                Err(err) => tracing::warn!(scope, %err, "encode failed"),
            }
        }
    });
}
