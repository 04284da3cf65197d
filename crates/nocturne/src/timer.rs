//! Deadline scheduling: at most one pending deadline per room.
//!
//! Each armed deadline is a single spawned task sleeping until its
//! `tokio::time::Instant`: no shared polling loop, so per-room latency
//! stays bounded under load and tests can drive the clock with
//! `start_paused`. When the deadline fires, the task sends an [`Expiry`]
//! to the engine's driver; the engine re-enters its normal per-room
//! mutation discipline from there.
//!
//! # Staleness
//!
//! Two guards keep a late or raced deadline from double-advancing a
//! phase:
//!
//! 1. Every armed deadline carries a generation number. A task only
//!    reports if it still owns its room's timer slot at fire time;
//!    `start`, `clear`, and `force_expire` take the slot away.
//! 2. The [`Expiry`] records the `(phase, turn)` the deadline was armed
//!    for; the engine re-reads the room and silently drops the expiry if
//!    they no longer match.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use nocturne_protocol::{Phase, RoomCode, ServerEvent};
use nocturne_room::Broadcaster;

/// A deadline that fired: which room, and the `(phase, turn)` it was
/// armed for.
#[derive(Debug, Clone)]
pub struct Expiry {
    pub room: RoomCode,
    pub phase: Phase,
    pub turn: u32,
}

struct TimerEntry {
    generation: u64,
    phase: Phase,
    turn: u32,
    deadline: Instant,
    task: JoinHandle<()>,
}

/// Schedules and cancels per-room deadlines.
pub struct TimerManager<B: Broadcaster> {
    entries: Arc<Mutex<HashMap<RoomCode, TimerEntry>>>,
    expiry_tx: UnboundedSender<Expiry>,
    broadcaster: Arc<B>,
    /// Emit `timer_tick` countdown events to the room at 1 s granularity.
    countdown: bool,
    next_generation: AtomicU64,
}

impl<B: Broadcaster> TimerManager<B> {
    /// Creates the manager and the channel its expiries arrive on.
    pub fn new(
        broadcaster: Arc<B>,
        countdown: bool,
    ) -> (Self, UnboundedReceiver<Expiry>) {
        let (expiry_tx, expiry_rx) = mpsc::unbounded_channel();
        (
            Self {
                entries: Arc::new(Mutex::new(HashMap::new())),
                expiry_tx,
                broadcaster,
                countdown,
                next_generation: AtomicU64::new(1),
            },
            expiry_rx,
        )
    }

    /// Arms a deadline `remaining` from now for `(phase, turn)`,
    /// replacing any deadline the room already had. A zero `remaining`
    /// (e.g. a re-derived deadline that already passed) fires
    /// immediately.
    pub fn start(
        &self,
        room: &RoomCode,
        phase: Phase,
        turn: u32,
        remaining: Duration,
    ) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let deadline = Instant::now() + remaining;

        let entries = Arc::clone(&self.entries);
        let tx = self.expiry_tx.clone();
        let broadcaster = Arc::clone(&self.broadcaster);
        let countdown = self.countdown;
        let task_room = room.clone();

        // Holding the map lock across the spawn means the task cannot
        // observe the map before its own entry is inserted, even when
        // `remaining` is zero.
        let mut map = self.entries.lock().expect("timer map poisoned");
        let task = tokio::spawn(async move {
            if countdown {
                countdown_until(&*broadcaster, &task_room, deadline).await;
            } else {
                tokio::time::sleep_until(deadline).await;
            }

            // Claim the slot; a newer generation or a cleared slot means
            // this deadline no longer speaks for the room.
            let claimed = {
                let mut map = entries.lock().expect("timer map poisoned");
                match map.get(&task_room) {
                    Some(entry) if entry.generation == generation => {
                        map.remove(&task_room);
                        true
                    }
                    _ => false,
                }
            };
            if claimed {
                let _ = tx.send(Expiry {
                    room: task_room,
                    phase,
                    turn,
                });
            }
        });

        if let Some(old) = map.insert(
            room.clone(),
            TimerEntry {
                generation,
                phase,
                turn,
                deadline,
                task,
            },
        ) {
            old.task.abort();
            tracing::debug!(room = %room, "replaced pending deadline");
        }
        tracing::debug!(
            room = %room,
            %phase,
            turn,
            in_ms = remaining.as_millis() as u64,
            "deadline armed"
        );
    }

    /// Cancels the room's deadline. No-op when none is armed.
    pub fn clear(&self, room: &RoomCode) {
        let removed = self
            .entries
            .lock()
            .expect("timer map poisoned")
            .remove(room);
        if let Some(entry) = removed {
            entry.task.abort();
            tracing::debug!(room = %room, "deadline cleared");
        }
    }

    /// [`clear`](Self::clear) then [`start`](Self::start).
    pub fn restart(
        &self,
        room: &RoomCode,
        phase: Phase,
        turn: u32,
        remaining: Duration,
    ) {
        self.clear(room);
        self.start(room, phase, turn, remaining);
    }

    /// Time left on the room's deadline, or `None` when inactive.
    pub fn remaining(&self, room: &RoomCode) -> Option<Duration> {
        self.entries
            .lock()
            .expect("timer map poisoned")
            .get(room)
            .map(|entry| {
                entry.deadline.saturating_duration_since(Instant::now())
            })
    }

    /// Cancels the schedule and hands back the [`Expiry`] the scheduler
    /// would have sent, for the caller to process synchronously. `None`
    /// when no deadline is armed. Host authorization is the engine's
    /// check, not ours.
    pub fn force_expire(&self, room: &RoomCode) -> Option<Expiry> {
        let entry = self
            .entries
            .lock()
            .expect("timer map poisoned")
            .remove(room)?;
        entry.task.abort();
        tracing::debug!(room = %room, "deadline force-expired");
        Some(Expiry {
            room: room.clone(),
            phase: entry.phase,
            turn: entry.turn,
        })
    }
}

impl<B: Broadcaster> Drop for TimerManager<B> {
    fn drop(&mut self) {
        for entry in self.entries.lock().expect("timer map poisoned").values()
        {
            entry.task.abort();
        }
    }
}

/// Emits `timer_tick` to the room every second until the deadline.
async fn countdown_until<B: Broadcaster>(
    broadcaster: &B,
    room: &RoomCode,
    deadline: Instant,
) {
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return;
        }
        // Round up so the last tick reads "1", not "0".
        let remaining_secs =
            left.as_secs() + u64::from(left.subsec_nanos() > 0);
        broadcaster.emit_to_room(
            room,
            &ServerEvent::TimerTick { remaining_secs },
        );
        tokio::time::sleep(left.min(Duration::from_secs(1))).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nocturne_room::NullBroadcaster;

    fn manager(
        countdown: bool,
    ) -> (TimerManager<NullBroadcaster>, UnboundedReceiver<Expiry>) {
        TimerManager::new(Arc::new(NullBroadcaster), countdown)
    }

    fn code() -> RoomCode {
        RoomCode("AAAAAA".into())
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fires_with_armed_phase_and_turn() {
        let (timers, mut rx) = manager(false);
        timers.start(&code(), Phase::Night, 1, Duration::from_secs(30));

        let expiry = rx.recv().await.unwrap();
        assert_eq!(expiry.room, code());
        assert_eq!(expiry.phase, Phase::Night);
        assert_eq!(expiry.turn, 1);
        assert_eq!(timers.remaining(&code()), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_replaces_the_first() {
        let (timers, mut rx) = manager(false);
        timers.start(&code(), Phase::Night, 1, Duration::from_secs(30));
        timers.start(&code(), Phase::Day, 2, Duration::from_secs(60));

        // Only the second deadline ever reports.
        let expiry = rx.recv().await.unwrap();
        assert_eq!(expiry.phase, Phase::Day);
        assert_eq!(expiry.turn, 2);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_prevents_expiry_and_is_idempotent() {
        let (timers, mut rx) = manager(false);
        timers.start(&code(), Phase::Night, 1, Duration::from_secs(5));
        timers.clear(&code());
        timers.clear(&code());

        assert_eq!(timers.remaining(&code()), None);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_counts_down() {
        let (timers, _rx) = manager(false);
        timers.start(&code(), Phase::Day, 1, Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(20)).await;
        let left = timers.remaining(&code()).unwrap();
        assert!(left <= Duration::from_secs(40));
        assert!(left > Duration::from_secs(35));
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_expire_returns_expiry_exactly_once() {
        let (timers, mut rx) = manager(false);
        timers.start(&code(), Phase::Night, 3, Duration::from_secs(30));

        let expiry = timers.force_expire(&code()).unwrap();
        assert_eq!(expiry.phase, Phase::Night);
        assert_eq!(expiry.turn, 3);

        // The natural deadline must not also report.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
        // And a second force finds nothing.
        assert!(timers.force_expire(&code()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_resets_the_deadline() {
        let (timers, mut rx) = manager(false);
        timers.start(&code(), Phase::Night, 1, Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(8)).await;
        timers.restart(&code(), Phase::Night, 1, Duration::from_secs(10));

        // The original deadline (t+10) passes without firing.
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(rx.try_recv().is_err());

        let expiry = rx.recv().await.unwrap();
        assert_eq!(expiry.phase, Phase::Night);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_remaining_fires_immediately() {
        let (timers, mut rx) = manager(false);
        timers.start(&code(), Phase::Ended, 2, Duration::ZERO);
        let expiry = rx.recv().await.unwrap();
        assert_eq!(expiry.phase, Phase::Ended);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rooms_schedule_independently() {
        let (timers, mut rx) = manager(false);
        let a = RoomCode("AAAAAA".into());
        let b = RoomCode("BBBBBB".into());
        timers.start(&a, Phase::Night, 1, Duration::from_secs(10));
        timers.start(&b, Phase::Day, 4, Duration::from_secs(20));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.room, a);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.room, b);
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_emits_ticks_to_the_room() {
        use nocturne_room::LocalBroadcaster;

        let broadcaster = Arc::new(LocalBroadcaster::new());
        let (timers, mut rx) =
            TimerManager::new(Arc::clone(&broadcaster), true);
        let mut room_rx = broadcaster.subscribe_room(&code());

        timers.start(&code(), Phase::Night, 1, Duration::from_secs(3));
        rx.recv().await.unwrap();

        let mut ticks = Vec::new();
        while let Ok(ev) = room_rx.try_recv() {
            if let ServerEvent::TimerTick { remaining_secs } = ev {
                ticks.push(remaining_secs);
            }
        }
        assert_eq!(ticks, vec![3, 2, 1]);
    }
}
