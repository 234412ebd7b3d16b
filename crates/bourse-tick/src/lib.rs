//! Per-room phase timer for Bourse.
//!
//! A room needs at most one timer at a time: a one-shot settle delay, a
//! one-shot structural-event delay, or the repeating market countdown.
//! [`PhaseTimer`] holds that single slot. Arming it replaces whatever was
//! there, and every firing carries the *generation* it was armed for, so
//! the room can recognize and drop a firing that belongs to a phase it has
//! already left.
//!
//! # Integration
//!
//! The timer sits inside a room actor's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = mailbox.recv() => { /* handle commands */ }
//!         fired = timer.wait() => {
//!             let batch = state.on_timer(fired.kind, fired.generation);
//!         }
//!     }
//!     sync_timer(&state, &mut timer);
//! }
//! ```
//!
//! When nothing is armed, [`PhaseTimer::wait`] pends forever, so the
//! `select!` only wakes for mailbox traffic.

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

/// When an armed timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Once, after the delay. The timer disarms itself.
    Once(Duration),
    /// Every period until canceled or re-armed.
    Every(Duration),
}

impl Schedule {
    fn delay(self) -> Duration {
        match self {
            Self::Once(d) | Self::Every(d) => d,
        }
    }
}

// ---------------------------------------------------------------------------
// Firing
// ---------------------------------------------------------------------------

/// A timer firing, returned by [`PhaseTimer::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired<K> {
    /// Generation the timer was armed for.
    pub generation: u64,
    /// What the timer was armed to do.
    pub kind: K,
    /// How many times this arming has fired, starting at 1.
    pub count: u64,
}

// ---------------------------------------------------------------------------
// Timer
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Armed<K> {
    generation: u64,
    kind: K,
    schedule: Schedule,
    next: Instant,
    count: u64,
}

/// A single cancelable slot for a one-shot or repeating deadline.
#[derive(Debug)]
pub struct PhaseTimer<K> {
    armed: Option<Armed<K>>,
}

impl<K> Default for PhaseTimer<K> {
    fn default() -> Self {
        Self { armed: None }
    }
}

impl<K: Copy + std::fmt::Debug> PhaseTimer<K> {
    /// An idle timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the timer, replacing anything already armed.
    pub fn arm(&mut self, generation: u64, kind: K, schedule: Schedule) {
        if let Some(prev) = &self.armed {
            debug!(
                old_generation = prev.generation,
                old_kind = ?prev.kind,
                generation,
                kind = ?kind,
                "timer re-armed"
            );
        }
        self.armed = Some(Armed {
            generation,
            kind,
            schedule,
            next: Instant::now() + schedule.delay(),
            count: 0,
        });
    }

    pub fn arm_once(&mut self, generation: u64, kind: K, delay: Duration) {
        self.arm(generation, kind, Schedule::Once(delay));
    }

    pub fn arm_every(&mut self, generation: u64, kind: K, period: Duration) {
        self.arm(generation, kind, Schedule::Every(period));
    }

    /// Disarms the timer. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(prev) = self.armed.take() {
            trace!(generation = prev.generation, kind = ?prev.kind, "timer canceled");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Generation of the armed timer, if any.
    pub fn generation(&self) -> Option<u64> {
        self.armed.as_ref().map(|a| a.generation)
    }

    pub fn kind(&self) -> Option<K> {
        self.armed.as_ref().map(|a| a.kind)
    }

    /// When the armed timer fires next.
    pub fn deadline(&self) -> Option<Instant> {
        self.armed.as_ref().map(|a| a.next)
    }

    /// Waits for the armed timer to fire.
    ///
    /// Pends forever while disarmed. Cancel-safe: dropping the future
    /// before it resolves leaves the timer armed as it was.
    pub async fn wait(&mut self) -> TimerFired<K> {
        let Some(armed) = self.armed.as_mut() else {
            // Disarmed: never resolves, select! serves the other branches.
            return std::future::pending().await;
        };
        let next = armed.next;

        time::sleep_until(next).await;

        let now = Instant::now();
        armed.count += 1;
        let fired = TimerFired {
            generation: armed.generation,
            kind: armed.kind,
            count: armed.count,
        };

        let schedule = armed.schedule;
        match schedule {
            Schedule::Once(_) => self.armed = None,
            Schedule::Every(period) => {
                let mut following = next + period;
                if following <= now {
                    let behind = now.saturating_duration_since(next).as_millis()
                        / period.as_millis().max(1);
                    warn!(
                        generation = fired.generation,
                        kind = ?fired.kind,
                        behind,
                        "repeating timer fell behind, skipping ahead"
                    );
                    following = now + period;
                }
                if let Some(armed) = self.armed.as_mut() {
                    armed.next = following;
                }
            }
        }

        trace!(generation = fired.generation, kind = ?fired.kind, count = fired.count, "timer fired");
        fired
    }
}
