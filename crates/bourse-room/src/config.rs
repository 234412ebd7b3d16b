//! Room configuration.

use std::time::Duration;

use bourse_engine::{DEFAULT_CAPACITY, Deadline};
use bourse_tick::Schedule;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RoomTiming
// ---------------------------------------------------------------------------

/// How long each timed phase lasts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomTiming {
    /// From the dice landing to the move being applied.
    pub settle: Duration,
    /// From a split or bankruptcy being flagged to it being resolved.
    pub structural: Duration,
    /// One step of the open-market countdown.
    pub market_tick: Duration,
}

impl Default for RoomTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(5500),
            structural: Duration::from_secs(2),
            market_tick: Duration::from_secs(1),
        }
    }
}

impl RoomTiming {
    /// The timer schedule backing a phase deadline.
    pub fn schedule(&self, deadline: Deadline) -> Schedule {
        match deadline {
            Deadline::SettleRoll => Schedule::Once(self.settle),
            Deadline::StructuralEvents => Schedule::Once(self.structural),
            Deadline::MarketTick => Schedule::Every(self.market_tick),
        }
    }
}

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Configuration shared by every room a manager spawns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Seats per room.
    pub max_players: usize,

    /// Depth of each room's command mailbox. Senders wait when it is full.
    pub mailbox_size: usize,

    pub timing: RoomTiming,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_players: DEFAULT_CAPACITY,
            mailbox_size: 64,
            timing: RoomTiming::default(),
        }
    }
}
