//! Game phases, their timers, and the generation counter that keeps
//! stale timers from firing into the wrong phase.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Length of the open-market countdown, in ticks.
pub const MARKET_COUNTDOWN: u32 = 60;

/// Where a room is in the game.
///
/// ```text
/// LOBBY → INITIAL_BUY_IN → ROLLING → RESOLVING_ROLL ─┬→ ROLLING
///                             ↑                      ├→ PAYING_DIVIDENDS → …
///                             │                      ├→ STOCK_EVENT_PHASE → …
///                             └──── OPEN_MARKET ←────┴→ END_GAME
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    #[default]
    Lobby,
    InitialBuyIn,
    Rolling,
    ResolvingRoll,
    PayingDividends,
    StockEventPhase,
    OpenMarket,
    EndGame,
}

impl Phase {
    /// Trading and readiness only matter in these two phases.
    pub fn is_trading_window(self) -> bool {
        matches!(self, Self::InitialBuyIn | Self::OpenMarket)
    }

    /// A game is running.
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Lobby | Self::EndGame)
    }

    /// A roll has been thrown and its turn advance is still pending.
    pub fn is_roll_in_flight(self) -> bool {
        matches!(
            self,
            Self::ResolvingRoll | Self::PayingDividends | Self::StockEventPhase
        )
    }

    /// New players may take a seat.
    pub fn is_joinable(self) -> bool {
        !self.is_active()
    }

    /// The timer this phase runs, if any.
    pub fn deadline(self) -> Option<Deadline> {
        match self {
            Self::ResolvingRoll => Some(Deadline::SettleRoll),
            Self::StockEventPhase => Some(Deadline::StructuralEvents),
            Self::OpenMarket => Some(Deadline::MarketTick),
            _ => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Lobby => "LOBBY",
            Self::InitialBuyIn => "INITIAL_BUY_IN",
            Self::Rolling => "ROLLING",
            Self::ResolvingRoll => "RESOLVING_ROLL",
            Self::PayingDividends => "PAYING_DIVIDENDS",
            Self::StockEventPhase => "STOCK_EVENT_PHASE",
            Self::OpenMarket => "OPEN_MARKET",
            Self::EndGame => "END_GAME",
        })
    }
}

/// A timer a phase needs from its host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Deadline {
    /// One-shot: apply the thrown roll.
    SettleRoll,
    /// One-shot: resolve splits and bankruptcies.
    StructuralEvents,
    /// Repeating: one tick of the open-market countdown.
    MarketTick,
}

impl Deadline {
    pub fn is_repeating(self) -> bool {
        matches!(self, Self::MarketTick)
    }
}

/// What the host should have armed right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerPlan {
    pub generation: u64,
    pub deadline: Deadline,
}

/// Current phase plus the counters tied to it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PhaseMachine {
    phase: Phase,
    countdown: u32,
    generation: u64,
}

impl PhaseMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Remaining open-market ticks; zero outside `OPEN_MARKET`.
    pub fn countdown(&self) -> u32 {
        self.countdown
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Enters `phase`, bumping the generation so any timer armed for the
    /// previous phase goes stale. Re-entering the same phase counts.
    pub fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        self.generation += 1;
        self.countdown = if phase == Phase::OpenMarket {
            MARKET_COUNTDOWN
        } else {
            0
        };
    }

    /// One market tick. Returns the remaining count.
    pub fn tick(&mut self) -> u32 {
        self.countdown = self.countdown.saturating_sub(1);
        self.countdown
    }

    pub fn timer_plan(&self) -> Option<TimerPlan> {
        self.phase.deadline().map(|deadline| TimerPlan {
            generation: self.generation,
            deadline,
        })
    }

    /// Whether a timer armed for `generation` still belongs to this phase.
    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }
}
