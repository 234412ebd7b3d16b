//! Everything the engine tells the outside world.

use std::collections::BTreeMap;

use bourse_protocol::{PlayerId, RoomId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ConnectionStatus, Market, Phase, Player, RollResult, Settings, Symbol};

/// Outbound event. Adjacently tagged:
/// `{ "type": "PHASE_CHANGED", "data": { "phase": "ROLLING" } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Notification {
    /// The full room state. Sent after every mutation.
    StateSnapshot(Box<Snapshot>),
    PhaseChanged { phase: Phase },
    /// Announced as soon as the dice land, before the move is applied.
    DiceRolled { player: String, roll: RollResult },
    MarketUpdated { market: Market },
    TickerLogged { message: String },
    /// Reply to the joiner only.
    PlayerJoined { player: PlayerView },
    /// Reply to the offending caller only.
    Rejected { reason: String },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StateSnapshot(_) => "STATE_SNAPSHOT",
            Self::PhaseChanged { .. } => "PHASE_CHANGED",
            Self::DiceRolled { .. } => "DICE_ROLLED",
            Self::MarketUpdated { .. } => "MARKET_UPDATED",
            Self::TickerLogged { .. } => "TICKER_LOGGED",
            Self::PlayerJoined { .. } => "PLAYER_JOINED",
            Self::Rejected { .. } => "REJECTED",
        }
    }
}

/// A player as observers see them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub avatar: String,
    pub cash: Decimal,
    pub holdings: BTreeMap<Symbol, u64>,
    pub avg_cost: BTreeMap<Symbol, Decimal>,
    pub has_used_loan: bool,
    pub is_ready: bool,
    pub connection_status: ConnectionStatus,
    pub net_worth: Decimal,
}

impl PlayerView {
    pub fn of(player: &Player, market: &Market) -> Self {
        Self {
            id: player.id(),
            name: player.name().to_owned(),
            avatar: player.avatar().to_owned(),
            cash: player.cash(),
            holdings: player
                .holdings()
                .iter()
                .map(|(s, p)| (*s, p.quantity))
                .collect(),
            avg_cost: player
                .holdings()
                .iter()
                .map(|(s, p)| (*s, p.avg_cost))
                .collect(),
            has_used_loan: player.has_used_loan(),
            is_ready: player.is_ready(),
            connection_status: player.connection(),
            net_worth: player.net_worth(market),
        }
    }
}

/// Full room state, as broadcast to every seated player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub room_id: RoomId,
    pub phase: Phase,
    pub current_player_index: usize,
    pub current_player: Option<PlayerId>,
    pub host: Option<PlayerId>,
    pub completed_rounds: u32,
    /// Open-market seconds left; zero in other phases.
    pub market_timer: u32,
    pub settings: Settings,
    pub market: Market,
    /// Join order.
    pub players: Vec<PlayerView>,
    /// Oldest first.
    pub ticker_log: Vec<String>,
    pub last_roll: Option<RollResult>,
}

impl Snapshot {
    pub fn player(&self, id: PlayerId) -> Option<&PlayerView> {
        self.players.iter().find(|p| p.id == id)
    }
}
