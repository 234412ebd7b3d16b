//! Player-issued commands, as they arrive from the transport.

use serde::{Deserialize, Serialize};

use crate::{Rejection, SettingsPatch, Symbol};

/// Largest quantity a single trade may move.
pub const MAX_TRADE_QUANTITY: u32 = 10_000;

/// Longest display name, in characters, after trimming.
pub const MAX_NAME_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// A command from a seated player.
///
/// Internally tagged: `{ "type": "EXECUTE_TRADE", "side": "BUY", ... }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    StartGame,
    UpdateSettings { settings: SettingsPatch },
    SetReady { ready: bool },
    RollDice,
    ExecuteTrade {
        side: TradeSide,
        symbol: Symbol,
        quantity: u32,
    },
    RequestLoan,
    Forfeit,
}

impl Command {
    /// Checks the payload against its declared shape. Rule checks that
    /// depend on room state happen later.
    pub fn validate(&self) -> Result<(), Rejection> {
        match self {
            Self::ExecuteTrade { quantity, .. } => {
                if *quantity == 0 || *quantity > MAX_TRADE_QUANTITY {
                    return Err(Rejection::Invalid(format!(
                        "quantity must be between 1 and {MAX_TRADE_QUANTITY}"
                    )));
                }
                Ok(())
            }
            Self::UpdateSettings { settings } => settings.validate(),
            _ => Ok(()),
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartGame => "start",
            Self::UpdateSettings { .. } => "update settings",
            Self::SetReady { .. } => "set ready",
            Self::RollDice => "roll",
            Self::ExecuteTrade { .. } => "trade",
            Self::RequestLoan => "request a loan",
            Self::Forfeit => "forfeit",
        }
    }
}

/// Trims a display name and checks its length.
pub fn validate_display_name(name: &str) -> Result<String, Rejection> {
    let trimmed = name.trim();
    let len = trimmed.chars().count();
    if len == 0 || len > MAX_NAME_LEN {
        return Err(Rejection::Invalid(format!(
            "name must be 1 to {MAX_NAME_LEN} characters"
        )));
    }
    Ok(trimmed.to_owned())
}
