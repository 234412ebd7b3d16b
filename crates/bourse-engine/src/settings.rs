//! Per-room game settings and the host's partial updates to them.

use std::ops::RangeInclusive;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::Rejection;

/// Tunable rules of a game. Changeable only in the lobby, by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Cash every player starts with.
    pub initial_cash: Decimal,
    /// Completed rounds after which the game ends.
    pub max_rounds: u32,
    /// Rounds between open-market windows.
    pub trading_interval: u32,
    pub enable_loans: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            initial_cash: Decimal::from(5000),
            max_rounds: 20,
            trading_interval: 1,
            enable_loans: true,
        }
    }
}

impl Settings {
    pub const INITIAL_CASH: RangeInclusive<u32> = 100..=100_000;
    pub const MAX_ROUNDS: RangeInclusive<u32> = 1..=100;
    pub const TRADING_INTERVAL: RangeInclusive<u32> = 1..=20;

    /// Applies a validated patch. On error nothing is changed.
    pub fn apply(&mut self, patch: &SettingsPatch) -> Result<(), Rejection> {
        patch.validate()?;
        if let Some(cash) = patch.initial_cash {
            self.initial_cash = cash;
        }
        if let Some(rounds) = patch.max_rounds {
            self.max_rounds = rounds;
        }
        if let Some(interval) = patch.trading_interval {
            self.trading_interval = interval;
        }
        if let Some(loans) = patch.enable_loans {
            self.enable_loans = loans;
        }
        Ok(())
    }
}

/// A partial [`Settings`] update; absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_cash: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rounds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trading_interval: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_loans: Option<bool>,
}

impl SettingsPatch {
    pub fn validate(&self) -> Result<(), Rejection> {
        if let Some(cash) = self.initial_cash {
            let (lo, hi) = (
                Decimal::from(*Settings::INITIAL_CASH.start()),
                Decimal::from(*Settings::INITIAL_CASH.end()),
            );
            if cash < lo || cash > hi {
                return Err(Rejection::Invalid(format!(
                    "initialCash must be between {lo} and {hi}"
                )));
            }
        }
        check_range("maxRounds", self.max_rounds, &Settings::MAX_ROUNDS)?;
        check_range(
            "tradingInterval",
            self.trading_interval,
            &Settings::TRADING_INTERVAL,
        )?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

fn check_range(
    field: &str,
    value: Option<u32>,
    range: &RangeInclusive<u32>,
) -> Result<(), Rejection> {
    match value {
        Some(v) if !range.contains(&v) => Err(Rejection::Invalid(format!(
            "{field} must be between {} and {}",
            range.start(),
            range.end()
        ))),
        _ => Ok(()),
    }
}
