//! Instrument prices, bounded price history, and structural status.
//!
//! The market only knows about prices. Moving a price past a threshold
//! marks the instrument; settling the split or bankruptcy (which also
//! touches every holder's position) is driven by the room.

use std::collections::{BTreeMap, VecDeque};

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::Symbol;

/// Price every instrument starts at, and returns to after a split or
/// bankruptcy.
pub const INITIAL_PRICE: Decimal = Decimal::ONE;

/// Maximum number of prices kept per instrument.
pub const HISTORY_CAPACITY: usize = 50;

/// Rounds to whole cents, halves away from zero.
pub fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Structural status of an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstrumentStatus {
    Normal,
    /// At or above 2.00: shares will double and the price resets.
    PendingSplit,
    /// At or below 0.00: holdings will be wiped and the price resets.
    Bankrupt,
}

impl InstrumentStatus {
    /// Status implied by a price.
    pub fn for_value(value: Decimal) -> Self {
        if value >= Decimal::TWO {
            Self::PendingSplit
        } else if value <= Decimal::ZERO {
            Self::Bankrupt
        } else {
            Self::Normal
        }
    }
}

/// One instrument's row on the quotation board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    current_value: Decimal,
    history: VecDeque<Decimal>,
    status: InstrumentStatus,
}

impl Instrument {
    fn fresh() -> Self {
        Self {
            current_value: INITIAL_PRICE,
            history: VecDeque::from([INITIAL_PRICE]),
            status: InstrumentStatus::Normal,
        }
    }

    pub fn current_value(&self) -> Decimal {
        self.current_value
    }

    /// Oldest first.
    pub fn history(&self) -> &VecDeque<Decimal> {
        &self.history
    }

    pub fn status(&self) -> InstrumentStatus {
        self.status
    }

    fn record(&mut self, value: Decimal) {
        self.history.push_back(value);
        while self.history.len() > HISTORY_CAPACITY {
            self.history.pop_front();
        }
    }
}

/// The full instrument table of a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Market {
    instruments: BTreeMap<Symbol, Instrument>,
}

impl Default for Market {
    fn default() -> Self {
        Self::new()
    }
}

impl Market {
    /// Every instrument at 1.00 with a one-entry history.
    pub fn new() -> Self {
        Self {
            instruments: Symbol::ALL
                .into_iter()
                .map(|s| (s, Instrument::fresh()))
                .collect(),
        }
    }

    pub fn instrument(&self, symbol: Symbol) -> &Instrument {
        // Every symbol is inserted by `new` and never removed.
        &self.instruments[&symbol]
    }

    pub fn price(&self, symbol: Symbol) -> Decimal {
        self.instrument(symbol).current_value
    }

    pub fn iter(&self) -> impl Iterator<Item = (Symbol, &Instrument)> {
        self.instruments.iter().map(|(s, i)| (*s, i))
    }

    fn entry(&mut self, symbol: Symbol) -> &mut Instrument {
        self.instruments
            .entry(symbol)
            .or_insert_with(Instrument::fresh)
    }

    /// Moves a price by `delta`, rounded to cents and floored at zero.
    ///
    /// Appends the new price to the history and returns the recomputed
    /// status.
    pub fn apply_move(&mut self, symbol: Symbol, delta: Decimal) -> InstrumentStatus {
        let next = self.price(symbol) + delta;
        self.set_price(symbol, next)
    }

    /// Forces a price as if the market had moved there.
    pub fn set_price(&mut self, symbol: Symbol, value: Decimal) -> InstrumentStatus {
        let value = round_cents(value).max(Decimal::ZERO);
        let instrument = self.entry(symbol);
        instrument.current_value = value;
        instrument.record(value);
        instrument.status = InstrumentStatus::for_value(value);
        instrument.status
    }

    /// Instruments waiting on a split or bankruptcy.
    pub fn pending_events(&self) -> Vec<(Symbol, InstrumentStatus)> {
        self.iter()
            .filter(|(_, i)| i.status != InstrumentStatus::Normal)
            .map(|(s, i)| (s, i.status))
            .collect()
    }

    /// Price back to 1.00, history appended.
    pub(crate) fn settle_split(&mut self, symbol: Symbol) {
        let instrument = self.entry(symbol);
        instrument.current_value = INITIAL_PRICE;
        instrument.record(INITIAL_PRICE);
        instrument.status = InstrumentStatus::Normal;
    }

    /// Price back to 1.00, history restarted.
    pub(crate) fn settle_bankruptcy(&mut self, symbol: Symbol) {
        *self.entry(symbol) = Instrument::fresh();
    }
}
