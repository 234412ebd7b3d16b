//! Game rules for Bourse, a dice-driven stock market.
//!
//! This crate is synchronous and does no I/O. A [`RoomState`] is driven by
//! three kinds of input (joins, player [`Command`]s, and fired timers) and
//! answers each with a batch of [`Notification`]s addressed to a
//! [`Recipient`](bourse_protocol::Recipient). The host decides how to
//! deliver them and when to fire the timers named by
//! [`RoomState::timer_plan`].
//!
//! # Key types
//!
//! - [`Market`]: six instruments with prices, history, and split/bankruptcy status
//! - [`Player`]: cash, positions, and weighted-average cost basis
//! - [`DiceSource`]: where rolls come from ([`SecureDice`] in production)
//! - [`PhaseMachine`]: the current [`Phase`] and its timer generation
//! - [`RoomState`]: everything above, plus turn order and the ticker

mod command;
mod dice;
mod error;
mod instrument;
mod ledger;
mod market;
mod notification;
mod phase;
mod room;
mod settings;
pub mod turn;

pub use command::{Command, MAX_NAME_LEN, MAX_TRADE_QUANTITY, TradeSide, validate_display_name};
pub use dice::{
    DIRECTION_FACES, DiceSource, Direction, MAGNITUDE_FACES, Magnitude, RngDice, RollResult,
    ScriptedDice, SecureDice,
};
pub use error::{Rejection, RejectionKind};
pub use instrument::Symbol;
pub use ledger::{ConnectionStatus, LOAN_AMOUNT, LOAN_REPAYMENT, Player, Position, TradeReceipt};
pub use market::{HISTORY_CAPACITY, INITIAL_PRICE, Instrument, InstrumentStatus, Market, round_cents};
pub use notification::{Notification, PlayerView, Snapshot};
pub use phase::{Deadline, MARKET_COUNTDOWN, Phase, PhaseMachine, TimerPlan};
pub use room::{DEFAULT_CAPACITY, Dispatch, Outcome, RoomState, TICKER_CAPACITY};
pub use settings::{Settings, SettingsPatch};
