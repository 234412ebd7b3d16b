//! The three dice and the randomness seam behind them.
//!
//! Each die has six faces. Direction and magnitude dice carry every value
//! twice, so each outcome has a 2-in-6 chance. Faces are picked with
//! `random_range`, which samples without modulo bias.

use std::collections::VecDeque;
use std::fmt;

use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::Symbol;

/// Which way the rolled instrument moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Up,
    Down,
    Dividend,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Up => "UP",
            Self::Down => "DOWN",
            Self::Dividend => "DIVIDEND",
        })
    }
}

/// Size of a move or dividend, in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u32", try_from = "u32")]
pub enum Magnitude {
    Five,
    Ten,
    Twenty,
}

impl Magnitude {
    pub fn cents(self) -> u32 {
        match self {
            Self::Five => 5,
            Self::Ten => 10,
            Self::Twenty => 20,
        }
    }

    /// The magnitude as a dollar amount, e.g. `0.10`.
    pub fn amount(self) -> Decimal {
        Decimal::new(i64::from(self.cents()), 2)
    }
}

impl From<Magnitude> for u32 {
    fn from(m: Magnitude) -> Self {
        m.cents()
    }
}

impl TryFrom<u32> for Magnitude {
    type Error = String;

    fn try_from(cents: u32) -> Result<Self, Self::Error> {
        match cents {
            5 => Ok(Self::Five),
            10 => Ok(Self::Ten),
            20 => Ok(Self::Twenty),
            other => Err(format!("no die face shows {other}")),
        }
    }
}

pub const DIRECTION_FACES: [Direction; 6] = [
    Direction::Up,
    Direction::Down,
    Direction::Dividend,
    Direction::Up,
    Direction::Down,
    Direction::Dividend,
];

pub const MAGNITUDE_FACES: [Magnitude; 6] = [
    Magnitude::Five,
    Magnitude::Ten,
    Magnitude::Twenty,
    Magnitude::Five,
    Magnitude::Ten,
    Magnitude::Twenty,
];

/// One throw of all three dice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollResult {
    pub symbol: Symbol,
    pub direction: Direction,
    pub magnitude: Magnitude,
}

impl RollResult {
    pub fn new(symbol: Symbol, direction: Direction, magnitude: Magnitude) -> Self {
        Self {
            symbol,
            direction,
            magnitude,
        }
    }

    /// Throws the dice with the given generator.
    pub fn roll_with<R: Rng>(rng: &mut R) -> Self {
        Self {
            symbol: Symbol::ALL[rng.random_range(0..Symbol::ALL.len())],
            direction: DIRECTION_FACES[rng.random_range(0..DIRECTION_FACES.len())],
            magnitude: MAGNITUDE_FACES[rng.random_range(0..MAGNITUDE_FACES.len())],
        }
    }
}

impl fmt::Display for RollResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.symbol, self.direction, self.magnitude.cents())
    }
}

/// Source of dice rolls for a room.
pub trait DiceSource: Send {
    fn roll(&mut self) -> RollResult;
}

/// The thread-local CSPRNG, reseeded from the OS.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecureDice;

impl DiceSource for SecureDice {
    fn roll(&mut self) -> RollResult {
        RollResult::roll_with(&mut rand::rng())
    }
}

/// Any owned generator, e.g. a seeded `StdRng` for reproducible runs.
#[derive(Debug, Clone)]
pub struct RngDice<R>(pub R);

impl<R: Rng + Send> DiceSource for RngDice<R> {
    fn roll(&mut self) -> RollResult {
        RollResult::roll_with(&mut self.0)
    }
}

/// Plays back a fixed sequence of rolls, then falls back to [`SecureDice`].
#[derive(Debug, Clone, Default)]
pub struct ScriptedDice {
    script: VecDeque<RollResult>,
}

impl ScriptedDice {
    pub fn new(rolls: impl IntoIterator<Item = RollResult>) -> Self {
        Self {
            script: rolls.into_iter().collect(),
        }
    }

    pub fn push(&mut self, roll: RollResult) {
        self.script.push_back(roll);
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl DiceSource for ScriptedDice {
    fn roll(&mut self) -> RollResult {
        self.script.pop_front().unwrap_or_else(|| SecureDice.roll())
    }
}
