use rust_decimal::Decimal;

use crate::{Phase, Symbol};

/// Why the engine refused a command.
///
/// A refusal never changes room state. How loudly it is reported depends
/// on its [`RejectionKind`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Rejection {
    #[error("invalid command: {0}")]
    Invalid(String),

    #[error("player is not seated in this room")]
    UnknownPlayer,

    #[error("only the host can do that")]
    NotHost,

    #[error("it is not your turn")]
    NotYourTurn,

    #[error("cannot {action} during {phase}")]
    WrongPhase { action: &'static str, phase: Phase },

    #[error("room is full")]
    RoomFull,

    #[error("a game is already in progress")]
    GameInProgress,

    #[error("insufficient cash: need {needed}, have {available}")]
    InsufficientCash { needed: Decimal, available: Decimal },

    #[error("insufficient shares: requested {requested}, holding {held}")]
    InsufficientShares { requested: u64, held: u64 },

    #[error("{0} cannot be traded at zero")]
    NotTradable(Symbol),

    #[error("loans are disabled in this room")]
    LoansDisabled,

    #[error("emergency loan already used")]
    LoanAlreadyUsed,

    #[error("player is not bankrupt")]
    NotBankrupt,
}

/// How a [`Rejection`] is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    /// Malformed input. The caller is told why.
    Validation,
    /// Right input, wrong person or wrong time. The caller is told; the
    /// attempt is logged at warn level.
    Authorization,
    /// The game's rules forbid it. Dropped silently.
    DomainRule,
}

impl Rejection {
    pub fn kind(&self) -> RejectionKind {
        match self {
            Self::Invalid(_) => RejectionKind::Validation,
            Self::UnknownPlayer | Self::NotHost | Self::NotYourTurn => {
                RejectionKind::Authorization
            }
            Self::WrongPhase { .. }
            | Self::RoomFull
            | Self::GameInProgress
            | Self::InsufficientCash { .. }
            | Self::InsufficientShares { .. }
            | Self::NotTradable(_)
            | Self::LoansDisabled
            | Self::LoanAlreadyUsed
            | Self::NotBankrupt => RejectionKind::DomainRule,
        }
    }

    /// Whether the originating caller gets a diagnostic back.
    pub fn notifies_caller(&self) -> bool {
        !matches!(self.kind(), RejectionKind::DomainRule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(Rejection::Invalid("x".into()).kind(), RejectionKind::Validation);
        assert_eq!(Rejection::NotYourTurn.kind(), RejectionKind::Authorization);
        assert_eq!(Rejection::NotBankrupt.kind(), RejectionKind::DomainRule);
        assert!(Rejection::NotHost.notifies_caller());
        assert!(!Rejection::LoanAlreadyUsed.notifies_caller());
    }

    #[test]
    fn test_messages() {
        let err = Rejection::WrongPhase {
            action: "roll",
            phase: Phase::OpenMarket,
        };
        assert_eq!(err.to_string(), "cannot roll during OPEN_MARKET");
        let err = Rejection::InsufficientShares { requested: 4, held: 3 };
        assert_eq!(err.to_string(), "insufficient shares: requested 4, holding 3");
    }
}
