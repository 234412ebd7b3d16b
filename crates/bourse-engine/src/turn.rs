//! Turn order and round accounting.

/// Whose turn it is and how many full rounds are behind us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TurnCursor {
    pub index: usize,
    pub completed_rounds: u32,
}

/// Where the game goes once a turn is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextPhase {
    Rolling,
    OpenMarket,
    EndGame,
}

/// Moves the cursor `step` seats forward over `seated` players.
///
/// `step` is 1 after a normal turn and 0 when the roller's seat was
/// vacated, so the player who slid into it is not skipped. Running off the
/// end of the roster completes a round. The market opens only on the
/// round boundary itself, never on a mid-round advance.
pub fn advance(
    cursor: TurnCursor,
    seated: usize,
    step: usize,
    max_rounds: u32,
    trading_interval: u32,
) -> (TurnCursor, NextPhase) {
    let mut next = cursor;
    next.index += step;
    let wrapped = next.index >= seated;
    if wrapped {
        next.index = 0;
        next.completed_rounds += 1;
    }

    let phase = if next.completed_rounds >= max_rounds {
        NextPhase::EndGame
    } else if wrapped && next.completed_rounds % trading_interval.max(1) == 0 {
        NextPhase::OpenMarket
    } else {
        NextPhase::Rolling
    };
    (next, phase)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_mid_round_advance_keeps_rolling() {
        let (c, next) = advance(TurnCursor::default(), 3, 1, 20, 1);
        assert_eq!(c, TurnCursor { index: 1, completed_rounds: 0 });
        assert_eq!(next, NextPhase::Rolling);
    }

    #[test]
    fn test_wrap_completes_round_and_opens_market() {
        let start = TurnCursor { index: 2, completed_rounds: 0 };
        let (c, next) = advance(start, 3, 1, 20, 1);
        assert_eq!(c, TurnCursor { index: 0, completed_rounds: 1 });
        assert_eq!(next, NextPhase::OpenMarket);
    }

    #[test]
    fn test_market_opens_only_on_interval_multiples() {
        let start = TurnCursor { index: 0, completed_rounds: 0 };
        let (c, next) = advance(start, 1, 1, 20, 2);
        assert_eq!(c.completed_rounds, 1);
        assert_eq!(next, NextPhase::Rolling);
        let (c, next) = advance(c, 1, 1, 20, 2);
        assert_eq!(c.completed_rounds, 2);
        assert_eq!(next, NextPhase::OpenMarket);
    }

    #[test]
    fn test_final_round_ends_game() {
        let start = TurnCursor { index: 1, completed_rounds: 4 };
        let (c, next) = advance(start, 2, 1, 5, 1);
        assert_eq!(c.completed_rounds, 5);
        assert_eq!(next, NextPhase::EndGame);
    }

    #[test]
    fn test_zero_step_on_vacated_last_seat_wraps() {
        // Seat 2 of 3 forfeited mid-roll: two remain and the cursor sits past the end.
        let start = TurnCursor { index: 2, completed_rounds: 0 };
        let (c, next) = advance(start, 2, 0, 20, 1);
        assert_eq!(c, TurnCursor { index: 0, completed_rounds: 1 });
        assert_eq!(next, NextPhase::OpenMarket);
    }

    #[test]
    fn test_zero_step_mid_roster_stays_put() {
        let start = TurnCursor { index: 1, completed_rounds: 3 };
        let (c, next) = advance(start, 3, 0, 20, 1);
        assert_eq!(c, start);
        assert_eq!(next, NextPhase::Rolling);
    }

    proptest! {
        #[test]
        fn prop_game_ends_after_exactly_max_rounds(
            seated in 1usize..8,
            max_rounds in 1u32..15,
            interval in 1u32..5,
        ) {
            let mut cursor = TurnCursor::default();
            let mut turns = 0usize;
            loop {
                let (next, phase) = advance(cursor, seated, 1, max_rounds, interval);
                turns += 1;
                cursor = next;
                if phase == NextPhase::EndGame {
                    break;
                }
                prop_assert!(turns < seated * max_rounds as usize);
            }
            prop_assert_eq!(turns, seated * max_rounds as usize);
            prop_assert_eq!(cursor.completed_rounds, max_rounds);
        }

        #[test]
        fn prop_every_seat_rolls_once_per_round(seated in 1usize..8) {
            let mut cursor = TurnCursor::default();
            let mut order = vec![cursor.index];
            for _ in 1..seated {
                let (next, phase) = advance(cursor, seated, 1, u32::MAX, 1);
                prop_assert_eq!(phase, NextPhase::Rolling);
                cursor = next;
                order.push(cursor.index);
            }
            prop_assert_eq!(order, (0..seated).collect::<Vec<_>>());
            let (wrapped, _) = advance(cursor, seated, 1, u32::MAX, 1);
            prop_assert_eq!(wrapped, TurnCursor { index: 0, completed_rounds: 1 });
        }
    }
}
