//! Per-player cash, holdings, and cost-basis accounting.

use std::collections::BTreeMap;

use bourse_protocol::PlayerId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::market::round_cents;
use crate::{Market, Rejection, Symbol};

/// Cash injected by the one-time emergency loan.
pub const LOAN_AMOUNT: Decimal = Decimal::from_parts(1000, 0, 0, false, 0);

/// What the loan costs at final scoring (principal plus interest).
pub const LOAN_REPAYMENT: Decimal = Decimal::from_parts(1500, 0, 0, false, 0);

/// Whether the player's connection is currently attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    Online,
    Disconnected,
}

/// Shares held in one instrument and their weighted-average cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub quantity: u64,
    pub avg_cost: Decimal,
}

impl Position {
    /// Total cost basis, `quantity × avg_cost`.
    pub fn cost_basis(&self) -> Decimal {
        self.avg_cost * Decimal::from(self.quantity)
    }
}

/// Outcome of an accepted trade.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeReceipt {
    pub symbol: Symbol,
    pub quantity: u64,
    pub price: Decimal,
    /// `price × quantity`.
    pub total: Decimal,
    /// Realized P/L on a sell, `(price − avg_cost) × quantity`. Zero on buys.
    pub realized: Decimal,
    /// Realized P/L as a percentage of the average cost. Zero when the
    /// average cost was zero.
    pub realized_pct: Decimal,
}

/// A seated player and their ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    id: PlayerId,
    pub(crate) name: String,
    pub(crate) avatar: String,
    cash: Decimal,
    holdings: BTreeMap<Symbol, Position>,
    has_used_loan: bool,
    pub(crate) is_ready: bool,
    pub(crate) connection: ConnectionStatus,
}

impl Player {
    pub fn new(id: PlayerId, name: String, avatar: String, cash: Decimal) -> Self {
        Self {
            id,
            name,
            avatar,
            cash,
            holdings: empty_holdings(),
            has_used_loan: false,
            is_ready: false,
            connection: ConnectionStatus::Online,
        }
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn avatar(&self) -> &str {
        &self.avatar
    }

    pub fn cash(&self) -> Decimal {
        self.cash
    }

    pub fn holdings(&self) -> &BTreeMap<Symbol, Position> {
        &self.holdings
    }

    pub fn position(&self, symbol: Symbol) -> Position {
        self.holdings.get(&symbol).copied().unwrap_or_default()
    }

    pub fn has_used_loan(&self) -> bool {
        self.has_used_loan
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready
    }

    pub fn connection(&self) -> ConnectionStatus {
        self.connection
    }

    pub fn is_online(&self) -> bool {
        self.connection == ConnectionStatus::Online
    }

    fn position_mut(&mut self, symbol: Symbol) -> &mut Position {
        self.holdings.entry(symbol).or_default()
    }

    /// Back to a fresh ledger for a new game. Identity and display
    /// attributes are kept.
    pub(crate) fn reset_assets(&mut self, cash: Decimal) {
        self.cash = cash;
        self.holdings = empty_holdings();
        self.has_used_loan = false;
        self.is_ready = false;
    }

    /// Buys `quantity` shares at `price`.
    ///
    /// # Errors
    /// - [`Rejection::Invalid`] for a zero quantity.
    /// - [`Rejection::NotTradable`] when the price is not positive.
    /// - [`Rejection::InsufficientCash`] when cash does not cover the cost.
    pub fn buy(
        &mut self,
        symbol: Symbol,
        quantity: u64,
        price: Decimal,
    ) -> Result<TradeReceipt, Rejection> {
        if quantity == 0 {
            return Err(Rejection::Invalid("quantity must be positive".into()));
        }
        if price <= Decimal::ZERO {
            return Err(Rejection::NotTradable(symbol));
        }
        let total = price * Decimal::from(quantity);
        if self.cash < total {
            return Err(Rejection::InsufficientCash {
                needed: total,
                available: self.cash,
            });
        }

        let position = self.position_mut(symbol);
        let held = Decimal::from(position.quantity);
        let bought = Decimal::from(quantity);
        position.avg_cost = round_cents((position.avg_cost * held + price * bought) / (held + bought));
        position.quantity += quantity;
        self.cash -= total;

        Ok(TradeReceipt {
            symbol,
            quantity,
            price,
            total,
            realized: Decimal::ZERO,
            realized_pct: Decimal::ZERO,
        })
    }

    /// Sells `quantity` shares at `price`. Closing the position resets its
    /// average cost to zero.
    ///
    /// # Errors
    /// - [`Rejection::Invalid`] for a zero quantity.
    /// - [`Rejection::InsufficientShares`] when fewer shares are held.
    pub fn sell(
        &mut self,
        symbol: Symbol,
        quantity: u64,
        price: Decimal,
    ) -> Result<TradeReceipt, Rejection> {
        if quantity == 0 {
            return Err(Rejection::Invalid("quantity must be positive".into()));
        }
        let held = self.position(symbol).quantity;
        if held < quantity {
            return Err(Rejection::InsufficientShares {
                requested: quantity,
                held,
            });
        }

        let total = price * Decimal::from(quantity);
        let position = self.position_mut(symbol);
        let avg_cost = position.avg_cost;
        position.quantity -= quantity;
        if position.quantity == 0 {
            position.avg_cost = Decimal::ZERO;
        }
        self.cash += total;

        let realized = (price - avg_cost) * Decimal::from(quantity);
        let realized_pct = if avg_cost.is_zero() {
            Decimal::ZERO
        } else {
            (price - avg_cost) / avg_cost * Decimal::ONE_HUNDRED
        };

        Ok(TradeReceipt {
            symbol,
            quantity,
            price,
            total,
            realized,
            realized_pct,
        })
    }

    /// Pays `per_share` for every share held. Returns the payout, or `None`
    /// when nothing is held.
    pub(crate) fn credit_dividend(&mut self, symbol: Symbol, per_share: Decimal) -> Option<Decimal> {
        let quantity = self.position(symbol).quantity;
        if quantity == 0 {
            return None;
        }
        let payout = per_share * Decimal::from(quantity);
        self.cash += payout;
        Some(payout)
    }

    /// Doubles the share count and halves the average cost. The halving
    /// is exact (it may leave a half cent) so the cost basis is unchanged.
    /// The count saturates at `u64::MAX`.
    pub(crate) fn apply_split(&mut self, symbol: Symbol) {
        let position = self.position_mut(symbol);
        if position.quantity == 0 {
            return;
        }
        position.quantity = position.quantity.saturating_mul(2);
        position.avg_cost /= Decimal::TWO;
    }

    /// Wipes the position entirely.
    pub(crate) fn apply_bankruptcy(&mut self, symbol: Symbol) {
        *self.position_mut(symbol) = Position::default();
    }

    /// Market value of every holding at current prices.
    pub fn portfolio_value(&self, market: &Market) -> Decimal {
        self.holdings
            .iter()
            .map(|(symbol, pos)| market.price(*symbol) * Decimal::from(pos.quantity))
            .sum()
    }

    /// Out of cash with nothing worth selling.
    pub fn is_insolvent(&self, market: &Market) -> bool {
        self.cash <= Decimal::ZERO
            && self
                .holdings
                .iter()
                .all(|(symbol, pos)| pos.quantity == 0 || market.price(*symbol) <= Decimal::ZERO)
    }

    /// Grants the one-time emergency loan.
    ///
    /// # Errors
    /// - [`Rejection::LoanAlreadyUsed`] on a second request.
    /// - [`Rejection::NotBankrupt`] while the player still has cash or
    ///   sellable shares.
    pub fn take_loan(&mut self, market: &Market) -> Result<Decimal, Rejection> {
        if self.has_used_loan {
            return Err(Rejection::LoanAlreadyUsed);
        }
        if !self.is_insolvent(market) {
            return Err(Rejection::NotBankrupt);
        }
        self.has_used_loan = true;
        self.cash += LOAN_AMOUNT;
        Ok(LOAN_AMOUNT)
    }

    /// Cash plus holdings at market, less the loan repayment if a loan was
    /// taken.
    pub fn net_worth(&self, market: &Market) -> Decimal {
        let repayment = if self.has_used_loan {
            LOAN_REPAYMENT
        } else {
            Decimal::ZERO
        };
        self.cash + self.portfolio_value(market) - repayment
    }

    #[cfg(test)]
    pub(crate) fn set_cash(&mut self, cash: Decimal) {
        self.cash = cash;
    }
}

fn empty_holdings() -> BTreeMap<Symbol, Position> {
    Symbol::ALL.into_iter().map(|s| (s, Position::default())).collect()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn player(cash: &str) -> Player {
        Player::new(PlayerId(1), "Ada".into(), String::new(), d(cash))
    }

    #[test]
    fn test_new_player_holds_nothing() {
        let p = player("5000");
        assert_eq!(p.holdings().len(), 6);
        assert!(p.holdings().values().all(|pos| pos.quantity == 0));
        assert!(p.is_online());
        assert!(!p.has_used_loan());
    }

    #[test]
    fn test_buy_updates_weighted_average() {
        let mut p = player("1000");
        p.buy(Symbol::Gold, 100, d("1.00")).unwrap();
        p.buy(Symbol::Gold, 50, d("1.30")).unwrap();

        let pos = p.position(Symbol::Gold);
        assert_eq!(pos.quantity, 150);
        // (1.00 * 100 + 1.30 * 50) / 150 = 1.10
        assert_eq!(pos.avg_cost, d("1.10"));
        assert_eq!(p.cash(), d("835.00"));
    }

    #[test]
    fn test_buy_average_is_rounded_to_cents() {
        let mut p = player("1000");
        p.buy(Symbol::Oil, 2, d("1.00")).unwrap();
        p.buy(Symbol::Oil, 1, d("1.05")).unwrap();
        // 3.05 / 3 = 1.01666..
        assert_eq!(p.position(Symbol::Oil).avg_cost, d("1.02"));
    }

    #[test]
    fn test_buy_rejects_insufficient_cash() {
        let mut p = player("10");
        let err = p.buy(Symbol::Gold, 11, d("1.00")).unwrap_err();
        assert!(matches!(err, Rejection::InsufficientCash { .. }));
        assert_eq!(p.cash(), d("10"));
        assert_eq!(p.position(Symbol::Gold).quantity, 0);
    }

    #[test]
    fn test_buy_with_exact_cash_succeeds() {
        let mut p = player("10");
        p.buy(Symbol::Gold, 10, d("1.00")).unwrap();
        assert_eq!(p.cash(), Decimal::ZERO);
    }

    #[test]
    fn test_buy_rejects_worthless_instrument_and_zero_quantity() {
        let mut p = player("10");
        assert_eq!(
            p.buy(Symbol::Grain, 1, Decimal::ZERO).unwrap_err(),
            Rejection::NotTradable(Symbol::Grain)
        );
        assert!(matches!(
            p.buy(Symbol::Grain, 0, d("1.00")).unwrap_err(),
            Rejection::Invalid(_)
        ));
    }

    #[test]
    fn test_sell_realizes_profit() {
        let mut p = player("100");
        p.buy(Symbol::Silver, 10, d("1.00")).unwrap();
        let receipt = p.sell(Symbol::Silver, 4, d("1.50")).unwrap();
        assert_eq!(receipt.realized, d("2.00"));
        assert_eq!(receipt.realized_pct, d("50"));
        assert_eq!(p.position(Symbol::Silver).quantity, 6);
        assert_eq!(p.position(Symbol::Silver).avg_cost, d("1.00"));
        assert_eq!(p.cash(), d("96.00"));
    }

    #[test]
    fn test_sell_closing_position_resets_average() {
        let mut p = player("100");
        p.buy(Symbol::Bonds, 10, d("1.20")).unwrap();
        p.sell(Symbol::Bonds, 10, d("0.80")).unwrap();
        assert_eq!(p.position(Symbol::Bonds), Position::default());
    }

    #[test]
    fn test_sell_rejects_more_than_held() {
        let mut p = player("100");
        p.buy(Symbol::Bonds, 3, d("1.00")).unwrap();
        let err = p.sell(Symbol::Bonds, 4, d("1.00")).unwrap_err();
        assert_eq!(err, Rejection::InsufficientShares { requested: 4, held: 3 });
    }

    #[test]
    fn test_split_preserves_cost_basis() {
        let mut p = player("100");
        p.buy(Symbol::Gold, 4, d("1.50")).unwrap();
        let before = p.position(Symbol::Gold).cost_basis();
        p.apply_split(Symbol::Gold);
        let pos = p.position(Symbol::Gold);
        assert_eq!(pos.quantity, 8);
        assert_eq!(pos.avg_cost, d("0.75"));
        assert_eq!(pos.cost_basis(), before);
    }

    #[test]
    fn test_bankruptcy_wipes_position() {
        let mut p = player("100");
        p.buy(Symbol::Oil, 7, d("1.10")).unwrap();
        p.apply_bankruptcy(Symbol::Oil);
        assert_eq!(p.position(Symbol::Oil), Position::default());
    }

    #[test]
    fn test_dividend_pays_per_share() {
        let mut p = player("100");
        p.buy(Symbol::Grain, 20, d("1.00")).unwrap();
        let paid = p.credit_dividend(Symbol::Grain, d("0.10"));
        assert_eq!(paid, Some(d("2.00")));
        assert_eq!(p.cash(), d("82.00"));
        assert_eq!(p.credit_dividend(Symbol::Gold, d("0.10")), None);
    }

    #[test]
    fn test_loan_requires_insolvency_and_is_one_time() {
        let market = Market::new();
        let mut p = player("0");
        assert_eq!(p.take_loan(&market).unwrap(), d("1000"));
        assert_eq!(p.cash(), d("1000"));
        assert!(p.has_used_loan());

        p.set_cash(Decimal::ZERO);
        assert_eq!(p.take_loan(&market).unwrap_err(), Rejection::LoanAlreadyUsed);
        assert_eq!(p.cash(), Decimal::ZERO);
    }

    #[test]
    fn test_loan_refused_with_sellable_shares() {
        let market = Market::new();
        let mut p = player("1");
        p.buy(Symbol::Gold, 1, d("1.00")).unwrap();
        assert_eq!(p.cash(), Decimal::ZERO);
        assert_eq!(p.take_loan(&market).unwrap_err(), Rejection::NotBankrupt);
        assert!(!p.has_used_loan());
    }

    #[test]
    fn test_split_of_odd_cent_average_keeps_half_cent() {
        let mut p = player("100");
        p.buy(Symbol::Gold, 3, d("1.01")).unwrap();
        p.apply_split(Symbol::Gold);
        assert_eq!(p.position(Symbol::Gold).avg_cost, d("0.505"));
        assert_eq!(p.position(Symbol::Gold).cost_basis(), d("3.03"));
    }

    #[test]
    fn test_repeated_splits_saturate_share_count() {
        let mut p = player("100");
        p.buy(Symbol::Gold, 3, d("1.00")).unwrap();
        for _ in 0..70 {
            p.apply_split(Symbol::Gold);
        }
        assert_eq!(p.position(Symbol::Gold).quantity, u64::MAX);
    }

    proptest! {
        #[test]
        fn prop_split_preserves_cost_basis(quantity in 1u64..10_000, cents in 1i64..500) {
            let mut p = player("1000000");
            p.buy(Symbol::Oil, quantity, Decimal::new(cents, 2)).unwrap();
            let before = p.position(Symbol::Oil);
            p.apply_split(Symbol::Oil);
            let after = p.position(Symbol::Oil);
            prop_assert_eq!(after.quantity, before.quantity * 2);
            prop_assert_eq!(after.cost_basis(), before.cost_basis());
        }
    }

    #[test]
    fn test_net_worth_deducts_loan_repayment() {
        let mut market = Market::new();
        let mut p = player("0");
        p.take_loan(&market).unwrap();
        p.buy(Symbol::Gold, 100, d("1.00")).unwrap();
        market.set_price(Symbol::Gold, d("1.50"));
        // 900 cash + 150 shares value - 1500 repayment
        assert_eq!(p.net_worth(&market), d("-450.00"));
    }
}
