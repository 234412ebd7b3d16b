//! The authoritative state of one game room and every transition on it.
//!
//! [`RoomState`] is a plain value. Each entry point takes `&mut self` plus
//! one input (a join, a player command, a disconnect, or a fired timer)
//! and returns the notifications that input produced. Scheduling those
//! timers is the host's job: after every input it reads
//! [`RoomState::timer_plan`] and arms or cancels accordingly.
//!
//! Any input that changes observable state ends its batch with exactly
//! one [`Notification::StateSnapshot`] for the whole room. A player the
//! input unseated gets a copy of it addressed to them alone.

use std::collections::VecDeque;

use bourse_protocol::{PlayerId, Recipient, RoomId};
use rust_decimal::Decimal;
use tracing::{debug, info, trace, warn};

use crate::command::validate_display_name;
use crate::turn::{self, NextPhase, TurnCursor};
use crate::{
    Command, ConnectionStatus, Deadline, DiceSource, Direction, InstrumentStatus, Market,
    Notification, Phase, PhaseMachine, Player, PlayerView, Rejection, RejectionKind, RollResult,
    Settings, Snapshot, Symbol, TimerPlan, TradeSide,
};

/// Ticker entries kept per room.
pub const TICKER_CAPACITY: usize = 50;

/// Seats per room unless configured otherwise.
pub const DEFAULT_CAPACITY: usize = 8;

/// A notification and who should receive it.
pub type Dispatch = (Recipient, Notification);

/// Result of handling a player command.
#[derive(Debug, Default)]
pub struct Outcome {
    pub dispatch: Vec<Dispatch>,
    /// Set when the command was refused. State is unchanged in that case,
    /// apart from an optional ticker line.
    pub rejection: Option<Rejection>,
}

#[derive(Default)]
struct Outbox {
    items: Vec<Dispatch>,
    dirty: bool,
    /// Players unseated by this batch. They get its closing snapshot too.
    departed: Vec<PlayerId>,
}

impl Outbox {
    fn broadcast(&mut self, notification: Notification) {
        self.items.push((Recipient::All, notification));
    }

    fn to(&mut self, player: PlayerId, notification: Notification) {
        self.items.push((Recipient::Player(player), notification));
    }

    fn touch(&mut self) {
        self.dirty = true;
    }

    fn depart(&mut self, player: PlayerId) {
        self.departed.push(player);
        self.dirty = true;
    }

    fn finish(mut self, state: &RoomState) -> Vec<Dispatch> {
        if self.dirty {
            let snapshot = Box::new(state.snapshot());
            for player in self.departed {
                self.items.push((
                    Recipient::Player(player),
                    Notification::StateSnapshot(snapshot.clone()),
                ));
            }
            self.items
                .push((Recipient::All, Notification::StateSnapshot(snapshot)));
        }
        self.items
    }
}

/// One room's game.
#[derive(Debug, Clone)]
pub struct RoomState {
    room_id: RoomId,
    capacity: usize,
    settings: Settings,
    machine: PhaseMachine,
    market: Market,
    /// Join order; seat 0 is the host.
    players: Vec<Player>,
    turn: TurnCursor,
    ticker: VecDeque<String>,
    last_roll: Option<RollResult>,
    /// Thrown but not yet applied.
    pending_roll: Option<RollResult>,
    /// The roller left while their roll was in flight, so the seat at the
    /// cursor already holds the next roller.
    roller_forfeited: bool,
}

impl RoomState {
    pub fn new(room_id: RoomId) -> Self {
        Self::with_capacity(room_id, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(room_id: RoomId, capacity: usize) -> Self {
        let mut ticker = VecDeque::with_capacity(TICKER_CAPACITY);
        ticker.push_back(format!("Game created in room {room_id}. Waiting for players..."));
        Self {
            room_id,
            capacity: capacity.max(1),
            settings: Settings::default(),
            machine: PhaseMachine::new(),
            market: Market::new(),
            players: Vec::new(),
            turn: TurnCursor::default(),
            ticker,
            last_roll: None,
            pending_roll: None,
            roller_forfeited: false,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn phase(&self) -> Phase {
        self.machine.phase()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn market(&self) -> &Market {
        &self.market
    }

    /// Seated players in join order.
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id() == id)
    }

    pub fn host(&self) -> Option<PlayerId> {
        self.players.first().map(Player::id)
    }

    pub fn turn_index(&self) -> usize {
        self.turn.index
    }

    /// The player whose roll it is, when the cursor points at a seat.
    pub fn current_player(&self) -> Option<PlayerId> {
        self.players.get(self.turn.index).map(Player::id)
    }

    pub fn completed_rounds(&self) -> u32 {
        self.turn.completed_rounds
    }

    pub fn countdown(&self) -> u32 {
        self.machine.countdown()
    }

    pub fn generation(&self) -> u64 {
        self.machine.generation()
    }

    /// Oldest first.
    pub fn ticker(&self) -> impl Iterator<Item = &str> {
        self.ticker.iter().map(String::as_str)
    }

    pub fn last_roll(&self) -> Option<RollResult> {
        self.last_roll
    }

    pub fn online_count(&self) -> usize {
        self.players.iter().filter(|p| p.is_online()).count()
    }

    /// The timer the host should have armed, if any.
    pub fn timer_plan(&self) -> Option<TimerPlan> {
        self.machine.timer_plan()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            room_id: self.room_id.clone(),
            phase: self.phase(),
            current_player_index: self.turn.index,
            current_player: self.current_player(),
            host: self.host(),
            completed_rounds: self.turn.completed_rounds,
            market_timer: self.machine.countdown(),
            settings: self.settings.clone(),
            market: self.market.clone(),
            players: self
                .players
                .iter()
                .map(|p| PlayerView::of(p, &self.market))
                .collect(),
            ticker_log: self.ticker.iter().cloned().collect(),
            last_roll: self.last_roll,
        }
    }

    /// Players ranked by net worth, richest first. Ties keep join order.
    pub fn standings(&self) -> Vec<(PlayerId, String, Decimal)> {
        let mut ranked: Vec<_> = self
            .players
            .iter()
            .map(|p| (p.id(), p.name().to_owned(), p.net_worth(&self.market)))
            .collect();
        ranked.sort_by(|a, b| b.2.cmp(&a.2));
        ranked
    }

    fn seat_of(&self, id: PlayerId) -> Option<usize> {
        self.players.iter().position(|p| p.id() == id)
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Seats a new player or reattaches a returning one.
    ///
    /// Returns the player's record (also sent to them alone as
    /// [`Notification::PlayerJoined`]) and the batch to dispatch.
    pub fn join(
        &mut self,
        id: PlayerId,
        name: &str,
        avatar: Option<&str>,
    ) -> Result<(PlayerView, Vec<Dispatch>), Rejection> {
        let name = validate_display_name(name)?;
        let avatar = avatar.unwrap_or_default().to_owned();
        let mut out = Outbox::default();

        match self.seat_of(id) {
            Some(seat) => {
                let player = &mut self.players[seat];
                let returning = !player.is_online();
                player.name = name.clone();
                player.avatar = avatar;
                player.connection = ConnectionStatus::Online;
                if returning {
                    info!(room_id = %self.room_id, player_id = %id, "player reconnected");
                    self.log(&mut out, format!("{name} reconnected."));
                }
            }
            None => {
                if self.players.len() >= self.capacity {
                    return Err(Rejection::RoomFull);
                }
                if !self.phase().is_joinable() {
                    return Err(Rejection::GameInProgress);
                }
                self.players.push(Player::new(
                    id,
                    name.clone(),
                    avatar,
                    self.settings.initial_cash,
                ));
                info!(
                    room_id = %self.room_id,
                    player_id = %id,
                    players = self.players.len(),
                    "player joined"
                );
                self.log(&mut out, format!("{name} joined the game."));
            }
        }
        out.touch();

        let view = self
            .player(id)
            .map(|p| PlayerView::of(p, &self.market))
            .ok_or(Rejection::UnknownPlayer)?;
        out.to(id, Notification::PlayerJoined { player: view.clone() });
        Ok((view, out.finish(self)))
    }

    /// Marks a player's connection as gone. Their seat and assets stay.
    pub fn disconnect(&mut self, id: PlayerId) -> Vec<Dispatch> {
        let mut out = Outbox::default();
        if let Some(seat) = self.seat_of(id) {
            if self.players[seat].is_online() {
                self.players[seat].connection = ConnectionStatus::Disconnected;
                let name = self.players[seat].name.clone();
                info!(room_id = %self.room_id, player_id = %id, "player disconnected");
                self.log(&mut out, format!("{name} disconnected."));
                out.touch();
                self.check_all_ready(&mut out);
            }
        }
        out.finish(self)
    }

    /// Applies one player command.
    pub fn handle(
        &mut self,
        sender: PlayerId,
        command: Command,
        dice: &mut dyn DiceSource,
    ) -> Outcome {
        let mut out = Outbox::default();
        let action = command.name();
        let result = command
            .validate()
            .and_then(|()| self.apply(sender, command, dice, &mut out));

        let rejection = match result {
            Ok(()) => None,
            Err(rejection) => {
                self.note_rejection(sender, action, &rejection, &mut out);
                Some(rejection)
            }
        };
        Outcome {
            dispatch: out.finish(self),
            rejection,
        }
    }

    /// Runs a fired timer. Timers armed for an earlier phase are ignored.
    pub fn on_timer(&mut self, deadline: Deadline, generation: u64) -> Vec<Dispatch> {
        if !self.machine.is_current(generation) || self.phase().deadline() != Some(deadline) {
            trace!(
                room_id = %self.room_id,
                ?deadline,
                generation,
                current = self.machine.generation(),
                "stale timer ignored"
            );
            return Vec::new();
        }
        trace!(room_id = %self.room_id, ?deadline, generation, "timer fired");

        let mut out = Outbox::default();
        match deadline {
            Deadline::SettleRoll => self.settle_roll(&mut out),
            Deadline::StructuralEvents => self.resolve_structural_events(&mut out),
            Deadline::MarketTick => self.market_tick(&mut out),
        }
        out.finish(self)
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    fn apply(
        &mut self,
        sender: PlayerId,
        command: Command,
        dice: &mut dyn DiceSource,
        out: &mut Outbox,
    ) -> Result<(), Rejection> {
        let seat = self.seat_of(sender).ok_or(Rejection::UnknownPlayer)?;
        match command {
            Command::StartGame => self.start(seat, out),
            Command::UpdateSettings { settings } => {
                self.require_host(seat)?;
                self.require_phase(Phase::Lobby, "update settings")?;
                self.settings.apply(&settings)?;
                out.touch();
                Ok(())
            }
            Command::SetReady { ready } => {
                self.players[seat].is_ready = ready;
                out.touch();
                self.check_all_ready(out);
                Ok(())
            }
            Command::RollDice => self.roll(seat, dice, out),
            Command::ExecuteTrade {
                side,
                symbol,
                quantity,
            } => self.trade(seat, side, symbol, u64::from(quantity), out),
            Command::RequestLoan => self.request_loan(seat, out),
            Command::Forfeit => self.forfeit(seat, out),
        }
    }

    fn note_rejection(
        &mut self,
        sender: PlayerId,
        action: &'static str,
        rejection: &Rejection,
        out: &mut Outbox,
    ) {
        match rejection.kind() {
            RejectionKind::Authorization => warn!(
                room_id = %self.room_id,
                player_id = %sender,
                action,
                %rejection,
                "unauthorized command"
            ),
            RejectionKind::Validation | RejectionKind::DomainRule => debug!(
                room_id = %self.room_id,
                player_id = %sender,
                action,
                %rejection,
                "command rejected"
            ),
        }
        if rejection.notifies_caller() {
            out.to(
                sender,
                Notification::Rejected {
                    reason: rejection.to_string(),
                },
            );
        }
        if *rejection == Rejection::NotBankrupt {
            if let Some(name) = self.player(sender).map(|p| p.name.clone()) {
                self.log(out, format!("{name} requested a loan but is not bankrupt yet."));
            }
        }
    }

    fn require_host(&self, seat: usize) -> Result<(), Rejection> {
        if seat == 0 {
            Ok(())
        } else {
            Err(Rejection::NotHost)
        }
    }

    fn require_phase(&self, phase: Phase, action: &'static str) -> Result<(), Rejection> {
        if self.phase() == phase {
            Ok(())
        } else {
            Err(Rejection::WrongPhase {
                action,
                phase: self.phase(),
            })
        }
    }

    fn start(&mut self, seat: usize, out: &mut Outbox) -> Result<(), Rejection> {
        self.require_host(seat)?;
        if self.phase().is_active() {
            return Err(Rejection::WrongPhase {
                action: "start",
                phase: self.phase(),
            });
        }

        let cash = self.settings.initial_cash;
        for player in &mut self.players {
            player.reset_assets(cash);
        }
        self.market = Market::new();
        self.turn = TurnCursor::default();
        self.ticker.clear();
        self.last_roll = None;
        self.pending_roll = None;
        self.roller_forfeited = false;

        info!(
            room_id = %self.room_id,
            players = self.players.len(),
            max_rounds = self.settings.max_rounds,
            "game started"
        );
        self.set_phase(Phase::InitialBuyIn, out);
        self.log(out, "Game started! Initial buy-in phase.".to_owned());
        Ok(())
    }

    fn roll(
        &mut self,
        seat: usize,
        dice: &mut dyn DiceSource,
        out: &mut Outbox,
    ) -> Result<(), Rejection> {
        self.require_phase(Phase::Rolling, "roll")?;
        if seat != self.turn.index {
            return Err(Rejection::NotYourTurn);
        }

        let roll = dice.roll();
        let name = self.players[seat].name.clone();
        self.last_roll = Some(roll);
        self.pending_roll = Some(roll);
        debug!(room_id = %self.room_id, %roll, "dice rolled");

        self.set_phase(Phase::ResolvingRoll, out);
        out.broadcast(Notification::DiceRolled {
            player: name.clone(),
            roll,
        });
        self.log(out, format!("{name} rolled {roll}."));
        Ok(())
    }

    fn trade(
        &mut self,
        seat: usize,
        side: TradeSide,
        symbol: Symbol,
        quantity: u64,
        out: &mut Outbox,
    ) -> Result<(), Rejection> {
        if !self.phase().is_trading_window() {
            return Err(Rejection::WrongPhase {
                action: "trade",
                phase: self.phase(),
            });
        }

        let price = self.market.price(symbol);
        let player = &mut self.players[seat];
        let message = match side {
            TradeSide::Buy => {
                player.buy(symbol, quantity, price)?;
                format!("{} bought {quantity} {symbol} @ ${price:.2}", player.name)
            }
            TradeSide::Sell => {
                let receipt = player.sell(symbol, quantity, price)?;
                format!(
                    "{} sold {quantity} {symbol} @ ${price:.2} (P/L {}, {}%)",
                    player.name,
                    signed(receipt.realized, 2),
                    signed(receipt.realized_pct, 1),
                )
            }
        };
        self.log(out, message);
        Ok(())
    }

    fn request_loan(&mut self, seat: usize, out: &mut Outbox) -> Result<(), Rejection> {
        if !self.settings.enable_loans {
            return Err(Rejection::LoansDisabled);
        }
        let player = &mut self.players[seat];
        let amount = player.take_loan(&self.market)?;
        let message = format!("{} took an emergency loan of ${amount:.2}", player.name);
        self.log(out, message);
        Ok(())
    }

    fn forfeit(&mut self, seat: usize, out: &mut Outbox) -> Result<(), Rejection> {
        let phase = self.phase();
        if !phase.is_active() {
            return Err(Rejection::WrongPhase {
                action: "forfeit",
                phase,
            });
        }

        let gone = self.players.remove(seat);
        out.depart(gone.id());
        info!(
            room_id = %self.room_id,
            player_id = %gone.id(),
            remaining = self.players.len(),
            "player forfeited"
        );
        self.log(out, format!("{} forfeited the game.", gone.name));

        if self.players.is_empty() {
            self.turn = TurnCursor::default();
            self.pending_roll = None;
            self.roller_forfeited = false;
            self.set_phase(Phase::Lobby, out);
            self.log(out, "Everyone left. Back to the lobby.".to_owned());
            return Ok(());
        }

        if seat < self.turn.index {
            self.turn.index -= 1;
        } else if seat == self.turn.index {
            if phase.is_roll_in_flight() {
                self.roller_forfeited = true;
            } else if phase == Phase::Rolling && self.turn.index >= self.players.len() {
                self.advance_by(0, out);
            }
        }

        if self.phase().is_trading_window() {
            self.check_all_ready(out);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Timed transitions
    // -----------------------------------------------------------------------

    fn settle_roll(&mut self, out: &mut Outbox) {
        let Some(roll) = self.pending_roll.take() else {
            self.advance_turn(out);
            return;
        };
        let symbol = roll.symbol;
        let amount = roll.magnitude.amount();

        match roll.direction {
            Direction::Up | Direction::Down => {
                let (delta, verb) = if roll.direction == Direction::Up {
                    (amount, "rose")
                } else {
                    (-amount, "fell")
                };
                let status = self.market.apply_move(symbol, delta);
                let price = self.market.price(symbol);
                self.log(out, format!("{symbol} {verb} ${amount:.2} to ${price:.2}."));
                out.broadcast(Notification::MarketUpdated {
                    market: self.market.clone(),
                });
                if status != InstrumentStatus::Normal {
                    self.set_phase(Phase::StockEventPhase, out);
                    return;
                }
            }
            Direction::Dividend => {
                self.set_phase(Phase::PayingDividends, out);
                self.pay_dividend(symbol, amount, out);
            }
        }
        self.advance_turn(out);
    }

    fn pay_dividend(&mut self, symbol: Symbol, per_share: Decimal, out: &mut Outbox) {
        let price = self.market.price(symbol);
        if price <= Decimal::ONE {
            self.log(
                out,
                format!("{symbol} pays no dividend at ${price:.2}. It must trade above $1.00."),
            );
            return;
        }
        let mut paid = Vec::new();
        for player in &mut self.players {
            if let Some(payout) = player.credit_dividend(symbol, per_share) {
                paid.push(format!(
                    "{} earned ${payout:.2} in dividends from {symbol}.",
                    player.name
                ));
            }
        }
        if paid.is_empty() {
            self.log(out, format!("{symbol} paid a dividend, but nobody holds any."));
        }
        for line in paid {
            self.log(out, line);
        }
    }

    fn resolve_structural_events(&mut self, out: &mut Outbox) {
        for (symbol, status) in self.market.pending_events() {
            match status {
                InstrumentStatus::Bankrupt => {
                    for player in &mut self.players {
                        player.apply_bankruptcy(symbol);
                    }
                    self.market.settle_bankruptcy(symbol);
                    self.log(
                        out,
                        format!("{symbol} IS BANKRUPT! All shares lost. Price reset to $1.00."),
                    );
                }
                InstrumentStatus::PendingSplit => {
                    for player in &mut self.players {
                        player.apply_split(symbol);
                    }
                    self.market.settle_split(symbol);
                    self.log(
                        out,
                        format!("{symbol} SPLIT! Shares doubled. Price reset to $1.00."),
                    );
                }
                InstrumentStatus::Normal => {}
            }
        }
        out.broadcast(Notification::MarketUpdated {
            market: self.market.clone(),
        });
        self.advance_turn(out);
    }

    fn market_tick(&mut self, out: &mut Outbox) {
        let remaining = self.machine.tick();
        if remaining == 0 {
            self.log(out, "Trading closed.".to_owned());
            self.set_phase(Phase::Rolling, out);
        } else if remaining % 5 == 0 || remaining <= 5 {
            out.touch();
        }
    }

    // -----------------------------------------------------------------------
    // Shared transitions
    // -----------------------------------------------------------------------

    fn advance_turn(&mut self, out: &mut Outbox) {
        let step = if std::mem::take(&mut self.roller_forfeited) {
            0
        } else {
            1
        };
        self.advance_by(step, out);
    }

    fn advance_by(&mut self, step: usize, out: &mut Outbox) {
        let (cursor, next) = turn::advance(
            self.turn,
            self.players.len(),
            step,
            self.settings.max_rounds,
            self.settings.trading_interval,
        );
        self.turn = cursor;
        match next {
            NextPhase::EndGame => self.end_game(out),
            NextPhase::OpenMarket => {
                self.log(out, "Market is open for trading!".to_owned());
                self.set_phase(Phase::OpenMarket, out);
            }
            NextPhase::Rolling => self.set_phase(Phase::Rolling, out),
        }
    }

    fn end_game(&mut self, out: &mut Outbox) {
        self.set_phase(Phase::EndGame, out);
        self.log(out, "Game over!".to_owned());
        let standings = self.standings();
        info!(
            room_id = %self.room_id,
            rounds = self.turn.completed_rounds,
            winner = standings.first().map(|(_, name, _)| name.as_str()),
            "game over"
        );
        for (rank, (_, name, worth)) in standings.into_iter().enumerate() {
            self.log(out, format!("#{} {name}: ${worth:.2}", rank + 1));
        }
    }

    /// Closes a trading window once every connected player is ready.
    fn check_all_ready(&mut self, out: &mut Outbox) {
        let phase = self.phase();
        if !phase.is_trading_window() {
            return;
        }
        let mut online = self.players.iter().filter(|p| p.is_online()).peekable();
        if online.peek().is_none() || !online.all(Player::is_ready) {
            return;
        }
        let line = if phase == Phase::InitialBuyIn {
            "Initial buys locked in. Rolling phase starting."
        } else {
            "All players ready. Trading closed early."
        };
        self.log(out, line.to_owned());
        self.set_phase(Phase::Rolling, out);
    }

    fn set_phase(&mut self, phase: Phase, out: &mut Outbox) {
        debug!(room_id = %self.room_id, from = %self.phase(), to = %phase, "phase change");
        self.machine.enter(phase);
        for player in &mut self.players {
            player.is_ready = false;
        }
        out.broadcast(Notification::PhaseChanged { phase });
        out.touch();
    }

    fn log(&mut self, out: &mut Outbox, message: String) {
        self.ticker.push_back(message.clone());
        while self.ticker.len() > TICKER_CAPACITY {
            self.ticker.pop_front();
        }
        out.broadcast(Notification::TickerLogged { message });
        out.touch();
    }
}

/// Fixed-point with an explicit sign, e.g. `+2.00` or `-12.5`.
fn signed(value: Decimal, dp: u32) -> String {
    let value = value.round_dp(dp);
    if value.is_sign_negative() && !value.is_zero() {
        format!("{value:.prec$}", prec = dp as usize)
    } else {
        format!("+{:.prec$}", value.abs(), prec = dp as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Magnitude, ScriptedDice, SettingsPatch};

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn room_with(n: u64) -> RoomState {
        let mut room = RoomState::new(RoomId::new("T"));
        for i in 1..=n {
            room.join(PlayerId(i), &format!("P{i}"), None).unwrap();
        }
        room
    }

    fn cmd(room: &mut RoomState, who: u64, command: Command) -> Outcome {
        room.handle(PlayerId(who), command, &mut ScriptedDice::default())
    }

    fn roll(room: &mut RoomState, who: u64, result: RollResult) -> Outcome {
        room.handle(PlayerId(who), Command::RollDice, &mut ScriptedDice::new([result]))
    }

    fn fire(room: &mut RoomState) -> Vec<Dispatch> {
        let plan = room.timer_plan().expect("a timer should be armed");
        room.on_timer(plan.deadline, plan.generation)
    }

    /// Starts the game and readies everybody into ROLLING.
    fn started(n: u64) -> RoomState {
        let mut room = room_with(n);
        assert!(cmd(&mut room, 1, Command::StartGame).rejection.is_none());
        for i in 1..=n {
            cmd(&mut room, i, Command::SetReady { ready: true });
        }
        assert_eq!(room.phase(), Phase::Rolling);
        room
    }

    fn up(symbol: Symbol, m: Magnitude) -> RollResult {
        RollResult::new(symbol, Direction::Up, m)
    }

    fn snapshots(batch: &[Dispatch]) -> usize {
        batch
            .iter()
            .filter(|(_, n)| matches!(n, Notification::StateSnapshot(_)))
            .count()
    }

    #[test]
    fn test_join_seats_player_with_initial_cash() {
        let mut room = RoomState::new(RoomId::new("T"));
        let (view, batch) = room.join(PlayerId(1), " Ada ", Some("owl")).unwrap();
        assert_eq!(view.name, "Ada");
        assert_eq!(view.avatar, "owl");
        assert_eq!(view.cash, d("5000"));
        assert_eq!(room.host(), Some(PlayerId(1)));
        assert!(batch.iter().any(|(to, n)| {
            *to == Recipient::Player(PlayerId(1)) && matches!(n, Notification::PlayerJoined { .. })
        }));
        assert_eq!(snapshots(&batch), 1);
        assert_eq!(batch.last().map(|(to, _)| to), Some(&Recipient::All));
    }

    #[test]
    fn test_join_refusals() {
        let mut room = RoomState::with_capacity(RoomId::new("T"), 1);
        room.join(PlayerId(1), "Ada", None).unwrap();
        assert_eq!(room.join(PlayerId(2), "Bob", None).unwrap_err(), Rejection::RoomFull);
        assert!(matches!(
            room.join(PlayerId(3), "", None).unwrap_err(),
            Rejection::Invalid(_)
        ));

        let mut room = started(1);
        assert_eq!(
            room.join(PlayerId(9), "Late", None).unwrap_err(),
            Rejection::GameInProgress
        );
        // A known identity can always come back.
        room.disconnect(PlayerId(1));
        assert!(room.join(PlayerId(1), "Ada", None).is_ok());
    }

    #[test]
    fn test_reconnect_keeps_assets_and_refreshes_name() {
        let mut room = room_with(1);
        cmd(&mut room, 1, Command::StartGame);
        cmd(
            &mut room,
            1,
            Command::ExecuteTrade {
                side: TradeSide::Buy,
                symbol: Symbol::Gold,
                quantity: 10,
            },
        );
        room.disconnect(PlayerId(1));
        assert_eq!(room.player(PlayerId(1)).unwrap().connection(), ConnectionStatus::Disconnected);

        let (view, _) = room.join(PlayerId(1), "Ada II", None).unwrap();
        assert_eq!(view.name, "Ada II");
        assert_eq!(view.connection_status, ConnectionStatus::Online);
        assert_eq!(view.holdings[&Symbol::Gold], 10);
        assert_eq!(room.players().len(), 1);
        assert!(room.ticker().any(|l| l == "Ada II reconnected."));
    }

    #[test]
    fn test_only_host_starts_and_configures() {
        let mut room = room_with(2);
        let outcome = cmd(&mut room, 2, Command::StartGame);
        assert_eq!(outcome.rejection, Some(Rejection::NotHost));
        assert_eq!(room.phase(), Phase::Lobby);
        assert_eq!(
            outcome.dispatch,
            vec![(
                Recipient::Player(PlayerId(2)),
                Notification::Rejected {
                    reason: "only the host can do that".into()
                }
            )]
        );

        let patch = SettingsPatch {
            max_rounds: Some(3),
            ..Default::default()
        };
        let outcome = cmd(&mut room, 2, Command::UpdateSettings { settings: patch.clone() });
        assert_eq!(outcome.rejection, Some(Rejection::NotHost));
        assert!(cmd(&mut room, 1, Command::UpdateSettings { settings: patch.clone() })
            .rejection
            .is_none());
        assert_eq!(room.settings().max_rounds, 3);

        cmd(&mut room, 1, Command::StartGame);
        let outcome = cmd(&mut room, 1, Command::UpdateSettings { settings: patch });
        assert!(matches!(outcome.rejection, Some(Rejection::WrongPhase { .. })));
    }

    #[test]
    fn test_out_of_turn_roll_is_refused_without_mutation() {
        let mut room = started(2);
        let before = room.snapshot();
        let outcome = roll(&mut room, 2, up(Symbol::Gold, Magnitude::Ten));
        assert_eq!(outcome.rejection, Some(Rejection::NotYourTurn));
        assert_eq!(room.snapshot(), before);
        assert!(outcome
            .dispatch
            .iter()
            .all(|(to, _)| *to == Recipient::Player(PlayerId(2))));
    }

    #[test]
    fn test_trade_outside_window_is_silent() {
        let mut room = started(1);
        let outcome = cmd(
            &mut room,
            1,
            Command::ExecuteTrade {
                side: TradeSide::Buy,
                symbol: Symbol::Oil,
                quantity: 1,
            },
        );
        assert!(matches!(outcome.rejection, Some(Rejection::WrongPhase { .. })));
        assert!(outcome.dispatch.is_empty());
    }

    #[test]
    fn test_invalid_quantity_is_reported_to_caller() {
        let mut room = room_with(1);
        cmd(&mut room, 1, Command::StartGame);
        let outcome = cmd(
            &mut room,
            1,
            Command::ExecuteTrade {
                side: TradeSide::Buy,
                symbol: Symbol::Oil,
                quantity: 10_001,
            },
        );
        assert!(matches!(outcome.rejection, Some(Rejection::Invalid(_))));
        assert_eq!(outcome.dispatch.len(), 1);
    }

    #[test]
    fn test_roll_announces_then_settles_after_timer() {
        let mut room = started(2);
        let outcome = roll(&mut room, 1, up(Symbol::Oil, Magnitude::Twenty));
        assert_eq!(room.phase(), Phase::ResolvingRoll);
        assert!(outcome.dispatch.iter().any(|(_, n)| matches!(
            n,
            Notification::DiceRolled { player, .. } if player == "P1"
        )));
        assert_eq!(snapshots(&outcome.dispatch), 1);
        // Not applied yet.
        assert_eq!(room.market().price(Symbol::Oil), d("1.00"));

        let batch = fire(&mut room);
        assert_eq!(room.market().price(Symbol::Oil), d("1.20"));
        assert_eq!(room.phase(), Phase::Rolling);
        assert_eq!(room.turn_index(), 1);
        assert!(batch
            .iter()
            .any(|(_, n)| matches!(n, Notification::MarketUpdated { .. })));
        assert_eq!(snapshots(&batch), 1);
    }

    #[test]
    fn test_stale_timer_is_ignored() {
        let mut room = started(1);
        roll(&mut room, 1, up(Symbol::Gold, Magnitude::Five));
        let plan = room.timer_plan().unwrap();
        room.on_timer(plan.deadline, plan.generation);
        let before = room.snapshot();

        assert!(room.on_timer(Deadline::SettleRoll, plan.generation).is_empty());
        assert_eq!(room.snapshot(), before);
    }

    #[test]
    fn test_dividend_pays_only_above_par() {
        let mut room = room_with(1);
        cmd(
            &mut room,
            1,
            Command::UpdateSettings {
                settings: SettingsPatch {
                    trading_interval: Some(5),
                    ..Default::default()
                },
            },
        );
        cmd(&mut room, 1, Command::StartGame);
        cmd(
            &mut room,
            1,
            Command::ExecuteTrade {
                side: TradeSide::Buy,
                symbol: Symbol::Grain,
                quantity: 100,
            },
        );
        cmd(&mut room, 1, Command::SetReady { ready: true });
        let cash = room.player(PlayerId(1)).unwrap().cash();

        let div = RollResult::new(Symbol::Grain, Direction::Dividend, Magnitude::Ten);
        roll(&mut room, 1, div);
        fire(&mut room);
        assert_eq!(room.player(PlayerId(1)).unwrap().cash(), cash);

        roll(&mut room, 1, up(Symbol::Grain, Magnitude::Five));
        fire(&mut room);
        roll(&mut room, 1, div);
        let batch = fire(&mut room);
        assert_eq!(room.player(PlayerId(1)).unwrap().cash(), cash + d("10.00"));
        assert!(batch.iter().any(|(_, n)| {
            *n == Notification::PhaseChanged { phase: Phase::PayingDividends }
        }));
        assert_eq!(room.phase(), Phase::Rolling);
    }

    #[test]
    fn test_bankruptcy_wipes_holders() {
        let mut room = room_with(1);
        cmd(&mut room, 1, Command::StartGame);
        cmd(
            &mut room,
            1,
            Command::ExecuteTrade {
                side: TradeSide::Buy,
                symbol: Symbol::Silver,
                quantity: 50,
            },
        );
        cmd(&mut room, 1, Command::SetReady { ready: true });
        room.market.set_price(Symbol::Silver, d("0.10"));

        roll(&mut room, 1, RollResult::new(Symbol::Silver, Direction::Down, Magnitude::Twenty));
        fire(&mut room);
        assert_eq!(room.phase(), Phase::StockEventPhase);
        assert_eq!(room.market().price(Symbol::Silver), Decimal::ZERO);
        assert_eq!(room.turn_index(), 0);

        fire(&mut room);
        let silver = room.market().instrument(Symbol::Silver);
        assert_eq!(silver.current_value(), d("1.00"));
        assert_eq!(silver.history().len(), 1);
        assert_eq!(room.player(PlayerId(1)).unwrap().position(Symbol::Silver).quantity, 0);
        assert_eq!(room.completed_rounds(), 1);
        assert_eq!(room.phase(), Phase::OpenMarket);
    }

    #[test]
    fn test_market_countdown_closes_trading() {
        let mut room = started(1);
        roll(&mut room, 1, up(Symbol::Gold, Magnitude::Five));
        fire(&mut room);
        assert_eq!(room.phase(), Phase::OpenMarket);
        assert_eq!(room.countdown(), 60);

        // Snapshots go out on multiples of five and for the last five ticks.
        let mut snapshot_ticks = Vec::new();
        for _ in 0..59 {
            let batch = fire(&mut room);
            if snapshots(&batch) == 1 {
                snapshot_ticks.push(room.countdown());
            }
        }
        assert_eq!(room.countdown(), 1);
        assert!(snapshot_ticks.contains(&55));
        assert!(!snapshot_ticks.contains(&54));
        assert!(snapshot_ticks.contains(&4));

        fire(&mut room);
        assert_eq!(room.phase(), Phase::Rolling);
        assert!(room.ticker().any(|l| l == "Trading closed."));
    }

    #[test]
    fn test_all_ready_closes_market_early() {
        let mut room = started(2);
        roll(&mut room, 1, up(Symbol::Gold, Magnitude::Five));
        fire(&mut room);
        roll(&mut room, 2, up(Symbol::Gold, Magnitude::Five));
        fire(&mut room);
        assert_eq!(room.phase(), Phase::OpenMarket);

        cmd(&mut room, 1, Command::SetReady { ready: true });
        assert_eq!(room.phase(), Phase::OpenMarket);
        // A disconnected player does not hold the market open.
        room.disconnect(PlayerId(2));
        assert_eq!(room.phase(), Phase::Rolling);
        assert_eq!(room.turn_index(), 0);
    }

    #[test]
    fn test_sell_logs_signed_profit() {
        let mut room = room_with(1);
        cmd(&mut room, 1, Command::StartGame);
        cmd(
            &mut room,
            1,
            Command::ExecuteTrade {
                side: TradeSide::Buy,
                symbol: Symbol::Bonds,
                quantity: 10,
            },
        );
        room.market.set_price(Symbol::Bonds, d("0.80"));
        cmd(
            &mut room,
            1,
            Command::ExecuteTrade {
                side: TradeSide::Sell,
                symbol: Symbol::Bonds,
                quantity: 10,
            },
        );
        assert!(room
            .ticker()
            .any(|l| l == "P1 sold 10 Bonds @ $0.80 (P/L -2.00, -20.0%)"));
    }

    #[test]
    fn test_loan_not_bankrupt_is_logged() {
        let mut room = started(1);
        let outcome = cmd(&mut room, 1, Command::RequestLoan);
        assert_eq!(outcome.rejection, Some(Rejection::NotBankrupt));
        assert!(room
            .ticker()
            .any(|l| l == "P1 requested a loan but is not bankrupt yet."));
        assert!(!outcome
            .dispatch
            .iter()
            .any(|(_, n)| matches!(n, Notification::Rejected { .. })));
    }

    #[test]
    fn test_loans_can_be_disabled() {
        let mut room = room_with(1);
        cmd(
            &mut room,
            1,
            Command::UpdateSettings {
                settings: SettingsPatch {
                    enable_loans: Some(false),
                    ..Default::default()
                },
            },
        );
        cmd(&mut room, 1, Command::StartGame);
        room.players[0].set_cash(Decimal::ZERO);
        let outcome = cmd(&mut room, 1, Command::RequestLoan);
        assert_eq!(outcome.rejection, Some(Rejection::LoansDisabled));
        assert_eq!(room.player(PlayerId(1)).unwrap().cash(), Decimal::ZERO);
    }

    #[test]
    fn test_forfeit_before_cursor_shifts_index() {
        let mut room = started(3);
        roll(&mut room, 1, up(Symbol::Gold, Magnitude::Five));
        fire(&mut room);
        assert_eq!(room.current_player(), Some(PlayerId(2)));

        cmd(&mut room, 1, Command::Forfeit);
        assert_eq!(room.turn_index(), 0);
        assert_eq!(room.current_player(), Some(PlayerId(2)));
        assert_eq!(room.host(), Some(PlayerId(2)));
    }

    #[test]
    fn test_forfeit_of_last_seat_while_rolling_completes_round() {
        let mut room = started(3);
        for who in [1, 2] {
            roll(&mut room, who, up(Symbol::Gold, Magnitude::Five));
            fire(&mut room);
        }
        assert_eq!(room.current_player(), Some(PlayerId(3)));

        cmd(&mut room, 3, Command::Forfeit);
        assert_eq!(room.completed_rounds(), 1);
        assert_eq!(room.turn_index(), 0);
        assert_eq!(room.phase(), Phase::OpenMarket);
    }

    #[test]
    fn test_forfeit_of_roller_mid_roll_does_not_skip_next() {
        let mut room = started(3);
        roll(&mut room, 1, up(Symbol::Gold, Magnitude::Five));
        cmd(&mut room, 1, Command::Forfeit);
        fire(&mut room);
        assert_eq!(room.phase(), Phase::Rolling);
        assert_eq!(room.current_player(), Some(PlayerId(2)));
        assert_eq!(room.completed_rounds(), 0);
    }

    #[test]
    fn test_forfeit_of_roller_during_split_keeps_next_roller() {
        let mut room = room_with(2);
        cmd(&mut room, 1, Command::StartGame);
        cmd(
            &mut room,
            2,
            Command::ExecuteTrade {
                side: TradeSide::Buy,
                symbol: Symbol::Gold,
                quantity: 4,
            },
        );
        cmd(&mut room, 1, Command::SetReady { ready: true });
        cmd(&mut room, 2, Command::SetReady { ready: true });
        room.market.set_price(Symbol::Gold, d("1.90"));

        roll(&mut room, 1, up(Symbol::Gold, Magnitude::Ten));
        fire(&mut room);
        assert_eq!(room.phase(), Phase::StockEventPhase);

        cmd(&mut room, 1, Command::Forfeit);
        fire(&mut room);
        assert_eq!(room.phase(), Phase::Rolling);
        assert_eq!(room.current_player(), Some(PlayerId(2)));
        assert_eq!(room.completed_rounds(), 0);
        assert_eq!(room.market().price(Symbol::Gold), d("1.00"));
        assert_eq!(room.player(PlayerId(2)).unwrap().position(Symbol::Gold).quantity, 8);
    }

    #[test]
    fn test_forfeit_closes_market_when_rest_are_ready() {
        let mut room = started(3);
        for who in 1..=3 {
            roll(&mut room, who, up(Symbol::Oil, Magnitude::Five));
            fire(&mut room);
        }
        assert_eq!(room.phase(), Phase::OpenMarket);
        cmd(&mut room, 2, Command::SetReady { ready: true });
        cmd(&mut room, 3, Command::SetReady { ready: true });
        assert_eq!(room.phase(), Phase::OpenMarket);

        cmd(&mut room, 1, Command::Forfeit);
        assert_eq!(room.phase(), Phase::Rolling);
        assert_eq!(room.current_player(), Some(PlayerId(2)));
        assert!(room.ticker().any(|l| l == "All players ready. Trading closed early."));
        assert_eq!(room.timer_plan(), None);
    }

    #[test]
    fn test_forfeit_ends_initial_buy_in_when_rest_are_ready() {
        let mut room = room_with(2);
        cmd(&mut room, 1, Command::StartGame);
        cmd(&mut room, 2, Command::SetReady { ready: true });
        assert_eq!(room.phase(), Phase::InitialBuyIn);

        cmd(&mut room, 1, Command::Forfeit);
        assert_eq!(room.phase(), Phase::Rolling);
        assert_eq!(room.host(), Some(PlayerId(2)));
        assert!(room
            .ticker()
            .any(|l| l == "Initial buys locked in. Rolling phase starting."));
    }

    #[test]
    fn test_forfeiting_player_gets_closing_snapshot() {
        let mut room = started(2);
        let outcome = cmd(&mut room, 2, Command::Forfeit);
        assert_eq!(snapshots(&outcome.dispatch), 2);
        let farewell = outcome.dispatch.iter().find_map(|(to, n)| match (to, n) {
            (Recipient::Player(PlayerId(2)), Notification::StateSnapshot(s)) => Some(s),
            _ => None,
        });
        let farewell = farewell.expect("forfeiting player should get a snapshot");
        assert!(farewell.player(PlayerId(2)).is_none());
        assert_eq!(farewell.players.len(), 1);
        assert_eq!(outcome.dispatch.last().map(|(to, _)| to), Some(&Recipient::All));
    }

    #[test]
    fn test_everyone_forfeits_back_to_lobby() {
        let mut room = started(2);
        roll(&mut room, 1, up(Symbol::Gold, Magnitude::Five));
        fire(&mut room);
        cmd(&mut room, 1, Command::Forfeit);
        cmd(&mut room, 2, Command::Forfeit);
        assert_eq!(room.phase(), Phase::Lobby);
        assert_eq!(room.turn_index(), 0);
        assert_eq!(room.completed_rounds(), 0);
        assert!(room.players().is_empty());
        assert_eq!(room.timer_plan(), None);
    }

    #[test]
    fn test_forfeit_not_allowed_in_lobby() {
        let mut room = room_with(2);
        let outcome = cmd(&mut room, 2, Command::Forfeit);
        assert!(matches!(outcome.rejection, Some(Rejection::WrongPhase { .. })));
        assert_eq!(room.players().len(), 2);
    }

    #[test]
    fn test_end_game_logs_standings() {
        let mut room = room_with(2);
        cmd(
            &mut room,
            1,
            Command::UpdateSettings {
                settings: SettingsPatch {
                    max_rounds: Some(1),
                    ..Default::default()
                },
            },
        );
        cmd(&mut room, 1, Command::StartGame);
        cmd(
            &mut room,
            2,
            Command::ExecuteTrade {
                side: TradeSide::Buy,
                symbol: Symbol::Gold,
                quantity: 100,
            },
        );
        cmd(&mut room, 1, Command::SetReady { ready: true });
        cmd(&mut room, 2, Command::SetReady { ready: true });
        roll(&mut room, 1, up(Symbol::Gold, Magnitude::Twenty));
        fire(&mut room);
        roll(&mut room, 2, up(Symbol::Oil, Magnitude::Five));
        fire(&mut room);

        assert_eq!(room.phase(), Phase::EndGame);
        assert_eq!(room.timer_plan(), None);
        let standings = room.standings();
        assert_eq!(standings[0].0, PlayerId(2));
        assert_eq!(standings[0].2, d("5020.00"));
        let log: Vec<_> = room.ticker().collect();
        let over = log.iter().position(|l| *l == "Game over!").unwrap();
        assert_eq!(log[over + 1], "#1 P2: $5020.00");
        assert_eq!(log[over + 2], "#2 P1: $5000.00");

        // Restart from END_GAME keeps the roster and settings.
        assert!(cmd(&mut room, 1, Command::StartGame).rejection.is_none());
        assert_eq!(room.phase(), Phase::InitialBuyIn);
        assert_eq!(room.players().len(), 2);
        assert_eq!(room.settings().max_rounds, 1);
        assert_eq!(room.player(PlayerId(2)).unwrap().cash(), d("5000"));
        assert_eq!(room.market().price(Symbol::Gold), d("1.00"));
    }

    #[test]
    fn test_ticker_is_bounded() {
        let mut room = room_with(1);
        cmd(&mut room, 1, Command::StartGame);
        for _ in 0..40 {
            for side in [TradeSide::Buy, TradeSide::Sell] {
                cmd(
                    &mut room,
                    1,
                    Command::ExecuteTrade {
                        side,
                        symbol: Symbol::Gold,
                        quantity: 1,
                    },
                );
            }
        }
        assert_eq!(room.ticker().count(), TICKER_CAPACITY);
        assert_eq!(room.snapshot().ticker_log.len(), TICKER_CAPACITY);
    }

    #[test]
    fn test_signed_formatting() {
        assert_eq!(signed(d("2"), 2), "+2.00");
        assert_eq!(signed(d("-2.5"), 1), "-2.5");
        assert_eq!(signed(Decimal::ZERO, 1), "+0.0");
    }
}
