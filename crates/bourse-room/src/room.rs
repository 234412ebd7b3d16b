//! Room actor: one Tokio task per game room.
//!
//! The actor owns the room's [`RoomState`] and its [`PhaseTimer`]. Players,
//! the gateway, and the sweeper reach it only through a [`RoomHandle`];
//! commands and timer firings are applied one at a time, in arrival order.

use std::sync::Arc;
use std::time::Duration;

use bourse_engine::{
    Command, Deadline, DiceSource, Dispatch, Phase, PlayerView, RoomState, Snapshot,
};
use bourse_protocol::{PlayerId, Recipient, RoomId};
use bourse_tick::PhaseTimer;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::{EventSink, RoomConfig, RoomError};

/// Requests a room actor serves.
pub(crate) enum RoomCommand {
    /// Seat a player, or reattach one returning to their seat.
    Join {
        player_id: PlayerId,
        name: String,
        avatar: Option<String>,
        reply: oneshot::Sender<Result<PlayerView, RoomError>>,
    },

    /// A game command from a seated player. Refusals travel back as
    /// notifications, not as a reply.
    Command {
        sender: PlayerId,
        command: Command,
    },

    /// The player's connection went away. The reply is sent once the
    /// seat is marked offline.
    Disconnect {
        player_id: PlayerId,
        reply: oneshot::Sender<()>,
    },

    GetInfo {
        reply: oneshot::Sender<RoomInfo>,
    },

    GetSnapshot {
        reply: oneshot::Sender<Snapshot>,
    },

    Shutdown,
}

/// Room metadata, without the game itself.
#[derive(Debug, Clone)]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub phase: Phase,
    /// Seated players, connected or not.
    pub player_count: usize,
    pub online_count: usize,
    pub max_players: usize,
    /// Time since the last join, command, or disconnect.
    pub idle_for: Duration,
}

/// Handle to a running room actor. Cheap to clone.
#[derive(Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    sender: mpsc::Sender<RoomCommand>,
}

impl std::fmt::Debug for RoomHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomHandle")
            .field("room_id", &self.room_id)
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

impl RoomHandle {
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// True once the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    fn unavailable(&self) -> RoomError {
        RoomError::Unavailable(self.room_id.clone())
    }

    /// Seats `player_id` under `name`.
    ///
    /// On success the player also receives `PLAYER_JOINED` and a snapshot
    /// through the event sink.
    pub async fn join(
        &self,
        player_id: PlayerId,
        name: impl Into<String>,
        avatar: Option<String>,
    ) -> Result<PlayerView, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::Join {
                player_id,
                name: name.into(),
                avatar,
                reply: reply_tx,
            })
            .await
            .map_err(|_| self.unavailable())?;
        reply_rx.await.map_err(|_| self.unavailable())?
    }

    /// Queues a game command (fire-and-forget).
    pub async fn command(&self, sender: PlayerId, command: Command) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Command { sender, command })
            .await
            .map_err(|_| self.unavailable())
    }

    /// Marks the player's seat offline. Returns after the room has
    /// applied it, so nothing the room broadcasts afterwards reaches them.
    pub async fn disconnect(&self, player_id: PlayerId) -> Result<(), RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::Disconnect {
                player_id,
                reply: reply_tx,
            })
            .await
            .map_err(|_| self.unavailable())?;
        reply_rx.await.map_err(|_| self.unavailable())
    }

    pub async fn info(&self) -> Result<RoomInfo, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::GetInfo { reply: reply_tx })
            .await
            .map_err(|_| self.unavailable())?;
        reply_rx.await.map_err(|_| self.unavailable())
    }

    /// The full game state as players see it.
    pub async fn snapshot(&self) -> Result<Snapshot, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::GetSnapshot { reply: reply_tx })
            .await
            .map_err(|_| self.unavailable())?;
        reply_rx.await.map_err(|_| self.unavailable())
    }

    /// Stops the actor. Pending timers die with it.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Shutdown)
            .await
            .map_err(|_| self.unavailable())
    }
}

struct RoomActor {
    state: RoomState,
    config: RoomConfig,
    timer: PhaseTimer<Deadline>,
    dice: Box<dyn DiceSource>,
    sink: Arc<dyn EventSink>,
    receiver: mpsc::Receiver<RoomCommand>,
    last_activity: Instant,
}

impl RoomActor {
    async fn run(mut self) {
        let room_id = self.state.room_id().clone();
        tracing::info!(%room_id, "room actor started");

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => {
                    let Some(cmd) = cmd else { break };
                    if !self.handle_command(cmd) {
                        tracing::info!(%room_id, "room shutting down");
                        break;
                    }
                }
                fired = self.timer.wait() => {
                    let batch = self.state.on_timer(fired.kind, fired.generation);
                    self.dispatch(batch);
                }
            }
            self.sync_timer();
        }

        self.timer.cancel();
        tracing::info!(%room_id, "room actor stopped");
    }

    /// Returns false when the actor should stop.
    fn handle_command(&mut self, cmd: RoomCommand) -> bool {
        match cmd {
            RoomCommand::Join {
                player_id,
                name,
                avatar,
                reply,
            } => {
                self.last_activity = Instant::now();
                let result = match self.state.join(player_id, &name, avatar.as_deref()) {
                    Ok((view, batch)) => {
                        self.dispatch(batch);
                        Ok(view)
                    }
                    Err(rejection) => {
                        tracing::debug!(
                            room_id = %self.state.room_id(),
                            %player_id,
                            %rejection,
                            "join refused"
                        );
                        Err(RoomError::Rejected(rejection))
                    }
                };
                let _ = reply.send(result);
            }
            RoomCommand::Command { sender, command } => {
                self.last_activity = Instant::now();
                let outcome = self.state.handle(sender, command, self.dice.as_mut());
                self.dispatch(outcome.dispatch);
            }
            RoomCommand::Disconnect { player_id, reply } => {
                self.last_activity = Instant::now();
                let batch = self.state.disconnect(player_id);
                self.dispatch(batch);
                let _ = reply.send(());
            }
            RoomCommand::GetInfo { reply } => {
                let _ = reply.send(self.info());
            }
            RoomCommand::GetSnapshot { reply } => {
                let _ = reply.send(self.state.snapshot());
            }
            RoomCommand::Shutdown => return false,
        }
        true
    }

    /// Keeps the timer slot in step with the phase the state is in.
    fn sync_timer(&mut self) {
        match self.state.timer_plan() {
            Some(plan) if self.timer.generation() != Some(plan.generation) => {
                let schedule = self.config.timing.schedule(plan.deadline);
                self.timer.arm(plan.generation, plan.deadline, schedule);
            }
            Some(_) => {}
            None => self.timer.cancel(),
        }
    }

    /// Fans a batch out to its recipients. `All` means every seated player
    /// who is online here. A player's subscription is shared by every room,
    /// so an offline seat may belong to someone now playing elsewhere.
    fn dispatch(&self, batch: Vec<Dispatch>) {
        for (recipient, notification) in batch {
            let notification = Arc::new(notification);
            match recipient {
                Recipient::All => {
                    for player in self.state.players().iter().filter(|p| p.is_online()) {
                        self.sink.deliver(player.id(), Arc::clone(&notification));
                    }
                }
                Recipient::Player(id) => {
                    // Unseated players (just forfeited) still get their
                    // last word; offline seats do not.
                    if self.state.player(id).is_none_or(|p| p.is_online()) {
                        self.sink.deliver(id, notification);
                    }
                }
            }
        }
    }

    fn info(&self) -> RoomInfo {
        RoomInfo {
            room_id: self.state.room_id().clone(),
            phase: self.state.phase(),
            player_count: self.state.players().len(),
            online_count: self.state.online_count(),
            max_players: self.state.capacity(),
            idle_for: self.last_activity.elapsed(),
        }
    }
}

/// Spawns a room actor and returns its handle.
///
/// The mailbox is bounded by `config.mailbox_size`; senders wait when it
/// is full.
pub(crate) fn spawn_room(
    room_id: RoomId,
    config: RoomConfig,
    sink: Arc<dyn EventSink>,
    dice: Box<dyn DiceSource>,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(config.mailbox_size.max(1));

    let actor = RoomActor {
        state: RoomState::with_capacity(room_id.clone(), config.max_players),
        config,
        timer: PhaseTimer::new(),
        dice,
        sink,
        receiver: rx,
        last_activity: Instant::now(),
    };

    tokio::spawn(actor.run());

    RoomHandle {
        room_id,
        sender: tx,
    }
}
