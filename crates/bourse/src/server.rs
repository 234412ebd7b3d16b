//! `BourseServer` builder, accept loop, and idle-room sweeper.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bourse_protocol::{Codec, JsonCodec, PlayerId};
use bourse_room::{DiceFactory, RoomConfig, RoomManager, Subscribers};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::handler::handle_connection;
use crate::{BourseError, ServerConfig};

/// Identities handed to clients that arrive without a token start here,
/// well above the small numbers clients tend to pick for themselves.
pub(crate) const FRESH_ID_BASE: u64 = 1 << 32;

/// Shared by every connection task.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) rooms: Mutex<RoomManager>,
    pub(crate) subscribers: Arc<Subscribers>,
    pub(crate) codec: C,
    pub(crate) config: ServerConfig,
    next_player_id: AtomicU64,
    next_connection_id: AtomicU64,
}

impl<C: Codec> ServerState<C> {
    pub(crate) fn fresh_player_id(&self) -> PlayerId {
        PlayerId(self.next_player_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn next_connection_id(&self) -> u64 {
        self.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Builder for a [`BourseServer`].
///
/// ```rust,no_run
/// # async fn run() -> Result<(), bourse::BourseError> {
/// let server = bourse::BourseServer::builder()
///     .bind("127.0.0.1:3001")
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct BourseServerBuilder {
    config: ServerConfig,
    dice: Option<DiceFactory>,
}

impl BourseServerBuilder {
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            dice: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_owned();
        self
    }

    pub fn room_config(mut self, room: RoomConfig) -> Self {
        self.config.room = room;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Dice for every room this server creates. Rooms use secure
    /// randomness otherwise.
    pub fn dice(mut self, dice: DiceFactory) -> Self {
        self.dice = Some(dice);
        self
    }

    /// Binds the listener. Uses [`JsonCodec`] on the wire.
    pub async fn build(self) -> Result<BourseServer<JsonCodec>, BourseError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "listener bound");

        let subscribers = Arc::new(Subscribers::new());
        let mut rooms = RoomManager::new(self.config.room.clone(), subscribers.clone());
        if let Some(dice) = self.dice {
            rooms = rooms.with_dice(dice);
        }

        let state = Arc::new(ServerState {
            rooms: Mutex::new(rooms),
            subscribers,
            codec: JsonCodec,
            config: self.config,
            next_player_id: AtomicU64::new(FRESH_ID_BASE),
            next_connection_id: AtomicU64::new(1),
        });

        Ok(BourseServer { listener, state })
    }
}

impl Default for BourseServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Bourse server. Call [`run`](Self::run) to start serving.
pub struct BourseServer<C: Codec> {
    listener: TcpListener,
    state: Arc<ServerState<C>>,
}

impl BourseServer<JsonCodec> {
    pub fn builder() -> BourseServerBuilder {
        BourseServerBuilder::new()
    }
}

impl<C: Codec> BourseServer<C> {
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves until the process ends.
    pub async fn run(self) -> Result<(), BourseError> {
        self.run_until(std::future::pending()).await
    }

    /// Serves until `shutdown` completes.
    ///
    /// Each accepted socket gets its own task, so a slow WebSocket upgrade
    /// never holds up the accept loop.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<(), BourseError> {
        tracing::info!("bourse server running");
        let sweeper = tokio::spawn(sweep_idle_rooms(Arc::clone(&self.state)));
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let state = Arc::clone(&self.state);
                        let conn_id = state.next_connection_id();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, peer, conn_id, state).await {
                                tracing::debug!(conn_id, %peer, error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => tracing::error!(error = %e, "accept failed"),
                },
                () = &mut shutdown => break,
            }
        }

        sweeper.abort();
        tracing::info!("bourse server stopped");
        Ok(())
    }
}

/// Periodically destroys rooms nobody has used for `room_idle_ttl`.
async fn sweep_idle_rooms<C: Codec>(state: Arc<ServerState<C>>) {
    let ttl = state.config.room_idle_ttl;
    let mut interval = tokio::time::interval(state.config.sweep_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    interval.tick().await;

    loop {
        interval.tick().await;
        let reaped = state.rooms.lock().await.reap_idle(ttl).await;
        if !reaped.is_empty() {
            tracing::debug!(rooms = ?reaped, "sweeper destroyed idle rooms");
        }
    }
}
