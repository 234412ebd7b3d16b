//! Per-connection handler: upgrade, handshake, then message routing.
//!
//! Each accepted socket gets its own Tokio task running this handler.
//! The flow is:
//!   1. Upgrade to WebSocket
//!   2. Receive Handshake → check version and token → send HandshakeAck
//!   3. Loop: inbound envelopes go to the gateway or the player's room;
//!      room notifications go out to the socket

use std::net::SocketAddr;
use std::sync::Arc;

use bourse_engine::{Command, Notification};
use bourse_protocol::{
    Codec, Envelope, PROTOCOL_VERSION, Payload, PlayerId, ProtocolError, RoomId, SystemMessage,
};
use bourse_room::{RoomError, RoomHandle, SubscriptionId};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use crate::BourseError;
use crate::server::ServerState;

/// Display name for players who join without one.
const ANONYMOUS: &str = "Anonymous Player";

type WsStream = WebSocketStream<TcpStream>;

/// Outbound half of a connection, with its sequence counter.
struct Outbound<'a, C: Codec> {
    sink: SplitSink<WsStream, Message>,
    codec: &'a C,
    seq: u64,
    start: Instant,
}

impl<C: Codec> Outbound<'_, C> {
    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    async fn send(&mut self, payload: Payload) -> Result<(), BourseError> {
        let envelope = Envelope {
            seq: self.seq,
            timestamp: self.elapsed_ms(),
            payload,
        };
        self.seq += 1;
        let bytes = self.codec.encode(&envelope)?;
        self.sink.send(Message::Binary(bytes.into())).await?;
        Ok(())
    }

    async fn system(&mut self, msg: SystemMessage) -> Result<(), BourseError> {
        self.send(Payload::System(msg)).await
    }

    async fn notify(&mut self, notification: &Notification) -> Result<(), BourseError> {
        let data = self.codec.encode(notification)?;
        self.send(Payload::Game(data)).await
    }

    async fn error(&mut self, code: u16, message: impl Into<String>) -> Result<(), BourseError> {
        self.system(SystemMessage::Error {
            code,
            message: message.into(),
        })
        .await
    }

    async fn close(mut self) {
        let _ = self.sink.close().await;
    }
}

/// Reads the next data frame. `Ok(None)` means the peer closed.
async fn next_frame(stream: &mut SplitStream<WsStream>) -> Result<Option<Vec<u8>>, BourseError> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Binary(data))) => return Ok(Some(data.into())),
            Some(Ok(Message::Text(text))) => return Ok(Some(text.as_bytes().to_vec())),
            Some(Ok(Message::Close(_))) | None => return Ok(None),
            // Pings are answered by tungstenite itself.
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

/// Releases the player's notification channel when the handler exits and,
/// unless a newer connection has taken over, tells their room they left.
///
/// `Drop` is synchronous, so the room notice goes out from a spawned task.
struct ConnectionGuard<C: Codec> {
    player_id: PlayerId,
    subscription: SubscriptionId,
    state: Arc<ServerState<C>>,
}

impl<C: Codec> Drop for ConnectionGuard<C> {
    fn drop(&mut self) {
        if !self
            .state
            .subscribers
            .unsubscribe(self.player_id, self.subscription)
        {
            return;
        }
        let player_id = self.player_id;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            state.rooms.lock().await.disconnect_player(player_id).await;
        });
    }
}

/// Handles a single socket from upgrade to close.
pub(crate) async fn handle_connection<C: Codec>(
    stream: TcpStream,
    peer: SocketAddr,
    conn_id: u64,
    state: Arc<ServerState<C>>,
) -> Result<(), BourseError> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    tracing::debug!(conn_id, %peer, "websocket connection accepted");

    let (sink, mut inbound) = ws.split();
    let mut out = Outbound {
        sink,
        codec: &state.codec,
        seq: 0,
        start: Instant::now(),
    };

    // --- Step 1: Handshake ---
    let player_id = match perform_handshake(&mut inbound, &mut out, &state).await {
        Ok(player_id) => player_id,
        Err(e) => {
            out.close().await;
            return Err(e);
        }
    };
    tracing::info!(conn_id, %player_id, "player connected");

    let (subscription, mut notifications) = state.subscribers.subscribe(player_id);
    let _guard = ConnectionGuard {
        player_id,
        subscription,
        state: Arc::clone(&state),
    };

    // --- Step 2: Message loop ---
    let idle = state.config.idle_timeout;
    let mut idle_deadline = Instant::now() + idle;
    let mut room: Option<RoomHandle> = None;

    loop {
        tokio::select! {
            frame = next_frame(&mut inbound) => {
                let data = match frame {
                    Ok(Some(data)) => data,
                    Ok(None) => {
                        tracing::info!(conn_id, %player_id, "connection closed cleanly");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(conn_id, %player_id, error = %e, "recv error");
                        break;
                    }
                };
                idle_deadline = Instant::now() + idle;

                let envelope: Envelope = match state.codec.decode(&data) {
                    Ok(env) => env,
                    Err(e) => {
                        tracing::debug!(conn_id, %player_id, error = %e, "failed to decode envelope");
                        out.error(400, format!("malformed envelope: {e}")).await?;
                        continue;
                    }
                };

                match envelope.payload {
                    Payload::System(msg) => {
                        let keep_going =
                            handle_system_message(&mut out, &state, player_id, msg, &mut room)
                                .await?;
                        if !keep_going {
                            break;
                        }
                    }
                    Payload::Game(data) => {
                        handle_game_message(&mut out, &state, player_id, &data, room.as_ref())
                            .await?;
                    }
                }
            }

            notification = notifications.recv() => match notification {
                Some(notification) => out.notify(&notification).await?,
                None => {
                    // A newer connection for the same player took the channel.
                    tracing::info!(conn_id, %player_id, "connection superseded");
                    out.system(SystemMessage::Disconnect {
                        reason: "signed in from another connection".into(),
                    })
                    .await?;
                    break;
                }
            },

            () = time::sleep_until(idle_deadline) => {
                tracing::info!(conn_id, %player_id, "connection timed out");
                out.system(SystemMessage::Disconnect { reason: "idle timeout".into() }).await?;
                break;
            }
        }
    }

    out.close().await;
    // _guard drops here → room disconnect fires.
    Ok(())
}

/// Receives the Handshake, checks version and token, sends the Ack.
async fn perform_handshake<C: Codec>(
    inbound: &mut SplitStream<WsStream>,
    out: &mut Outbound<'_, C>,
    state: &ServerState<C>,
) -> Result<PlayerId, BourseError> {
    let data = match time::timeout(state.config.handshake_timeout, next_frame(inbound)).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(ProtocolError::InvalidMessage("connection closed before handshake".into()).into());
        }
        Ok(Err(e)) => return Err(e),
        Err(_) => {
            return Err(ProtocolError::InvalidMessage("handshake timed out".into()).into());
        }
    };

    let envelope: Envelope = match state.codec.decode(&data) {
        Ok(env) => env,
        Err(e) => {
            out.error(400, "expected Handshake").await?;
            return Err(e.into());
        }
    };

    let (version, token) = match envelope.payload {
        Payload::System(SystemMessage::Handshake { version, token }) => (version, token),
        _ => {
            out.error(400, "expected Handshake").await?;
            return Err(ProtocolError::InvalidMessage("first message must be Handshake".into()).into());
        }
    };

    if version != PROTOCOL_VERSION {
        out.error(
            400,
            format!("version mismatch: expected {PROTOCOL_VERSION}, got {version}"),
        )
        .await?;
        return Err(ProtocolError::InvalidMessage("protocol version mismatch".into()).into());
    }

    let player_id = match token.as_deref().map(str::trim) {
        None | Some("") => state.fresh_player_id(),
        Some(raw) => match raw.parse::<u64>() {
            Ok(id) => PlayerId(id),
            Err(_) => {
                out.error(401, "unauthorized").await?;
                return Err(ProtocolError::InvalidMessage(format!("unusable token {raw:?}")).into());
            }
        },
    };

    let server_time = out.elapsed_ms();
    out.system(SystemMessage::HandshakeAck {
        player_id,
        server_time,
    })
    .await?;
    Ok(player_id)
}

/// Handles a system message. Returns `false` when the connection should
/// close.
async fn handle_system_message<C: Codec>(
    out: &mut Outbound<'_, C>,
    state: &ServerState<C>,
    player_id: PlayerId,
    msg: SystemMessage,
    room: &mut Option<RoomHandle>,
) -> Result<bool, BourseError> {
    match msg {
        SystemMessage::Heartbeat { client_time } => {
            let server_time = out.elapsed_ms();
            out.system(SystemMessage::HeartbeatAck {
                client_time,
                server_time,
            })
            .await?;
        }

        SystemMessage::JoinRoom {
            room_id,
            name,
            avatar,
        } => {
            let (room_id, name) = join_defaults(room_id, name);

            // The lock is held across the join so two joins for the same
            // player cannot interleave their routing updates.
            let joined = {
                let mut rooms = state.rooms.lock().await;
                rooms.join_room(player_id, &room_id, &name, avatar).await
            };

            match joined {
                Ok((handle, _view)) => {
                    tracing::info!(%player_id, %room_id, %name, "player joined room");
                    *room = Some(handle);
                    out.system(SystemMessage::RoomJoined { room_id }).await?;
                }
                Err(e) => {
                    tracing::debug!(%player_id, %room_id, error = %e, "join refused");
                    out.error(409, e.to_string()).await?;
                }
            }
        }

        SystemMessage::Disconnect { reason } => {
            tracing::info!(%player_id, %reason, "client disconnected");
            return Ok(false);
        }

        _ => {
            tracing::debug!(%player_id, "ignoring unexpected system message");
        }
    }

    Ok(true)
}

/// Blank room ids go to the default room; blank names become
/// [`ANONYMOUS`].
fn join_defaults(room_id: Option<RoomId>, name: String) -> (RoomId, String) {
    let room_id = room_id
        .filter(|id| !id.as_str().trim().is_empty())
        .unwrap_or_default();
    let name = if name.trim().is_empty() {
        ANONYMOUS.to_owned()
    } else {
        name
    };
    (room_id, name)
}

/// Decodes a game command and queues it on the player's room.
async fn handle_game_message<C: Codec>(
    out: &mut Outbound<'_, C>,
    state: &ServerState<C>,
    player_id: PlayerId,
    data: &[u8],
    room: Option<&RoomHandle>,
) -> Result<(), BourseError> {
    let command: Command = match state.codec.decode(data) {
        Ok(command) => command,
        Err(e) => {
            tracing::debug!(%player_id, error = %e, "undecodable command");
            out.error(400, format!("invalid command: {e}")).await?;
            return Ok(());
        }
    };

    let Some(room) = room else {
        out.error(404, RoomError::NotInRoom(player_id).to_string()).await?;
        return Ok(());
    };

    if let Err(e) = room.command(player_id, command).await {
        tracing::debug!(%player_id, room_id = %room.room_id(), error = %e, "command not delivered");
        out.error(404, e.to_string()).await?;
    }
    Ok(())
}
