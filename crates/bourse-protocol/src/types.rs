//! Wire types shared by the gateway and the room layer.
//!
//! Everything in here is serialized onto the socket. Game payloads
//! (commands and notifications) are owned by `bourse-engine` and travel
//! inside [`Payload::Game`] as codec-encoded bytes, so this crate never
//! needs to know the rules of the game.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Room joined when a client does not name one.
pub const DEFAULT_ROOM: &str = "GLOBAL_ROOM";

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Stable identity of a player across reconnects.
///
/// Serialized as a bare number (`42`, not `{"0":42}`) so browser clients
/// can use it directly as a map key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// Client-chosen room identifier.
///
/// Rooms are addressed by name rather than by a server-issued number:
/// the first join to an unseen name creates the room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Wraps a room name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The raw room name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RoomId {
    fn default() -> Self {
        Self::new(DEFAULT_ROOM)
    }
}

impl From<&str> for RoomId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Recipient
// ---------------------------------------------------------------------------

/// Who an outbound game notification is addressed to.
///
/// Broadcasts go to every seated player of the room; diagnostics go back
/// to the originating caller only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    /// Every player seated in the room.
    All,
    /// A single player.
    Player(PlayerId),
}

// ---------------------------------------------------------------------------
// SystemMessage
// ---------------------------------------------------------------------------

/// Connection-level plumbing: handshake, heartbeat, joining a room, errors.
///
/// Internally tagged, so a heartbeat reads
/// `{ "type": "Heartbeat", "client_time": 123 }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SystemMessage {
    /// Client → Server: first frame on every connection.
    ///
    /// A numeric `token` is reused as the player's identity, which is how a
    /// dropped client gets its seat back. Without one the server issues a
    /// fresh identity.
    Handshake {
        version: u32,
        #[serde(default)]
        token: Option<String>,
    },

    /// Server → Client: handshake accepted.
    HandshakeAck {
        player_id: PlayerId,
        server_time: u64,
    },

    /// Either direction: the connection is closing.
    Disconnect { reason: String },

    /// Client → Server: keep-alive.
    Heartbeat { client_time: u64 },

    /// Server → Client: keep-alive echo, for RTT estimation.
    HeartbeatAck {
        client_time: u64,
        server_time: u64,
    },

    /// Client → Server: take a seat in a room, creating it on first use.
    JoinRoom {
        #[serde(default)]
        room_id: Option<RoomId>,
        name: String,
        #[serde(default)]
        avatar: Option<String>,
    },

    /// Server → Client: the seat was granted. The player record follows
    /// as a game notification.
    RoomJoined { room_id: RoomId },

    /// Server → Client: a request was refused.
    ///
    /// Codes follow HTTP conventions: 400 malformed, 401 bad token,
    /// 404 no room joined, 409 join refused.
    Error { code: u16, message: String },
}

// ---------------------------------------------------------------------------
// Payload / Envelope
// ---------------------------------------------------------------------------

/// Contents of an [`Envelope`]: framework plumbing or opaque game bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Payload {
    /// Connection plumbing handled by the gateway itself.
    System(SystemMessage),

    /// An encoded engine command (client → server) or notification
    /// (server → client).
    Game(Vec<u8>),
}

/// Top-level frame. Every WebSocket message is exactly one envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Per-direction sequence number.
    pub seq: u64,
    /// Milliseconds since the sender's connection started.
    pub timestamp: u64,
    pub payload: Payload,
}

impl Envelope {
    /// Wraps a system message.
    pub fn system(seq: u64, timestamp: u64, msg: SystemMessage) -> Self {
        Self {
            seq,
            timestamp,
            payload: Payload::System(msg),
        }
    }

    /// Wraps already-encoded game bytes.
    pub fn game(seq: u64, timestamp: u64, data: Vec<u8>) -> Self {
        Self {
            seq,
            timestamp,
            payload: Payload::Game(data),
        }
    }
}
