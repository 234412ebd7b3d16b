//! Wire protocol for Bourse.
//!
//! The protocol layer sits between the socket (raw bytes) and the rooms
//! (typed game commands):
//!
//! ```text
//! WebSocket frame → Envelope → SystemMessage | Game(bytes) → room actor
//! ```
//!
//! - **Types**: [`Envelope`], [`SystemMessage`], [`PlayerId`], [`RoomId`],
//!   [`Recipient`].
//! - **Codec**: the [`Codec`] trait and its [`JsonCodec`] implementation.
//! - **Errors**: [`ProtocolError`].

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{DEFAULT_ROOM, Envelope, Payload, PlayerId, Recipient, RoomId, SystemMessage};

/// Protocol version clients must present in their handshake.
pub const PROTOCOL_VERSION: u32 = 1;
