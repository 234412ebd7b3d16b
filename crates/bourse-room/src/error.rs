//! Error types for the room layer.

use bourse_engine::Rejection;
use bourse_protocol::{PlayerId, RoomId};

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// No room is registered under this id.
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// The player is not routed to any room.
    #[error("player {0} is not in a room")]
    NotInRoom(PlayerId),

    /// The room's rules refused the request.
    #[error(transparent)]
    Rejected(#[from] Rejection),

    /// The room's mailbox is closed; its actor has stopped.
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),
}
