//! Unified error type for the Bourse server.

use bourse_protocol::ProtocolError;
use bourse_room::RoomError;
use tokio_tungstenite::tungstenite;

/// Top-level error that wraps the errors of every layer below the gateway.
///
/// `#[from]` on each variant lets `?` convert layer errors directly.
#[derive(Debug, thiserror::Error)]
pub enum BourseError {
    /// Encode, decode, or a broken protocol rule.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A room refused or could not be reached.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// Binding or accepting on the listener failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The WebSocket upgrade or a frame failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// An environment variable held an unusable value.
    #[error("invalid configuration: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use bourse_protocol::RoomId;

    use super::*;

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let bourse_err: BourseError = err.into();
        assert!(matches!(bourse_err, BourseError::Protocol(_)));
        assert!(bourse_err.to_string().contains("bad"));
    }

    #[test]
    fn test_from_room_error() {
        let err = RoomError::NotFound(RoomId::new("LOST"));
        let bourse_err: BourseError = err.into();
        assert!(matches!(bourse_err, BourseError::Room(_)));
        assert_eq!(bourse_err.to_string(), "room LOST not found");
    }

    #[test]
    fn test_from_io_error() {
        let err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "taken");
        let bourse_err: BourseError = err.into();
        assert!(matches!(bourse_err, BourseError::Io(_)));
    }
}
