//! Protocol-layer errors.

/// Failures while turning frames into values and back.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A value could not be serialized.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Bytes did not decode into the expected type: malformed JSON,
    /// a missing field, an unknown variant.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// Well-formed, but breaks a protocol rule (wrong first frame,
    /// version mismatch, unusable token).
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
