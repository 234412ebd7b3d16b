//! Byte codecs for envelopes and game payloads.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Converts typed values to frame bytes and back.
///
/// The gateway uses one codec for both layers: the outer [`Envelope`]
/// and the engine command/notification carried inside `Payload::Game`.
///
/// [`Envelope`]: crate::Envelope
pub trait Codec: Send + Sync + 'static {
    /// Serializes `value`.
    ///
    /// # Errors
    /// [`ProtocolError::Encode`] if the value cannot be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes `data`.
    ///
    /// # Errors
    /// [`ProtocolError::Decode`] on malformed or mismatched input.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// JSON codec. Readable in browser devtools, which is what the web client
/// needs; behind the default `json` feature.
///
/// ```rust
/// use bourse_protocol::{Codec, Envelope, JsonCodec, SystemMessage};
///
/// let codec = JsonCodec;
/// let env = Envelope::system(1, 0, SystemMessage::Heartbeat { client_time: 9 });
/// let bytes = codec.encode(&env).unwrap();
/// let back: Envelope = codec.decode(&bytes).unwrap();
/// assert_eq!(env, back);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
