//! Codec trait and implementations for payload serialization.
//!
//! The engine hands [`ServerEvent`](crate::ServerEvent)s to the push
//! channel as typed values; whatever sits at the transport edge picks a
//! codec to turn them into bytes. JSON is the default for the same reason
//! it is everywhere in this stack: inspectable in dev tools and logs. A
//! binary codec can be added behind another feature without touching any
//! caller.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Converts payloads to and from bytes.
///
/// `Send + Sync + 'static` because codecs are shared across tokio tasks
/// for the life of the process.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

/// A [`Codec`] backed by `serde_json`. Behind the default `json` feature.
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
