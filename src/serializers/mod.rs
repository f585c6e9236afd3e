//! Message [de]serialization codecs.
//!
//! A [`Serializer`] turns an envelope into wire bytes and back. Codecs are
//! resolved through the [`PluginRegistry`](crate::plugin::PluginRegistry),
//! never constructed directly by the core, so new wire formats can be added
//! by registering a factory.

mod json;
mod yaml;

pub use json::JsonSerializer;
pub use yaml::YamlSerializer;

use crate::error::Result;
use crate::message::Message;
use bytes::Bytes;

/// Codec capability: envelope to bytes and back.
///
/// Implementations are constructed with no arguments; anything they need
/// must be baked into the registered factory.
pub trait Serializer: Send + Sync {
    /// Serialize an envelope to wire bytes.
    ///
    /// # Errors
    /// Returns [`Error::Serialization`](crate::Error::Serialization) if the
    /// envelope cannot be encoded.
    fn serialize(&self, msg: &Message) -> Result<Bytes>;

    /// Deserialize wire bytes back into an envelope.
    ///
    /// # Errors
    /// Returns [`Error::Serialization`](crate::Error::Serialization) if the
    /// bytes do not decode.
    fn deserialize(&self, raw: &[u8]) -> Result<Message>;
}
