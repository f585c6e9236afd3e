//! JSON codec.

use crate::error::Result;
use crate::message::Message;
use crate::serializers::Serializer;
use bytes::Bytes;

/// JSON wire format.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    /// Create a new JSON serializer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Serializer for JsonSerializer {
    fn serialize(&self, msg: &Message) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(msg)?))
    }

    fn deserialize(&self, raw: &[u8]) -> Result<Message> {
        Ok(serde_json::from_slice(raw)?)
    }
}
