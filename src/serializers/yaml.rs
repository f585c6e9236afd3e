//! YAML codec, MCollective's native wire format.

use crate::error::Result;
use crate::message::Message;
use crate::serializers::Serializer;
use bytes::Bytes;

/// YAML wire format.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlSerializer;

impl YamlSerializer {
    /// Create a new YAML serializer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Serializer for YamlSerializer {
    fn serialize(&self, msg: &Message) -> Result<Bytes> {
        Ok(Bytes::from(serde_yaml::to_string(msg)?.into_bytes()))
    }

    fn deserialize(&self, raw: &[u8]) -> Result<Message> {
        Ok(serde_yaml::from_slice(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::message::Filter;

    #[test]
    fn test_round_trip_preserves_fields_and_filter() {
        let settings: Settings = [("identity", "mco1")].into_iter().collect();
        let mut filter = Filter::new();
        filter.add_agent("package");
        filter.add_fact_matching("country", "/uk/", "=~").unwrap();

        let msg = Message::builder()
            .body("ping")
            .agent("discovery")
            .request_id("a5e9c3701f4a4d5cb9d2f41b8f2c1d90")
            .filter(filter.clone())
            .build(&settings)
            .unwrap();

        let serializer = YamlSerializer::new();
        let raw = serializer.serialize(&msg).unwrap();
        let back = serializer.deserialize(&raw).unwrap();

        assert_eq!(back.len(), msg.len());
        assert_eq!(back.sender_id(), Some("mco1"));
        assert_eq!(back.filter().unwrap(), filter);
    }
}
