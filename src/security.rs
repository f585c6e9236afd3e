//! Security provider contract and the `none` provider.
//!
//! A [`SecurityProvider`] wraps the configured serializer and is the only
//! path an envelope takes to and from wire bytes: signing schemes hook in
//! here. Providers are resolved through the
//! [`PluginRegistry`](crate::plugin::PluginRegistry) from the
//! `securityprovider` settings key.

use crate::config::Settings;
use crate::error::Result;
use crate::message::Message;
use crate::plugin::PluginRegistry;
use crate::serializers::Serializer;
use bytes::Bytes;
use std::sync::Arc;

/// Settings key naming the serializer a provider encodes with.
const SERIALIZER_KEY: &str = "securityprovider.serializer";

/// Payload authentication capability.
///
/// Constructed with the settings store; implementations typically resolve
/// their serializer and any key material there.
pub trait SecurityProvider: Send + Sync {
    /// Encode (serialize and, depending on the provider, sign) an envelope
    /// for the wire.
    ///
    /// # Errors
    /// Returns [`Error::Security`](crate::Error::Security) or
    /// [`Error::Serialization`](crate::Error::Serialization) if the
    /// envelope cannot be encoded.
    fn encode(&self, msg: &Message) -> Result<Bytes>;

    /// Decode (and, depending on the provider, verify) wire bytes back
    /// into an envelope.
    ///
    /// # Errors
    /// Returns [`Error::Security`](crate::Error::Security) or
    /// [`Error::Serialization`](crate::Error::Serialization) if the bytes
    /// do not decode or fail verification.
    fn decode(&self, raw: &[u8]) -> Result<Message>;
}

/// Provider that serializes without signing or verification.
///
/// The serializer is named by the `securityprovider.serializer` settings
/// key and defaults to `yaml`.
pub struct NoneSecurity {
    serializer: Arc<dyn Serializer>,
}

impl NoneSecurity {
    /// Resolve the provider's serializer and build it.
    ///
    /// # Errors
    /// Returns [`Error::UnknownPlugin`](crate::Error::UnknownPlugin) if the
    /// named serializer is not registered.
    pub fn new(settings: &Settings, registry: &PluginRegistry) -> Result<Self> {
        let name = settings.get_or(SERIALIZER_KEY, "yaml");
        Ok(Self { serializer: registry.serializer(name)? })
    }
}

impl SecurityProvider for NoneSecurity {
    fn encode(&self, msg: &Message) -> Result<Bytes> {
        self.serializer.serialize(msg)
    }

    fn decode(&self, raw: &[u8]) -> Result<Message> {
        self.serializer.deserialize(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        [
            ("identity", "mco1"),
            ("securityprovider", "none"),
            ("securityprovider.serializer", "json"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let settings = settings();
        let registry = PluginRegistry::with_defaults();
        let provider = NoneSecurity::new(&settings, &registry).unwrap();

        let msg = Message::builder()
            .body("ping")
            .agent("discovery")
            .request_id(Message::generate_request_id())
            .build(&settings)
            .unwrap();

        let raw = provider.encode(&msg).unwrap();
        let back = provider.decode(&raw).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_defaults_to_yaml_serializer() {
        let settings: Settings =
            [("identity", "mco1"), ("securityprovider", "none")].into_iter().collect();
        let registry = PluginRegistry::with_defaults();
        let provider = NoneSecurity::new(&settings, &registry).unwrap();

        let msg = Message::builder()
            .body("ping")
            .agent("discovery")
            .request_id(Message::generate_request_id())
            .build(&settings)
            .unwrap();

        let raw = provider.encode(&msg).unwrap();
        assert!(std::str::from_utf8(&raw).unwrap().contains("senderid"));
    }

    #[test]
    fn test_unknown_serializer_fails_at_construction() {
        let settings: Settings = [
            ("securityprovider", "none"),
            ("securityprovider.serializer", "msgpack"),
        ]
        .into_iter()
        .collect();
        let registry = PluginRegistry::with_defaults();
        assert!(matches!(
            NoneSecurity::new(&settings, &registry),
            Err(crate::Error::UnknownPlugin { capability: "serializer", .. })
        ));
    }
}
