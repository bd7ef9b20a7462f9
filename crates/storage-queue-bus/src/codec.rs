//! Serializer and deserializer contracts, plus the default JSON codec.

use crate::category::MessageCategory;
use crate::error::CodecError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;

/// Anything that can travel over the bus
pub trait BusMessage: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> BusMessage for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Turns typed messages into payload bytes
pub trait MessageSerializer: Send + Sync + 'static {
    fn serialize<M: Serialize>(&self, message: &M) -> Result<Vec<u8>, CodecError>;
}

/// Turns payload bytes back into one message type
pub trait MessageDeserializer<M>: Send + Sync {
    /// Decode `bytes`; `Ok(None)` means the payload carried no message
    fn deserialize(&self, bytes: &[u8]) -> Result<Option<M>, CodecError>;

    /// Name of the produced type, for diagnostics
    fn type_name(&self) -> String;
}

/// Resolves the ordered deserializer set for a category
pub trait MessageDeserializerFactory: Send + Sync + 'static {
    fn create<M: BusMessage>(&self, category: MessageCategory)
        -> Vec<Arc<dyn MessageDeserializer<M>>>;
}

// ============================================================================
// JSON Codec
// ============================================================================

/// Serializes messages as JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl MessageSerializer for JsonSerializer {
    fn serialize<M: Serialize>(&self, message: &M) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(message)?)
    }
}

/// Deserializes JSON payloads into `M`
pub struct JsonDeserializer<M> {
    _message: PhantomData<fn() -> M>,
}

impl<M> JsonDeserializer<M> {
    pub fn new() -> Self {
        Self {
            _message: PhantomData,
        }
    }
}

impl<M> Default for JsonDeserializer<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: DeserializeOwned> MessageDeserializer<M> for JsonDeserializer<M> {
    fn deserialize(&self, bytes: &[u8]) -> Result<Option<M>, CodecError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(bytes)?))
    }

    fn type_name(&self) -> String {
        std::any::type_name::<M>().to_string()
    }
}

/// Hands out a single [`JsonDeserializer`] for every category
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDeserializerFactory;

impl MessageDeserializerFactory for JsonDeserializerFactory {
    fn create<M: BusMessage>(
        &self,
        _category: MessageCategory,
    ) -> Vec<Arc<dyn MessageDeserializer<M>>> {
        vec![Arc::new(JsonDeserializer::<M>::new())]
    }
}
