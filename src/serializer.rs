//! Serialization strategies for typed caches.
//!
//! A [`Serializer`] is chosen per typed cache, so two caches over the same
//! backend can store different formats.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Encodes and decodes values of type `V` for storage in a `RawCache`.
pub trait Serializer<V>: Send + Sync {
    fn marshal(&self, value: &V) -> Result<Vec<u8>>;

    /// Decodes a stored value. Malformed input is an error, never a default.
    fn unmarshal(&self, bytes: &[u8]) -> Result<V>;
}

/// JSON encoding via serde_json. Readable from any language.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl<V> Serializer<V> for JsonSerializer
where
    V: Serialize + DeserializeOwned,
{
    fn marshal(&self, value: &V) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn unmarshal(&self, bytes: &[u8]) -> Result<V> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Compact binary encoding via bincode. Only readable by Rust callers
/// sharing the same type definitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeSerializer;

impl<V> Serializer<V> for BincodeSerializer
where
    V: Serialize + DeserializeOwned,
{
    fn marshal(&self, value: &V) -> Result<Vec<u8>> {
        Ok(bincode::serialize(value)?)
    }

    fn unmarshal(&self, bytes: &[u8]) -> Result<V> {
        Ok(bincode::deserialize(bytes)?)
    }
}
