//! JSON Codec using `serde_json`

use crate::traits::CacheCodec;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// JSON Codec using `serde_json`
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl CacheCodec for JsonCodec {
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).context("Failed to encode value as JSON")
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).with_context(|| {
            format!("Malformed JSON payload for {}", std::any::type_name::<T>())
        })
    }

    fn name(&self) -> &'static str {
        "serde_json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_payload_is_an_error() {
        let codec = JsonCodec;
        let err = codec.deserialize::<Vec<u32>>(b"{not json").unwrap_err();
        assert!(err.to_string().contains("Malformed JSON"));
    }
}
