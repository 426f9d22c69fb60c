//! Codec Implementations
//!
//! Built-in implementations of the [`CacheCodec`](crate::traits::CacheCodec) trait.
//! Cached resources and token-bucket state are both stored as JSON so they stay
//! readable with `redis-cli`.

mod json;
pub use json::JsonCodec;
