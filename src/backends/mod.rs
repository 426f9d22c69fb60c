//! Key-Value Store Implementations
//!
//! # Available Backends
//!
//! - **Redis** - Shared store used in production (feature: `redis`, on by default)
//! - **Memory** - `DashMap`-based store for tests and single-process deployments
//!
//! # Usage
//!
//! ```rust,no_run
//! use court_availability_cache::backends::{MemoryStore, RedisStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let redis = RedisStore::with_url("redis://localhost:6379").await?;
//! let memory = MemoryStore::new();
//! # Ok(())
//! # }
//! ```

pub mod memory_store;
#[cfg(feature = "redis")]
pub mod redis_store;

pub use memory_store::MemoryStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;
