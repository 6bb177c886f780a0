//! Concrete collaborator stores.

mod memory;
mod postgres;
mod redis;

pub use memory::{InMemoryCacheStore, InMemoryCounterStore, InMemoryMetadata};
pub use postgres::PostgresMetadataSource;
pub use redis::RedisStore;
