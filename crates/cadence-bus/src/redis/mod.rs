//! Redis Streams message bus.

pub mod client;
pub mod streams;

pub use client::RedisClient;
pub use streams::RedisStreamsBus;
