//! Collaborator traits defined in `cadence-core` and implemented by other crates.

pub mod asset;
pub mod job_store;
pub mod media;
pub mod message_bus;

pub use asset::AssetStore;
pub use job_store::{JobStore, StatusUpdate};
pub use media::MediaToolkit;
pub use message_bus::{Delivery, MessageBus, MessageHandler, Subscription};
