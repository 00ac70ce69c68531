//! In-process message bus.

pub mod bus;

pub use bus::MemoryBus;
