//! Uploaded media asset entities.

pub mod model;

pub use model::{Asset, CreateAsset};
