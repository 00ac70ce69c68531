//! Processing job domain entities.

pub mod message;
pub mod model;

pub use message::JobMessage;
pub use model::{CreateJob, Job, DEFAULT_JOB_TYPE, DEFAULT_MAX_RETRIES};
