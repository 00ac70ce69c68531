//! Convenience result type alias for Cadence.

use crate::error::AppError;

/// A specialized `Result` type for Cadence operations.
pub type AppResult<T> = Result<T, AppError>;
