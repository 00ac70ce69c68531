//! Job status enumeration and the legal transition table.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// Status of a processing job.
///
/// ```text
/// queued ──claim──▶ running ──success──▶ done
///    ▲                 │
///    └──── retry ──────┤
///                      └──ceiling / precondition──▶ failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "job_status", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting to be claimed by a worker.
    Queued,
    /// Claimed by exactly one worker; an attempt is in progress.
    Running,
    /// Terminal success.
    Done,
    /// Terminal failure; never scheduled again.
    Failed,
}

impl JobStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [JobStatus; 4] = [Self::Queued, Self::Running, Self::Done, Self::Failed];

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Statuses from which a transition into `self` is legal.
    ///
    /// `running → running` is listed so that in-attempt progress writes go
    /// through the same guarded update as real transitions.
    pub fn predecessors(&self) -> &'static [JobStatus] {
        match self {
            Self::Queued => &[Self::Running],
            Self::Running => &[Self::Queued, Self::Running],
            Self::Done => &[Self::Running],
            Self::Failed => &[Self::Running],
        }
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        next.predecessors().contains(self)
    }

    /// Return the status as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            _ => Err(AppError::validation(format!(
                "Invalid job status: '{s}'. Expected one of: queued, running, done, failed"
            ))),
        }
    }
}

/// Retry bookkeeping as read back from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryState {
    /// Failed attempts recorded so far.
    pub retry_count: i32,
    /// Retry ceiling for the job.
    pub max_retries: i32,
}

impl RetryState {
    /// Whether the retry budget is spent.
    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        use JobStatus::*;
        assert!(Queued.can_transition_to(Running));
        assert!(Running.can_transition_to(Done));
        assert!(Running.can_transition_to(Queued));
        assert!(Running.can_transition_to(Failed));
    }

    #[test]
    fn test_illegal_transitions() {
        use JobStatus::*;
        assert!(!Queued.can_transition_to(Done));
        assert!(!Queued.can_transition_to(Failed));
        assert!(!Done.can_transition_to(Queued));
        assert!(!Done.can_transition_to(Running));
        assert!(!Failed.can_transition_to(Queued));
        assert!(!Failed.can_transition_to(Running));
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in JobStatus::ALL.iter().filter(|s| s.is_terminal()) {
            for to in JobStatus::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_from_str() {
        assert_eq!("DONE".parse::<JobStatus>().unwrap(), JobStatus::Done);
        assert!("completed".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_retry_state_exhaustion() {
        let state = RetryState {
            retry_count: 2,
            max_retries: 3,
        };
        assert!(!state.is_exhausted());
        let state = RetryState {
            retry_count: 3,
            max_retries: 3,
        };
        assert!(state.is_exhausted());
    }
}
