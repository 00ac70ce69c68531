//! Ownership of a job for one attempt.

use std::sync::Arc;

use tracing::debug;

use cadence_core::result::AppResult;
use cadence_core::traits::JobStore;
use cadence_core::types::JobId;

/// Result of a claim attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This worker now owns the job.
    Claimed,
    /// The job was not `queued`: another worker or an earlier delivery got it.
    Contended,
}

/// Claims jobs through the store's atomic `queued → running` write.
///
/// No in-process lock is involved; exclusion across workers and processes
/// comes entirely from the conditional update.
#[derive(Debug, Clone)]
pub struct ClaimProtocol {
    store: Arc<dyn JobStore>,
}

impl ClaimProtocol {
    /// Create a claim protocol over `store`.
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Try to take ownership of `job_id` on behalf of `owner`.
    ///
    /// Store failures are returned as errors and are distinct from
    /// [`ClaimOutcome::Contended`].
    pub async fn claim(&self, job_id: JobId, owner: &str) -> AppResult<ClaimOutcome> {
        if self.store.try_claim(job_id, owner).await? {
            debug!(job_id = %job_id, worker = owner, "Claimed job");
            Ok(ClaimOutcome::Claimed)
        } else {
            Ok(ClaimOutcome::Contended)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::types::{AssetId, JobStatus};
    use cadence_database::MemoryJobStore;
    use cadence_entity::job::CreateJob;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_claims_have_one_winner() {
        let store = MemoryJobStore::new();
        let job = store.insert(&CreateJob::for_asset(AssetId(1)));
        let protocol = ClaimProtocol::new(Arc::new(store.clone()));

        let mut handles = Vec::new();
        for i in 0..16 {
            let protocol = protocol.clone();
            handles.push(tokio::spawn(async move {
                protocol.claim(job.id, &format!("test-w{i}")).await
            }));
        }

        let mut claimed = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                ClaimOutcome::Claimed => claimed += 1,
                ClaimOutcome::Contended => {}
            }
        }
        assert_eq!(claimed, 1);

        let stored = store.get(job.id).unwrap();
        assert_eq!(stored.status, JobStatus::Running);
        assert_eq!(stored.progress, 1);
    }

    #[tokio::test]
    async fn test_two_sequential_claims() {
        let store = MemoryJobStore::new();
        let job = store.insert(&CreateJob::for_asset(AssetId(1)));
        let protocol = ClaimProtocol::new(Arc::new(store));

        assert_eq!(
            protocol.claim(job.id, "a-w0").await.unwrap(),
            ClaimOutcome::Claimed
        );
        assert_eq!(
            protocol.claim(job.id, "b-w0").await.unwrap(),
            ClaimOutcome::Contended
        );
    }

    #[tokio::test]
    async fn test_store_failure_is_an_error() {
        let store = MemoryJobStore::new();
        let job = store.insert(&CreateJob::for_asset(AssetId(1)));
        store.set_unavailable(true);
        let protocol = ClaimProtocol::new(Arc::new(store));

        let err = protocol.claim(job.id, "a-w0").await.unwrap_err();
        assert!(err.is_infrastructure());
    }
}
