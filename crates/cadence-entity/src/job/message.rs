//! Bus envelope referencing a job.

use cadence_core::types::{AssetId, JobId};
use cadence_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use super::model::DEFAULT_JOB_TYPE;

/// The message published for every job that needs a worker.
///
/// Messages carry only references; the store is the source of truth, so a
/// message may be duplicated or lost without affecting correctness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMessage {
    /// Job to process.
    pub job_id: JobId,
    /// Asset the job belongs to.
    pub asset_id: AssetId,
    /// Pipeline selector.
    #[serde(rename = "type", default = "default_job_type")]
    pub job_type: String,
}

impl JobMessage {
    /// Create a new message.
    pub fn new(job_id: JobId, asset_id: AssetId, job_type: impl Into<String>) -> Self {
        Self {
            job_id,
            asset_id,
            job_type: job_type.into(),
        }
    }

    /// Encode as the JSON wire form.
    pub fn to_bytes(&self) -> AppResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode from the JSON wire form.
    pub fn from_slice(payload: &[u8]) -> AppResult<Self> {
        serde_json::from_slice(payload).map_err(|e| {
            AppError::validation(format!("Malformed job message: {e}"))
        })
    }
}

fn default_job_type() -> String {
    DEFAULT_JOB_TYPE.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_form_uses_type_key() {
        let msg = JobMessage::new(JobId(12), AssetId(4), "transcode");
        let json: serde_json::Value =
            serde_json::from_slice(&msg.to_bytes().expect("encode")).expect("json");
        assert_eq!(json["job_id"], 12);
        assert_eq!(json["asset_id"], 4);
        assert_eq!(json["type"], "transcode");
    }

    #[test]
    fn test_missing_type_defaults_to_transcode() {
        let msg = JobMessage::from_slice(br#"{"job_id": 1, "asset_id": 2}"#).expect("decode");
        assert_eq!(msg.job_type, DEFAULT_JOB_TYPE);
    }

    #[test]
    fn test_malformed_payload_is_validation_error() {
        let err = JobMessage::from_slice(b"not json").unwrap_err();
        assert_eq!(err.kind, cadence_core::error::ErrorKind::Validation);
    }
}
