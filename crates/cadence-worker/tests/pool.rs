//! Worker pool behaviour over in-memory stores.

mod common;

use std::time::Duration;

use cadence_core::config::WorkerConfig;
use cadence_core::types::{AssetId, JobStatus};
use cadence_entity::job::JobMessage;
use cadence_worker::EnqueueError;

use common::{Harness, ScriptedToolkit, worker_config};

#[tokio::test]
async fn successful_job_runs_every_stage() {
    let h = Harness::new(ScriptedToolkit::new());
    h.start();

    let job = h.submit(3);
    let done = h.wait_for_status(job.id, JobStatus::Done).await;

    assert_eq!(done.progress, 100);
    assert_eq!(done.retry_count, 0);
    assert!(done.last_error.is_empty());
    assert_eq!(done.worker_id.as_deref().map(|w| w.starts_with("it-w")), Some(true));

    let lines: Vec<&str> = done.log_lines().collect();
    assert_eq!(lines.len(), 7, "{lines:?}");
    assert!(lines[0].starts_with("probe ok"));
    assert_eq!(lines[1], "transcode done (uploads/track-0.wav.mp3)");
    assert_eq!(lines[2], "loudness=-14.20 LUFS");
    assert_eq!(lines[3], "bpm=124.00 key=Am");
    assert_eq!(lines[4], "waveform generated");
    assert_eq!(lines[5], "outputs verified");
    assert!(lines[6].starts_with("completed in"));

    let asset = h.assets.get(job.asset_id).unwrap();
    assert_eq!(asset.output_path.as_deref(), Some("uploads/track-0.wav.mp3"));
    assert_eq!(asset.waveform_path.as_deref(), Some("uploads/track-0.wav-wave.png"));
    assert_eq!(asset.duration_seconds, Some(184.03));
    assert_eq!(asset.integrated_lufs, Some(-14.2));
    assert_eq!(asset.musical_key.as_deref(), Some("Am"));
    assert!(h.assets.data_root().join("uploads/track-0.wav.mp3").exists());

    h.pool.stop().await;
    assert_eq!(h.pool.metrics().snapshot().completed, 1);
}

#[tokio::test]
async fn always_failing_stage_dead_letters_at_the_ceiling() {
    let h = Harness::new(ScriptedToolkit::new().fail_always("probe"));
    h.start();

    let job = h.submit(3);
    let failed = h.wait_for_status(job.id, JobStatus::Failed).await;

    assert_eq!(failed.retry_count, 3);
    assert_eq!(failed.last_error, "probe failed: probe exited with code 1");
    assert_eq!(h.toolkit.calls("probe"), 3);
    assert_eq!(h.toolkit.calls("transcode"), 0);
    assert!(
        failed
            .log_lines()
            .any(|l| l.starts_with("job failed after 3 retries"))
    );

    h.pool.stop().await;
    let metrics = h.pool.metrics().snapshot();
    assert_eq!(metrics.retried, 2);
    assert_eq!(metrics.dead_lettered, 1);
}

#[tokio::test]
async fn transient_failure_is_retried_to_completion() {
    let h = Harness::new(ScriptedToolkit::new().fail("transcode", 1));
    h.start();

    let job = h.submit(3);
    let done = h.wait_for_status(job.id, JobStatus::Done).await;

    assert_eq!(done.retry_count, 1);
    assert!(done.last_error.is_empty(), "claim clears last_error");
    assert_eq!(h.toolkit.calls("transcode"), 2);
    assert!(
        done.log_lines()
            .any(|l| l.starts_with("attempt 1 of 3 failed, retrying in 10ms"))
    );
    h.pool.stop().await;
}

#[tokio::test]
async fn best_effort_failure_does_not_fail_the_job() {
    let h = Harness::new(ScriptedToolkit::new().fail_always("waveform"));
    h.start();

    let job = h.submit(3);
    let done = h.wait_for_status(job.id, JobStatus::Done).await;

    assert_eq!(done.retry_count, 0);
    assert!(
        done.log_lines()
            .any(|l| l == "waveform failed: waveform exited with code 1")
    );
    let asset = h.assets.get(job.asset_id).unwrap();
    assert!(asset.output_path.is_some());
    assert!(asset.waveform_path.is_none());
    h.pool.stop().await;
}

#[tokio::test]
async fn redelivered_message_is_not_processed_twice() {
    let h = Harness::new(ScriptedToolkit::new());
    h.start();

    let job = h.submit(3);
    h.wait_for_status(job.id, JobStatus::Done).await;

    h.pool.enqueue(job.message()).unwrap();
    h.pool.enqueue(job.message()).unwrap();
    h.wait_for_metrics(|m| m.contended == 2).await;

    assert_eq!(h.toolkit.calls("transcode"), 1);
    assert_eq!(h.job(job.id).status, JobStatus::Done);
    h.pool.stop().await;
}

#[tokio::test]
async fn redelivered_failed_job_is_left_alone() {
    let h = Harness::new(ScriptedToolkit::new().fail_always("probe"));
    h.start();

    let job = h.submit(1);
    let failed = h.wait_for_status(job.id, JobStatus::Failed).await;
    let attempts = h.toolkit.calls("probe");
    let contended = h.pool.metrics().snapshot().contended;

    h.pool.enqueue(job.message()).unwrap();
    h.pool.enqueue(job.message()).unwrap();
    h.wait_for_metrics(|m| m.contended == contended + 2).await;

    let after = h.job(job.id);
    assert_eq!(h.toolkit.calls("probe"), attempts);
    assert_eq!(after.status, JobStatus::Failed);
    assert_eq!(after.retry_count, failed.retry_count);
    assert_eq!(after.logs, failed.logs);
    assert_eq!(after.last_error, failed.last_error);
    h.pool.stop().await;
}

#[tokio::test]
async fn unknown_job_type_fails_without_retry() {
    let h = Harness::new(ScriptedToolkit::new());
    h.start();

    let job = h.create_job("stems", 3);
    h.pool.enqueue(job.message()).unwrap();
    let failed = h.wait_for_status(job.id, JobStatus::Failed).await;

    assert_eq!(failed.retry_count, 0);
    assert_eq!(failed.last_error, "no pipeline registered for job type 'stems'");
    assert_eq!(h.toolkit.calls("probe"), 0);
    h.pool.stop().await;
}

#[tokio::test]
async fn missing_asset_fails_without_retry() {
    let h = Harness::new(ScriptedToolkit::new());
    h.start();

    let job = h.create_job("transcode", 3);
    let orphan = JobMessage::new(job.id, AssetId(404), "transcode");
    h.pool.enqueue(orphan).unwrap();
    let failed = h.wait_for_status(job.id, JobStatus::Failed).await;

    assert_eq!(failed.retry_count, 0);
    assert_eq!(failed.last_error, "asset 404 not found");
    h.pool.stop().await;
}

#[tokio::test]
async fn attempt_past_the_job_deadline_is_retried() {
    let config = WorkerConfig {
        job_timeout_seconds: 1,
        ..worker_config()
    };
    let h = Harness::with_config(
        ScriptedToolkit::new().delay("transcode", Duration::from_secs(5)),
        config,
    );
    h.start();

    let job = h.submit(1);
    let failed = h.wait_for_status(job.id, JobStatus::Failed).await;

    assert_eq!(failed.retry_count, 1);
    assert_eq!(failed.last_error, "attempt exceeded the 1s job deadline");
    h.pool.stop().await;
}

#[tokio::test]
async fn full_intake_rejects_immediately() {
    let config = WorkerConfig {
        queue_size: 1,
        ..worker_config()
    };
    let h = Harness::with_config(ScriptedToolkit::new(), config);

    let first = h.create_job("transcode", 3);
    let second = h.create_job("transcode", 3);
    assert_eq!(h.pool.enqueue(first.message()), Ok(()));
    assert_eq!(h.pool.enqueue(second.message()), Err(EnqueueError::Full));
}

#[tokio::test]
async fn stop_drains_buffered_jobs() {
    let config = WorkerConfig {
        concurrency: 1,
        ..worker_config()
    };
    let h = Harness::with_config(ScriptedToolkit::new(), config);
    let jobs: Vec<_> = (0..3).map(|_| h.submit(3)).collect();

    h.start();
    h.pool.stop().await;

    for job in jobs {
        assert_eq!(h.job(job.id).status, JobStatus::Done);
    }
    assert_eq!(
        h.pool.enqueue(h.create_job("transcode", 3).message()),
        Err(EnqueueError::Closed)
    );
}

#[tokio::test]
async fn cancellation_lets_in_flight_work_finish() {
    let config = WorkerConfig {
        concurrency: 1,
        ..worker_config()
    };
    let h = Harness::with_config(
        ScriptedToolkit::new().delay("transcode", Duration::from_millis(300)),
        config,
    );
    h.start();

    let running = h.submit(3);
    let buffered = h.submit(3);
    h.wait_for_status(running.id, JobStatus::Running).await;

    h.cancel.cancel();
    h.pool.stop().await;

    assert_eq!(h.job(running.id).status, JobStatus::Done);
    assert_eq!(h.job(buffered.id).status, JobStatus::Queued);
}

#[tokio::test]
async fn attempts_outliving_the_grace_are_detached_not_aborted() {
    let config = WorkerConfig {
        concurrency: 1,
        ..worker_config()
    };
    let h = Harness::with_config(
        ScriptedToolkit::new().delay("transcode", Duration::from_millis(500)),
        config,
    );
    h.start();

    let job = h.submit(3);
    h.wait_for_status(job.id, JobStatus::Running).await;

    h.cancel.cancel();
    assert!(!h.pool.stop_within(Duration::from_millis(50)).await);
    assert_eq!(h.job(job.id).status, JobStatus::Running);

    let done = h.wait_for_status(job.id, JobStatus::Done).await;
    assert_eq!(done.progress, 100);
    assert_eq!(h.toolkit.calls("transcode"), 1);
}

#[tokio::test]
async fn store_outage_abandons_the_message() {
    let h = Harness::new(ScriptedToolkit::new());
    let job = h.create_job("transcode", 3);
    h.store.set_unavailable(true);
    h.start();

    h.pool.enqueue(job.message()).unwrap();
    h.wait_for_metrics(|m| m.claim_errors == 1).await;

    h.store.set_unavailable(false);
    assert_eq!(h.job(job.id).status, JobStatus::Queued);
    assert_eq!(h.toolkit.calls("probe"), 0);
    h.pool.stop().await;
}
