//! Recovery of stuck audits against a real pipeline run

use crate::common::{page, page_url, FakeProbe, GatedResponder, Harness, ScriptedCrawler, test_config};
use chrono::{DateTime, Utc};
use site_audit::pipeline::{Pipeline, TaskOutcome, Worker};
use site_audit::recovery::{RecoveryAction, RecoveryMonitor};
use site_audit::state::Stage;
use site_audit::storage::{lock, now_timestamp, timestamp, StageTask, Storage};
use site_audit::AuditStatus;
use std::sync::Arc;

const LONG_AGO: &str = "2020-01-01T00:00:00.000000Z";

fn seconds_from_now(seconds: u64) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::seconds(seconds as i64)
}

fn claim(harness: &Harness) -> StageTask {
    lock(&harness.storage)
        .unwrap()
        .claim_next_task(&now_timestamp())
        .unwrap()
        .expect("a task is available")
}

/// Runs the crawl and analyze stages, then claims the internal link stage
async fn claim_internal_stage(harness: &Harness, pipeline: &Pipeline) -> StageTask {
    for _ in 0..2 {
        let task = claim(harness);
        pipeline.run_task(task).await.unwrap();
    }
    let task = claim(harness);
    assert_eq!(task.stage, Stage::InternalLinks);
    task
}

#[tokio::test(start_paused = true)]
async fn test_recover_complete_audit_is_noop() {
    let harness = Harness::new(test_config());
    let audit_id = harness.start();
    let pipeline = harness.pipeline(
        Arc::new(ScriptedCrawler::new(vec![page(0, vec![page_url(0)])])),
        Arc::new(FakeProbe::new()),
    );
    Worker::new(Arc::new(pipeline)).run_until_idle().await.unwrap();
    lock(&harness.storage)
        .unwrap()
        .set_updated_at(audit_id, LONG_AGO)
        .unwrap();
    let before = harness.job(audit_id);
    assert_eq!(before.status, AuditStatus::Complete);

    let monitor = RecoveryMonitor::new(harness.storage.clone(), harness.config.recovery.clone());
    let outcome = monitor.recover(audit_id).unwrap();

    assert_eq!(outcome.action, RecoveryAction::AlreadyTerminal);
    assert_eq!(outcome.job, before);
    assert_eq!(harness.job(audit_id), before);
    assert!(monitor.list_stuck().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_stage_is_resumed() {
    let harness = Harness::new(test_config());
    let audit_id = harness.start();
    let pipeline = Arc::new(harness.pipeline(
        Arc::new(ScriptedCrawler::new(vec![page(0, vec![page_url(0)])])),
        Arc::new(FakeProbe::new()),
    ));

    // Run the crawl, then claim the analyze task as a worker that dies
    let crawl = claim(&harness);
    pipeline.run_task(crawl).await.unwrap();
    let abandoned = claim(&harness);
    assert_eq!(abandoned.stage, Stage::Analyze);
    lock(&harness.storage)
        .unwrap()
        .set_updated_at(audit_id, LONG_AGO)
        .unwrap();

    // Nothing can be claimed while the dead worker holds the task
    let stats = Worker::new(Arc::clone(&pipeline)).run_until_idle().await.unwrap();
    assert_eq!(stats.tasks_run, 0);

    let monitor = RecoveryMonitor::new(harness.storage.clone(), harness.config.recovery.clone());
    let stuck = monitor.list_stuck().unwrap();
    assert_eq!(stuck.len(), 1);
    assert_eq!(stuck[0].status, AuditStatus::Analyzing);

    // Inside the claim lease the dead worker still gets the benefit of the doubt
    let outcomes = monitor.auto_recover().unwrap();
    assert!(matches!(outcomes[0].action, RecoveryAction::Running { .. }));

    let outcomes = monitor
        .auto_recover_at(seconds_from_now(harness.config.recovery.claim_lease + 1))
        .unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(
        outcomes[0].action,
        RecoveryAction::Requeued {
            stage: Stage::Analyze,
            ..
        }
    ));

    // A second scan finds nothing to do
    assert!(monitor.auto_recover().unwrap().is_empty());

    let stats = Worker::new(pipeline).run_until_idle().await.unwrap();
    assert_eq!(stats.committed, 4);
    assert_eq!(harness.job(audit_id).status, AuditStatus::Complete);
}

#[tokio::test]
async fn test_running_stage_is_not_requeued() {
    let harness = Harness::new(test_config());
    let audit_id = harness.start();
    let held_link = format!("{}held", page_url(0));
    let responder = Arc::new(GatedResponder::new());
    let pipeline = Arc::new(harness.pipeline(
        Arc::new(ScriptedCrawler::new(vec![page(0, vec![held_link.clone()])])),
        responder.clone(),
    ));

    let task = claim_internal_stage(&harness, &pipeline).await;
    let running = tokio::spawn({
        let pipeline = Arc::clone(&pipeline);
        async move { pipeline.run_task(task).await }
    });
    responder.wait_until_entered().await;

    // Past the staleness threshold, still inside the claim lease
    let scan_at = seconds_from_now(harness.config.recovery.stale_after + 1);
    let monitor = RecoveryMonitor::new(harness.storage.clone(), harness.config.recovery.clone());
    assert_eq!(monitor.list_stuck_at(scan_at).unwrap().len(), 1);

    let before = harness.job(audit_id);
    let outcome = monitor.recover_at(audit_id, scan_at).unwrap();
    assert!(matches!(
        outcome.action,
        RecoveryAction::Running {
            stage: Stage::InternalLinks,
            ..
        }
    ));
    assert_eq!(harness.job(audit_id), before);

    let outcomes = monitor.auto_recover_at(scan_at).unwrap();
    assert!(outcomes
        .iter()
        .all(|o| matches!(o.action, RecoveryAction::Running { .. })));

    // No second worker can pick the stage up
    assert!(lock(&harness.storage)
        .unwrap()
        .claim_next_task(&timestamp(scan_at))
        .unwrap()
        .is_none());

    responder.release();
    let outcome = running.await.unwrap().unwrap();
    assert_eq!(outcome, TaskOutcome::Committed(AuditStatus::CheckingExternalLinks));
    assert_eq!(responder.calls(), vec![held_link]);
}

#[tokio::test(start_paused = true)]
async fn test_status_lists_recent_audits() {
    let harness = Harness::new(test_config());
    let first = harness.start();
    let second = harness.start();

    let monitor = RecoveryMonitor::new(harness.storage.clone(), harness.config.recovery.clone());
    let ids: Vec<i64> = monitor.status().unwrap().iter().map(|job| job.id).collect();

    assert_eq!(ids, vec![second, first]);
}
