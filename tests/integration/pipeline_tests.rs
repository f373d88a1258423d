//! End-to-end runs of the stage pipeline with scripted collaborators
//!
//! These tests run on a paused clock, so the politeness delays and chunk
//! deadlines elapse instantly.

use crate::common::{page, page_url, FakeProbe, Harness, ScriptedCrawler, test_config};
use site_audit::checker::LinkCategory;
use site_audit::crawler::CrawlError;
use site_audit::failure::FailureKind;
use site_audit::pipeline::Worker;
use site_audit::state::Stage;
use site_audit::storage::{lock, Storage};
use site_audit::AuditStatus;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// 20 pages linking to the next page and to 47 external URLs over 12 domains
///
/// Every fifth external URL is broken and the home page also links to one
/// missing internal page.
fn twenty_page_site() -> Vec<site_audit::crawler::PageExport> {
    let mut links: Vec<Vec<String>> = (0..20).map(|n| vec![page_url((n + 1) % 20)]).collect();
    links[0].push(format!("{}missing-page", page_url(0)));
    for i in 0..47 {
        let path = if i % 5 == 0 { "missing" } else { "ok" };
        links[i % 20].push(format!("https://d{}.example/{}/{}", i % 12, path, i));
    }
    links
        .into_iter()
        .enumerate()
        .map(|(n, links)| page(n, links))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_full_audit_reaches_complete() {
    let harness = Harness::new(test_config());
    let audit_id = harness.start();
    let crawler = Arc::new(ScriptedCrawler::new(twenty_page_site()));
    let pipeline = harness.pipeline(crawler.clone(), Arc::new(FakeProbe::new()));

    let stats = Worker::new(Arc::new(pipeline)).run_until_idle().await.unwrap();

    assert_eq!(stats.committed, Stage::ALL.len());
    assert_eq!(stats.failed, 0);
    assert_eq!(crawler.calls.load(Ordering::SeqCst), 1);

    let job = harness.job(audit_id);
    assert_eq!(job.status, AuditStatus::Complete);
    assert!(job.completed_at.is_some());
    assert!(job.error_message.is_none());

    let report = job.report.expect("complete audit has a report");
    assert_eq!(report.summary.pages_analyzed, 20);
    assert!(report.pages.is_empty());

    assert_eq!(report.external.candidates, 47);
    assert_eq!(report.external.chunks_total, 3);
    assert_eq!(report.external.chunks_completed, 3);
    assert_eq!(report.summary.external.total, 47);
    assert_eq!(
        report.summary.external.categories.values().sum::<usize>(),
        report.external.checked
    );
    assert_eq!(report.summary.external.count(LinkCategory::Broken), 10);
    assert_eq!(report.summary.external.count(LinkCategory::Success), 37);

    assert_eq!(report.summary.internal.total, 21);
    assert_eq!(report.summary.internal.count(LinkCategory::Broken), 1);
    assert_eq!(report.problems.len(), 11);
    assert!(report.warnings.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stage_summaries_recorded_in_order() {
    let harness = Harness::new(test_config());
    let audit_id = harness.start();
    let pipeline = harness.pipeline(
        Arc::new(ScriptedCrawler::new(twenty_page_site())),
        Arc::new(FakeProbe::new()),
    );

    Worker::new(Arc::new(pipeline)).run_until_idle().await.unwrap();

    let storage = lock(&harness.storage).unwrap();
    let completed: Vec<String> = Stage::ALL
        .iter()
        .map(|stage| {
            storage
                .load_stage_summary(audit_id, *stage)
                .unwrap()
                .expect("every stage recorded")
                .completed_at
        })
        .collect();
    let mut sorted = completed.clone();
    sorted.sort();
    assert_eq!(completed, sorted);
    assert_eq!(storage.count_queued_tasks().unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_chunks_still_complete() {
    let mut config = test_config();
    config.external_links.chunk_size = 2;

    let mut home_links = vec![page_url(1)];
    home_links.extend((0..10).map(|i| format!("https://host{}.example/page", i)));
    let pages = vec![page(0, home_links), page(1, vec![page_url(0)])];

    let harness = Harness::new(config);
    let audit_id = harness.start();
    let pipeline = harness.pipeline(
        Arc::new(ScriptedCrawler::new(pages)),
        Arc::new(FakeProbe::with_slow_hosts(&["host2.", "host6."])),
    );

    Worker::new(Arc::new(pipeline)).run_until_idle().await.unwrap();

    let job = harness.job(audit_id);
    assert_eq!(job.status, AuditStatus::Complete);

    let report = job.report.unwrap();
    assert_eq!(report.external.chunks_total, 5);
    assert_eq!(report.external.chunks_completed, 3);
    assert_eq!(report.external.chunks_timed_out, 2);
    assert_eq!(report.summary.external.count(LinkCategory::Indeterminate), 4);
    assert_eq!(report.summary.external.count(LinkCategory::Success), 6);

    let indeterminate: Vec<&str> = report
        .problems
        .iter()
        .filter(|r| r.category == LinkCategory::Indeterminate)
        .map(|r| r.url.as_str())
        .collect();
    assert_eq!(
        indeterminate,
        vec![
            "https://host2.example/page",
            "https://host3.example/page",
            "https://host6.example/page",
            "https://host7.example/page",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_stage_backs_off_then_fails() {
    let pages = vec![page(0, vec![format!("{}busy", page_url(0))])];

    let harness = Harness::new(test_config());
    let audit_id = harness.start();
    let pipeline = harness.pipeline(Arc::new(ScriptedCrawler::new(pages)), Arc::new(FakeProbe::new()));

    let stats = Worker::new(Arc::new(pipeline)).run_until_idle().await.unwrap();

    assert_eq!(stats.rescheduled, 2);
    assert_eq!(stats.failed, 1);

    let job = harness.job(audit_id);
    assert_eq!(job.status, AuditStatus::Failed);
    assert_eq!(job.error_kind, Some(FailureKind::RateLimitExceeded));
    assert_eq!(
        job.error_message.as_deref(),
        Some("The website is limiting our requests. Please try again later.")
    );
    assert!(job
        .technical_detail
        .unwrap()
        .contains("after 3 attempts"));
    assert!(job.report.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_external_stage_rate_limited_as_a_whole_backs_off() {
    let pages = vec![page(
        0,
        vec![
            "https://d0.example/busy".to_string(),
            "https://d1.example/busy/page".to_string(),
            "https://d2.example/busy".to_string(),
        ],
    )];

    let harness = Harness::new(test_config());
    let audit_id = harness.start();
    let probe = Arc::new(FakeProbe::new());
    let pipeline = harness.pipeline(Arc::new(ScriptedCrawler::new(pages)), probe.clone());

    let stats = Worker::new(Arc::new(pipeline)).run_until_idle().await.unwrap();

    assert_eq!(stats.committed, 3);
    assert_eq!(stats.rescheduled, 2);
    assert_eq!(stats.failed, 1);
    // Each attempt re-checked the whole external set
    assert_eq!(probe.calls.lock().unwrap().len(), 9);

    let job = harness.job(audit_id);
    assert_eq!(job.status, AuditStatus::Failed);
    assert_eq!(job.error_kind, Some(FailureKind::RateLimitExceeded));
    assert!(job
        .technical_detail
        .unwrap()
        .contains("after 3 attempts"));
    assert!(lock(&harness.storage)
        .unwrap()
        .load_stage_summary(audit_id, Stage::ExternalLinks)
        .unwrap()
        .is_none());
}

#[tokio::test(start_paused = true)]
async fn test_partly_rate_limited_external_stage_completes() {
    let pages = vec![page(
        0,
        vec![
            "https://d0.example/busy".to_string(),
            "https://d1.example/ok".to_string(),
        ],
    )];

    let harness = Harness::new(test_config());
    let audit_id = harness.start();
    let pipeline = harness.pipeline(Arc::new(ScriptedCrawler::new(pages)), Arc::new(FakeProbe::new()));

    let stats = Worker::new(Arc::new(pipeline)).run_until_idle().await.unwrap();

    assert_eq!(stats.rescheduled, 0);
    let report = harness.job(audit_id).report.unwrap();
    assert_eq!(report.external.rate_limited, 1);
    assert_eq!(report.summary.external.count(LinkCategory::Indeterminate), 1);
    assert_eq!(report.summary.external.count(LinkCategory::Success), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_crawl_errors_are_retried() {
    let crawler = Arc::new(
        ScriptedCrawler::new(vec![page(0, Vec::new())]).failing_first(vec![
            CrawlError::Transient("connection reset".to_string()),
            CrawlError::RateLimited(page_url(0)),
        ]),
    );

    let harness = Harness::new(test_config());
    let audit_id = harness.start();
    let pipeline = harness.pipeline(crawler.clone(), Arc::new(FakeProbe::new()));

    let stats = Worker::new(Arc::new(pipeline)).run_until_idle().await.unwrap();

    assert_eq!(stats.rescheduled, 2);
    assert_eq!(crawler.calls.load(Ordering::SeqCst), 3);
    assert_eq!(harness.job(audit_id).status, AuditStatus::Complete);
}

#[tokio::test(start_paused = true)]
async fn test_fatal_crawl_error_fails_job() {
    let crawler = Arc::new(
        ScriptedCrawler::new(Vec::new()).failing_first(vec![CrawlError::Fatal(
            "dns error: failed to lookup address information".to_string(),
        )]),
    );

    let harness = Harness::new(test_config());
    let audit_id = harness.start();
    let pipeline = harness.pipeline(crawler.clone(), Arc::new(FakeProbe::new()));

    let stats = Worker::new(Arc::new(pipeline)).run_until_idle().await.unwrap();

    assert_eq!(stats.failed, 1);
    assert_eq!(crawler.calls.load(Ordering::SeqCst), 1);

    let view = harness.service.get_audit(audit_id).unwrap();
    assert_eq!(view.status, AuditStatus::Failed);
    assert_eq!(view.error_kind.as_deref(), Some("CRAWL"));
    assert_eq!(
        view.error_message.as_deref(),
        Some("Website not found. Please check the URL and try again.")
    );
}

#[tokio::test(start_paused = true)]
async fn test_worker_runs_several_audits() {
    let harness = Harness::new(test_config());
    let ids: Vec<i64> = (0..3).map(|_| harness.start()).collect();
    let pipeline = harness.pipeline(
        Arc::new(ScriptedCrawler::new(vec![page(0, vec![page_url(0)])])),
        Arc::new(FakeProbe::new()),
    );

    let stats = Worker::new(Arc::new(pipeline)).run_until_idle().await.unwrap();

    assert_eq!(stats.committed, 3 * Stage::ALL.len());
    for id in ids {
        assert_eq!(harness.job(id).status, AuditStatus::Complete);
    }
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_task_delivery_is_skipped() {
    let harness = Harness::new(test_config());
    let audit_id = harness.start();
    let pipeline = Arc::new(harness.pipeline(
        Arc::new(ScriptedCrawler::new(vec![page(0, Vec::new())])),
        Arc::new(FakeProbe::new()),
    ));

    let task = lock(&harness.storage)
        .unwrap()
        .claim_next_task("2100-01-01T00:00:00.000000Z")
        .unwrap()
        .unwrap();
    let outcome = pipeline.run_task(task.clone()).await.unwrap();
    assert_eq!(
        outcome,
        site_audit::pipeline::TaskOutcome::Committed(AuditStatus::Analyzing)
    );

    // The broker hands the same crawl task out a second time
    let again = pipeline.run_task(task).await.unwrap();
    assert_eq!(again, site_audit::pipeline::TaskOutcome::Skipped);
    assert_eq!(harness.job(audit_id).status, AuditStatus::Analyzing);
}
