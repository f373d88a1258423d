//! Completion callbacks delivered to a mock endpoint

use crate::common::{page, page_url, FakeProbe, Harness, ScriptedCrawler, test_config};
use site_audit::crawler::CrawlError;
use site_audit::pipeline::{CallbackNotifier, Worker};
use site_audit::AuditStatus;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mock_endpoint(status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/audit-finished"))
        .respond_with(ResponseTemplate::new(status))
        .mount(&server)
        .await;
    server
}

fn notifier(server: &MockServer) -> CallbackNotifier {
    CallbackNotifier::new(
        reqwest::Client::new(),
        format!("{}/audit-finished", server.uri()),
    )
}

async fn received_bodies(server: &MockServer) -> Vec<serde_json::Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| serde_json::from_slice(&request.body).unwrap())
        .collect()
}

#[tokio::test]
async fn test_callback_sent_on_completion() {
    let server = mock_endpoint(200).await;
    let harness = Harness::new(test_config());
    let audit_id = harness.start();
    let pipeline = harness
        .pipeline(
            Arc::new(ScriptedCrawler::new(vec![page(0, vec![page_url(0)])])),
            Arc::new(FakeProbe::new()),
        )
        .with_notifier(notifier(&server));

    Worker::new(Arc::new(pipeline)).run_until_idle().await.unwrap();

    let job = harness.job(audit_id);
    assert_eq!(job.status, AuditStatus::Complete);

    let bodies = received_bodies(&server).await;
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["audit_id"], audit_id);
    assert_eq!(bodies[0]["status"], "COMPLETE");
    assert_eq!(bodies[0]["correlation_id"], "req-1");
    assert_eq!(
        bodies[0]["completed_at"].as_str(),
        job.completed_at.as_deref()
    );
}

#[tokio::test]
async fn test_callback_sent_on_failure() {
    let server = mock_endpoint(204).await;
    let harness = Harness::new(test_config());
    let audit_id = harness.start();
    let crawler = ScriptedCrawler::new(Vec::new())
        .failing_first(vec![CrawlError::NoPages(page_url(0))]);
    let pipeline = harness
        .pipeline(Arc::new(crawler), Arc::new(FakeProbe::new()))
        .with_notifier(notifier(&server));

    Worker::new(Arc::new(pipeline)).run_until_idle().await.unwrap();

    assert_eq!(harness.job(audit_id).status, AuditStatus::Failed);
    let bodies = received_bodies(&server).await;
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["status"], "FAILED");
}

#[tokio::test]
async fn test_callback_failure_keeps_job_complete() {
    let server = mock_endpoint(500).await;
    let harness = Harness::new(test_config());
    let audit_id = harness.start();
    let pipeline = harness
        .pipeline(
            Arc::new(ScriptedCrawler::new(vec![page(0, Vec::new())])),
            Arc::new(FakeProbe::new()),
        )
        .with_notifier(notifier(&server));

    Worker::new(Arc::new(pipeline)).run_until_idle().await.unwrap();

    let job = harness.job(audit_id);
    assert_eq!(job.status, AuditStatus::Complete);
    assert!(job.report.is_some());
    assert!(job
        .technical_detail
        .unwrap()
        .contains("callback delivery failed"));
    assert_eq!(received_bodies(&server).await.len(), 1);
}
