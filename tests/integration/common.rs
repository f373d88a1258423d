//! Shared fixtures: a scripted crawler, a fake link probe and a test config

use async_trait::async_trait;
use site_audit::checker::{LinkProbe, RawOutcome};
use site_audit::config::{parse_config, Config};
use site_audit::crawler::{CrawlError, Heading, PageExport, SiteCrawler};
use site_audit::pipeline::Pipeline;
use site_audit::storage::{lock, shared, AuditJob, SharedStorage, SqliteStorage, Storage};
use site_audit::AuditService;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use url::Url;

pub const SITE: &str = "https://site.example/";

const MINIMAL: &str = r#"
[user-agent]
crawler-name = "SiteAuditTest"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "ops@example.com"

[storage]
database-path = ":memory:"
"#;

/// Default configuration with backoff delays removed
pub fn test_config() -> Config {
    let mut config = parse_config(MINIMAL).expect("test config parses");
    config.retry.stage_backoff_base = 0;
    config.retry.stage_max_attempts = 3;
    config.retry.server_error_delay = 0;
    config.worker.poll_interval = 10;
    config
}

/// URL of page `n` of the test site; page 0 is the home page
pub fn page_url(n: usize) -> String {
    if n == 0 {
        SITE.to_string()
    } else {
        format!("{}p{}", SITE, n)
    }
}

/// A well-formed page linking to `links`
pub fn page(n: usize, links: Vec<String>) -> PageExport {
    let mut meta = BTreeMap::new();
    meta.insert("description".to_string(), format!("Page {}", n));
    PageExport {
        url: page_url(n),
        status_code: 200,
        title: Some(format!("Page {}", n)),
        meta,
        headings: vec![Heading {
            level: 1,
            text: format!("Heading {}", n),
        }],
        links,
        depth: if n == 0 { 0 } else { 1 },
    }
}

/// Crawler returning fixed pages after a scripted series of failures
pub struct ScriptedCrawler {
    pages: Vec<PageExport>,
    failures: Mutex<VecDeque<CrawlError>>,
    pub calls: AtomicUsize,
}

impl ScriptedCrawler {
    pub fn new(pages: Vec<PageExport>) -> Self {
        Self {
            pages,
            failures: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_first(mut self, failures: Vec<CrawlError>) -> Self {
        self.failures = Mutex::new(failures.into());
        self
    }
}

#[async_trait]
impl SiteCrawler for ScriptedCrawler {
    async fn crawl(&self, _start_url: &Url, max_pages: u32) -> Result<Vec<PageExport>, CrawlError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(self.pages.iter().take(max_pages as usize).cloned().collect())
    }
}

/// Probe answering by path; requests to slow hosts never finish in time
pub struct FakeProbe {
    slow_hosts: Vec<String>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self::with_slow_hosts(&[])
    }

    pub fn with_slow_hosts(hosts: &[&str]) -> Self {
        Self {
            slow_hosts: hosts.iter().map(|h| h.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LinkProbe for FakeProbe {
    async fn probe(&self, url: &str) -> RawOutcome {
        self.calls.lock().unwrap().push(url.to_string());
        if self.slow_hosts.iter().any(|h| url.contains(h.as_str())) {
            tokio::time::sleep(Duration::from_secs(10_000)).await;
        }

        if url.contains("/missing") {
            RawOutcome::Status(404)
        } else if url.contains("/forbidden") {
            RawOutcome::Status(403)
        } else if url.contains("/busy") {
            RawOutcome::Status(429)
        } else {
            RawOutcome::Status(200)
        }
    }
}

/// Link checker that holds every request open until the test releases it
pub struct GatedResponder {
    entered: Notify,
    gate: Notify,
    calls: Mutex<Vec<String>>,
}

impl GatedResponder {
    pub fn new() -> Self {
        Self {
            entered: Notify::new(),
            gate: Notify::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Waits until a request is in flight
    pub async fn wait_until_entered(&self) {
        self.entered.notified().await;
    }

    /// Lets the held request answer 200
    pub fn release(&self) {
        self.gate.notify_one();
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LinkProbe for GatedResponder {
    async fn probe(&self, url: &str) -> RawOutcome {
        self.calls.lock().unwrap().push(url.to_string());
        self.entered.notify_one();
        self.gate.notified().await;
        RawOutcome::Status(200)
    }
}

/// Everything a test needs to start audits and run them
pub struct Harness {
    pub storage: SharedStorage,
    pub config: Arc<Config>,
    pub service: AuditService,
}

impl Harness {
    pub fn new(config: Config) -> Self {
        let storage = shared(SqliteStorage::new_in_memory().expect("in-memory database"));
        let config = Arc::new(config);
        let service = AuditService::new(storage.clone(), Arc::clone(&config), "test-hash");
        Self {
            storage,
            config,
            service,
        }
    }

    pub fn pipeline(&self, crawler: Arc<dyn SiteCrawler>, probe: Arc<dyn LinkProbe>) -> Pipeline {
        Pipeline::new(self.storage.clone(), Arc::clone(&self.config), crawler, probe)
    }

    pub fn start(&self) -> i64 {
        self.service
            .start_audit(SITE, Some(50), None, Some("req-1".to_string()))
            .expect("audit starts")
            .audit_id
    }

    pub fn job(&self, audit_id: i64) -> AuditJob {
        lock(&self.storage)
            .unwrap()
            .get_audit(audit_id)
            .unwrap()
            .expect("audit exists")
    }
}
