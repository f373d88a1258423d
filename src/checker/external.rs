//! External link verifier
//!
//! Verification runs as a bounded pool of chunk tasks:
//! 1. Cap the candidates and build domain-spread chunks
//! 2. Spawn one task per chunk into a `JoinSet`; a semaphore bounds how many
//!    run at once
//! 3. Each task owns its result buffer and races its work against its own
//!    deadline and a cancellation token
//! 4. A global deadline cancels the parent token and drains whatever is left
//! 5. URLs of chunks that did not complete are recorded as INDETERMINATE

use crate::checker::chunking::ChunkEntry;
use crate::checker::{
    build_chunks, cap_candidates, check_with_retry, Chunk, FalsePositiveFilter, LinkCategory,
    LinkCheckResult, LinkProbe, LinkScope, LinkTarget, RetryPolicy,
};
use crate::config::ExternalLinksConfig;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How a chunk ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    Completed,
    TimedOut,
    Cancelled,
    /// The chunk task panicked
    Failed,
}

/// Outcome of one chunk
#[derive(Debug, Clone)]
pub struct ChunkResult {
    pub chunk_id: usize,
    /// Per-URL results; empty unless the chunk completed
    pub outcomes: Vec<LinkCheckResult>,
    pub success: bool,
    pub elapsed: Duration,
    pub status: ChunkStatus,
}

impl ChunkResult {
    fn completed(chunk_id: usize, outcomes: Vec<LinkCheckResult>, elapsed: Duration) -> Self {
        Self {
            chunk_id,
            outcomes,
            success: true,
            elapsed,
            status: ChunkStatus::Completed,
        }
    }

    fn abandoned(chunk_id: usize, status: ChunkStatus, elapsed: Duration) -> Self {
        Self {
            chunk_id,
            outcomes: Vec::new(),
            success: false,
            elapsed,
            status,
        }
    }
}

/// Counters describing one external verification run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalMeta {
    /// Distinct external URLs discovered
    pub candidates: usize,
    /// URLs with a recorded result (after the cap)
    pub checked: usize,
    /// URLs dropped by the cap
    pub truncated: usize,
    pub chunks_total: usize,
    pub chunks_completed: usize,
    pub chunks_timed_out: usize,
    pub chunks_cancelled: usize,
    pub chunks_failed: usize,
    /// Results that were still rate limited and recorded as INDETERMINATE
    pub rate_limited: usize,
    pub suppressed: usize,
}

/// Everything one external verification produced
#[derive(Debug, Clone)]
pub struct ExternalVerification {
    pub results: Vec<LinkCheckResult>,
    pub chunks: Vec<ChunkResult>,
    pub meta: ExternalMeta,
}

impl ExternalVerification {
    /// Job-level warning raised when chunks existed but none completed
    pub fn warning(&self) -> Option<String> {
        if self.meta.chunks_total > 0 && self.meta.chunks_completed == 0 {
            Some(format!(
                "External link verification did not complete any of {} chunks; {} links are indeterminate",
                self.meta.chunks_total, self.meta.checked
            ))
        } else {
            None
        }
    }
}

/// Chunked, concurrent, deadline-bounded external link checker
pub struct ExternalLinkVerifier {
    probe: Arc<dyn LinkProbe>,
    config: ExternalLinksConfig,
    retry: RetryPolicy,
    filter: FalsePositiveFilter,
}

impl ExternalLinkVerifier {
    pub fn new(probe: Arc<dyn LinkProbe>, config: ExternalLinksConfig, retry: RetryPolicy) -> Self {
        Self {
            probe,
            config,
            retry,
            filter: FalsePositiveFilter::default(),
        }
    }

    pub fn with_filter(mut self, filter: FalsePositiveFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Verifies external links
    ///
    /// # Arguments
    ///
    /// * `candidates` - Deduplicated external URLs in discovery order, each
    ///   tagged with the page that first linked to it
    ///
    /// # Returns
    ///
    /// One result per URL kept after the cap, in chunk order. Individual chunk
    /// failures never fail the verification.
    pub async fn verify(&self, candidates: Vec<LinkTarget>) -> ExternalVerification {
        let candidate_count = candidates.len();
        let (targets, truncated) = cap_candidates(candidates, self.config.max_links);
        if truncated > 0 {
            tracing::info!(
                kept = targets.len(),
                truncated,
                "external link candidates capped"
            );
        }

        let chunks = build_chunks(targets, &self.config);
        tracing::info!(
            chunks = chunks.len(),
            urls = candidate_count - truncated,
            "verifying external links"
        );

        let mut finished = self.run_chunks(&chunks).await;

        let mut meta = ExternalMeta {
            candidates: candidate_count,
            truncated,
            chunks_total: chunks.len(),
            ..ExternalMeta::default()
        };
        let mut results = Vec::with_capacity(candidate_count - truncated);
        let mut chunk_results = Vec::with_capacity(chunks.len());

        for chunk in &chunks {
            let result = finished
                .remove(&chunk.id)
                .unwrap_or_else(|| ChunkResult::abandoned(chunk.id, ChunkStatus::Failed, Duration::ZERO));

            match result.status {
                ChunkStatus::Completed => {
                    meta.chunks_completed += 1;
                    results.extend(result.outcomes.iter().cloned());
                }
                status => {
                    match status {
                        ChunkStatus::TimedOut => meta.chunks_timed_out += 1,
                        ChunkStatus::Cancelled => meta.chunks_cancelled += 1,
                        _ => meta.chunks_failed += 1,
                    }
                    results.extend(
                        chunk
                            .targets()
                            .map(|t| LinkCheckResult::indeterminate(t, LinkScope::External)),
                    );
                }
            }
            chunk_results.push(result);
        }

        meta.checked = results.len();
        meta.rate_limited = results
            .iter()
            .filter(|r| r.outcome.is_rate_limited())
            .count();
        meta.suppressed = self.filter.apply(&mut results);

        tracing::info!(
            completed = meta.chunks_completed,
            timed_out = meta.chunks_timed_out,
            cancelled = meta.chunks_cancelled,
            failed = meta.chunks_failed,
            indeterminate = results
                .iter()
                .filter(|r| r.category == LinkCategory::Indeterminate)
                .count(),
            "external link verification finished"
        );

        ExternalVerification {
            results,
            chunks: chunk_results,
            meta,
        }
    }

    /// Runs every chunk under the semaphore and the global deadline
    async fn run_chunks(&self, chunks: &[Chunk]) -> HashMap<usize, ChunkResult> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_chunks.max(1)));
        let cancel = CancellationToken::new();
        let deadline = Instant::now() + self.config.global_timeout();

        let mut set = JoinSet::new();
        for chunk in chunks {
            set.spawn(run_chunk(ChunkRun {
                chunk: chunk.clone(),
                probe: Arc::clone(&self.probe),
                retry: self.retry,
                semaphore: Arc::clone(&semaphore),
                token: cancel.child_token(),
                timeout: self.config.chunk_timeout(),
            }));
        }

        let mut finished = HashMap::with_capacity(chunks.len());
        loop {
            match tokio::time::timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok(result))) => {
                    finished.insert(result.chunk_id, result);
                }
                Ok(Some(Err(e))) => {
                    tracing::warn!(error = %e, "chunk task did not return a result");
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        remaining = set.len(),
                        "global deadline reached, cancelling remaining chunks"
                    );
                    cancel.cancel();
                    while let Some(joined) = set.join_next().await {
                        match joined {
                            Ok(result) => {
                                finished.insert(result.chunk_id, result);
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "chunk task did not return a result")
                            }
                        }
                    }
                    break;
                }
            }
        }

        finished
    }
}

/// Everything a chunk task owns
struct ChunkRun {
    chunk: Chunk,
    probe: Arc<dyn LinkProbe>,
    retry: RetryPolicy,
    semaphore: Arc<Semaphore>,
    token: CancellationToken,
    timeout: Duration,
}

async fn run_chunk(run: ChunkRun) -> ChunkResult {
    let ChunkRun {
        chunk,
        probe,
        retry,
        semaphore,
        token,
        timeout,
    } = run;

    let _permit = tokio::select! {
        _ = token.cancelled() => {
            return ChunkResult::abandoned(chunk.id, ChunkStatus::Cancelled, Duration::ZERO);
        }
        permit = semaphore.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return ChunkResult::abandoned(chunk.id, ChunkStatus::Cancelled, Duration::ZERO),
        },
    };

    let started = Instant::now();
    tracing::debug!(
        chunk_id = chunk.id,
        urls = chunk.len(),
        domains = chunk.domains().len(),
        serialized = chunk.policy.is_serialized(),
        "chunk started"
    );

    let outcome = tokio::select! {
        _ = token.cancelled() => Err(ChunkStatus::Cancelled),
        checked = tokio::time::timeout(timeout, check_chunk(&chunk, probe.as_ref(), &retry)) => {
            checked.map_err(|_| ChunkStatus::TimedOut)
        }
    };

    let elapsed = started.elapsed();
    match outcome {
        Ok(outcomes) => {
            tracing::debug!(chunk_id = chunk.id, elapsed_ms = elapsed.as_millis() as u64, "chunk completed");
            ChunkResult::completed(chunk.id, outcomes, elapsed)
        }
        Err(status) => {
            tracing::warn!(chunk_id = chunk.id, ?status, urls = chunk.len(), "chunk abandoned");
            ChunkResult::abandoned(chunk.id, status, elapsed)
        }
    }
}

/// Checks every URL of a chunk
///
/// Each domain is split into `per_domain_parallelism` lanes; a lane issues
/// its requests one after another with the chunk's delay in between, and all
/// lanes run concurrently. Results come back in chunk order.
async fn check_chunk(
    chunk: &Chunk,
    probe: &dyn LinkProbe,
    retry: &RetryPolicy,
) -> Vec<LinkCheckResult> {
    let mut lanes: Vec<Vec<(usize, &ChunkEntry)>> = Vec::new();

    for domain in chunk.domains() {
        let entries: Vec<(usize, &ChunkEntry)> = chunk
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.domain == domain)
            .collect();

        let lane_count = chunk.policy.per_domain_parallelism.clamp(1, entries.len().max(1));
        let mut domain_lanes: Vec<Vec<(usize, &ChunkEntry)>> = vec![Vec::new(); lane_count];
        for (n, entry) in entries.into_iter().enumerate() {
            domain_lanes[n % lane_count].push(entry);
        }
        lanes.extend(domain_lanes);
    }

    let delay = chunk.policy.request_delay;
    let mut indexed: Vec<(usize, LinkCheckResult)> =
        join_all(lanes.into_iter().map(|lane| run_lane(lane, probe, retry, delay)))
            .await
            .into_iter()
            .flatten()
            .collect();

    indexed.sort_by_key(|(index, _)| *index);
    indexed.into_iter().map(|(_, result)| result).collect()
}

async fn run_lane(
    lane: Vec<(usize, &ChunkEntry)>,
    probe: &dyn LinkProbe,
    retry: &RetryPolicy,
    delay: Duration,
) -> Vec<(usize, LinkCheckResult)> {
    let mut results = Vec::with_capacity(lane.len());
    for (n, (index, entry)) in lane.into_iter().enumerate() {
        if n > 0 {
            tokio::time::sleep(delay).await;
        }
        let outcome = check_with_retry(probe, &entry.target.url, retry).await;
        results.push((
            index,
            LinkCheckResult::new(&entry.target, LinkScope::External, outcome),
        ));
    }
    results
}
