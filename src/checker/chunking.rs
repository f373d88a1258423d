//! Domain-aware chunking of external links
//!
//! Candidates are grouped by registrable domain in discovery order and dealt
//! into chunks round-robin: a cursor cycles over the domains taking at most
//! one URL from each per turn, and a new chunk opens when the current one is
//! full. The cursor carries over between chunks, so requests to a busy domain
//! are spread across chunks instead of bursting in one.

use crate::checker::LinkTarget;
use crate::config::{ExternalLinksConfig, MIN_MULTI_DOMAIN_DELAY_MS, MIN_SINGLE_DOMAIN_DELAY_MS};
use crate::url::registrable_domain_of;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

/// Request pacing applied to one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPolicy {
    /// Delay between consecutive requests in one lane
    pub request_delay: Duration,
    /// Lanes per domain
    pub per_domain_parallelism: usize,
}

impl ChunkPolicy {
    /// Chooses the pacing from the number of distinct domains in the chunk
    ///
    /// A single-domain chunk is serialized with the conservative delay. A
    /// multi-domain chunk allows bounded per-domain parallelism with the
    /// relaxed delay. The configured delays never go below their minimums.
    pub fn for_domain_count(domain_count: usize, config: &ExternalLinksConfig) -> Self {
        if domain_count <= 1 {
            Self {
                request_delay: Duration::from_millis(
                    config.single_domain_delay.max(MIN_SINGLE_DOMAIN_DELAY_MS),
                ),
                per_domain_parallelism: 1,
            }
        } else {
            Self {
                request_delay: Duration::from_millis(
                    config.multi_domain_delay.max(MIN_MULTI_DOMAIN_DELAY_MS),
                ),
                per_domain_parallelism: config.per_domain_parallelism.max(1),
            }
        }
    }

    pub fn is_serialized(&self) -> bool {
        self.per_domain_parallelism == 1
    }
}

/// A URL placed in a chunk together with its registrable domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkEntry {
    pub domain: String,
    pub target: LinkTarget,
}

/// A bounded, domain-spread group of external URLs verified together
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: usize,
    pub entries: Vec<ChunkEntry>,
    pub policy: ChunkPolicy,
}

impl Chunk {
    /// Distinct domains in first-seen order
    pub fn domains(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for entry in &self.entries {
            if !seen.contains(&entry.domain.as_str()) {
                seen.push(&entry.domain);
            }
        }
        seen
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn targets(&self) -> impl Iterator<Item = &LinkTarget> {
        self.entries.iter().map(|e| &e.target)
    }
}

/// Truncates candidates to the ceiling, keeping discovery order
///
/// # Returns
///
/// The kept candidates and the number dropped
pub fn cap_candidates(mut candidates: Vec<LinkTarget>, max_links: usize) -> (Vec<LinkTarget>, usize) {
    let truncated = candidates.len().saturating_sub(max_links);
    candidates.truncate(max_links);
    (candidates, truncated)
}

/// Partitions targets into chunks without loss or duplication
///
/// # Arguments
///
/// * `targets` - Candidates in discovery order (already capped)
/// * `config` - Supplies chunk size and pacing settings
pub fn build_chunks(targets: Vec<LinkTarget>, config: &ExternalLinksConfig) -> Vec<Chunk> {
    let chunk_size = config.chunk_size.max(1);

    let mut order: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, VecDeque<LinkTarget>)> = Vec::new();
    for target in targets {
        let domain = registrable_domain_of(&target.url).unwrap_or_else(|| target.url.clone());
        let index = *order.entry(domain.clone()).or_insert_with(|| {
            groups.push((domain, VecDeque::new()));
            groups.len() - 1
        });
        groups[index].1.push_back(target);
    }

    let mut remaining: usize = groups.iter().map(|(_, q)| q.len()).sum();
    let mut batches: Vec<Vec<ChunkEntry>> = Vec::new();
    let mut current: Vec<ChunkEntry> = Vec::with_capacity(chunk_size);
    let mut cursor = 0;

    while remaining > 0 {
        let (domain, queue) = &mut groups[cursor];
        if let Some(target) = queue.pop_front() {
            current.push(ChunkEntry {
                domain: domain.clone(),
                target,
            });
            remaining -= 1;
            if current.len() == chunk_size {
                batches.push(std::mem::replace(
                    &mut current,
                    Vec::with_capacity(chunk_size),
                ));
            }
        }
        cursor = (cursor + 1) % groups.len();
    }
    if !current.is_empty() {
        batches.push(current);
    }

    batches
        .into_iter()
        .enumerate()
        .map(|(id, entries)| {
            let domain_count = entries
                .iter()
                .map(|e| e.domain.as_str())
                .collect::<HashSet<_>>()
                .len();
            Chunk {
                id,
                policy: ChunkPolicy::for_domain_count(domain_count, config),
                entries,
            }
        })
        .collect()
}
