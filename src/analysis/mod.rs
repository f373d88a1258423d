//! Page analysis
//!
//! Turns crawl exports into [`PageRecord`]s: the page's title, meta
//! description and headings, its links split into same-site and external
//! sets, and the on-page findings (title, meta description and H1 checks).

use crate::checker::LinkTarget;
use crate::crawler::{Heading, PageExport};
use crate::url::{extract_domain, is_same_site};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::Url;

/// Which on-page check produced a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    Title,
    MetaDescription,
    H1,
}

impl Check {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::MetaDescription => "meta_description",
            Self::H1 => "h1",
        }
    }
}

/// A problem found on a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub check: Check,
    pub message: String,
}

impl Finding {
    fn new(check: Check, message: impl Into<String>) -> Self {
        Self {
            check,
            message: message.into(),
        }
    }
}

/// Analyzed page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    pub url: String,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub headings: Vec<Heading>,
    /// Same-site links in document order
    pub internal_links: Vec<String>,
    /// Links to other sites in document order
    pub external_links: Vec<String>,
    pub findings: Vec<Finding>,
}

/// Analyzes one exported page
///
/// # Arguments
///
/// * `export` - The crawled page
/// * `site_host` - Host of the audited site, used to split links
pub fn analyze_page(export: &PageExport, site_host: &str) -> PageRecord {
    let meta_description = export.meta.get("description").cloned();
    let mut findings = Vec::new();

    match export.title.as_deref() {
        None => findings.push(Finding::new(Check::Title, "Title tag not found.")),
        Some("") => findings.push(Finding::new(Check::Title, "Title tag is empty.")),
        Some(_) => {}
    }

    match meta_description.as_deref() {
        None => findings.push(Finding::new(
            Check::MetaDescription,
            "Meta description not found.",
        )),
        Some("") => findings.push(Finding::new(Check::MetaDescription, "Meta description is empty.")),
        Some(_) => {}
    }

    let h1: Vec<&Heading> = export.headings.iter().filter(|h| h.level == 1).collect();
    match h1.as_slice() {
        [] => findings.push(Finding::new(Check::H1, "No H1 tag found.")),
        [only] if only.text.is_empty() => findings.push(Finding::new(Check::H1, "H1 tag is empty.")),
        [_] => {}
        many => findings.push(Finding::new(
            Check::H1,
            format!("Found {} H1 tags. Expected 1.", many.len()),
        )),
    }

    let mut internal_links = Vec::new();
    let mut external_links = Vec::new();
    for link in &export.links {
        let Ok(parsed) = Url::parse(link) else {
            continue;
        };
        let internal = extract_domain(&parsed).is_some_and(|host| is_same_site(&host, site_host));
        if internal {
            internal_links.push(link.clone());
        } else {
            external_links.push(link.clone());
        }
    }

    PageRecord {
        url: export.url.clone(),
        title: export.title.clone(),
        meta_description,
        headings: export.headings.clone(),
        internal_links,
        external_links,
        findings,
    }
}

/// Analyzes every successfully fetched page
pub fn analyze_pages(exports: &[PageExport], site_host: &str) -> Vec<PageRecord> {
    let records: Vec<PageRecord> = exports
        .iter()
        .filter(|export| export.is_ok())
        .map(|export| analyze_page(export, site_host))
        .collect();

    tracing::debug!(
        pages = records.len(),
        findings = records.iter().map(|r| r.findings.len()).sum::<usize>(),
        "pages analyzed"
    );
    records
}

/// Every internal link occurrence, in page order
pub fn internal_occurrences(records: &[PageRecord]) -> Vec<LinkTarget> {
    records
        .iter()
        .flat_map(|record| {
            record
                .internal_links
                .iter()
                .map(|link| LinkTarget::new(link.clone(), record.url.clone()))
        })
        .collect()
}

/// Distinct external links in discovery order, each tagged with the first
/// page that linked to it
pub fn external_candidates(records: &[PageRecord]) -> Vec<LinkTarget> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    for record in records {
        for link in &record.external_links {
            if seen.insert(link.as_str()) {
                candidates.push(LinkTarget::new(link.clone(), record.url.clone()));
            }
        }
    }
    candidates
}
