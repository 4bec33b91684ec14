//! Live directory data attached to a turn.
//!
//! Each intent that has backing data produces at most [`ENRICHMENT_LIMIT`]
//! records rendered one per line. Intents without data return an empty
//! record without touching the store.

use crate::intent::Intent;
use crate::store::{Business, HealthFacility, Job, Store};
use tracing::debug;

pub const ENRICHMENT_LIMIT: i64 = 5;

/// Words of the message used for a business name search.
const BUSINESS_TERM_TOKENS: usize = 3;

/// Place names recognised in job searches. Multi-word names come first so
/// they win over their parts.
pub const KNOWN_DISTRICTS: &[&str] = &[
    "western area",
    "port loko",
    "freetown",
    "waterloo",
    "bo",
    "kenema",
    "makeni",
    "kono",
    "koidu",
    "kailahun",
    "kambia",
    "bombali",
    "tonkolili",
    "moyamba",
    "pujehun",
    "bonthe",
    "koinadugu",
    "kabala",
    "falaba",
    "karene",
    "lunsar",
];

#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    #[error("directory lookup failed: {0}")]
    Store(String),
}

impl From<anyhow::Error> for EnrichError {
    fn from(err: anyhow::Error) -> Self {
        EnrichError::Store(format!("{:#}", err))
    }
}

#[derive(Clone, Debug)]
pub struct Enricher {
    store: Store,
}

impl Enricher {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn enrich(&self, intent: Intent, message: &str) -> Result<String, EnrichError> {
        let lowered = message.to_lowercase();
        let lines = match intent {
            Intent::BusinessVerification => {
                let term = business_term(&lowered);
                debug!(term = %term, "Searching businesses");
                self.store
                    .search_businesses(&term, ENRICHMENT_LIMIT)
                    .await?
                    .iter()
                    .map(business_line)
                    .collect::<Vec<_>>()
            }
            Intent::JobSearch => {
                let district = find_district(&lowered);
                debug!(district = ?district, "Fetching active jobs");
                self.store
                    .active_jobs(district, ENRICHMENT_LIMIT)
                    .await?
                    .iter()
                    .map(job_line)
                    .collect()
            }
            Intent::Healthcare => self
                .store
                .health_facilities(ENRICHMENT_LIMIT)
                .await?
                .iter()
                .map(facility_line)
                .collect(),
            _ => return Ok(String::new()),
        };

        Ok(lines.join("\n"))
    }
}

/// First three whitespace-separated words of the lower-cased message, with
/// surrounding ASCII punctuation stripped.
pub fn business_term(lowered: &str) -> String {
    lowered
        .split_whitespace()
        .map(|token| token.trim_matches(|c: char| c.is_ascii_punctuation()))
        .filter(|token| !token.is_empty())
        .take(BUSINESS_TERM_TOKENS)
        .collect::<Vec<_>>()
        .join(" ")
}

/// First known district named in the message, matched on whole words.
pub fn find_district(lowered: &str) -> Option<&'static str> {
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let padded = format!(" {} ", words.join(" "));

    KNOWN_DISTRICTS
        .iter()
        .copied()
        .find(|d| padded.contains(&format!(" {} ", d)))
}

pub fn business_line(b: &Business) -> String {
    let mut line = format!("- {} ({}, {})", b.name, b.district, b.category);
    if b.is_verified {
        line.push_str(" ✓");
    }
    line
}

pub fn job_line(j: &Job) -> String {
    let salary = j
        .salary_range
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or("Competitive salary");
    format!("- {} at {} ({}) - {}", j.title, j.company, j.location, salary)
}

pub fn facility_line(f: &HealthFacility) -> String {
    let mut line = format!("- {} ({}, {})", f.name, f.facility_type, f.district);
    if f.emergency_services {
        line.push_str(" - Emergency 24/7");
    }
    line
}
