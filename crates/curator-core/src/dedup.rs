use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::{DedupRecord, DuplicateCandidate, RecordKind};

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.85;

const LEGAL_SUFFIXES: &[&str] = &[
    "inc", "incorporated", "llc", "ltd", "limited", "co", "corp", "corporation", "company", "gmbh",
    "ag", "sa", "srl", "plc", "pty", "bv", "nv", "llp", "lp",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DedupConfig {
    pub similarity_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

/// Case-folded name without punctuation, a leading "the", or trailing
/// legal-entity suffixes.
pub fn normalize_company_name(name: &str) -> String {
    let lower = name.to_lowercase().replace('&', " and ");
    let mut words: Vec<String> = lower
        .split_whitespace()
        .map(|w| w.chars().filter(|c| c.is_alphanumeric()).collect::<String>())
        .filter(|w| !w.is_empty())
        .collect();

    if words.len() > 1 && words[0] == "the" {
        words.remove(0);
    }
    while words.len() > 1 && words.last().is_some_and(|w| LEGAL_SUFFIXES.contains(&w.as_str())) {
        words.pop();
    }
    words.join(" ")
}

pub fn name_similarity(a: &str, b: &str) -> f64 {
    let (a, b) = (normalize_company_name(a), normalize_company_name(b));
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    strsim::jaro_winkler(&a, &b)
}

fn date_range(record: &DedupRecord) -> Option<(NaiveDate, NaiveDate)> {
    let start = record.starts_on?;
    let end = record.ends_on.unwrap_or(start);
    Some((start.min(end), start.max(end)))
}

/// Inclusive overlap of two date ranges; `None` when either side is undated.
pub fn dates_overlap(a: &DedupRecord, b: &DedupRecord) -> Option<bool> {
    let (a_start, a_end) = date_range(a)?;
    let (b_start, b_end) = date_range(b)?;
    Some(a_start <= b_end && b_start <= a_end)
}

pub struct DedupResolver {
    config: DedupConfig,
}

impl DedupResolver {
    pub fn new(config: DedupConfig) -> Self {
        Self { config }
    }

    /// Existing records that may be the same brand or sale, best match
    /// first. Sales with known dates on both sides must also overlap.
    pub fn find_duplicates(&self, candidate: &DedupRecord, existing: &[DedupRecord]) -> Vec<DuplicateCandidate> {
        let mut found: Vec<DuplicateCandidate> = existing
            .iter()
            .filter(|record| record.id != candidate.id && record.kind == candidate.kind)
            .filter_map(|record| {
                let similarity = name_similarity(&candidate.company_name, &record.company_name);
                if similarity < self.config.similarity_threshold {
                    return None;
                }
                let overlapping_dates = match candidate.kind {
                    RecordKind::Brand => false,
                    RecordKind::Sale => match dates_overlap(candidate, record) {
                        Some(false) => return None,
                        Some(true) => true,
                        None => false,
                    },
                };
                Some(DuplicateCandidate {
                    record_id: record.id.clone(),
                    company_name: record.company_name.clone(),
                    similarity_score: similarity,
                    overlapping_dates,
                })
            })
            .collect();

        found.sort_by(|a, b| {
            b.similarity_score
                .total_cmp(&a.similarity_score)
                .then(b.overlapping_dates.cmp(&a.overlapping_dates))
                .then_with(|| a.record_id.cmp(&b.record_id))
        });

        tracing::debug!(
            "{} duplicate candidates for {:?} among {} records",
            found.len(),
            candidate.company_name,
            existing.len()
        );
        found
    }
}
