//! Size notation scanning.
//!
//! Letter sizes and regional ranges are only read from lines that talk
//! about sizing, since a bare `S` or "US 2-5" is too common elsewhere.
//! Numeric ranges carry their own "size" keyword.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

use crate::model::Provenance;

use super::category::CategoryResolution;
use super::Evidence;

const LETTER: &str = r"(?:XXXL|XXL|XL|XXS|XS|S|M|L|[2-5]XL)";

static LETTER_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\b({LETTER})\s?(?:-|–|to)\s?({LETTER})\b")).expect("static regex")
});

static LETTER_SINGLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"\b({LETTER})\b")).expect("static regex"));

static EXTENDED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([1-5])X\b").expect("static regex"));

static NUMERIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bsizes?\s*:?\s*(\d{1,2})\s?(?:-|–|to)\s?(\d{1,2})\b").expect("static regex")
});

static REGIONAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(US|UK|EU|IT|FR|AU|JP)\s?(\d{1,2})\s?(?:-|–|to)\s?(?:US|UK|EU|IT|FR|AU|JP)?\s?(\d{1,2})\b",
    )
    .expect("static regex")
});

static PLUS_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:plus[- ]size|extended siz|curve collection|inclusive siz)").expect("static regex")
});

fn letter_rank(size: &str) -> Option<usize> {
    Some(match size {
        "XXS" => 0,
        "XS" => 1,
        "S" => 2,
        "M" => 3,
        "L" => 4,
        "XL" => 5,
        "XXL" | "2XL" => 6,
        "XXXL" | "3XL" => 7,
        "4XL" => 8,
        "5XL" => 9,
        _ => return None,
    })
}

const LETTER_LABELS: [&str; 10] = ["XXS", "XS", "S", "M", "L", "XL", "XXL", "XXXL", "4XL", "5XL"];

fn range_label(low: usize, high: usize, labels: impl Fn(usize) -> String) -> String {
    if low == high {
        labels(low)
    } else {
        format!("{}-{}", labels(low), labels(high))
    }
}

/// Size label found in the first `line_budget` lines of `text`, with
/// notations joined by ", ".
pub fn scan_sizes(text: &str, line_budget: usize) -> Option<String> {
    let mut letters: BTreeSet<usize> = BTreeSet::new();
    let mut extended: BTreeSet<usize> = BTreeSet::new();
    let mut numeric: Option<(u32, u32)> = None;
    let mut regional: Vec<String> = Vec::new();
    let mut plus_marker = false;

    for line in text.lines().take(line_budget) {
        let lower = line.to_lowercase();
        let sizing_line = lower.contains("size") || lower.contains("fit");

        if sizing_line {
            for caps in LETTER_RANGE.captures_iter(line) {
                let low = caps.get(1).and_then(|m| letter_rank(m.as_str()));
                let high = caps.get(2).and_then(|m| letter_rank(m.as_str()));
                if let (Some(low), Some(high)) = (low, high) {
                    letters.extend(low.min(high)..=low.max(high));
                }
            }
            letters.extend(
                LETTER_SINGLE
                    .captures_iter(line)
                    .filter_map(|c| c.get(1).and_then(|m| letter_rank(m.as_str()))),
            );
            extended.extend(
                EXTENDED
                    .captures_iter(line)
                    .filter_map(|c| c.get(1)?.as_str().parse::<usize>().ok()),
            );
        }

        for caps in NUMERIC.captures_iter(line) {
            let low = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok());
            let high = caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok());
            if let (Some(low), Some(high)) = (low, high) {
                if low < high {
                    numeric = Some(match numeric {
                        Some((l, h)) => (l.min(low), h.max(high)),
                        None => (low, high),
                    });
                }
            }
        }

        for caps in REGIONAL.captures_iter(line).filter(|_| sizing_line) {
            let (Some(system), Some(low), Some(high)) = (caps.get(1), caps.get(2), caps.get(3)) else {
                continue;
            };
            let label = format!("{} {}-{}", system.as_str(), low.as_str(), high.as_str());
            if !regional.contains(&label) {
                regional.push(label);
            }
        }

        plus_marker |= PLUS_MARKER.is_match(line);
    }

    let mut parts: Vec<String> = Vec::new();
    if let (Some(low), Some(high)) = (letters.first(), letters.last()) {
        parts.push(range_label(*low, *high, |i| LETTER_LABELS[i].to_string()));
    }
    if let (Some(low), Some(high)) = (extended.first(), extended.last()) {
        parts.push(range_label(*low, *high, |i| format!("{i}X")));
    }
    if let Some((low, high)) = numeric {
        parts.push(format!("{low}-{high}"));
    }
    parts.extend(regional);
    if plus_marker && extended.is_empty() {
        parts.push("extended sizes".to_string());
    }

    (!parts.is_empty()).then(|| parts.join(", "))
}

#[derive(Debug, Clone, PartialEq)]
pub struct SizeResolution {
    pub label: Option<String>,
    pub provenance: Provenance,
}

/// `None` when sizing does not apply to the brand's categories; the field
/// is then left out of the completeness map.
pub fn resolve_size(
    evidence: &Evidence,
    categories: &CategoryResolution,
    line_budget: usize,
) -> Option<SizeResolution> {
    if !categories.may_have_sizes() {
        return None;
    }

    if let Some(label) = evidence
        .page_text
        .as_deref()
        .and_then(|text| scan_sizes(text, line_budget))
    {
        return Some(SizeResolution {
            label: Some(label),
            provenance: Provenance::FullPage,
        });
    }

    if let Some(label) = scan_sizes(&evidence.snippet_text(), line_budget) {
        return Some(SizeResolution {
            label: Some(label),
            provenance: Provenance::Snippets,
        });
    }

    Some(SizeResolution {
        label: None,
        provenance: Provenance::None,
    })
}
