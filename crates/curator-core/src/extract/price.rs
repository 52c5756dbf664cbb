//! Price expressions and the validation band of each extraction tier.

use regex::Regex;
use std::sync::LazyLock;

const NUM: &str = r"(\d{1,3}(?:,\d{3})+|\d+)(?:\.(\d{1,2}))?";

static LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?:US)?\$\s?{NUM}")).expect("static regex"));

static RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)(?:US)?\$\s?{NUM}\s?(?:-|–|—|to)\s?(?:US)?\$?\s?{NUM}"
    ))
    .expect("static regex")
});

static FROM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?:from|starting at|starts at|as low as)\s+(?:US)?\$\s?{NUM}"
    ))
    .expect("static regex")
});

static APPROXIMATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)(?:~|≈|\bapprox\.?|\bapproximately|\baround|\babout|\broughly|\best\.?|\bestimated)\s*(?:US)?\$\s?{NUM}"
    ))
    .expect("static regex")
});

static WAS_NOW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?:was|reg\.?|regular|originally)\s*:?\s*(?:US)?\$\s?{NUM}.{{0,24}}?\b(?:now|sale)\s*:?\s*(?:US)?\$\s?{NUM}"
    ))
    .expect("static regex")
});

/// Fallback tiers in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExtractionTier {
    Pattern,
    SecondQuery,
    Assisted,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationBand {
    pub min: f64,
    pub max: f64,
}

impl ValidationBand {
    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }
}

impl ExtractionTier {
    /// Bands only ever widen from one tier to the next.
    pub fn band(&self) -> ValidationBand {
        match self {
            ExtractionTier::Pattern => ValidationBand { min: 10.0, max: 5_000.0 },
            ExtractionTier::SecondQuery => ValidationBand { min: 5.0, max: 10_000.0 },
            ExtractionTier::Assisted => ValidationBand { min: 1.0, max: 50_000.0 },
        }
    }

    pub fn accepts_approximate(&self) -> bool {
        *self == ExtractionTier::Assisted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceKind {
    Literal,
    Range,
    From,
    Approximate,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceExpr {
    pub value: f64,
    pub low: f64,
    pub high: f64,
    pub kind: PriceKind,
}

fn number(whole: Option<regex::Match<'_>>, cents: Option<regex::Match<'_>>) -> Option<f64> {
    let whole = whole?.as_str().replace(',', "");
    let value = match cents {
        Some(c) => format!("{whole}.{}", c.as_str()),
        None => whole,
    };
    value.parse().ok()
}

/// First price expression in `text` that the tier accepts.
///
/// Ranges are preferred over "from" prices, which are preferred over plain
/// literals. Hedged amounts ("~$40", "around $40") only count at the
/// assisted tier.
pub fn parse_price_expr(text: &str, tier: ExtractionTier) -> Option<PriceExpr> {
    let band = tier.band();

    let hedged: Vec<(usize, usize)> = APPROXIMATE
        .find_iter(text)
        .map(|m| (m.start(), m.end()))
        .collect();
    let in_hedge = |pos: usize| hedged.iter().any(|(s, e)| pos >= *s && pos < *e);

    for caps in RANGE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        if in_hedge(whole.start()) && !tier.accepts_approximate() {
            continue;
        }
        let (Some(low), Some(high)) = (number(caps.get(1), caps.get(2)), number(caps.get(3), caps.get(4)))
        else {
            continue;
        };
        if high > low && band.contains(low) && band.contains(high) {
            return Some(PriceExpr {
                value: (low + high) / 2.0,
                low,
                high,
                kind: PriceKind::Range,
            });
        }
    }

    for caps in FROM.captures_iter(text) {
        if let Some(value) = number(caps.get(1), caps.get(2)).filter(|v| band.contains(*v)) {
            return Some(PriceExpr {
                value,
                low: value,
                high: value,
                kind: PriceKind::From,
            });
        }
    }

    for caps in LITERAL.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let hedged_here = in_hedge(whole.start());
        if hedged_here && !tier.accepts_approximate() {
            continue;
        }
        if let Some(value) = number(caps.get(1), caps.get(2)).filter(|v| band.contains(*v)) {
            return Some(PriceExpr {
                value,
                low: value,
                high: value,
                kind: if hedged_here {
                    PriceKind::Approximate
                } else {
                    PriceKind::Literal
                },
            });
        }
    }

    None
}

/// `(price, original_price)` from "was $X now $Y" wording or two adjacent
/// literal prices where the second is lower.
pub fn parse_sale_pair(text: &str, tier: ExtractionTier) -> Option<(f64, f64)> {
    let band = tier.band();

    if let Some(caps) = WAS_NOW.captures(text) {
        let was = number(caps.get(1), caps.get(2));
        let now = number(caps.get(3), caps.get(4));
        if let (Some(was), Some(now)) = (was, now) {
            if was > now && band.contains(was) && band.contains(now) {
                return Some((now, was));
            }
        }
    }

    if RANGE.is_match(text) {
        return None;
    }
    let literals: Vec<(usize, usize, f64)> = LITERAL
        .captures_iter(text)
        .filter_map(|c| {
            let whole = c.get(0)?;
            Some((whole.start(), whole.end(), number(c.get(1), c.get(2))?))
        })
        .collect();
    literals.windows(2).find_map(|pair| {
        let ((_, first_end, first), (second_start, _, second)) = (pair[0], pair[1]);
        let adjacent = is_pair_gap(&text[first_end..second_start]);
        (adjacent && first > second && band.contains(first) && band.contains(second)).then_some((second, first))
    })
}

/// Only whitespace and list-price separators may sit between a list price
/// and its sale price.
fn is_pair_gap(gap: &str) -> bool {
    gap.chars().count() <= MAX_PAIR_GAP
        && gap
            .chars()
            .all(|c| c.is_whitespace() || matches!(c, '|' | '/' | '·' | '•' | '→' | '>' | ','))
}

const MAX_PAIR_GAP: usize = 6;

/// Number of price-looking tokens, used to spot listing pages.
pub fn count_prices(text: &str) -> usize {
    LITERAL.find_iter(text).count()
}

pub fn strip_prices(text: &str) -> String {
    LITERAL.replace_all(text, " ").into_owned()
}
