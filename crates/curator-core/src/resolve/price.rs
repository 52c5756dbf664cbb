use crate::completion::{CompletionRequest, CompletionTask, PriceEstimate};
use crate::model::{PriceBucket, Provenance};

use super::Evidence;

/// Upper bounds (exclusive) of the `$`, `$$` and `$$$` buckets.
pub const PRICE_BREAKPOINTS: [f64; 3] = [75.0, 200.0, 500.0];

/// Observed prices needed for the full-confidence tier.
pub const FULL_TIER_MIN_PRODUCTS: usize = 3;

pub fn bucket_for_price(price: f64) -> PriceBucket {
    if price < PRICE_BREAKPOINTS[0] {
        PriceBucket::Budget
    } else if price < PRICE_BREAKPOINTS[1] {
        PriceBucket::Moderate
    } else if price < PRICE_BREAKPOINTS[2] {
        PriceBucket::Premium
    } else {
        PriceBucket::Luxury
    }
}

pub fn median(prices: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = prices.iter().copied().filter(|p| p.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceTier {
    Products,
    LimitedProducts,
    Estimate,
}

impl PriceTier {
    /// The tier depends on nothing but the number of observed prices.
    pub fn for_count(count: usize) -> Self {
        match count {
            0 => PriceTier::Estimate,
            n if n < FULL_TIER_MIN_PRODUCTS => PriceTier::LimitedProducts,
            _ => PriceTier::Products,
        }
    }

    pub fn provenance(&self) -> Provenance {
        match self {
            PriceTier::Products => Provenance::Products,
            PriceTier::LimitedProducts => Provenance::LimitedProducts,
            PriceTier::Estimate => Provenance::Estimated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceResolution {
    pub bucket: Option<PriceBucket>,
    pub median: Option<f64>,
    pub provenance: Provenance,
}

impl PriceResolution {
    /// Tier C outcome. A missing estimate leaves the field empty and
    /// tagged `none`.
    pub fn from_estimate(estimate: Option<PriceEstimate>) -> Self {
        match estimate {
            Some(estimate) => Self {
                bucket: Some(estimate.bucket),
                median: estimate.typical_price,
                provenance: Provenance::Estimated,
            },
            None => Self {
                bucket: None,
                median: None,
                provenance: Provenance::None,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PriceDecision {
    Resolved(PriceResolution),
    NeedsEstimate,
}

pub fn resolve_price(evidence: &Evidence) -> PriceDecision {
    let prices = evidence.observed_prices();
    let tier = PriceTier::for_count(prices.len());
    match (tier, median(&prices)) {
        (PriceTier::Estimate, _) | (_, None) => PriceDecision::NeedsEstimate,
        (tier, Some(median)) => PriceDecision::Resolved(PriceResolution {
            bucket: Some(bucket_for_price(median)),
            median: Some(median),
            provenance: tier.provenance(),
        }),
    }
}

/// Request for Tier C, built from whatever context the brand has.
pub fn estimation_request(evidence: &Evidence, categories: Vec<String>) -> CompletionRequest {
    let mut context = evidence.snippet_text();
    for product in &evidence.products {
        context.push('\n');
        context.push_str(&product.name);
    }
    if let Some(text) = &evidence.page_text {
        context.push('\n');
        context.push_str(text);
    }
    CompletionRequest::new(
        CompletionTask::EstimatePriceRange,
        &evidence.brand,
        evidence.domain.as_deref(),
        &context,
    )
    .with_categories(categories)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PriceConfidence, Product};

    fn evidence_with(prices: &[f64]) -> Evidence {
        let mut evidence = Evidence::new("Tove");
        evidence.products = prices
            .iter()
            .enumerate()
            .map(|(i, p)| Product::direct(format!("Item {i}"), "https://tove-studio.com", 90).with_price(*p))
            .collect();
        evidence
    }

    #[test]
    fn test_tier_by_count() {
        for n in 0..8 {
            let tier = PriceTier::for_count(n);
            let expected = match n {
                0 => PriceTier::Estimate,
                1 | 2 => PriceTier::LimitedProducts,
                _ => PriceTier::Products,
            };
            assert_eq!(tier, expected, "count {n}");
        }
    }

    #[test]
    fn test_full_tier_uses_median() {
        let decision = resolve_price(&evidence_with(&[695.0, 895.0, 1295.0]));
        let PriceDecision::Resolved(resolution) = decision else {
            panic!("expected a resolved price");
        };
        assert_eq!(resolution.median, Some(895.0));
        assert_eq!(resolution.bucket, Some(PriceBucket::Luxury));
        assert_eq!(resolution.provenance, Provenance::Products);
    }

    #[test]
    fn test_limited_tier_same_mapping() {
        let PriceDecision::Resolved(resolution) = resolve_price(&evidence_with(&[120.0, 160.0])) else {
            panic!("expected a resolved price");
        };
        assert_eq!(resolution.median, Some(140.0));
        assert_eq!(resolution.bucket, Some(PriceBucket::Moderate));
        assert_eq!(resolution.provenance, Provenance::LimitedProducts);
    }

    #[test]
    fn test_ai_estimates_do_not_count() {
        let mut evidence = evidence_with(&[]);
        evidence.products.push(
            Product::ai_estimate("Guess", "https://tove-studio.com", PriceConfidence::High).with_price(400.0),
        );
        assert_eq!(resolve_price(&evidence), PriceDecision::NeedsEstimate);
    }

    #[test]
    fn test_breakpoints() {
        assert_eq!(bucket_for_price(40.0), PriceBucket::Budget);
        assert_eq!(bucket_for_price(75.0), PriceBucket::Moderate);
        assert_eq!(bucket_for_price(499.99), PriceBucket::Premium);
        assert_eq!(bucket_for_price(500.0), PriceBucket::Luxury);
    }

    #[test]
    fn test_missing_estimate_is_none() {
        let resolution = PriceResolution::from_estimate(None);
        assert_eq!(resolution.bucket, None);
        assert_eq!(resolution.provenance, Provenance::None);
    }
}
