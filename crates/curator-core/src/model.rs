use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::FailureKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionMethod {
    Direct,
    Snippet,
    AiEstimate,
    Manual,
}

/// Tier attached to AI-derived prices, kept apart from the numeric confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceConfidence {
    Low,
    Medium,
    High,
}

impl PriceConfidence {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" => Some(PriceConfidence::High),
            "medium" | "med" => Some(PriceConfidence::Medium),
            "low" => Some(PriceConfidence::Low),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub name: String,
    pub url: String,
    pub image_url: Option<String>,
    pub price: Option<f64>,
    pub original_price: Option<f64>,
    pub percent_off: Option<u8>,
    pub confidence: u8,
    pub extraction_method: ExtractionMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_confidence: Option<PriceConfidence>,
}

impl Product {
    fn base(name: String, url: String, method: ExtractionMethod, confidence: u8) -> Self {
        Self {
            name,
            url,
            image_url: None,
            price: None,
            original_price: None,
            percent_off: None,
            confidence: confidence.min(100),
            extraction_method: method,
            price_confidence: None,
        }
    }

    pub fn direct(name: impl Into<String>, url: impl Into<String>, confidence: u8) -> Self {
        Self::base(name.into(), url.into(), ExtractionMethod::Direct, confidence)
    }

    pub fn snippet(name: impl Into<String>, url: impl Into<String>, confidence: u8) -> Self {
        Self::base(name.into(), url.into(), ExtractionMethod::Snippet, confidence)
    }

    pub fn ai_estimate(
        name: impl Into<String>,
        url: impl Into<String>,
        price_confidence: PriceConfidence,
    ) -> Self {
        let confidence = match price_confidence {
            PriceConfidence::High => 60,
            PriceConfidence::Medium => 45,
            PriceConfidence::Low => 30,
        };
        let mut product = Self::base(name.into(), url.into(), ExtractionMethod::AiEstimate, confidence);
        product.price_confidence = Some(price_confidence);
        product
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self.refresh_discount();
        self
    }

    pub fn with_original_price(mut self, original: f64) -> Self {
        self.original_price = Some(original);
        self.refresh_discount();
        self
    }

    pub fn with_image(mut self, image_url: Option<String>) -> Self {
        self.image_url = image_url.filter(|s| !s.trim().is_empty());
        self
    }

    fn refresh_discount(&mut self) {
        self.percent_off = match (self.price, self.original_price) {
            (Some(price), Some(original)) if original > price && price > 0.0 => {
                Some((((original - price) / original) * 100.0).round() as u8)
            }
            _ => None,
        };
    }

    /// Products that may drive price tiering. AI estimates are display-only.
    pub fn has_observed_price(&self) -> bool {
        self.price.is_some() && self.extraction_method != ExtractionMethod::AiEstimate
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PriceBucket {
    #[serde(rename = "$")]
    Budget,
    #[serde(rename = "$$")]
    Moderate,
    #[serde(rename = "$$$")]
    Premium,
    #[serde(rename = "$$$$")]
    Luxury,
}

impl PriceBucket {
    pub fn symbol(&self) -> &'static str {
        match self {
            PriceBucket::Budget => "$",
            PriceBucket::Moderate => "$$",
            PriceBucket::Premium => "$$$",
            PriceBucket::Luxury => "$$$$",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "$" => Some(PriceBucket::Budget),
            "$$" => Some(PriceBucket::Moderate),
            "$$$" => Some(PriceBucket::Premium),
            "$$$$" => Some(PriceBucket::Luxury),
            _ => None,
        }
    }
}

/// How a field's value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    Products,
    LimitedProducts,
    Estimated,
    FullPage,
    Snippets,
    Default,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CompletenessField {
    PriceRange,
    SizeRange,
    Categories,
    Products,
}

pub type Completeness = BTreeMap<CompletenessField, Provenance>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandProfile {
    pub name: String,
    pub domain: Option<String>,
    pub price_range_bucket: Option<PriceBucket>,
    pub median_price: Option<f64>,
    pub size_range_label: Option<String>,
    pub categories: BTreeSet<String>,
    pub quality_score: u8,
    pub data_completeness: Completeness,
    pub products: Vec<Product>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtectionLevel {
    None,
    Low,
    High,
    UltraHigh,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainProtectionProfile {
    pub domain: String,
    pub protection_level: ProtectionLevel,
    /// `None` when the domain has never been observed.
    pub observed_success_rate: Option<f64>,
    /// Operator-facing text only.
    pub recommendation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlStatus {
    Pending,
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReason {
    pub kind: FailureKind,
    pub domain: Option<String>,
    pub message: String,
}

/// One completed URL of a batch, delivered as soon as it resolves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlOutcome {
    pub index: usize,
    pub url: String,
    pub status: UrlStatus,
    pub products: Vec<Product>,
    pub failure: Option<FailureReason>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Brand,
    Sale,
}

/// A brand or sale record as held by the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupRecord {
    pub id: String,
    pub company_name: String,
    pub kind: RecordKind,
    pub starts_on: Option<NaiveDate>,
    pub ends_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateCandidate {
    pub record_id: String,
    pub company_name: String,
    pub similarity_score: f64,
    pub overlapping_dates: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchSnippet {
    pub title: String,
    pub snippet: String,
    pub url: String,
}
