//! Composite quality score over a brand's completeness map.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::CuratorError;
use crate::model::{Completeness, CompletenessField, PriceBucket, Provenance};

/// How much each provenance tag is worth, as a fraction of the field weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProvenanceFactors {
    pub products: f64,
    pub limited_products: f64,
    pub full_page: f64,
    pub snippets: f64,
    pub estimated: f64,
    pub default: f64,
    pub none: f64,
}

impl Default for ProvenanceFactors {
    fn default() -> Self {
        Self {
            products: 1.0,
            limited_products: 0.7,
            full_page: 1.0,
            snippets: 0.6,
            estimated: 0.35,
            default: 0.15,
            none: 0.0,
        }
    }
}

impl ProvenanceFactors {
    pub fn factor(&self, provenance: Provenance) -> f64 {
        match provenance {
            Provenance::Products => self.products,
            Provenance::LimitedProducts => self.limited_products,
            Provenance::FullPage => self.full_page,
            Provenance::Snippets => self.snippets,
            Provenance::Estimated => self.estimated,
            Provenance::Default => self.default,
            Provenance::None => self.none,
        }
    }

    fn all(&self) -> [(&'static str, f64); 7] {
        [
            ("products", self.products),
            ("limitedProducts", self.limited_products),
            ("fullPage", self.full_page),
            ("snippets", self.snippets),
            ("estimated", self.estimated),
            ("default", self.default),
            ("none", self.none),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScoringWeights {
    pub price_range: f64,
    pub size_range: f64,
    pub categories: f64,
    pub products: f64,
    pub provenance: ProvenanceFactors,
    /// Product count at which the products field earns its full weight.
    pub product_saturation: usize,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            price_range: 35.0,
            size_range: 15.0,
            categories: 20.0,
            products: 30.0,
            provenance: ProvenanceFactors::default(),
            product_saturation: 5,
        }
    }
}

impl ScoringWeights {
    pub fn weight(&self, field: CompletenessField) -> f64 {
        match field {
            CompletenessField::PriceRange => self.price_range,
            CompletenessField::SizeRange => self.size_range,
            CompletenessField::Categories => self.categories,
            CompletenessField::Products => self.products,
        }
    }

    pub fn validate(&self) -> Result<(), CuratorError> {
        let fields = [
            ("priceRange", self.price_range),
            ("sizeRange", self.size_range),
            ("categories", self.categories),
            ("products", self.products),
        ];
        for (name, weight) in fields {
            if !weight.is_finite() || weight < 0.0 {
                return Err(CuratorError::Config(format!(
                    "scoring.{name} must be a non-negative number, got {weight}"
                )));
            }
        }
        if fields.iter().map(|(_, w)| w).sum::<f64>() <= 0.0 {
            return Err(CuratorError::Config("scoring weights must not all be zero".into()));
        }
        for (name, factor) in self.provenance.all() {
            if !(0.0..=1.0).contains(&factor) {
                return Err(CuratorError::Config(format!(
                    "scoring.provenance.{name} must be in [0, 1], got {factor}"
                )));
            }
        }
        if self.product_saturation == 0 {
            return Err(CuratorError::Config("scoring.productSaturation must be at least 1".into()));
        }
        Ok(())
    }
}

/// Field values the score looks at besides their provenance.
#[derive(Debug, Clone, Copy)]
pub struct FieldValues<'a> {
    pub price_range: Option<PriceBucket>,
    pub size_range: Option<&'a str>,
    pub categories: &'a BTreeSet<String>,
    pub product_count: usize,
}

impl FieldValues<'_> {
    fn present(&self, field: CompletenessField) -> bool {
        match field {
            CompletenessField::PriceRange => self.price_range.is_some(),
            CompletenessField::SizeRange => self.size_range.is_some_and(|s| !s.is_empty()),
            CompletenessField::Categories => !self.categories.is_empty(),
            CompletenessField::Products => self.product_count > 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QualityScorer {
    weights: ScoringWeights,
}

impl QualityScorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    /// Weighted share of the attempted fields, 0 to 100. Fields missing from
    /// the map were not applicable and count neither way.
    pub fn score(&self, completeness: &Completeness, values: &FieldValues<'_>) -> u8 {
        let mut earned = 0.0;
        let mut possible = 0.0;

        for (field, provenance) in completeness {
            let weight = self.weights.weight(*field);
            possible += weight;
            if !values.present(*field) {
                continue;
            }
            let mut share = self.weights.provenance.factor(*provenance);
            if *field == CompletenessField::Products {
                let saturation = self.weights.product_saturation.max(1) as f64;
                share *= (values.product_count as f64 / saturation).min(1.0);
            }
            earned += weight * share;
        }

        if possible <= 0.0 {
            return 0;
        }
        (100.0 * earned / possible).round().clamp(0.0, 100.0) as u8
    }
}
