//! Brand-level resolvers.
//!
//! Each resolver is a plain function over the same [`Evidence`] value and
//! applies its own fallback policy. None of them performs I/O; the price
//! resolver reports when an estimate is needed and the caller fetches it.

pub mod category;
pub mod price;
pub mod size;

use crate::model::{Product, SearchSnippet};

/// Everything gathered for one brand before resolution.
#[derive(Debug, Clone, Default)]
pub struct Evidence {
    pub brand: String,
    pub domain: Option<String>,
    pub products: Vec<Product>,
    pub snippets: Vec<SearchSnippet>,
    /// Visible text of the brand's own site when it could be fetched.
    pub page_text: Option<String>,
}

impl Evidence {
    pub fn new(brand: impl Into<String>) -> Self {
        Self {
            brand: brand.into(),
            ..Default::default()
        }
    }

    pub fn observed_prices(&self) -> Vec<f64> {
        self.products
            .iter()
            .filter(|p| p.has_observed_price())
            .filter_map(|p| p.price)
            .collect()
    }

    /// Titles and snippet bodies, one per line.
    pub fn snippet_text(&self) -> String {
        self.snippets
            .iter()
            .flat_map(|s| [s.title.as_str(), s.snippet.as_str()])
            .filter(|line| !line.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
