pub mod page;
pub mod price;

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::completion::{normalize_products, CompletionProvider, CompletionRequest, CompletionTask};
use crate::error::FailureKind;
use crate::model::{Product, SearchSnippet};
use crate::protection::domain_of;
use crate::scraper::PageSnapshot;
use crate::search::SearchProvider;
use price::{parse_price_expr, parse_sale_pair, strip_prices, ExtractionTier, PriceKind};

const TITLE_PRICE_CONFIDENCE: u8 = 70;
const BODY_PRICE_CONFIDENCE: u8 = 60;

/// Search queries used to gather snippets for a brand.
#[derive(Debug, Clone, PartialEq)]
pub struct BrandQueries {
    pub primary: String,
    pub secondary: Option<String>,
}

impl BrandQueries {
    pub fn for_brand(brand: &str) -> Self {
        Self {
            primary: format!("{brand} clothing price"),
            secondary: Some(format!("\"{brand}\" shop new arrivals $")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BrandExtraction {
    pub products: Vec<Product>,
    pub snippets: Vec<SearchSnippet>,
    /// Last tier that ran, `None` when no tier could run at all.
    pub tier: Option<ExtractionTier>,
    pub estimation_failed: bool,
}

/// Products keyed by normalized name and registrable domain.
#[derive(Default)]
struct ProductPool {
    seen: HashSet<(String, String)>,
    products: Vec<Product>,
}

impl ProductPool {
    fn extend(&mut self, products: impl IntoIterator<Item = Product>) {
        for product in products {
            let key = (
                normalize_product_name(&product.name),
                domain_of(&product.url).unwrap_or_default(),
            );
            if !key.0.is_empty() && self.seen.insert(key) {
                self.products.push(product);
            }
        }
    }

    fn len(&self) -> usize {
        self.products.len()
    }
}

pub fn normalize_product_name(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Products found in search snippets at the given tier.
pub fn products_from_snippets(snippets: &[SearchSnippet], tier: ExtractionTier) -> Vec<Product> {
    snippets
        .iter()
        .filter_map(|s| {
            let name = page::clean_name(&strip_prices(&s.title));
            if name.is_empty() || !page::looks_like_name(&name) {
                return None;
            }

            let sale = parse_sale_pair(&s.title, tier).or_else(|| parse_sale_pair(&s.snippet, tier));
            if let Some((price, original)) = sale {
                return Some(
                    Product::snippet(name, &s.url, BODY_PRICE_CONFIDENCE)
                        .with_original_price(original)
                        .with_price(price),
                );
            }

            let (expr, base) = match parse_price_expr(&s.title, tier) {
                Some(expr) => (expr, TITLE_PRICE_CONFIDENCE),
                None => (parse_price_expr(&s.snippet, tier)?, BODY_PRICE_CONFIDENCE),
            };
            let confidence = match expr.kind {
                PriceKind::Literal => base,
                PriceKind::From => base - 5,
                PriceKind::Range | PriceKind::Approximate => base - 10,
            };
            Some(Product::snippet(name, &s.url, confidence).with_price(expr.value))
        })
        .collect()
}

fn mentions_brand(snippet: &SearchSnippet, brand: &str) -> bool {
    let brand = normalize_product_name(brand);
    if brand.is_empty() {
        return false;
    }
    let haystack = normalize_product_name(&format!("{} {}", snippet.title, snippet.snippet));
    let compact_brand = brand.replace(' ', "");
    haystack.contains(&brand)
        || domain_of(&snippet.url)
            .map(|d| d.replace('-', "").contains(&compact_brand))
            .unwrap_or(false)
}

fn evidence_context(snippets: &[SearchSnippet], page_text: Option<&str>) -> String {
    let mut context = String::new();
    for s in snippets {
        context.push_str(&format!("{}\n{}\n{}\n\n", s.title, s.snippet, s.url));
    }
    if let Some(text) = page_text {
        context.push_str(text);
    }
    context
}

pub struct ProductExtractor {
    search: Arc<dyn SearchProvider>,
    completion: Arc<dyn CompletionProvider>,
    min_products: usize,
}

impl ProductExtractor {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        completion: Arc<dyn CompletionProvider>,
        min_products: usize,
    ) -> Self {
        Self {
            search,
            completion,
            min_products,
        }
    }

    /// Products from one fetched product page. Falls back to the assisted
    /// tier when the page has no recognisable product markup.
    pub async fn extract_page(&self, url: &str, page: &PageSnapshot) -> Result<Vec<Product>, FailureKind> {
        let products = page::extract_from_page(url, page);
        if !products.is_empty() {
            return Ok(products);
        }
        if !self.completion.is_enabled() {
            return Err(FailureKind::ParseError);
        }

        debug!("No deterministic products on {}, trying assisted extraction", url);
        let request = CompletionRequest::new(
            CompletionTask::ExtractProducts,
            "",
            domain_of(url).as_deref(),
            &page.text,
        );
        match self.completion.extract_or_estimate(&request).await {
            Ok(reply) => {
                let products = normalize_products(&reply, url);
                if products.is_empty() {
                    Err(FailureKind::ParseError)
                } else {
                    Ok(products)
                }
            }
            Err(e) => {
                warn!("Assisted extraction failed for {}: {}", url, e);
                Err(FailureKind::EstimationFailure)
            }
        }
    }

    /// Runs the tiers for a brand until the pool reaches the minimum yield.
    ///
    /// `page` is the brand's own site when it could be fetched; `snippets`
    /// are the results of the primary query.
    pub async fn extract_brand(
        &self,
        brand: &str,
        domain: Option<&str>,
        page: Option<&PageSnapshot>,
        snippets: Vec<SearchSnippet>,
        queries: &BrandQueries,
    ) -> BrandExtraction {
        let mut pool = ProductPool::default();
        let mut snippets: Vec<SearchSnippet> = snippets
            .into_iter()
            .filter(|s| mentions_brand(s, brand))
            .collect();

        if let Some(page) = page {
            let site_url = if page.final_url.is_empty() {
                domain.map(|d| format!("https://{d}")).unwrap_or_default()
            } else {
                page.final_url.clone()
            };
            pool.extend(page::extract_from_page(&site_url, page));
        }
        pool.extend(products_from_snippets(&snippets, ExtractionTier::Pattern));
        let mut tier = ExtractionTier::Pattern;
        debug!(brand, yield_count = pool.len(), "pattern tier done");

        if pool.len() < self.min_products {
            if let Some(query) = &queries.secondary {
                tier = ExtractionTier::SecondQuery;
                match self.search.search(query).await {
                    Ok(more) => {
                        let known: HashSet<String> = snippets.iter().map(|s| s.url.clone()).collect();
                        let fresh: Vec<SearchSnippet> = more
                            .into_iter()
                            .filter(|s| !known.contains(&s.url) && mentions_brand(s, brand))
                            .collect();
                        pool.extend(products_from_snippets(&fresh, ExtractionTier::SecondQuery));
                        snippets.extend(fresh);
                    }
                    Err(e) => warn!("Secondary search failed for {}: {}", brand, e),
                }
                debug!(brand, yield_count = pool.len(), "second query tier done");
            }
        }

        let mut estimation_failed = false;
        if pool.len() < self.min_products && self.completion.is_enabled() {
            tier = ExtractionTier::Assisted;
            let context = evidence_context(&snippets, page.map(|p| p.text.as_str()));
            let request = CompletionRequest::new(CompletionTask::ExtractProducts, brand, domain, &context);
            let fallback_url = domain.map(|d| format!("https://{d}")).unwrap_or_default();
            match self.completion.extract_or_estimate(&request).await {
                Ok(reply) => pool.extend(normalize_products(&reply, &fallback_url)),
                Err(e) => {
                    warn!("Assisted extraction failed for {}: {}", brand, e);
                    estimation_failed = true;
                }
            }
            debug!(brand, yield_count = pool.len(), "assisted tier done");
        }

        info!(brand, products = pool.len(), tier = ?tier, "brand extraction finished");
        BrandExtraction {
            products: pool.products,
            snippets,
            tier: Some(tier),
            estimation_failed,
        }
    }
}
