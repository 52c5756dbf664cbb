use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::completion::{normalize_price_estimate, CompletionProvider};
use crate::config::CuratorConfig;
use crate::dedup::DedupResolver;
use crate::error::CuratorError;
use crate::extract::{normalize_product_name, BrandQueries, ProductExtractor};
use crate::model::{
    BrandProfile, Completeness, CompletenessField, DedupRecord, DomainProtectionProfile,
    DuplicateCandidate, ExtractionMethod, Product, Provenance, SearchSnippet,
};
use crate::orchestrator::{BatchHandle, BatchRequest, RetryOrchestrator};
use crate::protection::{domain_of, ProtectionClassifier};
use crate::quality::{FieldValues, QualityScorer};
use crate::resolve::category::resolve_categories;
use crate::resolve::price::{estimation_request, resolve_price, PriceDecision, PriceResolution};
use crate::resolve::size::resolve_size;
use crate::resolve::Evidence;
use crate::scraper::browser::ChromiumBrowser;
use crate::scraper::fetcher::{FetchSettings, PageFetcher};
use crate::scraper::{BrowserAutomation, PageSnapshot};
use crate::search::SearchProvider;

/// The four operations offered to the service layer.
pub struct CuratorService {
    config: CuratorConfig,
    search: Arc<dyn SearchProvider>,
    completion: Arc<dyn CompletionProvider>,
    fetcher: Option<Arc<PageFetcher>>,
    extractor: Arc<ProductExtractor>,
    classifier: Arc<ProtectionClassifier>,
    orchestrator: RetryOrchestrator,
    scorer: QualityScorer,
    dedup: DedupResolver,
}

impl CuratorService {
    pub fn new(
        config: CuratorConfig,
        browser: Option<Arc<dyn BrowserAutomation>>,
        search: Arc<dyn SearchProvider>,
        completion: Arc<dyn CompletionProvider>,
    ) -> Result<Self, CuratorError> {
        config.validate()?;

        let fetcher = browser.map(|browser| {
            Arc::new(PageFetcher::new(
                browser,
                FetchSettings {
                    navigation_timeout: Duration::from_millis(config.navigation_timeout_ms),
                    settle_delay: Duration::from_millis(config.settle_delay_ms),
                    continuation_phrases: config.continuation_phrases.clone(),
                },
            ))
        });
        let extractor = Arc::new(ProductExtractor::new(
            search.clone(),
            completion.clone(),
            config.min_products,
        ));
        let classifier = Arc::new(ProtectionClassifier::new(
            config.extra_protection.clone(),
            config.low_success_threshold,
        ));
        let orchestrator = RetryOrchestrator::new(
            fetcher.clone(),
            extractor.clone(),
            classifier.clone(),
            config.worker_pool_size,
        );

        Ok(Self {
            scorer: QualityScorer::new(config.scoring.clone()),
            dedup: DedupResolver::new(config.dedup.clone()),
            config,
            search,
            completion,
            fetcher,
            extractor,
            classifier,
            orchestrator,
        })
    }

    /// Launches Chromium when available. Without a browser, brand resolution
    /// relies on search snippets and batches fail their URLs.
    pub async fn launch(
        config: CuratorConfig,
        proxy_url: Option<String>,
        search: Arc<dyn SearchProvider>,
        completion: Arc<dyn CompletionProvider>,
    ) -> anyhow::Result<Self> {
        let browser: Option<Arc<dyn BrowserAutomation>> = match ChromiumBrowser::launch(proxy_url).await {
            Ok(b) => Some(Arc::new(b)),
            Err(e) => {
                warn!("Failed to launch browser: {}", e);
                None
            }
        };
        Ok(Self::new(config, browser, search, completion)?)
    }

    pub fn config(&self) -> &CuratorConfig {
        &self.config
    }

    pub fn check_protection(&self, url: &str) -> Result<DomainProtectionProfile, CuratorError> {
        self.classifier.classify_url(url)
    }

    pub fn scrape_batch(
        &self,
        request: BatchRequest,
        cancel: CancellationToken,
    ) -> Result<BatchHandle, CuratorError> {
        self.orchestrator.scrape_batch(request, cancel)
    }

    pub fn find_duplicates(&self, candidate: &DedupRecord, existing: &[DedupRecord]) -> Vec<DuplicateCandidate> {
        self.dedup.find_duplicates(candidate, existing)
    }

    pub async fn resolve_brand(&self, name: &str) -> Result<BrandProfile, CuratorError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CuratorError::EmptyBrandName);
        }
        info!("Resolving brand {:?}", name);

        let queries = BrandQueries::for_brand(name);
        let snippets = match self.search.search(&queries.primary).await {
            Ok(snippets) => snippets,
            Err(e) => {
                warn!("Search failed for {:?}: {}", name, e);
                Vec::new()
            }
        };

        let domain = guess_domain(name, &snippets);
        let page = match &domain {
            Some(domain) => self.fetch_brand_site(domain).await,
            None => None,
        };

        let extraction = self
            .extractor
            .extract_brand(name, domain.as_deref(), page.as_ref(), snippets, &queries)
            .await;
        if extraction.estimation_failed {
            debug!("Assisted extraction unavailable for {:?}", name);
        }

        let evidence = Evidence {
            brand: name.to_string(),
            domain,
            products: extraction.products,
            snippets: extraction.snippets,
            page_text: page.map(|p| p.text),
        };

        let categories = resolve_categories(&evidence, &self.config.default_category);
        let price = match resolve_price(&evidence) {
            PriceDecision::Resolved(resolution) => resolution,
            PriceDecision::NeedsEstimate => self.estimate_price(&evidence, &categories.categories).await,
        };
        let size = resolve_size(&evidence, &categories, self.config.size_scan_line_budget);

        let mut completeness = Completeness::new();
        completeness.insert(CompletenessField::PriceRange, price.provenance);
        completeness.insert(CompletenessField::Categories, categories.provenance);
        completeness.insert(
            CompletenessField::Products,
            product_provenance(&evidence.products, self.config.min_products),
        );
        if let Some(size) = &size {
            completeness.insert(CompletenessField::SizeRange, size.provenance);
        }

        let size_range_label = size.and_then(|s| s.label);
        let quality_score = self.scorer.score(
            &completeness,
            &FieldValues {
                price_range: price.bucket,
                size_range: size_range_label.as_deref(),
                categories: &categories.categories,
                product_count: evidence.products.len(),
            },
        );

        info!(
            "Resolved {:?}: price {:?}, {} products, quality {}",
            name,
            price.bucket.map(|b| b.symbol()),
            evidence.products.len(),
            quality_score
        );

        Ok(BrandProfile {
            name: name.to_string(),
            domain: evidence.domain,
            price_range_bucket: price.bucket,
            median_price: price.median,
            size_range_label,
            categories: categories.categories,
            quality_score,
            data_completeness: completeness,
            products: evidence.products,
        })
    }

    async fn fetch_brand_site(&self, domain: &str) -> Option<PageSnapshot> {
        let fetcher = self.fetcher.as_ref()?;
        let profile = self.classifier.classify(domain);
        if self.classifier.requires_confirmation(&profile) {
            info!("Not fetching {} without confirmation: {}", domain, profile.recommendation);
            return None;
        }
        match fetcher.fetch(&format!("https://{domain}")).await {
            Ok(page) => Some(page.snapshot),
            Err(e) => {
                warn!("Could not fetch brand site {}: {}", domain, e);
                None
            }
        }
    }

    async fn estimate_price(
        &self,
        evidence: &Evidence,
        categories: &std::collections::BTreeSet<String>,
    ) -> PriceResolution {
        if !self.completion.is_enabled() {
            return PriceResolution::from_estimate(None);
        }
        let request = estimation_request(evidence, categories.iter().cloned().collect());
        let estimate = match self.completion.extract_or_estimate(&request).await {
            Ok(reply) => normalize_price_estimate(&reply),
            Err(e) => {
                warn!("Price estimation failed for {:?}: {}", evidence.brand, e);
                None
            }
        };
        PriceResolution::from_estimate(estimate)
    }
}

/// The first result domain that looks like it belongs to the brand.
pub fn guess_domain(brand: &str, snippets: &[SearchSnippet]) -> Option<String> {
    let compact: String = normalize_product_name(brand).replace(' ', "");
    if compact.is_empty() {
        return None;
    }
    snippets
        .iter()
        .filter_map(|s| domain_of(&s.url))
        .find(|domain| {
            let label = domain.split('.').next().unwrap_or_default().replace('-', "");
            label.contains(&compact)
        })
}

pub fn product_provenance(products: &[Product], min_products: usize) -> Provenance {
    let observed = products
        .iter()
        .filter(|p| p.extraction_method != ExtractionMethod::AiEstimate)
        .count();
    if observed >= min_products {
        Provenance::Products
    } else if observed > 0 {
        Provenance::LimitedProducts
    } else if !products.is_empty() {
        Provenance::Estimated
    } else {
        Provenance::None
    }
}
