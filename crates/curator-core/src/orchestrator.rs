//! Batch scraping under a bounded worker pool.
//!
//! URLs are grouped into one lane per host. A lane walks its URLs in order,
//! so a blocking response stops the rest of that host before they start,
//! while the shared semaphore bounds how many fetches run at once across
//! lanes. Outcomes are sent as soon as each URL finishes.
//!
//! A batch on a single host therefore runs one fetch at a time whatever the
//! pool size. Running a host's URLs in parallel would let later URLs start
//! before an earlier one reports a block.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Semaphore};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{CuratorError, FailureKind, FetchError};
use crate::extract::ProductExtractor;
use crate::model::{FailureReason, Product, UrlOutcome, UrlStatus};
use crate::protection::{domain_of, host_of, registrable_domain, ProtectionClassifier};
use crate::scraper::fetcher::PageFetcher;

#[derive(Debug, Clone, Default)]
pub struct BatchRequest {
    pub urls: Vec<String>,
    /// Set once an operator has accepted the risk of heavily protected domains.
    pub confirmed: bool,
}

/// Registrable domains classified as blocking during one batch.
#[derive(Debug, Clone, Default)]
pub struct CircuitBreaker {
    tripped: Arc<Mutex<HashSet<String>>>,
}

impl CircuitBreaker {
    /// Returns `true` if the domain was not tripped before.
    pub fn trip(&self, domain: &str) -> bool {
        match self.tripped.lock() {
            Ok(mut set) => set.insert(domain.to_string()),
            Err(poisoned) => poisoned.into_inner().insert(domain.to_string()),
        }
    }

    pub fn is_tripped(&self, domain: &str) -> bool {
        match self.tripped.lock() {
            Ok(set) => set.contains(domain),
            Err(poisoned) => poisoned.into_inner().contains(domain),
        }
    }

    pub fn domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = match self.tripped.lock() {
            Ok(set) => set.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        };
        domains.sort();
        domains
    }
}

#[derive(Debug, Clone)]
pub struct ScrapeJobEntry {
    pub url: String,
    pub status: UrlStatus,
    pub failure: Option<FailureReason>,
    pub products: Vec<Product>,
}

/// Final state of a batch, in request order.
#[derive(Debug, Clone)]
pub struct ScrapeJob {
    pub id: Uuid,
    pub entries: Vec<ScrapeJobEntry>,
    pub breaker: CircuitBreaker,
}

impl ScrapeJob {
    pub fn count(&self, status: UrlStatus) -> usize {
        self.entries.iter().filter(|e| e.status == status).count()
    }
}

/// Live view of a running batch.
pub struct BatchHandle {
    pub job_id: Uuid,
    urls: Vec<String>,
    rx: mpsc::Receiver<UrlOutcome>,
    breaker: CircuitBreaker,
}

impl BatchHandle {
    /// Next finished URL, or `None` once every lane has stopped.
    pub async fn next(&mut self) -> Option<UrlOutcome> {
        self.rx.recv().await
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn into_stream(self) -> ReceiverStream<UrlOutcome> {
        ReceiverStream::new(self.rx)
    }

    /// Drains the remaining outcomes. URLs that never started stay pending.
    pub async fn collect(mut self) -> ScrapeJob {
        let mut entries: Vec<ScrapeJobEntry> = self
            .urls
            .iter()
            .map(|url| ScrapeJobEntry {
                url: url.clone(),
                status: UrlStatus::Pending,
                failure: None,
                products: Vec::new(),
            })
            .collect();

        while let Some(outcome) = self.rx.recv().await {
            if let Some(entry) = entries.get_mut(outcome.index) {
                entry.status = outcome.status;
                entry.failure = outcome.failure;
                entry.products = outcome.products;
            }
        }

        ScrapeJob {
            id: self.job_id,
            entries,
            breaker: self.breaker,
        }
    }
}

struct LaneContext {
    fetcher: Option<Arc<PageFetcher>>,
    extractor: Arc<ProductExtractor>,
    breaker: CircuitBreaker,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
    tx: mpsc::Sender<UrlOutcome>,
}

impl LaneContext {
    async fn run(&self, lane: Vec<(usize, String, String)>) {
        for (index, url, domain) in lane {
            if self.cancel.is_cancelled() {
                debug!(url = %url, "batch cancelled, lane stops");
                break;
            }

            let outcome = if self.breaker.is_tripped(&domain) {
                skipped(index, &url, &domain)
            } else {
                let permit = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break,
                    permit = self.semaphore.clone().acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };
                if self.breaker.is_tripped(&domain) {
                    skipped(index, &url, &domain)
                } else {
                    let outcome = self.process(index, &url, &domain).await;
                    drop(permit);
                    outcome
                }
            };

            if self.tx.send(outcome).await.is_err() {
                debug!("batch receiver dropped, lane stops");
                break;
            }
        }
    }

    async fn process(&self, index: usize, url: &str, domain: &str) -> UrlOutcome {
        let Some(fetcher) = &self.fetcher else {
            return failed(index, url, FailureKind::ParseError, Some(domain), "browser unavailable".into());
        };

        match fetcher.fetch(url).await {
            Ok(page) => match self.extractor.extract_page(&page.url, &page.snapshot).await {
                Ok(products) => UrlOutcome {
                    index,
                    url: url.to_string(),
                    status: UrlStatus::Success,
                    products,
                    failure: None,
                },
                Err(kind) => failed(index, url, kind, Some(domain), format!("{kind} on {url}")),
            },
            Err(err) => {
                if let FetchError::Blocking { marker, .. } = &err {
                    if self.breaker.trip(domain) {
                        warn!(domain, marker = %marker, "circuit breaker tripped");
                    }
                }
                failed(index, url, err.kind(), Some(domain), err.to_string())
            }
        }
    }
}

fn failed(index: usize, url: &str, kind: FailureKind, domain: Option<&str>, message: String) -> UrlOutcome {
    UrlOutcome {
        index,
        url: url.to_string(),
        status: UrlStatus::Failed,
        products: Vec::new(),
        failure: Some(FailureReason {
            kind,
            domain: domain.map(str::to_string),
            message,
        }),
    }
}

fn skipped(index: usize, url: &str, domain: &str) -> UrlOutcome {
    debug!(url, domain, "skipped by circuit breaker");
    UrlOutcome {
        index,
        url: url.to_string(),
        status: UrlStatus::Skipped,
        products: Vec::new(),
        failure: Some(FailureReason {
            kind: FailureKind::Blocking,
            domain: Some(domain.to_string()),
            message: format!("{domain} blocked earlier in this batch"),
        }),
    }
}

pub struct RetryOrchestrator {
    fetcher: Option<Arc<PageFetcher>>,
    extractor: Arc<ProductExtractor>,
    classifier: Arc<ProtectionClassifier>,
    pool_size: usize,
}

impl RetryOrchestrator {
    pub fn new(
        fetcher: Option<Arc<PageFetcher>>,
        extractor: Arc<ProductExtractor>,
        classifier: Arc<ProtectionClassifier>,
        pool_size: usize,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            classifier,
            pool_size: pool_size.max(1),
        }
    }

    /// Validates the batch and starts it. Only precondition failures are
    /// errors; every per-URL problem arrives as an outcome on the handle.
    pub fn scrape_batch(
        &self,
        request: BatchRequest,
        cancel: CancellationToken,
    ) -> Result<BatchHandle, CuratorError> {
        if request.urls.is_empty() {
            return Err(CuratorError::EmptyBatch);
        }

        let mut lanes: BTreeMap<String, Vec<(usize, String, String)>> = BTreeMap::new();
        let mut needs_confirmation: Vec<String> = Vec::new();
        for (index, url) in request.urls.iter().enumerate() {
            let host = host_of(url)?;
            let domain = domain_of(url).unwrap_or_else(|| registrable_domain(&host));
            let profile = self.classifier.classify(&host);
            if self.classifier.requires_confirmation(&profile) && !needs_confirmation.contains(&profile.domain) {
                needs_confirmation.push(profile.domain);
            }
            lanes.entry(host).or_default().push((index, url.clone(), domain));
        }

        if !needs_confirmation.is_empty() && !request.confirmed {
            return Err(CuratorError::ConfirmationRequired {
                domains: needs_confirmation,
            });
        }

        let job_id = Uuid::now_v7();
        let breaker = CircuitBreaker::default();
        let (tx, rx) = mpsc::channel(request.urls.len());
        let context = Arc::new(LaneContext {
            fetcher: self.fetcher.clone(),
            extractor: self.extractor.clone(),
            breaker: breaker.clone(),
            semaphore: Arc::new(Semaphore::new(self.pool_size)),
            cancel,
            tx,
        });

        info!(
            "Starting batch {} with {} urls across {} hosts",
            job_id,
            request.urls.len(),
            lanes.len()
        );
        for (host, lane) in lanes {
            let context = context.clone();
            tokio::spawn(async move {
                debug!(host = %host, urls = lane.len(), "lane started");
                context.run(lane).await;
            });
        }

        Ok(BatchHandle {
            job_id,
            urls: request.urls,
            rx,
            breaker,
        })
    }
}
