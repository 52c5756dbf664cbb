#![allow(dead_code)]

use async_trait::async_trait;
use curator_core::completion::{CompletionProvider, CompletionRequest, CompletionTask};
use curator_core::scraper::{BrowserAutomation, BrowserTab, ClickMatcher, NavigationError, PageSnapshot};
use curator_core::search::SearchProvider;
use curator_core::{CuratorConfig, CuratorService, SearchSnippet};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Clone)]
pub enum Scripted {
    Page(PageSnapshot),
    Timeout,
    Refused(String),
}

/// Browser whose pages are fixed per URL. Every navigation is recorded.
#[derive(Default)]
pub struct StubBrowser {
    pages: Mutex<HashMap<String, Scripted>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    navigations: Arc<Mutex<Vec<String>>>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl StubBrowser {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn page(&self, url: &str, html: &str, text: &str) {
        self.script(
            url,
            Scripted::Page(PageSnapshot {
                final_url: url.to_string(),
                html: html.to_string(),
                text: text.to_string(),
            }),
        );
    }

    pub fn script(&self, url: &str, scripted: Scripted) {
        self.pages.lock().unwrap().insert(url.to_string(), scripted);
    }

    /// Navigation to `url` waits until the returned gate is notified.
    pub fn gate(&self, url: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().unwrap().insert(url.to_string(), gate.clone());
        gate
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    pub fn navigated(&self, url: &str) -> bool {
        self.navigations().iter().any(|u| u == url)
    }

    /// Most navigations that were ever running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserAutomation for StubBrowser {
    async fn open_tab(&self) -> anyhow::Result<Box<dyn BrowserTab>> {
        let pages = self.pages.lock().unwrap().clone();
        let gates = self.gates.lock().unwrap().clone();
        Ok(Box::new(StubTab {
            pages,
            gates,
            log: self.navigations.clone(),
            in_flight: self.in_flight.clone(),
            peak: self.peak.clone(),
            current: Mutex::new(None),
        }))
    }
}

struct StubTab {
    pages: HashMap<String, Scripted>,
    gates: HashMap<String, Arc<Notify>>,
    log: Arc<Mutex<Vec<String>>>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    current: Mutex<Option<PageSnapshot>>,
}

#[async_trait]
impl BrowserTab for StubTab {
    async fn navigate(&self, url: &str) -> Result<PageSnapshot, NavigationError> {
        self.log.lock().unwrap().push(url.to_string());
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        if let Some(gate) = self.gates.get(url) {
            gate.notified().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match self.pages.get(url).cloned() {
            Some(Scripted::Page(page)) => {
                *self.current.lock().unwrap() = Some(page.clone());
                Ok(page)
            }
            Some(Scripted::Timeout) => Err(NavigationError::Timeout),
            Some(Scripted::Refused(reason)) => Err(NavigationError::Blocked(reason)),
            None => Err(NavigationError::Failed(format!("no page scripted for {url}"))),
        }
    }

    async fn find_and_click(&self, _matcher: &ClickMatcher) -> anyhow::Result<bool> {
        Ok(false)
    }

    async fn send_cancel_input(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn snapshot(&self) -> anyhow::Result<PageSnapshot> {
        self.current
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("nothing loaded"))
    }
}

/// Search results keyed by a substring of the query.
#[derive(Default)]
pub struct StubSearch {
    results: Mutex<Vec<(String, Vec<SearchSnippet>)>>,
    pub calls: AtomicUsize,
}

impl StubSearch {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, query_part: &str, snippets: Vec<SearchSnippet>) {
        self.results.lock().unwrap().push((query_part.to_string(), snippets));
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchProvider for StubSearch {
    async fn search(&self, query: &str) -> anyhow::Result<Vec<SearchSnippet>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let results = self.results.lock().unwrap();
        Ok(results
            .iter()
            .find(|(part, _)| query.contains(part.as_str()))
            .map(|(_, snippets)| snippets.clone())
            .unwrap_or_default())
    }
}

/// Completion replies fixed per task; a missing reply is a failure.
#[derive(Default)]
pub struct StubCompletion {
    extract_reply: Option<Value>,
    estimate_reply: Option<Value>,
    pub extract_calls: AtomicUsize,
    pub estimate_calls: AtomicUsize,
}

impl StubCompletion {
    pub fn new(extract_reply: Option<Value>, estimate_reply: Option<Value>) -> Arc<Self> {
        Arc::new(Self {
            extract_reply,
            estimate_reply,
            ..Default::default()
        })
    }

    pub fn estimates(&self) -> usize {
        self.estimate_calls.load(Ordering::SeqCst)
    }

    pub fn extractions(&self) -> usize {
        self.extract_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionProvider for StubCompletion {
    async fn extract_or_estimate(&self, request: &CompletionRequest) -> anyhow::Result<Value> {
        let reply = match request.task {
            CompletionTask::ExtractProducts => {
                self.extract_calls.fetch_add(1, Ordering::SeqCst);
                &self.extract_reply
            }
            CompletionTask::EstimatePriceRange => {
                self.estimate_calls.fetch_add(1, Ordering::SeqCst);
                &self.estimate_reply
            }
        };
        reply.clone().ok_or_else(|| anyhow::anyhow!("stub has no reply"))
    }
}

pub fn snippet(title: &str, body: &str, url: &str) -> SearchSnippet {
    SearchSnippet {
        title: title.to_string(),
        snippet: body.to_string(),
        url: url.to_string(),
    }
}

/// A product page carrying schema.org markup.
pub fn product_html(name: &str, price: f64) -> String {
    format!(
        r#"<html><head><script type="application/ld+json">
        {{"@context":"https://schema.org","@type":"Product","name":"{name}",
          "offers":{{"@type":"Offer","price":"{price}","priceCurrency":"USD"}}}}
        </script></head><body><h1>{name}</h1></body></html>"#
    )
}

pub fn test_config(pool: usize) -> CuratorConfig {
    CuratorConfig {
        worker_pool_size: pool,
        navigation_timeout_ms: 2_000,
        settle_delay_ms: 0,
        ..Default::default()
    }
}

pub fn service(
    config: CuratorConfig,
    browser: Option<Arc<StubBrowser>>,
    search: Arc<StubSearch>,
    completion: Arc<dyn CompletionProvider>,
) -> CuratorService {
    let browser = browser.map(|b| b as Arc<dyn BrowserAutomation>);
    CuratorService::new(config, browser, search, completion).unwrap()
}
