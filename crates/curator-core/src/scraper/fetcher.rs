//! Loads one URL through a [`BrowserAutomation`] tab.
//!
//! Stages run in order: navigate, detect an interstitial, dismiss it, settle,
//! then check reachability and hand back the raw page. The fetcher never
//! interprets page content beyond recognising walls it could not clear.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{BrowserAutomation, BrowserTab, ClickMatcher, NavigationError, PageSnapshot};
use crate::error::FetchError;
use crate::protection::domain_of;

const INTERSTITIAL_MARKERS: &[&str] = &[
    "role=\"dialog\"",
    "aria-modal=\"true\"",
    "cookie consent",
    "accept all cookies",
    "we use cookies",
    "onetrust",
    "sign up for our newsletter",
    "select your country",
    "choose your region",
    "age verification",
];

const WALL_URL_MARKERS: &[&str] = &[
    "/login",
    "/signin",
    "/sign-in",
    "/account/login",
    "/accounts/login",
    "consent.",
    "/challenge",
    "captcha",
    "/blocked",
];

const WALL_PAGE_MARKERS: &[&str] = &[
    "access denied",
    "verify you are human",
    "are you a robot",
    "checking your browser",
    "cf-challenge",
    "px-captcha",
    "captcha-delivery",
    "enable javascript and cookies to continue",
    "request unsuccessful. incapsula",
    "log in to continue",
    "please sign in to continue",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStage {
    Navigate,
    DetectInterstitial,
    Dismiss,
    Settle,
    ExtractRaw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DismissStrategy {
    ContinuationText,
    DialogControl,
    CancelInput,
}

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub snapshot: PageSnapshot,
    pub dismissed_by: Option<DismissStrategy>,
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub navigation_timeout: Duration,
    pub settle_delay: Duration,
    pub continuation_phrases: Vec<String>,
}

pub struct PageFetcher {
    browser: Arc<dyn BrowserAutomation>,
    settings: FetchSettings,
}

impl PageFetcher {
    pub fn new(browser: Arc<dyn BrowserAutomation>, settings: FetchSettings) -> Self {
        Self { browser, settings }
    }

    pub async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let tab = self
            .browser
            .open_tab()
            .await
            .map_err(|e| FetchError::ParseError(format!("could not open tab: {e}")))?;

        debug!(url, stage = ?FetchStage::Navigate, "fetch stage");
        let timeout = self.settings.navigation_timeout;
        let initial = match tokio::time::timeout(timeout, tab.navigate(url)).await {
            Err(_) | Ok(Err(NavigationError::Timeout)) => {
                return Err(FetchError::Timeout {
                    url: url.to_string(),
                    after_ms: timeout.as_millis() as u64,
                })
            }
            Ok(Err(NavigationError::Blocked(marker))) => {
                return Err(FetchError::Blocking {
                    domain: domain_of(url).unwrap_or_default(),
                    marker,
                })
            }
            Ok(Err(NavigationError::Failed(reason))) => return Err(FetchError::ParseError(reason)),
            Ok(Ok(snapshot)) => snapshot,
        };

        debug!(url, stage = ?FetchStage::DetectInterstitial, "fetch stage");
        let dismissed_by = if has_interstitial(&initial) {
            debug!(url, stage = ?FetchStage::Dismiss, "fetch stage");
            self.dismiss(tab.as_ref()).await
        } else {
            None
        };

        debug!(url, stage = ?FetchStage::Settle, "fetch stage");
        if !self.settings.settle_delay.is_zero() {
            tokio::time::sleep(self.settings.settle_delay).await;
        }
        let settled = tab
            .snapshot()
            .await
            .map_err(|e| FetchError::ParseError(format!("could not read page: {e}")))?;

        if let Some(marker) = unreached_wall(&settled) {
            let domain = domain_of(&settled.final_url)
                .or_else(|| domain_of(url))
                .unwrap_or_default();
            warn!(url, domain = %domain, marker, "page blocked");
            return Err(FetchError::Blocking {
                domain,
                marker: marker.to_string(),
            });
        }

        debug!(url, stage = ?FetchStage::ExtractRaw, "fetch stage");
        if settled.is_empty() {
            return Err(FetchError::ParseError("page has no content".to_string()));
        }

        Ok(FetchedPage {
            url: url.to_string(),
            snapshot: settled,
            dismissed_by,
        })
    }

    /// Tries each strategy in order and stops at the first that succeeds.
    async fn dismiss(&self, tab: &dyn BrowserTab) -> Option<DismissStrategy> {
        let by_text = ClickMatcher::Text {
            phrases: self.settings.continuation_phrases.clone(),
        };
        match tab.find_and_click(&by_text).await {
            Ok(true) => return Some(DismissStrategy::ContinuationText),
            Ok(false) => {}
            Err(e) => debug!("continuation click failed: {}", e),
        }

        match tab.find_and_click(&ClickMatcher::WithinDialog).await {
            Ok(true) => return Some(DismissStrategy::DialogControl),
            Ok(false) => {}
            Err(e) => debug!("dialog click failed: {}", e),
        }

        match tab.send_cancel_input().await {
            Ok(()) => Some(DismissStrategy::CancelInput),
            Err(e) => {
                debug!("cancel input failed: {}", e);
                None
            }
        }
    }
}

pub fn has_interstitial(page: &PageSnapshot) -> bool {
    let html = page.html.to_lowercase();
    let text = page.text.to_lowercase();
    INTERSTITIAL_MARKERS
        .iter()
        .any(|m| html.contains(m) || text.contains(m))
}

/// The marker of an authentication, consent or challenge wall still in place.
pub fn unreached_wall(page: &PageSnapshot) -> Option<&'static str> {
    let url = page.final_url.to_lowercase();
    if let Some(marker) = WALL_URL_MARKERS.iter().find(|m| url.contains(*m)) {
        return Some(*marker);
    }
    let html = page.html.to_lowercase();
    let text = page.text.to_lowercase();
    WALL_PAGE_MARKERS
        .iter()
        .find(|m| text.contains(*m) || html.contains(*m))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedTab {
        first: PageSnapshot,
        settled: PageSnapshot,
        text_click: bool,
        dialog_click: bool,
        hang: bool,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl BrowserTab for ScriptedTab {
        async fn navigate(&self, _url: &str) -> Result<PageSnapshot, NavigationError> {
            if self.hang {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Ok(self.first.clone())
        }

        async fn find_and_click(&self, matcher: &ClickMatcher) -> anyhow::Result<bool> {
            let mut calls = self.calls.lock().unwrap();
            match matcher {
                ClickMatcher::Text { .. } => {
                    calls.push("text");
                    Ok(self.text_click)
                }
                ClickMatcher::WithinDialog => {
                    calls.push("dialog");
                    Ok(self.dialog_click)
                }
            }
        }

        async fn send_cancel_input(&self) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push("escape");
            Ok(())
        }

        async fn snapshot(&self) -> anyhow::Result<PageSnapshot> {
            Ok(self.settled.clone())
        }
    }

    struct OneTab(Mutex<Option<ScriptedTab>>);

    #[async_trait]
    impl BrowserAutomation for OneTab {
        async fn open_tab(&self) -> anyhow::Result<Box<dyn BrowserTab>> {
            let tab = self.0.lock().unwrap().take().ok_or_else(|| anyhow::anyhow!("used"))?;
            Ok(Box::new(tab))
        }
    }

    fn fetcher(tab: ScriptedTab) -> PageFetcher {
        PageFetcher::new(
            Arc::new(OneTab(Mutex::new(Some(tab)))),
            FetchSettings {
                navigation_timeout: Duration::from_millis(50),
                settle_delay: Duration::ZERO,
                continuation_phrases: vec!["continue".into()],
            },
        )
    }

    fn page(url: &str, html: &str) -> PageSnapshot {
        PageSnapshot {
            final_url: url.into(),
            html: html.into(),
            text: html.into(),
        }
    }

    #[tokio::test]
    async fn test_dismissal_stops_at_first_success() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let tab = ScriptedTab {
            first: page("https://a.com", r#"<div role="dialog">Join us</div>"#),
            settled: page("https://a.com", "<h1>Dress</h1>"),
            dialog_click: true,
            calls: calls.clone(),
            ..Default::default()
        };
        let fetched = fetcher(tab).fetch("https://a.com").await.unwrap();
        assert_eq!(fetched.dismissed_by, Some(DismissStrategy::DialogControl));
        assert_eq!(*calls.lock().unwrap(), vec!["text", "dialog"]);
    }

    #[tokio::test]
    async fn test_no_interstitial_skips_dismissal() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let tab = ScriptedTab {
            first: page("https://a.com", "<h1>Dress</h1>"),
            settled: page("https://a.com", "<h1>Dress</h1>"),
            calls: calls.clone(),
            ..Default::default()
        };
        let fetched = fetcher(tab).fetch("https://a.com").await.unwrap();
        assert_eq!(fetched.dismissed_by, None);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_login_redirect_is_blocking() {
        let tab = ScriptedTab {
            first: page("https://a.com/p/1", "<h1>Dress</h1>"),
            settled: page("https://shop.a.com/account/login?next=/p/1", "<form></form>"),
            ..Default::default()
        };
        let err = fetcher(tab).fetch("https://a.com/p/1").await.unwrap_err();
        match err {
            FetchError::Blocking { domain, .. } => assert_eq!(domain, "a.com"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_navigation_timeout() {
        let tab = ScriptedTab {
            hang: true,
            ..Default::default()
        };
        let err = fetcher(tab).fetch("https://a.com").await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout { after_ms: 50, .. }));
    }

    #[tokio::test]
    async fn test_empty_page_is_parse_error() {
        let tab = ScriptedTab {
            first: page("https://a.com", "<p>x</p>"),
            settled: page("https://a.com", "  "),
            ..Default::default()
        };
        let err = fetcher(tab).fetch("https://a.com").await.unwrap_err();
        assert!(matches!(err, FetchError::ParseError(_)));
    }

    #[test]
    fn test_wall_markers() {
        assert_eq!(
            unreached_wall(&page("https://a.com", "Please verify you are human")),
            Some("verify you are human")
        );
        assert_eq!(unreached_wall(&page("https://a.com/p", "<h1>Coat</h1>")), None);
    }
}
