pub mod browser;
pub mod fetcher;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What the page looked like at one point of a fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    pub final_url: String,
    pub html: String,
    pub text: String,
}

impl PageSnapshot {
    pub fn is_empty(&self) -> bool {
        self.html.trim().is_empty() && self.text.trim().is_empty()
    }
}

/// Target of a click during interstitial dismissal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClickMatcher {
    /// Any clickable control whose visible text matches one of the phrases.
    Text { phrases: Vec<String> },
    /// Any clickable control inside an element with dialog semantics.
    WithinDialog,
}

#[derive(Debug, Clone, Error)]
pub enum NavigationError {
    #[error("navigation timed out")]
    Timeout,
    #[error("navigation refused: {0}")]
    Blocked(String),
    #[error("navigation failed: {0}")]
    Failed(String),
}

/// One isolated browsing context, used for a single URL.
#[async_trait]
pub trait BrowserTab: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<PageSnapshot, NavigationError>;
    /// Returns `true` when a matching control was found and clicked.
    async fn find_and_click(&self, matcher: &ClickMatcher) -> anyhow::Result<bool>;
    async fn send_cancel_input(&self) -> anyhow::Result<()>;
    async fn snapshot(&self) -> anyhow::Result<PageSnapshot>;
}

#[async_trait]
pub trait BrowserAutomation: Send + Sync {
    async fn open_tab(&self) -> anyhow::Result<Box<dyn BrowserTab>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_click_matcher_wire_format() {
        let matcher = ClickMatcher::Text {
            phrases: vec!["accept all".into()],
        };
        let json = serde_json::to_value(&matcher).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["phrases"][0], "accept all");

        let dialog = serde_json::to_value(ClickMatcher::WithinDialog).unwrap();
        assert_eq!(dialog["type"], "within_dialog");
    }

    #[test]
    fn test_empty_snapshot() {
        assert!(PageSnapshot::default().is_empty());
        let page = PageSnapshot {
            text: "hello".into(),
            ..Default::default()
        };
        assert!(!page.is_empty());
    }
}
