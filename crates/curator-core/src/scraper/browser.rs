use super::{BrowserAutomation, BrowserTab, ClickMatcher, NavigationError, PageSnapshot};
use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

const CLICKABLE: &str =
    r#"button, a, [role="button"], input[type="submit"], input[type="button"]"#;
const DIALOG: &str = r#"[role="dialog"], [role="alertdialog"], dialog, [aria-modal="true"]"#;

/// A guard that ensures the page is closed when dropped.
struct PageGuard {
    page: Page,
}

impl PageGuard {
    fn new(page: Page) -> Self {
        Self { page }
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        let page = self.page.clone();
        tokio::spawn(async move {
            if let Err(e) = page.close().await {
                debug!("Failed to close page in Drop: {}", e);
            }
        });
    }
}

impl std::ops::Deref for PageGuard {
    type Target = Page;

    fn deref(&self) -> &Self::Target {
        &self.page
    }
}

/// Headless Chromium behind the [`BrowserAutomation`] capability.
#[derive(Clone)]
pub struct ChromiumBrowser {
    browser: Arc<Browser>,
    _handle: Arc<JoinHandle<()>>,
}

impl ChromiumBrowser {
    pub async fn launch(proxy_url: Option<String>) -> anyhow::Result<Self> {
        let mut builder = BrowserConfig::builder();
        if let Some(proxy) = proxy_url {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }
        let (browser, mut handler) =
            Browser::launch(builder.build().map_err(|e| anyhow::anyhow!(e))?).await?;

        let handle = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    debug!("Browser handler error: {:?}", h);
                    break;
                }
            }
        });

        Ok(Self {
            browser: Arc::new(browser),
            _handle: Arc::new(handle),
        })
    }
}

#[async_trait]
impl BrowserAutomation for ChromiumBrowser {
    async fn open_tab(&self) -> anyhow::Result<Box<dyn BrowserTab>> {
        let page = self.browser.new_page("about:blank").await?;
        Ok(Box::new(ChromiumTab {
            page: PageGuard::new(page),
        }))
    }
}

struct ChromiumTab {
    page: PageGuard,
}

impl ChromiumTab {
    async fn read_snapshot(&self) -> anyhow::Result<PageSnapshot> {
        let final_url = self.page.url().await?.unwrap_or_default();
        let html = self.page.content().await?;
        let text: String = self
            .page
            .evaluate("document.body ? document.body.innerText : ''")
            .await?
            .into_value()?;

        Ok(PageSnapshot {
            final_url,
            html,
            text,
        })
    }
}

/// Script that clicks the first control matching `matcher`, returning a bool.
fn click_script(matcher: &ClickMatcher) -> anyhow::Result<String> {
    let script = match matcher {
        ClickMatcher::Text { phrases } => {
            let phrases = serde_json::to_string(
                &phrases.iter().map(|p| p.to_lowercase()).collect::<Vec<_>>(),
            )?;
            format!(
                r#"(() => {{
                    const phrases = {phrases};
                    for (const el of document.querySelectorAll('{CLICKABLE}')) {{
                        const label = (el.innerText || el.value || '').trim().toLowerCase();
                        if (label && phrases.includes(label)) {{ el.click(); return true; }}
                    }}
                    return false;
                }})()"#
            )
        }
        ClickMatcher::WithinDialog => format!(
            r#"(() => {{
                for (const dialog of document.querySelectorAll('{DIALOG}')) {{
                    const el = dialog.querySelector('{CLICKABLE}');
                    if (el) {{ el.click(); return true; }}
                }}
                return false;
            }})()"#
        ),
    };
    Ok(script)
}

#[async_trait]
impl BrowserTab for ChromiumTab {
    async fn navigate(&self, url: &str) -> Result<PageSnapshot, NavigationError> {
        self.page.goto(url).await.map_err(|e| {
            let message = e.to_string();
            if message.to_lowercase().contains("timeout") {
                NavigationError::Timeout
            } else {
                NavigationError::Failed(message)
            }
        })?;

        self.read_snapshot()
            .await
            .map_err(|e| NavigationError::Failed(e.to_string()))
    }

    async fn find_and_click(&self, matcher: &ClickMatcher) -> anyhow::Result<bool> {
        let clicked: bool = self
            .page
            .evaluate(click_script(matcher)?)
            .await?
            .into_value()?;
        Ok(clicked)
    }

    async fn send_cancel_input(&self) -> anyhow::Result<()> {
        self.page.find_element("body").await?.press_key("Escape").await?;
        Ok(())
    }

    async fn snapshot(&self) -> anyhow::Result<PageSnapshot> {
        self.read_snapshot().await
    }
}
