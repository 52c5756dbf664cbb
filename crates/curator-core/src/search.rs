use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::model::SearchSnippet;

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> anyhow::Result<Vec<SearchSnippet>>;
}

/// Provider used when no search backend is configured.
pub struct NoopSearch;

#[async_trait]
impl SearchProvider for NoopSearch {
    async fn search(&self, query: &str) -> anyhow::Result<Vec<SearchSnippet>> {
        tracing::debug!("No search provider configured, skipping query: {}", query);
        Ok(Vec::new())
    }
}

/// JSON search API reached with `GET {endpoint}?q=...&num=...`.
pub struct HttpSearchProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    max_results: usize,
}

impl HttpSearchProvider {
    pub fn new(endpoint: String, api_key: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            endpoint,
            api_key,
            max_results: 10,
        })
    }
}

#[async_trait]
impl SearchProvider for HttpSearchProvider {
    async fn search(&self, query: &str) -> anyhow::Result<Vec<SearchSnippet>> {
        let num = self.max_results.to_string();
        let mut request = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("num", num.as_str())]);

        if let Some(key) = &self.api_key {
            request = request.header("X-API-KEY", key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("search for {:?} failed: {}", query, status);
        }

        let body: Value = response.json().await?;
        let mut snippets = parse_results(&body);
        snippets.truncate(self.max_results);
        Ok(snippets)
    }
}

/// Accepts `results`, `organic` or `items` arrays, or a bare array.
pub fn parse_results(body: &Value) -> Vec<SearchSnippet> {
    let items = ["results", "organic", "items"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_array))
        .or_else(|| body.as_array());

    let Some(items) = items else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let text = |keys: &[&str]| {
                keys.iter()
                    .find_map(|k| item.get(*k).and_then(Value::as_str))
                    .map(|s| s.trim().to_string())
            };
            let url = text(&["url", "link"])?;
            Some(SearchSnippet {
                title: text(&["title"]).unwrap_or_default(),
                snippet: text(&["snippet", "description"]).unwrap_or_default(),
                url,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_organic_results() {
        let body = json!({
            "organic": [
                {"title": "Tove Dresses", "snippet": "From $495", "link": "https://tove-studio.com/dresses"},
                {"title": "No link"}
            ]
        });
        let snippets = parse_results(&body);
        assert_eq!(snippets.len(), 1);
        assert_eq!(snippets[0].url, "https://tove-studio.com/dresses");
        assert_eq!(snippets[0].snippet, "From $495");
    }

    #[test]
    fn test_parse_bare_array() {
        let body = json!([{ "title": "A", "description": "B", "url": "https://a.com" }]);
        let snippets = parse_results(&body);
        assert_eq!(snippets[0].snippet, "B");
    }

    #[test]
    fn test_parse_unknown_shape() {
        assert!(parse_results(&json!({"data": 1})).is_empty());
    }

    #[tokio::test]
    async fn test_noop_search_is_empty() {
        assert!(NoopSearch.search("tove").await.unwrap().is_empty());
    }
}
