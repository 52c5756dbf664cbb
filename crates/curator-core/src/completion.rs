//! AI-assisted extraction and estimation.
//!
//! Providers return loosely-typed JSON. It is normalized into [`Product`]
//! and [`PriceEstimate`] here and nowhere else.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::extract::price::{parse_price_expr, ExtractionTier};
use crate::model::{PriceBucket, PriceConfidence, Product};
use crate::resolve::price::bucket_for_price;

/// Upper bound on the evidence text handed to a provider.
pub const MAX_CONTEXT_CHARS: usize = 6_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionTask {
    ExtractProducts,
    EstimatePriceRange,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    pub task: CompletionTask,
    pub brand: String,
    pub domain: Option<String>,
    pub categories: Vec<String>,
    pub context: String,
}

impl CompletionRequest {
    pub fn new(task: CompletionTask, brand: &str, domain: Option<&str>, context: &str) -> Self {
        Self {
            task,
            brand: brand.to_string(),
            domain: domain.map(str::to_string),
            categories: Vec::new(),
            context: context.chars().take(MAX_CONTEXT_CHARS).collect(),
        }
    }

    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn extract_or_estimate(&self, request: &CompletionRequest) -> anyhow::Result<Value>;

    fn is_enabled(&self) -> bool {
        true
    }
}

pub struct NoopCompletion;

#[async_trait]
impl CompletionProvider for NoopCompletion {
    async fn extract_or_estimate(&self, request: &CompletionRequest) -> anyhow::Result<Value> {
        tracing::info!("No completion provider configured (task {:?})", request.task);
        anyhow::bail!("no completion provider configured")
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// OpenAI-compatible chat completions endpoint in JSON response mode.
pub struct HttpCompletionProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl HttpCompletionProvider {
    pub fn new(endpoint: String, api_key: String, model: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            endpoint,
            api_key,
            model,
        })
    }

    fn system_prompt(task: CompletionTask) -> &'static str {
        match task {
            CompletionTask::ExtractProducts => {
                "You extract fashion products from web evidence. Reply with JSON \
                 {\"products\":[{\"name\":string,\"price\":number|string,\"originalPrice\":number|null,\
                 \"url\":string|null,\"imageUrl\":string|null,\"priceConfidence\":\"high\"|\"medium\"|\"low\"}]}. \
                 Approximate prices are allowed but must be marked low or medium confidence."
            }
            CompletionTask::EstimatePriceRange => {
                "You estimate a fashion brand's typical item price. Reply with JSON \
                 {\"priceRange\":\"$\"|\"$$\"|\"$$$\"|\"$$$$\",\"typicalPrice\":number|null,\
                 \"confidence\":\"high\"|\"medium\"|\"low\"}."
            }
        }
    }
}

#[async_trait]
impl CompletionProvider for HttpCompletionProvider {
    async fn extract_or_estimate(&self, request: &CompletionRequest) -> anyhow::Result<Value> {
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": Self::system_prompt(request.task) },
                { "role": "user", "content": serde_json::to_string(request)? },
            ],
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("completion request failed: {}", status);
        }

        let reply: Value = response.json().await?;
        let content = reply
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("completion reply has no message content"))?;
        Ok(serde_json::from_str(content)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceEstimate {
    pub bucket: PriceBucket,
    pub typical_price: Option<f64>,
    pub confidence: PriceConfidence,
}

fn loose_price(value: Option<&Value>) -> Option<f64> {
    let band = ExtractionTier::Assisted.band();
    let price = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s
            .replace(',', "")
            .trim()
            .parse::<f64>()
            .ok()
            .or_else(|| parse_price_expr(s, ExtractionTier::Assisted).map(|e| e.value)),
        _ => None,
    }?;
    band.contains(price).then_some(price)
}

fn text_field<'a>(item: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| item.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn confidence_field(item: &Value) -> Option<PriceConfidence> {
    text_field(item, &["priceConfidence", "confidence"]).and_then(PriceConfidence::parse)
}

/// Products from an extraction reply. Items without a name or a usable
/// price are dropped.
pub fn normalize_products(value: &Value, fallback_url: &str) -> Vec<Product> {
    let items = value
        .get("products")
        .and_then(Value::as_array)
        .or_else(|| value.as_array());
    let Some(items) = items else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let name = text_field(item, &["name", "title"])?;
            let price = loose_price(item.get("price"))?;
            let hedged = item.get("approximate").and_then(Value::as_bool).unwrap_or(false);
            let tier = confidence_field(item).unwrap_or(if hedged {
                PriceConfidence::Low
            } else {
                PriceConfidence::Medium
            });
            let url = text_field(item, &["url", "link"]).unwrap_or(fallback_url);

            let mut product = Product::ai_estimate(name, url, tier)
                .with_image(text_field(item, &["imageUrl", "image"]).map(str::to_string));
            if let Some(original) = loose_price(item.get("originalPrice")) {
                product = product.with_original_price(original);
            }
            Some(product.with_price(price))
        })
        .collect()
}

/// A price estimate from an estimation reply, if it names a bucket or a
/// price that maps to one.
pub fn normalize_price_estimate(value: &Value) -> Option<PriceEstimate> {
    let typical = loose_price(value.get("typicalPrice"))
        .or_else(|| loose_price(value.get("medianPrice")))
        .or_else(|| {
            let low = loose_price(value.get("low"))?;
            let high = loose_price(value.get("high"))?;
            Some((low + high) / 2.0)
        });

    let bucket = text_field(value, &["priceRange", "bucket"])
        .and_then(PriceBucket::parse)
        .or_else(|| typical.map(bucket_for_price))?;

    Some(PriceEstimate {
        bucket,
        typical_price: typical,
        confidence: confidence_field(value).unwrap_or(PriceConfidence::Low),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExtractionMethod;

    #[test]
    fn test_normalize_products_accepts_loose_prices() {
        let reply = json!({
            "products": [
                {"name": "Alba Dress", "price": "~$450", "priceConfidence": "medium"},
                {"name": "Mira Coat", "price": 890, "url": "https://a.com/mira"},
                {"name": "No price"},
                {"price": 100}
            ]
        });
        let products = normalize_products(&reply, "https://a.com");
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].price, Some(450.0));
        assert_eq!(products[0].extraction_method, ExtractionMethod::AiEstimate);
        assert_eq!(products[0].price_confidence, Some(PriceConfidence::Medium));
        assert_eq!(products[0].url, "https://a.com");
        assert_eq!(products[1].url, "https://a.com/mira");
    }

    #[test]
    fn test_normalize_estimate_from_bucket_or_price() {
        let from_bucket = normalize_price_estimate(&json!({"priceRange": "$$$", "confidence": "high"})).unwrap();
        assert_eq!(from_bucket.bucket, PriceBucket::Premium);
        assert_eq!(from_bucket.confidence, PriceConfidence::High);

        let from_range = normalize_price_estimate(&json!({"low": 40, "high": 60})).unwrap();
        assert_eq!(from_range.bucket, PriceBucket::Budget);
        assert_eq!(from_range.confidence, PriceConfidence::Low);

        assert!(normalize_price_estimate(&json!({"note": "unknown"})).is_none());
    }

    #[test]
    fn test_context_is_truncated() {
        let long = "x".repeat(MAX_CONTEXT_CHARS * 2);
        let request = CompletionRequest::new(CompletionTask::EstimatePriceRange, "Tove", None, &long);
        assert_eq!(request.context.len(), MAX_CONTEXT_CHARS);
    }

    #[tokio::test]
    async fn test_noop_completion_fails() {
        let request = CompletionRequest::new(CompletionTask::ExtractProducts, "Tove", None, "");
        assert!(NoopCompletion.extract_or_estimate(&request).await.is_err());
        assert!(!NoopCompletion.is_enabled());
    }
}
