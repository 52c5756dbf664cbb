use serde::{Deserialize, Serialize};

use crate::dedup::{DedupConfig, DEFAULT_SIMILARITY_THRESHOLD};
use crate::error::CuratorError;
use crate::model::DomainProtectionProfile;
use crate::protection::LOW_SUCCESS_THRESHOLD;
use crate::quality::ScoringWeights;

pub const DEFAULT_WORKER_POOL_SIZE: usize = 4;
pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 1_500;
pub const DEFAULT_MIN_PRODUCTS: usize = 3;
pub const DEFAULT_SIZE_SCAN_LINE_BUDGET: usize = 400;
pub const DEFAULT_CATEGORY: &str = "fashion";

pub const DEFAULT_CONTINUATION_PHRASES: &[&str] = &[
    "accept all",
    "accept",
    "continue",
    "continue shopping",
    "i agree",
    "agree",
    "got it",
    "ok",
    "no thanks",
    "close",
    "stay on this site",
    "shop now",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CuratorConfig {
    pub worker_pool_size: usize,
    pub navigation_timeout_ms: u64,
    pub settle_delay_ms: u64,
    pub min_products: usize,
    pub size_scan_line_budget: usize,
    pub continuation_phrases: Vec<String>,
    pub default_category: String,
    pub low_success_threshold: f64,
    pub scoring: ScoringWeights,
    pub dedup: DedupConfig,
    pub extra_protection: Vec<DomainProtectionProfile>,
}

impl Default for CuratorConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
            navigation_timeout_ms: DEFAULT_NAVIGATION_TIMEOUT_MS,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            min_products: DEFAULT_MIN_PRODUCTS,
            size_scan_line_budget: DEFAULT_SIZE_SCAN_LINE_BUDGET,
            continuation_phrases: DEFAULT_CONTINUATION_PHRASES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            default_category: DEFAULT_CATEGORY.to_string(),
            low_success_threshold: LOW_SUCCESS_THRESHOLD,
            scoring: ScoringWeights::default(),
            dedup: DedupConfig {
                similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            },
            extra_protection: Vec::new(),
        }
    }
}

impl CuratorConfig {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: CuratorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CuratorError> {
        if self.worker_pool_size == 0 {
            return Err(CuratorError::Config("workerPoolSize must be at least 1".into()));
        }
        if self.min_products == 0 {
            return Err(CuratorError::Config("minProducts must be at least 1".into()));
        }
        if self.size_scan_line_budget == 0 {
            return Err(CuratorError::Config("sizeScanLineBudget must be at least 1".into()));
        }
        if self.default_category.trim().is_empty() {
            return Err(CuratorError::Config("defaultCategory must not be empty".into()));
        }
        let threshold = self.dedup.similarity_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(CuratorError::Config(format!(
                "dedup.similarityThreshold must be in (0, 1], got {threshold}"
            )));
        }
        let low = self.low_success_threshold;
        if !(low > 0.0 && low <= 1.0) {
            return Err(CuratorError::Config(format!(
                "lowSuccessThreshold must be in (0, 1], got {low}"
            )));
        }
        self.scoring.validate()
    }
}
