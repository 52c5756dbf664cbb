#![deny(clippy::all)]

pub use crate::config::CuratorConfig;
pub use crate::error::{CuratorError, FailureKind, FetchError};
pub use crate::model::*;
pub use crate::orchestrator::{BatchHandle, BatchRequest, CircuitBreaker, ScrapeJob, ScrapeJobEntry};
pub use crate::service::CuratorService;

pub mod completion;
pub mod config;
pub mod dedup;
mod error;
pub mod extract;
mod model;
pub mod orchestrator;
pub mod protection;
pub mod quality;
pub mod resolve;
pub mod scraper;
pub mod search;
pub mod service;

pub use serde::{Deserialize, Serialize};
pub use tokio_util::sync::CancellationToken;
