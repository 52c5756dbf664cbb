use axum::{
    body::Body,
    extract::{Json, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use curator_core::completion::{CompletionProvider, HttpCompletionProvider, NoopCompletion};
use curator_core::search::{HttpSearchProvider, NoopSearch, SearchProvider};
use curator_core::{
    BatchRequest, BrandProfile, CuratorConfig, CuratorError, CuratorService, DedupRecord,
    DomainProtectionProfile, DuplicateCandidate,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_COMPLETION_MODEL: &str = "gpt-4o-mini";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "curator_api=debug,curator_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match std::env::var("CURATOR_CONFIG") {
        Ok(path) => {
            let raw = tokio::fs::read_to_string(&path).await?;
            tracing::info!("Loaded configuration from {}", path);
            CuratorConfig::from_json(&raw)?
        }
        Err(_) => CuratorConfig::default(),
    };

    let search: Arc<dyn SearchProvider> = match std::env::var("SEARCH_API_URL") {
        Ok(endpoint) => Arc::new(HttpSearchProvider::new(endpoint, std::env::var("SEARCH_API_KEY").ok())?),
        Err(_) => {
            tracing::warn!("SEARCH_API_URL not set, brand resolution runs without search");
            Arc::new(NoopSearch)
        }
    };

    let completion: Arc<dyn CompletionProvider> =
        match (std::env::var("COMPLETION_API_URL"), std::env::var("COMPLETION_API_KEY")) {
            (Ok(endpoint), Ok(key)) => {
                let model = std::env::var("COMPLETION_MODEL").unwrap_or_else(|_| DEFAULT_COMPLETION_MODEL.into());
                Arc::new(HttpCompletionProvider::new(endpoint, key, model)?)
            }
            _ => Arc::new(NoopCompletion),
        };

    let proxy_url = std::env::var("PROXY_SERVER").ok();
    let service = Arc::new(CuratorService::launch(config, proxy_url, search, completion).await?);
    let app_state = Arc::new(AppState { service });

    let app = Router::new()
        .route("/health", get(health))
        .nest(
            "/v1",
            Router::new()
                .route("/brands/resolve", post(resolve_brand))
                .route("/batches", post(scrape_batch))
                .route("/protection", get(check_protection))
                .route("/duplicates", post(find_duplicates)),
        )
        .with_state(app_state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".into());
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> &'static str {
    "OK"
}

struct AppState {
    service: Arc<CuratorService>,
}

#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

fn ok<T: Serialize>(data: T) -> Response {
    Json(ApiResponse {
        success: true,
        data: Some(data),
        error: None,
    })
    .into_response()
}

fn fail(err: CuratorError) -> Response {
    let status = match &err {
        CuratorError::EmptyBatch | CuratorError::EmptyBrandName | CuratorError::InvalidUrl { .. } => {
            StatusCode::BAD_REQUEST
        }
        CuratorError::ConfirmationRequired { .. } => StatusCode::CONFLICT,
        CuratorError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(err.to_string()),
        }),
    )
        .into_response()
}

#[derive(Deserialize)]
struct ResolveBrandRequest {
    name: String,
}

async fn resolve_brand(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResolveBrandRequest>,
) -> Response {
    match state.service.resolve_brand(&req.name).await {
        Ok(profile) => ok::<BrandProfile>(profile),
        Err(e) => fail(e),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScrapeBatchRequest {
    urls: Vec<String>,
    #[serde(default)]
    confirmed: bool,
}

/// Streams one JSON outcome per line as URLs finish. Dropping the
/// connection cancels the rest of the batch.
async fn scrape_batch(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ScrapeBatchRequest>,
) -> Response {
    let cancel = CancellationToken::new();
    let request = BatchRequest {
        urls: req.urls,
        confirmed: req.confirmed,
    };
    let handle = match state.service.scrape_batch(request, cancel.clone()) {
        Ok(handle) => handle,
        Err(e) => return fail(e),
    };

    tracing::info!("Streaming batch {}", handle.job_id);
    let guard = cancel.drop_guard();
    let lines = handle.into_stream().map(move |outcome| {
        let _guard = &guard;
        let mut line = match serde_json::to_string(&outcome) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("Failed to encode outcome for {}: {}", outcome.url, e);
                String::new()
            }
        };
        line.push('\n');
        Ok::<_, Infallible>(line)
    });

    (
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(lines),
    )
        .into_response()
}

#[derive(Deserialize)]
struct ProtectionQuery {
    url: String,
}

async fn check_protection(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProtectionQuery>,
) -> Response {
    match state.service.check_protection(&query.url) {
        Ok(profile) => ok::<DomainProtectionProfile>(profile),
        Err(e) => fail(e),
    }
}

#[derive(Deserialize)]
struct DuplicatesRequest {
    candidate: DedupRecord,
    #[serde(default)]
    existing: Vec<DedupRecord>,
}

async fn find_duplicates(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DuplicatesRequest>,
) -> Response {
    ok::<Vec<DuplicateCandidate>>(state.service.find_duplicates(&req.candidate, &req.existing))
}
