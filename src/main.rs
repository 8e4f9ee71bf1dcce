use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use lorecrawl::admin::{self, AdminCommand};
use lorecrawl::core::config;
use lorecrawl::core::error::PipelineError;
use lorecrawl::core::types::*;
use lorecrawl::store::embedder::HttpEmbedder;
use lorecrawl::store::lance::LanceVectorStore;
use lorecrawl::store::memory::{MemoryStore, MemoryVectorStore};
use lorecrawl::store::{DocStore, VectorStore};
use lorecrawl::{crawl, ingest, jobs, search, AppState};

fn parse_port_from_args() -> Option<u16> {
    let mut args = std::env::args().peekable();
    while let Some(a) = args.next() {
        if a == "--port" {
            if let Some(v) = args.next() {
                if let Ok(p) = v.parse::<u16>() {
                    return Some(p);
                }
            }
        } else if let Some(rest) = a.strip_prefix("--port=") {
            if let Ok(p) = rest.parse::<u16>() {
                return Some(p);
            }
        }
    }
    None
}

fn parse_admin_command() -> Option<AdminCommand> {
    let mut args = std::env::args().peekable();
    while let Some(a) = args.next() {
        match a.as_str() {
            "--grant-admin" => {
                return args.next().map(|email| AdminCommand::GrantAdmin { email });
            }
            "--verify-all-users" => return Some(AdminCommand::VerifyAllUsers),
            "--truncate-all" => return Some(AdminCommand::TruncateAll),
            _ => {}
        }
    }
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=warn"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let store: Arc<dyn DocStore> = MemoryStore::new();

    // Operator commands run against the store and exit.
    if let Some(command) = parse_admin_command() {
        admin::run(&store, command).await?;
        return Ok(());
    }

    info!("Starting lorecrawl");

    // Chunk vector index: persistent LanceDB when available, in-memory
    // fallback otherwise so the rest of the pipeline keeps working.
    let vectors: Arc<dyn VectorStore> = match config::lancedb_uri() {
        Some(uri) => match LanceVectorStore::connect(&uri, config::DEFAULT_EMBEDDING_DIM).await {
            Ok(lance) => Arc::new(lance),
            Err(e) => {
                warn!(
                    "LanceDB unavailable ({}); falling back to in-memory vectors",
                    e
                );
                MemoryVectorStore::new(config::DEFAULT_EMBEDDING_DIM)
            }
        },
        None => {
            info!("Vector persistence disabled; using in-memory index");
            MemoryVectorStore::new(config::DEFAULT_EMBEDDING_DIM)
        }
    };

    let http_client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .connect_timeout(std::time::Duration::from_secs(10))
        .build()?;
    let embedder = Arc::new(HttpEmbedder::new(
        http_client,
        config::resolve_embed_base_url(),
        config::resolve_embed_api_key(),
        config::DEFAULT_EMBEDDING_DIM,
    ));

    let state = Arc::new(AppState::new(store, vectors, embedder));

    let app = Router::new()
        .route("/health", get(health))
        .route("/knowledge-bases", post(create_knowledge_base))
        .route("/knowledge-bases/{id}/jobs", get(list_jobs))
        .route("/knowledge-bases/{id}/documents", get(list_documents))
        .route("/knowledge-bases/{id}/search", post(search_knowledge_base))
        .route("/jobs", post(create_job))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/select", post(select_urls))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let port = parse_port_from_args().unwrap_or_else(config::resolve_port);
    let addr = format!("0.0.0.0:{port}");
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    state.browser_pool.shutdown().await;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

struct ApiError(PipelineError);

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
            PipelineError::Conflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(ErrorResponse {
            error: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn create_knowledge_base(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateKnowledgeBaseRequest>,
) -> Result<Json<KnowledgeBase>, ApiError> {
    let kb = KnowledgeBase {
        id: uuid::Uuid::new_v4().to_string(),
        workspace_id: req.workspace_id,
        name: req.name,
        embedding_model: req
            .embedding_model
            .unwrap_or_else(|| config::DEFAULT_EMBEDDING_MODEL.to_string()),
        chunk_size: req.chunk_size.unwrap_or(config::DEFAULT_CHUNK_SIZE),
        chunk_overlap: req.chunk_overlap.unwrap_or(config::DEFAULT_CHUNK_OVERLAP),
        deleted_at: None,
    };
    let kb = state.store.create_knowledge_base(kb).await?;
    Ok(Json(kb))
}

async fn create_job(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateJobRequest>,
) -> Result<Json<ScrapeJob>, ApiError> {
    if url::Url::parse(&req.base_url).is_err() {
        return Err(PipelineError::Conflict(format!("invalid base url: {}", req.base_url)).into());
    }
    state
        .store
        .find_knowledge_base(&req.knowledge_base_id)
        .await?
        .ok_or_else(|| {
            PipelineError::NotFound(format!("knowledge base {}", req.knowledge_base_id))
        })?;

    let job = ScrapeJob::new(
        req.base_url,
        req.knowledge_base_id,
        req.user_id,
        req.max_pages.unwrap_or(0),
    );
    let job = state.store.create_job(job).await?;

    tokio::spawn(crawl::run_discovery(state.clone(), job.id.clone()));
    Ok(Json(job))
}

async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ScrapeJob>, ApiError> {
    let job = state
        .store
        .find_job(&id)
        .await?
        .ok_or_else(|| PipelineError::NotFound(format!("job {id}")))?;
    Ok(Json(job))
}

async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ScrapeJob>>, ApiError> {
    Ok(Json(state.store.list_jobs(&id).await?))
}

async fn list_documents(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Document>>, ApiError> {
    Ok(Json(state.store.list_documents(&id).await?))
}

/// Move a `PENDING` job into ingestion with the operator's URL subset.
/// Selections outside `discovered_urls` are rejected whole.
async fn select_urls(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<SelectUrlsRequest>,
) -> Result<Json<ScrapeJob>, ApiError> {
    let job = jobs::advance(
        &state.store,
        &id,
        jobs::JobEvent::UrlsSelected {
            selected: req.urls,
        },
    )
    .await?;

    tokio::spawn(ingest::run_ingestion(state.clone(), job.id.clone()));
    Ok(Json(job))
}

async fn search_knowledge_base(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let limit = req.limit.unwrap_or(10);
    let results = search::search(&state, &id, &req.query, limit).await?;
    Ok(Json(SearchResponse { results }))
}
