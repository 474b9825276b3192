mod config;
mod cv;
mod db;
mod errors;
mod faculty;
mod llm_client;
mod models;
mod outreach;
mod pipeline;
mod routes;
mod runs;
mod search_client;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::config::Config;
use crate::cv::LlmCvParser;
use crate::db::create_pool;
use crate::faculty::{DirectoryScraper, SearchEnricher, SkillMapRecommender};
use crate::llm_client::LlmClient;
use crate::outreach::LlmPersonalizer;
use crate::pipeline::{Workflow, WorkflowOptions, WorkflowStages};
use crate::routes::build_router;
use crate::runs::RunRegistry;
use crate::search_client::SearchClient;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting outreach API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;

    // Initialize LLM client
    let llm = LlmClient::new(config.anthropic_api_key.clone());
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let search = SearchClient::new(config.serper_api_key.clone());
    if !search.is_configured() {
        warn!("SERPER_API_KEY not set; enrichment will use scraped data only");
    }

    // Pipeline stages
    let cv_parser = Arc::new(LlmCvParser::new(llm.clone()));
    let scraper = DirectoryScraper::new(config.directory_config())?;
    info!("Faculty directory: {}", config.faculty_base_url);

    let stages = WorkflowStages {
        parser: cv_parser.clone(),
        recommender: Arc::new(SkillMapRecommender::default()),
        source: Arc::new(scraper),
        enricher: Arc::new(SearchEnricher::new(search, llm.clone())),
        personalizer: Arc::new(LlmPersonalizer::new(
            llm.with_temperature(config.llm_temperature),
        )),
    };
    let workflow = Workflow::new(
        stages,
        WorkflowOptions {
            concurrency: config.pipeline_concurrency,
            ..WorkflowOptions::default()
        },
    );

    // Build app state
    let state = AppState {
        db,
        config: config.clone(),
        cv_parser,
        workflow,
        runs: RunRegistry::default(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
