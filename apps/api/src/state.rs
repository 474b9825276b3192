use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::pipeline::stages::CvParser;
use crate::pipeline::Workflow;
use crate::runs::RunRegistry;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    /// Also held by the workflow; exposed for the standalone CV parse endpoint.
    pub cv_parser: Arc<dyn CvParser>,
    pub workflow: Workflow,
    /// Cancellation tokens of runs executing in the background.
    pub runs: RunRegistry,
}

#[cfg(test)]
impl AppState {
    /// Real stages over unreachable endpoints and a lazily-connected pool.
    /// Nothing here touches the network until a handler actually runs a stage.
    pub(crate) fn for_tests(upload_dir: &str) -> Self {
        use std::time::Duration;

        use sqlx::postgres::PgPoolOptions;

        use crate::cv::LlmCvParser;
        use crate::faculty::{DirectoryScraper, SearchEnricher, SkillMapRecommender};
        use crate::llm_client::LlmClient;
        use crate::outreach::LlmPersonalizer;
        use crate::pipeline::{WorkflowOptions, WorkflowStages};
        use crate::search_client::SearchClient;

        let config = Config {
            database_url: "postgres://127.0.0.1:9/outreach_test".to_string(),
            anthropic_api_key: "test".to_string(),
            llm_temperature: 0.3,
            serper_api_key: None,
            faculty_base_url: "http://127.0.0.1:9".to_string(),
            scraper_delay_ms: 0,
            scraper_timeout_secs: 1,
            default_min_score: 0.3,
            pipeline_concurrency: 2,
            upload_dir: upload_dir.to_string(),
            port: 0,
            rust_log: "info".to_string(),
        };
        let db = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy(&config.database_url)
            .unwrap();
        let llm = LlmClient::new(config.anthropic_api_key.clone());
        let cv_parser = Arc::new(LlmCvParser::new(llm.clone()));
        let stages = WorkflowStages {
            parser: cv_parser.clone(),
            recommender: Arc::new(SkillMapRecommender::default()),
            source: Arc::new(DirectoryScraper::new(config.directory_config()).unwrap()),
            enricher: Arc::new(SearchEnricher::new(SearchClient::new(None), llm.clone())),
            personalizer: Arc::new(LlmPersonalizer::new(llm)),
        };

        AppState {
            db,
            config,
            cv_parser,
            workflow: Workflow::new(stages, WorkflowOptions::default()),
            runs: RunRegistry::default(),
        }
    }
}
