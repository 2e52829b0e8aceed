//! HTTP API for running analyses and managing the cache.
//!
//! Endpoints:
//! - `POST /api/analyze` runs the pipeline for one video
//! - `GET /api/models` lists model display names
//! - `GET /api/cache` and `DELETE /api/cache` inspect or clear the cache
//! - `GET /health`

mod handlers;
mod routes;

pub use handlers::{AnalyzeRequest, AnalyzeResponse};
pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::Settings;
use crate::llm::LlmConfig;
use crate::pipeline::Pipeline;

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub llm: Arc<LlmConfig>,
}

impl AppState {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let pipeline = settings.build_pipeline()?;
        Ok(Self::from_parts(pipeline, settings.llm.clone()))
    }

    pub fn from_parts(pipeline: Pipeline, llm: LlmConfig) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            llm: Arc::new(llm),
        }
    }
}

/// Start the web server.
pub async fn serve(settings: &Settings, host: &str, port: u16) -> anyhow::Result<()> {
    let state = AppState::new(settings)?;
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
