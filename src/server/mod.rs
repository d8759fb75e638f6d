use axum::{
    extract::DefaultBodyLimit,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::inference::Classifier;
use crate::storage::{PredictionRepository, Store};

pub mod routes;
pub mod upload;

/// Server state
pub struct AppState {
    pub store: Arc<Store>,
    pub repository: PredictionRepository,
    pub classifier: Arc<dyn Classifier>,
    /// Directory uploads are written to and served from
    pub images_dir: PathBuf,
}

impl AppState {
    pub fn new(store: Arc<Store>, classifier: Arc<dyn Classifier>, images_dir: PathBuf) -> Self {
        Self {
            repository: PredictionRepository::new(store.clone()),
            store,
            classifier,
            images_dir,
        }
    }
}

pub fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route(
            "/api/predictions",
            get(routes::list_predictions).post(routes::create_prediction),
        )
        .route("/api/predictions/stats", get(routes::get_stats))
        .route("/api/predictions/test", get(routes::test_database))
        .route("/api/health", get(routes::health))
        .nest_service("/coral-images", ServeDir::new(state.images_dir.clone()))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(port: u16, state: Arc<AppState>, max_upload_bytes: usize) -> anyhow::Result<()> {
    // Select the backend before the first request so a degraded store shows
    // up in the startup log.
    let backend = state.store.acquire().await;
    tracing::info!("Database initialized successfully ({})", backend.mode());

    let app = router(state, max_upload_bytes);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Starting server on {}", addr);
    println!("🌍 Server running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
