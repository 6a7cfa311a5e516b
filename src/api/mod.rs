mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::lifecycle::SessionManager;

pub fn create_router(sessions: SessionManager) -> Router {
    let api = Router::new()
        // Sessions
        .route("/queries", get(handlers::list_queries))
        .route("/queries/{id}", get(handlers::get_query))
        .route("/queries/{id}/summaries", get(handlers::list_summaries))
        .route("/search", post(handlers::start_search))
        // Analysis
        .route("/analyze", post(handlers::start_analysis))
        .route("/analysis/{id}", get(handlers::get_analysis))
        // Health
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(sessions)
}
