use axum::Router;

pub mod ingest;

/// Create the main API router
pub fn create_router() -> Router {
    Router::new().merge(ingest::create_router())
}
