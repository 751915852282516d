use std::sync::Arc;

use axiom_gateway::Response;
use axum::{extract::Extension, http::StatusCode, response::Json, routing::post, Router};
use tracing::{instrument, warn};

use crate::{
    dto::{ApiResult, IngestRequest},
    service::GatewayService,
};

/// Create ingest router
pub fn create_router() -> Router {
    Router::new().route("/ingest", post(ingest))
}

/// Run one request through the pipeline
#[instrument(skip_all)]
async fn ingest(
    Extension(service): Extension<Arc<GatewayService>>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<Response>, (StatusCode, Json<ApiResult>)> {
    match service.ingest(request).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            warn!(error = %e, "rejected malformed request");
            Err((
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ApiResult::failure(e.to_string())),
            ))
        }
    }
}
