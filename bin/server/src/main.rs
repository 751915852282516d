use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{extract::Extension, response::Json, routing::get, Router};
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::{error, info, info_span, instrument, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod dto;
mod grpc;
mod routers;
mod service;

use axiom_gateway::HealthStatus;
use config::Settings;
use grpc::GrpcGateway;
use service::GatewayService;

/// Upper bound on waiting for queued audit records at shutdown
const AUDIT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Health check endpoint
#[instrument(skip_all)]
async fn healthcheck(Extension(service): Extension<Arc<GatewayService>>) -> Json<HealthStatus> {
    Json(service.health())
}

/// Build the JSON mirror of the gRPC API
fn create_app(service: Arc<GatewayService>) -> Router {
    Router::new()
        .route("/healthcheck", get(healthcheck))
        .nest("/api", routers::create_router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
                .layer(CorsLayer::permissive())
                .layer(Extension(service)),
        )
}

/// Resolves once shutdown has been requested
async fn shutdown_requested(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "axiom_gateway=debug,axiom_gateway_server=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let settings = Settings::load()?;
    info!(
        grpc = %settings.grpc_address(),
        http = ?settings.http_address(),
        "Starting Axiom gateway v{}",
        axiom_gateway::GATEWAY_VERSION
    );

    let (service, audit_worker) = GatewayService::new(&settings).await?;
    let service = Arc::new(service);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
            return;
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    // Optional JSON mirror
    let http_server = match settings.http_address() {
        Some(address) => {
            let listener = tokio::net::TcpListener::bind(&address)
                .await
                .with_context(|| format!("failed to bind HTTP listener on {}", address))?;
            info!("HTTP listening on {}", address);

            let app = create_app(service.clone());
            let rx = shutdown_rx.clone();
            Some(tokio::spawn(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(shutdown_requested(rx))
                    .await
            }))
        }
        None => None,
    };

    let grpc_address: SocketAddr = settings
        .grpc_address()
        .parse()
        .with_context(|| format!("invalid gRPC address {}", settings.grpc_address()))?;
    info!("gRPC listening on {}", grpc_address);

    tonic::transport::Server::builder()
        .trace_fn(|request| info_span!("grpc", path = %request.uri().path()))
        .add_service(GrpcGateway::new(service.clone()).into_server())
        .serve_with_shutdown(grpc_address, shutdown_requested(shutdown_rx))
        .await
        .with_context(|| format!("gRPC server on {} failed", grpc_address))?;

    if let Some(handle) = http_server {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "HTTP server failed"),
            Err(e) => error!(error = %e, "HTTP server task panicked"),
        }
    }

    // Closing the last gateway handle lets the audit worker drain and stop
    drop(service);
    match tokio::time::timeout(AUDIT_DRAIN_TIMEOUT, audit_worker.finish()).await {
        Ok(written) => info!(written, "audit log flushed"),
        Err(_) => warn!("audit log did not drain before shutdown"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn app() -> Router {
        let (service, _sink, _worker) = service::test_support::service();
        create_app(Arc::new(service))
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn ingest(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/ingest")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_healthcheck() {
        let response = app()
            .oneshot(Request::builder().uri("/healthcheck").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["healthy"], true);
        assert_eq!(body["version"], axiom_gateway::GATEWAY_VERSION);
    }

    #[tokio::test]
    async fn test_ingest_accepted() {
        let response = app()
            .oneshot(ingest(serde_json::json!({"id": "r1", "content": "olleh"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["id"], "r1");
        assert_eq!(body["content"], "hello");
        assert_eq!(body["validation"]["is_valid"], true);
    }

    #[tokio::test]
    async fn test_ingest_rejection_is_still_ok() {
        let response = app()
            .oneshot(ingest(serde_json::json!({"id": "r2", "content": "sell counterfeit goods"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["validation"]["is_valid"], false);
        assert_eq!(body["validation"]["stage"], "guardian-legal");
    }

    #[tokio::test]
    async fn test_ingest_malformed_is_unprocessable() {
        let response = app()
            .oneshot(ingest(serde_json::json!({"id": "r3", "content": ""})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
    }
}
