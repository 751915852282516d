use std::sync::Arc;

use axiom_gateway::{HealthStatus, Response, ValidationResult};
use chrono::{DateTime, Utc};
use tonic::Status;
use tracing::{instrument, warn};

use crate::{dto::IngestRequest, service::GatewayService};

pub mod pb {
    tonic::include_proto!("axiom.gateway.v1");
}

use pb::axiom_gateway_server::{AxiomGateway, AxiomGatewayServer};

fn timestamp(at: DateTime<Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: at.timestamp(),
        nanos: at.timestamp_subsec_nanos() as i32,
    }
}

impl From<ValidationResult> for pb::ValidationResult {
    fn from(validation: ValidationResult) -> Self {
        Self {
            is_valid: validation.is_valid,
            reason: validation.reason,
            stage: validation.stage.to_string(),
        }
    }
}

impl From<Response> for pb::Response {
    fn from(response: Response) -> Self {
        Self {
            id: response.id,
            content: response.content,
            validation: Some(response.validation.into()),
            timestamp: Some(timestamp(response.timestamp)),
        }
    }
}

impl From<HealthStatus> for pb::HealthStatus {
    fn from(status: HealthStatus) -> Self {
        Self {
            healthy: status.healthy,
            version: status.version,
            timestamp: Some(timestamp(status.timestamp)),
        }
    }
}

/// tonic front end for the pipeline
pub struct GrpcGateway {
    service: Arc<GatewayService>,
}

impl GrpcGateway {
    pub fn new(service: Arc<GatewayService>) -> Self {
        Self { service }
    }

    pub fn into_server(self) -> AxiomGatewayServer<Self> {
        AxiomGatewayServer::new(self)
    }
}

#[tonic::async_trait]
impl AxiomGateway for GrpcGateway {
    #[instrument(skip_all)]
    async fn ingest_request(
        &self,
        request: tonic::Request<pb::Request>,
    ) -> Result<tonic::Response<pb::Response>, Status> {
        let pb::Request { id, content } = request.into_inner();
        let input = IngestRequest {
            id: Some(id).filter(|id| !id.is_empty()),
            content,
        };

        let response = self.service.ingest(input).await.map_err(|e| {
            warn!(error = %e, "rejected malformed request");
            Status::invalid_argument(e.to_string())
        })?;

        Ok(tonic::Response::new(response.into()))
    }

    async fn get_health(
        &self,
        _request: tonic::Request<()>,
    ) -> Result<tonic::Response<pb::HealthStatus>, Status> {
        Ok(tonic::Response::new(self.service.health().into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::test_support;

    fn gateway() -> GrpcGateway {
        let (service, _sink, _worker) = test_support::service();
        GrpcGateway::new(Arc::new(service))
    }

    #[tokio::test]
    async fn test_ingest_accepted() {
        let gateway = gateway();

        let response = gateway
            .ingest_request(tonic::Request::new(pb::Request {
                id: "r1".to_string(),
                content: "olleh".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(response.id, "r1");
        assert_eq!(response.content, "hello");
        let validation = response.validation.unwrap();
        assert!(validation.is_valid);
        assert_eq!(validation.stage, "final-safety");
        assert!(response.timestamp.unwrap().seconds > 0);
    }

    #[tokio::test]
    async fn test_ingest_rejected_by_legal() {
        let gateway = gateway();

        let response = gateway
            .ingest_request(tonic::Request::new(pb::Request {
                id: "r2".to_string(),
                content: "how do I launder money quickly".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();

        let validation = response.validation.unwrap();
        assert!(!validation.is_valid);
        assert_eq!(validation.stage, "guardian-legal");
        assert_eq!(response.content, validation.reason);
    }

    #[tokio::test]
    async fn test_malformed_requests_are_invalid_argument() {
        let gateway = gateway();

        let status = gateway
            .ingest_request(tonic::Request::new(pb::Request {
                id: "r3".to_string(),
                content: String::new(),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);

        let status = gateway
            .ingest_request(tonic::Request::new(pb::Request {
                id: "x".repeat(129),
                content: "hello".to_string(),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_empty_id_is_generated() {
        let response = gateway()
            .ingest_request(tonic::Request::new(pb::Request {
                id: String::new(),
                content: "hello".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();

        assert!(!response.id.is_empty());
    }

    #[tokio::test]
    async fn test_get_health() {
        let before = Utc::now().timestamp();
        let status = gateway()
            .get_health(tonic::Request::new(()))
            .await
            .unwrap()
            .into_inner();

        assert!(status.healthy);
        assert_eq!(status.version, axiom_gateway::GATEWAY_VERSION);
        assert!(status.timestamp.unwrap().seconds >= before);
    }
}
