use anyhow::Result;
use axiom_gateway::{
    audit::build_sink,
    drone::build_drone,
    guardian::{build_checker, Policy},
    AuditLog, AuditWorker, Gateway, HealthStatus, Request, Response, StageId,
};
use tracing::info;
use validator::{Validate, ValidationErrors};

use crate::{config::Settings, dto::IngestRequest};

/// Service layer shared by the gRPC and JSON front ends
pub struct GatewayService {
    gateway: Gateway,
}

impl GatewayService {
    /// Wire the pipeline described by `settings`. The returned worker must be
    /// awaited after the service is dropped so queued audit records are flushed.
    pub async fn new(settings: &Settings) -> Result<(Self, AuditWorker)> {
        // One pooled client for every remote stage
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        let legal = settings.legal_guardian();
        let safety = settings.safety_guardian();
        let final_safety = settings.final_safety_guardian();
        let drone_config = settings.drone()?;
        let pipeline = settings.pipeline();
        let audit_config = settings.audit();

        let drone = build_drone(&drone_config, &client)
            .map_err(|e| anyhow::anyhow!("Failed to create Drone: {}", e))?;
        let sink = build_sink(&audit_config)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to open audit sink: {}", e))?;
        let (audit, worker) = AuditLog::spawn(sink, audit_config.queue_capacity);

        let gateway = Gateway::builder()
            .config(pipeline.clone())
            .input_check(build_checker(StageId::GuardianLegal, Policy::Legal, &legal, &client))
            .input_check(build_checker(StageId::GuardianSafety, Policy::Safety, &safety, &client))
            .drone(drone, pipeline.drone_timeout)
            .output_check(build_checker(
                StageId::FinalSafety,
                Policy::Safety,
                &final_safety,
                &client,
            ))
            .audit_log(audit)
            .build()?;

        info!(
            legal_remote = legal.base_url.is_some(),
            safety_remote = safety.base_url.is_some(),
            final_safety_remote = final_safety.base_url.is_some(),
            guardian_timeout = ?pipeline.guardian_timeout,
            drone_timeout = ?pipeline.drone_timeout,
            audit_backend = ?audit_config.backend,
            audit_path = %audit_config.resolved_path().display(),
            "gateway pipeline ready"
        );

        Ok((Self { gateway }, worker))
    }

    pub fn from_gateway(gateway: Gateway) -> Self {
        Self { gateway }
    }

    /// Validate and run a request. Malformed requests never reach the pipeline
    /// and leave no audit record.
    pub async fn ingest(&self, request: IngestRequest) -> Result<Response, ValidationErrors> {
        request.validate()?;

        let request = Request::new(request.id.unwrap_or_default(), request.content);
        Ok(self.gateway.ingest(request).await)
    }

    pub fn health(&self) -> HealthStatus {
        self.gateway.health()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axiom_gateway::{
        errors::StageResult, AuditLog, AuditWorker, Drone, DroneOutput, Gateway,
        MemoryAuditSink, Request, RuleGuardian, StageId, ValidationResult,
    };

    use super::GatewayService;

    /// Drone that answers with the request content reversed
    pub struct ReverseDrone;

    #[async_trait]
    impl Drone for ReverseDrone {
        async fn execute(&self, request: &Request) -> StageResult<DroneOutput> {
            Ok(DroneOutput {
                output: request.content.chars().rev().collect(),
                validation: ValidationResult::valid(StageId::Drone, "executed"),
            })
        }
    }

    /// Service over the embedded rule guardians and a memory audit sink
    pub fn service() -> (GatewayService, Arc<MemoryAuditSink>, AuditWorker) {
        let timeout = Duration::from_secs(1);
        let sink = Arc::new(MemoryAuditSink::new());
        let (audit, worker) = AuditLog::spawn(sink.clone(), 16);

        let gateway = Gateway::builder()
            .input_stage(Arc::new(RuleGuardian::legal(StageId::GuardianLegal)), timeout)
            .input_stage(Arc::new(RuleGuardian::safety(StageId::GuardianSafety)), timeout)
            .drone(Arc::new(ReverseDrone), timeout)
            .output_stage(Arc::new(RuleGuardian::safety(StageId::FinalSafety)), timeout)
            .audit_log(audit)
            .build()
            .unwrap();

        (GatewayService::from_gateway(gateway), sink, worker)
    }
}
