/*
Copyright 2024, Zep Software, Inc.

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! Main pipeline orchestrator


use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::time::timeout;
use tokio_retry::{strategy::FixedInterval, RetryIf};
use tracing::{debug, error, info, instrument, warn, Instrument};

use crate::{
    audit::AuditLog,
    config::PipelineConfig,
    drone::{Drone, DroneOutput},
    errors::{GatewayError, GatewayResult, StageError, StageResult},
    guardian::Checker,
    types::{
        AuditRecord, HealthStatus, Outcome, PipelineState, Request, Response, StageId,
        ValidationResult,
    },
};

/// A checker together with the deadline it must answer within
#[derive(Clone)]
pub struct StageHandle {
    pub checker: Arc<dyn Checker>,
    pub timeout: Duration,
}

/// How a request left the pipeline
struct Terminal {
    content: String,
    validation: ValidationResult,
    outcome: Outcome,
}

impl Terminal {
    fn rejected(validation: ValidationResult) -> Self {
        Self {
            content: validation.reason.clone(),
            validation,
            outcome: Outcome::Rejected,
        }
    }

    fn unavailable(stage: StageId) -> Self {
        let validation = ValidationResult::unavailable(stage);
        Self {
            content: validation.reason.clone(),
            validation,
            outcome: Outcome::StageUnavailable,
        }
    }
}

/// Running state and verdict trace of one request
struct RequestTrace<'a> {
    request_id: &'a str,
    state: PipelineState,
    validations: Vec<ValidationResult>,
}

impl<'a> RequestTrace<'a> {
    fn new(request_id: &'a str) -> Self {
        Self {
            request_id,
            state: PipelineState::Received,
            validations: Vec::new(),
        }
    }

    fn enter(&mut self, next: PipelineState) {
        debug!(request_id = %self.request_id, from = %self.state, to = %next, "pipeline transition");
        self.state = next;
    }

    fn record(&mut self, validation: ValidationResult) {
        self.validations.push(validation);
    }
}

/// Sequences guardians, the Drone and the final checks for every request,
/// and hands one audit record per request to the audit log.
///
/// Cheap to clone; clones share the same stages and audit queue.
#[derive(Clone)]
pub struct Gateway {
    pipeline: Arc<Pipeline>,
}

struct Pipeline {
    input_stages: Vec<StageHandle>,
    drone: Arc<dyn Drone>,
    drone_timeout: Duration,
    retry_backoff: Duration,
    output_stages: Vec<StageHandle>,
    audit: AuditLog,
}

impl Gateway {
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::default()
    }

    /// Liveness report. Touches no dependency.
    pub fn health(&self) -> HealthStatus {
        HealthStatus::now()
    }

    /// Run `request` through the pipeline. Always produces a Response;
    /// stage failures are folded into its validation.
    ///
    /// The pipeline runs on its own task, so a caller that stops waiting
    /// does not stop the request from reaching the audit log.
    #[instrument(skip(self, request), fields(request_id = %request.id))]
    pub async fn ingest(&self, request: Request) -> Response {
        let pipeline = Arc::clone(&self.pipeline);
        let request_id = request.id.clone();

        let task = tokio::spawn(async move { pipeline.process(request).await }.in_current_span());

        match task.await {
            Ok(response) => response,
            Err(e) => {
                error!(request_id = %request_id, error = %e, "pipeline task failed");
                Response {
                    id: request_id,
                    content: "pipeline failed".to_string(),
                    validation: ValidationResult::invalid(
                        StageId::Custom("gateway".to_string()),
                        "pipeline failed",
                    ),
                    timestamp: Utc::now(),
                }
            }
        }
    }
}

impl Pipeline {
    async fn process(&self, request: Request) -> Response {
        let started = Instant::now();
        let mut trace = RequestTrace::new(&request.id);

        let terminal = self.run(&request, &mut trace).await;
        trace.enter(PipelineState::Done(terminal.outcome));

        let completed_at = Utc::now();
        let response = Response {
            id: request.id.clone(),
            content: terminal.content,
            validation: terminal.validation,
            timestamp: completed_at,
        };

        let record = AuditRecord {
            request_id: request.id.clone(),
            validations: trace.validations,
            content: response.content.clone(),
            outcome: terminal.outcome,
            submitted_at: request.submitted_at,
            completed_at,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        if let Err(e) = self.audit.submit(record) {
            error!(request_id = %request.id, error = %e, "audit write failed");
        }

        info!(
            request_id = %response.id,
            is_valid = response.validation.is_valid,
            stage = %response.validation.stage,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request completed"
        );

        response
    }

    async fn run(&self, request: &Request, trace: &mut RequestTrace<'_>) -> Terminal {
        for handle in &self.input_stages {
            if let Err(terminal) = self.run_check(handle, &request.content, trace).await {
                return terminal;
            }
        }

        let output = match self.run_drone(request, trace).await {
            Ok(output) => output,
            Err(terminal) => return terminal,
        };

        for handle in &self.output_stages {
            if let Err(terminal) = self.run_check(handle, &output, trace).await {
                return terminal;
            }
        }

        let last_stage = trace
            .validations
            .last()
            .map(|v| v.stage.clone())
            .unwrap_or(StageId::Drone);

        Terminal {
            content: output,
            validation: ValidationResult::valid(last_stage, "all stages passed"),
            outcome: Outcome::Accepted,
        }
    }

    async fn run_check(
        &self,
        handle: &StageHandle,
        input: &str,
        trace: &mut RequestTrace<'_>,
    ) -> Result<(), Terminal> {
        let stage = handle.checker.stage();
        trace.enter(PipelineState::for_stage(&stage));

        let verdict = match timeout(handle.timeout, handle.checker.check(input)).await {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(e)) => {
                warn!(request_id = %trace.request_id, %stage, error = %e, "stage unavailable");
                trace.record(ValidationResult::unavailable(stage.clone()));
                return Err(Terminal::unavailable(stage));
            }
            Err(_) => {
                warn!(request_id = %trace.request_id, %stage, timeout = ?handle.timeout, "stage timed out");
                trace.record(ValidationResult::unavailable(stage.clone()));
                return Err(Terminal::unavailable(stage));
            }
        };

        // The trace always names the stage slot, whatever the checker stamped
        let verdict = ValidationResult { stage, ..verdict };
        trace.record(verdict.clone());

        if verdict.is_valid {
            Ok(())
        } else {
            Err(Terminal::rejected(verdict))
        }
    }

    async fn run_drone(&self, request: &Request, trace: &mut RequestTrace<'_>) -> Result<String, Terminal> {
        trace.enter(PipelineState::Executing);

        let strategy = FixedInterval::new(self.retry_backoff).take(1);
        let retry_condition = |e: &StageError| {
            let transient = e.is_transient();
            if transient {
                warn!(request_id = %request.id, error = %e, "drone attempt failed, retrying once");
            }
            transient
        };

        let result = RetryIf::spawn(strategy, || self.execute_once(request), retry_condition).await;

        match result {
            Ok(DroneOutput { output, validation }) => {
                let validation = ValidationResult {
                    stage: StageId::Drone,
                    ..validation
                };
                trace.record(validation.clone());

                if validation.is_valid {
                    Ok(output)
                } else {
                    Err(Terminal::rejected(validation))
                }
            }
            Err(e) if e.is_transient() => {
                warn!(request_id = %request.id, error = %e, "drone unavailable");
                trace.record(ValidationResult::unavailable(StageId::Drone));
                Err(Terminal::unavailable(StageId::Drone))
            }
            Err(e) => {
                warn!(request_id = %request.id, error = %e, "drone execution failed");
                let validation = ValidationResult::invalid(StageId::Drone, format!("drone error: {}", e));
                trace.record(validation.clone());
                Err(Terminal::rejected(validation))
            }
        }
    }

    async fn execute_once(&self, request: &Request) -> StageResult<DroneOutput> {
        match timeout(self.drone_timeout, self.drone.execute(request)).await {
            Ok(result) => result,
            Err(_) => Err(StageError::Timeout {
                after: self.drone_timeout,
            }),
        }
    }
}

/// A stage added to the builder, with its deadline if one was given
struct PendingStage {
    checker: Arc<dyn Checker>,
    timeout: Option<Duration>,
}

impl PendingStage {
    fn resolve(self, default: Duration) -> StageHandle {
        StageHandle {
            checker: self.checker,
            timeout: self.timeout.unwrap_or(default),
        }
    }
}

/// Assembles a [`Gateway`] from explicitly provided stages
#[derive(Default)]
pub struct GatewayBuilder {
    config: PipelineConfig,
    input_stages: Vec<PendingStage>,
    drone: Option<Arc<dyn Drone>>,
    output_stages: Vec<PendingStage>,
    audit: Option<AuditLog>,
}

impl GatewayBuilder {
    /// Replace all deadlines and the retry pacing. Call before `drone`
    /// and `retry_backoff`, which override single fields.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Append a check that runs on the request before the Drone
    pub fn input_stage(mut self, checker: Arc<dyn Checker>, timeout: Duration) -> Self {
        self.input_stages.push(PendingStage {
            checker,
            timeout: Some(timeout),
        });
        self
    }

    /// Append an input check bounded by the configured guardian timeout
    pub fn input_check(mut self, checker: Arc<dyn Checker>) -> Self {
        self.input_stages.push(PendingStage {
            checker,
            timeout: None,
        });
        self
    }

    pub fn drone(mut self, drone: Arc<dyn Drone>, timeout: Duration) -> Self {
        self.drone = Some(drone);
        self.config.drone_timeout = timeout;
        self
    }

    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.config.retry_backoff = backoff;
        self
    }

    /// Append a check that runs on the Drone output
    pub fn output_stage(mut self, checker: Arc<dyn Checker>, timeout: Duration) -> Self {
        self.output_stages.push(PendingStage {
            checker,
            timeout: Some(timeout),
        });
        self
    }

    /// Append an output check bounded by the configured guardian timeout
    pub fn output_check(mut self, checker: Arc<dyn Checker>) -> Self {
        self.output_stages.push(PendingStage {
            checker,
            timeout: None,
        });
        self
    }

    pub fn audit_log(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn build(self) -> GatewayResult<Gateway> {
        let drone = self.drone.ok_or_else(|| GatewayError::Config {
            message: "a drone is required".to_string(),
        })?;
        let audit = self.audit.ok_or_else(|| GatewayError::Config {
            message: "an audit log is required".to_string(),
        })?;

        let guardian_timeout = self.config.guardian_timeout;
        let pipeline = Pipeline {
            input_stages: self
                .input_stages
                .into_iter()
                .map(|stage| stage.resolve(guardian_timeout))
                .collect(),
            drone,
            drone_timeout: self.config.drone_timeout,
            retry_backoff: self.config.retry_backoff,
            output_stages: self
                .output_stages
                .into_iter()
                .map(|stage| stage.resolve(guardian_timeout))
                .collect(),
            audit,
        };

        Ok(Gateway {
            pipeline: Arc::new(pipeline),
        })
    }
}
