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

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Version reported by health checks
pub const GATEWAY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Identifies the stage that emitted a verdict
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StageId {
    GuardianLegal,
    GuardianSafety,
    Drone,
    FinalSafety,
    Custom(String),
}

impl StageId {
    pub fn as_str(&self) -> &str {
        match self {
            StageId::GuardianLegal => "guardian-legal",
            StageId::GuardianSafety => "guardian-safety",
            StageId::Drone => "drone",
            StageId::FinalSafety => "final-safety",
            StageId::Custom(name) => name,
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for StageId {
    fn from(value: String) -> Self {
        match value.as_str() {
            "guardian-legal" => StageId::GuardianLegal,
            "guardian-safety" => StageId::GuardianSafety,
            "drone" => StageId::Drone,
            "final-safety" => StageId::FinalSafety,
            _ => StageId::Custom(value),
        }
    }
}

impl From<StageId> for String {
    fn from(value: StageId) -> Self {
        value.as_str().to_string()
    }
}

/// An inbound request. Immutable once accepted by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    pub content: String,
    pub submitted_at: DateTime<Utc>,
}

impl Request {
    /// Accept a request, generating an id when the caller did not supply one
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        let id = id.into();
        let id = if id.trim().is_empty() {
            Uuid::new_v4().to_string()
        } else {
            id
        };

        Self {
            id,
            content: content.into(),
            submitted_at: Utc::now(),
        }
    }
}

/// Verdict produced by a single stage invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub reason: String,
    pub stage: StageId,
}

impl ValidationResult {
    pub fn valid(stage: StageId, reason: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            reason: reason.into(),
            stage,
        }
    }

    pub fn invalid(stage: StageId, reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            reason: reason.into(),
            stage,
        }
    }

    /// Verdict recorded when a stage could not be reached in time
    pub fn unavailable(stage: StageId) -> Self {
        let reason = format!("{} unavailable", stage);
        Self::invalid(stage, reason)
    }
}

/// Final answer for a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    pub content: String,
    pub validation: ValidationResult,
    pub timestamp: DateTime<Utc>,
}

/// Terminal state of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Accepted,
    Rejected,
    StageUnavailable,
}

/// Per-request pipeline state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Received,
    LegalCheck,
    SafetyCheck,
    Executing,
    FinalCheck,
    Checking(StageId),
    Done(Outcome),
}

impl PipelineState {
    /// State entered when the given stage starts running
    pub fn for_stage(stage: &StageId) -> Self {
        match stage {
            StageId::GuardianLegal => PipelineState::LegalCheck,
            StageId::GuardianSafety => PipelineState::SafetyCheck,
            StageId::Drone => PipelineState::Executing,
            StageId::FinalSafety => PipelineState::FinalCheck,
            other => PipelineState::Checking(other.clone()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done(_))
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Received => f.write_str("RECEIVED"),
            PipelineState::LegalCheck => f.write_str("LEGAL_CHECK"),
            PipelineState::SafetyCheck => f.write_str("SAFETY_CHECK"),
            PipelineState::Executing => f.write_str("EXECUTING"),
            PipelineState::FinalCheck => f.write_str("FINAL_CHECK"),
            PipelineState::Checking(stage) => write!(f, "CHECKING({})", stage),
            PipelineState::Done(Outcome::Accepted) => f.write_str("ACCEPTED"),
            PipelineState::Done(Outcome::Rejected) => f.write_str("REJECTED"),
            PipelineState::Done(Outcome::StageUnavailable) => f.write_str("STAGE_UNAVAILABLE"),
        }
    }
}

/// Append-only record of one request's trip through the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub request_id: String,
    pub validations: Vec<ValidationResult>,
    pub content: String,
    pub outcome: Outcome,
    pub submitted_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Liveness report, recomputed on every call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

impl HealthStatus {
    pub fn now() -> Self {
        Self {
            healthy: true,
            version: GATEWAY_VERSION.to_string(),
            timestamp: Utc::now(),
        }
    }
}
