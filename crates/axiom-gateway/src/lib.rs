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

//! # Axiom Gateway
//!
//! A validation pipeline that fronts an execution backend ("Drone").
//!
//! Every request passes legal and safety guardians before the Drone runs,
//! and the Drone output passes a final safety check before it is returned.
//! Each request produces exactly one audit record.

pub mod audit;
pub mod config;
pub mod drone;
pub mod errors;
pub mod gateway;
pub mod guardian;
pub mod types;

// Re-export commonly used types
pub use errors::{AuditError, GatewayError, StageError};
pub use types::{
    AuditRecord, HealthStatus, Outcome, PipelineState, Request, Response, StageId,
    ValidationResult, GATEWAY_VERSION,
};

// Re-export traits
pub use audit::AuditSink;
pub use drone::Drone;
pub use guardian::Checker;

// Re-export concrete types
pub use audit::{AuditLog, AuditWorker, JsonlAuditSink, MemoryAuditSink, SledAuditSink};
pub use config::{
    AuditBackend, AuditConfig, DroneBackend, DroneConfig, GuardianConfig, PipelineConfig,
};
pub use drone::{DroneOutput, HttpDrone, OpenAiDrone};
pub use gateway::{Gateway, GatewayBuilder, StageHandle};
pub use guardian::{CachedChecker, HttpGuardian, Policy, RuleGuardian};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exports() {
        let _config = GuardianConfig::default();
        let _stage = StageId::GuardianLegal;
        let _checker: &dyn Checker = &RuleGuardian::legal(StageId::GuardianLegal);
        assert_eq!(GATEWAY_VERSION, env!("CARGO_PKG_VERSION"));
    }
}
