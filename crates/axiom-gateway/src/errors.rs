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

use std::time::Duration;

use thiserror::Error;

/// Errors raised while assembling or configuring the gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Audit error: {0}")]
    Audit(#[from] AuditError),
}

/// Errors a pipeline stage can report instead of a verdict.
///
/// A stage that *answers* with a negative verdict is not an error; these
/// variants cover the cases where no trustworthy verdict was produced.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("stage did not answer within {after:?}")]
    Timeout { after: Duration },

    #[error("stage unreachable: {message}")]
    Unavailable { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned HTTP {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("invalid stage response: {message}")]
    InvalidResponse { message: String },

    #[error("execution failed: {message}")]
    ExecutionFailed { message: String },
}

impl StageError {
    /// Whether a second attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StageError::Timeout { .. } | StageError::Unavailable { .. } => true,
            StageError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            StageError::UpstreamStatus { status, .. } => *status == 429 || *status >= 500,
            StageError::InvalidResponse { .. } | StageError::ExecutionFailed { .. } => false,
        }
    }
}

/// Audit-trail errors. Never surfaced to callers of the gateway.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("audit queue is full, record for {request_id} dropped")]
    QueueFull { request_id: String },

    #[error("audit queue is closed, record for {request_id} dropped")]
    QueueClosed { request_id: String },
}

/// Result type alias for gateway assembly
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Result type alias for stage calls
pub type StageResult<T> = Result<T, StageError>;

/// Result type alias for audit operations
pub type AuditResult<T> = Result<T, AuditError>;
