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

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::Checker;
use crate::errors::{StageError, StageResult};
use crate::types::{StageId, ValidationResult};

#[derive(Debug, Serialize)]
struct CheckRequest<'a> {
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    is_valid: bool,
    #[serde(default)]
    reason: Option<String>,
}

/// Remote classifier reached over HTTP
pub struct HttpGuardian {
    stage: StageId,
    http_client: Client,
    base_url: String,
}

impl HttpGuardian {
    pub fn new(stage: StageId, base_url: String, http_client: Client) -> Self {
        Self {
            stage,
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn verdict_from(&self, body: CheckResponse) -> ValidationResult {
        let reason = body.reason.filter(|r| !r.trim().is_empty());

        if body.is_valid {
            ValidationResult::valid(self.stage.clone(), reason.unwrap_or_else(|| "passed".to_string()))
        } else {
            let fallback = format!("rejected by {}", self.stage);
            ValidationResult::invalid(self.stage.clone(), reason.unwrap_or(fallback))
        }
    }
}

#[async_trait]
impl Checker for HttpGuardian {
    fn stage(&self) -> StageId {
        self.stage.clone()
    }

    async fn check(&self, input: &str) -> StageResult<ValidationResult> {
        let url = format!("{}/check", self.base_url);

        let response = self
            .http_client
            .post(&url)
            .json(&CheckRequest { content: input })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(stage = %self.stage, %status, "guardian returned an error status");
            return Err(StageError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body: CheckResponse = response.json().await.map_err(|e| StageError::InvalidResponse {
            message: format!("Failed to parse guardian response: {}", e),
        })?;

        Ok(self.verdict_from(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_remote_verdict_is_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/check"))
            .and(body_json(json!({"content": "illegal"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"is_valid": false, "reason": "policy violation"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let guardian = HttpGuardian::new(StageId::GuardianLegal, server.uri(), Client::new());
        let verdict = guardian.check("illegal").await.unwrap();

        assert_eq!(
            verdict,
            ValidationResult::invalid(StageId::GuardianLegal, "policy violation")
        );
    }

    #[tokio::test]
    async fn test_missing_reason_gets_default() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/check"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"is_valid": true})))
            .mount(&server)
            .await;

        let base = format!("{}/", server.uri());
        let guardian = HttpGuardian::new(StageId::GuardianSafety, base, Client::new());
        let verdict = guardian.check("hello").await.unwrap();

        assert!(verdict.is_valid);
        assert_eq!(verdict.reason, "passed");
    }

    #[tokio::test]
    async fn test_error_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let guardian = HttpGuardian::new(StageId::GuardianSafety, server.uri(), Client::new());
        let err = guardian.check("hello").await.unwrap_err();

        assert!(matches!(err, StageError::UpstreamStatus { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let guardian = HttpGuardian::new(StageId::GuardianLegal, server.uri(), Client::new());
        let err = guardian.check("hello").await.unwrap_err();

        assert!(matches!(err, StageError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_guardian_is_an_error() {
        // Port 9 (discard) is not expected to have a listener in test environments
        let guardian = HttpGuardian::new(
            StageId::GuardianLegal,
            "http://127.0.0.1:9".to_string(),
            Client::new(),
        );
        let err = guardian.check("hello").await.unwrap_err();
        assert!(matches!(err, StageError::Http(_)));
    }
}
