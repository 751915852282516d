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

use super::{Drone, DroneOutput};
use crate::errors::{StageError, StageResult};
use crate::types::{Request, StageId, ValidationResult};

#[derive(Debug, Serialize)]
struct ExecuteRequest<'a> {
    request_id: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ExecuteResponse {
    #[serde(default)]
    output: Option<String>,
    #[serde(default = "default_is_valid")]
    is_valid: bool,
    #[serde(default)]
    reason: Option<String>,
}

fn default_is_valid() -> bool {
    true
}

/// Drone execution service reached over HTTP
pub struct HttpDrone {
    http_client: Client,
    base_url: String,
}

impl HttpDrone {
    pub fn new(base_url: String, http_client: Client) -> Self {
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Drone for HttpDrone {
    async fn execute(&self, request: &Request) -> StageResult<DroneOutput> {
        let url = format!("{}/execute", self.base_url);

        let response = self
            .http_client
            .post(&url)
            .json(&ExecuteRequest {
                request_id: &request.id,
                content: &request.content,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StageError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body: ExecuteResponse = response.json().await.map_err(|e| StageError::InvalidResponse {
            message: format!("Failed to parse drone response: {}", e),
        })?;

        if !body.is_valid {
            return Ok(DroneOutput {
                output: body.output.unwrap_or_default(),
                validation: ValidationResult::invalid(
                    StageId::Drone,
                    body.reason.unwrap_or_else(|| "rejected by drone".to_string()),
                ),
            });
        }

        // A success must carry its output
        let output = body.output.ok_or_else(|| StageError::InvalidResponse {
            message: "drone response is missing output".to_string(),
        })?;

        Ok(DroneOutput {
            output,
            validation: ValidationResult::valid(
                StageId::Drone,
                body.reason.unwrap_or_else(|| "executed".to_string()),
            ),
        })
    }
}
