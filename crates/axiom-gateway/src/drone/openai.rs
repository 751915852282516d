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

use super::{Drone, DroneOutput};
use crate::errors::{GatewayError, GatewayResult, StageError, StageResult};
use crate::types::{Request, StageId, ValidationResult};

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const SYSTEM_PROMPT: &str =
    "You are a task worker behind a compliance gateway. Answer the user's request directly.";

#[derive(Debug, Serialize)]
struct OpenAiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    error: Option<OpenAiError>,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    message: String,
}

/// Drone backed by an OpenAI-compatible chat-completions endpoint
pub struct OpenAiDrone {
    http_client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiDrone {
    pub fn new(api_key: String, http_client: Client) -> GatewayResult<Self> {
        if api_key.trim().is_empty() {
            return Err(GatewayError::Config {
                message: "OpenAI API key is required".to_string(),
            });
        }

        Ok(Self {
            http_client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.0,
            max_tokens: 2048,
        })
    }

    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        if let Some(base_url) = base_url {
            self.base_url = base_url.trim_end_matches('/').to_string();
        }
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        if let Some(model) = model {
            self.model = model;
        }
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
impl Drone for OpenAiDrone {
    async fn execute(&self, request: &Request) -> StageResult<DroneOutput> {
        let chat_request = OpenAiChatRequest {
            model: &self.model,
            messages: vec![
                OpenAiMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                OpenAiMessage {
                    role: "user",
                    content: &request.content,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&chat_request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(request_id = %request.id, %status, "chat completion failed");
            return Err(StageError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        let chat_response: OpenAiChatResponse =
            response.json().await.map_err(|e| StageError::InvalidResponse {
                message: format!("Failed to parse JSON response: {}", e),
            })?;

        if let Some(error) = chat_response.error {
            return Err(StageError::ExecutionFailed {
                message: error.message,
            });
        }

        let choice = chat_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| StageError::ExecutionFailed {
                message: "No choices in response".to_string(),
            })?;

        if let Some(refusal) = choice.message.refusal {
            return Ok(DroneOutput {
                output: String::new(),
                validation: ValidationResult::invalid(StageId::Drone, format!("drone refused: {}", refusal)),
            });
        }

        let content = choice
            .message
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| StageError::ExecutionFailed {
                message: "No content in response".to_string(),
            })?;

        Ok(DroneOutput {
            output: content,
            validation: ValidationResult::valid(StageId::Drone, "executed"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn drone_for(server: &MockServer) -> OpenAiDrone {
        OpenAiDrone::new("test-key".to_string(), Client::new())
            .unwrap()
            .with_base_url(Some(server.uri()))
    }

    #[test]
    fn test_empty_api_key_is_rejected() {
        assert!(OpenAiDrone::new("  ".to_string(), Client::new()).is_err());
    }

    #[tokio::test]
    async fn test_completion_becomes_output() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "hi", "refusal": null}}]
            })))
            .mount(&server)
            .await;

        let result = drone_for(&server)
            .execute(&Request::new("r1", "hello"))
            .await
            .unwrap();

        assert_eq!(result.output, "hi");
        assert!(result.validation.is_valid);
    }

    #[tokio::test]
    async fn test_refusal_is_a_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": null, "refusal": "cannot help"}}]
            })))
            .mount(&server)
            .await;

        let result = drone_for(&server)
            .execute(&Request::new("r1", "hello"))
            .await
            .unwrap();

        assert!(!result.validation.is_valid);
        assert_eq!(result.validation.reason, "drone refused: cannot help");
    }

    #[tokio::test]
    async fn test_rate_limit_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = drone_for(&server)
            .execute(&Request::new("r1", "hello"))
            .await
            .unwrap_err();

        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_empty_choices_is_execution_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = drone_for(&server)
            .execute(&Request::new("r1", "hello"))
            .await
            .unwrap_err();

        assert!(matches!(err, StageError::ExecutionFailed { .. }));
        assert!(!err.is_transient());
    }
}
